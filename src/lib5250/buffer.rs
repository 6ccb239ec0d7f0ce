//! Display buffer
//!
//! The character grid of one 5250 screen plus its format table. Cells hold
//! host (EBCDIC) bytes; a byte whose top three bits are `001` is an
//! attribute. All grid addressing goes through this type, which keeps the
//! cursor inside the grid.

use crate::lib5250::codes::{
    AID_F1, AID_F10, AID_F11, AID_F12, AID_F13, AID_F14, AID_F15, AID_F16, AID_F17, AID_F18, AID_F19, AID_F2,
    AID_F20, AID_F21, AID_F22, AID_F23, AID_F24, AID_F3, AID_F4, AID_F5, AID_F6, AID_F7, AID_F8, AID_F9,
};
use crate::lib5250::field::Field;

/// Index of a field in its buffer's format table
pub type FieldId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayBuffer {
    width: usize,
    height: usize,
    cx: usize,
    cy: usize,
    /// Insert cursor target
    tcx: usize,
    tcy: usize,
    data: Vec<u8>,
    fields: Vec<Field>,
    master_mdt: bool,
    header_data: Option<Vec<u8>>,
}

impl DisplayBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        debug_assert!(width > 0 && height > 0);
        Self {
            width,
            height,
            cx: 0,
            cy: 0,
            tcx: 0,
            tcy: 0,
            data: vec![0; width * height],
            fields: Vec::new(),
            master_mdt: false,
            header_data: None,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cursor_x(&self) -> usize {
        self.cx
    }

    pub fn cursor_y(&self) -> usize {
        self.cy
    }

    /// Move the cursor. Out of range coordinates are clamped to the grid.
    pub fn set_cursor(&mut self, y: usize, x: usize) {
        debug_assert!(y < self.height && x < self.width, "cursor ({y}, {x}) outside grid");
        self.cy = y.min(self.height - 1);
        self.cx = x.min(self.width - 1);
    }

    /// Reallocate the grid at a new size. Contents, cursor and format table
    /// are all reset.
    pub fn set_size(&mut self, rows: usize, cols: usize) {
        self.width = cols;
        self.height = rows;
        self.data = vec![0; rows * cols];
        self.clear();
    }

    /// Null the grid, home the cursor and drop the format table.
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.cx = 0;
        self.cy = 0;
        self.clear_table();
    }

    /// Advance the cursor `n` cells, wrapping at the right edge and at the
    /// bottom of the screen.
    pub fn right(&mut self, n: usize) {
        let x = self.cx + n;
        self.cy = (self.cy + x / self.width) % self.height;
        self.cx = x % self.width;
    }

    pub fn left(&mut self) {
        if self.cx == 0 {
            self.cx = self.width - 1;
            self.cy = if self.cy == 0 { self.height - 1 } else { self.cy - 1 };
        } else {
            self.cx -= 1;
        }
    }

    pub fn up(&mut self) {
        self.cy = if self.cy == 0 { self.height - 1 } else { self.cy - 1 };
    }

    pub fn down(&mut self) {
        self.cy = if self.cy + 1 == self.height { 0 } else { self.cy + 1 };
    }

    pub fn set_ic(&mut self, y: usize, x: usize) {
        self.tcy = y.min(self.height - 1);
        self.tcx = x.min(self.width - 1);
    }

    /// Insert cursor target as (row, col)
    pub fn ic(&self) -> (usize, usize) {
        (self.tcy, self.tcx)
    }

    pub fn goto_ic(&mut self) {
        self.cy = self.tcy;
        self.cx = self.tcx;
    }

    fn offset(&self, y: usize, x: usize) -> usize {
        y * self.width + x
    }

    /// Write `c` at the cursor and advance.
    pub fn addch(&mut self, c: u8) {
        let at = self.offset(self.cy, self.cx);
        self.data[at] = c;
        self.right(1);
    }

    /// Delete the character at the cursor, pulling the next `shift` cells
    /// left and nulling the last one.
    pub fn del(&mut self, shift: usize) {
        let at = self.offset(self.cy, self.cx);
        let end = (at + shift).min(self.data.len() - 1);
        self.data.copy_within(at + 1..=end, at);
        self.data[end] = 0;
    }

    /// Insert `c` at the cursor, pushing the next `shift` cells right. The
    /// cell that falls off the end is lost. The cursor advances by one.
    pub fn ins(&mut self, c: u8, shift: usize) {
        let at = self.offset(self.cy, self.cx);
        let end = (at + shift).min(self.data.len() - 1);
        self.data.copy_within(at..end, at + 1);
        self.data[at] = c;
        self.right(1);
    }

    /// Scroll rows `top..=bot` by `lines`; negative is up. Rows pushed past
    /// the range are lost and vacated rows keep their old contents.
    pub fn roll(&mut self, top: usize, bot: usize, lines: i32) {
        if lines == 0 || top > bot || bot >= self.height {
            return;
        }
        let w = self.width;
        let shift = lines.unsigned_abs() as usize;
        if lines < 0 {
            for n in top..=bot {
                if n >= top + shift {
                    let dest = n - shift;
                    self.data.copy_within(n * w..(n + 1) * w, dest * w);
                }
            }
        } else {
            for n in (top..=bot).rev() {
                if n + shift <= bot {
                    let dest = n + shift;
                    self.data.copy_within(n * w..(n + 1) * w, dest * w);
                }
            }
        }
    }

    pub fn char_at(&self, y: usize, x: usize) -> u8 {
        self.data[self.offset(y, x)]
    }

    /// Whole grid, row-major
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn row(&self, y: usize) -> &[u8] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn set_row(&mut self, y: usize, bytes: &[u8]) {
        let w = self.width;
        let n = bytes.len().min(w);
        self.data[y * w..y * w + n].copy_from_slice(&bytes[..n]);
    }

    /// Append a field to the format table and assign its id. The field is
    /// clipped to the end of the grid.
    pub fn add_field(&mut self, mut field: Field) -> FieldId {
        let id = self.fields.len();
        field.id = id;
        let room = self.data.len().saturating_sub(field.start_pos());
        if field.length > room {
            log::warn!("field {} truncated from {} to {} cells", id, field.length, room);
            field.length = room;
        }
        self.fields.push(field);
        id
    }

    /// Drop every field and the format table header.
    pub fn clear_table(&mut self) {
        self.fields.clear();
        self.master_mdt = false;
        self.header_data = None;
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id]
    }

    pub fn field_mut(&mut self, id: FieldId) -> &mut Field {
        &mut self.fields[id]
    }

    /// The field containing (`y`, `x`), if any.
    pub fn field_yx(&self, y: usize, x: usize) -> Option<FieldId> {
        self.fields.iter().position(|f| f.hit_test(y, x))
    }

    pub fn first_non_bypass(&self) -> Option<FieldId> {
        self.fields.iter().position(|f| !f.is_bypass())
    }

    /// Following field in table order, wrapping.
    pub fn next_id(&self, id: FieldId) -> FieldId {
        (id + 1) % self.fields.len()
    }

    /// Preceding field in table order, wrapping.
    pub fn prev_id(&self, id: FieldId) -> FieldId {
        (id + self.fields.len() - 1) % self.fields.len()
    }

    /// Set a field's MDT and the table's master MDT.
    pub fn set_mdt(&mut self, id: FieldId) {
        self.fields[id].set_mdt();
        self.master_mdt = true;
    }

    /// True once any field has been modified since the table was cleared.
    pub fn master_mdt(&self) -> bool {
        self.master_mdt
    }

    fn field_range(&self, id: FieldId) -> std::ops::Range<usize> {
        let field = &self.fields[id];
        let start = field.start_pos().min(self.data.len());
        start..(start + field.length).min(self.data.len())
    }

    pub fn field_data(&self, id: FieldId) -> &[u8] {
        let range = self.field_range(id);
        &self.data[range]
    }

    pub fn field_data_mut(&mut self, id: FieldId) -> &mut [u8] {
        let range = self.field_range(id);
        &mut self.data[range]
    }

    pub fn set_header_data(&mut self, data: Option<Vec<u8>>) {
        self.header_data = data.filter(|d| !d.is_empty());
    }

    pub fn header_data(&self) -> Option<&[u8]> {
        self.header_data.as_deref()
    }

    /// Whether field data goes with this AID. Format table header bytes
    /// 4-6 carry one bit per command key; a set bit suppresses the data.
    pub fn send_data_for_aid_key(&self, aid: u8) -> bool {
        let header = match &self.header_data {
            Some(h) if h.len() > 6 => h,
            _ => return true,
        };
        const MAP: [(u8, usize, u8); 24] = [
            (AID_F1, 6, 7),
            (AID_F2, 6, 6),
            (AID_F3, 6, 5),
            (AID_F4, 6, 4),
            (AID_F5, 6, 3),
            (AID_F6, 6, 2),
            (AID_F7, 6, 1),
            (AID_F8, 6, 0),
            (AID_F9, 5, 7),
            (AID_F10, 5, 6),
            (AID_F11, 5, 5),
            (AID_F12, 5, 4),
            (AID_F13, 5, 3),
            (AID_F14, 5, 2),
            (AID_F15, 5, 1),
            (AID_F16, 5, 0),
            (AID_F17, 4, 7),
            (AID_F18, 4, 6),
            (AID_F19, 4, 5),
            (AID_F20, 4, 4),
            (AID_F21, 4, 3),
            (AID_F22, 4, 2),
            (AID_F23, 4, 1),
            (AID_F24, 4, 0),
        ];
        match MAP.iter().find(|(k, _, _)| *k == aid) {
            Some(&(_, byte, bit)) => header[byte] & (0x80 >> bit) == 0,
            None => true,
        }
    }

    /// Row used for operator error messages: from the format table header
    /// if it names one, else the last row.
    pub fn msg_line(&self) -> usize {
        let last = self.height - 1;
        match &self.header_data {
            Some(h) if h.len() >= 4 && h[3] > 0 => (h[3] as usize - 1).min(last),
            _ => last,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_right_wraps_column_then_row() {
        let mut buf = DisplayBuffer::new(10, 5);
        buf.set_cursor(4, 9);
        buf.right(2);
        assert_eq!((buf.cursor_y(), buf.cursor_x()), (0, 1));
    }

    #[test]
    fn test_left_up_down_wrap() {
        let mut buf = DisplayBuffer::new(10, 5);
        buf.left();
        assert_eq!((buf.cursor_y(), buf.cursor_x()), (4, 9));
        buf.down();
        assert_eq!(buf.cursor_y(), 0);
        buf.up();
        assert_eq!(buf.cursor_y(), 4);
    }

    #[test]
    fn test_addch_and_char_at() {
        let mut buf = DisplayBuffer::new(80, 24);
        buf.set_cursor(1, 79);
        buf.addch(0xC1);
        assert_eq!(buf.char_at(1, 79), 0xC1);
        assert_eq!((buf.cursor_y(), buf.cursor_x()), (2, 0));
    }

    #[test]
    fn test_ins_and_del() {
        let mut buf = DisplayBuffer::new(10, 2);
        for c in [1u8, 2, 3, 4] {
            buf.addch(c);
        }
        buf.set_cursor(0, 1);
        buf.ins(9, 3);
        assert_eq!(&buf.row(0)[..6], &[1, 9, 2, 3, 4, 0]);
        assert_eq!(buf.cursor_x(), 2);
        buf.set_cursor(0, 1);
        buf.del(4);
        assert_eq!(&buf.row(0)[..6], &[1, 2, 3, 4, 0, 0]);
    }

    #[test]
    fn test_roll_up_and_down() {
        let mut buf = DisplayBuffer::new(2, 4);
        for row in 0..4u8 {
            buf.set_row(row as usize, &[row + 1, row + 1]);
        }
        buf.roll(0, 3, -1);
        assert_eq!(buf.as_bytes(), &[2, 2, 3, 3, 4, 4, 4, 4]);
        buf.roll(1, 3, 2);
        assert_eq!(buf.as_bytes(), &[2, 2, 3, 3, 4, 4, 3, 3]);
    }

    #[test]
    fn test_fields_and_lookup() {
        let mut buf = DisplayBuffer::new(80, 24);
        let a = buf.add_field(Field::with_layout(80, 2, 2, 10, 0x6000));
        let b = buf.add_field(Field::with_layout(80, 3, 2, 10, 0x4000));
        assert_eq!((a, b), (0, 1));
        assert_eq!(buf.field_yx(2, 11), Some(a));
        assert_eq!(buf.field_yx(2, 12), None);
        assert_eq!(buf.first_non_bypass(), Some(b));
        assert_eq!(buf.next_id(b), a);
        assert_eq!(buf.prev_id(a), b);
        assert!(!buf.master_mdt());
        buf.set_mdt(b);
        assert!(buf.master_mdt() && buf.field(b).mdt());
        buf.clear_table();
        assert_eq!(buf.field_count(), 0);
        assert!(!buf.master_mdt());
    }

    #[test]
    fn test_field_clipped_to_grid() {
        let mut buf = DisplayBuffer::new(10, 2);
        let id = buf.add_field(Field::with_layout(10, 1, 5, 20, 0x4000));
        assert_eq!(buf.field(id).length, 5);
        assert_eq!(buf.field_data(id).len(), 5);
    }

    #[test]
    fn test_header_data_controls_aid_data_and_msg_line() {
        let mut buf = DisplayBuffer::new(80, 24);
        assert!(buf.send_data_for_aid_key(AID_F3));
        assert_eq!(buf.msg_line(), 23);
        buf.set_header_data(Some(vec![0, 0, 0, 22, 0, 0, 0x20]));
        assert!(!buf.send_data_for_aid_key(AID_F3));
        assert!(buf.send_data_for_aid_key(AID_F4));
        assert_eq!(buf.msg_line(), 21);
    }
}
