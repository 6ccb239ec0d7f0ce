//! Write To Display encoder
//!
//! Turns a display buffer back into the command stream that would draw it,
//! for Save Screen. Runs of one byte are folded into Repeat To Address
//! orders, and runs of nulls after the clear are skipped with Set Buffer
//! Address. Every field is re-created with a Start Of Field order placed
//! in the cell holding its leading attribute; a field at the first cell
//! keeps its attribute in the last cell and is defined before anything
//! else is drawn. Bytes that would read back as orders go out as
//! Transparent Data.
//!
//! Only a full redraw is produced; there is no encoding relative to an
//! earlier screen.

use crate::ebcdic::CharMap;
use crate::lib5250::buffer::DisplayBuffer;
use crate::lib5250::codes::{
    CMD_CLEAR_UNIT, CMD_CLEAR_UNIT_ALTERNATE, CMD_RESTORE_SCREEN, CMD_WRITE_TO_DISPLAY, ESC, IC, RA, SBA, SF, SOH, TD,
};
use crate::lib5250::field::Field;

/// Runs longer than this are cheaper as an order than as literal bytes.
const MAX_LITERAL_RUN: usize = 4;

pub struct WtdContext<'a> {
    buffer: &'a DisplayBuffer,
    map: CharMap,
    out: Vec<u8>,
    /// Insert cursor, zero-based
    ic: (usize, usize),
    /// Cell being encoded
    y: usize,
    x: usize,
    ra_char: u8,
    ra_count: usize,
    clear_unit: bool,
}

impl<'a> WtdContext<'a> {
    pub fn new(buffer: &'a DisplayBuffer) -> Self {
        Self {
            buffer,
            map: CharMap::default(),
            out: Vec::with_capacity(buffer.width() * buffer.height() / 2),
            ic: (0, 0),
            y: 0,
            x: 0,
            ra_char: 0,
            ra_count: 0,
            clear_unit: false,
        }
    }

    /// Where the insert cursor should land when the stream is replayed.
    pub fn set_ic(&mut self, y: usize, x: usize) {
        self.ic = (y, x);
    }

    /// Character map deciding which bytes can be sent as plain data.
    pub fn set_char_map(&mut self, map: CharMap) {
        self.map = map;
    }

    /// Encode the whole buffer.
    pub fn convert(mut self) -> Vec<u8> {
        let buf = self.buffer;
        log::debug!("wtd: encoding {}x{} screen, {} fields", buf.width(), buf.height(), buf.field_count());

        self.putc(ESC);
        self.putc(CMD_RESTORE_SCREEN);

        // The prior state of the unit is unknown, so start from a clear.
        self.putc(ESC);
        if buf.width() != 80 {
            self.putc(CMD_CLEAR_UNIT_ALTERNATE);
            self.putc(0x00);
        } else {
            self.putc(CMD_CLEAR_UNIT);
        }
        self.clear_unit = true;

        self.putc(ESC);
        self.putc(CMD_WRITE_TO_DISPLAY);
        self.putc(0x00); // CC1
        self.putc(0x00); // CC2

        self.putc(IC);
        self.putc(address(self.ic.0));
        self.putc(address(self.ic.1));

        if let Some(header) = buf.header_data() {
            self.putc(SOH);
            self.putc(header.len() as u8);
            for &b in header {
                self.putc(b);
            }
        }

        if let Some(field) = self.field_starting_at(0, 0) {
            let (ly, lx) = (buf.height() - 1, buf.width() - 1);
            self.putc(SBA);
            self.putc(address(ly));
            self.putc(address(lx));
            self.write_field(field, buf.char_at(ly, lx));
        }

        for y in 0..buf.height() {
            for x in 0..buf.width() {
                self.y = y;
                self.x = x;
                let c = buf.char_at(y, x);
                match self.peek_field() {
                    Some(field) => self.write_field(field, c),
                    None => self.ra_putc(c),
                }
            }
        }

        // Trailing run: past the last cell.
        self.y = buf.height();
        self.x = 0;
        self.finish_run();

        log::trace!("wtd: {} bytes", self.out.len());
        self.out
    }

    /// The field starting in the cell after the current one. The field at
    /// the first cell was defined up front, so the last cell finds nothing.
    fn peek_field(&self) -> Option<&'a Field> {
        let buf = self.buffer;
        let (mut ny, mut nx) = (self.y, self.x + 1);
        if nx == buf.width() {
            ny += 1;
            nx = 0;
            if ny == buf.height() {
                return None;
            }
        }
        self.field_starting_at(ny, nx)
    }

    fn field_starting_at(&self, y: usize, x: usize) -> Option<&'a Field> {
        let buf = self.buffer;
        let field = buf.field(buf.field_yx(y, x)?);
        (field.start_row == y && field.start_col == x).then_some(field)
    }

    fn putc(&mut self, c: u8) {
        self.ra_flush();
        self.out.push(c);
    }

    fn ra_putc(&mut self, c: u8) {
        if self.ra_char != c {
            self.ra_flush();
        }
        self.ra_char = c;
        self.ra_count += 1;
    }

    /// Emit the pending run. The current cell is the first one after it.
    fn ra_flush(&mut self) {
        if self.ra_count == 0 {
            return;
        }
        if self.literal_is_shorter() {
            self.emit_literal();
        } else if self.clear_unit && self.ra_char == 0x00 {
            // Already null after the clear; just move past the run.
            self.out.extend_from_slice(&[SBA, address(self.y), address(self.x)]);
        } else {
            let (py, px) = self.previous_cell();
            self.out.extend_from_slice(&[RA, address(py), address(px), self.ra_char]);
        }
        self.ra_count = 0;
    }

    /// Flush the run that reaches the end of the screen. Nothing follows
    /// it, so a null run after the clear needs no order at all.
    fn finish_run(&mut self) {
        if self.ra_count == 0 {
            return;
        }
        if self.clear_unit && self.ra_char == 0x00 {
            self.ra_count = 0;
        } else {
            self.ra_flush();
        }
    }

    fn literal_is_shorter(&self) -> bool {
        self.ra_count <= MAX_LITERAL_RUN && !(self.ra_count == 3 && self.ra_char == 0x00 && self.clear_unit)
    }

    fn emit_literal(&mut self) {
        if !self.map.printable(self.ra_char) {
            self.out.push(TD);
            self.out.extend_from_slice(&(self.ra_count as u16).to_be_bytes());
        }
        let run = std::iter::repeat(self.ra_char).take(self.ra_count);
        self.out.extend(run);
    }

    fn previous_cell(&self) -> (usize, usize) {
        if self.x == 0 {
            (self.y.saturating_sub(1), self.buffer.width() - 1)
        } else {
            (self.y, self.x - 1)
        }
    }

    /// Start Of Field in place of the attribute cell `attr`.
    fn write_field(&mut self, field: &Field, attr: u8) {
        log::trace!("wtd: {}", field);
        self.putc(SF);
        if field.ffw != 0 {
            self.putc((field.ffw >> 8) as u8);
            self.putc((field.ffw & 0xFF) as u8);
            if field.fcw != 0 {
                self.putc((field.fcw >> 8) as u8);
                self.putc((field.fcw & 0xFF) as u8);
            }
        }
        // The cell may have been overwritten since the field was defined;
        // fall back to the attribute the field was created with.
        if attr & 0xE0 == 0x20 {
            self.putc(attr);
        } else {
            self.putc(field.attribute);
        }
        self.putc((field.length >> 8) as u8);
        self.putc((field.length & 0xFF) as u8);
    }
}

/// One-based screen address byte
fn address(n: usize) -> u8 {
    (n + 1) as u8
}
