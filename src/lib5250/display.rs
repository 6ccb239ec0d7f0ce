//! Display: the screen a session draws on
//!
//! Wraps the current [`DisplayBuffer`] with the operator indicators, the
//! type-ahead key queue, the saved message line and the attached
//! [`Terminal`]. Keyboard editing (the `kf_*` functions) lives here too:
//! [`Display::do_key`] applies a key to the screen and returns the AID the
//! session must act on, if the key produced one.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use crate::ebcdic::{CharMap, EBCDIC_DUP};
use crate::error::TN5250Result;
use crate::lib5250::buffer::{DisplayBuffer, FieldId};
use crate::lib5250::codes::{aid_for_function_key, AID_ENTER, AID_HELP, AID_PRINT, AID_RECORD_BS, AID_ROLL_DOWN, AID_ROLL_UP};
use crate::lib5250::field::AdjustMode;
use crate::lib5250::wtd::WtdContext;
use crate::terminal::{Key, Terminal};

// Display indicator flags
pub const TN5250_DISPLAY_IND_INHIBIT: u32 = 0x0001;
pub const TN5250_DISPLAY_IND_MESSAGE_WAITING: u32 = 0x0002;
pub const TN5250_DISPLAY_IND_X_SYSTEM: u32 = 0x0004;
pub const TN5250_DISPLAY_IND_X_CLOCK: u32 = 0x0008;
pub const TN5250_DISPLAY_IND_INSERT: u32 = 0x0010;
pub const TN5250_DISPLAY_IND_FER: u32 = 0x0020;

/// Keys typed ahead while the keyboard is locked
pub const KEY_QUEUE_SIZE: usize = 100;

/// What a key asks the session to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AidKey {
    /// A real attention identifier byte
    Code(u8),
    SysReq,
    Attention,
}

impl AidKey {
    /// System Request and Attention are sent even outside a read.
    pub fn is_pseudo(self) -> bool {
        matches!(self, AidKey::SysReq | AidKey::Attention)
    }
}

pub struct Display {
    buffer: DisplayBuffer,
    terminal: Option<Box<dyn Terminal>>,
    map: CharMap,
    indicators: u32,
    indicators_dirty: bool,
    pending_insert: bool,
    saved_msg_line: Option<Vec<u8>>,
    key_queue: VecDeque<Key>,
}

impl fmt::Debug for Display {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Display")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("cursor", &(self.cursor_y(), self.cursor_x()))
            .field("indicators", &format_args!("0x{:02X}", self.indicators))
            .field("fields", &self.buffer.field_count())
            .field("queued_keys", &self.key_queue.len())
            .field("terminal", &self.terminal.is_some())
            .finish()
    }
}

impl Default for Display {
    fn default() -> Self {
        Self::new()
    }
}

impl Display {
    /// A 24x80 display with the default character map and no terminal.
    pub fn new() -> Self {
        Self::with_char_map(CharMap::default())
    }

    pub fn with_char_map(map: CharMap) -> Self {
        Self {
            buffer: DisplayBuffer::new(80, 24),
            terminal: None,
            map,
            indicators: 0,
            indicators_dirty: false,
            pending_insert: false,
            saved_msg_line: None,
            key_queue: VecDeque::with_capacity(KEY_QUEUE_SIZE),
        }
    }

    pub fn set_terminal(&mut self, terminal: Box<dyn Terminal>) {
        self.terminal = Some(terminal);
        self.indicators_dirty = true;
    }

    pub fn take_terminal(&mut self) -> Option<Box<dyn Terminal>> {
        self.terminal.take()
    }

    pub fn has_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn buffer(&self) -> &DisplayBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut DisplayBuffer {
        &mut self.buffer
    }

    pub fn char_map(&self) -> &CharMap {
        &self.map
    }

    pub fn set_char_map(&mut self, map: CharMap) {
        self.map = map;
    }

    pub fn width(&self) -> usize {
        self.buffer.width()
    }

    pub fn height(&self) -> usize {
        self.buffer.height()
    }

    pub fn cursor_x(&self) -> usize {
        self.buffer.cursor_x()
    }

    pub fn cursor_y(&self) -> usize {
        self.buffer.cursor_y()
    }

    pub fn set_cursor(&mut self, y: usize, x: usize) {
        self.buffer.set_cursor(y, x);
    }

    pub fn char_at(&self, y: usize, x: usize) -> u8 {
        self.buffer.char_at(y, x)
    }

    pub fn addch(&mut self, c: u8) {
        self.buffer.addch(c);
    }

    pub fn msg_line(&self) -> usize {
        self.buffer.msg_line()
    }

    // ===== Terminal plumbing =====

    /// Redraw the terminal, and its indicators if they changed.
    pub fn update(&mut self) {
        if let Some(mut term) = self.terminal.take() {
            term.update(self);
            if self.indicators_dirty {
                term.update_indicators(self);
                self.indicators_dirty = false;
            }
            self.terminal = Some(term);
        }
    }

    pub fn beep(&mut self) {
        if let Some(term) = self.terminal.as_mut() {
            term.beep();
        }
    }

    /// Wait for a terminal event. Without a terminal nothing ever happens.
    pub fn terminal_wait_event(&mut self, timeout: Duration) -> TN5250Result<u32> {
        match self.terminal.as_mut() {
            Some(term) => term.wait_event(timeout),
            None => Ok(0),
        }
    }

    pub fn get_key(&mut self) -> Option<Key> {
        self.terminal.as_mut().and_then(|t| t.get_key())
    }

    /// The screen as local text, attributes shown as blanks.
    pub fn screen_lines(&self) -> Vec<String> {
        (0..self.height())
            .map(|y| {
                self.buffer
                    .row(y)
                    .iter()
                    .map(|&b| if self.map.attribute(b) { ' ' } else { self.map.to_local(b) as char })
                    .collect()
            })
            .collect()
    }

    /// Short text form of the indicators for line-mode front ends.
    pub fn indicator_text(&self) -> String {
        let mut parts = Vec::new();
        for (bit, name) in [
            (TN5250_DISPLAY_IND_X_SYSTEM, "X SYSTEM"),
            (TN5250_DISPLAY_IND_X_CLOCK, "X CLOCK"),
            (TN5250_DISPLAY_IND_INHIBIT, "X II"),
            (TN5250_DISPLAY_IND_MESSAGE_WAITING, "MW"),
            (TN5250_DISPLAY_IND_INSERT, "INS"),
            (TN5250_DISPLAY_IND_FER, "FER"),
        ] {
            if self.indicators & bit != 0 {
                parts.push(name);
            }
        }
        parts.join(" ")
    }

    // ===== Indicators =====

    pub fn indicators(&self) -> u32 {
        self.indicators
    }

    pub fn indicator_set(&mut self, inds: u32) {
        self.indicators |= inds;
        self.indicators_dirty = true;
    }

    /// Clear indicators. Clearing INHIBIT puts back the message line saved
    /// by Write Error Code.
    pub fn indicator_clear(&mut self, inds: u32) {
        self.indicators &= !inds;
        self.indicators_dirty = true;
        if inds & TN5250_DISPLAY_IND_INHIBIT != 0 {
            if let Some(line) = self.saved_msg_line.take() {
                let l = self.buffer.msg_line();
                self.buffer.set_row(l, &line);
            }
        }
    }

    pub fn inhibited(&self) -> bool {
        self.indicators & TN5250_DISPLAY_IND_INHIBIT != 0
    }

    pub fn inhibit(&mut self) {
        self.indicator_set(TN5250_DISPLAY_IND_INHIBIT);
    }

    pub fn uninhibit(&mut self) {
        self.indicator_clear(TN5250_DISPLAY_IND_INHIBIT);
    }

    fn x_system(&self) -> bool {
        self.indicators & TN5250_DISPLAY_IND_X_SYSTEM != 0
    }

    pub fn save_msg_line(&mut self) {
        let l = self.buffer.msg_line();
        self.saved_msg_line = Some(self.buffer.row(l).to_vec());
    }

    // ===== Key queue =====

    /// Queue a key typed while the keyboard is locked. A full queue beeps
    /// and drops the key.
    pub fn queue_key(&mut self, key: Key) -> bool {
        if self.key_queue.len() >= KEY_QUEUE_SIZE {
            log::warn!("key queue full, dropping {:?}", key);
            self.beep();
            return false;
        }
        self.key_queue.push_back(key);
        true
    }

    /// Next queued key, unless the keyboard is still locked.
    pub fn dequeue_key(&mut self) -> Option<Key> {
        if self.x_system() {
            return None;
        }
        self.key_queue.pop_front()
    }

    pub fn flush_key_queue(&mut self) {
        self.key_queue.clear();
    }

    pub fn queued_keys(&self) -> usize {
        self.key_queue.len()
    }

    // ===== Clears =====

    fn reset_unit(&mut self) {
        self.indicator_set(TN5250_DISPLAY_IND_X_SYSTEM);
        self.indicator_clear(TN5250_DISPLAY_IND_INSERT | TN5250_DISPLAY_IND_INHIBIT | TN5250_DISPLAY_IND_FER);
        self.pending_insert = false;
        self.buffer.set_ic(0, 0);
        self.saved_msg_line = None;
    }

    /// Clear to a 24x80 screen and lock the keyboard.
    pub fn clear_unit(&mut self) {
        self.buffer.set_size(24, 80);
        self.reset_unit();
    }

    /// Clear to a 27x132 screen and lock the keyboard.
    pub fn clear_unit_alternate(&mut self) {
        self.buffer.set_size(27, 132);
        self.reset_unit();
    }

    pub fn clear_format_table(&mut self) {
        self.buffer.clear_table();
        self.buffer.set_cursor(0, 0);
        self.indicator_set(TN5250_DISPLAY_IND_X_SYSTEM);
        self.indicator_clear(TN5250_DISPLAY_IND_INSERT);
    }

    // ===== Cursor and fields =====

    pub fn pending_insert(&self) -> bool {
        self.pending_insert
    }

    /// Remember an insert cursor target for the next home.
    pub fn set_pending_insert(&mut self, y: usize, x: usize) {
        self.pending_insert = true;
        self.buffer.set_ic(y, x);
    }

    pub fn field_at(&self, y: usize, x: usize) -> Option<FieldId> {
        self.buffer.field_yx(y, x)
    }

    pub fn current_field(&self) -> Option<FieldId> {
        self.field_at(self.cursor_y(), self.cursor_x())
    }

    /// Next non-bypass field after the cursor, wrapping. From outside a
    /// field this is the first field at or after the cursor.
    pub fn next_field(&self) -> Option<FieldId> {
        let buf = &self.buffer;
        let first = match self.current_field() {
            Some(id) => buf.next_id(id),
            None => {
                let pos = self.cursor_y() * self.width() + self.cursor_x();
                buf.fields()
                    .iter()
                    .filter(|f| f.length > 0)
                    .min_by_key(|f| (f.start_pos() < pos, f.start_pos()))?
                    .id
            }
        };
        self.skip_bypass(first, |id| buf.next_id(id))
    }

    /// Previous non-bypass field before the cursor, wrapping.
    pub fn prev_field(&self) -> Option<FieldId> {
        let buf = &self.buffer;
        let first = match self.current_field() {
            Some(id) => buf.prev_id(id),
            None => {
                let pos = self.cursor_y() * self.width() + self.cursor_x();
                buf.fields()
                    .iter()
                    .rev()
                    .filter(|f| f.length > 0)
                    .max_by_key(|f| (f.end_pos() < pos, f.end_pos()))?
                    .id
            }
        };
        self.skip_bypass(first, |id| buf.prev_id(id))
    }

    fn skip_bypass(&self, first: FieldId, step: impl Fn(FieldId) -> FieldId) -> Option<FieldId> {
        let mut id = first;
        while self.buffer.field(id).is_bypass() {
            id = step(id);
            if id == first {
                return None;
            }
        }
        Some(id)
    }

    /// Home position: the pending insert cursor if there is one, else the
    /// first non-bypass field, else the top left corner.
    pub fn set_cursor_home(&mut self) {
        if self.pending_insert {
            self.buffer.goto_ic();
            self.pending_insert = false;
        } else {
            let (y, x) = self.home_position();
            self.buffer.set_cursor(y, x);
        }
    }

    fn home_position(&self) -> (usize, usize) {
        match self.buffer.first_non_bypass() {
            Some(id) => {
                let f = self.buffer.field(id);
                (f.start_row, f.start_col)
            }
            None => (0, 0),
        }
    }

    pub fn set_cursor_field(&mut self, field: Option<FieldId>) {
        match field {
            Some(id) => {
                let f = self.buffer.field(id);
                let (y, x) = (f.start_row, f.start_col);
                self.buffer.set_cursor(y, x);
            }
            None => self.set_cursor_home(),
        }
    }

    pub fn set_cursor_next_field(&mut self) {
        let next = self.next_field();
        self.set_cursor_field(next);
    }

    pub fn set_cursor_prev_field(&mut self) {
        let prev = self.prev_field();
        self.set_cursor_field(prev);
    }

    /// Encode the screen as a Write To Display stream that recreates it,
    /// with the insert cursor at the current cursor position.
    pub fn make_wtd_data(&self) -> Vec<u8> {
        let mut ctx = WtdContext::new(&self.buffer);
        ctx.set_char_map(self.map);
        ctx.set_ic(self.cursor_y(), self.cursor_x());
        ctx.convert()
    }

    // ===== Keyboard =====

    /// Apply one key. Returns the AID the session should send, if any.
    pub fn do_key(&mut self, key: Key) -> Option<AidKey> {
        log::trace!("do_key: {:?}", key);
        if self.inhibited() && key != Key::SysReq && key != Key::Reset {
            self.beep();
            return None;
        }

        // With field exit required only a few keys are allowed.
        let mut pre_fer_clear = false;
        if self.indicators & TN5250_DISPLAY_IND_FER != 0 {
            match key {
                Key::Left | Key::Backspace => {
                    self.indicator_clear(TN5250_DISPLAY_IND_FER);
                    return None;
                }
                Key::FieldExit | Key::FieldMinus | Key::FieldPlus | Key::Tab | Key::BackTab | Key::Reset => {
                    pre_fer_clear = true;
                }
                _ => {
                    self.inhibit();
                    return None;
                }
            }
        }

        let aid = match key {
            Key::Reset => {
                self.uninhibit();
                None
            }
            Key::Backspace => self.kf_backspace(),
            Key::Left => {
                self.buffer.left();
                None
            }
            Key::Right => {
                self.buffer.right(1);
                None
            }
            Key::Up => {
                self.buffer.up();
                None
            }
            Key::Down => {
                self.buffer.down();
                None
            }
            Key::Help => Some(AidKey::Code(AID_HELP)),
            Key::Home => self.kf_home(),
            Key::End => self.kf_end(),
            Key::Delete => self.kf_delete(),
            Key::Insert => self.kf_insert(),
            Key::Tab => {
                self.set_cursor_next_field();
                None
            }
            Key::BackTab => self.kf_backtab(),
            Key::Enter => Some(AidKey::Code(AID_ENTER)),
            Key::RollDown => Some(AidKey::Code(AID_ROLL_DOWN)),
            Key::RollUp => Some(AidKey::Code(AID_ROLL_UP)),
            Key::FieldExit => self.kf_field_exit(),
            Key::FieldPlus => self.kf_field_plus(),
            Key::FieldMinus => self.kf_field_minus(),
            Key::SysReq => Some(AidKey::SysReq),
            Key::Attention => Some(AidKey::Attention),
            Key::Print => Some(AidKey::Code(AID_PRINT)),
            Key::Dup => self.kf_dup(),
            Key::F(n) => match aid_for_function_key(n) {
                Some(aid) => Some(AidKey::Code(aid)),
                None => {
                    log::debug!("weird function key F{}", n);
                    None
                }
            },
            Key::Char(ch) => self.interactive_addch(ch),
        };

        if pre_fer_clear {
            self.indicator_clear(TN5250_DISPLAY_IND_FER);
        }
        aid
    }

    /// Leave a field: auto-enter fields send Enter, others move on.
    fn exit_field(&mut self, id: FieldId) -> Option<AidKey> {
        if self.buffer.field(id).is_auto_enter() {
            return Some(AidKey::Code(AID_ENTER));
        }
        self.set_cursor_next_field();
        None
    }

    /// Current field if it accepts data; otherwise inhibit.
    fn input_field(&mut self) -> Option<FieldId> {
        match self.current_field() {
            Some(id) if !self.buffer.field(id).is_bypass() => Some(id),
            _ => {
                self.inhibit();
                None
            }
        }
    }

    /// Type a data character at the cursor.
    pub fn interactive_addch(&mut self, ch: u8) -> Option<AidKey> {
        let id = self.input_field()?;
        let field = self.buffer.field(id).clone();

        let ch = if field.is_monocase() { ch.to_ascii_uppercase() } else { ch };

        // In numeric fields '+' and '-' are Field+ and Field-.
        if field.is_num_only() || field.is_signed_num() {
            match ch {
                b'+' => return self.kf_field_plus(),
                b'-' => return self.kf_field_minus(),
                _ => {}
            }
        }

        if !field.valid_char(ch) {
            self.inhibit();
            return None;
        }

        let (y, x) = (self.cursor_y(), self.cursor_x());
        let end_of_field = y == field.end_row() && x == field.end_col();

        // The last position of a signed numeric field holds the sign.
        if end_of_field && field.is_signed_num() {
            self.inhibit();
            return None;
        }

        let remote = self.map.to_remote(ch);
        if self.indicators & TN5250_DISPLAY_IND_INSERT != 0 {
            let mut ofs = field.length - 1;
            if field.is_signed_num() {
                ofs = ofs.saturating_sub(1);
            }
            let last = self.buffer.field_data(id).get(ofs).copied().unwrap_or(0);
            if last != 0 && self.map.to_local(last) != b' ' {
                self.inhibit();
                return None;
            }
            self.buffer.ins(remote, field.count_right(y, x));
        } else {
            self.buffer.addch(remote);
        }
        self.buffer.set_mdt(id);

        if end_of_field {
            if field.is_fer() {
                self.indicator_set(TN5250_DISPLAY_IND_FER);
                self.buffer.set_cursor(field.end_row(), field.end_col());
            } else {
                self.field_adjust(id);
                return self.exit_field(id);
            }
        }
        None
    }

    /// Right-justify the field contents, filling vacated leading cells
    /// with `fill`. The sign position of a signed field is left alone.
    pub fn shift_right(&mut self, id: FieldId, fill: u8) {
        let signed = self.buffer.field(id).is_signed_num();
        self.buffer.set_mdt(id);
        let data = self.buffer.field_data_mut(id);
        if data.is_empty() {
            return;
        }
        let mut end = data.len() - 1;
        if signed {
            if end == 0 {
                return;
            }
            end -= 1;
        }
        let blank = |b: u8| b == 0 || b == 0x40;

        let mut n = 0;
        while n <= end && blank(data[n]) {
            data[n] = fill;
            n += 1;
        }
        if n > end {
            return;
        }
        while blank(data[end]) {
            data.copy_within(0..end, 1);
            data[0] = fill;
        }
    }

    /// Apply the field's adjust mode. Numeric-only and signed numeric
    /// fields are always right adjusted with blank fill. Mandatory fill
    /// is accepted and does nothing.
    pub fn field_adjust(&mut self, id: FieldId) {
        let field = self.buffer.field(id);
        let mode = if field.is_signed_num() || field.is_num_only() {
            AdjustMode::RightBlankFill
        } else {
            field.adjust()
        };
        match mode {
            AdjustMode::RightZeroFill => self.shift_right(id, self.map.to_remote(b'0')),
            AdjustMode::RightBlankFill => self.shift_right(id, self.map.to_remote(b' ')),
            AdjustMode::NoAdjust | AdjustMode::MandatoryFill | AdjustMode::Reserved(_) => {}
        }
        self.buffer.set_mdt(id);
    }

    /// Null the field from the cursor on (sparing a sign position), then
    /// adjust it. Nothing is nulled while FER is set.
    pub fn field_pad_and_adjust(&mut self, id: FieldId) {
        if self.indicators & TN5250_DISPLAY_IND_FER == 0 {
            let (y, x) = (self.cursor_y(), self.cursor_x());
            let field = self.buffer.field(id);
            let start = field.count_left(y, x);
            let end = if field.is_signed_num() { field.length - 1 } else { field.length };
            let data = self.buffer.field_data_mut(id);
            let end = end.min(data.len());
            if start < end {
                data[start..end].fill(0);
            }
        }
        self.field_adjust(id);
    }

    pub fn kf_field_exit(&mut self) -> Option<AidKey> {
        let id = self.input_field()?;
        self.field_pad_and_adjust(id);
        self.exit_field(id)
    }

    pub fn kf_field_plus(&mut self) -> Option<AidKey> {
        let id = self.input_field()?;
        self.field_pad_and_adjust(id);
        if self.buffer.field(id).is_signed_num() {
            if let Some(sign) = self.buffer.field_data_mut(id).last_mut() {
                *sign = 0;
            }
        }
        self.exit_field(id)
    }

    pub fn kf_field_minus(&mut self) -> Option<AidKey> {
        let id = match self.current_field() {
            Some(id) if self.buffer.field(id).is_signed_num() || self.buffer.field(id).is_num_only() => id,
            _ => {
                self.inhibit();
                return None;
            }
        };
        self.field_pad_and_adjust(id);

        if self.buffer.field(id).is_num_only() {
            let zone = self.map.to_remote(b'}');
            let full = self.buffer.field_data(id).first().map_or(false, |&b| b != 0 && b != 0x40);
            if full {
                self.inhibit();
            } else {
                let data = self.buffer.field_data_mut(id);
                if let Some(last) = data.len().checked_sub(1) {
                    data.copy_within(1.., 0);
                    data[last] = zone;
                }
            }
        } else {
            let minus = self.map.to_remote(b'-');
            if let Some(sign) = self.buffer.field_data_mut(id).last_mut() {
                *sign = minus;
            }
        }
        self.exit_field(id)
    }

    pub fn kf_dup(&mut self) -> Option<AidKey> {
        let id = self.input_field()?;
        self.buffer.set_mdt(id);
        let field = self.buffer.field(id).clone();
        if !field.is_dup_enable() {
            self.inhibit();
            return None;
        }
        let start = field.count_left(self.cursor_y(), self.cursor_x());
        if let Some(tail) = self.buffer.field_data_mut(id).get_mut(start..) {
            tail.fill(EBCDIC_DUP);
        }
        if field.is_fer() {
            self.indicator_set(TN5250_DISPLAY_IND_FER);
            self.buffer.set_cursor(field.end_row(), field.end_col());
            None
        } else {
            self.field_adjust(id);
            self.exit_field(id)
        }
    }

    /// Backspace moves left; from the first cell of a field it goes to the
    /// last cell of the previous one.
    pub fn kf_backspace(&mut self) -> Option<AidKey> {
        let Some(id) = self.current_field() else {
            self.inhibit();
            return None;
        };
        let field = self.buffer.field(id);
        if self.cursor_y() == field.start_row && self.cursor_x() == field.start_col {
            if let Some(prev) = self.prev_field() {
                self.set_cursor_field(Some(prev));
                let len = self.buffer.field(prev).length;
                if len > 1 {
                    self.buffer.right(len - 1);
                }
            }
        } else {
            self.buffer.left();
        }
        None
    }

    pub fn kf_insert(&mut self) -> Option<AidKey> {
        if self.indicators & TN5250_DISPLAY_IND_INSERT != 0 {
            self.indicator_clear(TN5250_DISPLAY_IND_INSERT);
        } else {
            self.indicator_set(TN5250_DISPLAY_IND_INSERT);
        }
        None
    }

    /// Start of this field, or of the previous field if already there.
    pub fn kf_backtab(&mut self) -> Option<AidKey> {
        let (y, x) = (self.cursor_y(), self.cursor_x());
        let field = match self.current_field() {
            Some(id) if self.buffer.field(id).count_left(y, x) > 0 => Some(id),
            _ => self.prev_field(),
        };
        self.set_cursor_field(field);
        None
    }

    /// Just past the last non-null character of the field, or its last
    /// cell when the field is full.
    pub fn kf_end(&mut self) -> Option<AidKey> {
        let id = self.input_field()?;
        let field = self.buffer.field(id);
        let data = self.buffer.field_data(id);
        let Some(&last) = data.last() else {
            return None;
        };
        let (y, x) = if last == 0 {
            let mut i = data.len() - 1;
            while i > 0 && data[i] == 0 {
                i -= 1;
            }
            let cells = self.width() * self.height();
            let pos = (field.start_pos() + i + 1) % cells;
            (pos / self.width(), pos % self.width())
        } else {
            (field.end_row(), field.end_col())
        };
        self.buffer.set_cursor(y, x);
        None
    }

    /// Go home; if already there, send Record Backspace.
    pub fn kf_home(&mut self) -> Option<AidKey> {
        let (gy, gx) = if self.pending_insert {
            self.buffer.ic()
        } else {
            self.home_position()
        };
        if (gy, gx) == (self.cursor_y(), self.cursor_x()) {
            return Some(AidKey::Code(AID_RECORD_BS));
        }
        self.buffer.set_cursor(gy, gx);
        None
    }

    pub fn kf_delete(&mut self) -> Option<AidKey> {
        let id = self.input_field()?;
        self.buffer.set_mdt(id);
        let shift = self.buffer.field(id).count_right(self.cursor_y(), self.cursor_x());
        self.buffer.del(shift);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib5250::field::{Field, FFW_AUTO_ENTER, FFW_DUP_ENABLE, FFW_FER, FFW_MONOCASE};
    use crate::terminal::HeadlessTerminal;

    const INPUT: u16 = 0x4000;

    fn display_with(fields: &[(usize, usize, usize, u16)]) -> Display {
        let mut display = Display::new();
        for &(row, col, len, ffw) in fields {
            display.buffer_mut().add_field(Field::with_layout(80, row, col, len, ffw));
        }
        display
    }

    fn type_str(display: &mut Display, text: &str) {
        for b in text.bytes() {
            assert_eq!(display.do_key(Key::Char(b)), None);
        }
    }

    fn field_text(display: &Display, id: FieldId) -> String {
        display.char_map().to_local_string(display.buffer().field_data(id))
    }

    #[test]
    fn test_typing_sets_mdt_and_advances() {
        let mut display = display_with(&[(1, 10, 3, INPUT), (2, 10, 5, INPUT)]);
        display.set_cursor(1, 10);
        type_str(&mut display, "abc");
        assert_eq!(field_text(&display, 0), "abc");
        assert!(display.buffer().field(0).mdt());
        assert!(display.buffer().master_mdt());
        assert_eq!((display.cursor_y(), display.cursor_x()), (2, 10));
    }

    #[test]
    fn test_typing_outside_field_inhibits_until_reset() {
        let handle = HeadlessTerminal::default();
        let mut display = display_with(&[(1, 10, 3, INPUT)]);
        display.set_terminal(Box::new(handle.clone()));
        display.do_key(Key::Char(b'x'));
        assert!(display.inhibited());
        display.do_key(Key::Char(b'y'));
        assert_eq!(handle.beeps(), 1);
        display.do_key(Key::Reset);
        assert!(!display.inhibited());
    }

    #[test]
    fn test_monocase_and_digits_only() {
        let mut display = display_with(&[(0, 1, 4, INPUT | FFW_MONOCASE), (1, 1, 4, INPUT | 0x0500)]);
        display.set_cursor(0, 1);
        type_str(&mut display, "ab");
        assert_eq!(&field_text(&display, 0)[..2], "AB");
        display.set_cursor(1, 1);
        display.do_key(Key::Char(b'x'));
        assert!(display.inhibited());
    }

    #[test]
    fn test_signed_field_minus_and_sign_position() {
        let mut display = display_with(&[(3, 1, 5, INPUT | 0x0700)]);
        display.set_cursor(3, 1);
        type_str(&mut display, "12");
        assert_eq!(display.do_key(Key::FieldMinus), None);
        let data = display.buffer().field_data(0);
        assert_eq!(data, &[0x40, 0x40, 0xF1, 0xF2, 0x60]);
        assert!(display.buffer().field(0).mdt());
    }

    #[test]
    fn test_sign_position_is_protected() {
        let mut display = display_with(&[(3, 1, 3, INPUT | 0x0700)]);
        display.set_cursor(3, 3);
        display.do_key(Key::Char(b'1'));
        assert!(display.inhibited());
    }

    #[test]
    fn test_field_exit_right_zero_fill() {
        let mut display = display_with(&[(0, 1, 5, INPUT | 0x0005), (1, 1, 5, INPUT)]);
        display.set_cursor(0, 1);
        type_str(&mut display, "42");
        display.do_key(Key::FieldExit);
        assert_eq!(field_text(&display, 0), "00042");
        assert_eq!((display.cursor_y(), display.cursor_x()), (1, 1));
    }

    #[test]
    fn test_auto_enter_returns_enter_aid() {
        let mut display = display_with(&[(0, 1, 2, INPUT | FFW_AUTO_ENTER)]);
        display.set_cursor(0, 1);
        assert_eq!(display.do_key(Key::Char(b'a')), None);
        assert_eq!(display.do_key(Key::Char(b'b')), Some(AidKey::Code(AID_ENTER)));
    }

    #[test]
    fn test_fer_requires_field_exit() {
        let mut display = display_with(&[(0, 1, 2, INPUT | FFW_FER), (1, 1, 2, INPUT)]);
        display.set_cursor(0, 1);
        type_str(&mut display, "ab");
        assert_ne!(display.indicators() & TN5250_DISPLAY_IND_FER, 0);
        assert_eq!((display.cursor_y(), display.cursor_x()), (0, 2));
        display.do_key(Key::FieldExit);
        assert_eq!(display.indicators() & TN5250_DISPLAY_IND_FER, 0);
        assert_eq!(field_text(&display, 0), "ab");
        assert_eq!((display.cursor_y(), display.cursor_x()), (1, 1));

        display.set_cursor(0, 1);
        type_str(&mut display, "cd");
        display.do_key(Key::Char(b'e'));
        assert!(display.inhibited());
    }

    #[test]
    fn test_insert_mode_and_overflow() {
        let mut display = display_with(&[(0, 1, 3, INPUT)]);
        display.set_cursor(0, 1);
        type_str(&mut display, "ac");
        display.set_cursor(0, 2);
        display.do_key(Key::Insert);
        type_str(&mut display, "b");
        assert_eq!(field_text(&display, 0), "abc");
        display.set_cursor(0, 1);
        display.do_key(Key::Char(b'z'));
        assert!(display.inhibited());
    }

    #[test]
    fn test_dup_fills_rest_of_field() {
        let mut display = display_with(&[(0, 1, 4, INPUT | FFW_DUP_ENABLE), (1, 1, 4, INPUT)]);
        display.set_cursor(0, 2);
        display.do_key(Key::Dup);
        assert_eq!(&display.buffer().field_data(0)[1..], &[EBCDIC_DUP; 3]);
        assert_eq!((display.cursor_y(), display.cursor_x()), (1, 1));
    }

    #[test]
    fn test_tab_skips_bypass_fields() {
        let mut display = display_with(&[(0, 1, 4, INPUT), (1, 1, 4, INPUT | 0x2000), (2, 1, 4, INPUT)]);
        display.set_cursor(0, 1);
        display.do_key(Key::Tab);
        assert_eq!((display.cursor_y(), display.cursor_x()), (2, 1));
        display.do_key(Key::Tab);
        assert_eq!((display.cursor_y(), display.cursor_x()), (0, 1));
        display.do_key(Key::BackTab);
        assert_eq!((display.cursor_y(), display.cursor_x()), (2, 1));
    }

    #[test]
    fn test_home_twice_sends_record_backspace() {
        let mut display = display_with(&[(5, 5, 4, INPUT)]);
        assert_eq!(display.do_key(Key::Home), None);
        assert_eq!((display.cursor_y(), display.cursor_x()), (5, 5));
        assert_eq!(display.do_key(Key::Home), Some(AidKey::Code(AID_RECORD_BS)));
    }

    #[test]
    fn test_end_and_delete() {
        let mut display = display_with(&[(0, 1, 6, INPUT)]);
        display.set_cursor(0, 1);
        type_str(&mut display, "abc");
        display.do_key(Key::Home);
        display.do_key(Key::End);
        assert_eq!(display.cursor_x(), 4);
        display.set_cursor(0, 1);
        display.do_key(Key::Delete);
        assert_eq!(&field_text(&display, 0)[..3], "bc ");
    }

    #[test]
    fn test_key_queue_bounded() {
        let handle = HeadlessTerminal::default();
        let mut display = Display::new();
        display.set_terminal(Box::new(handle.clone()));
        for _ in 0..KEY_QUEUE_SIZE {
            assert!(display.queue_key(Key::Enter));
        }
        assert!(!display.queue_key(Key::Tab));
        assert_eq!(handle.beeps(), 1);
        display.indicator_set(TN5250_DISPLAY_IND_X_SYSTEM);
        assert_eq!(display.dequeue_key(), None);
        display.indicator_clear(TN5250_DISPLAY_IND_X_SYSTEM);
        assert_eq!(display.dequeue_key(), Some(Key::Enter));
    }

    #[test]
    fn test_uninhibit_restores_message_line() {
        let mut display = Display::new();
        display.set_cursor(23, 0);
        display.addch(0xC1);
        display.save_msg_line();
        display.set_cursor(23, 0);
        display.addch(0xC2);
        display.inhibit();
        display.uninhibit();
        assert_eq!(display.char_at(23, 0), 0xC1);
    }

    #[test]
    fn test_clear_unit_alternate_resizes() {
        let mut display = display_with(&[(0, 1, 4, INPUT)]);
        display.clear_unit_alternate();
        assert_eq!((display.width(), display.height()), (132, 27));
        assert_eq!(display.buffer().field_count(), 0);
        assert_ne!(display.indicators() & TN5250_DISPLAY_IND_X_SYSTEM, 0);
    }
}
