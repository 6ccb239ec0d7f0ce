//! Session engine
//!
//! Interprets the 5250 data stream. Each inbound record is dispatched on
//! its opcode and then its command stream is decoded: Write To Display
//! orders update the [`Display`], read commands arm a pending read, and
//! the next AID key answers that read with the packed field contents.
//!
//! The session owns its transport and display; keys come from the
//! display's terminal and are applied in arrival order, queued while the
//! keyboard is locked.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::SessionConfig;
use crate::error::{ProtocolError, ProtocolResult, TN5250Result};
use crate::lib5250::buffer::FieldId;
use crate::lib5250::codes::*;
use crate::lib5250::display::{
    AidKey, Display, TN5250_DISPLAY_IND_INSERT, TN5250_DISPLAY_IND_MESSAGE_WAITING, TN5250_DISPLAY_IND_X_CLOCK,
    TN5250_DISPLAY_IND_X_SYSTEM,
};
use crate::lib5250::field::Field;
use crate::lib5250::record::Record;
use crate::lib5250::stream::Transport;
use crate::terminal::{Key, EVENT_DATA, EVENT_KEY, EVENT_QUIT};

/// How long one pass of the event loop waits on the terminal, and then on
/// the host.
pub const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Length of the 5250 query reply
const QUERY_REPLY_LEN: usize = 61;

/// A 5250 display session
pub struct Session<T: Transport> {
    transport: T,
    display: Display,
    /// Record being decoded
    record: Record,
    terminal_type: String,
    invited: bool,
    /// Read command awaiting an AID key, 0 when none
    read_opcode: u8,
    shutdown: Arc<AtomicBool>,
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("terminal_type", &self.terminal_type)
            .field("invited", &self.invited)
            .field("read_opcode", &format_args!("0x{:02X}", self.read_opcode))
            .field("display", &self.display)
            .finish()
    }
}

impl<T: Transport> Session<T> {
    /// Session for the terminal type named in `config`.
    pub fn new(transport: T, display: Display, config: &SessionConfig) -> Self {
        Self::with_terminal_type(transport, display, config.terminal_type())
    }

    pub fn with_terminal_type(transport: T, display: Display, terminal_type: &str) -> Self {
        Self {
            transport,
            display,
            record: Record::new(),
            terminal_type: terminal_type.to_string(),
            invited: true,
            read_opcode: 0,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut Display {
        &mut self.display
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_parts(self) -> (T, Display) {
        (self.transport, self.display)
    }

    pub fn invited(&self) -> bool {
        self.invited
    }

    pub fn read_opcode(&self) -> u8 {
        self.read_opcode
    }

    /// Flag that makes [`Session::main_loop`] return at its next pass.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    // ===== Event loop =====

    /// Run until the user quits, the host disconnects or the shutdown flag
    /// is raised. Protocol violations end the loop with an error.
    pub fn main_loop(&mut self) -> TN5250Result<()> {
        self.display.update();
        loop {
            let events = self.wait_event()?;
            if events & EVENT_QUIT != 0 {
                log::info!("session: quit");
                return Ok(());
            }
            if events & EVENT_DATA != 0 && !self.handle_receive()? {
                log::info!("session: host disconnected");
                return Ok(());
            }
        }
    }

    /// Apply queued and incoming keys until something other than a key
    /// happens. Returns the `EVENT_*` bits that ended the wait.
    pub fn wait_event(&mut self) -> TN5250Result<u32> {
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                return Ok(EVENT_QUIT);
            }

            let mut handled = false;
            while let Some(key) = self.display.dequeue_key() {
                log::trace!("handling buffered key {:?}", key);
                self.process_key(key)?;
                handled = true;
            }
            if handled {
                self.display.update();
            }

            let mut events = self.display.terminal_wait_event(EVENT_POLL_INTERVAL)?;
            if events & EVENT_KEY != 0 {
                self.do_keys()?;
                events &= !EVENT_KEY;
            }
            if events == 0 && (self.transport.record_count() > 0 || self.transport.poll(EVENT_POLL_INTERVAL)?) {
                events |= EVENT_DATA;
            }
            if events != 0 {
                return Ok(events);
            }
        }
    }

    /// Read every pending key from the terminal. While the keyboard is
    /// locked keys are queued; System Request and Reset flush the queue and
    /// are applied at once.
    pub fn do_keys(&mut self) -> TN5250Result<()> {
        while let Some(key) = self.display.get_key() {
            log::trace!("@key {}", key.code());
            let locked = self.display.indicators() & TN5250_DISPLAY_IND_X_SYSTEM != 0;
            if locked {
                if key == Key::SysReq || key == Key::Reset {
                    self.display.flush_key_queue();
                    self.process_key(key)?;
                    break;
                }
                self.display.queue_key(key);
            } else if self.display.queued_keys() > 0 {
                // Earlier keys are still waiting their turn.
                self.display.queue_key(key);
            } else {
                self.process_key(key)?;
            }
        }
        self.display.update();
        Ok(())
    }

    /// Apply one key and send the AID it produces, if a read is pending
    /// or the AID does not need one.
    pub fn process_key(&mut self, key: Key) -> TN5250Result<()> {
        if let Some(aid) = self.display.do_key(key) {
            if self.read_opcode != 0 || aid.is_pseudo() {
                self.handle_aidkey(aid)?;
            } else {
                log::debug!("AID {:?} with no read pending", aid);
            }
        }
        Ok(())
    }

    /// Pull data from the transport and process every complete record.
    /// Returns false when the host has closed the connection.
    pub fn handle_receive(&mut self) -> TN5250Result<bool> {
        if !self.transport.handle_receive()? {
            return Ok(false);
        }
        while let Some(record) = self.transport.get_record() {
            self.process_record(record?)?;
        }
        self.display.update();
        Ok(true)
    }

    // ===== Records and commands =====

    /// Act on one record's opcode, then decode its command stream.
    pub fn process_record(&mut self, record: Record) -> TN5250Result<()> {
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("received record:\n{}", record.dump(self.display.char_map()));
        }
        self.record = record;
        let opcode = self.record.opcode();
        log::debug!("record opcode {}", opcode);

        match opcode {
            OPCODE_PUT_GET | OPCODE_INVITE => {
                self.invited = true;
                self.display.indicator_clear(TN5250_DISPLAY_IND_X_CLOCK);
            }
            OPCODE_OUTPUT_ONLY => {
                // Sent after an unusable System Request menu choice.
                if self.record.sys_request() {
                    let a = self.record.get_byte()?;
                    let b = self.record.get_byte()?;
                    log::debug!("output only: 0x{:02X} 0x{:02X}", a, b);
                }
            }
            OPCODE_CANCEL_INVITE => {
                self.display.indicator_set(TN5250_DISPLAY_IND_X_CLOCK);
                self.transport
                    .send_packet(FLOW_DISPLAY, H_NONE, OPCODE_CANCEL_INVITE, &[])?;
                self.invited = false;
            }
            OPCODE_MESSAGE_ON => {
                self.display.indicator_set(TN5250_DISPLAY_IND_MESSAGE_WAITING);
                self.display.beep();
            }
            OPCODE_MESSAGE_OFF => {
                self.display.indicator_clear(TN5250_DISPLAY_IND_MESSAGE_WAITING);
            }
            OPCODE_NO_OP | OPCODE_SAVE_SCR | OPCODE_RESTORE_SCR | OPCODE_READ_IMMED | OPCODE_READ_SCR => {}
            _ => return Err(ProtocolError::UnknownOpcode { opcode }.into()),
        }

        if !self.record.is_chain_end() {
            self.process_stream()?;
        }
        Ok(())
    }

    fn process_stream(&mut self) -> TN5250Result<()> {
        while !self.record.is_chain_end() {
            let esc = self.record.get_byte()?;
            if esc != ESC {
                return Err(ProtocolError::ExpectedEscape { found: esc }.into());
            }
            let code = self.record.get_byte()?;
            let command = CommandCode::from_u8(code).ok_or(ProtocolError::InvalidCommandCode { code })?;
            log::debug!("command {:?}", command);

            match command {
                CommandCode::WriteToDisplay => self.write_to_display()?,
                CommandCode::ClearUnit => {
                    self.display.clear_unit();
                    self.read_opcode = 0;
                }
                CommandCode::ClearUnitAlternate => {
                    let param = self.record.get_byte()?;
                    log::trace!("clear unit alternate: 0x{:02X}", param);
                    self.display.clear_unit_alternate();
                    self.read_opcode = 0;
                }
                CommandCode::ClearFormatTable => {
                    self.display.clear_format_table();
                    self.read_opcode = 0;
                }
                CommandCode::ReadMdtFields | CommandCode::ReadMdtFieldsAlt | CommandCode::ReadInputFields => {
                    self.read_cmd(code)?
                }
                CommandCode::ReadImmediate | CommandCode::ReadImmediateAlt => self.read_immediate(code)?,
                CommandCode::ReadScreenImmediate => self.read_screen_immediate()?,
                CommandCode::WriteStructuredField => self.write_structured_field()?,
                CommandCode::SaveScreen => self.save_screen()?,
                CommandCode::SavePartialScreen => self.save_partial_screen()?,
                // The stream that follows is an ordinary Write To Display.
                CommandCode::RestoreScreen | CommandCode::RestorePartialScreen => {}
                CommandCode::WriteErrorCode | CommandCode::WriteErrorCodeWindow => self.write_error_code(code)?,
                CommandCode::Roll => self.roll()?,
            }
        }
        Ok(())
    }

    fn get_u16(&mut self) -> ProtocolResult<u16> {
        Ok(u16::from_be_bytes([self.record.get_byte()?, self.record.get_byte()?]))
    }

    /// Read a one-based row/column pair and check it against the screen.
    fn get_address(&mut self) -> ProtocolResult<(usize, usize)> {
        let row = self.record.get_byte()?;
        let col = self.record.get_byte()?;
        if row == 0 || col == 0 || row as usize > self.display.height() || col as usize > self.display.width() {
            return Err(ProtocolError::InvalidBufferAddress { row, col });
        }
        Ok((row as usize - 1, col as usize - 1))
    }

    fn write_to_display(&mut self) -> TN5250Result<()> {
        let old = (self.display.cursor_y(), self.display.cursor_x());
        let mut cursor: Option<(usize, usize)> = None;

        let cc1 = self.record.get_byte()?;
        let cc2 = self.record.get_byte()?;
        log::trace!("write to display: cc1 = 0x{:02X}, cc2 = 0x{:02X}", cc1, cc2);
        self.handle_cc1(cc1);

        while !self.record.is_chain_end() {
            let order = self.record.get_byte()?;
            match order {
                TD => {
                    let len = self.get_u16()?;
                    log::trace!("TD: {} bytes", len);
                    for _ in 0..len {
                        let c = self.record.get_byte()?;
                        self.display.addch(c);
                    }
                }
                MC => {
                    let (y, x) = self.get_address()?;
                    log::trace!("MC: ({}, {})", y, x);
                    cursor = Some((y, x));
                }
                IC => {
                    let (y, x) = self.get_address()?;
                    log::trace!("IC: ({}, {})", y, x);
                    cursor = Some((y, x));
                    self.display.set_pending_insert(y, x);
                }
                RA => self.repeat_to_address()?,
                EA => self.erase_to_address()?,
                SBA => {
                    let (y, x) = self.get_address()?;
                    log::trace!("SBA: ({}, {})", y, x);
                    self.display.set_cursor(y, x);
                }
                SF => self.start_of_field()?,
                SOH => self.start_of_header()?,
                ESC => {
                    self.record.unget_byte()?;
                    break;
                }
                c if self.display.char_map().printable(c) => self.display.addch(c),
                other => return Err(ProtocolError::UnknownOrder { order: other }.into()),
            }
        }

        let x_system = self.display.indicators() & TN5250_DISPLAY_IND_X_SYSTEM != 0;
        match cursor {
            Some((y, x)) => self.display.set_cursor(y, x),
            None if (x_system && cc2 & CC2_UNLOCK != 0) || self.record.opcode() == OPCODE_RESTORE_SCR => {
                self.display.set_cursor_home()
            }
            None => self.display.set_cursor(old.0, old.1),
        }

        self.handle_cc2(cc2);
        Ok(())
    }

    fn handle_cc1(&mut self, cc1: u8) {
        let (mut lock, mut reset_nb_mdt, mut reset_all_mdt, mut null_nb_mdt, mut null_nb) =
            (true, false, false, false, false);
        match cc1 & CC1_MASK {
            CC1_NO_LOCK => lock = false,
            CC1_LOCK => {}
            CC1_RESET_NON_BYPASS_MDT => reset_nb_mdt = true,
            CC1_RESET_ALL_MDT => reset_all_mdt = true,
            CC1_NULL_NON_BYPASS_MDT => null_nb_mdt = true,
            CC1_RESET_MDT_NULL_NON_BYPASS => {
                reset_nb_mdt = true;
                null_nb = true;
            }
            CC1_RESET_MDT_NULL_NON_BYPASS_MDT => {
                reset_nb_mdt = true;
                null_nb_mdt = true;
            }
            CC1_RESET_MDT_NULL_ALL_NON_BYPASS => {
                reset_all_mdt = true;
                null_nb = true;
            }
            _ => {}
        }

        if lock {
            log::trace!("cc1: locking keyboard");
            self.display.indicator_set(TN5250_DISPLAY_IND_X_SYSTEM);
        }

        let buffer = self.display.buffer_mut();
        for id in 0..buffer.field_count() {
            let field = buffer.field(id);
            let bypass = field.is_bypass();
            if !bypass && ((null_nb_mdt && field.mdt()) || null_nb) {
                buffer.field_data_mut(id).fill(0);
            }
            if reset_all_mdt || (reset_nb_mdt && !bypass) {
                buffer.field_mut(id).clear_mdt();
            }
        }
    }

    fn handle_cc2(&mut self, cc2: u8) {
        if cc2 & CC2_MESSAGE_ON != 0 {
            self.display.indicator_set(TN5250_DISPLAY_IND_MESSAGE_WAITING);
        } else if cc2 & CC2_MESSAGE_OFF != 0 {
            self.display.indicator_clear(TN5250_DISPLAY_IND_MESSAGE_WAITING);
        }
        if cc2 & CC2_ALARM != 0 {
            log::trace!("cc2: alarm");
            self.display.beep();
        }
        if cc2 & CC2_UNLOCK != 0 {
            self.display.indicator_clear(TN5250_DISPLAY_IND_X_SYSTEM);
        }
    }

    /// Offset of the cursor in the grid, row-major.
    fn cursor_offset(&self) -> usize {
        self.display.cursor_y() * self.display.width() + self.display.cursor_x()
    }

    /// Repeat one character from the cursor up to and including the
    /// target address. A target before the cursor is rejected.
    fn repeat_to_address(&mut self) -> TN5250Result<()> {
        let (row, col) = self.get_address()?;
        let c = self.record.get_byte()?;
        log::trace!("RA: to ({}, {}) with 0x{:02X}", row, col, c);
        if row * self.display.width() + col < self.cursor_offset() {
            return Err(address_error(row, col).into());
        }
        loop {
            let (y, x) = (self.display.cursor_y(), self.display.cursor_x());
            self.display.addch(c);
            if y == row && x == col {
                break;
            }
        }
        Ok(())
    }

    /// Erase from the cursor through the target address. Only the
    /// erase-everything attribute type (0xFF) blanks the cells; the cursor
    /// then moves to the cell after the target.
    fn erase_to_address(&mut self) -> TN5250Result<()> {
        let (row, col) = self.get_address()?;
        let length = self.record.get_byte()?;
        let start = self.cursor_offset();
        let end = row * self.display.width() + col;
        if end < start {
            return Err(address_error(row, col).into());
        }
        if !(2..=5).contains(&length) {
            return Err(ProtocolError::InvalidEraseLength { length }.into());
        }
        let mut kind = 0u8;
        for _ in 1..length {
            kind = self.record.get_byte()?;
        }
        log::trace!("EA: to ({}, {}), last attribute type 0x{:02X}", row, col, kind);

        if kind == 0xFF {
            let blank = self.display.char_map().to_remote(b' ');
            for _ in start..=end {
                self.display.addch(blank);
            }
        }
        let (w, h) = (self.display.width(), self.display.height());
        let next = (end + 1) % (w * h);
        self.display.set_cursor(next / w, next % w);
        Ok(())
    }

    fn start_of_field(&mut self) -> TN5250Result<()> {
        let map = *self.display.char_map();
        let first = self.record.get_byte()?;
        let input = !map.attribute(first);
        let (mut ffw, mut fcw) = (0u16, 0u16);

        let attribute = if input {
            self.display.indicator_set(TN5250_DISPLAY_IND_X_SYSTEM);
            ffw = u16::from_be_bytes([first, self.record.get_byte()?]);
            let mut next = self.record.get_byte()?;
            while !map.attribute(next) {
                fcw = u16::from_be_bytes([next, self.record.get_byte()?]);
                next = self.record.get_byte()?;
            }
            next
        } else {
            first
        };

        self.display.addch(attribute);
        let length = self.get_u16()?;
        log::trace!(
            "SF: ffw = 0x{:04X}, fcw = 0x{:04X}, attr = 0x{:02X}, length = {}",
            ffw,
            fcw,
            attribute,
            length
        );
        let (y, x) = (self.display.cursor_y(), self.display.cursor_x());
        let (w, h) = (self.display.width(), self.display.height());
        if y * w + x + length as usize > w * h {
            return Err(ProtocolError::FieldOverrun { row: y, col: x, length }.into());
        }
        if !input {
            return Ok(());
        }
        if length == 0 {
            return Err(ProtocolError::InvalidFieldLength { length }.into());
        }

        let existing = self
            .display
            .field_at(y, x)
            .filter(|&id| {
                let f = self.display.buffer().field(id);
                f.start_row == y && f.start_col == x
            });
        let buffer = self.display.buffer_mut();
        match existing {
            Some(id) => {
                let field = buffer.field_mut(id);
                field.ffw = ffw;
                field.attribute = attribute;
            }
            None => {
                let mut field = Field::with_layout(buffer.width(), y, x, length as usize, ffw);
                field.fcw = fcw;
                field.attribute = attribute;
                let id = buffer.add_field(field);
                log::debug!("{}", buffer.field(id));
            }
        }

        // Mark the cell after the field with a normal attribute.
        let end = (y * w + x + length as usize) % (w * h);
        self.display.set_cursor(end / w, end % w);
        self.display.addch(ATTR_5250_NORMAL);
        self.display.set_cursor(y, x);
        Ok(())
    }

    fn start_of_header(&mut self) -> TN5250Result<()> {
        self.display.buffer_mut().clear_table();
        self.display.indicator_set(TN5250_DISPLAY_IND_X_SYSTEM);

        let length = self.record.get_byte()?;
        if !(1..=7).contains(&length) {
            return Err(ProtocolError::InvalidHeaderLength { length }.into());
        }
        let mut header = Vec::with_capacity(length as usize);
        for _ in 0..length {
            header.push(self.record.get_byte()?);
        }
        log::trace!("SOH: {:02X?}", header);
        self.display.buffer_mut().set_header_data(Some(header));
        Ok(())
    }

    /// Write an error message on the message line and lock the keyboard
    /// until Reset, which puts the old line back. The window form carries
    /// the window's first and last column, which are not used: the message
    /// always goes to the message line.
    fn write_error_code(&mut self, code: u8) -> TN5250Result<()> {
        if code == CMD_WRITE_ERROR_CODE_WINDOW {
            let start = self.record.get_byte()?;
            let end = self.record.get_byte()?;
            log::trace!("write error code to window: columns {}..{}", start, end);
        }
        let (mut end_y, mut end_x) = (self.display.cursor_y(), self.display.cursor_x());
        self.display.save_msg_line();
        let line = self.display.msg_line();
        self.display.set_cursor(line, 0);

        while !self.record.is_chain_end() {
            let c = self.record.get_byte()?;
            match c {
                ESC => {
                    self.record.unget_byte()?;
                    break;
                }
                IC => {
                    let (y, x) = self.get_address()?;
                    end_y = y;
                    end_x = x;
                }
                c if self.display.char_map().printable(c) => self.display.addch(c),
                other => return Err(ProtocolError::UnknownOrder { order: other }.into()),
            }
        }

        self.display.set_cursor(end_y, end_x);
        self.display.inhibit();
        Ok(())
    }

    fn read_cmd(&mut self, readop: u8) -> TN5250Result<()> {
        let cc1 = self.record.get_byte()?;
        self.handle_cc1(cc1);
        let cc2 = self.record.get_byte()?;
        self.handle_cc2(cc2);
        log::debug!("read command 0x{:02X}: cc1 = 0x{:02X}, cc2 = 0x{:02X}", readop, cc1, cc2);

        self.display
            .indicator_clear(TN5250_DISPLAY_IND_X_SYSTEM | TN5250_DISPLAY_IND_X_CLOCK);
        if self.read_opcode != 0 {
            self.display.uninhibit();
        }
        self.read_opcode = readop;
        Ok(())
    }

    /// Answer at once with AID 0. The alternate form sends modified fields
    /// only, each behind its address.
    fn read_immediate(&mut self, readop: u8) -> TN5250Result<()> {
        let old = self.read_opcode;
        self.read_opcode = readop;
        let sent = self.send_fields(0);
        self.read_opcode = old;
        sent
    }

    fn read_screen_immediate(&mut self) -> TN5250Result<()> {
        let data = self.display.buffer().as_bytes().to_vec();
        self.transport.send_packet(FLOW_DISPLAY, H_NONE, OPCODE_NO_OP, &data)
    }

    fn write_structured_field(&mut self) -> TN5250Result<()> {
        let mut header = [0u8; 5];
        for b in header.iter_mut() {
            *b = self.record.get_byte()?;
        }
        log::debug!(
            "write structured field: length = {}, class = 0x{:02X}, type = 0x{:02X}",
            u16::from_be_bytes([header[0], header[1]]),
            header[2],
            header[3]
        );
        self.query_reply()
    }

    /// Describe this terminal to the host.
    fn query_reply(&mut self) -> TN5250Result<()> {
        let (dev_type, dev_model) = parse_device(&self.terminal_type)?;
        let map = self.display.char_map();

        let mut reply = [0u8; QUERY_REPLY_LEN];
        reply[2] = 0x88; // inbound WSF AID
        reply[3] = 0x00; // length of the reply
        reply[4] = 0x3A;
        reply[5] = 0xD9; // command class
        reply[6] = 0x70; // query
        reply[7] = 0x80; // flags
        reply[8] = 0x06; // controller hardware class
        reply[10] = 0x01; // code level
        reply[11] = 0x01;
        reply[29] = 0x01; // 5250 display
        let device = format!("{:04}\0{:02}", dev_type % 10000, dev_model % 100);
        for (slot, b) in reply[30..37].iter_mut().zip(device.bytes()) {
            *slot = map.to_remote(b);
        }
        reply[37] = 0x02; // standard keyboard
        reply[41] = 0x61; // serial number
        reply[42] = 0x50;
        reply[44] = 0xFF; // up to 65535 input fields
        reply[45] = 0xFF;
        reply[49] = 0x23; // capabilities
        reply[50] = 0x31;

        log::debug!("sending query reply for {} model {}", dev_type, dev_model);
        self.transport.send_packet(FLOW_DISPLAY, H_NONE, OPCODE_NO_OP, &reply)
    }

    /// Send the screen as a Write To Display stream that restores it.
    fn save_screen(&mut self) -> TN5250Result<()> {
        let mut data = self.display.make_wtd_data();
        if self.read_opcode != 0 {
            data.extend_from_slice(&[ESC, self.read_opcode, 0x00, 0x00]);
        }
        log::debug!("save screen: {} bytes", data.len());
        self.transport.send_packet(FLOW_DISPLAY, H_NONE, OPCODE_SAVE_SCR, &data)
    }

    /// The window parameters are read and ignored: the whole screen is
    /// saved, and Restore Partial Screen replays it like Restore Screen.
    fn save_partial_screen(&mut self) -> TN5250Result<()> {
        let mut params = [0u8; 5];
        for b in params.iter_mut() {
            *b = self.record.get_byte()?;
        }
        log::debug!(
            "save partial screen: flags = 0x{:02X}, top = {}, left = {}, depth = {}, width = {}",
            params[0],
            params[1],
            params[2],
            params[3],
            params[4]
        );
        self.save_screen()
    }

    fn roll(&mut self) -> TN5250Result<()> {
        let direction = self.record.get_byte()?;
        let top = self.record.get_byte()?;
        let bottom = self.record.get_byte()?;
        log::debug!("roll: direction = 0x{:02X}, top = {}, bottom = {}", direction, top, bottom);

        let mut lines = (direction & 0x1F) as i32;
        if direction & 0x80 == 0 {
            lines = -lines;
        }
        if lines == 0 {
            return Ok(());
        }
        let last = self.display.height() - 1;
        let top = (top as usize).saturating_sub(1).min(last);
        let bottom = (bottom as usize).saturating_sub(1).min(last);
        self.display.buffer_mut().roll(top, bottom, lines);
        Ok(())
    }

    // ===== AID keys =====

    pub fn handle_aidkey(&mut self, aid: AidKey) -> TN5250Result<()> {
        log::debug!("AID key {:?}", aid);
        match aid {
            AidKey::Code(code @ (AID_PRINT | AID_RECORD_BS)) => {
                let data = [self.cursor_row(), self.cursor_col(), code];
                self.transport.send_packet(FLOW_DISPLAY, H_NONE, OPCODE_NO_OP, &data)
            }
            AidKey::SysReq => self.send_pseudo_aid(H_SRQ),
            AidKey::Attention => self.send_pseudo_aid(H_ATN),
            AidKey::Code(code) => self.send_fields(code),
        }
    }

    /// System Request and Attention lock the keyboard only while the
    /// packet goes out; they leave any pending read in place.
    fn send_pseudo_aid(&mut self, flags: u8) -> TN5250Result<()> {
        self.display.indicator_set(TN5250_DISPLAY_IND_X_SYSTEM);
        let sent = self.transport.send_packet(FLOW_DISPLAY, flags, OPCODE_NO_OP, &[]);
        self.display.indicator_clear(TN5250_DISPLAY_IND_X_SYSTEM);
        sent
    }

    fn cursor_row(&self) -> u8 {
        (self.display.cursor_y() + 1) as u8
    }

    fn cursor_col(&self) -> u8 {
        (self.display.cursor_x() + 1) as u8
    }

    /// Answer the pending read: cursor address, AID, then the fields the
    /// read command selects. Locks the keyboard until the host replies.
    pub fn send_fields(&mut self, aid: u8) -> TN5250Result<()> {
        let mut out = vec![self.cursor_row(), self.cursor_col(), aid];
        let buffer = self.display.buffer();
        log::debug!(
            "send fields: row = {}, col = {}, aid = 0x{:02X}, {} fields",
            out[0],
            out[1],
            aid,
            buffer.field_count()
        );

        let ids: Vec<FieldId> = match self.read_opcode {
            CMD_READ_INPUT_FIELDS => {
                if buffer.master_mdt() && buffer.send_data_for_aid_key(aid) {
                    (0..buffer.field_count()).collect()
                } else {
                    Vec::new()
                }
            }
            CMD_READ_IMMEDIATE => {
                if buffer.master_mdt() {
                    (0..buffer.field_count()).collect()
                } else {
                    Vec::new()
                }
            }
            CMD_READ_MDT_FIELDS | CMD_READ_MDT_FIELDS_ALT | CMD_READ_IMMEDIATE_ALT => {
                if buffer.send_data_for_aid_key(aid) {
                    buffer.fields().iter().filter(|f| f.mdt()).map(|f| f.id).collect()
                } else {
                    Vec::new()
                }
            }
            other => {
                log::warn!("send fields with no read pending (read opcode 0x{:02X})", other);
                return Ok(());
            }
        };
        for id in ids {
            self.pack_field(&mut out, id);
        }

        self.read_opcode = 0;
        self.display.indicator_set(TN5250_DISPLAY_IND_X_SYSTEM);
        self.display.indicator_clear(TN5250_DISPLAY_IND_INSERT);
        self.display.update();
        self.transport.send_packet(FLOW_DISPLAY, H_NONE, OPCODE_PUT_GET, &out)
    }

    /// Append one field's contents as the current read command wants them.
    /// A signed numeric field never sends its sign position; a minus sign
    /// is folded into the zone of the last digit instead.
    fn pack_field(&self, out: &mut Vec<u8>, id: FieldId) {
        let map = self.display.char_map();
        let buffer = self.display.buffer();
        let field = buffer.field(id);
        let data = buffer.field_data(id);
        let blank = |b: u8| if b == 0 { 0x40 } else { b };
        let minus = map.to_remote(b'-');
        log::trace!("packing {}", field);

        match self.read_opcode {
            CMD_READ_INPUT_FIELDS | CMD_READ_IMMEDIATE => {
                if field.is_signed_num() && data.len() >= 2 {
                    let size = data.len();
                    out.extend(data[..size - 2].iter().map(|&b| blank(b)));
                    let c = data[size - 2];
                    let c = if data[size - 1] == minus { 0xD0 | (c & 0x0F) } else { c };
                    out.push(blank(c));
                } else {
                    out.extend(data.iter().map(|&b| blank(b)));
                }
            }
            _ => {
                out.extend_from_slice(&[SBA, (field.start_row + 1) as u8, (field.start_col + 1) as u8]);

                let mut size = data.len();
                let mut last = data.last().copied().unwrap_or(0);
                if field.is_signed_num() {
                    size = size.saturating_sub(1);
                    last = if size > 0 { data[size - 1] } else { 0 };
                    if size > 1 && data[size] == minus && map.to_local(last).is_ascii_digit() {
                        last = 0xD0 | (last & 0x0F);
                    }
                }
                while size > 0 && data[size - 1] == 0 {
                    size -= 1;
                    last = if size > 0 { data[size - 1] } else { 0 };
                }
                if size == 0 {
                    return;
                }

                // Read MDT Fields shows nulls as blanks; the alternate
                // forms send them as they are.
                let translate = self.read_opcode == CMD_READ_MDT_FIELDS;
                let put = |b: u8| if translate { blank(b) } else { b };
                out.extend(data[..size - 1].iter().map(|&b| put(b)));
                out.push(put(last));
            }
        }
    }
}

/// Address error for a zero-based target, reported one-based as on the wire.
fn address_error(row: usize, col: usize) -> ProtocolError {
    ProtocolError::InvalidBufferAddress {
        row: (row + 1) as u8,
        col: (col + 1) as u8,
    }
}

/// Device type and model from an `IBM-TTTT-MM` terminal type. The model
/// defaults to 1.
pub fn parse_device(terminal_type: &str) -> ProtocolResult<(u32, u32)> {
    let invalid = || ProtocolError::InvalidTerminalType {
        term: terminal_type.to_string(),
    };
    let (_, rest) = terminal_type.split_once('-').ok_or_else(invalid)?;
    let dev_type = leading_number(rest);
    let dev_model = match rest.split_once('-') {
        Some((_, model)) => leading_number(model),
        None => 1,
    };
    Ok((dev_type, dev_model))
}

fn leading_number(s: &str) -> u32 {
    s.bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u32, |n, d| n.saturating_mul(10).saturating_add(u32::from(d - b'0')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TN5250Error;
    use crate::lib5250::debug::{DebugStream, SentPacket};
    use crate::lib5250::field::{FFW_BYPASS, FFW_MODIFIED};
    use crate::terminal::HeadlessTerminal;

    fn wire(opcode: u8, flags: u8, data: &[u8]) -> Record {
        let len = (data.len() + 10) as u16;
        let mut v = len.to_be_bytes().to_vec();
        v.extend_from_slice(&[0x12, 0xA0, 0x00, 0x00, 0x04, flags, 0x00, opcode]);
        v.extend_from_slice(data);
        Record::from_bytes(&v).unwrap()
    }

    fn session() -> (Session<DebugStream>, DebugStream) {
        let stream = DebugStream::from_trace("");
        let session = Session::with_terminal_type(stream.clone(), Display::new(), "IBM-3179-2");
        (session, stream)
    }

    fn run(session: &mut Session<DebugStream>, data: &[u8]) {
        session.process_record(wire(OPCODE_PUT_GET, 0, data)).unwrap();
    }

    fn ebcdic(session: &Session<DebugStream>, text: &str) -> Vec<u8> {
        session.display().char_map().to_remote_bytes(text)
    }

    /// Two input fields at (1, 2) and (3, 2), the second signed numeric.
    fn two_fields(session: &mut Session<DebugStream>) {
        let mut data = vec![ESC, CMD_CLEAR_UNIT, ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x18];
        data.extend_from_slice(&[SBA, 1, 1, SF, 0x40, 0x00, 0x20, 0x00, 0x05]);
        data.extend_from_slice(&[SBA, 3, 1, SF, 0x47, 0x00, 0x20, 0x00, 0x04]);
        data.extend_from_slice(&[ESC, CMD_READ_MDT_FIELDS, 0x00, 0x00]);
        run(session, &data);
    }

    #[test]
    fn test_write_text_and_cursor_restore() {
        let (mut session, _) = session();
        let mut data = vec![ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x00, SBA, 2, 3];
        data.extend(ebcdic(&session, "HI"));
        run(&mut session, &data);
        let display = session.display();
        assert_eq!(display.char_at(1, 2), 0xC8);
        assert_eq!(display.char_at(1, 3), 0xC9);
        assert_eq!((display.cursor_y(), display.cursor_x()), (0, 0));
    }

    #[test]
    fn test_start_of_field_and_insert_cursor() {
        let (mut session, _) = session();
        two_fields(&mut session);
        let buffer = session.display().buffer();
        assert_eq!(buffer.field_count(), 2);
        let f = buffer.field(0);
        assert_eq!((f.start_row, f.start_col, f.length), (0, 1, 5));
        assert_eq!(buffer.char_at(0, 0), 0x20);
        assert_eq!(buffer.char_at(0, 6), 0x20);
        assert!(buffer.field(1).is_signed_num());
        // Unlocked with no IC: home is the first input field.
        assert_eq!((session.display().cursor_y(), session.display().cursor_x()), (0, 1));
        assert_eq!(session.read_opcode(), CMD_READ_MDT_FIELDS);
        assert_eq!(session.display().indicators() & TN5250_DISPLAY_IND_X_SYSTEM, 0);

        run(&mut session, &[ESC, CMD_WRITE_TO_DISPLAY, 0x20, 0x00, IC, 3, 2]);
        assert_eq!((session.display().cursor_y(), session.display().cursor_x()), (2, 1));
        assert!(session.display().pending_insert());
    }

    #[test]
    fn test_repeat_to_address_and_header() {
        let (mut session, _) = session();
        run(
            &mut session,
            &[ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x00, SOH, 4, 0, 0, 0, 5, SBA, 1, 79, RA, 2, 2, 0x5C],
        );
        let display = session.display();
        assert_eq!(display.char_at(0, 78), 0x5C);
        assert_eq!(display.char_at(1, 1), 0x5C);
        assert_eq!(display.char_at(1, 2), 0x00);
        assert_eq!(display.msg_line(), 4);
    }

    #[test]
    fn test_protocol_violations() {
        let (mut session, _) = session();
        let err = session
            .process_record(wire(OPCODE_PUT_GET, 0, &[ESC, CMD_WRITE_TO_DISPLAY, 0, 0, SBA, 0, 5]))
            .unwrap_err();
        assert!(matches!(
            err,
            TN5250Error::Protocol(ProtocolError::InvalidBufferAddress { row: 0, col: 5 })
        ));
        let err = session.process_record(wire(OPCODE_PUT_GET, 0, &[0x11])).unwrap_err();
        assert!(matches!(err, TN5250Error::Protocol(ProtocolError::ExpectedEscape { found: 0x11 })));
        let err = session.process_record(wire(OPCODE_PUT_GET, 0, &[ESC, 0x99])).unwrap_err();
        assert!(matches!(err, TN5250Error::Protocol(ProtocolError::InvalidCommandCode { code: 0x99 })));
        let err = session
            .process_record(wire(OPCODE_PUT_GET, 0, &[ESC, CMD_WRITE_TO_DISPLAY, 0, 0, WEA]))
            .unwrap_err();
        assert!(matches!(err, TN5250Error::Protocol(ProtocolError::UnknownOrder { order: WEA })));
        let err = session.process_record(wire(42, 0, &[])).unwrap_err();
        assert!(matches!(err, TN5250Error::Protocol(ProtocolError::UnknownOpcode { opcode: 42 })));
        let err = session
            .process_record(wire(OPCODE_PUT_GET, 0, &[ESC, CMD_WRITE_TO_DISPLAY, 0, 0, SOH, 9]))
            .unwrap_err();
        assert!(matches!(err, TN5250Error::Protocol(ProtocolError::InvalidHeaderLength { length: 9 })));
    }

    #[test]
    fn test_read_mdt_sends_modified_fields_only() {
        let (mut session, stream) = session();
        two_fields(&mut session);
        for key in [Key::Char(b'a'), Key::Char(b'b')] {
            session.process_key(key).unwrap();
        }
        session.process_key(Key::Enter).unwrap();

        let sent = stream.take_sent_packets();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].opcode, OPCODE_PUT_GET);
        assert_eq!(sent[0].data, vec![1, 4, AID_ENTER, SBA, 1, 2, 0x81, 0x82]);
        assert_eq!(session.read_opcode(), 0);
        assert_ne!(session.display().indicators() & TN5250_DISPLAY_IND_X_SYSTEM, 0);
    }

    #[test]
    fn test_signed_field_minus_folds_sign() {
        let (mut session, stream) = session();
        two_fields(&mut session);
        session.display_mut().set_cursor(2, 1);
        for key in [Key::Char(b'4'), Key::Char(b'2'), Key::FieldMinus] {
            session.process_key(key).unwrap();
        }
        assert!(session.display().buffer().field(1).mdt());
        session.process_key(Key::Enter).unwrap();
        let sent = stream.take_sent_packets();
        // Right adjusted with blank fill, sign folded into the last digit.
        assert_eq!(sent[0].data[3..], [SBA, 3, 2, 0x40, 0xF4, 0xD2]);
    }

    #[test]
    fn test_read_input_fields_sends_all() {
        let (mut session, stream) = session();
        two_fields(&mut session);
        run(&mut session, &[ESC, CMD_READ_INPUT_FIELDS, 0x00, 0x00]);
        session.process_key(Key::Char(b'x')).unwrap();
        session.process_key(Key::F(3)).unwrap();
        let sent = stream.take_sent_packets();
        let mut expected = vec![1, 3, AID_F3, 0xA7, 0x40, 0x40, 0x40, 0x40];
        expected.extend_from_slice(&[0x40, 0x40, 0x40]);
        assert_eq!(sent[0].data, expected);
    }

    #[test]
    fn test_aid_ignored_without_read() {
        let (mut session, stream) = session();
        session.process_key(Key::Enter).unwrap();
        assert!(stream.sent_packets().is_empty());
        session.process_key(Key::SysReq).unwrap();
        let sent = stream.take_sent_packets();
        assert_eq!(
            sent,
            vec![SentPacket {
                flow_type: FLOW_DISPLAY,
                flags: H_SRQ,
                opcode: OPCODE_NO_OP,
                data: Vec::new(),
            }]
        );
        assert_eq!(session.display().indicators() & TN5250_DISPLAY_IND_X_SYSTEM, 0);
    }

    #[test]
    fn test_cc1_resets_and_nulls() {
        let (mut session, _) = session();
        two_fields(&mut session);
        session.process_key(Key::Char(b'z')).unwrap();
        {
            let buffer = session.display_mut().buffer_mut();
            buffer.field_mut(1).ffw |= FFW_BYPASS | FFW_MODIFIED;
        }
        run(&mut session, &[ESC, CMD_WRITE_TO_DISPLAY, CC1_RESET_MDT_NULL_NON_BYPASS_MDT, 0x00]);
        let buffer = session.display().buffer();
        assert!(!buffer.field(0).mdt());
        assert_eq!(buffer.field_data(0), &[0; 5]);
        assert!(buffer.field(1).mdt());
        assert_ne!(session.display().indicators() & TN5250_DISPLAY_IND_X_SYSTEM, 0);
    }

    #[test]
    fn test_cancel_invite_and_messages() {
        let (mut session, stream) = session();
        session.process_record(wire(OPCODE_CANCEL_INVITE, 0, &[])).unwrap();
        assert!(!session.invited());
        assert_ne!(session.display().indicators() & TN5250_DISPLAY_IND_X_CLOCK, 0);
        assert_eq!(stream.take_sent_packets()[0].opcode, OPCODE_CANCEL_INVITE);

        session.process_record(wire(OPCODE_INVITE, 0, &[])).unwrap();
        assert!(session.invited());
        assert_eq!(session.display().indicators() & TN5250_DISPLAY_IND_X_CLOCK, 0);

        session.process_record(wire(OPCODE_MESSAGE_ON, 0, &[])).unwrap();
        assert_ne!(session.display().indicators() & TN5250_DISPLAY_IND_MESSAGE_WAITING, 0);
        session.process_record(wire(OPCODE_MESSAGE_OFF, 0, &[])).unwrap();
        assert_eq!(session.display().indicators() & TN5250_DISPLAY_IND_MESSAGE_WAITING, 0);
    }

    #[test]
    fn test_query_reply() {
        let (mut session, stream) = session();
        run(&mut session, &[ESC, CMD_WRITE_STRUCTURED_FIELD, 0x00, 0x05, 0xD9, 0x70, 0x00]);
        let sent = stream.take_sent_packets();
        let reply = &sent[0].data;
        assert_eq!(reply.len(), QUERY_REPLY_LEN);
        assert_eq!(&reply[2..8], &[0x88, 0x00, 0x3A, 0xD9, 0x70, 0x80]);
        assert_eq!(&reply[30..37], &[0xF3, 0xF1, 0xF7, 0xF9, 0x00, 0xF0, 0xF2]);
        assert_eq!(reply[37], 0x02);
    }

    #[test]
    fn test_parse_device() {
        assert_eq!(parse_device("IBM-3179-2").unwrap(), (3179, 2));
        assert_eq!(parse_device("IBM-5251").unwrap(), (5251, 1));
        assert!(parse_device("vt100").is_err());
    }

    #[test]
    fn test_write_error_code_until_reset() {
        let (mut session, _) = session();
        run(&mut session, &[ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x00, SBA, 24, 1, 0xC1]);
        let mut data = vec![ESC, CMD_WRITE_ERROR_CODE];
        data.extend(ebcdic(&session, "ERR"));
        run(&mut session, &data);
        assert!(session.display().inhibited());
        assert_eq!(session.display().char_at(23, 0), 0xC5);
        session.process_key(Key::Reset).unwrap();
        assert!(!session.display().inhibited());
        assert_eq!(session.display().char_at(23, 0), 0xC1);
    }

    #[test]
    fn test_save_screen_replays() {
        let (mut session, stream) = session();
        two_fields(&mut session);
        run(&mut session, &[ESC, CMD_SAVE_SCREEN]);
        let sent = stream.take_sent_packets();
        assert_eq!(sent[0].opcode, OPCODE_SAVE_SCR);
        let saved = &sent[0].data;
        assert_eq!(&saved[saved.len() - 4..], &[ESC, CMD_READ_MDT_FIELDS, 0, 0]);

        let (mut restored, _) = self::session();
        restored
            .process_record(wire(OPCODE_RESTORE_SCR, 0, saved))
            .unwrap();
        assert_eq!(restored.display().buffer().as_bytes(), session.display().buffer().as_bytes());
        assert_eq!(restored.display().buffer().fields(), session.display().buffer().fields());
        assert_eq!(restored.read_opcode(), CMD_READ_MDT_FIELDS);
    }

    fn save_and_restore(session: &mut Session<DebugStream>, stream: &DebugStream) -> Session<DebugStream> {
        run(session, &[ESC, CMD_SAVE_SCREEN]);
        let saved = stream.take_sent_packets().remove(0);
        assert_eq!(saved.opcode, OPCODE_SAVE_SCR);
        let (mut restored, _) = self::session();
        restored
            .process_record(wire(OPCODE_RESTORE_SCR, 0, &saved.data))
            .unwrap();
        restored
    }

    #[test]
    fn test_repeat_to_address_bounds() {
        let (mut session, _) = session();
        // A target equal to the cursor writes just that cell.
        run(&mut session, &[ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x00, SBA, 5, 10, RA, 5, 10, 0xC1]);
        assert_eq!(session.display().char_at(4, 9), 0xC1);
        assert_eq!(session.display().char_at(4, 10), 0x00);

        let data = [ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x00, SBA, 5, 10, RA, 1, 1, 0xC1];
        let err = session.process_record(wire(OPCODE_PUT_GET, 0, &data)).unwrap_err();
        assert!(matches!(
            err,
            TN5250Error::Protocol(ProtocolError::InvalidBufferAddress { row: 1, col: 1 })
        ));
        let written = session.display().buffer().as_bytes().iter().filter(|&&b| b == 0xC1).count();
        assert_eq!(written, 1);
    }

    #[test]
    fn test_field_past_screen_end_is_rejected() {
        let (mut session, _) = session();
        let data = [ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x00, SBA, 24, 75, SF, 0x40, 0x00, 0x20, 0x00, 20];
        let err = session.process_record(wire(OPCODE_PUT_GET, 0, &data)).unwrap_err();
        assert!(matches!(
            err,
            TN5250Error::Protocol(ProtocolError::FieldOverrun { row: 23, col: 75, length: 20 })
        ));
        assert_eq!(session.display().buffer().field_count(), 0);
        assert_eq!(session.display().char_at(0, 15), 0x00);

        // Ending on the last cell is fine; the end attribute wraps to the origin.
        run(&mut session, &[ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x00, SBA, 24, 75, SF, 0x40, 0x00, 0x20, 0x00, 5]);
        let f = session.display().buffer().field(0);
        assert_eq!((f.start_row, f.start_col, f.length), (23, 75, 5));
        assert_eq!(session.display().char_at(0, 0), ATTR_5250_NORMAL);
    }

    #[test]
    fn test_attention_leaves_keyboard_unlocked() {
        let (mut session, stream) = session();
        two_fields(&mut session);
        assert_eq!(session.display().indicators() & TN5250_DISPLAY_IND_X_SYSTEM, 0);

        session.process_key(Key::Attention).unwrap();
        let sent = stream.take_sent_packets();
        assert_eq!(sent.len(), 1);
        assert_eq!((sent[0].flags, sent[0].opcode), (H_ATN, OPCODE_NO_OP));
        assert_eq!(session.display().indicators() & TN5250_DISPLAY_IND_X_SYSTEM, 0);
        assert_eq!(session.read_opcode(), CMD_READ_MDT_FIELDS);

        // Keys still reach the screen instead of waiting in the queue.
        session.process_key(Key::Reset).unwrap();
        session.process_key(Key::Char(b'a')).unwrap();
        assert_eq!(session.display().buffer().field_data(0)[0], 0x81);
        assert_eq!(session.display().queued_keys(), 0);
    }

    #[test]
    fn test_erase_to_address() {
        let (mut session, _) = session();
        let mut data = vec![ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x00, SBA, 2, 1, RA, 3, 80, 0xC1];
        data.extend_from_slice(&[SBA, 2, 6, EA, 3, 10, 2, 0xFF, 0xC2]);
        run(&mut session, &data);
        let display = session.display();
        assert_eq!(display.char_at(1, 4), 0xC1);
        assert_eq!(display.char_at(1, 5), 0x40);
        assert_eq!(display.char_at(1, 79), 0x40);
        assert_eq!(display.char_at(2, 9), 0x40);
        // Writing resumes after the erased region.
        assert_eq!(display.char_at(2, 10), 0xC2);
        assert_eq!(display.char_at(2, 11), 0xC1);

        // Other attribute types leave the cells alone but still move on.
        run(&mut session, &[ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x00, SBA, 2, 1, EA, 2, 2, 3, 0x01, 0x02, 0xC3]);
        assert_eq!(session.display().char_at(1, 0), 0xC1);
        assert_eq!(session.display().char_at(1, 2), 0xC3);

        let data = [ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x00, SBA, 3, 10, EA, 1, 1, 2, 0xFF];
        let err = session.process_record(wire(OPCODE_PUT_GET, 0, &data)).unwrap_err();
        assert!(matches!(
            err,
            TN5250Error::Protocol(ProtocolError::InvalidBufferAddress { row: 1, col: 1 })
        ));
        let data = [ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x00, SBA, 1, 1, EA, 2, 1, 6];
        let err = session.process_record(wire(OPCODE_PUT_GET, 0, &data)).unwrap_err();
        assert!(matches!(err, TN5250Error::Protocol(ProtocolError::InvalidEraseLength { length: 6 })));
    }

    #[test]
    fn test_read_immediate_alt_sends_modified_fields() {
        let (mut session, stream) = session();
        two_fields(&mut session);
        session.process_key(Key::Char(b'a')).unwrap();
        run(&mut session, &[ESC, CMD_READ_IMMEDIATE_ALT]);
        let sent = stream.take_sent_packets();
        assert_eq!(sent[0].opcode, OPCODE_PUT_GET);
        assert_eq!(sent[0].data, vec![1, 3, 0x00, SBA, 1, 2, 0x81]);
        assert_eq!(session.read_opcode(), CMD_READ_MDT_FIELDS);
    }

    #[test]
    fn test_write_error_code_to_window() {
        let (mut session, _) = session();
        let mut data = vec![ESC, CMD_WRITE_ERROR_CODE_WINDOW, 10, 40];
        data.extend(ebcdic(&session, "BAD"));
        run(&mut session, &data);
        assert!(session.display().inhibited());
        assert_eq!(session.display().char_at(23, 0), 0xC2);
        assert_eq!(session.display().char_at(23, 2), 0xC4);
    }

    #[test]
    fn test_save_partial_screen_restores() {
        let (mut session, stream) = session();
        two_fields(&mut session);
        run(&mut session, &[ESC, CMD_SAVE_PARTIAL_SCREEN, 0x00, 5, 10, 8, 40]);
        let sent = stream.take_sent_packets();
        assert_eq!(sent[0].opcode, OPCODE_SAVE_SCR);

        let mut replay = vec![ESC, CMD_RESTORE_PARTIAL_SCREEN];
        replay.extend_from_slice(&sent[0].data);
        let (mut restored, _) = self::session();
        restored
            .process_record(wire(OPCODE_RESTORE_SCR, 0, &replay))
            .unwrap();
        assert_eq!(restored.display().buffer().as_bytes(), session.display().buffer().as_bytes());
        assert_eq!(restored.display().buffer().fields(), session.display().buffer().fields());
        assert_eq!(restored.read_opcode(), CMD_READ_MDT_FIELDS);
    }

    #[test]
    fn test_field_at_origin_survives_save() {
        let (mut session, stream) = session();
        run(
            &mut session,
            &[ESC, CMD_CLEAR_UNIT, ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x00, SBA, 24, 80, SF, 0x40, 0x00, 0x20, 0x00, 0x05],
        );
        let f = session.display().buffer().field(0);
        assert_eq!((f.start_row, f.start_col, f.length), (0, 0, 5));

        let restored = save_and_restore(&mut session, &stream);
        assert_eq!(restored.display().buffer().as_bytes(), session.display().buffer().as_bytes());
        assert_eq!(restored.display().buffer().fields(), session.display().buffer().fields());
    }

    #[test]
    fn test_transparent_data() {
        let (mut session, stream) = session();
        run(
            &mut session,
            &[ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x00, SBA, 2, 2, TD, 0x00, 0x03, 0x11, 0x04, 0x1D, 0xC1],
        );
        let display = session.display();
        assert_eq!(display.char_at(1, 1), 0x11);
        assert_eq!(display.char_at(1, 2), 0x04);
        assert_eq!(display.char_at(1, 3), 0x1D);
        assert_eq!(display.char_at(1, 4), 0xC1);

        let restored = save_and_restore(&mut session, &stream);
        assert_eq!(restored.display().buffer().as_bytes(), session.display().buffer().as_bytes());
    }

    #[test]
    fn test_move_cursor_leaves_insert_cursor() {
        let (mut session, _) = session();
        run(&mut session, &[ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x00, MC, 5, 7]);
        assert_eq!((session.display().cursor_y(), session.display().cursor_x()), (4, 6));
        assert!(!session.display().pending_insert());
    }

    #[test]
    fn test_read_screen_immediate_sends_grid() {
        let (mut session, stream) = session();
        run(&mut session, &[ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x00, SBA, 1, 1, 0xC1, 0xC2]);
        run(&mut session, &[ESC, CMD_READ_SCREEN_IMMEDIATE]);
        let sent = stream.take_sent_packets();
        assert_eq!(sent[0].opcode, OPCODE_NO_OP);
        assert_eq!(sent[0].data.len(), 80 * 24);
        assert_eq!(&sent[0].data[..3], &[0xC1, 0xC2, 0x00]);
    }

    #[test]
    fn test_roll_down() {
        let (mut session, _) = session();
        run(&mut session, &[ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x00, SBA, 3, 1, 0xC1]);
        run(&mut session, &[ESC, CMD_ROLL, 0x81, 2, 5]);
        assert_eq!(session.display().char_at(3, 0), 0xC1);
        assert_eq!(session.display().char_at(2, 0), 0x00);
    }

    #[test]
    fn test_clear_unit_alternate_from_host() {
        let (mut session, _) = session();
        two_fields(&mut session);
        run(
            &mut session,
            &[ESC, CMD_CLEAR_UNIT_ALTERNATE, 0x00, ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x00, SBA, 27, 132, 0xC1],
        );
        let display = session.display();
        assert_eq!((display.width(), display.height()), (132, 27));
        assert_eq!(display.buffer().field_count(), 0);
        assert_eq!(display.char_at(26, 131), 0xC1);
        assert_eq!(session.read_opcode(), 0);
    }

    #[test]
    fn test_roll_up() {
        let (mut session, _) = session();
        run(&mut session, &[ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x00, SBA, 3, 1, 0xC1]);
        run(&mut session, &[ESC, CMD_ROLL, 0x01, 2, 5]);
        assert_eq!(session.display().char_at(1, 0), 0xC1);
    }

    #[test]
    fn test_locked_keys_replay_in_order() {
        let (mut session, _) = session();
        let term = HeadlessTerminal::default();
        session.display_mut().set_terminal(Box::new(term.clone()));
        two_fields(&mut session);
        session.display_mut().indicator_set(TN5250_DISPLAY_IND_X_SYSTEM);

        term.type_text("abcde");
        term.request_quit();
        assert_eq!(session.wait_event().unwrap(), EVENT_QUIT);
        assert_eq!(session.display().queued_keys(), 5);
        assert_eq!(session.display().buffer().field_data(0), &[0; 5]);

        run(&mut session, &[ESC, CMD_WRITE_TO_DISPLAY, 0x00, CC2_UNLOCK]);
        assert_eq!(session.wait_event().unwrap(), EVENT_QUIT);
        assert_eq!(session.display().queued_keys(), 0);
        assert_eq!(session.display().buffer().field_data(0), &[0x81, 0x82, 0x83, 0x84, 0x85]);
    }

    #[test]
    fn test_shutdown_handle() {
        let (mut session, _) = session();
        session.shutdown_handle().store(true, Ordering::Relaxed);
        session.main_loop().unwrap();
    }
}
