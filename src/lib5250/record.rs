//! Record framer
//!
//! A [`Record`] is one `IAC EOR` delimited unit of 5250 data. The telnet
//! layer appends decoded payload bytes to the record under construction and
//! moves it to the [`RecordQueue`] at end of record. The session engine then
//! reads it front to back with [`Record::get_byte`].

use std::collections::VecDeque;
use std::fmt::Write as _;

use crate::ebcdic::CharMap;
use crate::error::{ProtocolError, ProtocolResult};
use crate::lib5250::codes::{H_ATN, H_SRQ, RECORD_HEADER_LEN};

/// One inbound or outbound 5250 record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    data: Vec<u8>,
    pos: usize,
    header_length: usize,
    flow_type: u16,
    flags: u8,
    opcode: u8,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from raw wire bytes and parse its header.
    pub fn from_bytes(data: &[u8]) -> ProtocolResult<Self> {
        let mut record = Self {
            data: data.to_vec(),
            ..Self::default()
        };
        record.parse_header()?;
        Ok(record)
    }

    pub fn append_byte(&mut self, byte: u8) {
        self.data.push(byte);
    }

    /// Decode the fixed and variable header and position the cursor on the
    /// first data byte after it.
    pub fn parse_header(&mut self) -> ProtocolResult<()> {
        if self.data.len() < RECORD_HEADER_LEN {
            return Err(ProtocolError::ShortRecord { length: self.data.len() });
        }
        self.flow_type = u16::from_be_bytes([self.data[4], self.data[5]]);
        self.flags = self.data[7];
        self.opcode = self.data[9];
        let offset = 6 + self.data[6] as usize;
        if offset > self.data.len() {
            return Err(ProtocolError::ShortRecord { length: self.data.len() });
        }
        log::trace!("record header offset = {}", offset);
        self.header_length = offset;
        self.pos = offset;
        Ok(())
    }

    /// Read the next byte. Reading past the end means the host and the
    /// terminal disagree about the record layout.
    pub fn get_byte(&mut self) -> ProtocolResult<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(ProtocolError::UnexpectedEnd { offset: self.offset() })?;
        self.pos += 1;
        Ok(byte)
    }

    /// Step back over the byte just read.
    pub fn unget_byte(&mut self) -> ProtocolResult<()> {
        if self.pos <= self.header_length {
            return Err(ProtocolError::UngetAtStart);
        }
        self.pos -= 1;
        Ok(())
    }

    /// True when every data byte has been consumed.
    pub fn is_chain_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Read position relative to the first data byte
    pub fn offset(&self) -> usize {
        self.pos - self.header_length
    }

    /// Data bytes following the header
    pub fn payload(&self) -> &[u8] {
        &self.data[self.header_length.min(self.data.len())..]
    }

    /// Raw bytes including the header
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn flow_type(&self) -> u16 {
        self.flow_type
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn header_length(&self) -> usize {
        self.header_length
    }

    pub fn sys_request(&self) -> bool {
        self.flags & H_SRQ != 0
    }

    pub fn attention(&self) -> bool {
        self.flags & H_ATN != 0
    }

    /// Render the whole record in the `@record` trace format, one line per
    /// 16 bytes, terminated by `@eor`.
    pub fn dump(&self, map: &CharMap) -> String {
        let mut out = String::new();
        for (line, chunk) in self.data.chunks(16).enumerate() {
            let _ = write!(out, "@record +{:04X} ", line * 16);
            let mut text = String::with_capacity(16);
            for n in 0..16 {
                match chunk.get(n) {
                    Some(&b) => {
                        let _ = write!(out, "{:02x}", b);
                        let local = map.to_local(b);
                        text.push(if local.is_ascii_graphic() || local == b' ' {
                            local as char
                        } else {
                            '.'
                        });
                    }
                    None => out.push_str("  "),
                }
                if (n + 1) % 4 == 0 {
                    out.push(' ');
                }
            }
            let _ = writeln!(out, " {}", text);
        }
        out.push_str("@eor\n");
        out
    }
}

/// FIFO of completed records plus the record under construction
#[derive(Debug, Default)]
pub struct RecordQueue {
    records: VecDeque<Record>,
    current: Option<Record>,
}

impl RecordQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a payload byte to the record being framed.
    pub fn push_byte(&mut self, byte: u8) {
        self.current.get_or_insert_with(Record::new).append_byte(byte);
    }

    /// Close the record being framed. An end-of-record with nothing framed
    /// is ignored. Returns true when a record was queued.
    pub fn end_record(&mut self) -> bool {
        match self.current.take() {
            Some(record) => {
                self.records.push_back(record);
                true
            }
            None => false,
        }
    }

    /// Queue an already framed record.
    pub fn push_record(&mut self, record: Record) {
        self.records.push_back(record);
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Dequeue the oldest record with its header parsed.
    pub fn pop(&mut self) -> Option<ProtocolResult<Record>> {
        let mut record = self.records.pop_front()?;
        Some(record.parse_header().map(|_| record))
    }

    /// Discard every queued record.
    pub fn drain(&mut self) -> usize {
        let n = self.records.len();
        self.records.clear();
        n
    }
}
