//! Helpers shared by the integration tests.
#![allow(dead_code)]

use tn5250_engine::lib5250::codes::*;
use tn5250_engine::lib5250::{DebugStream, Display, Record, Session};

/// A display record as the host would frame it.
pub fn wire(opcode: u8, data: &[u8]) -> Vec<u8> {
    let len = (data.len() + RECORD_HEADER_LEN) as u16;
    let mut v = len.to_be_bytes().to_vec();
    v.extend_from_slice(&RECORD_TYPE);
    v.extend_from_slice(&FLOW_DISPLAY.to_be_bytes());
    v.extend_from_slice(&[RECORD_VAR_HEADER_LEN, H_NONE, 0x00, opcode]);
    v.extend_from_slice(data);
    v
}

pub fn record(opcode: u8, data: &[u8]) -> Record {
    Record::from_bytes(&wire(opcode, data)).expect("well-formed record")
}

/// Session over a replay transport with no trace, plus a handle on the
/// transport for inspecting sent packets.
pub fn session() -> (Session<DebugStream>, DebugStream) {
    let stream = DebugStream::from_trace("");
    let session = Session::with_terminal_type(stream.clone(), Display::new(), "IBM-3179-2");
    (session, stream)
}

/// Clear the unit and define one input field per `(row, col, len, ffw)`
/// on a 24x80 screen, all zero-based with the attribute in the cell before
/// the field. A field at (0, 0) has its attribute in the last cell.
pub fn format_stream(fields: &[(u8, u8, u16, u16)]) -> Vec<u8> {
    let mut data = vec![ESC, CMD_CLEAR_UNIT, ESC, CMD_WRITE_TO_DISPLAY, 0x00, 0x00];
    for &(row, col, len, ffw) in fields {
        let attr = (row as usize * 80 + col as usize + 1919) % 1920;
        data.extend_from_slice(&[SBA, (attr / 80 + 1) as u8, (attr % 80 + 1) as u8]);
        data.push(SF);
        data.extend_from_slice(&ffw.to_be_bytes());
        data.push(ATTR_5250_NORMAL);
        data.extend_from_slice(&len.to_be_bytes());
    }
    data
}
