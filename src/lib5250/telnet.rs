//! Telnet layer for 5250 (RFC 1205 / RFC 2877)
//!
//! A byte-at-a-time decoder that separates 5250 payload from telnet
//! commands, answers option negotiation, and frames records on `IAC EOR`.
//! Nothing here touches a socket: the decoder hands back the bytes to
//! send and the stream layer writes them.

use crate::lib5250::codes::{RECORD_HEADER_LEN, RECORD_TYPE, RECORD_VAR_HEADER_LEN};

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const SE: u8 = 240;
pub const EOR: u8 = 239;

/// Sub-negotiation qualifiers
pub const IS: u8 = 0;
pub const SEND: u8 = 1;
pub const VAR: u8 = 0;
pub const VALUE: u8 = 1;
pub const USERVAR: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelnetOption {
    Binary = 0,
    TimingMark = 6,
    TerminalType = 24,
    EndOfRecord = 25,
    NewEnviron = 39,
}

impl TelnetOption {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TelnetOption::Binary),
            6 => Some(TelnetOption::TimingMark),
            24 => Some(TelnetOption::TerminalType),
            25 => Some(TelnetOption::EndOfRecord),
            39 => Some(TelnetOption::NewEnviron),
            _ => None,
        }
    }

    /// Options a 5250 terminal agrees to on either side of the connection.
    pub fn is_supported(self) -> bool {
        matches!(
            self,
            TelnetOption::Binary
                | TelnetOption::TerminalType
                | TelnetOption::EndOfRecord
                | TelnetOption::NewEnviron
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelnetCommand {
    Will = 251,
    Wont = 252,
    Do = 253,
    Dont = 254,
}

impl TelnetCommand {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            WILL => Some(TelnetCommand::Will),
            WONT => Some(TelnetCommand::Wont),
            DO => Some(TelnetCommand::Do),
            DONT => Some(TelnetCommand::Dont),
            _ => None,
        }
    }
}

/// Answers option negotiation and sub-negotiation requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelnetNegotiator {
    terminal_type: String,
    environment: Vec<(String, String)>,
}

impl TelnetNegotiator {
    /// `environment` is sent in order in NEW-ENVIRON replies.
    pub fn new(terminal_type: &str, environment: Vec<(String, String)>) -> Self {
        Self {
            terminal_type: terminal_type.to_string(),
            environment,
        }
    }

    pub fn terminal_type(&self) -> &str {
        &self.terminal_type
    }

    /// Reply to `IAC <verb> <option>`. DONT and WONT are left unanswered.
    pub fn process_command(&self, verb: TelnetCommand, option: u8) -> Option<Vec<u8>> {
        let supported = TelnetOption::from_u8(option).map_or(false, TelnetOption::is_supported);
        let reply = match verb {
            TelnetCommand::Do => {
                if supported {
                    WILL
                } else {
                    WONT
                }
            }
            TelnetCommand::Will => {
                if option == TelnetOption::TimingMark as u8 {
                    log::debug!("IAC WILL TIMING-MARK received");
                }
                if supported {
                    DO
                } else {
                    DONT
                }
            }
            TelnetCommand::Dont | TelnetCommand::Wont => return None,
        };
        log::debug!("telnet: {:?} {} -> {}", verb, option, reply);
        Some(vec![IAC, reply, option])
    }

    /// Reply to a complete `IAC SB ... IAC SE` body (IAC SB and IAC SE
    /// stripped).
    pub fn process_subnegotiation(&self, sb: &[u8]) -> Option<Vec<u8>> {
        let (&option, rest) = sb.split_first()?;
        match TelnetOption::from_u8(option) {
            Some(TelnetOption::TerminalType) => {
                if rest.first() != Some(&SEND) {
                    return None;
                }
                let mut out = vec![IAC, SB, option, IS];
                out.extend_from_slice(self.terminal_type.as_bytes());
                out.extend_from_slice(&[IAC, SE]);
                log::debug!("telnet: sending terminal type {}", self.terminal_type);
                Some(out)
            }
            Some(TelnetOption::NewEnviron) => {
                let mut out = vec![IAC, SB, option, IS];
                for (name, value) in &self.environment {
                    out.push(VAR);
                    out.extend_from_slice(name.as_bytes());
                    out.push(VALUE);
                    out.extend_from_slice(value.as_bytes());
                }
                out.extend_from_slice(&[IAC, SE]);
                log::debug!("telnet: sending {} environment variables", self.environment.len());
                Some(out)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Data,
    HaveIac,
    HaveVerb(TelnetCommand),
    HaveSb,
    HaveSbIac,
}

/// Outcome of feeding one byte to the decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Byte consumed by the telnet layer
    Nothing,
    /// One byte of 5250 payload
    Byte(u8),
    /// `IAC EOR`
    EndOfRecord,
    /// Bytes that must be written back to the peer
    Reply(Vec<u8>),
}

/// Telnet receive state machine
#[derive(Debug, Clone)]
pub struct TelnetDecoder {
    state: DecodeState,
    sb_buf: Vec<u8>,
    negotiator: TelnetNegotiator,
}

impl TelnetDecoder {
    pub fn new(negotiator: TelnetNegotiator) -> Self {
        Self {
            state: DecodeState::Data,
            sb_buf: Vec::new(),
            negotiator,
        }
    }

    pub fn negotiator(&self) -> &TelnetNegotiator {
        &self.negotiator
    }

    /// True when no telnet command is partially received.
    pub fn is_idle(&self) -> bool {
        self.state == DecodeState::Data
    }

    pub fn push(&mut self, byte: u8) -> Decoded {
        match self.state {
            DecodeState::Data => {
                if byte == IAC {
                    self.state = DecodeState::HaveIac;
                    Decoded::Nothing
                } else {
                    Decoded::Byte(byte)
                }
            }
            DecodeState::HaveIac => {
                self.state = DecodeState::Data;
                match byte {
                    IAC => Decoded::Byte(IAC),
                    EOR => Decoded::EndOfRecord,
                    SB => {
                        self.sb_buf.clear();
                        self.state = DecodeState::HaveSb;
                        Decoded::Nothing
                    }
                    _ => match TelnetCommand::from_u8(byte) {
                        Some(verb) => {
                            self.state = DecodeState::HaveVerb(verb);
                            Decoded::Nothing
                        }
                        None => {
                            log::warn!("telnet: unknown escape 0x{:02X} in stream", byte);
                            Decoded::Nothing
                        }
                    },
                }
            }
            DecodeState::HaveVerb(verb) => {
                self.state = DecodeState::Data;
                match self.negotiator.process_command(verb, byte) {
                    Some(reply) => Decoded::Reply(reply),
                    None => Decoded::Nothing,
                }
            }
            DecodeState::HaveSb => {
                if byte == IAC {
                    self.state = DecodeState::HaveSbIac;
                } else {
                    self.sb_buf.push(byte);
                }
                Decoded::Nothing
            }
            DecodeState::HaveSbIac => match byte {
                IAC => {
                    self.sb_buf.push(IAC);
                    self.state = DecodeState::HaveSb;
                    Decoded::Nothing
                }
                SE => {
                    self.state = DecodeState::Data;
                    let sb = std::mem::take(&mut self.sb_buf);
                    match self.negotiator.process_subnegotiation(&sb) {
                        Some(reply) => Decoded::Reply(reply),
                        None => Decoded::Nothing,
                    }
                }
                _ => {
                    log::warn!("telnet: unexpected IAC SB 0x{:02X}", byte);
                    self.state = DecodeState::HaveSb;
                    Decoded::Nothing
                }
            },
        }
    }
}

/// Double every IAC byte.
pub fn escape_iac(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 2);
    for &b in data {
        out.push(b);
        if b == IAC {
            out.push(IAC);
        }
    }
    out
}

/// Build a complete outbound 5250 record: header, data, IAC escaping and
/// the terminating `IAC EOR`.
pub fn encode_packet(flow_type: u16, flags: u8, opcode: u8, data: &[u8]) -> Vec<u8> {
    let length = (data.len() + RECORD_HEADER_LEN) as u16;
    let mut packet = Vec::with_capacity(data.len() + RECORD_HEADER_LEN);
    packet.extend_from_slice(&length.to_be_bytes());
    packet.extend_from_slice(&RECORD_TYPE);
    packet.extend_from_slice(&flow_type.to_be_bytes());
    packet.extend_from_slice(&[RECORD_VAR_HEADER_LEN, flags, 0, opcode]);
    packet.extend_from_slice(data);

    let mut out = escape_iac(&packet);
    out.extend_from_slice(&[IAC, EOR]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn negotiator() -> TelnetNegotiator {
        TelnetNegotiator::new(
            "IBM-3179-2",
            vec![("DEVNAME".to_string(), "DSP01".to_string())],
        )
    }

    fn feed(decoder: &mut TelnetDecoder, bytes: &[u8]) -> Vec<Decoded> {
        bytes
            .iter()
            .map(|&b| decoder.push(b))
            .filter(|d| *d != Decoded::Nothing)
            .collect()
    }

    #[test]
    fn test_do_and_will_replies() {
        let n = negotiator();
        assert_eq!(n.process_command(TelnetCommand::Do, 24), Some(vec![IAC, WILL, 24]));
        assert_eq!(n.process_command(TelnetCommand::Do, 1), Some(vec![IAC, WONT, 1]));
        assert_eq!(n.process_command(TelnetCommand::Will, 0), Some(vec![IAC, DO, 0]));
        assert_eq!(n.process_command(TelnetCommand::Will, 6), Some(vec![IAC, DONT, 6]));
        assert_eq!(n.process_command(TelnetCommand::Dont, 24), None);
        assert_eq!(n.process_command(TelnetCommand::Wont, 24), None);
    }

    #[test]
    fn test_terminal_type_subnegotiation() {
        let mut decoder = TelnetDecoder::new(negotiator());
        let out = feed(&mut decoder, &[IAC, SB, 24, SEND, IAC, SE]);
        let mut expected = vec![IAC, SB, 24, IS];
        expected.extend_from_slice(b"IBM-3179-2");
        expected.extend_from_slice(&[IAC, SE]);
        assert_eq!(out, vec![Decoded::Reply(expected)]);
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_terminal_type_ignores_non_send() {
        assert_eq!(negotiator().process_subnegotiation(&[24, IS]), None);
    }

    #[test]
    fn test_new_environ_reply() {
        let reply = negotiator().process_subnegotiation(&[39, SEND]).unwrap();
        let mut expected = vec![IAC, SB, 39, IS, VAR];
        expected.extend_from_slice(b"DEVNAME");
        expected.push(VALUE);
        expected.extend_from_slice(b"DSP01");
        expected.extend_from_slice(&[IAC, SE]);
        assert_eq!(reply, expected);
    }

    #[test]
    fn test_payload_and_eor() {
        let mut decoder = TelnetDecoder::new(negotiator());
        let out = feed(&mut decoder, &[0x01, IAC, IAC, 0x02, IAC, EOR]);
        assert_eq!(
            out,
            vec![
                Decoded::Byte(0x01),
                Decoded::Byte(IAC),
                Decoded::Byte(0x02),
                Decoded::EndOfRecord
            ]
        );
    }

    #[test]
    fn test_unknown_escape_recovers() {
        let mut decoder = TelnetDecoder::new(negotiator());
        let out = feed(&mut decoder, &[IAC, 0x01, 0x41]);
        assert_eq!(out, vec![Decoded::Byte(0x41)]);
    }

    #[test]
    fn test_sb_doubled_iac_and_bad_escape() {
        let mut decoder = TelnetDecoder::new(negotiator());
        // IAC IAC inside SB is data; IAC x returns to SB collection
        let out = feed(&mut decoder, &[IAC, SB, 99, IAC, IAC, IAC, 0x05, 1, IAC, SE, 0x40]);
        assert_eq!(out, vec![Decoded::Byte(0x40)]);
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_encode_packet_header_and_escape() {
        let packet = encode_packet(0x0000, 0x00, 0x03, &[0x01, 0xFF]);
        assert_eq!(
            packet,
            vec![0x00, 0x0C, 0x12, 0xA0, 0x00, 0x00, 0x04, 0x00, 0x00, 0x03, 0x01, 0xFF, 0xFF, IAC, EOR]
        );
    }

    #[test]
    fn test_escape_round_trip() {
        let payload = [0xFF, 0x00, 0xFF, 0xFF, 0x12];
        let escaped = escape_iac(&payload);
        let mut decoder = TelnetDecoder::new(negotiator());
        let decoded: Vec<u8> = escaped
            .iter()
            .filter_map(|&b| match decoder.push(b) {
                Decoded::Byte(b) => Some(b),
                _ => None,
            })
            .collect();
        assert_eq!(decoded, payload);
    }
}
