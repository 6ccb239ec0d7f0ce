//! Error taxonomy for the 5250 engine
//!
//! Errors are grouped by the layer that raises them. Transport faults and
//! protocol violations end the session; keyboard validation failures are not
//! errors at all, they only inhibit the keyboard.

use std::io;

use thiserror::Error;

/// Top-level error type for engine operations
#[derive(Debug, Error)]
pub enum TN5250Error {
    /// Network connection errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    /// Telnet option negotiation errors
    #[error("Telnet error: {0}")]
    Telnet(#[from] TelnetError),
    /// 5250 data stream violations
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Local I/O that is not tied to the host connection (trace files, config files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Network connection related errors
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Connection refused by remote host
    #[error("Connection refused to {host}:{port}")]
    ConnectionRefused { host: String, port: u16 },
    /// DNS resolution failure
    #[error("DNS resolution failed for {host}")]
    DnsResolution { host: String },
    /// Invalid network address
    #[error("Invalid network address: {address}")]
    InvalidAddress { address: String },
    /// Connection lost during operation
    #[error("Connection lost: {reason}")]
    ConnectionLost { reason: String },
}

/// Telnet negotiation errors
#[derive(Debug, Error)]
pub enum TelnetError {
    /// A reply could not be written back to the peer
    #[error("Failed to send negotiation reply for option {option}: {reason}")]
    ReplyFailed { option: u8, reason: String },
}

/// 5250 data stream violations. None of these are recoverable: they mean the
/// host is non-conformant or framing has been lost.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Record shorter than the fixed + variable header
    #[error("Record too short: {length} bytes")]
    ShortRecord { length: usize },
    /// Read past the end of a record
    #[error("Unexpected end of record at offset {offset}")]
    UnexpectedEnd { offset: usize },
    /// Unget with nothing consumed
    #[error("Cannot unget before start of record")]
    UngetAtStart,
    /// Command stream did not begin with ESC
    #[error("Expected ESC (0x04) before command, found 0x{found:02X}")]
    ExpectedEscape { found: u8 },
    /// Invalid 5250 command code
    #[error("Invalid 5250 command code: 0x{code:02X}")]
    InvalidCommandCode { code: u8 },
    /// Unknown or unsupported order inside Write To Display
    #[error("Unknown order: 0x{order:02X}")]
    UnknownOrder { order: u8 },
    /// Unknown record opcode
    #[error("Unknown record opcode: 0x{opcode:02X}")]
    UnknownOpcode { opcode: u8 },
    /// Set Buffer Address outside the addressable range
    #[error("Invalid buffer address: row {row}, col {col}")]
    InvalidBufferAddress { row: u8, col: u8 },
    /// Start Of Field defining an input field with no cells
    #[error("Invalid field length: {length}")]
    InvalidFieldLength { length: u16 },
    /// Start Of Field whose cells would run past the last screen position
    #[error("Field at row {row}, col {col} with length {length} runs past the end of the screen")]
    FieldOverrun { row: usize, col: usize, length: u16 },
    /// Erase To Address attribute-type list length outside 2..=5
    #[error("Invalid erase to address length: {length}")]
    InvalidEraseLength { length: u8 },
    /// Start Of Header length outside 1..=7
    #[error("Invalid format table header length: {length}")]
    InvalidHeaderLength { length: u8 },
    /// Terminal type string is not of the IBM-TTTT-MM form
    #[error("Cannot derive device type from terminal type '{term}'")]
    InvalidTerminalType { term: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration parameter
    #[error("Invalid value '{value}' for '{parameter}': {reason}")]
    InvalidParameter { parameter: String, value: String, reason: String },
    /// Missing required configuration
    #[error("Missing required configuration '{parameter}'")]
    MissingRequired { parameter: String },
    /// No translation table with this name
    #[error("Unknown character map '{name}'")]
    UnknownCharMap { name: String },
    /// Configuration file could not be parsed
    #[error("Configuration file {path}: {error}")]
    FileError { path: String, error: String },
}

/// Result type alias for engine operations
pub type TN5250Result<T> = Result<T, TN5250Error>;

/// Specialized result types for different components
pub type ProtocolResult<T> = Result<T, ProtocolError>;
pub type ConfigResult<T> = Result<T, ConfigError>;

impl TN5250Error {
    /// True when the error means the host connection is gone.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TN5250Error::Network(NetworkError::ConnectionLost { .. }))
    }
}

impl NetworkError {
    /// Map a socket error raised while talking to `host`.
    pub fn from_io(host: &str, port: u16, err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => NetworkError::ConnectionRefused {
                host: host.to_string(),
                port,
            },
            _ => NetworkError::ConnectionLost {
                reason: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err: TN5250Error = ProtocolError::InvalidCommandCode { code: 0x99 }.into();
        assert_eq!(err.to_string(), "Protocol error: Invalid 5250 command code: 0x99");
    }

    #[test]
    fn test_disconnect_detection() {
        let lost: TN5250Error = NetworkError::ConnectionLost { reason: "eof".into() }.into();
        assert!(lost.is_disconnect());
        let refused = NetworkError::from_io(
            "as400",
            23,
            &io::Error::new(io::ErrorKind::ConnectionRefused, "nope"),
        );
        assert!(matches!(refused, NetworkError::ConnectionRefused { port: 23, .. }));
        assert!(!TN5250Error::from(refused).is_disconnect());
    }
}
