//! tn5250-engine: a 5250 terminal emulator core.
//!
//! Connects to an IBM i host over telnet (RFC 1205, RFC 2877), keeps the
//! emulated display in step with the host's data stream and answers its
//! read commands with keyboard input.

pub mod config;
pub mod ebcdic;
pub mod error;
pub mod lib5250;
pub mod terminal;

pub use config::SessionConfig;
pub use ebcdic::CharMap;
pub use error::{ProtocolError, TN5250Error, TN5250Result};
pub use lib5250::{Display, Session};
pub use terminal::{HeadlessTerminal, Key, LineTerminal, Terminal};
