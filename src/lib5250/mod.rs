//! 5250 data stream engine
//!
//! Layered bottom-up: the telnet transport yields records, the session
//! interprets their command streams against the display, and the display
//! owns the screen buffer, field table and keyboard handling.

pub mod buffer;
pub mod codes;
pub mod debug;
pub mod display;
pub mod field;
pub mod record;
pub mod session;
pub mod stream;
pub mod telnet;
pub mod wtd;

pub use buffer::{DisplayBuffer, FieldId};
pub use codes::*;
pub use debug::{DebugStream, DebugTerminal, SentPacket};
pub use display::{AidKey, Display};
pub use field::Field;
pub use record::{Record, RecordQueue};
pub use session::Session;
pub use stream::{TelnetStream, Transport};
pub use telnet::{TelnetDecoder, TelnetNegotiator};
pub use wtd::WtdContext;
