//! Trace replay
//!
//! Replays a session captured in the `@record` trace format instead of
//! talking to a host. [`DebugStream`] is the transport side: it hands out
//! the records read from the trace and keeps every packet the session sends
//! back. [`DebugTerminal`] is the terminal side: it walks the trace,
//! reporting a DATA event at each `@eor` and a KEY event at each `@key`,
//! and hands over to an inner terminal once the trace runs out.
//!
//! ```text
//! @record +0000 00120000 ...
//! @eor
//! @key 13
//! ```

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{ProtocolResult, TN5250Result};
use crate::lib5250::display::Display;
use crate::lib5250::record::{Record, RecordQueue};
use crate::lib5250::stream::{self, Transport};
use crate::terminal::{self, Key, Terminal, EVENT_DATA, EVENT_KEY, EVENT_QUIT};

/// Hex dump columns of an `@record` line: 16 bytes in groups of four
const HEX_START: usize = 14;
const HEX_END: usize = 49;

/// A packet the session sent during replay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub flow_type: u16,
    pub flags: u8,
    pub opcode: u8,
    pub data: Vec<u8>,
}

struct TraceState {
    reader: Box<dyn BufRead + Send>,
    eof: bool,
    current: Option<Record>,
    records: RecordQueue,
    sent: Vec<SentPacket>,
    key: Option<i32>,
}

impl TraceState {
    /// Next line of the trace, or None at end of file.
    fn next_line(&mut self) -> TN5250Result<Option<Vec<u8>>> {
        if self.eof {
            return Ok(None);
        }
        let mut line = Vec::new();
        if self.reader.read_until(b'\n', &mut line)? == 0 {
            self.eof = true;
            return Ok(None);
        }
        Ok(Some(line))
    }
}

type SharedTrace = Arc<Mutex<TraceState>>;

fn lock(state: &SharedTrace) -> MutexGuard<'_, TraceState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Decode the hex columns of an `@record` line.
pub fn parse_record_line(line: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(16);
    let at = |n: usize| line.get(n).copied().unwrap_or(b' ');
    let mut n = HEX_START;
    while n < HEX_END {
        if at(n).is_ascii_whitespace() {
            n += 1;
        }
        if at(n).is_ascii_whitespace() {
            break;
        }
        let hex = [at(n), at(n + 1)];
        match std::str::from_utf8(&hex).ok().and_then(|s| u8::from_str_radix(s, 16).ok()) {
            Some(b) => bytes.push(b),
            None => {
                log::warn!("trace: bad hex digits {:?} at column {}", String::from_utf8_lossy(&hex), n);
                break;
            }
        }
        n += 2;
    }
    bytes
}

/// Replay transport
#[derive(Clone)]
pub struct DebugStream {
    state: SharedTrace,
}

impl fmt::Debug for DebugStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("DebugStream")
            .field("eof", &state.eof)
            .field("records", &state.records.count())
            .field("sent", &state.sent.len())
            .finish()
    }
}

impl DebugStream {
    /// Open a trace file for replay.
    pub fn open<P: AsRef<Path>>(path: P) -> TN5250Result<Self> {
        let file = File::open(path.as_ref())?;
        log::info!("replaying trace {}", path.as_ref().display());
        Ok(Self::from_reader(BufReader::new(file)))
    }

    pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> Self {
        Self {
            state: Arc::new(Mutex::new(TraceState {
                reader: Box::new(reader),
                eof: false,
                current: None,
                records: RecordQueue::new(),
                sent: Vec::new(),
                key: None,
            })),
        }
    }

    /// Replay a trace held in memory.
    pub fn from_trace(text: &str) -> Self {
        Self::from_reader(Cursor::new(text.as_bytes().to_vec()))
    }

    /// The terminal that walks this trace. `inner` takes over at the end of
    /// the trace; with `pause` set it is also waited on before each
    /// replayed key.
    pub fn terminal(&self, inner: Option<Box<dyn Terminal>>, pause: bool) -> DebugTerminal {
        DebugTerminal {
            state: Arc::clone(&self.state),
            inner,
            pause,
        }
    }

    /// Packets sent so far
    pub fn sent_packets(&self) -> Vec<SentPacket> {
        lock(&self.state).sent.clone()
    }

    pub fn take_sent_packets(&self) -> Vec<SentPacket> {
        std::mem::take(&mut lock(&self.state).sent)
    }

    pub fn is_eof(&self) -> bool {
        lock(&self.state).eof
    }
}

impl stream::private::Sealed for DebugStream {}

impl Transport for DebugStream {
    fn handle_receive(&mut self) -> TN5250Result<bool> {
        Ok(true)
    }

    fn poll(&mut self, _timeout: Duration) -> TN5250Result<bool> {
        Ok(lock(&self.state).records.count() > 0)
    }

    fn record_count(&self) -> usize {
        lock(&self.state).records.count()
    }

    fn get_record(&mut self) -> Option<ProtocolResult<Record>> {
        lock(&self.state).records.pop()
    }

    fn drain_records(&mut self) -> usize {
        lock(&self.state).records.drain()
    }

    fn send_packet(&mut self, flow_type: u16, flags: u8, opcode: u8, data: &[u8]) -> TN5250Result<()> {
        log::trace!("replay: sent opcode {} with {} bytes", opcode, data.len());
        lock(&self.state).sent.push(SentPacket {
            flow_type,
            flags,
            opcode,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn disconnect(&mut self) {
        lock(&self.state).eof = true;
    }
}

/// Replay terminal
pub struct DebugTerminal {
    state: SharedTrace,
    inner: Option<Box<dyn Terminal>>,
    pause: bool,
}

impl fmt::Debug for DebugTerminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugTerminal")
            .field("inner", &self.inner.is_some())
            .field("pause", &self.pause)
            .finish()
    }
}

impl DebugTerminal {
    pub fn set_pause(&mut self, pause: bool) {
        self.pause = pause;
    }

    fn inner_wait(&mut self, timeout: Duration) -> TN5250Result<u32> {
        match self.inner.as_mut() {
            Some(term) => term.wait_event(timeout),
            None => Ok(EVENT_QUIT),
        }
    }
}

impl terminal::private::Sealed for DebugTerminal {}

impl Terminal for DebugTerminal {
    fn width(&self) -> usize {
        self.inner.as_ref().map_or(80, |t| t.width())
    }

    fn height(&self) -> usize {
        self.inner.as_ref().map_or(24, |t| t.height())
    }

    fn wait_event(&mut self, timeout: Duration) -> TN5250Result<u32> {
        loop {
            let line = lock(&self.state).next_line()?;
            let Some(line) = line else {
                return self.inner_wait(timeout);
            };
            if line.first() != Some(&b'@') {
                continue;
            }

            if line.starts_with(b"@record ") {
                let bytes = parse_record_line(&line);
                let mut state = lock(&self.state);
                let record = state.current.get_or_insert_with(Record::new);
                for b in bytes {
                    record.append_byte(b);
                }
            } else if line.starts_with(b"@eor") {
                let mut state = lock(&self.state);
                let record = state.current.take().unwrap_or_default();
                state.records.push_record(record);
                return Ok(EVENT_DATA);
            } else if line.starts_with(b"@abort") {
                log::error!("trace requested abort");
                return Ok(EVENT_QUIT);
            } else if line.starts_with(b"@key ") {
                let text = String::from_utf8_lossy(&line[5..]);
                let code = text.trim().parse::<i32>().unwrap_or_else(|_| {
                    log::warn!("trace: bad key line {:?}", text.trim());
                    -1
                });
                if self.pause {
                    if let Some(term) = self.inner.as_mut() {
                        term.wait_event(timeout)?;
                    }
                }
                lock(&self.state).key = Some(code);
                return Ok(EVENT_KEY);
            }
        }
    }

    fn get_key(&mut self) -> Option<Key> {
        let (key, eof) = {
            let mut state = lock(&self.state);
            (state.key.take(), state.eof)
        };
        match key {
            Some(code) => {
                // Swallow whatever the user pressed to step the replay.
                if let Some(term) = self.inner.as_mut() {
                    term.get_key();
                }
                let key = Key::from_code(code);
                if key.is_none() {
                    log::debug!("trace: unknown key code {}", code);
                }
                key
            }
            None if eof => self.inner.as_mut().and_then(|t| t.get_key()),
            None => None,
        }
    }

    fn beep(&mut self) {
        if let Some(term) = self.inner.as_mut() {
            term.beep();
        }
    }

    fn update(&mut self, display: &Display) {
        if let Some(term) = self.inner.as_mut() {
            term.update(display);
        }
    }

    fn update_indicators(&mut self, display: &Display) {
        if let Some(term) = self.inner.as_mut() {
            term.update_indicators(display);
        }
    }
}
