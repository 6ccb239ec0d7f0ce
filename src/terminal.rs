//! Terminal front ends
//!
//! The session engine talks to the user through a [`Terminal`]: it asks for
//! events, reads keys, beeps and hands over the display for rendering. The
//! set of front ends is closed; this module provides a headless terminal
//! driven programmatically and a line-oriented terminal on stdin/stdout.
//! The trace replay terminal lives in [`crate::lib5250::debug`].

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::error::TN5250Result;
use crate::lib5250::display::Display;

/// A key is waiting; fetch it with [`Terminal::get_key`].
pub const EVENT_KEY: u32 = 0x01;
/// The host connection has data (or the replay has a record) waiting.
pub const EVENT_DATA: u32 = 0x02;
/// The user asked to quit.
pub const EVENT_QUIT: u32 = 0x04;

// Key numbers follow curses, so traces captured from a curses front end
// replay unchanged.
pub const K_TAB: i32 = 0x09;
pub const K_NEWLINE: i32 = 0x0a;
pub const K_ENTER: i32 = 0x0d;
pub const K_SYSREQ: i32 = 0o401;
pub const K_DOWN: i32 = 0o402;
pub const K_UP: i32 = 0o403;
pub const K_LEFT: i32 = 0o404;
pub const K_RIGHT: i32 = 0o405;
pub const K_HOME: i32 = 0o406;
pub const K_BACKSPACE: i32 = 0o407;
pub const K_F0: i32 = 0o410;
pub const K_ATTENTION: i32 = 0o511;
pub const K_DELETE: i32 = 0o512;
pub const K_INSERT: i32 = 0o513;
pub const K_FIELDEXIT: i32 = 0o517;
pub const K_FIELDPLUS: i32 = 0o520;
pub const K_ROLLUP: i32 = 0o522;
pub const K_ROLLDN: i32 = 0o523;
pub const K_DUPLICATE: i32 = 0o524;
pub const K_FIELDMINUS: i32 = 0o526;
pub const K_RESET: i32 = 0o531;
pub const K_PRINT: i32 = 0o532;
pub const K_BACKTAB: i32 = 0o541;
pub const K_END: i32 = 0o550;
pub const K_HELP: i32 = 0o553;

/// A 5250 keyboard key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// Data key, local (Latin-1) code
    Char(u8),
    Enter,
    Tab,
    BackTab,
    /// Function key 1..=24
    F(u8),
    SysReq,
    Reset,
    FieldExit,
    FieldPlus,
    FieldMinus,
    Dup,
    Attention,
    Print,
    Help,
    Home,
    End,
    Insert,
    Delete,
    Backspace,
    Left,
    Right,
    Up,
    Down,
    RollUp,
    RollDown,
}

impl Key {
    /// Decode a curses-style key number.
    pub fn from_code(code: i32) -> Option<Self> {
        let key = match code {
            K_ENTER | K_NEWLINE => Key::Enter,
            K_TAB => Key::Tab,
            K_BACKTAB => Key::BackTab,
            c if (K_F0 + 1..=K_F0 + 24).contains(&c) => Key::F((c - K_F0) as u8),
            K_SYSREQ => Key::SysReq,
            K_RESET => Key::Reset,
            K_FIELDEXIT => Key::FieldExit,
            K_FIELDPLUS => Key::FieldPlus,
            K_FIELDMINUS => Key::FieldMinus,
            K_DUPLICATE => Key::Dup,
            K_ATTENTION => Key::Attention,
            K_PRINT => Key::Print,
            K_HELP => Key::Help,
            K_HOME => Key::Home,
            K_END => Key::End,
            K_INSERT => Key::Insert,
            K_DELETE => Key::Delete,
            K_BACKSPACE => Key::Backspace,
            K_LEFT => Key::Left,
            K_RIGHT => Key::Right,
            K_UP => Key::Up,
            K_DOWN => Key::Down,
            K_ROLLUP => Key::RollUp,
            K_ROLLDN => Key::RollDown,
            c if (0x20..=0xff).contains(&c) => Key::Char(c as u8),
            _ => return None,
        };
        Some(key)
    }

    /// The curses-style key number for this key.
    pub fn code(self) -> i32 {
        match self {
            Key::Char(c) => i32::from(c),
            Key::Enter => K_ENTER,
            Key::Tab => K_TAB,
            Key::BackTab => K_BACKTAB,
            Key::F(n) => K_F0 + i32::from(n),
            Key::SysReq => K_SYSREQ,
            Key::Reset => K_RESET,
            Key::FieldExit => K_FIELDEXIT,
            Key::FieldPlus => K_FIELDPLUS,
            Key::FieldMinus => K_FIELDMINUS,
            Key::Dup => K_DUPLICATE,
            Key::Attention => K_ATTENTION,
            Key::Print => K_PRINT,
            Key::Help => K_HELP,
            Key::Home => K_HOME,
            Key::End => K_END,
            Key::Insert => K_INSERT,
            Key::Delete => K_DELETE,
            Key::Backspace => K_BACKSPACE,
            Key::Left => K_LEFT,
            Key::Right => K_RIGHT,
            Key::Up => K_UP,
            Key::Down => K_DOWN,
            Key::RollUp => K_ROLLUP,
            Key::RollDown => K_ROLLDN,
        }
    }

    /// Look up a key by its bracketed name as typed on the line terminal,
    /// e.g. `enter`, `f3`, `fieldexit`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        if let Some(n) = name.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
            return (1..=24).contains(&n).then_some(Key::F(n));
        }
        let key = match name.as_str() {
            "enter" => Key::Enter,
            "tab" => Key::Tab,
            "backtab" => Key::BackTab,
            "sysreq" => Key::SysReq,
            "reset" => Key::Reset,
            "fieldexit" | "fexit" => Key::FieldExit,
            "fieldplus" | "field+" => Key::FieldPlus,
            "fieldminus" | "field-" => Key::FieldMinus,
            "dup" => Key::Dup,
            "attn" | "attention" => Key::Attention,
            "print" => Key::Print,
            "help" => Key::Help,
            "home" => Key::Home,
            "end" => Key::End,
            "insert" | "ins" => Key::Insert,
            "delete" | "del" => Key::Delete,
            "backspace" | "bs" => Key::Backspace,
            "left" => Key::Left,
            "right" => Key::Right,
            "up" => Key::Up,
            "down" => Key::Down,
            "rollup" | "pgdn" => Key::RollUp,
            "rolldown" | "pgup" => Key::RollDown,
            "lt" => Key::Char(b'<'),
            _ => return None,
        };
        Some(key)
    }
}

pub(crate) mod private {
    pub trait Sealed {}
}

/// User-facing side of a session.
pub trait Terminal: private::Sealed + Send {
    fn width(&self) -> usize;

    fn height(&self) -> usize;

    /// Wait up to `timeout` for something to happen. Returns a set of
    /// `EVENT_*` bits, zero if nothing happened.
    fn wait_event(&mut self, timeout: Duration) -> TN5250Result<u32>;

    /// Next pending key, if any.
    fn get_key(&mut self) -> Option<Key>;

    fn beep(&mut self);

    /// Redraw from the display contents.
    fn update(&mut self, display: &Display);

    /// Redraw the indicator (operator information) line.
    fn update_indicators(&mut self, display: &Display);
}

#[derive(Debug, Default)]
struct HeadlessState {
    keys: VecDeque<Key>,
    beeps: usize,
    updates: usize,
    screen: Vec<String>,
    indicators: u32,
    quit: bool,
}

/// Terminal without a user. Keys are pushed programmatically and the last
/// rendered screen is kept for inspection. Clones share state, so a caller
/// can keep a handle after the terminal has been attached to a display.
#[derive(Debug, Clone)]
pub struct HeadlessTerminal {
    width: usize,
    height: usize,
    state: Arc<Mutex<HeadlessState>>,
}

impl Default for HeadlessTerminal {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

impl HeadlessTerminal {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            state: Arc::new(Mutex::new(HeadlessState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push_key(&self, key: Key) {
        self.state().keys.push_back(key);
    }

    pub fn push_keys<I: IntoIterator<Item = Key>>(&self, keys: I) {
        self.state().keys.extend(keys);
    }

    /// Type a string as data keys.
    pub fn type_text(&self, text: &str) {
        self.push_keys(text.bytes().map(Key::Char));
    }

    /// Report QUIT from the next wait once all keys are consumed.
    pub fn request_quit(&self) {
        self.state().quit = true;
    }

    pub fn pending_keys(&self) -> usize {
        self.state().keys.len()
    }

    pub fn beeps(&self) -> usize {
        self.state().beeps
    }

    pub fn updates(&self) -> usize {
        self.state().updates
    }

    /// Rows of the last rendered screen.
    pub fn screen(&self) -> Vec<String> {
        self.state().screen.clone()
    }

    /// Indicator bits as of the last indicator update.
    pub fn indicators(&self) -> u32 {
        self.state().indicators
    }
}

impl private::Sealed for HeadlessTerminal {}

impl Terminal for HeadlessTerminal {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn wait_event(&mut self, _timeout: Duration) -> TN5250Result<u32> {
        let state = self.state();
        if !state.keys.is_empty() {
            Ok(EVENT_KEY)
        } else if state.quit {
            Ok(EVENT_QUIT)
        } else {
            Ok(0)
        }
    }

    fn get_key(&mut self) -> Option<Key> {
        self.state().keys.pop_front()
    }

    fn beep(&mut self) {
        self.state().beeps += 1;
    }

    fn update(&mut self, display: &Display) {
        let mut state = self.state();
        state.updates += 1;
        state.screen = display.screen_lines();
    }

    fn update_indicators(&mut self, display: &Display) {
        self.state().indicators = display.indicators();
    }
}

enum Input {
    Keys(Vec<Key>),
    Eof,
}

/// Line-mode terminal on stdin/stdout.
///
/// Each input line is a run of data characters and bracketed key names,
/// e.g. `QSECOFR<fieldexit>secret<enter>`. An empty line is Enter. The
/// screen is printed after every update.
pub struct LineTerminal {
    input: Receiver<Input>,
    keys: VecDeque<Key>,
    eof: bool,
    width: usize,
    height: usize,
}

impl LineTerminal {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(Input::Keys(parse_line(&line))).is_err() {
                    return;
                }
            }
            let _ = tx.send(Input::Eof);
        });
        Self {
            input: rx,
            keys: VecDeque::new(),
            eof: false,
            width: 80,
            height: 24,
        }
    }
}

impl Default for LineTerminal {
    fn default() -> Self {
        Self::new()
    }
}

/// Split an input line into keys.
pub fn parse_line(line: &str) -> Vec<Key> {
    if line.is_empty() {
        return vec![Key::Enter];
    }
    let mut keys = Vec::new();
    let mut rest = line;
    while let Some(start) = rest.find('<') {
        keys.extend(latin1_keys(&rest[..start]));
        let tail = &rest[start + 1..];
        match tail.find('>').and_then(|end| Key::from_name(&tail[..end]).map(|k| (end, k))) {
            Some((end, key)) => {
                keys.push(key);
                rest = &tail[end + 1..];
            }
            None => {
                keys.push(Key::Char(b'<'));
                rest = tail;
            }
        }
    }
    keys.extend(latin1_keys(rest));
    keys
}

fn latin1_keys(text: &str) -> impl Iterator<Item = Key> + '_ {
    text.chars()
        .filter_map(|c| u8::try_from(u32::from(c)).ok())
        .filter(|&b| b >= 0x20)
        .map(Key::Char)
}

impl private::Sealed for LineTerminal {}

impl Terminal for LineTerminal {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn wait_event(&mut self, timeout: Duration) -> TN5250Result<u32> {
        if !self.keys.is_empty() {
            return Ok(EVENT_KEY);
        }
        if self.eof {
            return Ok(EVENT_QUIT);
        }
        match self.input.recv_timeout(timeout) {
            Ok(Input::Keys(keys)) => {
                self.keys.extend(keys);
                Ok(if self.keys.is_empty() { 0 } else { EVENT_KEY })
            }
            Ok(Input::Eof) | Err(RecvTimeoutError::Disconnected) => {
                self.eof = true;
                Ok(EVENT_QUIT)
            }
            Err(RecvTimeoutError::Timeout) => Ok(0),
        }
    }

    fn get_key(&mut self) -> Option<Key> {
        self.keys.pop_front()
    }

    fn beep(&mut self) {
        let mut out = io::stdout();
        let _ = out.write_all(b"\x07");
        let _ = out.flush();
    }

    fn update(&mut self, display: &Display) {
        self.width = display.width();
        self.height = display.height();
        let mut out = io::stdout().lock();
        let rule = "-".repeat(display.width());
        let _ = writeln!(out, "{}", rule);
        for line in display.screen_lines() {
            let _ = writeln!(out, "{}", line.trim_end());
        }
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(
            out,
            "{:<40} row {:>2} col {:>3}",
            display.indicator_text(),
            display.cursor_y() + 1,
            display.cursor_x() + 1
        );
        let _ = out.flush();
    }

    fn update_indicators(&mut self, _display: &Display) {
        // Indicators are printed with the screen.
    }
}
