//! Host transports
//!
//! A [`Transport`] delivers framed inbound records and sends outbound
//! packets. [`TelnetStream`] runs the telnet decoder over any [`Socket`];
//! the trace replay transport lives in [`crate::lib5250::debug`].

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::SessionConfig;
use crate::error::{NetworkError, ProtocolResult, TN5250Error, TN5250Result, TelnetError};
use crate::lib5250::record::{Record, RecordQueue};
use crate::lib5250::telnet::{encode_packet, Decoded, TelnetDecoder, TelnetNegotiator};

/// Timeout for the initial TCP connect
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) mod private {
    pub trait Sealed {}
}

/// Source of host records and sink for terminal packets.
///
/// Implemented by [`TelnetStream`] and by the trace replay stream; the set
/// is closed.
pub trait Transport: private::Sealed {
    /// Read whatever the peer has sent and frame it into records. Returns
    /// false once the peer has closed the connection.
    fn handle_receive(&mut self) -> TN5250Result<bool>;

    /// Wait up to `timeout` for inbound data.
    fn poll(&mut self, timeout: Duration) -> TN5250Result<bool>;

    /// Number of complete records waiting
    fn record_count(&self) -> usize;

    /// Dequeue the oldest complete record, header parsed.
    fn get_record(&mut self) -> Option<ProtocolResult<Record>>;

    /// Discard all complete records.
    fn drain_records(&mut self) -> usize;

    /// Send one 5250 record.
    fn send_packet(&mut self, flow_type: u16, flags: u8, opcode: u8, data: &[u8]) -> TN5250Result<()>;

    fn disconnect(&mut self);
}

/// Byte stream a [`TelnetStream`] can run over
pub trait Socket: Read + Write {
    /// Wait up to `timeout` for the socket to become readable. End of
    /// stream counts as readable.
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool>;

    fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Socket for TcpStream {
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        // A zero read timeout is rejected by the OS; wait at least 1ms.
        self.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        let mut peeked = [0u8; 1];
        match self.peek(&mut peeked) {
            Ok(_) => Ok(true),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(false),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn shutdown(&mut self) -> io::Result<()> {
        TcpStream::shutdown(self, std::net::Shutdown::Both)
    }
}

/// 5250 over telnet
pub struct TelnetStream<S: Socket> {
    socket: Option<S>,
    decoder: TelnetDecoder,
    records: RecordQueue,
}

impl TelnetStream<TcpStream> {
    /// Connect to the host named by `config` and set up negotiation from
    /// its terminal type and environment.
    pub fn connect(config: &SessionConfig) -> TN5250Result<Self> {
        let (host, port) = config.host_port()?;
        let addrs: Vec<_> = (host.as_str(), port)
            .to_socket_addrs()
            .map_err(|_| NetworkError::DnsResolution { host: host.clone() })?
            .collect();
        let addr = addrs
            .first()
            .ok_or_else(|| NetworkError::InvalidAddress { address: format!("{host}:{port}") })?;
        log::info!("connecting to {}:{} ({})", host, port, addr);
        let tcp = TcpStream::connect_timeout(addr, CONNECT_TIMEOUT)
            .map_err(|e| NetworkError::from_io(&host, port, &e))?;
        tcp.set_nodelay(true)?;
        Ok(Self::new(tcp, negotiator_for(config)))
    }
}

/// Negotiator answering with the configured terminal type and `env.*`
/// variables.
pub fn negotiator_for(config: &SessionConfig) -> TelnetNegotiator {
    TelnetNegotiator::new(config.terminal_type(), config.environment())
}

impl<S: Socket> TelnetStream<S> {
    pub fn new(socket: S, negotiator: TelnetNegotiator) -> Self {
        Self {
            socket: Some(socket),
            decoder: TelnetDecoder::new(negotiator),
            records: RecordQueue::new(),
        }
    }

    /// The underlying socket, if still connected.
    pub fn socket(&self) -> Option<&S> {
        self.socket.as_ref()
    }

    fn socket_mut(&mut self) -> TN5250Result<&mut S> {
        self.socket.as_mut().ok_or_else(|| {
            NetworkError::ConnectionLost {
                reason: "not connected".to_string(),
            }
            .into()
        })
    }

    fn write_all(&mut self, data: &[u8]) -> TN5250Result<()> {
        let socket = self.socket_mut()?;
        socket
            .write_all(data)
            .and_then(|_| socket.flush())
            .map_err(|e| lost(&e))
    }

    fn feed(&mut self, bytes: &[u8]) -> TN5250Result<()> {
        for &b in bytes {
            match self.decoder.push(b) {
                Decoded::Nothing => {}
                Decoded::Byte(b) => self.records.push_byte(b),
                Decoded::EndOfRecord => {
                    if self.records.end_record() {
                        log::trace!("record complete, {} queued", self.records.count());
                    }
                }
                Decoded::Reply(reply) => {
                    let option = reply.get(2).copied().unwrap_or(0);
                    self.write_all(&reply).map_err(|e| TelnetError::ReplyFailed {
                        option,
                        reason: e.to_string(),
                    })?
                }
            }
        }
        Ok(())
    }
}

fn lost(err: &io::Error) -> TN5250Error {
    NetworkError::ConnectionLost {
        reason: err.to_string(),
    }
    .into()
}

impl<S: Socket> private::Sealed for TelnetStream<S> {}

impl<S: Socket> Transport for TelnetStream<S> {
    fn handle_receive(&mut self) -> TN5250Result<bool> {
        let mut buf = [0u8; 4096];
        loop {
            let socket = self.socket_mut()?;
            if !socket.wait_readable(Duration::ZERO).map_err(|e| lost(&e))? {
                return Ok(true);
            }
            let n = match socket.read(&mut buf) {
                Ok(0) => {
                    log::info!("host closed the connection");
                    return Ok(false);
                }
                Ok(n) => n,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                    return Ok(true)
                }
                Err(e) => return Err(lost(&e)),
            };
            self.feed(&buf[..n])?;
        }
    }

    fn poll(&mut self, timeout: Duration) -> TN5250Result<bool> {
        self.socket_mut()?.wait_readable(timeout).map_err(|e| lost(&e))
    }

    fn record_count(&self) -> usize {
        self.records.count()
    }

    fn get_record(&mut self) -> Option<ProtocolResult<Record>> {
        self.records.pop()
    }

    fn drain_records(&mut self) -> usize {
        self.records.drain()
    }

    fn send_packet(&mut self, flow_type: u16, flags: u8, opcode: u8, data: &[u8]) -> TN5250Result<()> {
        let packet = encode_packet(flow_type, flags, opcode, data);
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("send packet: length = {}", packet.len());
            for chunk in packet.chunks(16) {
                let hex: Vec<String> = chunk.iter().map(|b| format!("{:02X}", b)).collect();
                log::trace!("send packet: data: {}", hex.join(" "));
            }
        }
        self.write_all(&packet)
    }

    fn disconnect(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.shutdown() {
                log::debug!("shutdown: {}", e);
            }
        }
    }
}
