//! # Transport Layer
//!
//! Byte-stream transport used by the client. A [`Transport`] offers exactly two
//! I/O primitives, both all-or-nothing:
//!
//! - [`Transport::read_exact`] fills the whole buffer or fails. Each wait for
//!   data is bounded by the timeout passed in, so a read that receives its
//!   bytes in several chunks may take longer than one timeout in total.
//! - [`Transport::write_all`] pushes every byte or fails, retrying short writes.
//!
//! [`TcpTransport`] implements it over a blocking [`std::net::TcpStream`].
//! Tests and fuzzers inject their own implementation through
//! [`ModbusTcpClient::from_transport`](crate::ModbusTcpClient::from_transport).
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use modbus_tcp_client::{TcpTransport, Transport};
//!
//! # fn main() -> modbus_tcp_client::ModbusResult<()> {
//! let mut transport = TcpTransport::connect("127.0.0.1", 502, None, true)?;
//! transport.write_all(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01])?;
//!
//! let mut header = [0u8; 8];
//! transport.read_exact(&mut header, Duration::from_millis(500))?;
//! transport.close()?;
//! # Ok(())
//! # }
//! ```

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info, trace};

use crate::error::{ModbusError, ModbusResult};

/// Shortest wait the socket layer accepts; a zero read timeout is rejected.
pub const MIN_READ_WAIT: Duration = Duration::from_millis(1);

/// Format raw bytes as hex string for packet logging
pub fn format_hex_packet(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Log packet with direction and transaction id
pub fn log_packet(direction: &str, data: &[u8], transaction_id: u16) {
    info!(
        "[MODBUS-TCP] {} tid:{:04X} {}",
        direction,
        transaction_id,
        format_hex_packet(data)
    );
}

/// Blocking byte-stream transport.
///
/// Implementations own a single connection. Neither method may surface a
/// partial result: on error the number of bytes moved is unspecified and the
/// stream must be considered out of frame.
pub trait Transport {
    /// Fill `buf` completely.
    ///
    /// # Errors
    ///
    /// - `ModbusError::Timeout` - no data became ready within `timeout`
    /// - `ModbusError::Transport` - the peer closed the stream or receive failed
    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> ModbusResult<()>;

    /// Send all of `bytes`.
    ///
    /// # Errors
    ///
    /// - `ModbusError::Transport` - the socket refused the data
    fn write_all(&mut self, bytes: &[u8]) -> ModbusResult<()>;

    /// Release the connection.
    fn close(&mut self) -> ModbusResult<()>;
}

/// Communication statistics kept by the client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub exceptions: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Modbus TCP transport over a blocking socket
pub struct TcpTransport {
    stream: TcpStream,
    peer: SocketAddr,
    /// Read timeout currently installed on the socket
    read_timeout: Option<Duration>,
}

impl TcpTransport {
    /// Resolve `host:port` and connect to the first address that accepts.
    ///
    /// `host` may be an IP literal or a resolvable name. Without
    /// `connect_timeout` the operating system's connect timeout applies.
    pub fn connect(
        host: &str,
        port: u16,
        connect_timeout: Option<Duration>,
        nodelay: bool,
    ) -> ModbusResult<Self> {
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| ModbusError::connection(format!("Invalid address {}:{}: {}", host, port, e)))?
            .collect();

        if addrs.is_empty() {
            return Err(ModbusError::connection(format!(
                "Address {}:{} resolved to nothing",
                host, port
            )));
        }

        let mut last_error = None;
        for addr in addrs {
            let attempt = match connect_timeout {
                Some(limit) => TcpStream::connect_timeout(&addr, limit),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => return Self::from_stream(stream, nodelay),
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_error = Some((addr, e));
                }
            }
        }

        // addrs was non-empty, so at least one attempt failed
        let (addr, e) = last_error
            .ok_or_else(|| ModbusError::connection(format!("No address for {}:{}", host, port)))?;
        Err(ModbusError::connection(format!(
            "Failed to connect to {}: {}",
            addr, e
        )))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream, nodelay: bool) -> ModbusResult<Self> {
        let peer = stream
            .peer_addr()
            .map_err(|e| ModbusError::connection(format!("Socket has no peer: {}", e)))?;
        stream
            .set_nodelay(nodelay)
            .map_err(|e| ModbusError::connection(format!("Failed to set TCP_NODELAY: {}", e)))?;

        debug!("Connected to {}", peer);
        Ok(Self {
            stream,
            peer,
            read_timeout: None,
        })
    }

    /// Address of the remote device
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn install_read_timeout(&mut self, timeout: Duration) -> ModbusResult<Duration> {
        let wait = timeout.max(MIN_READ_WAIT);
        if self.read_timeout != Some(wait) {
            self.stream.set_read_timeout(Some(wait)).map_err(|e| {
                ModbusError::transport(format!("Failed to set read timeout: {}", e))
            })?;
            self.read_timeout = Some(wait);
        }
        Ok(wait)
    }
}

impl Transport for TcpTransport {
    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> ModbusResult<()> {
        let wait = self.install_read_timeout(timeout)?;
        let mut filled = 0;

        while filled < buf.len() {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(ModbusError::transport(format!(
                        "Connection closed by {} after {} of {} bytes",
                        self.peer,
                        filled,
                        buf.len()
                    )));
                }
                Ok(n) => {
                    filled += n;
                    trace!("Received {} bytes ({}/{})", n, filled, buf.len());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("Receive from {} failed: {}", self.peer, e);
                    return Err(match ModbusError::from(e) {
                        ModbusError::Timeout { .. } => ModbusError::timeout(
                            format!("read {} bytes from {}", buf.len(), self.peer),
                            wait.as_millis() as u64,
                        ),
                        other => other,
                    });
                }
            }
        }

        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> ModbusResult<()> {
        let mut sent = 0;

        while sent < bytes.len() {
            match self.stream.write(&bytes[sent..]) {
                Ok(0) => {
                    return Err(ModbusError::transport(format!(
                        "Connection to {} stopped accepting data after {} of {} bytes",
                        self.peer,
                        sent,
                        bytes.len()
                    )));
                }
                Ok(n) => {
                    sent += n;
                    trace!("Sent {} bytes ({}/{})", n, sent, bytes.len());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("Send to {} failed: {}", self.peer, e);
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }

    fn close(&mut self) -> ModbusResult<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Peer already went away
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => {
                debug!("Failed to close connection to {}: {}", self.peer, e);
                Err(e.into())
            }
        }
    }
}
