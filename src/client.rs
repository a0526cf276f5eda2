//! Blocking Modbus TCP client
//!
//! [`ModbusTcpClient`] owns one connection and runs one transaction at a time:
//! encode, send, then read the response piece by piece with every wait bounded
//! by the response timeout. All four functions share the same exchange
//! primitive; only their payload shapes differ.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use modbus_tcp_client::{BlockRange, ModbusResult, ModbusTcpClient};
//!
//! fn main() -> ModbusResult<()> {
//!     let mut client = ModbusTcpClient::open("127.0.0.1", 502)?;
//!
//!     // Read 10 holding registers starting at address 0
//!     let registers = client.read_holding_registers(0, 10)?;
//!     println!("Registers: {:?}", registers);
//!
//!     // Write two registers starting at address 100
//!     client.write_multiple_registers(100, &[0x1234, 0x5678])?;
//!
//!     // Read two disjoint ranges in one round trip (vendor extension)
//!     let values = client.read_multiblock_registers(&[
//!         BlockRange::new(0, 4),
//!         BlockRange::new(200, 2),
//!     ])?;
//!     assert_eq!(values.len(), 6);
//!
//!     client.close()
//! }
//! ```
//!
//! # Failure Handling
//!
//! Nothing is retried. When a failure leaves unread response bytes whose size
//! is known, they are drained so the next call starts on a frame boundary.
//! When the size is unknown, or the connection failed mid-frame, the client is
//! marked desynchronized and every later call fails until it is reopened.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::config::ClientConfig;
use crate::constants::{HEADER_COUNTED_LEN, HEADER_LEN, MODBUS_PROTOCOL_ID, MULTIBLOCK_ACK_OK};
use crate::error::{ModbusError, ModbusResult, ProtocolError};
use crate::frame::{bytes_to_registers, decode_header, FrameHeader};
use crate::protocol::{
    multiblock_read_response_length, read_holding_response_length, total_block_registers,
    BlockOp, BlockRange, BlockReply, Request, READ_WRITE_RESPONSE_LENGTH, WRITE_RESPONSE_LENGTH,
};
use crate::transaction::{self, TransactionCounter};
use crate::transport::{log_packet, TcpTransport, Transport, TransportStats};

/// Length field of an exception response: unit id, function code, exception code.
const EXCEPTION_RESPONSE_LENGTH: u16 = HEADER_COUNTED_LEN + 1;

const DESYNCHRONIZED: &str = "connection desynchronized by an earlier failure, reopen the client";

/// Modbus TCP client.
///
/// Holds the connection, the transaction counter and the response timeout.
/// Operations take `&mut self`, so a client is used by one caller at a time;
/// callers sharing one across threads must serialize access themselves, for
/// example behind a `Mutex`.
///
/// The transport is generic so tests can script the byte stream; production
/// code uses the default [`TcpTransport`].
pub struct ModbusTcpClient<T: Transport = TcpTransport> {
    transport: T,
    config: ClientConfig,
    transactions: TransactionCounter,
    stats: TransportStats,
    desynchronized: bool,
}

impl ModbusTcpClient<TcpTransport> {
    /// Connect to `host:port` with the default configuration.
    ///
    /// `host` is an IP literal or a resolvable name. The response timeout
    /// starts at 1000 ms.
    ///
    /// # Errors
    ///
    /// `ModbusError::Connection` when the address does not resolve or no
    /// resolved address accepts the connection.
    pub fn open(host: &str, port: u16) -> ModbusResult<Self> {
        Self::open_with_config(host, port, ClientConfig::default())
    }

    /// Connect to `host:port` with an explicit configuration.
    pub fn open_with_config(host: &str, port: u16, config: ClientConfig) -> ModbusResult<Self> {
        config.validate()?;
        let transport =
            TcpTransport::connect(host, port, config.connect_timeout, config.tcp_nodelay)?;
        debug!(
            "Modbus TCP client connected to {} (timeout {:?})",
            transport.peer_addr(),
            config.response_timeout
        );
        Self::with_config(transport, config)
    }

    /// Get the server address
    pub fn server_address(&self) -> SocketAddr {
        self.transport.peer_addr()
    }
}

impl<T: Transport> ModbusTcpClient<T> {
    /// Create a client over an already established transport.
    pub fn from_transport(transport: T) -> Self {
        Self {
            transport,
            config: ClientConfig::default(),
            transactions: TransactionCounter::new(),
            stats: TransportStats::default(),
            desynchronized: false,
        }
    }

    /// Create a client over an established transport with a configuration.
    pub fn with_config(transport: T, config: ClientConfig) -> ModbusResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::from_transport(transport)
        })
    }

    /// Close the connection and release the client.
    pub fn close(mut self) -> ModbusResult<()> {
        debug!(
            "Closing Modbus TCP client: {} requests, {} errors",
            self.stats.requests_sent, self.stats.errors
        );
        self.transport.close()
    }

    /// Change the timeout for subsequent reads. Takes effect on the next read.
    pub fn set_response_timeout(&mut self, timeout: Duration) {
        self.config.response_timeout = timeout;
    }

    /// Millisecond form of [`set_response_timeout`](Self::set_response_timeout).
    pub fn set_response_timeout_ms(&mut self, timeout_ms: u16) {
        self.set_response_timeout(Duration::from_millis(timeout_ms as u64));
    }

    pub fn response_timeout(&self) -> Duration {
        self.config.response_timeout
    }

    /// Enable or disable packet logging on existing client
    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.config.packet_logging = enabled;
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Communication counters since the client was created.
    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    /// Whether an earlier failure left the stream out of frame.
    ///
    /// A desynchronized client rejects every operation; close it and open a
    /// new one.
    pub fn is_desynchronized(&self) -> bool {
        self.desynchronized
    }

    /// Transaction id the next request will carry.
    pub fn next_transaction_id(&self) -> u16 {
        self.transactions.peek()
    }

    /// Get a reference to the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Read holding registers (function code 0x03).
    ///
    /// # Arguments
    ///
    /// * `address` - Starting register address (0-65535)
    /// * `count` - Number of registers to read (1-125, or the configured limit)
    ///
    /// # Errors
    ///
    /// - `ModbusError::InvalidData` - `count` out of range, nothing was sent
    /// - `ModbusError::Exception` - the device rejected the request
    /// - `ModbusError::Protocol` - the response did not match the request
    /// - `ModbusError::Timeout` / `ModbusError::Transport` - I/O failed
    pub fn read_holding_registers(&mut self, address: u16, count: u16) -> ModbusResult<Vec<u16>> {
        let result = self.read_holding_registers_inner(address, count);
        self.tally(result)
    }

    /// Write multiple registers (function code 0x10).
    ///
    /// `values` is copied into the request; the caller's slice is not
    /// modified.
    ///
    /// # Arguments
    ///
    /// * `address` - Starting register address (0-65535)
    /// * `values` - Values to write (1-123 registers, or the configured limit)
    pub fn write_multiple_registers(&mut self, address: u16, values: &[u16]) -> ModbusResult<()> {
        let result = self.write_multiple_registers_inner(address, values);
        self.tally(result)
    }

    /// Read several register ranges in one transaction (function code 0x65).
    ///
    /// Vendor extension. Returns the registers of all blocks concatenated in
    /// request order.
    ///
    /// # Arguments
    ///
    /// * `blocks` - 1-255 ranges, each at least one register long
    pub fn read_multiblock_registers(&mut self, blocks: &[BlockRange]) -> ModbusResult<Vec<u16>> {
        let result = self.read_multiblock_registers_inner(blocks);
        self.tally(result)
    }

    /// Run a sequence of paged reads and writes in one transaction
    /// (function code 0x68).
    ///
    /// Vendor extension. Returns one [`BlockReply`] per sub-request, in order.
    ///
    /// # Errors
    ///
    /// `ProtocolError::SubRequestRejected` when the device answers a
    /// sub-request with a nonzero acknowledgement. The remaining replies can
    /// no longer be located, so the client is desynchronized.
    pub fn read_write_multiblock_registers(
        &mut self,
        ops: &[BlockOp<'_>],
    ) -> ModbusResult<Vec<BlockReply>> {
        let result = self.read_write_multiblock_registers_inner(ops);
        self.tally(result)
    }

    fn read_holding_registers_inner(&mut self, address: u16, count: u16) -> ModbusResult<Vec<u16>> {
        let request = Request::ReadHoldingRegisters { address, count };
        let mut exchange = self.begin_exchange(&request)?;

        let mut byte_count = [0u8; 1];
        exchange.read(&mut byte_count)?;

        let expected_length = read_holding_response_length(count);
        if exchange.response.length != expected_length {
            return Err(exchange.abandon(ProtocolError::LengthMismatch {
                expected: expected_length,
                actual: exchange.response.length,
            }));
        }

        // count <= 125, so the byte count fits
        let expected_bytes = (count * 2) as u8;
        if byte_count[0] != expected_bytes {
            return Err(exchange.abandon(ProtocolError::ByteCountMismatch {
                expected: expected_bytes,
                actual: byte_count[0],
            }));
        }

        let mut data = vec![0u8; expected_bytes as usize];
        exchange.read(&mut data)?;
        exchange.finish();

        Ok(bytes_to_registers(&data))
    }

    fn write_multiple_registers_inner(&mut self, address: u16, values: &[u16]) -> ModbusResult<()> {
        let request = Request::WriteMultipleRegisters { address, values };
        let mut exchange = self.begin_exchange(&request)?;

        if exchange.response.length != WRITE_RESPONSE_LENGTH {
            return Err(exchange.abandon(ProtocolError::LengthMismatch {
                expected: WRITE_RESPONSE_LENGTH,
                actual: exchange.response.length,
            }));
        }

        let mut echo = [0u8; 4];
        exchange.read(&mut echo)?;
        exchange.finish();

        // The frame is fully consumed; a bad echo leaves the stream framed
        let echoed_address = u16::from_be_bytes([echo[0], echo[1]]);
        if echoed_address != address {
            return Err(ProtocolError::EchoMismatch {
                field: "address",
                expected: address,
                actual: echoed_address,
            }
            .into());
        }

        let echoed_count = u16::from_be_bytes([echo[2], echo[3]]);
        if echoed_count as usize != values.len() {
            return Err(ProtocolError::EchoMismatch {
                field: "count",
                expected: values.len() as u16,
                actual: echoed_count,
            }
            .into());
        }

        Ok(())
    }

    fn read_multiblock_registers_inner(&mut self, blocks: &[BlockRange]) -> ModbusResult<Vec<u16>> {
        let request = Request::ReadMultiblockRegisters { blocks };
        let mut exchange = self.begin_exchange(&request)?;

        let expected_length = multiblock_read_response_length(blocks);
        if exchange.response.length != expected_length {
            return Err(exchange.abandon(ProtocolError::LengthMismatch {
                expected: expected_length,
                actual: exchange.response.length,
            }));
        }

        let mut block_count = [0u8; 1];
        exchange.read(&mut block_count)?;

        // Block count is validated to 1..=255
        let expected_blocks = blocks.len() as u8;
        if block_count[0] != expected_blocks {
            // Length matched, so the rest of the frame can be skipped
            let remaining = (expected_length - HEADER_COUNTED_LEN - 1) as usize;
            return Err(exchange.discard(
                remaining,
                ProtocolError::BlockCountMismatch {
                    expected: expected_blocks,
                    actual: block_count[0],
                },
            ));
        }

        let mut descriptors = vec![0u8; 4 * blocks.len()];
        exchange.read(&mut descriptors)?;
        trace!(
            "Echoed block descriptors: {:?}",
            bytes_to_registers(&descriptors)
        );

        let mut data = vec![0u8; 2 * total_block_registers(blocks)];
        exchange.read(&mut data)?;
        exchange.finish();

        Ok(bytes_to_registers(&data))
    }

    fn read_write_multiblock_registers_inner(
        &mut self,
        ops: &[BlockOp<'_>],
    ) -> ModbusResult<Vec<BlockReply>> {
        let request = Request::ReadWriteMultiblockRegisters { ops };
        let mut exchange = self.begin_exchange(&request)?;

        // The envelope length never covers the acknowledgements, so nothing
        // after a failure here can be located.
        if exchange.response.length != READ_WRITE_RESPONSE_LENGTH {
            return Err(exchange.abandon(ProtocolError::LengthMismatch {
                expected: READ_WRITE_RESPONSE_LENGTH,
                actual: exchange.response.length,
            }));
        }

        let mut count = [0u8; 2];
        exchange.read(&mut count)?;
        let echoed = u16::from_be_bytes(count);
        let expected = ops.len() as u16;
        if echoed != expected {
            return Err(exchange.abandon(ProtocolError::RequestCountMismatch {
                expected,
                actual: echoed,
            }));
        }

        let mut replies = Vec::with_capacity(ops.len());
        for (index, op) in ops.iter().enumerate() {
            let mut ack = [0u8; 2];
            exchange.read(&mut ack)?;
            let ack = u16::from_be_bytes(ack);
            if ack != MULTIBLOCK_ACK_OK {
                return Err(exchange.abandon(ProtocolError::SubRequestRejected { index, ack }));
            }

            match op {
                BlockOp::Read { count, .. } => {
                    let mut data = vec![0u8; 2 * *count as usize];
                    exchange.read(&mut data)?;
                    replies.push(BlockReply::Read(bytes_to_registers(&data)));
                }
                BlockOp::Write { .. } => replies.push(BlockReply::Written),
            }
        }
        exchange.finish();

        Ok(replies)
    }

    /// Send `request` and read the response header.
    ///
    /// Returns an [`Exchange`] positioned right after the header of a
    /// matching, non-exception response. Header mismatches and exception
    /// responses are consumed here.
    fn begin_exchange(&mut self, request: &Request<'_>) -> ModbusResult<Exchange<'_, T>> {
        request.validate(&self.config)?;
        if self.desynchronized {
            return Err(ModbusError::transport(DESYNCHRONIZED));
        }

        let function = request.function();
        let header = FrameHeader::request(
            self.transactions.next_id(),
            request.length_field(),
            function.to_u8(),
        );
        let tid = header.transaction_id;
        let frame = request.encode(&header);

        debug!(
            "Sending {} request tid:{:04X} ({} bytes)",
            function.description(),
            tid,
            frame.len()
        );
        if self.config.packet_logging {
            log_packet("send", &frame, tid);
        }

        if let Err(err) = self.transport.write_all(&frame) {
            self.mark_desynchronized(&err);
            return Err(err);
        }
        self.stats.requests_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;

        let mut raw = [0u8; HEADER_LEN];
        self.receive(&mut raw, tid)?;
        let response = decode_header(&raw)?;

        let mut exchange = Exchange {
            client: self,
            request: header,
            response,
        };

        if let Err(mismatch) = transaction::validate(&header, &response) {
            warn!("Rejected response to tid:{:04X}: {}", tid, mismatch);
            let framed = response.protocol_id == MODBUS_PROTOCOL_ID
                && response.length >= HEADER_COUNTED_LEN
                && request.response_length_is_reliable();
            if framed {
                let remaining = (response.length - HEADER_COUNTED_LEN) as usize;
                return Err(exchange.discard(remaining, mismatch));
            }
            return Err(exchange.abandon(mismatch));
        }

        if response.is_exception() {
            // No room for the exception code, so nothing after the header is known
            if response.length < EXCEPTION_RESPONSE_LENGTH {
                return Err(exchange.abandon(ModbusError::frame(format!(
                    "exception response declares length {}",
                    response.length
                ))));
            }

            let mut code = [0u8; 1];
            exchange.read(&mut code)?;

            if response.length > EXCEPTION_RESPONSE_LENGTH {
                let extra = (response.length - EXCEPTION_RESPONSE_LENGTH) as usize;
                exchange.client.skip(extra, tid);
            }

            exchange.client.stats.exceptions += 1;
            let err = ModbusError::exception(function.to_u8(), code[0]);
            warn!("Device rejected tid:{:04X}: {}", tid, err);
            exchange.finish();
            return Err(err);
        }

        Ok(exchange)
    }

    /// Fill `buf` from the transport. Any failure desynchronizes the client.
    fn receive(&mut self, buf: &mut [u8], tid: u16) -> ModbusResult<()> {
        match self.transport.read_exact(buf, self.config.response_timeout) {
            Ok(()) => {
                self.stats.bytes_received += buf.len() as u64;
                if self.config.packet_logging {
                    log_packet("recv", buf, tid);
                }
                Ok(())
            }
            Err(err) => {
                if matches!(err, ModbusError::Timeout { .. }) {
                    self.stats.timeouts += 1;
                }
                self.mark_desynchronized(&err);
                Err(err)
            }
        }
    }

    /// Read and drop `remaining` bytes of the current response.
    fn skip(&mut self, remaining: usize, tid: u16) {
        if remaining == 0 {
            return;
        }
        let mut scratch = vec![0u8; remaining];
        if self.receive(&mut scratch, tid).is_ok() {
            debug!("Drained {} bytes of tid:{:04X}", remaining, tid);
        }
    }

    fn mark_desynchronized(&mut self, cause: &ModbusError) {
        if !self.desynchronized {
            warn!("Modbus TCP connection desynchronized: {}", cause);
            self.desynchronized = true;
        }
    }

    fn tally<R>(&mut self, result: ModbusResult<R>) -> ModbusResult<R> {
        if result.is_err() {
            self.stats.errors += 1;
        }
        result
    }
}

/// One in-flight transaction, positioned inside its response.
struct Exchange<'c, T: Transport> {
    client: &'c mut ModbusTcpClient<T>,
    request: FrameHeader,
    response: FrameHeader,
}

impl<T: Transport> Exchange<'_, T> {
    fn read(&mut self, buf: &mut [u8]) -> ModbusResult<()> {
        self.client.receive(buf, self.request.transaction_id)
    }

    /// Fail without reading further; the stream can no longer be trusted.
    fn abandon(&mut self, cause: impl Into<ModbusError>) -> ModbusError {
        let err = cause.into();
        warn!(
            "Abandoning response to tid:{:04X}: {}",
            self.request.transaction_id, err
        );
        self.client.mark_desynchronized(&err);
        err
    }

    /// Fail after draining the `remaining` bytes of the response.
    fn discard(&mut self, remaining: usize, cause: impl Into<ModbusError>) -> ModbusError {
        self.client.skip(remaining, self.request.transaction_id);
        cause.into()
    }

    fn finish(self) {
        self.client.stats.responses_received += 1;
        trace!(
            "Completed tid:{:04X} fc:{:02X}",
            self.request.transaction_id,
            self.response.function_code
        );
    }
}
