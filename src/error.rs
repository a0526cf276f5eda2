//! # Error Handling
//!
//! Error types for the Modbus TCP client, covering connection setup, transport
//! I/O, header decoding, response validation and remote exception responses.
//!
//! ## Error Categories
//!
//! ### Connection Errors
//! - **Connection**: the TCP connection could not be established
//!
//! ### Transport Errors
//! - **Timeout**: no data became ready within the response timeout
//! - **Transport**: peer closed the stream, a send failed, or the client lost
//!   framing and must be reopened
//!
//! ### Protocol Errors
//! - **Frame**: header bytes could not be decoded
//! - **Protocol**: the response did not match the request (see [`ProtocolError`])
//! - **Exception**: the device answered with a Modbus exception response
//!
//! ### Caller Errors
//! - **InvalidData**: arguments rejected before anything was sent
//! - **Configuration**: an invalid [`ClientConfig`](crate::ClientConfig)
//!
//! ## Example
//!
//! ```rust
//! use modbus_tcp_client::{ModbusError, ModbusResult};
//!
//! fn report(result: ModbusResult<Vec<u16>>) {
//!     match result {
//!         Ok(values) => println!("read {} registers", values.len()),
//!         Err(ModbusError::Exception { code, message, .. }) => {
//!             println!("device refused the request: {:02X} ({})", code, message);
//!         }
//!         Err(e) if e.is_transport_error() => println!("link problem, reopen: {}", e),
//!         Err(e) => println!("failed: {}", e),
//!     }
//! }
//! ```

use std::io;

use thiserror::Error;

use crate::constants::{
    EXCEPTION_ILLEGAL_DATA_ADDRESS, EXCEPTION_ILLEGAL_DATA_VALUE, EXCEPTION_ILLEGAL_FUNCTION,
    EXCEPTION_SERVER_DEVICE_BUSY, EXCEPTION_SERVER_DEVICE_FAILURE,
};

/// Result type alias for Modbus operations
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Modbus client error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModbusError {
    /// The connection could not be established or the address was unusable.
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// A single read wait elapsed without any data becoming ready.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The stream failed mid-exchange or can no longer be trusted.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Header bytes could not be decoded.
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// The response did not correlate with the request.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Modbus exception response
    ///
    /// A well-formed negative acknowledgment from the device.
    ///
    /// # Standard Exception Codes
    /// - 0x01: Illegal Function
    /// - 0x02: Illegal Data Address
    /// - 0x03: Illegal Data Value
    /// - 0x04: Server Device Failure
    /// - 0x05: Acknowledge
    /// - 0x06: Server Device Busy
    /// - 0x08: Memory Parity Error
    /// - 0x0A: Gateway Path Unavailable
    /// - 0x0B: Gateway Target Device Failed to Respond
    #[error("Modbus exception: function={function:02X}, code={code:02X} ({message})")]
    Exception {
        function: u8,
        code: u8,
        message: String,
    },

    /// Request arguments rejected before any I/O took place.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Client configuration rejected.
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

/// Ways a response can fail to match the request that elicited it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("transaction id mismatch: expected {expected:#06X}, got {actual:#06X}")]
    TransactionMismatch { expected: u16, actual: u16 },

    #[error("protocol id must be 0, got {actual:#06X}")]
    ProtocolIdMismatch { actual: u16 },

    #[error("unit id mismatch: expected {expected}, got {actual}")]
    UnitMismatch { expected: u8, actual: u8 },

    #[error("function code mismatch: expected {expected:#04X}, got {actual:#04X}")]
    FunctionMismatch { expected: u8, actual: u8 },

    /// The header's length field disagrees with the size implied by the request.
    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: u16, actual: u16 },

    #[error("byte count mismatch: expected {expected}, got {actual}")]
    ByteCountMismatch { expected: u8, actual: u8 },

    /// A field the device must echo back came back different.
    #[error("{field} echo mismatch: expected {expected}, got {actual}")]
    EchoMismatch {
        field: &'static str,
        expected: u16,
        actual: u16,
    },

    #[error("block count mismatch: expected {expected}, got {actual}")]
    BlockCountMismatch { expected: u8, actual: u8 },

    #[error("request count mismatch: expected {expected}, got {actual}")]
    RequestCountMismatch { expected: u16, actual: u16 },

    /// A multi-block read/write sub-request was acknowledged with a nonzero code.
    #[error("sub-request {index} rejected with ack {ack:#06X}")]
    SubRequestRejected { index: usize, ack: u16 },
}

impl ModbusError {
    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    ///
    /// # Arguments
    ///
    /// * `operation` - Description of the read that timed out
    /// * `timeout_ms` - Timeout duration in milliseconds
    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a frame error
    pub fn frame<S: Into<String>>(message: S) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data<S: Into<String>>(message: S) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a Modbus exception error
    ///
    /// Maps standard exception codes to human-readable messages.
    ///
    /// # Arguments
    ///
    /// * `function` - Function code of the rejected request (without the 0x80 bit)
    /// * `code` - Exception code sent by the device
    pub fn exception(function: u8, code: u8) -> Self {
        let message = match code {
            EXCEPTION_ILLEGAL_FUNCTION => "Illegal Function",
            EXCEPTION_ILLEGAL_DATA_ADDRESS => "Illegal Data Address",
            EXCEPTION_ILLEGAL_DATA_VALUE => "Illegal Data Value",
            EXCEPTION_SERVER_DEVICE_FAILURE => "Server Device Failure",
            0x05 => "Acknowledge",
            EXCEPTION_SERVER_DEVICE_BUSY => "Server Device Busy",
            0x08 => "Memory Parity Error",
            0x0A => "Gateway Path Unavailable",
            0x0B => "Gateway Target Device Failed to Respond",
            _ => "Unknown Exception",
        }
        .to_string();

        Self::Exception {
            function,
            code,
            message,
        }
    }

    /// Check if an established connection failed (timeout or transport)
    ///
    /// After a transport error the client must be closed and reopened.
    /// Failing to connect in the first place is a `Connection` error and is
    /// not included.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use modbus_tcp_client::ModbusError;
    ///
    /// assert!(ModbusError::timeout("read header", 200).is_transport_error());
    /// assert!(!ModbusError::exception(0x03, 0x02).is_transport_error());
    /// assert!(!ModbusError::connection("refused").is_transport_error());
    /// ```
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport { .. })
    }

    /// Check if the connection could not be established
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Check if the response itself was malformed or did not match the request
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Frame { .. })
    }

    /// Check if the device answered with an exception response
    pub fn is_exception(&self) -> bool {
        matches!(self, Self::Exception { .. })
    }

    /// Exception code carried by an exception response
    pub fn exception_code(&self) -> Option<u8> {
        match self {
            Self::Exception { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Check if the error is recoverable (can retry)
    ///
    /// The client never retries on its own. This only tells a caller whether a
    /// retry, possibly on a fresh connection, has a chance to succeed.
    ///
    /// ```rust
    /// use modbus_tcp_client::ModbusError;
    ///
    /// assert!(ModbusError::timeout("read header", 1000).is_recoverable());
    /// assert!(ModbusError::exception(0x10, 0x06).is_recoverable());
    /// assert!(!ModbusError::invalid_data("count must be 1..=125").is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } | Self::Transport { .. } => true,
            // Acknowledge, Busy
            Self::Exception { code, .. } => matches!(*code, 0x05 | EXCEPTION_SERVER_DEVICE_BUSY),
            _ => false,
        }
    }
}

/// Socket timeouts surface as `WouldBlock` on Unix and `TimedOut` on Windows.
///
/// An `io::Error` does not carry the wait that elapsed, so a mapped timeout
/// reports `timeout_ms: 0`; [`TcpTransport`](crate::TcpTransport) replaces it
/// with the read timeout it installed.
impl From<io::Error> for ModbusError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::timeout(err.to_string(), 0),
            _ => Self::transport(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = ModbusError::timeout("read response header", 1000);
        assert!(err.is_transport_error());
        assert!(err.is_recoverable());
        assert!(!err.is_protocol_error());

        let err = ModbusError::connection("connection refused");
        assert!(err.is_connection_error());
        assert!(!err.is_transport_error());
        assert!(err.is_recoverable());

        let err = ModbusError::exception(0x03, 0x02);
        assert!(err.is_exception());
        assert!(!err.is_transport_error());
        assert!(!err.is_recoverable());
        assert_eq!(err.exception_code(), Some(0x02));

        let err: ModbusError = ProtocolError::TransactionMismatch {
            expected: 1,
            actual: 2,
        }
        .into();
        assert!(err.is_protocol_error());
        assert_eq!(err.exception_code(), None);
    }

    #[test]
    fn test_error_display() {
        let err = ModbusError::exception(0x10, 0x02);
        let msg = err.to_string();
        assert!(msg.contains("function=10"));
        assert!(msg.contains("code=02"));
        assert!(msg.contains("Illegal Data Address"));

        let err = ModbusError::from(ProtocolError::ByteCountMismatch {
            expected: 4,
            actual: 6,
        });
        assert_eq!(
            err.to_string(),
            "Protocol error: byte count mismatch: expected 4, got 6"
        );
    }

    #[test]
    fn test_io_error_mapping() {
        let err = ModbusError::from(io::Error::new(io::ErrorKind::WouldBlock, "would block"));
        assert!(matches!(err, ModbusError::Timeout { .. }));

        let err = ModbusError::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(matches!(err, ModbusError::Transport { .. }));
    }
}
