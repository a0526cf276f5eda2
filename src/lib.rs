//! # Modbus TCP Client - Blocking Register Access over MBAP
//!
//! A small, synchronous Modbus TCP client for talking to a single device over
//! one connection. Every call sends one request and waits for its response;
//! there is no event loop, no background thread and no retrying.
//!
//! ## Features
//!
//! - **Blocking I/O**: plain `std::net::TcpStream`, every read wait bounded by a timeout
//! - **Strict correlation**: transaction id, protocol id, unit id and function code checked on every response
//! - **Framing discipline**: unread response bytes are drained when their size is known,
//!   otherwise the client refuses further use until reopened
//! - **Vendor extensions**: multi-block read and paged multi-block read/write
//! - **Built-in Monitoring**: request, error and byte counters
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Client |
//! |------|----------|--------|
//! | 0x03 | Read Holding Registers | ✅ |
//! | 0x10 | Write Multiple Registers | ✅ |
//! | 0x65 | Multi-block Read | ✅ (extension) |
//! | 0x68 | Multi-block Read/Write | ✅ (extension) |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modbus_tcp_client::{BlockOp, ModbusResult, ModbusTcpClient};
//!
//! fn main() -> ModbusResult<()> {
//!     let mut client = ModbusTcpClient::open("127.0.0.1", 502)?;
//!     client.set_response_timeout_ms(500);
//!
//!     let values = client.read_holding_registers(0, 10)?;
//!     println!("Read registers: {:?}", values);
//!
//!     client.write_multiple_registers(100, &[0x1234])?;
//!
//!     let setpoint = [42u16];
//!     let replies = client.read_write_multiblock_registers(&[
//!         BlockOp::read(1, 0x0010, 4),
//!         BlockOp::write(2, 0x0020, &setpoint),
//!     ])?;
//!     println!("Replies: {:?}", replies);
//!
//!     client.close()
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Modbus protocol constants
pub mod constants;

/// Frame header and register payload encoding
pub mod frame;

/// Transaction id allocation and response correlation
pub mod transaction;

/// Function codes and request encoding
pub mod protocol;

/// Blocking byte-stream transport
pub mod transport;

/// Client configuration
pub mod config;

/// Modbus TCP client
pub mod client;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Core client API ===
pub use client::ModbusTcpClient;
pub use config::ClientConfig;

// === Error handling ===
pub use error::{ModbusError, ModbusResult, ProtocolError};

// === Core types ===
pub use frame::FrameHeader;
pub use protocol::{BlockOp, BlockRange, BlockReply, FunctionCode};

// === Transport and monitoring ===
pub use transport::{TcpTransport, Transport, TransportStats};

// === Protocol limits (commonly needed constants) ===
pub use constants::{MAX_MULTIBLOCK_BLOCKS, MAX_PDU_SIZE, MAX_READ_REGISTERS, MAX_WRITE_REGISTERS};

/// Default response timeout (1 second)
pub const DEFAULT_TIMEOUT_MS: u64 = constants::DEFAULT_RESPONSE_TIMEOUT_MS;

/// Modbus TCP default port
pub const DEFAULT_TCP_PORT: u16 = constants::DEFAULT_TCP_PORT;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!("Modbus TCP Client v{} - blocking MBAP register access", VERSION)
}
