//! # Client Configuration
//!
//! Per-connection settings for [`ModbusTcpClient`](crate::ModbusTcpClient).
//!
//! ## Defaults
//!
//! - **Response timeout**: 1000 ms per read wait
//! - **Connect timeout**: operating system default
//! - **TCP_NODELAY**: enabled (requests are small and latency bound)
//! - **Register limits**: 125 per read, 123 per write (Modbus specification)
//!
//! Some devices accept fewer registers per request; lower the limits for them.

use std::time::Duration;

use crate::constants::{DEFAULT_RESPONSE_TIMEOUT_MS, MAX_READ_REGISTERS, MAX_WRITE_REGISTERS};
use crate::error::{ModbusError, ModbusResult};

/// Client configuration.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use modbus_tcp_client::ClientConfig;
///
/// let config = ClientConfig::new()
///     .with_response_timeout(Duration::from_millis(250))
///     .with_max_read_registers(64)
///     .with_packet_logging(true);
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.max_read_registers, 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Timeout applied to every individual read wait.
    pub response_timeout: Duration,
    /// Upper bound for establishing the connection.
    pub connect_timeout: Option<Duration>,
    /// Disable Nagle's algorithm on the socket.
    pub tcp_nodelay: bool,
    /// Log every frame as hex at `info` level.
    pub packet_logging: bool,
    /// Maximum registers per read holding registers request.
    pub max_read_registers: u16,
    /// Maximum registers per write multiple registers request.
    pub max_write_registers: u16,
}

impl ClientConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-read response timeout.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Enable or disable TCP_NODELAY.
    pub fn with_tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// Enable or disable hex packet logging.
    pub fn with_packet_logging(mut self, enabled: bool) -> Self {
        self.packet_logging = enabled;
        self
    }

    /// Set maximum read registers.
    pub fn with_max_read_registers(mut self, count: u16) -> Self {
        self.max_read_registers = count;
        self
    }

    /// Set maximum write registers.
    pub fn with_max_write_registers(mut self, count: u16) -> Self {
        self.max_write_registers = count;
        self
    }

    /// Reject limits outside what the protocol can carry.
    pub fn validate(&self) -> ModbusResult<()> {
        if self.max_read_registers == 0 || self.max_read_registers > MAX_READ_REGISTERS {
            return Err(ModbusError::configuration(format!(
                "max_read_registers must be 1..={}, got {}",
                MAX_READ_REGISTERS, self.max_read_registers
            )));
        }
        if self.max_write_registers == 0 || self.max_write_registers > MAX_WRITE_REGISTERS {
            return Err(ModbusError::configuration(format!(
                "max_write_registers must be 1..={}, got {}",
                MAX_WRITE_REGISTERS, self.max_write_registers
            )));
        }
        if self.connect_timeout == Some(Duration::ZERO) {
            return Err(ModbusError::configuration("connect_timeout must be nonzero"));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS),
            connect_timeout: None,
            tcp_nodelay: true,
            packet_logging: false,
            max_read_registers: MAX_READ_REGISTERS,
            max_write_registers: MAX_WRITE_REGISTERS,
        }
    }
}
