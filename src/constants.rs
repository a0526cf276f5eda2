//! Modbus TCP protocol constants
//!
//! Standard values follow the Modbus Application Protocol specification:
//! - Maximum PDU size: 253 bytes (inherited from the RS485 ADU limit of 256 bytes)
//! - Register limits are calculated to fit within the PDU size constraint
//!
//! Function codes 0x65 and 0x68 are vendor extensions and are exempt from the
//! PDU size limit.

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Fixed response/request header read by this client
/// Format: Transaction ID(2) + Protocol ID(2) + Length(2) + Unit ID(1) + Function Code(1)
pub const HEADER_LEN: usize = 8;

/// Number of header bytes counted by the MBAP length field (Unit ID + Function Code)
pub const HEADER_COUNTED_LEN: u16 = 2;

/// Protocol identifier for Modbus
pub const MODBUS_PROTOCOL_ID: u16 = 0;

/// Unit identifier sent with every request
pub const UNIT_ID: u8 = 1;

/// Maximum PDU (Protocol Data Unit) size per Modbus specification
pub const MAX_PDU_SIZE: usize = 253;

/// Exception responses set the high bit of the function code
pub const EXCEPTION_BIT: u8 = 0x80;

// ============================================================================
// Register Operation Limits
// ============================================================================

/// Maximum number of registers for FC03 (Read Holding Registers)
///
/// Calculation for response PDU:
/// - Function Code: 1 byte
/// - Byte Count: 1 byte
/// - Register Data: N × 2 bytes
/// - Total: 1 + 1 + (N × 2) ≤ 253
/// - Therefore: N ≤ (253 - 2) / 2 = 125.5 → 125 registers
pub const MAX_READ_REGISTERS: u16 = 125;

/// Maximum number of registers for FC16 (Write Multiple Registers)
///
/// Calculation for request PDU:
/// - Function Code: 1 byte
/// - Starting Address: 2 bytes
/// - Quantity of Registers: 2 bytes
/// - Byte Count: 1 byte
/// - Register Values: N × 2 bytes
/// - Total: 1 + 2 + 2 + 1 + (N × 2) ≤ 253
/// - Therefore: N ≤ (253 - 6) / 2 = 123.5 → 123 registers
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// Maximum number of blocks in a multi-block read (block count is one byte)
pub const MAX_MULTIBLOCK_BLOCKS: usize = u8::MAX as usize;

// ============================================================================
// Function Codes
// ============================================================================

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Write Multiple Registers (FC16)
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Multi-block read (vendor extension)
pub const FC_READ_MULTIBLOCK_REGISTERS: u8 = 0x65;

/// Multi-block read/write (vendor extension)
pub const FC_READ_WRITE_MULTIBLOCK_REGISTERS: u8 = 0x68;

// ============================================================================
// Multi-block read/write tags
// ============================================================================

/// Tag marking a read sub-request
pub const MULTIBLOCK_TAG_READ: u16 = 0xC3C3;

/// Tag marking a write sub-request
pub const MULTIBLOCK_TAG_WRITE: u16 = 0x3C3C;

/// Acknowledgment value for a successful sub-request
pub const MULTIBLOCK_ACK_OK: u16 = 0;

// ============================================================================
// Modbus Exception Codes
// ============================================================================

/// Illegal Function
pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;

/// Illegal Data Address
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;

/// Illegal Data Value
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;

/// Server Device Failure
pub const EXCEPTION_SERVER_DEVICE_FAILURE: u8 = 0x04;

/// Server Device Busy
pub const EXCEPTION_SERVER_DEVICE_BUSY: u8 = 0x06;

// ============================================================================
// Client Defaults
// ============================================================================

/// Default response timeout applied to each read wait (milliseconds)
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 1000;

/// Modbus TCP default port
pub const DEFAULT_TCP_PORT: u16 = 502;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_limits() {
        let read_pdu_size = 1 + 1 + (MAX_READ_REGISTERS as usize * 2);
        assert!(read_pdu_size <= MAX_PDU_SIZE);

        let write_pdu_size = 1 + 2 + 2 + 1 + (MAX_WRITE_REGISTERS as usize * 2);
        assert!(write_pdu_size <= MAX_PDU_SIZE);
    }

    #[test]
    fn test_extension_codes_do_not_collide_with_exceptions() {
        for fc in [
            FC_READ_HOLDING_REGISTERS,
            FC_WRITE_MULTIPLE_REGISTERS,
            FC_READ_MULTIBLOCK_REGISTERS,
            FC_READ_WRITE_MULTIBLOCK_REGISTERS,
        ] {
            assert_eq!(fc & EXCEPTION_BIT, 0);
        }
        assert_ne!(MULTIBLOCK_TAG_READ, MULTIBLOCK_TAG_WRITE);
    }
}
