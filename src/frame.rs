//! # Frame Codec
//!
//! Serialization of the fixed 8-byte frame header and of register payloads.
//!
//! Every frame this client sends or receives starts with:
//!
//! | Offset | Size | Field | Value |
//! |--------|------|-------|-------|
//! | 0 | 2 | Transaction ID | rolling counter |
//! | 2 | 2 | Protocol ID | always 0 |
//! | 4 | 2 | Length | bytes following this field |
//! | 6 | 1 | Unit ID | always 1 |
//! | 7 | 1 | Function Code | request code, or code \| 0x80 |
//!
//! Multi-byte fields are big-endian (network byte order), as are register arrays.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::constants::{HEADER_LEN, MODBUS_PROTOCOL_ID, UNIT_ID};
use crate::error::{ModbusError, ModbusResult};

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Correlates a response with its request
    pub transaction_id: u16,
    /// Always 0 for Modbus
    pub protocol_id: u16,
    /// Byte count of unit id + function code + payload
    pub length: u16,
    /// Addressed unit
    pub unit_id: u8,
    /// Function code, with 0x80 set on exception responses
    pub function_code: u8,
}

impl FrameHeader {
    /// Header for an outgoing request from this client.
    pub fn request(transaction_id: u16, length: u16, function_code: u8) -> Self {
        Self {
            transaction_id,
            protocol_id: MODBUS_PROTOCOL_ID,
            length,
            unit_id: UNIT_ID,
            function_code,
        }
    }

    /// Serialize to wire format.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..2].copy_from_slice(&self.transaction_id.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.protocol_id.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.length.to_be_bytes());
        bytes[6] = self.unit_id;
        bytes[7] = self.function_code;
        bytes
    }

    /// Append the wire format to a frame buffer.
    pub fn put(&self, frame: &mut BytesMut) {
        frame.put_slice(&self.to_bytes());
    }

    /// Whether the function code carries the exception bit.
    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code & crate::constants::EXCEPTION_BIT != 0
    }
}

/// Encode a request header with the fixed unit id and protocol id.
///
/// Shorthand for [`FrameHeader::request`] followed by [`FrameHeader::to_bytes`];
/// the client builds frames with [`FrameHeader::put`].
pub fn encode_header(transaction_id: u16, length: u16, function_code: u8) -> [u8; HEADER_LEN] {
    FrameHeader::request(transaction_id, length, function_code).to_bytes()
}

/// Decode a frame header from the first 8 bytes of `bytes`.
pub fn decode_header(bytes: &[u8]) -> ModbusResult<FrameHeader> {
    if bytes.len() < HEADER_LEN {
        return Err(ModbusError::frame(format!(
            "header too short: {} bytes (need {})",
            bytes.len(),
            HEADER_LEN
        )));
    }

    let header = FrameHeader {
        transaction_id: u16::from_be_bytes([bytes[0], bytes[1]]),
        protocol_id: u16::from_be_bytes([bytes[2], bytes[3]]),
        length: u16::from_be_bytes([bytes[4], bytes[5]]),
        unit_id: bytes[6],
        function_code: bytes[7],
    };
    trace!(?header, "decoded frame header");
    Ok(header)
}

/// Convert registers between host and network byte order in place.
///
/// The conversion is its own inverse: a no-op on big-endian hosts and a byte
/// swap of every value on little-endian hosts. It is meant for callers that
/// keep register arrays in wire layout. The client itself never swaps in
/// place: requests go out through [`registers_to_bytes`] and responses come
/// back through [`bytes_to_registers`], which produce the same byte sequence.
#[inline]
pub fn swap_registers(registers: &mut [u16]) {
    for register in registers.iter_mut() {
        *register = register.to_be();
    }
}

/// Big-endian wire bytes for a register slice. The slice is left untouched.
pub fn registers_to_bytes(registers: &[u16]) -> Bytes {
    let mut buf = BytesMut::with_capacity(registers.len() * 2);
    for &value in registers {
        buf.put_u16(value);
    }
    buf.freeze()
}

/// Decode big-endian wire bytes into registers. A trailing odd byte is ignored.
pub fn bytes_to_registers(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_header() {
        let bytes = encode_header(0x0102, 6, 0x03);
        assert_eq!(bytes, [0x01, 0x02, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03]);
    }

    #[test]
    fn test_decode_header() {
        let header = decode_header(&[0x12, 0x34, 0x00, 0x00, 0x00, 0x07, 0x01, 0x83, 0xFF]).unwrap();
        assert_eq!(header.transaction_id, 0x1234);
        assert_eq!(header.protocol_id, 0);
        assert_eq!(header.length, 7);
        assert_eq!(header.unit_id, 1);
        assert_eq!(header.function_code, 0x83);
        assert!(header.is_exception());
    }

    #[test]
    fn test_decode_header_too_short() {
        let err = decode_header(&[0x00, 0x01, 0x00]).unwrap_err();
        assert!(matches!(err, ModbusError::Frame { .. }));
    }

    #[test]
    fn test_swap_registers_matches_wire_layout() {
        let original = [0x0001u16, 0x1234, 0xABCD];
        let mut regs = original;
        swap_registers(&mut regs);

        // In memory the swapped values hold the network byte sequence
        for (swapped, value) in regs.iter().zip(original.iter()) {
            assert_eq!(swapped.to_ne_bytes(), value.to_be_bytes());
            assert_eq!(u16::from_be(*swapped), *value);
        }
    }

    #[test]
    fn test_registers_bytes_conversion() {
        let bytes = registers_to_bytes(&[0x0001, 0x0002, 0xFF00]);
        assert_eq!(&bytes[..], &[0x00, 0x01, 0x00, 0x02, 0xFF, 0x00]);
        assert_eq!(bytes_to_registers(&bytes), vec![0x0001, 0x0002, 0xFF00]);
        assert_eq!(bytes_to_registers(&[0x12, 0x34, 0x56]), vec![0x1234]);
    }

    #[test]
    fn test_swap_registers_agrees_with_wire_encoding() {
        let values = [0x0102u16, 0xA0B0, 0x00FF];
        let mut regs = values;
        swap_registers(&mut regs);

        let in_place: Vec<u8> = regs.iter().flat_map(|r| r.to_ne_bytes()).collect();
        assert_eq!(&in_place[..], &registers_to_bytes(&values)[..]);

        swap_registers(&mut regs);
        assert_eq!(bytes_to_registers(&in_place), regs.to_vec());
    }

    proptest! {
        #[test]
        fn prop_swap_registers_is_involution(values in proptest::collection::vec(any::<u16>(), 0..128)) {
            let mut regs = values.clone();
            swap_registers(&mut regs);
            swap_registers(&mut regs);
            prop_assert_eq!(regs, values);
        }
    }
}
