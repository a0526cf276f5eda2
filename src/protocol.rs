//! # Modbus Protocol Definitions
//!
//! Function codes, request encoding and the fixed response shapes of the four
//! functions this client speaks.
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Standard |
//! |------|----------|----------|
//! | 0x03 | Read Holding Registers | ✅ |
//! | 0x10 | Write Multiple Registers | ✅ |
//! | 0x65 | Multi-block Read | vendor extension |
//! | 0x68 | Multi-block Read/Write | vendor extension |
//!
//! The two extensions only interoperate with servers implementing them.
//!
//! ## Multi-block Read (0x65)
//!
//! ```text
//! request:  header | block_count:u8 | { address:u16 length:u16 } * block_count
//! response: header | block_count:u8 | { address:u16 length:u16 } * block_count | registers
//! ```
//!
//! The response length field equals the request length field plus two bytes
//! per requested register.
//!
//! ## Multi-block Read/Write (0x68)
//!
//! ```text
//! request:  header | count:u16 | { tag:u16 page:u16 address:u16 length:u16 [data] } * count
//! response: header | count:u16 | { ack:u16 [data] } * count
//! ```
//!
//! `tag` is 0xC3C3 for reads and 0x3C3C for writes; `data` follows write
//! sub-requests in the request and read sub-requests in the response. The
//! response length field always declares 4 and does not cover the acks.

use bytes::{BufMut, Bytes, BytesMut};

use crate::config::ClientConfig;
use crate::constants::{
    EXCEPTION_BIT, FC_READ_HOLDING_REGISTERS, FC_READ_MULTIBLOCK_REGISTERS,
    FC_READ_WRITE_MULTIBLOCK_REGISTERS, FC_WRITE_MULTIPLE_REGISTERS, HEADER_COUNTED_LEN,
    HEADER_LEN, MAX_MULTIBLOCK_BLOCKS, MULTIBLOCK_TAG_READ, MULTIBLOCK_TAG_WRITE,
};
use crate::error::{ModbusError, ModbusResult};
use crate::frame::{registers_to_bytes, FrameHeader};

/// Function codes implemented by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionCode {
    ReadHoldingRegisters = FC_READ_HOLDING_REGISTERS,
    WriteMultipleRegisters = FC_WRITE_MULTIPLE_REGISTERS,
    ReadMultiblockRegisters = FC_READ_MULTIBLOCK_REGISTERS,
    ReadWriteMultiblockRegisters = FC_READ_WRITE_MULTIBLOCK_REGISTERS,
}

impl FunctionCode {
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse a function code, ignoring the exception bit.
    pub fn from_u8(code: u8) -> Option<Self> {
        match code & !EXCEPTION_BIT {
            FC_READ_HOLDING_REGISTERS => Some(Self::ReadHoldingRegisters),
            FC_WRITE_MULTIPLE_REGISTERS => Some(Self::WriteMultipleRegisters),
            FC_READ_MULTIBLOCK_REGISTERS => Some(Self::ReadMultiblockRegisters),
            FC_READ_WRITE_MULTIBLOCK_REGISTERS => Some(Self::ReadWriteMultiblockRegisters),
            _ => None,
        }
    }

    /// Code a device answers with when it rejects this function.
    #[inline]
    pub fn exception_code(self) -> u8 {
        self.to_u8() | EXCEPTION_BIT
    }

    /// Get human-readable function code description
    pub fn description(self) -> &'static str {
        match self {
            Self::ReadHoldingRegisters => "Read Holding Registers",
            Self::WriteMultipleRegisters => "Write Multiple Registers",
            Self::ReadMultiblockRegisters => "Multi-block Read",
            Self::ReadWriteMultiblockRegisters => "Multi-block Read/Write",
        }
    }
}

/// One block of a multi-block read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub address: u16,
    pub count: u16,
}

impl BlockRange {
    pub fn new(address: u16, count: u16) -> Self {
        Self { address, count }
    }
}

/// One sub-request of a multi-block read/write transaction.
///
/// Write data is borrowed for the duration of the call only and is never
/// modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOp<'a> {
    /// Read `count` registers starting at `address` on `page`.
    Read { page: u16, address: u16, count: u16 },
    /// Write `data` starting at `address` on `page`.
    Write {
        page: u16,
        address: u16,
        data: &'a [u16],
    },
}

impl<'a> BlockOp<'a> {
    pub fn read(page: u16, address: u16, count: u16) -> Self {
        Self::Read {
            page,
            address,
            count,
        }
    }

    pub fn write(page: u16, address: u16, data: &'a [u16]) -> Self {
        Self::Write {
            page,
            address,
            data,
        }
    }

    /// Wire tag of the sub-request
    pub fn tag(&self) -> u16 {
        match self {
            Self::Read { .. } => MULTIBLOCK_TAG_READ,
            Self::Write { .. } => MULTIBLOCK_TAG_WRITE,
        }
    }

    pub fn page(&self) -> u16 {
        match *self {
            Self::Read { page, .. } | Self::Write { page, .. } => page,
        }
    }

    pub fn address(&self) -> u16 {
        match *self {
            Self::Read { address, .. } | Self::Write { address, .. } => address,
        }
    }

    /// Number of registers read or written.
    pub fn register_count(&self) -> usize {
        match self {
            Self::Read { count, .. } => *count as usize,
            Self::Write { data, .. } => data.len(),
        }
    }
}

/// Outcome of one acknowledged multi-block read/write sub-request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReply {
    /// Registers returned for a read sub-request
    Read(Vec<u16>),
    /// A write sub-request was accepted
    Written,
}

impl BlockReply {
    /// Registers of a read reply.
    pub fn registers(&self) -> Option<&[u16]> {
        match self {
            Self::Read(values) => Some(values),
            Self::Written => None,
        }
    }

    pub fn into_registers(self) -> Option<Vec<u16>> {
        match self {
            Self::Read(values) => Some(values),
            Self::Written => None,
        }
    }
}

/// A request ready to be encoded.
#[derive(Debug, Clone, Copy)]
pub enum Request<'a> {
    ReadHoldingRegisters { address: u16, count: u16 },
    WriteMultipleRegisters { address: u16, values: &'a [u16] },
    ReadMultiblockRegisters { blocks: &'a [BlockRange] },
    ReadWriteMultiblockRegisters { ops: &'a [BlockOp<'a>] },
}

impl<'a> Request<'a> {
    pub fn function(&self) -> FunctionCode {
        match self {
            Self::ReadHoldingRegisters { .. } => FunctionCode::ReadHoldingRegisters,
            Self::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
            Self::ReadMultiblockRegisters { .. } => FunctionCode::ReadMultiblockRegisters,
            Self::ReadWriteMultiblockRegisters { .. } => FunctionCode::ReadWriteMultiblockRegisters,
        }
    }

    /// Check arguments against protocol and configured limits.
    pub fn validate(&self, config: &ClientConfig) -> ModbusResult<()> {
        match *self {
            Self::ReadHoldingRegisters { count, .. } => {
                if count == 0 || count > config.max_read_registers {
                    return Err(ModbusError::invalid_data(format!(
                        "read count must be 1..={}, got {}",
                        config.max_read_registers, count
                    )));
                }
            }
            Self::WriteMultipleRegisters { values, .. } => {
                if values.is_empty() || values.len() > config.max_write_registers as usize {
                    return Err(ModbusError::invalid_data(format!(
                        "write count must be 1..={}, got {}",
                        config.max_write_registers,
                        values.len()
                    )));
                }
            }
            Self::ReadMultiblockRegisters { blocks } => {
                if blocks.is_empty() || blocks.len() > MAX_MULTIBLOCK_BLOCKS {
                    return Err(ModbusError::invalid_data(format!(
                        "block count must be 1..={}, got {}",
                        MAX_MULTIBLOCK_BLOCKS,
                        blocks.len()
                    )));
                }
                if let Some(index) = blocks.iter().position(|b| b.count == 0) {
                    return Err(ModbusError::invalid_data(format!(
                        "block {} has zero length",
                        index
                    )));
                }
                let response_len = multiblock_read_length(blocks) as usize
                    + 2 * total_block_registers(blocks);
                if response_len > u16::MAX as usize {
                    return Err(ModbusError::invalid_data(format!(
                        "multi-block read response of {} bytes does not fit a frame",
                        response_len
                    )));
                }
            }
            Self::ReadWriteMultiblockRegisters { ops } => {
                if ops.is_empty() || ops.len() > u16::MAX as usize {
                    return Err(ModbusError::invalid_data(format!(
                        "sub-request count must be 1..={}, got {}",
                        u16::MAX,
                        ops.len()
                    )));
                }
                for (index, op) in ops.iter().enumerate() {
                    let count = op.register_count();
                    if count == 0 || count > u16::MAX as usize {
                        return Err(ModbusError::invalid_data(format!(
                            "sub-request {} length must be 1..={}, got {}",
                            index,
                            u16::MAX,
                            count
                        )));
                    }
                }
                let request_len = read_write_request_length(ops);
                if request_len > u16::MAX as usize {
                    return Err(ModbusError::invalid_data(format!(
                        "multi-block read/write request of {} bytes does not fit a frame",
                        request_len
                    )));
                }
            }
        }
        Ok(())
    }

    /// Value of the header length field (unit id + function code + payload).
    ///
    /// Only meaningful after [`validate`](Self::validate) succeeded.
    pub fn length_field(&self) -> u16 {
        match *self {
            Self::ReadHoldingRegisters { .. } => HEADER_COUNTED_LEN + 4,
            Self::WriteMultipleRegisters { values, .. } => {
                HEADER_COUNTED_LEN + 5 + 2 * values.len() as u16
            }
            Self::ReadMultiblockRegisters { blocks } => multiblock_read_length(blocks),
            Self::ReadWriteMultiblockRegisters { ops } => read_write_request_length(ops) as u16,
        }
    }

    /// Whether a response length field can be trusted to frame the response.
    ///
    /// Multi-block read/write responses declare 4 regardless of their size.
    pub fn response_length_is_reliable(&self) -> bool {
        !matches!(self, Self::ReadWriteMultiblockRegisters { .. })
    }

    /// Encode the complete frame. Caller data is copied, never modified.
    pub fn encode(&self, header: &FrameHeader) -> Bytes {
        let mut frame = BytesMut::with_capacity(HEADER_LEN + header.length as usize);
        header.put(&mut frame);

        match *self {
            Self::ReadHoldingRegisters { address, count } => {
                frame.put_u16(address);
                frame.put_u16(count);
            }
            Self::WriteMultipleRegisters { address, values } => {
                frame.put_u16(address);
                frame.put_u16(values.len() as u16);
                frame.put_u8((values.len() * 2) as u8);
                frame.put_slice(&registers_to_bytes(values));
            }
            Self::ReadMultiblockRegisters { blocks } => {
                frame.put_u8(blocks.len() as u8);
                for block in blocks {
                    frame.put_u16(block.address);
                    frame.put_u16(block.count);
                }
            }
            Self::ReadWriteMultiblockRegisters { ops } => {
                frame.put_u16(ops.len() as u16);
                for op in ops {
                    frame.put_u16(op.tag());
                    frame.put_u16(op.page());
                    frame.put_u16(op.address());
                    frame.put_u16(op.register_count() as u16);
                    if let BlockOp::Write { data, .. } = op {
                        frame.put_slice(&registers_to_bytes(data));
                    }
                }
            }
        }

        frame.freeze()
    }
}

/// Total registers requested by a multi-block read.
pub fn total_block_registers(blocks: &[BlockRange]) -> usize {
    blocks.iter().map(|b| b.count as usize).sum()
}

/// Length field of a multi-block read request: unit id, function code, block
/// count and four bytes per block.
fn multiblock_read_length(blocks: &[BlockRange]) -> u16 {
    (HEADER_COUNTED_LEN as usize + 1 + 4 * blocks.len()) as u16
}

/// Length field of a multi-block read/write request, unbounded.
fn read_write_request_length(ops: &[BlockOp<'_>]) -> usize {
    let body: usize = ops
        .iter()
        .map(|op| match op {
            BlockOp::Read { .. } => 8,
            BlockOp::Write { data, .. } => 8 + 2 * data.len(),
        })
        .sum();
    HEADER_COUNTED_LEN as usize + 2 + body
}

/// Expected response length field for a read holding registers request.
///
/// `count` must already be validated against the read limit.
#[inline]
pub(crate) fn read_holding_response_length(count: u16) -> u16 {
    HEADER_COUNTED_LEN + 1 + 2 * count
}

/// Expected response length field for a multi-block read.
///
/// `blocks` must already have passed [`Request::validate`].
#[inline]
pub(crate) fn multiblock_read_response_length(blocks: &[BlockRange]) -> u16 {
    (multiblock_read_length(blocks) as usize + 2 * total_block_registers(blocks)) as u16
}

/// Response length field of a write multiple registers echo.
pub const WRITE_RESPONSE_LENGTH: u16 = HEADER_COUNTED_LEN + 4;

/// Response length field of a multi-block read/write envelope.
pub const READ_WRITE_RESPONSE_LENGTH: u16 = HEADER_COUNTED_LEN + 2;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encode(request: Request<'_>, tid: u16) -> Bytes {
        request.validate(&ClientConfig::default()).unwrap();
        let header = FrameHeader::request(tid, request.length_field(), request.function().to_u8());
        request.encode(&header)
    }

    #[test]
    fn test_function_code_roundtrip() {
        for fc in [0x03, 0x10, 0x65, 0x68] {
            assert_eq!(FunctionCode::from_u8(fc).unwrap().to_u8(), fc);
        }
        assert_eq!(
            FunctionCode::from_u8(0x83),
            Some(FunctionCode::ReadHoldingRegisters)
        );
        assert_eq!(FunctionCode::from_u8(0x04), None);
        assert_eq!(FunctionCode::WriteMultipleRegisters.exception_code(), 0x90);
    }

    #[test]
    fn test_encode_read_holding_registers() {
        let frame = encode(
            Request::ReadHoldingRegisters {
                address: 0x006B,
                count: 3,
            },
            0x0001,
        );
        assert_eq!(
            &frame[..],
            &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x6B, 0x00, 0x03]
        );
        // unit + function + byte count + 6 data bytes
        assert_eq!(read_holding_response_length(3), 9);
        assert_eq!(read_holding_response_length(125), 253);
    }

    #[test]
    fn test_encode_write_multiple_registers() {
        let values = [0x000A, 0x0102];
        let frame = encode(
            Request::WriteMultipleRegisters {
                address: 0x0001,
                values: &values,
            },
            0x0007,
        );
        assert_eq!(
            &frame[..],
            &[
                0x00, 0x07, 0x00, 0x00, 0x00, 0x0B, 0x01, 0x10, 0x00, 0x01, 0x00, 0x02, 0x04,
                0x00, 0x0A, 0x01, 0x02
            ]
        );
        // Caller data untouched
        assert_eq!(values, [0x000A, 0x0102]);
    }

    #[test]
    fn test_encode_multiblock_read() {
        let blocks = [BlockRange::new(0x0100, 2), BlockRange::new(0x0200, 3)];
        let request = Request::ReadMultiblockRegisters { blocks: &blocks };
        let frame = encode(request, 0x0002);

        assert_eq!(request.length_field(), 11);
        assert_eq!(multiblock_read_response_length(&blocks), 11 + 10);
        assert_eq!(
            &frame[..],
            &[
                0x00, 0x02, 0x00, 0x00, 0x00, 0x0B, 0x01, 0x65, 0x02, 0x01, 0x00, 0x00, 0x02,
                0x02, 0x00, 0x00, 0x03
            ]
        );
    }

    #[test]
    fn test_encode_multiblock_read_write() {
        let data = [0x1234];
        let ops = [BlockOp::read(1, 0x0010, 2), BlockOp::write(2, 0x0020, &data)];
        let request = Request::ReadWriteMultiblockRegisters { ops: &ops };
        let frame = encode(request, 0x0003);

        // unit + fc + count + 8 + (8 + 2)
        assert_eq!(request.length_field(), 22);
        assert!(!request.response_length_is_reliable());
        assert_eq!(
            &frame[..],
            &[
                0x00, 0x03, 0x00, 0x00, 0x00, 0x16, 0x01, 0x68, // header
                0x00, 0x02, // request count
                0xC3, 0xC3, 0x00, 0x01, 0x00, 0x10, 0x00, 0x02, // read
                0x3C, 0x3C, 0x00, 0x02, 0x00, 0x20, 0x00, 0x01, 0x12, 0x34, // write
            ]
        );
    }

    #[test]
    fn test_validate_rejects_bad_counts() {
        let config = ClientConfig::default();
        assert!(Request::ReadHoldingRegisters { address: 0, count: 0 }
            .validate(&config)
            .is_err());
        assert!(Request::ReadHoldingRegisters { address: 0, count: 126 }
            .validate(&config)
            .is_err());
        assert!(Request::WriteMultipleRegisters {
            address: 0,
            values: &[0; 124]
        }
        .validate(&config)
        .is_err());
        assert!(Request::ReadMultiblockRegisters { blocks: &[] }
            .validate(&config)
            .is_err());
        assert!(Request::ReadMultiblockRegisters {
            blocks: &[BlockRange::new(0, 1), BlockRange::new(10, 0)]
        }
        .validate(&config)
        .is_err());
        assert!(Request::ReadWriteMultiblockRegisters {
            ops: &[BlockOp::write(0, 0, &[])]
        }
        .validate(&config)
        .is_err());

        let limited = ClientConfig::new().with_max_read_registers(10);
        assert!(Request::ReadHoldingRegisters { address: 0, count: 11 }
            .validate(&limited)
            .is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_multiblock() {
        let blocks = vec![BlockRange::new(0, 200); 200];
        let err = Request::ReadMultiblockRegisters { blocks: &blocks }
            .validate(&ClientConfig::default())
            .unwrap_err();
        assert!(matches!(err, ModbusError::InvalidData { .. }));
    }

    proptest! {
        #[test]
        fn prop_read_request_is_twelve_bytes(address in any::<u16>(), count in 1u16..=125) {
            let frame = encode(Request::ReadHoldingRegisters { address, count }, 0);
            prop_assert_eq!(frame.len(), 12);
        }

        #[test]
        fn prop_write_request_size(address in any::<u16>(), values in proptest::collection::vec(any::<u16>(), 1..=123)) {
            let frame = encode(Request::WriteMultipleRegisters { address, values: &values }, 0);
            prop_assert_eq!(frame.len(), 13 + 2 * values.len());
            // Length field covers everything after itself
            prop_assert_eq!(u16::from_be_bytes([frame[4], frame[5]]) as usize, frame.len() - 6);
        }
    }
}
