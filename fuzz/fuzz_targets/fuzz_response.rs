//! Feed arbitrary response bytes to every client operation.
//!
//! The client must never panic or read past the scripted bytes, whatever the
//! server sends.

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use modbus_tcp_client::frame::decode_header;
use modbus_tcp_client::{BlockOp, BlockRange, ModbusError, ModbusResult, ModbusTcpClient, Transport};

#[derive(Debug, Arbitrary)]
enum Operation {
    Read { address: u16, count: u8 },
    Write { address: u16, values: Vec<u16> },
    MultiblockRead { blocks: Vec<(u16, u8)> },
    MultiblockReadWrite { reads: Vec<(u16, u16, u8)>, write: Vec<u16> },
}

#[derive(Debug, Arbitrary)]
struct Input {
    operations: Vec<Operation>,
    response: Vec<u8>,
}

struct ScriptedTransport {
    response: Vec<u8>,
    offset: usize,
}

impl Transport for ScriptedTransport {
    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> ModbusResult<()> {
        let end = self.offset + buf.len();
        if end > self.response.len() {
            self.offset = self.response.len();
            return Err(ModbusError::timeout("fuzz read", timeout.as_millis() as u64));
        }
        buf.copy_from_slice(&self.response[self.offset..end]);
        self.offset = end;
        Ok(())
    }

    fn write_all(&mut self, _bytes: &[u8]) -> ModbusResult<()> {
        Ok(())
    }

    fn close(&mut self) -> ModbusResult<()> {
        Ok(())
    }
}

fuzz_target!(|input: Input| {
    if let Ok(header) = decode_header(&input.response) {
        let _ = header.is_exception();
    }

    let transport = ScriptedTransport {
        response: input.response,
        offset: 0,
    };
    let mut client = ModbusTcpClient::from_transport(transport);

    for operation in input.operations.iter().take(8) {
        let _ = match operation {
            Operation::Read { address, count } => client
                .read_holding_registers(*address, *count as u16)
                .map(drop),
            Operation::Write { address, values } => {
                client.write_multiple_registers(*address, values)
            }
            Operation::MultiblockRead { blocks } => {
                let blocks: Vec<BlockRange> = blocks
                    .iter()
                    .map(|(address, count)| BlockRange::new(*address, *count as u16))
                    .collect();
                client.read_multiblock_registers(&blocks).map(drop)
            }
            Operation::MultiblockReadWrite { reads, write } => {
                let mut ops: Vec<BlockOp<'_>> = reads
                    .iter()
                    .map(|(page, address, count)| BlockOp::read(*page, *address, *count as u16))
                    .collect();
                ops.push(BlockOp::write(0, 0, write));
                client.read_write_multiblock_registers(&ops).map(drop)
            }
        };
    }

    assert!(client.transport().offset <= client.transport().response.len());
});
