//! Transaction correlation
//!
//! Each request carries a 16-bit transaction id taken from a per-client
//! counter; the response must echo it together with the unit id and the
//! function code (or the function code with the exception bit set).

use crate::constants::{EXCEPTION_BIT, MODBUS_PROTOCOL_ID};
use crate::error::ProtocolError;
use crate::frame::FrameHeader;

/// Rolling transaction id source, owned by a single client.
#[derive(Debug, Clone, Default)]
pub struct TransactionCounter {
    next: u16,
}

impl TransactionCounter {
    /// Counter whose first issued id is 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter whose first issued id is `start`.
    pub fn starting_at(start: u16) -> Self {
        Self { next: start }
    }

    /// Return the current id and advance modulo 65536.
    ///
    /// Call exactly once per request, right before encoding it.
    #[inline]
    pub fn next_id(&mut self) -> u16 {
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id
    }

    /// The id the next request will carry.
    #[inline]
    pub fn peek(&self) -> u16 {
        self.next
    }
}

/// Check that `response` answers `request`.
///
/// Runs before any payload-specific validation. The exception bit on the
/// response function code is accepted here; callers branch on it afterwards.
pub fn validate(request: &FrameHeader, response: &FrameHeader) -> Result<(), ProtocolError> {
    if request.transaction_id != response.transaction_id {
        return Err(ProtocolError::TransactionMismatch {
            expected: request.transaction_id,
            actual: response.transaction_id,
        });
    }

    if response.protocol_id != MODBUS_PROTOCOL_ID {
        return Err(ProtocolError::ProtocolIdMismatch {
            actual: response.protocol_id,
        });
    }

    if request.unit_id != response.unit_id {
        return Err(ProtocolError::UnitMismatch {
            expected: request.unit_id,
            actual: response.unit_id,
        });
    }

    let fc = request.function_code;
    if response.function_code != fc && response.function_code != fc | EXCEPTION_BIT {
        return Err(ProtocolError::FunctionMismatch {
            expected: fc,
            actual: response.function_code,
        });
    }

    Ok(())
}
