use std::sync::Arc;

use crate::utils::error::TransportError;

/// Read access to a controller's holding registers.
///
/// Implemented by whatever owns the Modbus link (TCP or RTU session,
/// retries, timeouts, request serialization). The query engine makes exactly
/// one call per query and treats any failure as final.
pub trait RegisterTransport {
    /// Read `count` consecutive 16-bit registers starting at the zero-based
    /// protocol `address`.
    fn read_registers(&self, address: u16, count: u16) -> Result<Vec<u16>, TransportError>;
}

impl<T: RegisterTransport + ?Sized> RegisterTransport for &T {
    fn read_registers(&self, address: u16, count: u16) -> Result<Vec<u16>, TransportError> {
        (**self).read_registers(address, count)
    }
}

impl<T: RegisterTransport + ?Sized> RegisterTransport for Box<T> {
    fn read_registers(&self, address: u16, count: u16) -> Result<Vec<u16>, TransportError> {
        (**self).read_registers(address, count)
    }
}

impl<T: RegisterTransport + ?Sized> RegisterTransport for Arc<T> {
    fn read_registers(&self, address: u16, count: u16) -> Result<Vec<u16>, TransportError> {
        (**self).read_registers(address, count)
    }
}

/// Convert a read-holding-registers payload (big-endian byte pairs, as
/// returned by most Modbus clients) into register words.
pub fn words_from_bytes(bytes: &[u8]) -> Result<Vec<u16>, TransportError> {
    if bytes.len() % 2 != 0 {
        return Err(TransportError::message(format!(
            "odd payload length {} ({})",
            bytes.len(),
            hex::encode(bytes)
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}
