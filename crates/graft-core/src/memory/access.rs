//! Access traits for host memory.
//!
//! Everything above this layer works with absolute addresses and
//! bounds-checked operations; nothing above this layer touches a raw
//! pointer.

use crate::error::Result;

/// Read-only access to a contiguous range of host memory.
pub trait ReadMemory {
    /// Absolute address of the first byte.
    fn base_address(&self) -> u64;

    /// Number of addressable bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read `len` bytes starting at the absolute address `address`.
    fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>>;

    /// Whether `[address, address + len)` lies fully inside the range.
    fn contains(&self, address: u64, len: usize) -> bool {
        let end = self.base_address() + self.len() as u64;
        address >= self.base_address()
            && (len as u64) <= end
            && address <= end - len as u64
    }

    fn read_u32(&self, address: u64) -> Result<u32> {
        let bytes = self.read_bytes(address, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i32(&self, address: u64) -> Result<i32> {
        let bytes = self.read_bytes(address, 4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&self, address: u64) -> Result<u64> {
        let bytes = self.read_bytes(address, 8)?;
        Ok(u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }
}

/// Write access to host memory, layered on top of [`ReadMemory`].
///
/// Writes are structural mutation of the host image and must only be
/// performed from the host's designated safe-mutation thread.
pub trait PatchMemory: ReadMemory {
    /// Overwrite bytes starting at the absolute address `address`.
    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<()>;
}
