//! The one concrete memory backing.
//!
//! All raw pointer arithmetic in the crate lives in this file. Everything
//! else goes through the bounds-checked [`ReadMemory`]/[`PatchMemory`]
//! traits.

use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::memory::{PatchMemory, ReadMemory};

enum Backing {
    /// Bytes owned by the region itself. Used for memory dumps and tests.
    Owned(Mutex<Vec<u8>>),
    /// A live mapping inside the host process.
    Raw { ptr: *mut u8, len: usize },
}

/// A contiguous range of host memory, addressed absolutely.
pub struct Region {
    base: u64,
    backing: Backing,
}

// Safety: the raw backing points at a mapping the host guarantees stays
// valid for the process lifetime. Concurrent reads are unsynchronized by
// design (the scanner reads while the host runs); writes happen only on
// the host's designated safe-mutation thread, per the PatchMemory
// contract.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Wrap an owned byte buffer. The buffer's first byte is addressed as
    /// `base`.
    pub fn from_bytes(base: u64, bytes: Vec<u8>) -> Self {
        Self {
            base,
            backing: Backing::Owned(Mutex::new(bytes)),
        }
    }

    /// Wrap a live mapping of the host image.
    ///
    /// # Safety
    ///
    /// `ptr` must point at a readable and writable mapping of at least
    /// `len` bytes that remains valid for the lifetime of the region.
    /// The host must not unmap or move it while the region is alive.
    pub unsafe fn from_raw_parts(base: u64, ptr: *mut u8, len: usize) -> Self {
        Self {
            base,
            backing: Backing::Raw { ptr, len },
        }
    }

    fn backing_len(&self) -> usize {
        match &self.backing {
            Backing::Owned(bytes) => bytes.lock().map(|b| b.len()).unwrap_or(0),
            Backing::Raw { len, .. } => *len,
        }
    }

    fn offset_of(&self, address: u64, len: usize) -> Result<usize> {
        if !self.contains(address, len) {
            return Err(Error::OutOfBounds { address, len });
        }
        Ok((address - self.base) as usize)
    }
}

impl ReadMemory for Region {
    fn base_address(&self) -> u64 {
        self.base
    }

    fn len(&self) -> usize {
        self.backing_len()
    }

    fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        let offset = self.offset_of(address, len)?;

        match &self.backing {
            Backing::Owned(bytes) => {
                let bytes = bytes
                    .lock()
                    .map_err(|_| Error::OutOfBounds { address, len })?;
                Ok(bytes[offset..offset + len].to_vec())
            }
            Backing::Raw { ptr, .. } => {
                // Safety: offset_of proved [offset, offset + len) lies
                // inside the mapping described by from_raw_parts.
                let slice = unsafe { std::slice::from_raw_parts(ptr.add(offset), len) };
                Ok(slice.to_vec())
            }
        }
    }
}

impl PatchMemory for Region {
    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<()> {
        let offset = self.offset_of(address, bytes.len())?;

        match &self.backing {
            Backing::Owned(buffer) => {
                let mut buffer = buffer.lock().map_err(|_| Error::OutOfBounds {
                    address,
                    len: bytes.len(),
                })?;
                buffer[offset..offset + bytes.len()].copy_from_slice(bytes);
                Ok(())
            }
            Backing::Raw { ptr, .. } => {
                // Safety: offset_of proved the range is in bounds, and the
                // from_raw_parts contract makes the mapping writable.
                unsafe {
                    std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.add(offset), bytes.len());
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bytes_bounds() {
        let region = Region::from_bytes(0x1000, vec![1, 2, 3, 4]);

        assert_eq!(region.read_bytes(0x1000, 4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(region.read_bytes(0x1002, 2).unwrap(), vec![3, 4]);

        assert!(region.read_bytes(0x0FFF, 1).is_err());
        assert!(region.read_bytes(0x1003, 2).is_err());
        assert!(region.read_bytes(0x1004, 1).is_err());
    }

    #[test]
    fn test_read_integers() {
        let region = Region::from_bytes(0x2000, vec![0x78, 0x56, 0x34, 0x12, 0, 0, 0, 0]);
        assert_eq!(region.read_u32(0x2000).unwrap(), 0x12345678);
        assert_eq!(region.read_u64(0x2000).unwrap(), 0x12345678);
        assert_eq!(region.read_i32(0x2000).unwrap(), 0x12345678);
    }

    #[test]
    fn test_write_bytes_roundtrip() {
        let region = Region::from_bytes(0x1000, vec![0; 8]);
        region.write_bytes(0x1002, &[0xAA, 0xBB]).unwrap();
        assert_eq!(
            region.read_bytes(0x1000, 8).unwrap(),
            vec![0, 0, 0xAA, 0xBB, 0, 0, 0, 0]
        );

        assert!(region.write_bytes(0x1007, &[1, 2]).is_err());
    }

    #[test]
    fn test_empty_region() {
        let region = Region::from_bytes(0, Vec::new());
        assert!(region.is_empty());
        assert!(region.read_bytes(0, 1).is_err());
    }
}
