//! Code patching primitives.

use crate::error::Result;
use crate::memory::PatchMemory;

/// Length of the absolute jump written over a hooked function's entry.
pub const JUMP_LEN: usize = 14;

/// Encode an absolute x86-64 jump: `jmp [rip+0]` followed by the 8-byte
/// target address the indirection reads.
pub fn encode_jump(target: u64) -> [u8; JUMP_LEN] {
    let mut bytes = [0u8; JUMP_LEN];
    bytes[0] = 0xFF;
    bytes[1] = 0x25;
    bytes[6..14].copy_from_slice(&target.to_le_bytes());
    bytes
}

/// A reversible byte patch: the original bytes are saved before the
/// replacement is written, and `restore` puts them back bit-for-bit.
#[derive(Debug)]
pub struct BytePatch {
    address: u64,
    original: Vec<u8>,
}

impl BytePatch {
    /// Save the bytes at `address` and overwrite them with `replacement`.
    pub fn apply<M: PatchMemory + ?Sized>(
        memory: &M,
        address: u64,
        replacement: &[u8],
    ) -> Result<Self> {
        let original = memory.read_bytes(address, replacement.len())?;
        memory.write_bytes(address, replacement)?;
        Ok(Self { address, original })
    }

    /// Write the saved original bytes back.
    pub fn restore<M: PatchMemory + ?Sized>(&self, memory: &M) -> Result<()> {
        memory.write_bytes(self.address, &self.original)
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    /// The bytes that were at the location before the patch.
    pub fn original(&self) -> &[u8] {
        &self.original
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ReadMemory, Region};

    #[test]
    fn test_encode_jump_layout() {
        let jump = encode_jump(0x1122_3344_5566_7788);
        assert_eq!(&jump[0..6], &[0xFF, 0x25, 0, 0, 0, 0]);
        assert_eq!(&jump[6..14], &0x1122_3344_5566_7788u64.to_le_bytes());
    }

    #[test]
    fn test_patch_and_restore_bit_identical() {
        let region = Region::from_bytes(0x1000, (0u8..32).collect());
        let before = region.read_bytes(0x1000, 32).unwrap();

        let patch = BytePatch::apply(&region, 0x1008, &[0xFF; 4]).unwrap();
        assert_eq!(patch.original(), &[8, 9, 10, 11]);
        assert_eq!(region.read_bytes(0x1008, 4).unwrap(), vec![0xFF; 4]);

        patch.restore(&region).unwrap();
        assert_eq!(region.read_bytes(0x1000, 32).unwrap(), before);
    }

    #[test]
    fn test_patch_out_of_bounds_rejected() {
        let region = Region::from_bytes(0x1000, vec![0; 8]);
        assert!(BytePatch::apply(&region, 0x1006, &[1, 2, 3]).is_err());
        // Nothing was written.
        assert_eq!(region.read_bytes(0x1000, 8).unwrap(), vec![0; 8]);
    }
}
