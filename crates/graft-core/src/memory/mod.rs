pub mod access;
mod region;

pub use access::{PatchMemory, ReadMemory};
pub use region::Region;
