mod patch;
mod registry;

pub use patch::*;
pub use registry::*;
