mod cache;
mod defs;
mod pattern;
mod resolver;
mod worker;

pub use cache::*;
pub use defs::*;
pub use pattern::*;
pub use resolver::*;
pub use worker::*;
