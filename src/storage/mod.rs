//! Storage layer for persistence.

mod extent;
mod metadata;

pub use extent::*;
pub use metadata::*;
