//! Data models for the blob service.

mod blob;
mod container;
mod lease;
mod metadata;
mod service;

pub use blob::*;
pub use container::*;
pub use lease::*;
pub use metadata::*;
pub use service::*;
