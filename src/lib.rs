//! blobcore: the core of an Azure Blob Storage emulator.
//!
//! Provides the etag generator, the lease engine, the metadata store
//! contract with an in-memory implementation, the listing engine and the
//! cross-account copy authorizer, exposed through a path-style HTTP API.
//!
//! # Example
//!
//! ```no_run
//! use blobcore::{BlobServer, Config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = BlobServer::new(Config::default());
//!     server.run().await.unwrap();
//! }
//! ```

pub mod config;
pub mod context;
pub mod copy_source;
pub mod error;
pub mod etag;
pub mod handlers;
pub mod lease;
pub mod listing;
pub mod models;
pub mod router;
pub mod server;
pub mod storage;
pub mod xml;

pub use config::{Args, Config, DEFAULT_ACCOUNT, DEFAULT_ACCOUNT_KEY, DEFAULT_BLOB_PORT};
pub use copy_source::CopySourceAuthorizer;
pub use error::{ErrorCode, StorageError, StorageResult};
pub use server::{BlobServer, BlobServerBuilder};
pub use storage::{ExtentStore, MemoryExtentStore, MemoryMetadataStore, MetadataStore};
