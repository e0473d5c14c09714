//! Content store for blob bytes.
//!
//! Each blob's content lives in a single extent addressed by a random id;
//! the metadata store only holds the [`ExtentChunk`] reference.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::models::ExtentChunk;

/// Blob content storage.
#[async_trait]
pub trait ExtentStore: Send + Sync {
    /// Stores `data` and returns a reference to it.
    async fn write(&self, data: Bytes) -> StorageResult<ExtentChunk>;

    /// Reads a whole extent.
    async fn read(&self, chunk: &ExtentChunk) -> StorageResult<Bytes>;

    /// Reads `count` bytes starting at `offset` within an extent.
    async fn read_range(&self, chunk: &ExtentChunk, offset: u64, count: u64)
        -> StorageResult<Bytes>;

    /// Removes an extent. Unknown ids are ignored.
    async fn delete(&self, extent_id: &str) -> StorageResult<()>;

    /// Total bytes held.
    async fn total_size(&self) -> u64;
}

/// In-memory extent store.
#[derive(Default)]
pub struct MemoryExtentStore {
    extents: DashMap<Arc<str>, Bytes>,
    current_size: AtomicU64,
}

impl MemoryExtentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn missing_extent(id: &str) -> StorageError {
        StorageError::with_message(
            ErrorCode::InternalError,
            format!("Extent {} is missing from the content store", id),
        )
    }
}

#[async_trait]
impl ExtentStore for MemoryExtentStore {
    async fn write(&self, data: Bytes) -> StorageResult<ExtentChunk> {
        let count = data.len() as u64;
        let id = Uuid::new_v4().to_string();
        self.extents.insert(Arc::from(id.as_str()), data);
        self.current_size.fetch_add(count, Ordering::Relaxed);
        Ok(ExtentChunk { id, count })
    }

    async fn read(&self, chunk: &ExtentChunk) -> StorageResult<Bytes> {
        self.read_range(chunk, 0, chunk.count).await
    }

    async fn read_range(
        &self,
        chunk: &ExtentChunk,
        offset: u64,
        count: u64,
    ) -> StorageResult<Bytes> {
        let extent = self
            .extents
            .get(chunk.id.as_str())
            .ok_or_else(|| Self::missing_extent(&chunk.id))?;

        let start = offset as usize;
        let end = start.saturating_add(count as usize);
        if end > extent.len() {
            return Err(StorageError::new(ErrorCode::InvalidRange));
        }
        Ok(extent.slice(start..end))
    }

    async fn delete(&self, extent_id: &str) -> StorageResult<()> {
        if let Some((_, data)) = self.extents.remove(extent_id) {
            self.current_size
                .fetch_sub(data.len() as u64, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn total_size(&self) -> u64 {
        self.current_size.load(Ordering::Relaxed)
    }
}
