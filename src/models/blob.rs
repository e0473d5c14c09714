//! Blob data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lease::LeaseProperties;
use super::metadata::Metadata;
use crate::etag::new_etag;

/// Copy status for blob copy operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyStatus {
    Pending,
    Success,
    Aborted,
    Failed,
}

impl CopyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CopyStatus::Pending => "pending",
            CopyStatus::Success => "success",
            CopyStatus::Aborted => "aborted",
            CopyStatus::Failed => "failed",
        }
    }
}

/// Reference to content held by the extent store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtentChunk {
    /// Extent id.
    pub id: String,
    /// Number of bytes.
    pub count: u64,
}

/// Blob properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobProperties {
    pub content_length: u64,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_md5: Option<String>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub created_on: DateTime<Utc>,
    pub lease: LeaseProperties,
    pub copy_id: Option<String>,
    pub copy_source: Option<String>,
    pub copy_status: Option<CopyStatus>,
    pub copy_progress: Option<String>,
    pub copy_completion_time: Option<DateTime<Utc>>,
}

impl BlobProperties {
    /// Creates properties for a freshly written block blob.
    pub fn new(content_length: u64) -> Self {
        let now = Utc::now();
        Self {
            content_length,
            content_type: Some("application/octet-stream".to_string()),
            content_encoding: None,
            content_language: None,
            content_md5: None,
            content_disposition: None,
            cache_control: None,
            etag: new_etag(),
            last_modified: now,
            created_on: now,
            lease: LeaseProperties::default(),
            copy_id: None,
            copy_source: None,
            copy_status: None,
            copy_progress: None,
            copy_completion_time: None,
        }
    }

    /// Issues a new ETag and stamps the modification time.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.etag = new_etag();
        self.last_modified = now;
    }
}

/// Complete blob model stored in metadata store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobModel {
    /// Account name.
    pub account: String,
    /// Container name.
    pub container: String,
    /// Blob name (full path).
    pub name: String,
    /// Snapshot timestamp (empty for base blob).
    pub snapshot: String,
    /// Blob properties.
    pub properties: BlobProperties,
    /// User-defined metadata.
    pub metadata: Metadata,
    /// Content reference; `None` for empty blobs.
    pub extent: Option<ExtentChunk>,
    /// Soft-delete marker.
    pub deleted: bool,
}

impl BlobModel {
    /// Creates a new block blob model.
    pub fn new(account: String, container: String, name: String, content_length: u64) -> Self {
        Self {
            account,
            container,
            name,
            snapshot: String::new(),
            properties: BlobProperties::new(content_length),
            metadata: Metadata::new(),
            extent: None,
            deleted: false,
        }
    }

    pub fn is_snapshot(&self) -> bool {
        !self.snapshot.is_empty()
    }

    /// Creates a snapshot of this blob taken at `now`.
    ///
    /// Snapshots never carry a lease.
    pub fn create_snapshot(&self, now: DateTime<Utc>) -> Self {
        let mut snapshot = self.clone();
        snapshot.snapshot = format_snapshot_time(&now);
        snapshot.properties.lease = LeaseProperties::default();
        snapshot
    }
}

/// Formats a snapshot id: `2024-01-27T12:34:56.1234567Z` (100ns precision).
pub fn format_snapshot_time(now: &DateTime<Utc>) -> String {
    crate::context::format_iso8601(now)
}
