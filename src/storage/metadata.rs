//! Metadata store for containers, blobs, and service properties.
//!
//! Every mutation runs while holding the DashMap entry for the entity it
//! changes, so concurrent writers on one container or blob are serialized
//! and each issues a fresh etag from the state the previous one left.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::lease::{self, check_lease_access, LeaseAction, LeaseScope};
use crate::listing::{paginate_by_key, paginate_by_offset, Page};
use crate::models::{
    format_snapshot_time, BlobModel, ContainerAcl, ContainerModel, ExtentChunk, LeaseDuration,
    Metadata, PublicAccessLevel, ServiceProperties, SignedIdentifier,
};

/// ETag and modification time after a write.
#[derive(Debug, Clone)]
pub struct ResourceVersion {
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

/// Outcome of a container or blob lease operation.
#[derive(Debug, Clone)]
pub struct LeaseResponse {
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub lease_id: Option<String>,
    pub lease_time: Option<u32>,
}

/// `x-ms-delete-snapshots` handling for blob deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteSnapshots {
    /// Fail with `SnapshotsPresent` if the blob has snapshots.
    #[default]
    None,
    /// Delete the blob and its snapshots.
    Include,
    /// Delete only the snapshots.
    Only,
}

/// Parameters of a blob listing scan.
#[derive(Debug, Clone)]
pub struct ListBlobsOptions {
    pub prefix: Option<String>,
    pub marker: Option<String>,
    pub max_results: usize,
    pub include_snapshots: bool,
    pub include_deleted: bool,
}

impl Default for ListBlobsOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            marker: None,
            max_results: crate::listing::DEFAULT_BLOB_PAGE_SIZE,
            include_snapshots: false,
            include_deleted: false,
        }
    }
}

/// Trait for metadata storage operations.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    // Container operations
    async fn create_container(&self, container: ContainerModel) -> StorageResult<ResourceVersion>;
    async fn get_container_properties(
        &self,
        account: &str,
        name: &str,
    ) -> StorageResult<ContainerModel>;
    /// Removes the container and its blobs, returning the extents they held.
    async fn delete_container(
        &self,
        account: &str,
        name: &str,
        lease_id: Option<&str>,
    ) -> StorageResult<Vec<ExtentChunk>>;
    async fn set_container_metadata(
        &self,
        account: &str,
        name: &str,
        metadata: Metadata,
        lease_id: Option<&str>,
    ) -> StorageResult<ResourceVersion>;
    async fn get_container_acl(
        &self,
        account: &str,
        name: &str,
        lease_id: Option<&str>,
    ) -> StorageResult<ContainerAcl>;
    async fn set_container_acl(
        &self,
        account: &str,
        name: &str,
        public_access: PublicAccessLevel,
        signed_identifiers: Vec<SignedIdentifier>,
        lease_id: Option<&str>,
    ) -> StorageResult<ResourceVersion>;
    async fn lease_container(
        &self,
        account: &str,
        name: &str,
        action: LeaseAction,
    ) -> StorageResult<LeaseResponse>;
    async fn container_exists(&self, account: &str, name: &str) -> bool;
    async fn list_containers(
        &self,
        account: &str,
        prefix: Option<&str>,
        max_results: usize,
        offset: usize,
    ) -> StorageResult<Page<ContainerModel>>;

    async fn acquire_container_lease(
        &self,
        account: &str,
        name: &str,
        duration: LeaseDuration,
        proposed_id: Option<String>,
    ) -> StorageResult<LeaseResponse> {
        let action = LeaseAction::Acquire {
            duration,
            proposed_id,
        };
        self.lease_container(account, name, action).await
    }

    async fn renew_container_lease(
        &self,
        account: &str,
        name: &str,
        lease_id: &str,
    ) -> StorageResult<LeaseResponse> {
        let action = LeaseAction::Renew {
            lease_id: lease_id.to_string(),
        };
        self.lease_container(account, name, action).await
    }

    async fn release_container_lease(
        &self,
        account: &str,
        name: &str,
        lease_id: &str,
    ) -> StorageResult<LeaseResponse> {
        let action = LeaseAction::Release {
            lease_id: lease_id.to_string(),
        };
        self.lease_container(account, name, action).await
    }

    async fn break_container_lease(
        &self,
        account: &str,
        name: &str,
        break_period: Option<u32>,
    ) -> StorageResult<LeaseResponse> {
        let action = LeaseAction::Break { break_period };
        self.lease_container(account, name, action).await
    }

    async fn change_container_lease(
        &self,
        account: &str,
        name: &str,
        lease_id: &str,
        proposed_id: &str,
    ) -> StorageResult<LeaseResponse> {
        let action = LeaseAction::Change {
            lease_id: lease_id.to_string(),
            proposed_id: proposed_id.to_string(),
        };
        self.lease_container(account, name, action).await
    }

    // Blob operations
    /// Creates or overwrites a base blob, returning the extent it replaced.
    async fn create_blob(
        &self,
        blob: BlobModel,
        lease_id: Option<&str>,
    ) -> StorageResult<(ResourceVersion, Option<ExtentChunk>)>;
    async fn get_blob(
        &self,
        account: &str,
        container: &str,
        name: &str,
        snapshot: &str,
    ) -> StorageResult<BlobModel>;
    /// Deletes a blob or snapshot, returning the extents released.
    async fn delete_blob(
        &self,
        account: &str,
        container: &str,
        name: &str,
        snapshot: &str,
        delete_snapshots: DeleteSnapshots,
        lease_id: Option<&str>,
    ) -> StorageResult<Vec<ExtentChunk>>;
    async fn set_blob_metadata(
        &self,
        account: &str,
        container: &str,
        name: &str,
        metadata: Metadata,
        lease_id: Option<&str>,
    ) -> StorageResult<ResourceVersion>;
    /// Snapshots a base blob, returning the snapshot id.
    async fn create_snapshot(
        &self,
        account: &str,
        container: &str,
        name: &str,
        metadata: Option<Metadata>,
        lease_id: Option<&str>,
    ) -> StorageResult<(String, ResourceVersion)>;
    async fn lease_blob(
        &self,
        account: &str,
        container: &str,
        name: &str,
        action: LeaseAction,
    ) -> StorageResult<LeaseResponse>;
    /// Returns one flat page, sorted by name then snapshot.
    async fn list_blobs(
        &self,
        account: &str,
        container: &str,
        options: &ListBlobsOptions,
    ) -> StorageResult<Page<BlobModel>>;

    // Service properties
    /// Returns the stored record as is; unset fields are never defaulted here.
    async fn get_service_properties(&self, account: &str) -> StorageResult<ServiceProperties>;
    /// Merges the fields present in `update` into the stored record.
    async fn set_service_properties(
        &self,
        account: &str,
        update: ServiceProperties,
    ) -> StorageResult<()>;
}

/// Key type for containers - uses Arc<str> to avoid allocations.
type ContainerKey = (Arc<str>, Arc<str>);

/// Key type for blobs: (account, container, name, snapshot).
type BlobKey = (Arc<str>, Arc<str>, Arc<str>, Arc<str>);

/// In-memory implementation of the metadata store.
pub struct MemoryMetadataStore {
    /// Containers indexed by (account, name).
    containers: DashMap<ContainerKey, ContainerModel>,

    /// Blobs and snapshots indexed by (account, container, name, snapshot).
    blobs: DashMap<BlobKey, BlobModel>,

    /// Secondary index: account+container -> sorted (name, snapshot) pairs.
    blob_index: DashMap<ContainerKey, BTreeSet<(Arc<str>, Arc<str>)>>,

    /// Service properties indexed by account.
    service_properties: DashMap<Arc<str>, ServiceProperties>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self {
            containers: DashMap::new(),
            blobs: DashMap::new(),
            blob_index: DashMap::new(),
            service_properties: DashMap::new(),
        }
    }

    #[inline]
    fn arc_str(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    #[inline]
    fn container_key(account: &str, name: &str) -> ContainerKey {
        (Self::arc_str(account), Self::arc_str(name))
    }

    #[inline]
    fn blob_key(account: &str, container: &str, name: &str, snapshot: &str) -> BlobKey {
        (
            Self::arc_str(account),
            Self::arc_str(container),
            Self::arc_str(name),
            Self::arc_str(snapshot),
        )
    }

    fn ensure_container(&self, account: &str, container: &str) -> StorageResult<()> {
        if self
            .containers
            .contains_key(&Self::container_key(account, container))
        {
            Ok(())
        } else {
            Err(StorageError::new(ErrorCode::ContainerNotFound))
        }
    }

    /// Snapshot ids of a base blob, in order.
    fn snapshot_ids(&self, account: &str, container: &str, name: &str) -> Vec<Arc<str>> {
        self.blob_index
            .get(&Self::container_key(account, container))
            .map(|index| {
                index
                    .iter()
                    .filter(|(n, s)| n.as_ref() == name && !s.is_empty())
                    .map(|(_, s)| s.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn index_insert(&self, account: &str, container: &str, name: &str, snapshot: &str) {
        self.blob_index
            .entry(Self::container_key(account, container))
            .or_default()
            .insert((Self::arc_str(name), Self::arc_str(snapshot)));
    }

    fn index_remove(&self, account: &str, container: &str, name: &str, snapshot: &str) {
        if let Some(mut index) = self
            .blob_index
            .get_mut(&Self::container_key(account, container))
        {
            index.remove(&(Self::arc_str(name), Self::arc_str(snapshot)));
        }
    }

    /// Removes one blob entry and returns its extent.
    fn remove_blob_entry(
        &self,
        account: &str,
        container: &str,
        name: &str,
        snapshot: &str,
    ) -> Option<Option<ExtentChunk>> {
        let removed = self
            .blobs
            .remove(&Self::blob_key(account, container, name, snapshot))
            .map(|(_, blob)| blob.extent);
        self.index_remove(account, container, name, snapshot);
        removed
    }
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn create_container(&self, container: ContainerModel) -> StorageResult<ResourceVersion> {
        let key = Self::container_key(&container.account, &container.name);
        match self.containers.entry(key) {
            Entry::Occupied(_) => Err(StorageError::new(ErrorCode::ContainerAlreadyExists)),
            Entry::Vacant(entry) => {
                let version = ResourceVersion {
                    etag: container.properties.etag.clone(),
                    last_modified: container.properties.last_modified,
                };
                entry.insert(container);
                Ok(version)
            }
        }
    }

    async fn get_container_properties(
        &self,
        account: &str,
        name: &str,
    ) -> StorageResult<ContainerModel> {
        let key = Self::container_key(account, name);
        let mut container = self
            .containers
            .get(&key)
            .map(|c| c.value().clone())
            .ok_or_else(|| StorageError::new(ErrorCode::ContainerNotFound))?;
        container.properties.lease = lease::reconcile(&container.properties.lease, Utc::now());
        Ok(container)
    }

    async fn delete_container(
        &self,
        account: &str,
        name: &str,
        lease_id: Option<&str>,
    ) -> StorageResult<Vec<ExtentChunk>> {
        let key = Self::container_key(account, name);
        match self.containers.entry(key.clone()) {
            Entry::Vacant(_) => return Err(StorageError::new(ErrorCode::ContainerNotFound)),
            Entry::Occupied(entry) => {
                check_lease_access(
                    &entry.get().properties.lease,
                    lease_id,
                    LeaseScope::Container,
                    true,
                    Utc::now(),
                )?;
                entry.remove();
            }
        }

        let entries = self
            .blob_index
            .remove(&key)
            .map(|(_, index)| index)
            .unwrap_or_default();

        let mut extents = Vec::new();
        for (blob, snapshot) in &entries {
            let blob_key = (key.0.clone(), key.1.clone(), blob.clone(), snapshot.clone());
            if let Some((_, removed)) = self.blobs.remove(&blob_key) {
                extents.extend(removed.extent);
            }
        }

        debug!(
            account,
            container = name,
            blobs = entries.len(),
            "deleted container and its blobs"
        );
        Ok(extents)
    }

    async fn set_container_metadata(
        &self,
        account: &str,
        name: &str,
        metadata: Metadata,
        lease_id: Option<&str>,
    ) -> StorageResult<ResourceVersion> {
        let key = Self::container_key(account, name);
        let mut container = self
            .containers
            .get_mut(&key)
            .ok_or_else(|| StorageError::new(ErrorCode::ContainerNotFound))?;

        let now = Utc::now();
        check_lease_access(
            &container.properties.lease,
            lease_id,
            LeaseScope::Container,
            false,
            now,
        )?;
        container.metadata = metadata;
        container.properties.touch(now);

        Ok(ResourceVersion {
            etag: container.properties.etag.clone(),
            last_modified: container.properties.last_modified,
        })
    }

    async fn get_container_acl(
        &self,
        account: &str,
        name: &str,
        lease_id: Option<&str>,
    ) -> StorageResult<ContainerAcl> {
        let container = self.get_container_properties(account, name).await?;
        check_lease_access(
            &container.properties.lease,
            lease_id,
            LeaseScope::Container,
            false,
            Utc::now(),
        )?;
        Ok(ContainerAcl {
            public_access: container.properties.public_access,
            signed_identifiers: container.signed_identifiers,
            etag: container.properties.etag,
            last_modified: container.properties.last_modified,
        })
    }

    async fn set_container_acl(
        &self,
        account: &str,
        name: &str,
        public_access: PublicAccessLevel,
        signed_identifiers: Vec<SignedIdentifier>,
        lease_id: Option<&str>,
    ) -> StorageResult<ResourceVersion> {
        let key = Self::container_key(account, name);
        let mut container = self
            .containers
            .get_mut(&key)
            .ok_or_else(|| StorageError::new(ErrorCode::ContainerNotFound))?;

        let now = Utc::now();
        check_lease_access(
            &container.properties.lease,
            lease_id,
            LeaseScope::Container,
            false,
            now,
        )?;
        container.properties.public_access = public_access;
        container.signed_identifiers = signed_identifiers;
        container.properties.touch(now);

        Ok(ResourceVersion {
            etag: container.properties.etag.clone(),
            last_modified: container.properties.last_modified,
        })
    }

    async fn lease_container(
        &self,
        account: &str,
        name: &str,
        action: LeaseAction,
    ) -> StorageResult<LeaseResponse> {
        let key = Self::container_key(account, name);
        let mut container = self
            .containers
            .get_mut(&key)
            .ok_or_else(|| StorageError::new(ErrorCode::ContainerNotFound))?;

        let now = Utc::now();
        let transition = lease::apply(&container.properties.lease, &action, now)?;
        container.properties.lease = transition.lease;
        container.properties.touch(now);

        Ok(LeaseResponse {
            etag: container.properties.etag.clone(),
            last_modified: container.properties.last_modified,
            lease_id: transition.lease_id,
            lease_time: transition.lease_time,
        })
    }

    async fn container_exists(&self, account: &str, name: &str) -> bool {
        self.containers
            .contains_key(&Self::container_key(account, name))
    }

    async fn list_containers(
        &self,
        account: &str,
        prefix: Option<&str>,
        max_results: usize,
        offset: usize,
    ) -> StorageResult<Page<ContainerModel>> {
        let prefix = prefix.unwrap_or("");
        let mut matching: Vec<ContainerModel> = self
            .containers
            .iter()
            .filter(|entry| {
                let (acct, name) = entry.key();
                acct.as_ref() == account && name.starts_with(prefix)
            })
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name));

        let now = Utc::now();
        let mut page = paginate_by_offset(matching, offset, max_results);
        for container in &mut page.items {
            container.properties.lease = lease::reconcile(&container.properties.lease, now);
        }
        Ok(page)
    }

    async fn create_blob(
        &self,
        mut blob: BlobModel,
        lease_id: Option<&str>,
    ) -> StorageResult<(ResourceVersion, Option<ExtentChunk>)> {
        // Holding the container entry keeps a concurrent container delete
        // from orphaning this blob.
        let container_key = Self::container_key(&blob.account, &blob.container);
        let _container = self
            .containers
            .get(&container_key)
            .ok_or_else(|| StorageError::new(ErrorCode::ContainerNotFound))?;

        let key = Self::blob_key(&blob.account, &blob.container, &blob.name, "");
        let now = Utc::now();
        let replaced = match self.blobs.entry(key) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get();
                let current_lease = lease::reconcile(&existing.properties.lease, now);
                check_lease_access(&current_lease, lease_id, LeaseScope::Blob, true, now)?;
                blob.properties.lease = current_lease;
                blob.properties.created_on = existing.properties.created_on;
                let replaced = existing.extent.clone();
                entry.insert(blob.clone());
                replaced
            }
            Entry::Vacant(entry) => {
                check_lease_access(
                    &Default::default(),
                    lease_id,
                    LeaseScope::Blob,
                    true,
                    now,
                )?;
                entry.insert(blob.clone());
                None
            }
        };
        self.index_insert(&blob.account, &blob.container, &blob.name, "");

        Ok((
            ResourceVersion {
                etag: blob.properties.etag,
                last_modified: blob.properties.last_modified,
            },
            replaced,
        ))
    }

    async fn get_blob(
        &self,
        account: &str,
        container: &str,
        name: &str,
        snapshot: &str,
    ) -> StorageResult<BlobModel> {
        self.ensure_container(account, container)?;

        let key = Self::blob_key(account, container, name, snapshot);
        let mut blob = self
            .blobs
            .get(&key)
            .filter(|b| !b.deleted)
            .map(|b| b.value().clone())
            .ok_or_else(|| StorageError::new(ErrorCode::BlobNotFound))?;
        blob.properties.lease = lease::reconcile(&blob.properties.lease, Utc::now());
        Ok(blob)
    }

    async fn delete_blob(
        &self,
        account: &str,
        container: &str,
        name: &str,
        snapshot: &str,
        delete_snapshots: DeleteSnapshots,
        lease_id: Option<&str>,
    ) -> StorageResult<Vec<ExtentChunk>> {
        self.ensure_container(account, container)?;

        if !snapshot.is_empty() {
            return self
                .remove_blob_entry(account, container, name, snapshot)
                .map(|extent| extent.into_iter().collect())
                .ok_or_else(|| StorageError::new(ErrorCode::BlobNotFound));
        }

        {
            let key = Self::blob_key(account, container, name, "");
            let base = self
                .blobs
                .get(&key)
                .filter(|b| !b.deleted)
                .ok_or_else(|| StorageError::new(ErrorCode::BlobNotFound))?;
            check_lease_access(
                &base.properties.lease,
                lease_id,
                LeaseScope::Blob,
                true,
                Utc::now(),
            )?;
        }

        let snapshots = self.snapshot_ids(account, container, name);
        if !snapshots.is_empty() && delete_snapshots == DeleteSnapshots::None {
            return Err(StorageError::new(ErrorCode::SnapshotsPresent));
        }

        let mut extents = Vec::new();
        for snapshot in &snapshots {
            if let Some(extent) = self.remove_blob_entry(account, container, name, snapshot) {
                extents.extend(extent);
            }
        }
        if delete_snapshots != DeleteSnapshots::Only {
            if let Some(extent) = self.remove_blob_entry(account, container, name, "") {
                extents.extend(extent);
            }
        }

        debug!(
            account,
            container,
            blob = name,
            snapshots = snapshots.len(),
            "deleted blob"
        );
        Ok(extents)
    }

    async fn set_blob_metadata(
        &self,
        account: &str,
        container: &str,
        name: &str,
        metadata: Metadata,
        lease_id: Option<&str>,
    ) -> StorageResult<ResourceVersion> {
        self.ensure_container(account, container)?;

        let key = Self::blob_key(account, container, name, "");
        let mut blob = self
            .blobs
            .get_mut(&key)
            .filter(|b| !b.deleted)
            .ok_or_else(|| StorageError::new(ErrorCode::BlobNotFound))?;

        let now = Utc::now();
        check_lease_access(&blob.properties.lease, lease_id, LeaseScope::Blob, true, now)?;
        blob.metadata = metadata;
        blob.properties.touch(now);

        Ok(ResourceVersion {
            etag: blob.properties.etag.clone(),
            last_modified: blob.properties.last_modified,
        })
    }

    async fn create_snapshot(
        &self,
        account: &str,
        container: &str,
        name: &str,
        metadata: Option<Metadata>,
        lease_id: Option<&str>,
    ) -> StorageResult<(String, ResourceVersion)> {
        self.ensure_container(account, container)?;

        // Snapshot ids have 100ns resolution; step past ids already taken.
        let mut now = Utc::now();
        while self.blobs.contains_key(&Self::blob_key(
            account,
            container,
            name,
            &format_snapshot_time(&now),
        )) {
            now += chrono::Duration::nanoseconds(100);
        }
        let mut snapshot = {
            let key = Self::blob_key(account, container, name, "");
            let base = self
                .blobs
                .get(&key)
                .filter(|b| !b.deleted)
                .ok_or_else(|| StorageError::new(ErrorCode::BlobNotFound))?;
            check_lease_access(&base.properties.lease, lease_id, LeaseScope::Blob, false, now)?;
            base.create_snapshot(now)
        };
        if let Some(metadata) = metadata.filter(|m| !m.is_empty()) {
            snapshot.metadata = metadata;
        }

        let snapshot_id = snapshot.snapshot.clone();
        let version = ResourceVersion {
            etag: snapshot.properties.etag.clone(),
            last_modified: snapshot.properties.last_modified,
        };
        self.blobs.insert(
            Self::blob_key(account, container, name, &snapshot_id),
            snapshot,
        );
        self.index_insert(account, container, name, &snapshot_id);

        Ok((snapshot_id, version))
    }

    async fn lease_blob(
        &self,
        account: &str,
        container: &str,
        name: &str,
        action: LeaseAction,
    ) -> StorageResult<LeaseResponse> {
        self.ensure_container(account, container)?;

        let key = Self::blob_key(account, container, name, "");
        let mut blob = self
            .blobs
            .get_mut(&key)
            .filter(|b| !b.deleted)
            .ok_or_else(|| StorageError::new(ErrorCode::BlobNotFound))?;

        let now = Utc::now();
        let transition = lease::apply(&blob.properties.lease, &action, now)?;
        blob.properties.lease = transition.lease;
        blob.properties.touch(now);

        Ok(LeaseResponse {
            etag: blob.properties.etag.clone(),
            last_modified: blob.properties.last_modified,
            lease_id: transition.lease_id,
            lease_time: transition.lease_time,
        })
    }

    async fn list_blobs(
        &self,
        account: &str,
        container: &str,
        options: &ListBlobsOptions,
    ) -> StorageResult<Page<BlobModel>> {
        self.ensure_container(account, container)?;

        let prefix = options.prefix.as_deref().unwrap_or("");
        let keys: Vec<(Arc<str>, Arc<str>)> = self
            .blob_index
            .get(&Self::container_key(account, container))
            .map(|index| {
                index
                    .iter()
                    .filter(|(name, snapshot)| {
                        name.starts_with(prefix)
                            && (options.include_snapshots || snapshot.is_empty())
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let account_arc = Self::arc_str(account);
        let container_arc = Self::arc_str(container);
        let now = Utc::now();
        let blobs: Vec<BlobModel> = keys
            .into_iter()
            .filter_map(|(name, snapshot)| {
                let key = (account_arc.clone(), container_arc.clone(), name, snapshot);
                self.blobs.get(&key).map(|b| b.value().clone())
            })
            .filter(|blob| options.include_deleted || !blob.deleted)
            .map(|mut blob| {
                blob.properties.lease = lease::reconcile(&blob.properties.lease, now);
                blob
            })
            .collect();

        Ok(paginate_by_key(
            blobs,
            |b| (b.name.as_str(), b.snapshot.as_str()),
            options.marker.as_deref(),
            options.max_results,
        ))
    }

    async fn get_service_properties(&self, account: &str) -> StorageResult<ServiceProperties> {
        Ok(self
            .service_properties
            .get(account)
            .map(|p| p.value().clone())
            .unwrap_or_default())
    }

    async fn set_service_properties(
        &self,
        account: &str,
        update: ServiceProperties,
    ) -> StorageResult<()> {
        self.service_properties
            .entry(Self::arc_str(account))
            .or_default()
            .merge(update);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LeaseState;
    use std::collections::HashSet;

    const ACCOUNT: &str = "devstoreaccount1";
    const LEASE_A: &str = "11111111-1111-1111-1111-111111111111";

    async fn store_with_container(name: &str) -> MemoryMetadataStore {
        let store = MemoryMetadataStore::new();
        store
            .create_container(ContainerModel::new(ACCOUNT.to_string(), name.to_string()))
            .await
            .unwrap();
        store
    }

    async fn put_blob(store: &MemoryMetadataStore, container: &str, name: &str) {
        let blob = BlobModel::new(
            ACCOUNT.to_string(),
            container.to_string(),
            name.to_string(),
            0,
        );
        store.create_blob(blob, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_container_twice_fails() {
        let store = store_with_container("c1").await;
        let err = store
            .create_container(ContainerModel::new(ACCOUNT.to_string(), "c1".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ContainerAlreadyExists);
    }

    #[tokio::test]
    async fn test_concurrent_metadata_writes_issue_distinct_etags() {
        let store = Arc::new(store_with_container("c1").await);
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let metadata: Metadata = [("n", i.to_string())].into_iter().collect();
                store
                    .set_container_metadata(ACCOUNT, "c1", metadata, None)
                    .await
                    .unwrap()
                    .etag
            }));
        }

        let mut etags = HashSet::new();
        for handle in handles {
            assert!(etags.insert(handle.await.unwrap()));
        }
        assert_eq!(etags.len(), 32);
    }

    #[tokio::test]
    async fn test_leased_container_delete_requires_lease_id() {
        let store = store_with_container("c1").await;
        let lease = store
            .acquire_container_lease(ACCOUNT, "c1", LeaseDuration::Infinite, Some(LEASE_A.into()))
            .await
            .unwrap();
        assert_eq!(lease.lease_id.as_deref(), Some(LEASE_A));

        let err = store.delete_container(ACCOUNT, "c1", None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::LeaseIdMissing);

        store
            .delete_container(ACCOUNT, "c1", Some(LEASE_A))
            .await
            .unwrap();
        assert!(!store.container_exists(ACCOUNT, "c1").await);
    }

    #[tokio::test]
    async fn test_lease_operations_change_etag() {
        let store = store_with_container("c1").await;
        let before = store.get_container_properties(ACCOUNT, "c1").await.unwrap();
        let acquired = store
            .acquire_container_lease(ACCOUNT, "c1", LeaseDuration::Fixed(15), None)
            .await
            .unwrap();
        assert_ne!(acquired.etag, before.properties.etag);

        let released = store
            .release_container_lease(ACCOUNT, "c1", acquired.lease_id.as_deref().unwrap())
            .await
            .unwrap();
        assert_ne!(released.etag, acquired.etag);

        let after = store.get_container_properties(ACCOUNT, "c1").await.unwrap();
        assert_eq!(after.properties.lease.state, LeaseState::Available);
    }

    #[tokio::test]
    async fn test_delete_container_cascades_blobs() {
        let store = store_with_container("c1").await;
        put_blob(&store, "c1", "a").await;
        put_blob(&store, "c1", "b").await;
        store.delete_container(ACCOUNT, "c1", None).await.unwrap();

        store
            .create_container(ContainerModel::new(ACCOUNT.to_string(), "c1".to_string()))
            .await
            .unwrap();
        let page = store
            .list_blobs(ACCOUNT, "c1", &ListBlobsOptions::default())
            .await
            .unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_list_blobs_flat_pages() {
        let store = store_with_container("c1").await;
        for name in ["e", "c", "a", "d", "b"] {
            put_blob(&store, "c1", name).await;
        }

        let mut options = ListBlobsOptions {
            max_results: 2,
            ..ListBlobsOptions::default()
        };
        let mut seen = Vec::new();
        loop {
            let page = store.list_blobs(ACCOUNT, "c1", &options).await.unwrap();
            seen.extend(page.items.into_iter().map(|b| b.name));
            match page.next_marker {
                Some(marker) => options.marker = Some(marker),
                None => break,
            }
        }
        assert_eq!(seen, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_snapshots_listing_and_delete() {
        let store = store_with_container("c1").await;
        put_blob(&store, "c1", "doc").await;
        let (snapshot, _) = store
            .create_snapshot(ACCOUNT, "c1", "doc", None, None)
            .await
            .unwrap();

        let page = store
            .list_blobs(
                ACCOUNT,
                "c1",
                &ListBlobsOptions {
                    include_snapshots: true,
                    ..ListBlobsOptions::default()
                },
            )
            .await
            .unwrap();
        let ids: Vec<_> = page.items.iter().map(|b| b.snapshot.clone()).collect();
        assert_eq!(ids, vec![String::new(), snapshot.clone()]);

        let err = store
            .delete_blob(ACCOUNT, "c1", "doc", "", DeleteSnapshots::None, None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SnapshotsPresent);

        store
            .delete_blob(ACCOUNT, "c1", "doc", "", DeleteSnapshots::Only, None)
            .await
            .unwrap();
        assert!(store.get_blob(ACCOUNT, "c1", "doc", "").await.is_ok());
        assert!(store.get_blob(ACCOUNT, "c1", "doc", &snapshot).await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_pages_cover_every_entry_once() {
        let store = store_with_container("c1").await;
        put_blob(&store, "c1", "a").await;
        for _ in 0..3 {
            store
                .create_snapshot(ACCOUNT, "c1", "a", None, None)
                .await
                .unwrap();
        }
        put_blob(&store, "c1", "b").await;

        let mut options = ListBlobsOptions {
            max_results: 2,
            include_snapshots: true,
            ..ListBlobsOptions::default()
        };
        let mut seen = Vec::new();
        for _ in 0..10 {
            let page = store.list_blobs(ACCOUNT, "c1", &options).await.unwrap();
            seen.extend(page.items.into_iter().map(|b| (b.name, b.snapshot)));
            match page.next_marker {
                Some(marker) => options.marker = Some(marker),
                None => break,
            }
        }

        assert_eq!(seen.len(), 5);
        assert!(options.marker.is_some());
        let unique: std::collections::HashSet<_> = seen.iter().cloned().collect();
        assert_eq!(unique.len(), 5);
        assert_eq!(seen.iter().filter(|(name, _)| name == "a").count(), 4);
        assert_eq!(seen.last().map(|(name, _)| name.as_str()), Some("b"));
    }

    #[tokio::test]
    async fn test_deleted_blobs_listed_only_on_request() {
        let store = store_with_container("c1").await;
        put_blob(&store, "c1", "live").await;
        let mut gone = BlobModel::new(ACCOUNT.into(), "c1".into(), "gone".into(), 0);
        gone.deleted = true;
        store.create_blob(gone, None).await.unwrap();

        let page = store
            .list_blobs(ACCOUNT, "c1", &ListBlobsOptions::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);

        let page = store
            .list_blobs(
                ACCOUNT,
                "c1",
                &ListBlobsOptions {
                    include_deleted: true,
                    ..ListBlobsOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
    }

    #[tokio::test]
    async fn test_service_properties_merge() {
        let store = MemoryMetadataStore::new();
        assert_eq!(
            store.get_service_properties(ACCOUNT).await.unwrap(),
            ServiceProperties::default()
        );

        store
            .set_service_properties(
                ACCOUNT,
                ServiceProperties {
                    default_service_version: Some("2020-02-10".into()),
                    ..ServiceProperties::default()
                },
            )
            .await
            .unwrap();
        store
            .set_service_properties(
                ACCOUNT,
                ServiceProperties {
                    cors: Some(vec![]),
                    ..ServiceProperties::default()
                },
            )
            .await
            .unwrap();

        let stored = store.get_service_properties(ACCOUNT).await.unwrap();
        assert_eq!(stored.default_service_version.as_deref(), Some("2020-02-10"));
        assert_eq!(stored.cors, Some(vec![]));
    }
}
