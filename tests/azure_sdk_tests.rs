//! Drives the emulator through the official Azure SDK for Rust.
//!
//! Each test goes through the SDK's own request builders and response
//! parsers, so header names, status codes and listing XML have to match what
//! a real client expects: leases on blobs and containers, snapshots,
//! container metadata and public access, blob metadata, and copies.

mod common;

use std::num::NonZeroU32;
use std::time::Duration;

use azure_core::request_options::{LeaseDuration, LeaseId, Metadata, ProposedLeaseId};
use azure_core::{LeaseState, StatusCode};
use azure_storage::prelude::*;
use azure_storage_blobs::blob::CopyStatus;
use azure_storage_blobs::prelude::*;
use common::TestServer;
use futures_util::StreamExt;

const FIRST_LEASE: &str = "6b1f5a40-1d0e-4f6c-9a55-0d6c3f1e2a01";
const SECOND_LEASE: &str = "6b1f5a40-1d0e-4f6c-9a55-0d6c3f1e2a02";

fn client_builder(server: &TestServer) -> ClientBuilder {
    let credentials = StorageCredentials::access_key(server.account.clone(), server.key.clone());
    ClientBuilder::with_location(
        azure_storage::CloudLocation::Custom {
            account: server.account.clone(),
            uri: format!("{}/{}", server.base_url, server.account),
        },
        credentials,
    )
}

fn lease_id(raw: &str) -> LeaseId {
    raw.parse().unwrap()
}

/// Status and `x-ms-error-code` of a failed SDK call.
fn failure(err: azure_core::Error) -> (StatusCode, String) {
    let http = err.as_http_error().expect("expected an HTTP error");
    (http.status(), http.error_code().unwrap_or_default().to_string())
}

async fn read_text(blob: &BlobClient, snapshot: Option<Snapshot>) -> String {
    let mut request = blob.get();
    if let Some(snapshot) = snapshot {
        request = request.blob_versioning(snapshot);
    }
    let mut stream = request.into_stream();
    let mut data = Vec::new();
    while let Some(chunk) = stream.next().await {
        let bytes = chunk.unwrap().data.collect().await.unwrap();
        data.extend_from_slice(&bytes);
    }
    String::from_utf8(data).unwrap()
}

async fn new_container(server: &TestServer, name: &str) -> ContainerClient {
    let container = client_builder(server).container_client(name);
    container.create().await.unwrap();
    container
}

// Blob leases

#[tokio::test]
async fn test_sdk_blob_lease_lifecycle() {
    let server = TestServer::start().await;
    let container = new_container(&server, "sdk-blob-leases").await;
    let blob = container.blob_client("guarded.txt");
    blob.put_block_blob("v1").await.unwrap();

    let acquired = blob
        .acquire_lease(Duration::from_secs(30))
        .proposed_lease_id(ProposedLeaseId::from(lease_id(FIRST_LEASE)))
        .await
        .unwrap();
    assert_eq!(acquired.lease_id, lease_id(FIRST_LEASE));

    let props = blob.get_properties().await.unwrap();
    assert_eq!(props.blob.properties.lease_state, Some(LeaseState::Leased));

    let err = blob.put_block_blob("v2").await.unwrap_err();
    assert_eq!(
        failure(err),
        (StatusCode::PreconditionFailed, "LeaseIdMissing".to_string())
    );

    let err = blob
        .put_block_blob("v2")
        .lease_id(lease_id(SECOND_LEASE))
        .await
        .unwrap_err();
    assert_eq!(
        failure(err),
        (
            StatusCode::PreconditionFailed,
            "LeaseIdMismatchWithBlobOperation".to_string()
        )
    );

    blob.put_block_blob("v2")
        .lease_id(lease_id(FIRST_LEASE))
        .await
        .unwrap();
    assert_eq!(read_text(&blob, None).await, "v2");

    let lease = blob.blob_lease_client(lease_id(FIRST_LEASE));
    let renewed = lease.renew().await.unwrap();
    assert_eq!(renewed.lease_id, lease_id(FIRST_LEASE));

    let changed = lease
        .change(ProposedLeaseId::from(lease_id(SECOND_LEASE)))
        .await
        .unwrap();
    assert_eq!(changed.lease_id, lease_id(SECOND_LEASE));

    // The old id no longer names the lease.
    let err = lease.release().await.unwrap_err();
    assert_eq!(failure(err).0, StatusCode::Conflict);

    blob.blob_lease_client(lease_id(SECOND_LEASE))
        .release()
        .await
        .unwrap();
    let props = blob.get_properties().await.unwrap();
    assert_eq!(props.blob.properties.lease_state, Some(LeaseState::Available));

    blob.put_block_blob("v3").await.unwrap();
}

#[tokio::test]
async fn test_sdk_break_blob_lease() {
    let server = TestServer::start().await;
    let container = new_container(&server, "sdk-blob-break").await;
    let blob = container.blob_client("held.txt");
    blob.put_block_blob("data").await.unwrap();

    blob.acquire_lease(LeaseDuration::Infinite).await.unwrap();

    let broken = blob
        .break_lease()
        .lease_break_period(Duration::from_secs(0))
        .await
        .unwrap();
    assert_eq!(broken.lease_time, 0);

    let props = blob.get_properties().await.unwrap();
    assert_eq!(props.blob.properties.lease_state, Some(LeaseState::Broken));

    // A broken lease no longer guards writes, and can be taken again.
    blob.put_block_blob("rewritten").await.unwrap();
    let acquired = blob
        .acquire_lease(Duration::from_secs(15))
        .proposed_lease_id(ProposedLeaseId::from(lease_id(FIRST_LEASE)))
        .await
        .unwrap();
    assert_eq!(acquired.lease_id, lease_id(FIRST_LEASE));
}

#[tokio::test]
async fn test_sdk_delete_leased_blob() {
    let server = TestServer::start().await;
    let container = new_container(&server, "sdk-blob-delete-lease").await;
    let blob = container.blob_client("pinned.txt");
    blob.put_block_blob("data").await.unwrap();

    let acquired = blob.acquire_lease(LeaseDuration::Infinite).await.unwrap();

    let err = blob.delete().await.unwrap_err();
    assert_eq!(
        failure(err),
        (StatusCode::PreconditionFailed, "LeaseIdMissing".to_string())
    );

    blob.delete().lease_id(acquired.lease_id).await.unwrap();
    assert!(blob.get_properties().await.is_err());
}

// Container leases

#[tokio::test]
async fn test_sdk_container_lease_guards_delete() {
    let server = TestServer::start().await;
    let container = new_container(&server, "sdk-container-lease").await;

    let acquired = container
        .acquire_lease(LeaseDuration::Infinite)
        .proposed_lease_id(ProposedLeaseId::from(lease_id(FIRST_LEASE)))
        .await
        .unwrap();
    assert_eq!(acquired.lease_id, lease_id(FIRST_LEASE));

    let props = container.get_properties().await.unwrap();
    assert_eq!(props.container.lease_state, LeaseState::Leased);
    assert!(matches!(
        props.container.lease_duration,
        Some(azure_core::LeaseDuration::Infinite)
    ));

    let err = container.delete().await.unwrap_err();
    assert_eq!(
        failure(err),
        (StatusCode::PreconditionFailed, "LeaseIdMissing".to_string())
    );

    let err = container
        .delete()
        .lease_id(lease_id(SECOND_LEASE))
        .await
        .unwrap_err();
    assert_eq!(
        failure(err),
        (
            StatusCode::PreconditionFailed,
            "LeaseIdMismatchWithContainerOperation".to_string()
        )
    );

    let renewed = container
        .container_lease_client(lease_id(FIRST_LEASE))
        .renew()
        .await
        .unwrap();
    assert_eq!(renewed.lease_id, lease_id(FIRST_LEASE));

    container
        .delete()
        .lease_id(lease_id(FIRST_LEASE))
        .await
        .unwrap();
    assert!(container.get_properties().await.is_err());
}

#[tokio::test]
async fn test_sdk_container_lease_break_and_release() {
    let server = TestServer::start().await;
    let container = new_container(&server, "sdk-container-break").await;

    let acquired = container
        .acquire_lease(Duration::from_secs(60))
        .await
        .unwrap();

    let broken = container
        .break_lease()
        .lease_break_period(Duration::from_secs(0))
        .await
        .unwrap();
    assert_eq!(broken.lease_time, 0);

    let props = container.get_properties().await.unwrap();
    assert_eq!(props.container.lease_state, LeaseState::Broken);

    // Release still names the broken lease and frees the container.
    container
        .container_lease_client(acquired.lease_id)
        .release()
        .await
        .unwrap();
    let props = container.get_properties().await.unwrap();
    assert_eq!(props.container.lease_state, LeaseState::Available);

    container.delete().await.unwrap();
}

// Container metadata and public access

#[tokio::test]
async fn test_sdk_container_metadata_and_public_access() {
    let server = TestServer::start().await;
    let container = client_builder(&server).container_client("sdk-container-props");

    let mut metadata = Metadata::new();
    metadata.insert("owner", "reports");
    metadata.insert("tier", "gold");
    container
        .create()
        .metadata(metadata)
        .public_access(PublicAccess::Blob)
        .await
        .unwrap();

    let props = container.get_properties().await.unwrap();
    let found = &props.container.metadata;
    assert_eq!(found.get("x-ms-meta-owner").map(String::as_str), Some("reports"));
    assert_eq!(found.get("x-ms-meta-tier").map(String::as_str), Some("gold"));
    assert!(matches!(props.container.public_access, PublicAccess::Blob));
    assert_eq!(props.container.lease_state, LeaseState::Available);

    container.set_acl(PublicAccess::Container).await.unwrap();
    let props = container.get_properties().await.unwrap();
    assert!(matches!(props.container.public_access, PublicAccess::Container));

    container.set_acl(PublicAccess::None).await.unwrap();
    let props = container.get_properties().await.unwrap();
    assert!(matches!(props.container.public_access, PublicAccess::None));
}

#[tokio::test]
async fn test_sdk_set_acl_on_leased_container() {
    let server = TestServer::start().await;
    let container = new_container(&server, "sdk-acl-lease").await;
    container
        .acquire_lease(LeaseDuration::Infinite)
        .proposed_lease_id(ProposedLeaseId::from(lease_id(FIRST_LEASE)))
        .await
        .unwrap();

    let err = container
        .set_acl(PublicAccess::Blob)
        .lease_id(lease_id(SECOND_LEASE))
        .await
        .unwrap_err();
    assert_eq!(
        failure(err),
        (
            StatusCode::PreconditionFailed,
            "LeaseIdMismatchWithContainerOperation".to_string()
        )
    );

    container
        .set_acl(PublicAccess::Blob)
        .lease_id(lease_id(FIRST_LEASE))
        .await
        .unwrap();
    let props = container.get_properties().await.unwrap();
    assert!(matches!(props.container.public_access, PublicAccess::Blob));
}

// Blob metadata

#[tokio::test]
async fn test_sdk_blob_metadata() {
    let server = TestServer::start().await;
    let container = new_container(&server, "sdk-blob-metadata").await;
    let blob = container.blob_client("tagged.txt");

    let mut metadata = Metadata::new();
    metadata.insert("color", "blue");
    blob.put_block_blob("content").metadata(metadata).await.unwrap();

    let found = blob.get_metadata().await.unwrap().metadata;
    assert_eq!(found.get("color").as_deref(), Some(&b"blue"[..]));

    let mut replacement = Metadata::new();
    replacement.insert("shape", "round");
    blob.set_metadata().metadata(replacement).await.unwrap();

    let found = blob.get_metadata().await.unwrap().metadata;
    assert_eq!(found.get("color"), None);
    assert_eq!(found.get("shape").as_deref(), Some(&b"round"[..]));
    assert_eq!(read_text(&blob, None).await, "content");
}

// Snapshots

#[tokio::test]
async fn test_sdk_snapshot_keeps_old_content() {
    let server = TestServer::start().await;
    let container = new_container(&server, "sdk-snapshots").await;
    let blob = container.blob_client("doc.txt");

    blob.put_block_blob("first draft").await.unwrap();
    let snapshot = blob.snapshot().await.unwrap().snapshot;
    blob.put_block_blob("second draft").await.unwrap();

    assert_eq!(read_text(&blob, None).await, "second draft");
    assert_eq!(read_text(&blob, Some(snapshot.clone())).await, "first draft");

    blob.delete_snapshot(snapshot.clone()).await.unwrap();
    let result = blob.get().blob_versioning(snapshot).into_stream().next().await;
    assert!(matches!(result, Some(Err(_))));
    assert_eq!(read_text(&blob, None).await, "second draft");
}

#[tokio::test]
async fn test_sdk_list_snapshots_across_pages() {
    let server = TestServer::start().await;
    let container = new_container(&server, "sdk-snapshot-pages").await;

    let blob = container.blob_client("a.txt");
    blob.put_block_blob("a").await.unwrap();
    let mut created = Vec::new();
    for _ in 0..3 {
        created.push(blob.snapshot().await.unwrap().snapshot);
    }
    container
        .blob_client("b.txt")
        .put_block_blob("b")
        .await
        .unwrap();

    let mut stream = container
        .list_blobs()
        .include_snapshots(true)
        .max_results(NonZeroU32::new(2).unwrap())
        .into_stream();
    let mut pages = 0;
    let mut names = Vec::new();
    let mut listed_snapshots = Vec::new();
    while let Some(page) = stream.next().await {
        let page = page.unwrap();
        pages += 1;
        assert!(pages <= 3, "listing did not terminate");
        for entry in page.blobs.blobs() {
            names.push(entry.name.clone());
            if let Some(ref snapshot) = entry.snapshot {
                listed_snapshots.push(snapshot.clone());
            }
        }
    }

    assert_eq!(pages, 3);
    assert_eq!(names, ["a.txt", "a.txt", "a.txt", "a.txt", "b.txt"]);
    assert_eq!(listed_snapshots.len(), 3);
    for snapshot in &created {
        assert!(listed_snapshots.contains(snapshot));
    }
}

#[tokio::test]
async fn test_sdk_delete_blob_with_snapshots() {
    let server = TestServer::start().await;
    let container = new_container(&server, "sdk-snapshot-delete").await;
    let blob = container.blob_client("versioned.txt");
    blob.put_block_blob("v1").await.unwrap();
    blob.snapshot().await.unwrap();
    blob.snapshot().await.unwrap();

    // The SDK's plain delete asks for snapshots to go too.
    blob.delete().await.unwrap();

    let mut stream = container.list_blobs().include_snapshots(true).into_stream();
    let mut count = 0;
    while let Some(page) = stream.next().await {
        count += page.unwrap().blobs.blobs().count();
    }
    assert_eq!(count, 0);
}

// Listing

#[tokio::test]
async fn test_sdk_list_with_delimiter_and_lease_state() {
    let server = TestServer::start().await;
    let container = new_container(&server, "sdk-listing").await;

    for path in ["root.txt", "dir1/a.txt", "dir1/b.txt", "dir2/c.txt"] {
        container.blob_client(path).put_block_blob("x").await.unwrap();
    }
    container
        .blob_client("root.txt")
        .acquire_lease(LeaseDuration::Infinite)
        .await
        .unwrap();

    let mut stream = container.list_blobs().delimiter("/").into_stream();
    let mut blobs = Vec::new();
    let mut prefixes = Vec::new();
    while let Some(page) = stream.next().await {
        let page = page.unwrap();
        for entry in page.blobs.blobs() {
            blobs.push((entry.name.clone(), entry.properties.lease_state));
        }
        for prefix in page.blobs.prefixes() {
            prefixes.push(prefix.name.clone());
        }
    }

    assert_eq!(blobs, [("root.txt".to_string(), Some(LeaseState::Leased))]);
    assert_eq!(prefixes, ["dir1/", "dir2/"]);
}

// Copies

#[tokio::test]
async fn test_sdk_copy_within_account() {
    let server = TestServer::start().await;
    let container = new_container(&server, "sdk-copies").await;

    let mut metadata = Metadata::new();
    metadata.insert("origin", "upload");
    let source = container.blob_client("source.txt");
    source
        .put_block_blob("Content to be copied")
        .metadata(metadata)
        .await
        .unwrap();

    let url = url::Url::parse(&server.blob_url("sdk-copies", "source.txt")).unwrap();
    let target = container.blob_client("target.txt");
    let copied = target.copy(url).await.unwrap();
    assert_eq!(copied.copy_status, CopyStatus::Success);

    assert_eq!(read_text(&target, None).await, "Content to be copied");
    let found = target.get_metadata().await.unwrap().metadata;
    assert_eq!(found.get("origin").as_deref(), Some(&b"upload"[..]));
}

#[tokio::test]
async fn test_sdk_copy_onto_leased_target() {
    let server = TestServer::start().await;
    let container = new_container(&server, "sdk-copy-lease").await;
    container
        .blob_client("source.txt")
        .put_block_blob("fresh")
        .await
        .unwrap();
    let target = container.blob_client("target.txt");
    target.put_block_blob("stale").await.unwrap();
    let acquired = target.acquire_lease(LeaseDuration::Infinite).await.unwrap();

    let url = url::Url::parse(&server.blob_url("sdk-copy-lease", "source.txt")).unwrap();
    let err = target.copy(url.clone()).await.unwrap_err();
    assert_eq!(
        failure(err),
        (StatusCode::PreconditionFailed, "LeaseIdMissing".to_string())
    );
    assert_eq!(read_text(&target, None).await, "stale");

    target.copy(url).lease_id(acquired.lease_id).await.unwrap();
    assert_eq!(read_text(&target, None).await, "fresh");
}

#[tokio::test]
async fn test_sdk_sync_copy_across_accounts() {
    let server = TestServer::start().await;
    let second = server.second_account.clone();
    server.create_container_in(&second, "shared").await;
    server
        .put_blob_in(&second, "shared", "report.csv", "a,b,c\n1,2,3\n")
        .await;

    let container = new_container(&server, "sdk-imports").await;
    let target = container.blob_client("report.csv");
    let url = url::Url::parse(&server.blob_url_in(&second, "shared", "report.csv")).unwrap();
    let copied = target.copy_from_url(url).is_synchronous(true).await.unwrap();
    assert_eq!(copied.copy_status, CopyStatus::Success);

    assert_eq!(read_text(&target, None).await, "a,b,c\n1,2,3\n");
}

#[tokio::test]
async fn test_sdk_copy_from_unknown_account() {
    let server = TestServer::start().await;
    let container = new_container(&server, "sdk-bad-imports").await;
    let target = container.blob_client("copy.txt");

    let url = url::Url::parse(&server.blob_url_in("ghostaccount", "shared", "file.txt")).unwrap();
    let err = target.copy(url).await.unwrap_err();
    assert_eq!(
        failure(err),
        (StatusCode::Forbidden, "CannotVerifyCopySource".to_string())
    );
    assert!(target.get_properties().await.is_err());
}
