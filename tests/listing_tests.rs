//! Blob listing tests: prefixes, delimiters, pagination and snapshots.

mod common;

use std::collections::HashSet;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use common::{error_code, extract_all, header, TestServer, API_VERSION};

async fn seed(server: &TestServer, container: &str, names: &[&str]) {
    server.create_container(container).await;
    for name in names {
        server.put_blob(container, name, name).await;
    }
}

async fn list_body(server: &TestServer, container: &str, query: &str) -> String {
    let response = server.list_blobs(container, query).await;
    assert_eq!(response.status(), 200, "list {}", query);
    assert_eq!(header(&response, "content-type"), "application/xml");
    response.text().await.unwrap()
}

#[tokio::test]
async fn test_flat_listing_is_sorted() {
    let server = TestServer::start().await;
    seed(&server, "flat", &["b.txt", "a/x.txt", "c.txt", "a.txt"]).await;

    let body = list_body(&server, "flat", "").await;
    assert_eq!(
        extract_all(&body, "Name"),
        vec!["a.txt", "a/x.txt", "b.txt", "c.txt"]
    );
    assert!(!body.contains("<Delimiter>"));
    assert!(!body.contains("<BlobPrefix>"));
    assert_eq!(extract_all(&body, "Content-Length"), vec!["5", "7", "5", "5"]);
}

#[tokio::test]
async fn test_prefix_filter() {
    let server = TestServer::start().await;
    seed(&server, "prefixed", &["logs/1", "logs/2", "data/1", "logsheet"]).await;

    let body = list_body(&server, "prefixed", "prefix=logs/").await;
    assert_eq!(extract_all(&body, "Name"), vec!["logs/1", "logs/2"]);
    assert_eq!(extract_all(&body, "Prefix"), vec!["logs/"]);
}

#[tokio::test]
async fn test_delimiter_groups_virtual_directories() {
    let server = TestServer::start().await;
    seed(
        &server,
        "hierarchy",
        &["root.txt", "dir1/a.txt", "dir1/sub/b.txt", "dir2/c.txt"],
    )
    .await;

    let body = list_body(&server, "hierarchy", "delimiter=/").await;
    assert_eq!(extract_all(&body, "Delimiter"), vec!["/"]);
    assert_eq!(
        extract_all(&body, "Name"),
        vec!["root.txt", "dir1/", "dir2/"]
    );
    assert_eq!(body.matches("<BlobPrefix>").count(), 2);

    let body = list_body(&server, "hierarchy", "delimiter=/&prefix=dir1/").await;
    assert_eq!(extract_all(&body, "Name"), vec!["dir1/a.txt", "dir1/sub/"]);
}

#[tokio::test]
async fn test_empty_delimiter_means_slash() {
    let server = TestServer::start().await;
    seed(&server, "emptydelim", &["top.txt", "nested/inner.txt"]).await;

    let body = list_body(&server, "emptydelim", "delimiter=").await;
    assert_eq!(extract_all(&body, "Delimiter"), vec!["/"]);
    assert_eq!(extract_all(&body, "Name"), vec!["top.txt", "nested/"]);
}

#[tokio::test]
async fn test_pagination_with_inclusive_marker() {
    let server = TestServer::start().await;
    seed(&server, "paged", &["b0", "b1", "b2", "b3", "b4"]).await;

    let body = list_body(&server, "paged", "maxresults=2").await;
    assert_eq!(extract_all(&body, "Name"), vec!["b0", "b1"]);
    assert_eq!(extract_all(&body, "MaxResults"), vec!["2"]);
    assert_eq!(extract_all(&body, "NextMarker"), vec!["b2"]);

    let body = list_body(&server, "paged", "maxresults=2&marker=b2").await;
    assert_eq!(extract_all(&body, "Marker"), vec!["b2"]);
    assert_eq!(extract_all(&body, "Name"), vec!["b2", "b3"]);
    assert_eq!(extract_all(&body, "NextMarker"), vec!["b4"]);

    let body = list_body(&server, "paged", "maxresults=2&marker=b4").await;
    assert_eq!(extract_all(&body, "Name"), vec!["b4"]);
    assert!(body.contains("<NextMarker></NextMarker>"));
}

#[tokio::test]
async fn test_delimiter_applies_to_each_page() {
    let server = TestServer::start().await;
    seed(&server, "pagedirs", &["dir/a", "dir/b", "dir/c", "zed"]).await;

    let body = list_body(&server, "pagedirs", "delimiter=/&maxresults=2").await;
    assert_eq!(extract_all(&body, "Name"), vec!["dir/"]);
    assert_eq!(extract_all(&body, "NextMarker"), vec!["dir/c"]);
}

#[tokio::test]
async fn test_large_maxresults_is_clamped() {
    let server = TestServer::start().await;
    seed(&server, "clamped", &["only"]).await;

    let body = list_body(&server, "clamped", "maxresults=100000").await;
    assert_eq!(extract_all(&body, "MaxResults"), vec!["5000"]);
    assert_eq!(extract_all(&body, "Name"), vec!["only"]);
}

#[tokio::test]
async fn test_invalid_maxresults() {
    let server = TestServer::start().await;
    server.create_container("badmax").await;

    for value in ["0", "-1", "many"] {
        let response = server
            .list_blobs("badmax", &format!("maxresults={}", value))
            .await;
        assert_eq!(response.status(), 400, "maxresults={}", value);
        assert_eq!(error_code(&response), "InvalidQueryParameterValue");
    }
}

#[tokio::test]
async fn test_list_missing_container() {
    let server = TestServer::start().await;

    let response = server.list_blobs("nosuchcontainer", "").await;
    assert_eq!(response.status(), 404);
    assert_eq!(error_code(&response), "ContainerNotFound");
}

#[tokio::test]
async fn test_include_snapshots() {
    let server = TestServer::start().await;
    seed(&server, "snaps", &["base.txt", "other.txt"]).await;

    let response = server
        .client
        .put(format!("{}?comp=snapshot", server.blob_url("snaps", "base.txt")))
        .header("x-ms-version", API_VERSION)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let snapshot = header(&response, "x-ms-snapshot");
    assert!(snapshot.ends_with('Z'));

    let body = list_body(&server, "snaps", "").await;
    assert_eq!(extract_all(&body, "Name"), vec!["base.txt", "other.txt"]);
    assert!(extract_all(&body, "Snapshot").is_empty());

    let body = list_body(&server, "snaps", "include=snapshots").await;
    assert_eq!(
        extract_all(&body, "Name"),
        vec!["base.txt", "base.txt", "other.txt"]
    );
    assert_eq!(extract_all(&body, "Snapshot"), vec![snapshot]);
}

#[tokio::test]
async fn test_snapshot_pages_resume_inside_a_blob() {
    let server = TestServer::start().await;
    seed(&server, "snappages", &["a.txt", "b.txt"]).await;
    for _ in 0..3 {
        let response = server
            .client
            .put(format!("{}?comp=snapshot", server.blob_url("snappages", "a.txt")))
            .header("x-ms-version", API_VERSION)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
    }

    let mut names = Vec::new();
    let mut snapshots = Vec::new();
    let mut marker = String::new();
    for _ in 0..10 {
        let mut query = "include=snapshots&maxresults=2".to_string();
        if !marker.is_empty() {
            query.push_str("&marker=");
            query.extend(utf8_percent_encode(&marker, NON_ALPHANUMERIC));
        }
        let body = list_body(&server, "snappages", &query).await;
        names.extend(extract_all(&body, "Name"));
        snapshots.extend(extract_all(&body, "Snapshot"));
        marker = extract_all(&body, "NextMarker").concat();
        if marker.is_empty() {
            break;
        }
    }

    assert!(marker.is_empty());
    assert_eq!(names, vec!["a.txt", "a.txt", "a.txt", "a.txt", "b.txt"]);
    let unique: HashSet<_> = snapshots.iter().collect();
    assert_eq!(snapshots.len(), 3);
    assert_eq!(unique.len(), 3);
}

#[tokio::test]
async fn test_include_metadata() {
    let server = TestServer::start().await;
    server.create_container("withmeta").await;

    let response = server
        .client
        .put(server.blob_url("withmeta", "tagged.txt"))
        .header("x-ms-version", API_VERSION)
        .header("x-ms-blob-type", "BlockBlob")
        .header("x-ms-meta-color", "blue")
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let body = list_body(&server, "withmeta", "").await;
    assert!(!body.contains("<Metadata>"));

    let body = list_body(&server, "withmeta", "include=metadata").await;
    assert_eq!(extract_all(&body, "color"), vec!["blue"]);
}

#[tokio::test]
async fn test_listing_reports_lease_state() {
    let server = TestServer::start().await;
    seed(&server, "leaselist", &["leased.txt", "free.txt"]).await;

    server
        .blob_lease(
            "leaselist",
            "leased.txt",
            &[("x-ms-lease-action", "acquire"), ("x-ms-lease-duration", "-1")],
        )
        .await;

    let body = list_body(&server, "leaselist", "").await;
    assert_eq!(extract_all(&body, "LeaseState"), vec!["available", "leased"]);
    assert_eq!(extract_all(&body, "LeaseStatus"), vec!["unlocked", "locked"]);
    assert_eq!(extract_all(&body, "LeaseDuration"), vec!["infinite"]);
}
