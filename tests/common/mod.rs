//! Common test utilities.

#![allow(dead_code)]

use tokio::net::TcpListener;

use blobcore::{BlobServerBuilder, DEFAULT_ACCOUNT, DEFAULT_ACCOUNT_KEY};

/// Second account served by every test server.
pub const SECOND_ACCOUNT: &str = "secondaccount";
pub const SECOND_ACCOUNT_KEY: &str = "c2Vjb25kYWNjb3VudGtleQ==";

/// API version sent by the raw HTTP tests.
pub const API_VERSION: &str = "2021-10-04";

/// Test server wrapper.
pub struct TestServer {
    pub base_url: String,
    pub account: String,
    pub key: String,
    pub second_account: String,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Creates and starts a test server on a random port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = BlobServerBuilder::new()
            .host("127.0.0.1")
            .port(port)
            .account(SECOND_ACCOUNT, SECOND_ACCOUNT_KEY)
            .build();

        tokio::spawn(async move {
            server.serve(listener).await.unwrap();
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            account: DEFAULT_ACCOUNT.to_string(),
            key: DEFAULT_ACCOUNT_KEY.to_string(),
            second_account: SECOND_ACCOUNT.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Returns the URL for a container.
    pub fn container_url(&self, container: &str) -> String {
        self.container_url_in(&self.account, container)
    }

    /// Returns the URL for a container in the given account.
    pub fn container_url_in(&self, account: &str, container: &str) -> String {
        format!("{}/{}/{}", self.base_url, account, container)
    }

    /// Returns the URL for a blob.
    pub fn blob_url(&self, container: &str, blob: &str) -> String {
        self.blob_url_in(&self.account, container, blob)
    }

    /// Returns the URL for a blob in the given account.
    pub fn blob_url_in(&self, account: &str, container: &str, blob: &str) -> String {
        format!("{}/{}/{}/{}", self.base_url, account, container, blob)
    }

    /// Returns the service URL of the default account.
    pub fn service_url(&self) -> String {
        format!("{}/{}", self.base_url, self.account)
    }

    /// Creates a container in the default account.
    pub async fn create_container(&self, container: &str) {
        self.create_container_in(&self.account, container).await;
    }

    /// Creates a container in the given account.
    pub async fn create_container_in(&self, account: &str, container: &str) {
        let response = self
            .client
            .put(format!("{}?restype=container", self.container_url_in(account, container)))
            .header("x-ms-version", API_VERSION)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201, "create container {}", container);
    }

    /// Uploads a block blob in the default account.
    pub async fn put_blob(&self, container: &str, blob: &str, content: &str) -> reqwest::Response {
        self.put_blob_in(&self.account, container, blob, content).await
    }

    /// Uploads a block blob in the given account.
    pub async fn put_blob_in(
        &self,
        account: &str,
        container: &str,
        blob: &str,
        content: &str,
    ) -> reqwest::Response {
        let response = self
            .client
            .put(self.blob_url_in(account, container, blob))
            .header("x-ms-version", API_VERSION)
            .header("x-ms-blob-type", "BlockBlob")
            .body(content.to_string())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201, "put blob {}", blob);
        response
    }

    /// Downloads a blob from the default account as text.
    pub async fn get_blob_text(&self, container: &str, blob: &str) -> String {
        let response = self
            .client
            .get(self.blob_url(container, blob))
            .header("x-ms-version", API_VERSION)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "get blob {}", blob);
        response.text().await.unwrap()
    }

    /// Issues a lease request against a blob.
    pub async fn blob_lease(
        &self,
        container: &str,
        blob: &str,
        headers: &[(&str, &str)],
    ) -> reqwest::Response {
        let mut request = self
            .client
            .put(format!("{}?comp=lease", self.blob_url(container, blob)))
            .header("x-ms-version", API_VERSION);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        request.send().await.unwrap()
    }

    /// Issues a lease request against a container.
    pub async fn container_lease(
        &self,
        container: &str,
        headers: &[(&str, &str)],
    ) -> reqwest::Response {
        let mut request = self
            .client
            .put(format!(
                "{}?comp=lease&restype=container",
                self.container_url(container)
            ))
            .header("x-ms-version", API_VERSION);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        request.send().await.unwrap()
    }

    /// Lists blobs in a container with extra query parameters.
    pub async fn list_blobs(&self, container: &str, query: &str) -> reqwest::Response {
        let mut url = format!("{}?restype=container&comp=list", self.container_url(container));
        if !query.is_empty() {
            url.push('&');
            url.push_str(query);
        }
        self.client
            .get(url)
            .header("x-ms-version", API_VERSION)
            .send()
            .await
            .unwrap()
    }
}

/// Returns the error code header of a response.
pub fn error_code(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("x-ms-error-code")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Returns a response header as a string.
pub fn header(response: &reqwest::Response, name: &str) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Extracts the text of every `<tag>` element in order.
pub fn extract_all(xml: &str, tag: &str) -> Vec<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut values = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        match after.find(&close) {
            Some(end) => {
                values.push(after[..end].to_string());
                rest = &after[end + close.len()..];
            }
            None => break,
        }
    }
    values
}
