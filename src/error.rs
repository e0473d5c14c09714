//! Blob storage error taxonomy and error response formatting.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use hyper::ext::ReasonPhrase;
use thiserror::Error;

use crate::config::DEFAULT_API_VERSION;

/// Machine-readable error codes delivered to clients in `x-ms-error-code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // General errors
    AuthenticationFailed,
    InternalError,
    InvalidHeaderValue,
    InvalidQueryParameterValue,
    InvalidRange,
    InvalidResourceName,
    InvalidXmlDocument,
    Md5Mismatch,
    MissingRequiredHeader,
    NotImplemented,
    UnsupportedHttpVerb,

    // Container and blob errors
    BlobNotFound,
    CannotVerifyCopySource,
    ContainerAlreadyExists,
    ContainerNotFound,
    InvalidSourceBlobUrl,
    SnapshotsPresent,

    // Lease errors
    LeaseAlreadyPresent,
    LeaseIdMismatchWithBlobOperation,
    LeaseIdMismatchWithContainerOperation,
    LeaseIdMismatchWithLeaseOperation,
    LeaseIdMissing,
    LeaseIsBreakingAndCannotBeAcquired,
    LeaseIsBreakingAndCannotBeChanged,
    LeaseIsBrokenAndCannotBeRenewed,
    LeaseNotPresentWithBlobOperation,
    LeaseNotPresentWithContainerOperation,
    LeaseNotPresentWithLeaseOperation,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthenticationFailed => "AuthenticationFailed",
            ErrorCode::InternalError => "InternalError",
            ErrorCode::InvalidHeaderValue => "InvalidHeaderValue",
            ErrorCode::InvalidQueryParameterValue => "InvalidQueryParameterValue",
            ErrorCode::InvalidRange => "InvalidRange",
            ErrorCode::InvalidResourceName => "InvalidResourceName",
            ErrorCode::InvalidXmlDocument => "InvalidXmlDocument",
            ErrorCode::Md5Mismatch => "Md5Mismatch",
            ErrorCode::MissingRequiredHeader => "MissingRequiredHeader",
            ErrorCode::NotImplemented => "NotImplemented",
            ErrorCode::UnsupportedHttpVerb => "UnsupportedHttpVerb",
            ErrorCode::BlobNotFound => "BlobNotFound",
            ErrorCode::CannotVerifyCopySource => "CannotVerifyCopySource",
            ErrorCode::ContainerAlreadyExists => "ContainerAlreadyExists",
            ErrorCode::ContainerNotFound => "ContainerNotFound",
            ErrorCode::InvalidSourceBlobUrl => "InvalidSourceBlobUrl",
            ErrorCode::SnapshotsPresent => "SnapshotsPresent",
            ErrorCode::LeaseAlreadyPresent => "LeaseAlreadyPresent",
            ErrorCode::LeaseIdMismatchWithBlobOperation => "LeaseIdMismatchWithBlobOperation",
            ErrorCode::LeaseIdMismatchWithContainerOperation => {
                "LeaseIdMismatchWithContainerOperation"
            }
            ErrorCode::LeaseIdMismatchWithLeaseOperation => "LeaseIdMismatchWithLeaseOperation",
            ErrorCode::LeaseIdMissing => "LeaseIdMissing",
            ErrorCode::LeaseIsBreakingAndCannotBeAcquired => "LeaseIsBreakingAndCannotBeAcquired",
            ErrorCode::LeaseIsBreakingAndCannotBeChanged => "LeaseIsBreakingAndCannotBeChanged",
            ErrorCode::LeaseIsBrokenAndCannotBeRenewed => "LeaseIsBrokenAndCannotBeRenewed",
            ErrorCode::LeaseNotPresentWithBlobOperation => "LeaseNotPresentWithBlobOperation",
            ErrorCode::LeaseNotPresentWithContainerOperation => {
                "LeaseNotPresentWithContainerOperation"
            }
            ErrorCode::LeaseNotPresentWithLeaseOperation => "LeaseNotPresentWithLeaseOperation",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            ErrorCode::InvalidHeaderValue
            | ErrorCode::InvalidQueryParameterValue
            | ErrorCode::InvalidResourceName
            | ErrorCode::InvalidXmlDocument
            | ErrorCode::Md5Mismatch
            | ErrorCode::MissingRequiredHeader
            | ErrorCode::UnsupportedHttpVerb
            | ErrorCode::InvalidSourceBlobUrl => StatusCode::BAD_REQUEST,

            // 403 Forbidden
            ErrorCode::AuthenticationFailed => StatusCode::FORBIDDEN,

            // 404 Not Found
            ErrorCode::BlobNotFound | ErrorCode::ContainerNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            ErrorCode::ContainerAlreadyExists
            | ErrorCode::LeaseAlreadyPresent
            | ErrorCode::LeaseIdMismatchWithLeaseOperation
            | ErrorCode::LeaseIsBreakingAndCannotBeAcquired
            | ErrorCode::LeaseIsBreakingAndCannotBeChanged
            | ErrorCode::LeaseIsBrokenAndCannotBeRenewed
            | ErrorCode::LeaseNotPresentWithLeaseOperation
            | ErrorCode::SnapshotsPresent => StatusCode::CONFLICT,

            // 412 Precondition Failed
            ErrorCode::LeaseIdMismatchWithBlobOperation
            | ErrorCode::LeaseIdMismatchWithContainerOperation
            | ErrorCode::LeaseIdMissing
            | ErrorCode::LeaseNotPresentWithBlobOperation
            | ErrorCode::LeaseNotPresentWithContainerOperation => StatusCode::PRECONDITION_FAILED,

            // 416 Range Not Satisfiable
            ErrorCode::InvalidRange => StatusCode::RANGE_NOT_SATISFIABLE,

            // 500 Internal Server Error
            ErrorCode::InternalError | ErrorCode::CannotVerifyCopySource => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            // 501 Not Implemented
            ErrorCode::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        }
    }

    /// Returns the default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::AuthenticationFailed => {
                "Server failed to authenticate the request. Make sure the value of the \
                 Authorization header is formed correctly including the signature."
            }
            ErrorCode::BlobNotFound => "The specified blob does not exist.",
            ErrorCode::CannotVerifyCopySource => {
                "Could not verify the copy source within the specified time."
            }
            ErrorCode::ContainerAlreadyExists => "The specified container already exists.",
            ErrorCode::ContainerNotFound => "The specified container does not exist.",
            ErrorCode::InvalidHeaderValue => "The value for one of the HTTP headers is not valid.",
            ErrorCode::InvalidQueryParameterValue => {
                "Value for one of the query parameters specified in the request URI is invalid."
            }
            ErrorCode::InvalidRange => {
                "The range specified is invalid for the current size of the resource."
            }
            ErrorCode::InvalidResourceName => {
                "The specified resource name contains invalid characters."
            }
            ErrorCode::InvalidSourceBlobUrl => {
                "The source url for copy request must be valid Azure Storage blob url."
            }
            ErrorCode::InvalidXmlDocument => "XML specified is not syntactically valid.",
            ErrorCode::LeaseAlreadyPresent => "There is already a lease present.",
            ErrorCode::LeaseIdMismatchWithBlobOperation => {
                "The lease ID specified did not match the lease ID for the blob."
            }
            ErrorCode::LeaseIdMismatchWithContainerOperation => {
                "The lease ID specified did not match the lease ID for the container."
            }
            ErrorCode::LeaseIdMismatchWithLeaseOperation => {
                "The lease ID specified did not match the lease ID for the resource."
            }
            ErrorCode::LeaseIdMissing => {
                "There is currently a lease on the resource and no lease ID was specified in the request."
            }
            ErrorCode::LeaseIsBreakingAndCannotBeAcquired => {
                "There is already a breaking lease present which cannot be acquired."
            }
            ErrorCode::LeaseIsBreakingAndCannotBeChanged => {
                "The lease ID matched, but the lease is currently in breaking state and cannot be changed."
            }
            ErrorCode::LeaseIsBrokenAndCannotBeRenewed => {
                "The lease ID matched, but the lease has been broken explicitly and cannot be renewed."
            }
            ErrorCode::LeaseNotPresentWithBlobOperation => {
                "There is currently no lease on the blob."
            }
            ErrorCode::LeaseNotPresentWithContainerOperation => {
                "There is currently no lease on the container."
            }
            ErrorCode::LeaseNotPresentWithLeaseOperation => {
                "There is currently no lease on the resource."
            }
            ErrorCode::Md5Mismatch => {
                "The MD5 value specified in the request did not match with the MD5 value calculated by the server."
            }
            ErrorCode::MissingRequiredHeader => "A required header was not specified.",
            ErrorCode::NotImplemented => {
                "The requested operation is not implemented by this emulator."
            }
            ErrorCode::SnapshotsPresent => {
                "This operation is not permitted because the blob has snapshots."
            }
            ErrorCode::UnsupportedHttpVerb => {
                "The resource doesn't support the specified HTTP verb."
            }
            ErrorCode::InternalError => {
                "The server encountered an internal error. Please retry the request."
            }
        }
    }
}

/// Storage error with code and message.
#[derive(Debug, Error)]
#[error("{code:?}: {message}")]
pub struct StorageError {
    pub code: ErrorCode,
    pub message: String,
    /// Overrides the code's default status (copy-source probes report the remote status).
    pub status: Option<StatusCode>,
    pub request_id: Option<String>,
}

impl StorageError {
    /// Creates a new storage error with the given code and default message.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.default_message().to_string(),
            code,
            status: None,
            request_id: None,
        }
    }

    /// Creates a new storage error with a custom message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            request_id: None,
        }
    }

    /// Creates an `InvalidHeaderValue` error naming the offending header.
    pub fn invalid_header(name: &str, value: &str) -> Self {
        Self::with_message(
            ErrorCode::InvalidHeaderValue,
            format!(
                "The value for one of the HTTP headers is not in the correct format. \
                 HeaderName: {}, HeaderValue: {}",
                name, value
            ),
        )
    }

    /// Creates a `CannotVerifyCopySource` error carrying the probe's status.
    pub fn cannot_verify_copy_source(status: StatusCode, message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::CannotVerifyCopySource, message).with_status(status)
    }

    /// Overrides the HTTP status reported for this error.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the request ID for this error.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Returns the HTTP status delivered to the client.
    pub fn status_code(&self) -> StatusCode {
        self.status.unwrap_or_else(|| self.code.status_code())
    }
}

impl IntoResponse for StorageError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = self
            .request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");

        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Error>
  <Code>{}</Code>
  <Message>{}
RequestId:{}
Time:{}</Message>
</Error>"#,
            self.code.as_str(),
            xml_escape(&self.message),
            request_id,
            timestamp
        );

        let mut response = Response::new(xml.into());
        *response.status_mut() = status;
        let headers = response.headers_mut();
        headers.insert(
            "Content-Type",
            http::HeaderValue::from_static("application/xml"),
        );
        headers.insert(
            "x-ms-error-code",
            http::HeaderValue::from_static(self.code.as_str()),
        );
        headers.insert(
            "x-ms-version",
            http::HeaderValue::from_static(DEFAULT_API_VERSION),
        );
        if let Ok(value) = http::HeaderValue::from_str(&request_id) {
            headers.insert("x-ms-request-id", value);
        }

        // Clients surface the status line, so carry the message there as well.
        if let Ok(reason) = ReasonPhrase::try_from(self.message.as_bytes()) {
            response.extensions_mut().insert(reason);
        }

        response
    }
}

/// Escapes special XML characters in a string.
pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
