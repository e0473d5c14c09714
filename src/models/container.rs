//! Container data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lease::LeaseProperties;
use super::metadata::Metadata;
use crate::etag::new_etag;

/// Public access level for a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PublicAccessLevel {
    #[default]
    None,
    Container,
    Blob,
}

impl PublicAccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicAccessLevel::None => "",
            PublicAccessLevel::Container => "container",
            PublicAccessLevel::Blob => "blob",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "" | "none" | "private" => Some(PublicAccessLevel::None),
            "container" => Some(PublicAccessLevel::Container),
            "blob" => Some(PublicAccessLevel::Blob),
            _ => None,
        }
    }
}

/// Container properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerProperties {
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub lease: LeaseProperties,
    pub public_access: PublicAccessLevel,
    pub has_immutability_policy: bool,
    pub has_legal_hold: bool,
}

impl Default for ContainerProperties {
    fn default() -> Self {
        Self {
            etag: new_etag(),
            last_modified: Utc::now(),
            lease: LeaseProperties::default(),
            public_access: PublicAccessLevel::None,
            has_immutability_policy: false,
            has_legal_hold: false,
        }
    }
}

impl ContainerProperties {
    /// Issues a new ETag and stamps the modification time.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.etag = new_etag();
        self.last_modified = now;
    }
}

/// Signed identifier for container access policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedIdentifier {
    pub id: String,
    pub access_policy: AccessPolicy,
}

/// Access policy for a signed identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub start: Option<DateTime<Utc>>,
    pub expiry: Option<DateTime<Utc>>,
    pub permission: Option<String>,
}

/// Complete container model stored in metadata store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerModel {
    /// Account name.
    pub account: String,
    /// Container name.
    pub name: String,
    /// Container properties.
    pub properties: ContainerProperties,
    /// User-defined metadata.
    pub metadata: Metadata,
    /// Signed identifiers for stored access policies, in client order.
    pub signed_identifiers: Vec<SignedIdentifier>,
}

impl ContainerModel {
    /// Creates a new container model.
    pub fn new(account: String, name: String) -> Self {
        Self {
            account,
            name,
            properties: ContainerProperties::default(),
            metadata: Metadata::new(),
            signed_identifiers: Vec::new(),
        }
    }
}

/// Container ACL as returned by the store.
#[derive(Debug, Clone)]
pub struct ContainerAcl {
    pub public_access: PublicAccessLevel,
    pub signed_identifiers: Vec<SignedIdentifier>,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}
