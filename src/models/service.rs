//! Service-level data models.

use serde::{Deserialize, Serialize};

/// CORS rule for a storage service.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CorsRule {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub max_age_in_seconds: u32,
}

/// Logging configuration for a storage service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub version: String,
    pub read: bool,
    pub write: bool,
    pub delete: bool,
    pub retention_policy: RetentionPolicy,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            read: false,
            write: false,
            delete: false,
            retention_policy: RetentionPolicy::default(),
        }
    }
}

/// Metrics configuration for a storage service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricsConfig {
    pub version: String,
    pub enabled: bool,
    pub include_apis: Option<bool>,
    pub retention_policy: RetentionPolicy,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            enabled: false,
            include_apis: None,
            retention_policy: RetentionPolicy::default(),
        }
    }
}

/// Retention policy for logs and metrics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub enabled: bool,
    pub days: Option<u32>,
}

/// Static website configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StaticWebsite {
    pub enabled: bool,
    pub index_document: Option<String>,
    pub error_document_404_path: Option<String>,
}

/// Per-account service properties as stored.
///
/// Every field is optional: an unset field in a stored record means "never
/// configured" and is filled by [`ServiceProperties::with_defaults`] on read;
/// an unset field in an update means "leave unchanged".
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ServiceProperties {
    pub logging: Option<LoggingConfig>,
    pub hour_metrics: Option<MetricsConfig>,
    pub minute_metrics: Option<MetricsConfig>,
    pub cors: Option<Vec<CorsRule>>,
    pub default_service_version: Option<String>,
    pub static_website: Option<StaticWebsite>,
}

impl ServiceProperties {
    /// Returns a copy with every unset field filled from the documented defaults.
    pub fn with_defaults(&self, api_version: &str) -> Self {
        Self {
            logging: Some(self.logging.clone().unwrap_or_default()),
            hour_metrics: Some(self.hour_metrics.clone().unwrap_or_default()),
            minute_metrics: Some(self.minute_metrics.clone().unwrap_or_default()),
            cors: Some(self.cors.clone().unwrap_or_default()),
            default_service_version: Some(
                self.default_service_version
                    .clone()
                    .unwrap_or_else(|| api_version.to_string()),
            ),
            static_website: Some(self.static_website.clone().unwrap_or_default()),
        }
    }

    /// Applies the fields present in `update`, leaving the rest untouched.
    pub fn merge(&mut self, update: ServiceProperties) {
        if update.logging.is_some() {
            self.logging = update.logging;
        }
        if update.hour_metrics.is_some() {
            self.hour_metrics = update.hour_metrics;
        }
        if update.minute_metrics.is_some() {
            self.minute_metrics = update.minute_metrics;
        }
        if update.cors.is_some() {
            self.cors = update.cors;
        }
        if update.default_service_version.is_some() {
            self.default_service_version = update.default_service_version;
        }
        if update.static_website.is_some() {
            self.static_website = update.static_website;
        }
    }
}
