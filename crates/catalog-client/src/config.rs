//! Catalog endpoint configuration

use serde::{Deserialize, Serialize};

/// Default public catalog endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://dataplex.googleapis.com";

/// Catalog connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Base URL of the catalog REST API
    pub endpoint: String,
    /// Cloud project owning the glossaries
    pub project_id: String,
    /// Catalog location
    pub location: String,
    /// Bearer token (optional when a proxy injects credentials)
    pub token: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Delay between long-running operation polls, in milliseconds
    pub poll_interval_ms: u64,
    /// Polls before a long-running operation is given up on
    pub poll_attempts: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            endpoint: std::env::var("CATALOG_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            project_id: std::env::var("GCP_PROJECT_ID").unwrap_or_default(),
            location: std::env::var("GCP_LOCATION").unwrap_or_else(|_| "us".to_string()),
            token: std::env::var("CATALOG_TOKEN").ok(),
            timeout_secs: 30,
            poll_interval_ms: 1000,
            poll_attempts: 120,
        }
    }
}

impl CatalogConfig {
    /// Create config for a specific endpoint, project and location
    pub fn new(endpoint: &str, project_id: &str, location: &str) -> Self {
        CatalogConfig {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            location: location.to_string(),
            token: None,
            timeout_secs: 30,
            poll_interval_ms: 1000,
            poll_attempts: 120,
        }
    }

    /// Set authentication token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set how long-running operations are awaited
    pub fn with_polling(mut self, interval_ms: u64, attempts: u32) -> Self {
        self.poll_interval_ms = interval_ms;
        self.poll_attempts = attempts.max(1);
        self
    }

    /// `projects/{project}/locations/{location}`
    pub fn parent(&self) -> String {
        format!("projects/{}/locations/{}", self.project_id, self.location)
    }
}
