//! Publisher configuration.
//!
//! Built once at process start and passed into the reconciler; the core
//! keeps no global state.

use serde::{Deserialize, Serialize};

/// Default glossary identifier used when `GLOSSARY_ID` is unset.
pub const DEFAULT_GLOSSARY_ID: &str = "business_glossary_v1";

/// Settings for one publish run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Cloud project owning the catalog
    pub project_id: String,
    /// Catalog location (region or multi-region)
    pub location: String,
    /// Glossary identifier; slugified before use
    pub glossary_id: String,
    pub glossary_display_name: String,
    pub glossary_description: String,
    /// Who approved the publish (recorded in the audit trail)
    pub actor: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        PublisherConfig {
            project_id: std::env::var("GCP_PROJECT_ID").unwrap_or_default(),
            location: std::env::var("GCP_LOCATION").unwrap_or_else(|_| "us".to_string()),
            glossary_id: std::env::var("GLOSSARY_ID")
                .unwrap_or_else(|_| DEFAULT_GLOSSARY_ID.to_string()),
            glossary_display_name: "Business Glossary".to_string(),
            glossary_description: "Corporate Business Glossary".to_string(),
            actor: std::env::var("GITHUB_ACTOR").unwrap_or_else(|_| "unknown_user".to_string()),
        }
    }
}

impl PublisherConfig {
    /// Create a config for a specific project and location
    pub fn new(project_id: &str, location: &str) -> Self {
        PublisherConfig {
            project_id: project_id.to_string(),
            location: location.to_string(),
            glossary_id: DEFAULT_GLOSSARY_ID.to_string(),
            glossary_display_name: "Business Glossary".to_string(),
            glossary_description: "Corporate Business Glossary".to_string(),
            actor: "unknown_user".to_string(),
        }
    }

    pub fn with_glossary(mut self, glossary_id: &str, display_name: &str) -> Self {
        self.glossary_id = glossary_id.to_string();
        self.glossary_display_name = display_name.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.glossary_description = description.to_string();
        self
    }

    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_has_values() {
        let config = PublisherConfig::default();
        assert!(!config.location.is_empty());
        assert!(!config.glossary_id.is_empty());
        assert!(!config.actor.is_empty());
    }

    #[test]
    fn test_config_builders() {
        let config = PublisherConfig::new("acme-data", "europe-west1")
            .with_glossary("Claims Glossary", "Claims")
            .with_description("Claims vocabulary")
            .with_actor("reviewer");
        assert_eq!(config.project_id, "acme-data");
        assert_eq!(config.location, "europe-west1");
        assert_eq!(config.glossary_id, "Claims Glossary");
        assert_eq!(config.glossary_display_name, "Claims");
        assert_eq!(config.glossary_description, "Claims vocabulary");
        assert_eq!(config.actor, "reviewer");
    }
}
