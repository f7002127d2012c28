//! Catalog gateway: the capability interface over the remote catalog.
//!
//! The reconciler only sees this trait. Adapters absorb vendor-specific
//! response shapes and map them onto [`CreateOutcome`], [`DeleteOutcome`]
//! and [`GatewayError`]. In-memory fakes live in [`crate::fakes`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::slug::ResourceSlug;

/// Result type for gateway operations
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Outcome of a create call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateOutcome {
    Created,
    /// The identifier is already taken; nothing was changed.
    AlreadyExists,
}

/// Outcome of a delete call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Fatal gateway failures. `AlreadyExists` is never an error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("could not decode catalog response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Whether the failure is an authorization problem rather than a
    /// transient or request-level one.
    pub fn is_permission(&self) -> bool {
        matches!(self, GatewayError::PermissionDenied(_))
    }
}

/// Category creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub slug: ResourceSlug,
    pub display_name: String,
    pub description: String,
    pub labels: BTreeMap<String, String>,
}

/// Term creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTerm {
    pub slug: ResourceSlug,
    pub display_name: String,
    pub description: String,
    /// `None` publishes the term at the glossary root.
    pub parent_category: Option<ResourceSlug>,
    pub labels: BTreeMap<String, String>,
}

/// Remote glossary resource tree operations.
///
/// Contract:
/// - Create calls return `AlreadyExists` instead of failing when the id is
///   taken, and leave the existing resource untouched.
/// - `ensure_glossary_absent` removes the glossary with all of its
///   categories and terms; a missing glossary is `NotFound`, not an error.
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    async fn ensure_glossary_absent(&self, glossary_id: &ResourceSlug)
        -> GatewayResult<DeleteOutcome>;

    async fn create_glossary(
        &self,
        glossary_id: &ResourceSlug,
        display_name: &str,
        description: &str,
    ) -> GatewayResult<CreateOutcome>;

    async fn create_category(
        &self,
        glossary_id: &ResourceSlug,
        category: &NewCategory,
    ) -> GatewayResult<CreateOutcome>;

    async fn create_term(&self, glossary_id: &ResourceSlug, term: &NewTerm)
        -> GatewayResult<CreateOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_classification() {
        assert!(GatewayError::PermissionDenied("no".into()).is_permission());
        assert!(!GatewayError::Transport("reset".into()).is_permission());
        assert!(!GatewayError::Rejected {
            status: 500,
            message: "boom".into()
        }
        .is_permission());
    }

    #[test]
    fn test_error_display() {
        let err = GatewayError::Rejected {
            status: 400,
            message: "bad term id".into(),
        };
        assert!(err.to_string().contains("400"));
        assert!(err.to_string().contains("bad term id"));
    }
}
