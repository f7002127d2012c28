//! Catalog Client: REST adapter for the glossary catalog
//!
//! Implements `glossary_core::CatalogGateway` over HTTP. Vendor response
//! shapes stay inside this crate; callers only see `CreateOutcome`,
//! `DeleteOutcome` and `GatewayError`.

pub mod config;
pub mod http;

pub use config::{CatalogConfig, DEFAULT_ENDPOINT};
pub use http::{classify_create, classify_delete, HttpCatalogGateway};
