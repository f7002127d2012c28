//! Glossary Core: proposal reconciliation and publishing
//!
//! This crate turns a reviewed business-glossary proposal (categories and
//! terms suggested upstream) into a catalog glossary resource tree, and
//! keeps an audit trail of every publish attempt.
//!
//! ## Key Components
//!
//! - `slugify`: label -> catalog-legal `ResourceSlug`
//! - `parse_proposal`: lenient JSON -> `Proposal`
//! - `parse_metadata_proposal`: lenient JSON -> `MetadataProposal` (review only)
//! - `CatalogGateway`: capability trait over the remote catalog
//! - `Reconciler`: wipe, recreate, categories pass, terms pass, audit
//! - `AuditRecorder`: append-only publish log that never masks errors
//! - `ProposalSink`: hands suggestions over for human review
//!
//! All remote seams are async traits; in-memory fakes live in [`fakes`].

pub mod annotation;
pub mod audit;
pub mod config;
pub mod fakes;
pub mod gateway;
pub mod obs;
pub mod proposal;
pub mod reconcile;
pub mod sink;
pub mod slug;
pub mod telemetry;

pub use annotation::{parse_metadata_proposal, MetadataProposal, MetadataUpdate, QualityFlag};
pub use audit::{
    AuditError, AuditEvent, AuditRecorder, AuditResult, AuditSink, AuditStatus, JsonlAuditLog,
};
pub use config::{PublisherConfig, DEFAULT_GLOSSARY_ID};
pub use gateway::{
    CatalogGateway, CreateOutcome, DeleteOutcome, GatewayError, GatewayResult, NewCategory,
    NewTerm,
};
pub use proposal::{
    parse_proposal, proposal_from_value, strip_code_fences, Category, Proposal, ProposalError,
    Sensitivity, Term,
};
pub use reconcile::{
    PlannedCategory, PlannedTerm, PublishError, PublishFailure, PublishPlan, PublishStage,
    PublishSummary, Reconciler,
};
pub use sink::{latest_proposal_file, DirectoryProposalSink, ProposalSink, SinkError, SinkResult};
pub use slug::{slugify, ResourceSlug, SlugError, CATEGORY_SLUG_MAX, TERM_SLUG_MAX};
pub use telemetry::init_tracing;

/// Glossary publisher version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
