//! Structured observability hooks for the publish lifecycle.
//!
//! This module provides:
//! - A publish-scoped tracing span via [`publish_span`]
//! - Emission functions for the lifecycle events: start, stage progress,
//!   idempotent skips, finish, failure and audit writes
//!
//! Events are emitted at `info!` level unless noted (filter with `RUST_LOG`).

use tracing::{error, info, warn};

use crate::audit::{AuditError, AuditEvent};

/// Span tagged with the glossary id. Attach it to async work with
/// `tracing::Instrument`.
pub fn publish_span(glossary_id: &str) -> tracing::Span {
    tracing::info_span!("glossary.publish", glossary_id = %glossary_id)
}

/// Emit event: publish run started.
pub fn emit_publish_started(glossary_id: &str, categories: usize, terms: usize) {
    info!(
        event = "publish.started",
        glossary_id = %glossary_id,
        categories = categories,
        terms = terms,
    );
}

/// Emit event: a pipeline stage finished.
pub fn emit_stage_completed(stage: &str, created: usize, skipped: usize) {
    info!(
        event = "publish.stage_completed",
        stage = %stage,
        created = created,
        skipped = skipped,
    );
}

/// Emit event (warn): the wipe stage hit a non-fatal error.
pub fn emit_wipe_soft_failure(glossary_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "publish.wipe_soft_failure", glossary_id = %glossary_id, error = %error);
}

/// Emit event: a create call reported the resource already exists.
pub fn emit_already_exists(kind: &str, slug: &str) {
    info!(event = "publish.already_exists", kind = %kind, slug = %slug);
}

/// Emit event (warn): two categories normalize to the same slug; the later
/// one will be skipped by the catalog.
pub fn emit_duplicate_category_slug(original_id: &str, slug: &str) {
    warn!(
        event = "publish.duplicate_category_slug",
        original_id = %original_id,
        slug = %slug,
    );
}

/// Emit event (warn): two labels of one resource normalize to the same key
/// and the label named `dropped` is discarded.
pub fn emit_label_key_collision(owner: &str, key: &str, dropped: &str) {
    warn!(
        event = "publish.label_key_collision",
        owner = %owner,
        key = %key,
        dropped = %dropped,
    );
}

/// Emit event: a term's parent reference matched no category.
pub fn emit_unresolved_parent(term_slug: &str, parent_ref: &str) {
    info!(
        event = "publish.unresolved_parent",
        term = %term_slug,
        parent_ref = %parent_ref,
    );
}

/// Emit event: publish run finished successfully.
pub fn emit_publish_finished(glossary_id: &str, categories: usize, terms: usize, duration_ms: u64) {
    info!(
        event = "publish.finished",
        glossary_id = %glossary_id,
        categories_count = categories,
        terms_count = terms,
        duration_ms = duration_ms,
    );
}

/// Emit event (error): publish run aborted.
pub fn emit_publish_failed(glossary_id: &str, stage: &str, error: &dyn std::fmt::Display) {
    error!(
        event = "publish.failed",
        glossary_id = %glossary_id,
        stage = %stage,
        error = %error,
    );
}

/// Emit event: audit event persisted.
pub fn emit_audit_recorded(event: &AuditEvent) {
    info!(
        event = "audit.recorded",
        event_id = %event.event_id,
        status = %event.status,
        actor = %event.actor,
        glossary_id = %event.glossary_id,
    );
}

/// Emit event (error): the audit sink rejected an event.
pub fn emit_audit_write_error(event: &AuditEvent, error: &AuditError) {
    error!(
        event = "audit.write_error",
        event_id = %event.event_id,
        status = %event.status,
        glossary_id = %event.glossary_id,
        error = %error,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_span_create() {
        let span = publish_span("business-glossary-v1");
        let _guard = span.enter();
        emit_stage_completed("categories", 2, 1);
    }
}
