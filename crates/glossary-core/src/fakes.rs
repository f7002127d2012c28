//! In-memory fakes for the gateway, audit and sink traits (testing and
//! dry runs).
//!
//! `MemoryCatalogGateway` keeps a full glossary tree and honours the
//! gateway contract (`AlreadyExists` on taken ids, cascading delete). Faults
//! can be injected per operation and slug.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::audit::{AuditError, AuditEvent, AuditResult, AuditSink};
use crate::gateway::*;
use crate::sink::{ProposalSink, SinkResult};
use crate::slug::ResourceSlug;

// ---------------------------------------------------------------------------
// MemoryCatalogGateway
// ---------------------------------------------------------------------------

/// Gateway operation kinds, used for fault injection and call logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    DeleteGlossary,
    CreateGlossary,
    CreateCategory,
    CreateTerm,
}

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub op: GatewayOp,
    pub glossary_id: String,
    /// Category or term slug; `None` for glossary-level calls.
    pub slug: Option<String>,
}

/// Snapshot of one glossary held by the fake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlossaryState {
    pub display_name: String,
    pub description: String,
    pub categories: BTreeMap<String, NewCategory>,
    pub terms: BTreeMap<String, NewTerm>,
}

#[derive(Debug, Clone)]
struct Fault {
    op: GatewayOp,
    slug: Option<String>,
    error: GatewayError,
}

/// In-memory catalog backed by a `HashMap<glossary_id, GlossaryState>`.
#[derive(Debug, Default)]
pub struct MemoryCatalogGateway {
    glossaries: Mutex<HashMap<String, GlossaryState>>,
    faults: Mutex<Vec<Fault>>,
    calls: Mutex<Vec<GatewayCall>>,
}

impl MemoryCatalogGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call of `op` fail with `error`. With `slug` set, only
    /// calls for that category or term slug fail.
    pub fn fail_on(&self, op: GatewayOp, slug: Option<&str>, error: GatewayError) {
        self.faults.lock().unwrap().push(Fault {
            op,
            slug: slug.map(str::to_string),
            error,
        });
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        self.faults.lock().unwrap().clear();
    }

    /// Current state of a glossary, if it exists.
    pub fn glossary(&self, glossary_id: &str) -> Option<GlossaryState> {
        self.glossaries.lock().unwrap().get(glossary_id).cloned()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls of the given kind.
    pub fn call_count(&self, op: GatewayOp) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.op == op).count()
    }

    fn record(&self, op: GatewayOp, glossary_id: &ResourceSlug, slug: Option<&ResourceSlug>) {
        self.calls.lock().unwrap().push(GatewayCall {
            op,
            glossary_id: glossary_id.to_string(),
            slug: slug.map(ToString::to_string),
        });
    }

    fn injected(&self, op: GatewayOp, slug: Option<&ResourceSlug>) -> GatewayResult<()> {
        let faults = self.faults.lock().unwrap();
        let hit = faults.iter().find(|f| {
            f.op == op
                && match (&f.slug, slug) {
                    (None, _) => true,
                    (Some(want), Some(got)) => want == got.as_str(),
                    (Some(_), None) => false,
                }
        });
        match hit {
            Some(fault) => Err(fault.error.clone()),
            None => Ok(()),
        }
    }

    fn missing_glossary(glossary_id: &ResourceSlug) -> GatewayError {
        GatewayError::Rejected {
            status: 404,
            message: format!("glossary {glossary_id} not found"),
        }
    }
}

#[async_trait]
impl CatalogGateway for MemoryCatalogGateway {
    async fn ensure_glossary_absent(
        &self,
        glossary_id: &ResourceSlug,
    ) -> GatewayResult<DeleteOutcome> {
        self.record(GatewayOp::DeleteGlossary, glossary_id, None);
        self.injected(GatewayOp::DeleteGlossary, None)?;
        let mut glossaries = self.glossaries.lock().unwrap();
        match glossaries.remove(glossary_id.as_str()) {
            Some(_) => Ok(DeleteOutcome::Deleted),
            None => Ok(DeleteOutcome::NotFound),
        }
    }

    async fn create_glossary(
        &self,
        glossary_id: &ResourceSlug,
        display_name: &str,
        description: &str,
    ) -> GatewayResult<CreateOutcome> {
        self.record(GatewayOp::CreateGlossary, glossary_id, None);
        self.injected(GatewayOp::CreateGlossary, None)?;
        let mut glossaries = self.glossaries.lock().unwrap();
        if glossaries.contains_key(glossary_id.as_str()) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        glossaries.insert(
            glossary_id.to_string(),
            GlossaryState {
                display_name: display_name.to_string(),
                description: description.to_string(),
                ..Default::default()
            },
        );
        Ok(CreateOutcome::Created)
    }

    async fn create_category(
        &self,
        glossary_id: &ResourceSlug,
        category: &NewCategory,
    ) -> GatewayResult<CreateOutcome> {
        self.record(GatewayOp::CreateCategory, glossary_id, Some(&category.slug));
        self.injected(GatewayOp::CreateCategory, Some(&category.slug))?;
        let mut glossaries = self.glossaries.lock().unwrap();
        let glossary = glossaries
            .get_mut(glossary_id.as_str())
            .ok_or_else(|| Self::missing_glossary(glossary_id))?;
        if glossary.categories.contains_key(category.slug.as_str()) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        glossary
            .categories
            .insert(category.slug.to_string(), category.clone());
        Ok(CreateOutcome::Created)
    }

    async fn create_term(
        &self,
        glossary_id: &ResourceSlug,
        term: &NewTerm,
    ) -> GatewayResult<CreateOutcome> {
        self.record(GatewayOp::CreateTerm, glossary_id, Some(&term.slug));
        self.injected(GatewayOp::CreateTerm, Some(&term.slug))?;
        let mut glossaries = self.glossaries.lock().unwrap();
        let glossary = glossaries
            .get_mut(glossary_id.as_str())
            .ok_or_else(|| Self::missing_glossary(glossary_id))?;
        if let Some(parent) = &term.parent_category {
            if !glossary.categories.contains_key(parent.as_str()) {
                return Err(GatewayError::Rejected {
                    status: 400,
                    message: format!("parent category {parent} does not exist"),
                });
            }
        }
        if glossary.terms.contains_key(term.slug.as_str()) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        glossary.terms.insert(term.slug.to_string(), term.clone());
        Ok(CreateOutcome::Created)
    }
}

// ---------------------------------------------------------------------------
// MemoryAuditLog
// ---------------------------------------------------------------------------

/// In-memory audit sink; optionally rejects every write.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    events: Mutex<Vec<AuditEvent>>,
    attempts: Mutex<usize>,
    fail: bool,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every append fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Stored events, oldest first.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Number of append calls, including rejected ones.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn append(&self, event: &AuditEvent) -> AuditResult<()> {
        *self.attempts.lock().unwrap() += 1;
        if self.fail {
            return Err(AuditError::Unavailable("audit store offline".to_string()));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryProposalSink
// ---------------------------------------------------------------------------

/// In-memory proposal sink returning `memory://<entity>/<n>` references.
#[derive(Debug, Default)]
pub struct MemoryProposalSink {
    submitted: Mutex<Vec<(String, String)>>,
}

impl MemoryProposalSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(entity, payload)` pairs in submission order.
    pub fn submitted(&self) -> Vec<(String, String)> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProposalSink for MemoryProposalSink {
    async fn submit(&self, entity: &str, payload: &str) -> SinkResult<String> {
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push((entity.to_string(), payload.to_string()));
        Ok(format!("memory://{}/{}", entity, submitted.len()))
    }
}
