//! Reconciler: converts a [`Proposal`] into the catalog's glossary tree.
//!
//! A run is a single sequential pass:
//!
//! 0. plan: derive every slug and resolve term parents locally
//! 1. wipe the existing glossary (soft failure unless permission denied)
//! 2. recreate the glossary container; if the wipe failed and the glossary
//!    is still there, the run aborts instead of publishing into it
//! 3. create categories in input order
//! 4. create terms in input order
//! 5. tally
//! 6. write exactly one audit event, then return
//!
//! `AlreadyExists` from the gateway is an idempotent skip that still counts.
//! Any other gateway error aborts the run; nothing is retried. Re-running
//! the same proposal is safe because step 1 discards partial state.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, Instrument};

use crate::audit::{AuditRecorder, AuditStatus};
use crate::config::PublisherConfig;
use crate::gateway::{
    CatalogGateway, CreateOutcome, DeleteOutcome, GatewayError, NewCategory, NewTerm,
};
use crate::obs;
use crate::proposal::Proposal;
use crate::slug::{slugify, ResourceSlug, SlugError, CATEGORY_SLUG_MAX, TERM_SLUG_MAX};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStage {
    Plan,
    Wipe,
    CreateGlossary,
    Categories,
    Terms,
}

impl PublishStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStage::Plan => "plan",
            PublishStage::Wipe => "wipe",
            PublishStage::CreateGlossary => "create_glossary",
            PublishStage::Categories => "categories",
            PublishStage::Terms => "terms",
        }
    }
}

impl std::fmt::Display for PublishStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal errors of a publish run.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    InvalidLabel(#[from] SlugError),

    #[error("{stage} stage failed: {source}")]
    Gateway {
        stage: PublishStage,
        #[source]
        source: GatewayError,
    },

    /// The wipe failed and the glossary still exists, so publishing would
    /// leave earlier content in place.
    #[error("existing glossary could not be removed: {source}")]
    StaleGlossary {
        #[source]
        source: GatewayError,
    },
}

impl PublishError {
    pub fn stage(&self) -> PublishStage {
        match self {
            PublishError::InvalidLabel(_) => PublishStage::Plan,
            PublishError::Gateway { stage, .. } => *stage,
            PublishError::StaleGlossary { .. } => PublishStage::Wipe,
        }
    }

    fn gateway(stage: PublishStage) -> impl FnOnce(GatewayError) -> Self {
        move |source| PublishError::Gateway { stage, source }
    }
}

/// Counts for a publish run. Skipped resources are included in the counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishSummary {
    pub glossary_id: String,
    pub categories_count: usize,
    pub terms_count: usize,
    pub categories_skipped: usize,
    pub terms_skipped: usize,
    /// Terms published without a parent category.
    pub root_terms: usize,
    /// Categories whose slug repeats an earlier category's slug.
    pub duplicate_category_slugs: usize,
}

/// A failed run: the error plus what was published before it.
#[derive(Debug, thiserror::Error)]
#[error("publishing glossary {} failed: {}", .partial.glossary_id, .error)]
pub struct PublishFailure {
    pub partial: PublishSummary,
    #[source]
    pub error: PublishError,
}

/// A category ready to be sent to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCategory {
    pub original_id: String,
    pub request: NewCategory,
    /// An earlier category already claimed this slug.
    pub duplicate: bool,
}

/// A term ready to be sent to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTerm {
    pub parent_ref: Option<String>,
    pub request: NewTerm,
}

impl PlannedTerm {
    /// The term named a parent that matched no category.
    pub fn parent_unresolved(&self) -> bool {
        self.parent_ref.is_some() && self.request.parent_category.is_none()
    }
}

/// Every identifier of a run, derived before any remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPlan {
    pub glossary_id: ResourceSlug,
    pub categories: Vec<PlannedCategory>,
    pub terms: Vec<PlannedTerm>,
}

impl PublishPlan {
    /// Derive slugs and resolve parents.
    ///
    /// Parent references are looked up by category `display_name` first,
    /// then by raw `original_id`; for repeated keys the first category wins.
    pub fn build(config: &PublisherConfig, proposal: &Proposal) -> Result<Self, SlugError> {
        let glossary_id = slugify(&config.glossary_id, CATEGORY_SLUG_MAX)?;

        let mut by_name: HashMap<&str, ResourceSlug> = HashMap::new();
        let mut by_id: HashMap<&str, ResourceSlug> = HashMap::new();
        let mut seen: HashSet<ResourceSlug> = HashSet::new();
        let mut categories = Vec::with_capacity(proposal.categories.len());

        for category in &proposal.categories {
            let slug = slugify(&category.original_id, CATEGORY_SLUG_MAX)?;
            by_id
                .entry(category.original_id.as_str())
                .or_insert_with(|| slug.clone());
            by_name
                .entry(category.display_name.as_str())
                .or_insert_with(|| slug.clone());

            let duplicate = !seen.insert(slug.clone());
            if duplicate {
                obs::emit_duplicate_category_slug(&category.original_id, slug.as_str());
            }

            let labels = catalog_labels(slug.as_str(), &category.labels);
            categories.push(PlannedCategory {
                original_id: category.original_id.clone(),
                request: NewCategory {
                    slug,
                    display_name: category.display_name.clone(),
                    description: category.description.clone(),
                    labels,
                },
                duplicate,
            });
        }

        let mut terms = Vec::with_capacity(proposal.terms.len());
        for term in &proposal.terms {
            let slug = slugify(&term.term_name, TERM_SLUG_MAX)?;
            let parent_category = term
                .parent_category_ref
                .as_deref()
                .and_then(|r| by_name.get(r).or_else(|| by_id.get(r)).cloned());
            if let (Some(r), None) = (&term.parent_category_ref, &parent_category) {
                obs::emit_unresolved_parent(slug.as_str(), r);
            }

            let mut labels = catalog_labels(slug.as_str(), &term.labels);
            set_derived_label(
                slug.as_str(),
                &mut labels,
                "sensitivity",
                term.sensitivity.as_str().to_ascii_lowercase(),
            );
            if let Ok(domain) = slugify(&term.domain, CATEGORY_SLUG_MAX) {
                set_derived_label(slug.as_str(), &mut labels, "domain", domain.into_string());
            }

            terms.push(PlannedTerm {
                parent_ref: term.parent_category_ref.clone(),
                request: NewTerm {
                    slug,
                    display_name: term.term_name.clone(),
                    description: term.definition.clone(),
                    parent_category,
                    labels,
                },
            });
        }

        Ok(PublishPlan {
            glossary_id,
            categories,
            terms,
        })
    }

    pub fn duplicate_category_slugs(&self) -> usize {
        self.categories.iter().filter(|c| c.duplicate).count()
    }

    pub fn root_terms(&self) -> usize {
        self.terms
            .iter()
            .filter(|t| t.request.parent_category.is_none())
            .count()
    }
}

/// Catalog labels allow only lowercase letters, digits, `-` and `_`.
///
/// Keys that normalize to nothing are dropped; such values become empty.
/// When two keys normalize to the same label, the first in key order is
/// kept and the other is reported.
fn catalog_labels(owner: &str, labels: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut normalized = BTreeMap::new();
    for (key, value) in labels {
        let Ok(slug) = slugify(key, CATEGORY_SLUG_MAX) else {
            continue;
        };
        let value = slugify(value, CATEGORY_SLUG_MAX)
            .map(ResourceSlug::into_string)
            .unwrap_or_default();
        match normalized.entry(slug.into_string()) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(taken) => obs::emit_label_key_collision(owner, taken.key(), key),
        }
    }
    normalized
}

/// Set a label derived from term fields; it replaces an authored label of
/// the same key.
fn set_derived_label(owner: &str, labels: &mut BTreeMap<String, String>, key: &str, value: String) {
    if labels.insert(key.to_string(), value).is_some() {
        obs::emit_label_key_collision(owner, key, key);
    }
}

/// Publishes proposals through a [`CatalogGateway`], auditing every run.
pub struct Reconciler {
    gateway: Arc<dyn CatalogGateway>,
    audit: AuditRecorder,
    config: PublisherConfig,
}

impl Reconciler {
    pub fn new(
        gateway: Arc<dyn CatalogGateway>,
        audit: AuditRecorder,
        config: PublisherConfig,
    ) -> Self {
        Self {
            gateway,
            audit,
            config,
        }
    }

    /// Replace the configured glossary with the content of `proposal`.
    ///
    /// `source` names where the proposal came from and is recorded in the
    /// audit event. The audit event is written before this returns, on both
    /// success and failure.
    pub async fn publish(
        &self,
        proposal: &Proposal,
        source: Option<&str>,
    ) -> Result<PublishSummary, PublishFailure> {
        let span = obs::publish_span(&self.config.glossary_id);
        self.publish_inner(proposal, source).instrument(span).await
    }

    async fn publish_inner(
        &self,
        proposal: &Proposal,
        source: Option<&str>,
    ) -> Result<PublishSummary, PublishFailure> {
        let started = Instant::now();
        let mut summary = PublishSummary {
            glossary_id: self.config.glossary_id.clone(),
            ..Default::default()
        };
        obs::emit_publish_started(
            &self.config.glossary_id,
            proposal.categories.len(),
            proposal.terms.len(),
        );

        let outcome = self.run(proposal, &mut summary).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut details = json!({
            "source": source,
            "proposal_digest": proposal.digest(),
            "categories_count": summary.categories_count,
            "terms_count": summary.terms_count,
            "categories_skipped": summary.categories_skipped,
            "terms_skipped": summary.terms_skipped,
            "root_terms": summary.root_terms,
            "duplicate_category_slugs": summary.duplicate_category_slugs,
            "duration_ms": duration_ms,
            "publisher_version": crate::VERSION,
        });

        match outcome {
            Ok(()) => {
                self.audit
                    .log_event(
                        AuditStatus::ApprovedAndPublished,
                        &self.config.actor,
                        &summary.glossary_id,
                        details,
                    )
                    .await;
                obs::emit_publish_finished(
                    &summary.glossary_id,
                    summary.categories_count,
                    summary.terms_count,
                    duration_ms,
                );
                Ok(summary)
            }
            Err(error) => {
                obs::emit_publish_failed(&summary.glossary_id, error.stage().as_str(), &error);
                details["error"] = json!(error.to_string());
                details["stage"] = json!(error.stage());
                self.audit
                    .log_event(
                        AuditStatus::Failed,
                        &self.config.actor,
                        &summary.glossary_id,
                        details,
                    )
                    .await;
                Err(PublishFailure {
                    partial: summary,
                    error,
                })
            }
        }
    }

    async fn run(
        &self,
        proposal: &Proposal,
        summary: &mut PublishSummary,
    ) -> Result<(), PublishError> {
        let plan = PublishPlan::build(&self.config, proposal)?;
        let glossary_id = &plan.glossary_id;
        summary.glossary_id = glossary_id.to_string();
        summary.duplicate_category_slugs = plan.duplicate_category_slugs();
        summary.root_terms = plan.root_terms();

        let mut wipe_error = None;
        match self.gateway.ensure_glossary_absent(glossary_id).await {
            Ok(DeleteOutcome::Deleted) => info!("Existing glossary {} deleted", glossary_id),
            Ok(DeleteOutcome::NotFound) => debug!("Glossary {} not present", glossary_id),
            Err(e) if e.is_permission() => {
                return Err(PublishError::Gateway {
                    stage: PublishStage::Wipe,
                    source: e,
                });
            }
            Err(e) => {
                obs::emit_wipe_soft_failure(glossary_id.as_str(), &e);
                wipe_error = Some(e);
            }
        }

        let outcome = self
            .gateway
            .create_glossary(
                glossary_id,
                &self.config.glossary_display_name,
                &self.config.glossary_description,
            )
            .await
            .map_err(PublishError::gateway(PublishStage::CreateGlossary))?;
        match outcome {
            CreateOutcome::Created => info!("Glossary {} created", glossary_id),
            CreateOutcome::AlreadyExists => match wipe_error {
                // Old categories and terms would shadow the new ones.
                Some(source) => return Err(PublishError::StaleGlossary { source }),
                None => obs::emit_already_exists("glossary", glossary_id.as_str()),
            },
        }

        for category in &plan.categories {
            let outcome = self
                .gateway
                .create_category(glossary_id, &category.request)
                .await
                .map_err(PublishError::gateway(PublishStage::Categories))?;
            summary.categories_count += 1;
            if outcome == CreateOutcome::AlreadyExists {
                summary.categories_skipped += 1;
                obs::emit_already_exists("category", category.request.slug.as_str());
            }
        }
        obs::emit_stage_completed(
            PublishStage::Categories.as_str(),
            summary.categories_count - summary.categories_skipped,
            summary.categories_skipped,
        );

        for term in &plan.terms {
            let outcome = self
                .gateway
                .create_term(glossary_id, &term.request)
                .await
                .map_err(PublishError::gateway(PublishStage::Terms))?;
            summary.terms_count += 1;
            if outcome == CreateOutcome::AlreadyExists {
                summary.terms_skipped += 1;
                obs::emit_already_exists("term", term.request.slug.as_str());
            }
        }
        obs::emit_stage_completed(
            PublishStage::Terms.as_str(),
            summary.terms_count - summary.terms_skipped,
            summary.terms_skipped,
        );

        Ok(())
    }
}
