//! Glossary Publisher CLI
//!
//! The `glossary` command moves glossary suggestions through review and
//! into the catalog.
//!
//! ## Commands
//!
//! - `propose`: clean up a generated suggestion and submit it for review
//! - `validate`: parse a proposal and show what it would publish or annotate
//! - `publish`: reconcile an approved proposal into the catalog
//! - `slugify`: show the identifier derived from a label

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use catalog_client::{CatalogConfig, HttpCatalogGateway, DEFAULT_ENDPOINT};
use glossary_core::fakes::MemoryCatalogGateway;
use glossary_core::{
    latest_proposal_file, parse_metadata_proposal, parse_proposal, slugify, strip_code_fences,
    AuditRecorder, CatalogGateway, DirectoryProposalSink, JsonlAuditLog, MetadataProposal,
    Proposal, ProposalSink, PublishPlan, PublishSummary, PublisherConfig, Reconciler,
    CATEGORY_SLUG_MAX, DEFAULT_GLOSSARY_ID,
};

#[derive(Parser)]
#[command(name = "glossary")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Propose and publish business glossaries", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Strip Markdown fences from a generated suggestion, check it parses,
    /// and submit it for review
    Propose {
        /// Suggestion file, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Entity the suggestion is about (table or glossary name)
        #[arg(short, long)]
        entity: String,

        /// Review directory the proposal is written to
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// What the suggestion describes
        #[arg(long, value_enum, default_value_t = ProposalKind::Glossary)]
        kind: ProposalKind,
    },

    /// Parse a proposal and print the plan without contacting the catalog
    Validate {
        #[command(flatten)]
        source: SourceArgs,

        /// What the proposal describes
        #[arg(long, value_enum, default_value_t = ProposalKind::Glossary)]
        kind: ProposalKind,

        #[command(flatten)]
        glossary: GlossaryArgs,
    },

    /// Publish an approved proposal to the catalog
    Publish {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        glossary: GlossaryArgs,

        #[command(flatten)]
        catalog: CatalogArgs,

        /// Approver recorded in the audit trail
        #[arg(long, env = "GITHUB_ACTOR", default_value = "unknown_user")]
        actor: String,

        /// JSON Lines audit log
        #[arg(long, env = "GLOSSARY_AUDIT_LOG", default_value = ".glossary/audit.jsonl")]
        audit_log: PathBuf,

        /// Publish into an in-memory catalog instead of the real one
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the identifier derived from a label
    Slugify {
        label: String,

        /// Maximum identifier length
        #[arg(long, default_value_t = CATEGORY_SLUG_MAX)]
        max_len: usize,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ProposalKind {
    /// Categories and terms for the business glossary
    Glossary,
    /// Corrections to a table's catalog metadata
    Metadata,
}

#[derive(clap::Args)]
struct SourceArgs {
    /// Proposal file to read
    #[arg(short, long, conflicts_with = "latest_in")]
    file: Option<PathBuf>,

    /// Use the newest `.json` proposal in this directory
    #[arg(long)]
    latest_in: Option<PathBuf>,
}

#[derive(clap::Args)]
struct GlossaryArgs {
    /// Glossary identifier (normalized before use)
    #[arg(long, env = "GLOSSARY_ID", default_value = DEFAULT_GLOSSARY_ID)]
    glossary_id: String,

    /// Glossary display name
    #[arg(long, default_value = "Business Glossary")]
    display_name: String,

    /// Glossary description
    #[arg(long, default_value = "Corporate Business Glossary")]
    description: String,
}

#[derive(clap::Args)]
struct CatalogArgs {
    /// Catalog project
    #[arg(long, env = "GCP_PROJECT_ID")]
    project: Option<String>,

    /// Catalog location
    #[arg(long, env = "GCP_LOCATION", default_value = "us")]
    location: String,

    /// Catalog REST endpoint
    #[arg(long, env = "CATALOG_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Bearer token for the catalog
    #[arg(long, env = "CATALOG_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    glossary_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Propose {
            input,
            entity,
            output_dir,
            kind,
        } => {
            let sink = DirectoryProposalSink::new(output_dir);
            cmd_propose(&input, &entity, kind, &sink).await
        }
        Commands::Validate {
            source,
            kind,
            glossary,
        } => match kind {
            ProposalKind::Glossary => cmd_validate(&source, &glossary),
            ProposalKind::Metadata => cmd_validate_metadata(&source),
        },
        Commands::Publish {
            source,
            glossary,
            catalog,
            actor,
            audit_log,
            dry_run,
        } => cmd_publish(&source, &glossary, &catalog, &actor, &audit_log, dry_run).await,
        Commands::Slugify { label, max_len } => {
            let slug = slugify(&label, max_len)?;
            println!("{slug}");
            Ok(())
        }
    }
}

async fn cmd_propose(
    input: &Path,
    entity: &str,
    kind: ProposalKind,
    sink: &dyn ProposalSink,
) -> Result<()> {
    let raw = if input == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("Failed to read suggestion from stdin")?
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read suggestion {}", input.display()))?
    };

    let payload = strip_code_fences(&raw);
    let tally = match kind {
        ProposalKind::Glossary => {
            let proposal = parse_proposal(payload).context("Suggestion is not a valid proposal")?;
            if proposal.is_empty() {
                bail!("Suggestion contains no categories or terms");
            }
            format!(
                "{} categories, {} terms",
                proposal.categories.len(),
                proposal.terms.len()
            )
        }
        ProposalKind::Metadata => {
            let proposal = parse_metadata_proposal(payload)
                .context("Suggestion is not a valid metadata proposal")?;
            if proposal.is_empty() {
                bail!("Suggestion contains no metadata changes");
            }
            format!(
                "{} field updates, {} missing fields, quality {}",
                proposal.metadata_update.len(),
                proposal.missing_fields.len(),
                proposal.data_quality_flag
            )
        }
    };

    let reference = sink.submit(entity, payload).await?;

    println!("Proposal submitted for review: {reference}");
    println!("  {tally}");
    Ok(())
}

fn cmd_validate(source: &SourceArgs, glossary: &GlossaryArgs) -> Result<()> {
    let (path, proposal) = load_proposal(source)?;
    let config = publisher_config(glossary, "", "", "");
    let plan = PublishPlan::build(&config, &proposal)
        .with_context(|| format!("Proposal {} has an unusable label", path.display()))?;

    println!("Proposal: {}", path.display());
    println!("Glossary: {}", plan.glossary_id);
    println!("Categories ({}):", plan.categories.len());
    for category in &plan.categories {
        let marker = if category.duplicate { "  [duplicate, will be skipped]" } else { "" };
        println!(
            "  {} <- {:?}{}",
            category.request.slug, category.original_id, marker
        );
    }
    println!("Terms ({}):", plan.terms.len());
    for term in &plan.terms {
        let parent = match (&term.request.parent_category, &term.parent_ref) {
            (Some(slug), _) => slug.to_string(),
            (None, Some(r)) => format!("(root; {r:?} not found)"),
            (None, None) => "(root)".to_string(),
        };
        println!("  {} -> {}", term.request.slug, parent);
    }
    Ok(())
}

fn cmd_validate_metadata(source: &SourceArgs) -> Result<()> {
    let (path, raw) = read_source(source)?;
    let proposal: MetadataProposal = parse_metadata_proposal(strip_code_fences(&raw))
        .with_context(|| format!("Failed to parse metadata proposal {}", path.display()))?;

    println!("Proposal: {}", path.display());
    println!("Business domain: {}", proposal.business_domain);
    println!("Data quality: {}", proposal.data_quality_flag);
    println!("Field updates ({}):", proposal.metadata_update.len());
    for update in &proposal.metadata_update {
        let field = if update.field.is_empty() { "(table)" } else { &update.field };
        println!("  {field}: {}", update.description);
    }
    println!("Missing fields ({}):", proposal.missing_fields.len());
    for field in &proposal.missing_fields {
        println!("  {field}");
    }
    Ok(())
}

async fn cmd_publish(
    source: &SourceArgs,
    glossary: &GlossaryArgs,
    catalog: &CatalogArgs,
    actor: &str,
    audit_log: &Path,
    dry_run: bool,
) -> Result<()> {
    let (path, proposal) = load_proposal(source)?;
    info!("Processing proposal {}", path.display());

    let project = catalog.project.clone().unwrap_or_default();
    let config = publisher_config(glossary, &project, &catalog.location, actor);

    let gateway: Arc<dyn CatalogGateway> = if dry_run {
        info!("Dry run: publishing into an in-memory catalog");
        Arc::new(MemoryCatalogGateway::new())
    } else {
        if project.is_empty() {
            bail!("--project (or GCP_PROJECT_ID) is required unless --dry-run is set");
        }
        let mut catalog_config = CatalogConfig::new(&catalog.endpoint, &project, &catalog.location)
            .with_timeout(catalog.timeout_secs);
        if let Some(token) = &catalog.token {
            catalog_config = catalog_config.with_token(token);
        }
        Arc::new(HttpCatalogGateway::new(catalog_config)?)
    };

    let audit = AuditRecorder::new(Arc::new(JsonlAuditLog::new(audit_log)));
    let reconciler = Reconciler::new(gateway, audit, config);

    let source_name = path.display().to_string();
    match reconciler.publish(&proposal, Some(&source_name)).await {
        Ok(summary) => {
            print_summary("Glossary published", &summary);
            Ok(())
        }
        Err(failure) => {
            print_summary("Publish failed after", &failure.partial);
            Err(failure.into())
        }
    }
}

fn read_source(source: &SourceArgs) -> Result<(PathBuf, String)> {
    let path = match (&source.file, &source.latest_in) {
        (Some(file), _) => file.clone(),
        (None, Some(dir)) => latest_proposal_file(dir)
            .with_context(|| format!("Failed to scan {}", dir.display()))?
            .with_context(|| format!("No proposal JSON files found in {}", dir.display()))?,
        (None, None) => bail!("Either --file or --latest-in is required"),
    };

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read proposal {}", path.display()))?;
    Ok((path, raw))
}

fn load_proposal(source: &SourceArgs) -> Result<(PathBuf, Proposal)> {
    let (path, raw) = read_source(source)?;
    let proposal = parse_proposal(strip_code_fences(&raw))
        .with_context(|| format!("Failed to parse proposal {}", path.display()))?;
    Ok((path, proposal))
}

fn publisher_config(
    glossary: &GlossaryArgs,
    project: &str,
    location: &str,
    actor: &str,
) -> PublisherConfig {
    PublisherConfig::new(project, location)
        .with_glossary(&glossary.glossary_id, &glossary.display_name)
        .with_description(&glossary.description)
        .with_actor(actor)
}

#[derive(Serialize)]
struct SummaryLine<'a> {
    headline: &'a str,
    #[serde(flatten)]
    summary: &'a PublishSummary,
}

fn print_summary(headline: &str, summary: &PublishSummary) {
    println!(
        "{}: {} categories, {} terms in glossary {}",
        headline, summary.categories_count, summary.terms_count, summary.glossary_id
    );
    if summary.categories_skipped + summary.terms_skipped > 0 {
        println!(
            "  skipped as already existing: {} categories, {} terms",
            summary.categories_skipped, summary.terms_skipped
        );
    }
    if summary.duplicate_category_slugs > 0 {
        println!(
            "  warning: {} categories share an identifier with an earlier category",
            summary.duplicate_category_slugs
        );
    }
    if summary.root_terms > 0 {
        println!("  {} terms published without a category", summary.root_terms);
    }
    if let Ok(line) = serde_json::to_string(&SummaryLine { headline, summary }) {
        tracing::debug!(summary = %line, "publish summary");
    }
}
