//! Change-proposal sink.
//!
//! Suggestions are not published directly: they are handed to a sink that
//! puts them up for human review and returns a reference (a path, a URL).
//! The approved artifact later comes back as the publish input.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::slug::{slugify, ResourceSlug, SlugError, TERM_SLUG_MAX};

/// Result type for sink operations
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Errors raised by proposal sinks.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("proposal sink I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid entity name: {0}")]
    InvalidEntity(#[from] SlugError),
}

/// Destination for reviewed change proposals.
#[async_trait]
pub trait ProposalSink: Send + Sync {
    /// Submit `payload` (a JSON document) for review under `entity`,
    /// returning a reference to the created proposal.
    async fn submit(&self, entity: &str, payload: &str) -> SinkResult<String>;
}

/// Writes each proposal as `<dir>/<entity>_metadata_v<unix-ts>.json`.
///
/// Existing files are never overwritten; a taken name gets a `_<n>` suffix.
#[derive(Debug, Clone)]
pub struct DirectoryProposalSink {
    dir: PathBuf,
}

impl DirectoryProposalSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Link the staged payload to the first free versioned name.
    async fn place(&self, entity: &ResourceSlug, staged: &Path) -> SinkResult<String> {
        let ts = chrono::Utc::now().timestamp();
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{entity}_metadata_v{ts}.json")
            } else {
                format!("{entity}_metadata_v{ts}_{attempt}.json")
            };
            let path = self.dir.join(name);

            match tokio::fs::hard_link(staged, &path).await {
                Ok(()) => {
                    info!(path = %path.display(), "Proposal written for review");
                    return Ok(path.display().to_string());
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "Proposal file taken, trying next suffix");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl ProposalSink for DirectoryProposalSink {
    async fn submit(&self, entity: &str, payload: &str) -> SinkResult<String> {
        let entity = slugify(entity, TERM_SLUG_MAX)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Staged outside the `.json` namespace and linked into place, so a
        // failed write never leaves a partial proposal behind.
        let staged = self
            .dir
            .join(format!(".{entity}.{}.partial", uuid::Uuid::new_v4()));
        let placed = match tokio::fs::write(&staged, payload).await {
            Ok(()) => self.place(&entity, &staged).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = tokio::fs::remove_file(&staged).await {
            debug!(path = %staged.display(), error = %e, "Staged proposal not removed");
        }
        placed
    }
}

/// Most recently modified `.json` file in `dir`, if any.
pub fn latest_proposal_file(dir: &Path) -> SinkResult<Option<PathBuf>> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") || !path.is_file() {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        // Ties resolve by name so the choice is deterministic.
        let newer = match &newest {
            None => true,
            Some((t, p)) => modified > *t || (modified == *t && path > *p),
        };
        if newer {
            newest = Some((modified, path));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_directory_sink_writes_payload() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectoryProposalSink::new(dir.path().join("output"));

        let reference = sink.submit("Claims Table", "{\"terms\":[]}").await.unwrap();

        assert!(reference.contains("claims-table_metadata_v"));
        let written = std::fs::read_to_string(&reference).unwrap();
        assert_eq!(written, "{\"terms\":[]}");
    }

    #[tokio::test]
    async fn test_directory_sink_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectoryProposalSink::new(dir.path());

        let a = sink.submit("claims", "{\"v\":1}").await.unwrap();
        let b = sink.submit("claims", "{\"v\":2}").await.unwrap();

        assert_ne!(a, b);
        assert_eq!(std::fs::read_to_string(&a).unwrap(), "{\"v\":1}");
        assert_eq!(std::fs::read_to_string(&b).unwrap(), "{\"v\":2}");
    }

    #[tokio::test]
    async fn test_directory_sink_leaves_only_the_proposal() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectoryProposalSink::new(dir.path());

        sink.submit("claims", "{\"terms\":[]}").await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1, "{names:?}");
        assert!(names[0].ends_with(".json"));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_json() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the review directory should be.
        let blocked = dir.path().join("output");
        std::fs::write(&blocked, "not a directory").unwrap();
        let sink = DirectoryProposalSink::new(&blocked);

        assert!(matches!(
            sink.submit("claims", "{}").await,
            Err(SinkError::Io(_))
        ));
        assert!(latest_proposal_file(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_partial_files_are_never_selected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".claims.1234.partial"), "{\"ter").unwrap();
        assert!(latest_proposal_file(dir.path()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_directory_sink_rejects_unusable_entity() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectoryProposalSink::new(dir.path());
        let err = sink.submit("???", "{}").await.unwrap_err();
        assert!(matches!(err, SinkError::InvalidEntity(_)));
    }

    #[test]
    fn test_latest_proposal_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(latest_proposal_file(dir.path()).unwrap().is_none());

        let old = dir.path().join("a.json");
        let new = dir.path().join("b.json");
        std::fs::write(&old, "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::write(&new, "{}").unwrap();

        let past = SystemTime::now() - std::time::Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(past)
            .unwrap();

        assert_eq!(latest_proposal_file(dir.path()).unwrap(), Some(new));
    }
}
