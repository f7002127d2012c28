//! Audit trail of publish attempts.
//!
//! Every publish run appends exactly one [`AuditEvent`]. Events are never
//! mutated or removed. [`AuditRecorder`] wraps a sink and swallows sink
//! failures so that a broken audit store cannot mask the publish outcome.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::obs;

/// Result type for audit sink operations
pub type AuditResult<T> = std::result::Result<T, AuditError>;

/// Errors raised by audit sinks.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit log I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Outcome recorded for a publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    ApprovedAndPublished,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::ApprovedAndPublished => "APPROVED_AND_PUBLISHED",
            AuditStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub status: AuditStatus,
    pub actor: String,
    pub glossary_id: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Durable destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append an event. Implementations must not reorder or rewrite
    /// earlier events.
    async fn append(&self, event: &AuditEvent) -> AuditResult<()>;
}

/// Appends events as JSON lines to a local file.
#[derive(Debug, Clone)]
pub struct JsonlAuditLog {
    path: PathBuf,
}

impl JsonlAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read every event back, oldest first.
    pub async fn read_all(&self) -> AuditResult<Vec<AuditEvent>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(AuditError::from))
            .collect()
    }
}

#[async_trait]
impl AuditSink for JsonlAuditLog {
    async fn append(&self, event: &AuditEvent) -> AuditResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Builds audit events and hands them to a sink without ever failing.
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Record one publish attempt.
    ///
    /// Returns the event that was built, whether or not the sink accepted it.
    pub async fn log_event(
        &self,
        status: AuditStatus,
        actor: &str,
        glossary_id: &str,
        details: serde_json::Value,
    ) -> AuditEvent {
        let event = AuditEvent {
            event_id: Uuid::new_v4(),
            status,
            actor: actor.to_string(),
            glossary_id: glossary_id.to_string(),
            details,
            timestamp: Utc::now(),
        };

        match self.sink.append(&event).await {
            Ok(()) => obs::emit_audit_recorded(&event),
            Err(e) => obs::emit_audit_write_error(&event, &e),
        }

        event
    }
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryAuditLog;

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&AuditStatus::ApprovedAndPublished).unwrap();
        assert_eq!(json, "\"APPROVED_AND_PUBLISHED\"");
        assert_eq!(AuditStatus::Failed.to_string(), "FAILED");
    }

    #[tokio::test]
    async fn test_jsonl_log_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlAuditLog::new(dir.path().join("audit").join("events.jsonl"));
        let recorder = AuditRecorder::new(Arc::new(log.clone()));

        recorder
            .log_event(
                AuditStatus::Failed,
                "alice",
                "business-glossary-v1",
                serde_json::json!({"error": "boom"}),
            )
            .await;
        recorder
            .log_event(
                AuditStatus::ApprovedAndPublished,
                "bob",
                "business-glossary-v1",
                serde_json::json!({"terms_count": 3}),
            )
            .await;

        let events = log.read_all().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status, AuditStatus::Failed);
        assert_eq!(events[0].actor, "alice");
        assert_eq!(events[1].details["terms_count"], 3);
        assert!(events[0].timestamp <= events[1].timestamp);
    }

    #[tokio::test]
    async fn test_read_all_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlAuditLog::new(dir.path().join("nope.jsonl"));
        assert!(log.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let sink = Arc::new(MemoryAuditLog::failing());
        let recorder = AuditRecorder::new(sink.clone());

        let event = recorder
            .log_event(
                AuditStatus::Failed,
                "ci",
                "g",
                serde_json::json!({"error": "original"}),
            )
            .await;

        assert_eq!(event.status, AuditStatus::Failed);
        assert!(sink.events().is_empty());
        assert_eq!(sink.attempts(), 1);
    }
}
