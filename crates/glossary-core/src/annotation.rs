//! Metadata annotation proposals.
//!
//! Besides glossaries, the upstream generator reviews a table's existing
//! catalog metadata against its documentation and suggests corrections:
//! improved field descriptions, fields the documentation mentions but the
//! schema lacks, an inferred business domain and a consistency flag.
//! These go through the same review sink as glossary proposals; they are
//! never published by the reconciler.
//!
//! Parsing follows the glossary rules: missing keys become empty, unknown
//! keys are ignored and only a wrong top-level shape is rejected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::proposal::{labels_field, list_field, scalar_to_string, string_field, ProposalError};

/// Whether the documentation and the current schema agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityFlag {
    /// Consistent.
    Green,
    /// Serious contradictions found.
    Red,
    #[default]
    Unknown,
}

impl QualityFlag {
    /// Case-insensitive; anything other than RED/GREEN is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "GREEN" => QualityFlag::Green,
            "RED" => QualityFlag::Red,
            _ => QualityFlag::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityFlag::Green => "GREEN",
            QualityFlag::Red => "RED",
            QualityFlag::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A suggested improvement to one field's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetadataUpdate {
    /// Column or field the update applies to; empty for table-level notes.
    pub field: String,
    pub description: String,
    /// Any further scalar attributes the generator suggested.
    pub attributes: BTreeMap<String, String>,
}

/// Suggested corrections to a table's catalog metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetadataProposal {
    pub metadata_update: Vec<MetadataUpdate>,
    pub missing_fields: Vec<String>,
    pub business_domain: String,
    pub data_quality_flag: QualityFlag,
}

impl MetadataProposal {
    /// True when the proposal suggests nothing at all.
    pub fn is_empty(&self) -> bool {
        self.metadata_update.is_empty()
            && self.missing_fields.is_empty()
            && self.business_domain.is_empty()
            && self.data_quality_flag == QualityFlag::Unknown
    }
}

const FIELD_KEYS: &[&str] = &["field", "field_name", "column", "name"];
const DESCRIPTION_KEYS: &[&str] = &["description", "suggested_description", "definition"];

/// Parse a metadata annotation document.
pub fn parse_metadata_proposal(raw: &str) -> Result<MetadataProposal, ProposalError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ProposalError::Malformed(format!("invalid JSON: {e}")))?;
    let root = value
        .as_object()
        .ok_or_else(|| ProposalError::Malformed("top level must be an object".to_string()))?;

    let metadata_update = match root.get("metadata_update") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter_map(update_from_value).collect(),
        // A single object or a bare sentence.
        Some(other) => update_from_value(other).into_iter().collect(),
    };

    Ok(MetadataProposal {
        metadata_update,
        missing_fields: list_field(root, "missing_fields"),
        business_domain: string_field(root, &["business_domain", "domain"]),
        data_quality_flag: QualityFlag::parse(&string_field(root, &["data_quality_flag"])),
    })
}

fn update_from_value(value: &Value) -> Option<MetadataUpdate> {
    match value {
        Value::Object(obj) => Some(update_from_object(obj)),
        other => scalar_to_string(other)
            .filter(|s| !s.is_empty())
            .map(|description| MetadataUpdate {
                description,
                ..MetadataUpdate::default()
            }),
    }
}

fn update_from_object(obj: &Map<String, Value>) -> MetadataUpdate {
    let mut attributes = labels_field(obj);
    for (key, value) in obj {
        if FIELD_KEYS.contains(&key.as_str()) || DESCRIPTION_KEYS.contains(&key.as_str()) {
            continue;
        }
        if let Some(value) = scalar_to_string(value) {
            attributes.entry(key.clone()).or_insert(value);
        }
    }
    MetadataUpdate {
        field: string_field(obj, FIELD_KEYS),
        description: string_field(obj, DESCRIPTION_KEYS),
        attributes,
    }
}
