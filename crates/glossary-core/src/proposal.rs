//! Proposal model: the categories and terms suggested upstream.
//!
//! Parsing is lenient. Missing top-level keys become empty lists, optional
//! fields take defaults and unknown fields are ignored. Only a wrong
//! top-level shape is rejected. Parent references are kept as raw strings;
//! resolving them is the reconciler's job.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Errors produced by [`parse_proposal`].
#[derive(Debug, thiserror::Error)]
pub enum ProposalError {
    #[error("malformed proposal: {0}")]
    Malformed(String),
}

/// Data sensitivity classification of a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sensitivity {
    Public,
    #[default]
    Internal,
    Confidential,
    Restricted,
}

impl Sensitivity {
    /// Case-insensitive parse; anything unrecognised yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PUBLIC" => Some(Sensitivity::Public),
            "INTERNAL" => Some(Sensitivity::Internal),
            "CONFIDENTIAL" => Some(Sensitivity::Confidential),
            "RESTRICTED" => Some(Sensitivity::Restricted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sensitivity::Public => "PUBLIC",
            Sensitivity::Internal => "INTERNAL",
            Sensitivity::Confidential => "CONFIDENTIAL",
            Sensitivity::Restricted => "RESTRICTED",
        }
    }
}

impl std::fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A grouping node inside the glossary.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Category {
    /// Author-supplied identifier; may contain any characters.
    pub original_id: String,
    pub display_name: String,
    pub description: String,
    pub labels: BTreeMap<String, String>,
}

/// A glossary entry with a business definition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Term {
    pub term_name: String,
    pub definition: String,
    pub synonyms: Vec<String>,
    pub stewards: Vec<String>,
    pub sensitivity: Sensitivity,
    pub domain: String,
    /// A category `display_name` or raw `original_id`.
    pub parent_category_ref: Option<String>,
    pub labels: BTreeMap<String, String>,
}

/// Root document: the desired state of one glossary.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Proposal {
    pub categories: Vec<Category>,
    pub terms: Vec<Term>,
}

impl Proposal {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.terms.is_empty()
    }

    /// SHA-256 hex digest of the proposal's canonical JSON form.
    pub fn digest(&self) -> String {
        // Struct fields and BTreeMap keys serialize in a fixed order.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }
}

/// Remove a surrounding Markdown code fence, if present.
///
/// Handles both ```` ```json ```` and bare ```` ``` ```` openers.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string on the opening line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Parse a proposal document.
pub fn parse_proposal(raw: &str) -> Result<Proposal, ProposalError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ProposalError::Malformed(format!("invalid JSON: {e}")))?;
    proposal_from_value(&value)
}

/// Parse an already-decoded JSON value.
pub fn proposal_from_value(value: &Value) -> Result<Proposal, ProposalError> {
    let mut root = value
        .as_object()
        .ok_or_else(|| ProposalError::Malformed("top level must be an object".to_string()))?;

    // `{"glossary": {...}}` wrapper emitted by older generator runs.
    if !root.contains_key("categories") && !root.contains_key("terms") {
        if let Some(inner) = root.get("glossary").and_then(Value::as_object) {
            root = inner;
        }
    }

    let mut proposal = Proposal::default();
    let mut nested_terms = Vec::new();

    for (idx, entry) in array_field(root, "categories")?.iter().enumerate() {
        let obj = entry.as_object().ok_or_else(|| {
            ProposalError::Malformed(format!("categories[{idx}] must be an object"))
        })?;
        let category = category_from_object(obj);

        if let Some(children) = obj.get("terms") {
            let children = children.as_array().ok_or_else(|| {
                ProposalError::Malformed(format!("categories[{idx}].terms must be an array"))
            })?;
            for (child_idx, child) in children.iter().enumerate() {
                let child = child.as_object().ok_or_else(|| {
                    ProposalError::Malformed(format!(
                        "categories[{idx}].terms[{child_idx}] must be an object"
                    ))
                })?;
                let mut term = term_from_object(child);
                if term.parent_category_ref.is_none() {
                    term.parent_category_ref = Some(category.original_id.clone());
                }
                nested_terms.push(term);
            }
        }

        proposal.categories.push(category);
    }

    let terms_key = if root.contains_key("terms") {
        "terms"
    } else {
        "glossary_terms"
    };
    for (idx, entry) in array_field(root, terms_key)?.iter().enumerate() {
        let obj = entry.as_object().ok_or_else(|| {
            ProposalError::Malformed(format!("{terms_key}[{idx}] must be an object"))
        })?;
        proposal.terms.push(term_from_object(obj));
    }
    proposal.terms.extend(nested_terms);

    Ok(proposal)
}

fn array_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a [Value], ProposalError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(ProposalError::Malformed(format!("`{key}` must be an array"))),
    }
}

fn category_from_object(obj: &Map<String, Value>) -> Category {
    let original_id = string_field(obj, &["id", "original_id"]);
    let display_name = string_field(obj, &["display_name", "name"]);
    Category {
        original_id: if original_id.is_empty() {
            display_name.clone()
        } else {
            original_id.clone()
        },
        display_name: if display_name.is_empty() {
            original_id
        } else {
            display_name
        },
        description: string_field(obj, &["description", "overview"]),
        labels: labels_field(obj),
    }
}

fn term_from_object(obj: &Map<String, Value>) -> Term {
    let sensitivity = string_field(obj, &["data_sensitivity_level", "sensitivity"]);
    let parent = string_field(obj, &["parent_category", "parent_category_ref"]);
    Term {
        term_name: string_field(obj, &["term", "term_name", "name"]),
        definition: string_field(obj, &["definition", "description"]),
        synonyms: list_field(obj, "synonyms"),
        stewards: list_field(obj, "stewards"),
        sensitivity: Sensitivity::parse(&sensitivity).unwrap_or_default(),
        domain: string_field(obj, &["domain"]),
        parent_category_ref: (!parent.is_empty()).then_some(parent),
        labels: labels_field(obj),
    }
}

/// First present key wins; scalars are stringified, anything else is "".
pub(crate) fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(scalar_to_string))
        .unwrap_or_default()
}

pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn list_field(obj: &Map<String, Value>, key: &str) -> Vec<String> {
    match obj.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(scalar_to_string)
            .filter(|s| !s.is_empty())
            .collect(),
        Some(other) => scalar_to_string(other)
            .filter(|s| !s.is_empty())
            .into_iter()
            .collect(),
        None => Vec::new(),
    }
}

pub(crate) fn labels_field(obj: &Map<String, Value>) -> BTreeMap<String, String> {
    obj.get("labels")
        .and_then(Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, v)| scalar_to_string(v).map(|v| (k.clone(), v)))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_example() {
        let raw = r#"{"categories":[{"id":"Clinical Data!","display_name":"Clinical Data"}],
                      "terms":[{"term":"Patient ID","parent_category":"Clinical Data"}]}"#;
        let proposal = parse_proposal(raw).unwrap();

        assert_eq!(proposal.categories.len(), 1);
        assert_eq!(proposal.categories[0].original_id, "Clinical Data!");
        assert_eq!(proposal.categories[0].description, "");
        assert!(proposal.categories[0].labels.is_empty());
        assert_eq!(proposal.terms[0].term_name, "Patient ID");
        assert_eq!(
            proposal.terms[0].parent_category_ref.as_deref(),
            Some("Clinical Data")
        );
        assert_eq!(proposal.terms[0].sensitivity, Sensitivity::Internal);
    }

    #[test]
    fn test_missing_keys_default_to_empty() {
        let proposal = parse_proposal("{}").unwrap();
        assert!(proposal.is_empty());

        let proposal = parse_proposal(r#"{"terms": null, "extra": 42}"#).unwrap();
        assert!(proposal.is_empty());
    }

    #[test]
    fn test_wrong_top_level_shape_is_malformed() {
        assert!(matches!(
            parse_proposal("[]"),
            Err(ProposalError::Malformed(_))
        ));
        assert!(matches!(
            parse_proposal(r#"{"categories": {"id": "x"}}"#),
            Err(ProposalError::Malformed(_))
        ));
        assert!(matches!(
            parse_proposal(r#"{"terms": ["just a string"]}"#),
            Err(ProposalError::Malformed(_))
        ));
        assert!(matches!(
            parse_proposal("not json"),
            Err(ProposalError::Malformed(_))
        ));
    }

    #[test]
    fn test_term_fields_and_aliases() {
        let raw = r#"{"glossary_terms":[{
            "term": "Prima Neta",
            "definition": "Importe de la prima sin impuestos",
            "synonyms": ["Net Premium", 7],
            "stewards": "Finance Office",
            "data_sensitivity_level": "confidential",
            "domain": "Finanzas",
            "labels": {"source": "docs", "version": 2},
            "unknown": {"ignored": true}
        }]}"#;
        let proposal = parse_proposal(raw).unwrap();
        let term = &proposal.terms[0];

        assert_eq!(term.synonyms, vec!["Net Premium", "7"]);
        assert_eq!(term.stewards, vec!["Finance Office"]);
        assert_eq!(term.sensitivity, Sensitivity::Confidential);
        assert_eq!(term.domain, "Finanzas");
        assert_eq!(term.labels.get("version").map(String::as_str), Some("2"));
        assert!(term.parent_category_ref.is_none());
    }

    #[test]
    fn test_unknown_sensitivity_defaults_to_internal() {
        let proposal =
            parse_proposal(r#"{"terms":[{"term":"X","data_sensitivity_level":"SECRET"}]}"#)
                .unwrap();
        assert_eq!(proposal.terms[0].sensitivity, Sensitivity::Internal);
    }

    #[test]
    fn test_nested_glossary_shape_is_flattened() {
        let raw = r#"{"glossary": {"categories": [
            {"id": "finance", "display_name": "Finance", "overview": "Money things",
             "terms": [{"term": "Net Premium"}, {"term": "Tax", "parent_category": "Other"}]}
        ], "terms": [{"term": "Top Level"}]}}"#;
        let proposal = parse_proposal(raw).unwrap();

        assert_eq!(proposal.categories[0].description, "Money things");
        let names: Vec<_> = proposal.terms.iter().map(|t| t.term_name.as_str()).collect();
        assert_eq!(names, vec!["Top Level", "Net Premium", "Tax"]);
        assert_eq!(proposal.terms[1].parent_category_ref.as_deref(), Some("finance"));
        assert_eq!(proposal.terms[2].parent_category_ref.as_deref(), Some("Other"));
    }

    #[test]
    fn test_category_id_and_name_fall_back_to_each_other() {
        let proposal = parse_proposal(
            r#"{"categories":[{"id":"claims"},{"display_name":"Policies"}]}"#,
        )
        .unwrap();
        assert_eq!(proposal.categories[0].display_name, "claims");
        assert_eq!(proposal.categories[1].original_id, "Policies");
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  ```\n{}\n```  \n"), "{}");
        assert_eq!(strip_code_fences("{\"plain\":true}"), "{\"plain\":true}");
        assert_eq!(strip_code_fences("```json{}```"), "{}");
    }

    #[test]
    fn test_digest_is_stable() {
        let raw = r#"{"categories":[{"id":"a"}],"terms":[{"term":"b"}]}"#;
        let a = parse_proposal(raw).unwrap();
        let b = parse_proposal(raw).unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
        assert_ne!(a.digest(), Proposal::default().digest());
    }
}
