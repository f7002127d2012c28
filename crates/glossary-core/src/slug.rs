//! Identifier normalizer.
//!
//! Turns human-readable labels into catalog-legal resource identifiers:
//! lowercase ASCII letters, digits and single hyphens, never starting or
//! ending with a hyphen, bounded in length.

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Maximum slug length for glossary and category identifiers.
pub const CATEGORY_SLUG_MAX: usize = 63;

/// Maximum slug length for term identifiers.
pub const TERM_SLUG_MAX: usize = 99;

/// Errors produced while deriving a slug.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlugError {
    #[error("invalid label {label:?}: {reason}")]
    InvalidLabel { label: String, reason: &'static str },
}

/// A catalog-legal identifier derived from a label.
///
/// The inner field is private so every value has gone through [`slugify`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ResourceSlug(String);

impl ResourceSlug {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ResourceSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceSlug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ResourceSlug {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let slug = slugify(&raw, raw.len().max(1)).map_err(serde::de::Error::custom)?;
        if slug.as_str() != raw {
            return Err(serde::de::Error::custom(format!(
                "{raw:?} is not a normalized slug"
            )));
        }
        Ok(slug)
    }
}

/// Derive a slug from `label`, truncated to `max_len` characters.
///
/// Accents are folded (NFD, combining marks dropped), whitespace and
/// underscores become hyphens, everything outside `[a-z0-9-]` is removed and
/// hyphen runs collapse to one.
pub fn slugify(label: &str, max_len: usize) -> Result<ResourceSlug, SlugError> {
    if label.trim().is_empty() {
        return Err(SlugError::InvalidLabel {
            label: label.to_string(),
            reason: "label is empty",
        });
    }

    let mut out = String::with_capacity(label.len());
    let mut pending_hyphen = false;

    for c in label.nfd().filter(|c| !is_combining_mark(*c)) {
        let c = c.to_ascii_lowercase();
        let mapped = if c.is_whitespace() || c == '_' || c == '-' {
            Some('-')
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() {
            Some(c)
        } else {
            None
        };

        match mapped {
            Some('-') => pending_hyphen = true,
            Some(c) => {
                if pending_hyphen && !out.is_empty() {
                    out.push('-');
                }
                pending_hyphen = false;
                out.push(c);
            }
            None => {}
        }
    }

    // Output is ASCII, so byte truncation is char-safe.
    if out.len() > max_len {
        out.truncate(max_len);
        while out.ends_with('-') {
            out.pop();
        }
    }

    if out.is_empty() {
        return Err(SlugError::InvalidLabel {
            label: label.to_string(),
            reason: "label has no slug-safe characters",
        });
    }

    Ok(ResourceSlug(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_well_formed(s: &str) -> bool {
        !s.is_empty()
            && !s.starts_with('-')
            && !s.ends_with('-')
            && !s.contains("--")
            && s
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    }

    #[test]
    fn test_basic_label() {
        assert_eq!(
            slugify("Clinical Data!", CATEGORY_SLUG_MAX).unwrap().as_str(),
            "clinical-data"
        );
        assert_eq!(
            slugify("Patient ID", TERM_SLUG_MAX).unwrap().as_str(),
            "patient-id"
        );
    }

    #[test]
    fn test_accent_folding() {
        let slug = slugify("Código Póliza Ñandú", CATEGORY_SLUG_MAX).unwrap();
        assert_eq!(slug.as_str(), "codigo-poliza-nandu");
    }

    #[test]
    fn test_underscores_and_runs_collapse() {
        let slug = slugify("  business__glossary -- v1 ", CATEGORY_SLUG_MAX).unwrap();
        assert_eq!(slug.as_str(), "business-glossary-v1");
    }

    #[test]
    fn test_punctuation_between_words_does_not_join_hyphens() {
        let slug = slugify("Revenue - (Net) / Gross", CATEGORY_SLUG_MAX).unwrap();
        assert_eq!(slug.as_str(), "revenue-net-gross");
    }

    #[test]
    fn test_symbols_only_is_invalid() {
        let err = slugify("!!! ??? ***", CATEGORY_SLUG_MAX).unwrap_err();
        assert!(matches!(err, SlugError::InvalidLabel { .. }));
    }

    #[test]
    fn test_empty_is_invalid() {
        assert!(slugify("", CATEGORY_SLUG_MAX).is_err());
        assert!(slugify("   ", CATEGORY_SLUG_MAX).is_err());
    }

    #[test]
    fn test_truncation_never_leaves_trailing_hyphen() {
        let label = format!("{} tail", "a".repeat(62));
        let slug = slugify(&label, CATEGORY_SLUG_MAX).unwrap();
        assert_eq!(slug.as_str(), "a".repeat(62));
        assert!(is_well_formed(slug.as_str()));
    }

    #[test]
    fn test_length_bounds() {
        let label = "Very Long Label ".repeat(20);
        let cat = slugify(&label, CATEGORY_SLUG_MAX).unwrap();
        let term = slugify(&label, TERM_SLUG_MAX).unwrap();
        assert!(cat.as_str().len() <= CATEGORY_SLUG_MAX);
        assert!(term.as_str().len() <= TERM_SLUG_MAX);
        assert!(is_well_formed(cat.as_str()));
        assert!(is_well_formed(term.as_str()));
    }

    #[test]
    fn test_mixed_inputs_are_well_formed_and_idempotent() {
        let labels = [
            "Clinical Data!",
            "Ünïcödé Straße",
            "_leading and trailing_",
            "Tasa de Interés (TAE) %",
            "ID-de-Cliente",
            "Çà et là — déjà vu",
            "Mixed CASE 123 values",
            "日本語 and ascii",
        ];
        for label in labels {
            let slug = slugify(label, CATEGORY_SLUG_MAX).unwrap();
            assert!(is_well_formed(slug.as_str()), "{label:?} -> {slug}");
            let again = slugify(slug.as_str(), CATEGORY_SLUG_MAX).unwrap();
            assert_eq!(slug, again, "not idempotent for {label:?}");
            assert_eq!(slug, slugify(label, CATEGORY_SLUG_MAX).unwrap());
        }
    }

    #[test]
    fn test_distinct_labels_may_collide() {
        let a = slugify("Clinical Data", CATEGORY_SLUG_MAX).unwrap();
        let b = slugify("clinical_data", CATEGORY_SLUG_MAX).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_deserialize_rejects_unnormalized() {
        let ok: ResourceSlug = serde_json::from_str("\"patient-id\"").unwrap();
        assert_eq!(ok.as_str(), "patient-id");
        assert!(serde_json::from_str::<ResourceSlug>("\"Patient ID\"").is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Labels mixing ASCII, separators, punctuation and accented or
        /// non-Latin letters.
        fn arb_label() -> impl Strategy<Value = String> {
            prop_oneof![
                any::<String>(),
                "[A-Za-z0-9 _.!%&()-]{0,120}",
                "[a-zà-ÿÀ-ß一-龥 _-]{0,80}",
            ]
        }

        proptest! {
            /// Every produced slug is lowercase ASCII alnum with single inner
            /// hyphens and fits the bound.
            #[test]
            fn slugs_are_well_formed_and_bounded(label in arb_label(), max_len in 1usize..=TERM_SLUG_MAX) {
                if let Ok(slug) = slugify(&label, max_len) {
                    prop_assert!(is_well_formed(slug.as_str()), "{:?} -> {:?}", label, slug.as_str());
                    prop_assert!(slug.as_str().len() <= max_len);
                }
            }

            /// Normalizing a slug again changes nothing.
            #[test]
            fn slugify_is_idempotent(label in arb_label(), max_len in 1usize..=TERM_SLUG_MAX) {
                if let Ok(slug) = slugify(&label, max_len) {
                    let again = slugify(slug.as_str(), max_len).unwrap();
                    prop_assert_eq!(slug, again);
                }
            }

            /// A label with any ASCII letter or digit always yields a slug.
            #[test]
            fn alphanumeric_labels_never_fail(
                prefix in arb_label(),
                core in "[a-z0-9]",
                suffix in arb_label(),
            ) {
                let label = format!("{prefix}{core}{suffix}");
                prop_assert!(slugify(&label, CATEGORY_SLUG_MAX).is_ok());
            }
        }
    }
}
