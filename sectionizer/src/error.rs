//! Error types for the classifier.
//!
//! Two families exist. [`FieldError`] is scoped to one record and never aborts a
//! batch. [`RegistryError`] is raised while loading rule data and is fatal at startup.

use thiserror::Error;

use crate::config::SectionNumber;

/// A failure confined to a single field record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("malformed identifier {identifier:?}: {reason}")]
    MalformedIdentifier { identifier: String, reason: String },
}

impl FieldError {
    pub fn identifier(&self) -> &str {
        match self {
            FieldError::MalformedIdentifier { identifier, .. } => identifier,
        }
    }
}

/// A defect in the rule catalog, detected while the registry is loaded.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("rule {rule:?} has an invalid pattern: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },
    #[error("rule {rule:?} has no {{n}} placeholder and must target exactly one section")]
    MissingTarget { rule: String },
    #[error("rule {rule:?} references unknown section {section}")]
    UnknownSection { rule: String, section: SectionNumber },
    #[error("rule {rule:?} has confidence {confidence} outside (0, 1]")]
    InvalidConfidence { rule: String, confidence: f32 },
    #[error("span rule {rule:?} is invalid: {reason}")]
    InvalidSpan { rule: String, reason: String },
    #[error("page range for section {section} is inverted: {start} > {end}")]
    InvalidPageRange {
        section: SectionNumber,
        start: u16,
        end: u16,
    },
    #[error("correction rule {rule:?} is invalid: {reason}")]
    InvalidCorrection { rule: String, reason: String },
    #[error("failed to parse rule catalog: {0}")]
    Catalog(#[from] serde_json::Error),
}
