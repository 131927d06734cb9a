use serde::{Deserialize, Serialize};
use strum::Display;

use crate::config::{PageNumber, SectionNumber};
use crate::error::FieldError;

/// The value a field carried when it was extracted.
///
/// Extraction dumps store plain strings, checkbox states and multi-select lists
/// under the same key, so the union is untagged on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Returns the text fragments held by the value, in order.
    ///
    /// `Flag` carries no text and yields an empty vector.
    pub fn texts(&self) -> Vec<&str> {
        match self {
            FieldValue::Flag(_) => Vec::new(),
            FieldValue::Text(text) => vec![text.as_str()],
            FieldValue::List(items) => items.iter().map(|item| item.as_str()).collect(),
        }
    }
}

/// The `FieldRecord` struct represents one field produced by the document extraction step.
///
/// # Fields
///
/// * `identifier` - The raw hierarchical field name, e.g. `form1[0].Sections7-9[0].TextField11[1]`.
/// * `label` - The tooltip or caption text attached to the field, if any.
/// * `page` - The 1-based page the field sits on, if known.
/// * `value` - The value found in the document, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRecord {
    #[serde(alias = "name")]
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<PageNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
}

impl FieldRecord {
    pub fn new(identifier: &str) -> FieldRecord {
        FieldRecord {
            identifier: identifier.to_string(),
            label: None,
            page: None,
            value: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> FieldRecord {
        self.label = Some(label.to_string());
        return self;
    }

    pub fn with_page(mut self, page: PageNumber) -> FieldRecord {
        self.page = Some(page);
        return self;
    }

    pub fn with_value(mut self, value: FieldValue) -> FieldRecord {
        self.value = Some(value);
        return self;
    }
}

/// Which strategy of the chain produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StrategyKind {
    CanonicalHierarchy,
    ExplicitMarker,
    IndexedForm,
    SectionLetter,
    SectionEntry,
    ShortPrefix,
    BareSection,
    SpanResolution,
    ValueContent,
    LabelContent,
    PageRange,
}

/// The `ClassificationResult` struct is the location a field was assigned to.
///
/// A result always names a real section with a positive confidence. The absence
/// of a classification is expressed as `None` by the classifier, never as a
/// zero-confidence result.
///
/// # Fields
///
/// * `section` - Section number in `1..=30`.
/// * `subsection` - Letter, digit or compound token such as `"d2"`.
/// * `entry` - 0-based position within a repeating group.
/// * `sub_entry` - 0-based position within the entry.
/// * `confidence` - Reliability score in `(0, 1]`.
/// * `strategy` - The strategy that produced the result.
/// * `match_trace` - Diagnostic description of the rule that fired, verbose mode only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub section: SectionNumber,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_entry: Option<u32>,
    pub confidence: f32,
    pub strategy: StrategyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_trace: Option<String>,
}

impl ClassificationResult {
    pub fn new(section: SectionNumber, confidence: f32, strategy: StrategyKind) -> ClassificationResult {
        ClassificationResult {
            section,
            subsection: None,
            entry: None,
            sub_entry: None,
            confidence,
            strategy,
            match_trace: None,
        }
    }

    pub fn with_subsection(mut self, subsection: Option<String>) -> ClassificationResult {
        self.subsection = subsection;
        return self;
    }

    pub fn with_entry(mut self, entry: Option<u32>) -> ClassificationResult {
        self.entry = entry;
        return self;
    }

    pub fn with_sub_entry(mut self, sub_entry: Option<u32>) -> ClassificationResult {
        self.sub_entry = sub_entry;
        return self;
    }

    /// Returns the `(section, subsection, entry)` address of the result.
    pub fn address(&self) -> (SectionNumber, Option<&str>, Option<u32>) {
        (self.section, self.subsection.as_deref(), self.entry)
    }

    /// Compares two results ignoring the diagnostic trace.
    pub fn same_decision(&self, other: &ClassificationResult) -> bool {
        self.section == other.section
            && self.subsection == other.subsection
            && self.entry == other.entry
            && self.sub_entry == other.sub_entry
            && self.confidence.to_bits() == other.confidence.to_bits()
            && self.strategy == other.strategy
    }
}

/// The outcome of running one record through the pipeline.
///
/// `Ok(None)` means no strategy produced enough evidence. `Err` means the record
/// was rejected at the normalizer boundary. Neither aborts the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldOutcome {
    pub record: FieldRecord,
    pub result: Result<Option<ClassificationResult>, FieldError>,
}

impl FieldOutcome {
    pub fn classification(&self) -> Option<&ClassificationResult> {
        match &self.result {
            Ok(Some(result)) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&FieldError> {
        self.result.as_ref().err()
    }

    pub fn is_classified(&self) -> bool {
        self.classification().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_untagged_deserialization() {
        let text: FieldValue = serde_json::from_str(r#""sect13A.1Entry1SupervisorName""#).unwrap();
        let flag: FieldValue = serde_json::from_str("true").unwrap();
        let list: FieldValue = serde_json::from_str(r#"["a", "b"]"#).unwrap();

        assert_eq!(text, FieldValue::Text("sect13A.1Entry1SupervisorName".to_string()));
        assert_eq!(flag, FieldValue::Flag(true));
        assert_eq!(list, FieldValue::List(vec!["a".to_string(), "b".to_string()]));
        assert!(flag.texts().is_empty());
        assert_eq!(list.texts(), vec!["a", "b"]);
    }

    #[test]
    fn test_field_record_accepts_name_alias() {
        let json = r#"{"name": "form1[0].Section11[0].TextField11[0]", "label": "Street", "page": 12}"#;
        let record: FieldRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.identifier, "form1[0].Section11[0].TextField11[0]");
        assert_eq!(record.label.as_deref(), Some("Street"));
        assert_eq!(record.page, Some(12));
        assert_eq!(record.value, None);
    }

    #[test]
    fn test_result_serialization_skips_empty_fields() {
        let result = ClassificationResult::new(21, 0.95, StrategyKind::SectionLetter)
            .with_subsection(Some("a".to_string()));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["section"], 21);
        assert_eq!(json["subsection"], "a");
        assert_eq!(json["strategy"], "section_letter");
        assert!(json.get("entry").is_none());
        assert!(json.get("match_trace").is_none());
    }

    #[test]
    fn test_same_decision_ignores_trace() {
        let a = ClassificationResult::new(8, 0.9, StrategyKind::SpanResolution);
        let mut b = a.clone();
        b.match_trace = Some("span sections7-9".to_string());
        assert!(a.same_decision(&b));
        assert_ne!(a, b);
    }
}
