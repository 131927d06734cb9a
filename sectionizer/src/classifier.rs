//! The strategy chain.
//!
//! Strategies run in a fixed order and the chain stops at the first one that
//! produces a candidate:
//!
//! 1. canonical hierarchy (full `form1[..].sectionN[..].leaf[..]` path)
//! 2. explicit markers, group by group in registry order
//! 3. span resolution (`Sections7-9` and the like)
//! 4. content (field value markers, then the label)
//! 5. page range
//!
//! A span that cannot be settled yields no candidate. It narrows strategies 4
//! and 5 to the span's members instead of guessing one of them.

use strum::Display;

use crate::config::{is_valid_section, ClassifyOptions, PageNumber, SectionNumber};
use crate::error::FieldError;
use crate::models::{ClassificationResult, FieldRecord, StrategyKind};
use crate::normalizer::{normalize, normalize_identifier};
use crate::registry::{
    capture_number, capture_subsection, PatternRegistry, SpanRule, SpanVerdict, StrategyClass,
};

/// Multiplier applied to rules matched against a field value.
pub const VALUE_DISCOUNT: f32 = 0.85;
/// Multiplier applied to rules matched against a field label.
pub const LABEL_DISCOUNT: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Strategy {
    CanonicalHierarchy,
    ExplicitMarkers,
    SpanResolution,
    Content,
    PageRange,
}

impl Strategy {
    pub const CHAIN: [Strategy; 5] = [
        Strategy::CanonicalHierarchy,
        Strategy::ExplicitMarkers,
        Strategy::SpanResolution,
        Strategy::Content,
        Strategy::PageRange,
    ];
}

/// Normalized evidence of one record.
struct Evidence {
    identifier: String,
    label: Option<String>,
    page: Option<PageNumber>,
    values: Vec<String>,
}

impl Evidence {
    fn new(identifier: String, record: &FieldRecord) -> Evidence {
        Evidence {
            identifier,
            label: record.label.as_deref().map(normalize).filter(|l| !l.is_empty()),
            page: record.page.filter(|p| *p > 0),
            values: record
                .value
                .as_ref()
                .map(|v| v.texts().into_iter().map(normalize).filter(|t| !t.is_empty()).collect())
                .unwrap_or_default(),
        }
    }
}

struct Candidate {
    result: ClassificationResult,
    trace: String,
}

enum Step<'r> {
    Candidate(Candidate),
    Unresolved(&'r SpanRule),
    Nothing,
}

/// The `Classifier` struct runs the strategy chain against a loaded registry.
///
/// The classifier holds no mutable state, so one instance can serve any number
/// of threads.
#[derive(Debug, Clone, Copy)]
pub struct Classifier<'a> {
    registry: &'a PatternRegistry,
}

impl<'a> Classifier<'a> {
    pub fn new(registry: &'a PatternRegistry) -> Classifier<'a> {
        Classifier { registry }
    }

    pub fn registry(&self) -> &'a PatternRegistry {
        self.registry
    }

    /// Classifies one record.
    ///
    /// # Arguments
    ///
    /// * `record` - The field to classify.
    /// * `options` - Verbosity and confidence floor.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when no strategy produced a candidate, or when the first
    /// candidate falls below `options.min_confidence`.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::MalformedIdentifier`] for empty or punctuation-only identifiers.
    pub fn classify(
        &self,
        record: &FieldRecord,
        options: &ClassifyOptions,
    ) -> Result<Option<ClassificationResult>, FieldError> {
        let identifier = normalize_identifier(&record.identifier)?;
        let evidence = Evidence::new(identifier, record);

        let Some(candidate) = self.run_chain(&evidence) else {
            tracing::trace!("No strategy matched {}", record.identifier);
            return Ok(None);
        };

        let mut result = candidate.result;
        if result.confidence < options.min_confidence {
            tracing::trace!(
                "Dropped {} for {}: confidence {:.3} below {:.3}",
                result.strategy,
                record.identifier,
                result.confidence,
                options.min_confidence
            );
            return Ok(None);
        }
        if options.verbose {
            result.match_trace = Some(candidate.trace);
        }
        return Ok(Some(result));
    }

    fn run_chain(&self, evidence: &Evidence) -> Option<Candidate> {
        let mut span: Option<&SpanRule> = None;

        for strategy in Strategy::CHAIN {
            let step = match strategy {
                Strategy::CanonicalHierarchy => self.canonical(evidence),
                Strategy::ExplicitMarkers => self.markers(evidence),
                Strategy::SpanResolution => self.span(evidence),
                Strategy::Content => self.content(evidence),
                Strategy::PageRange => self.page(evidence),
            };
            match step {
                Step::Candidate(candidate) => {
                    if let Some(rule) = span {
                        if !rule.contains(candidate.result.section) {
                            tracing::trace!(
                                "{} proposed section {} outside {}",
                                strategy,
                                candidate.result.section,
                                rule.description
                            );
                            continue;
                        }
                    }
                    return Some(candidate);
                }
                Step::Unresolved(rule) => span = Some(rule),
                Step::Nothing => {}
            }
        }
        None
    }

    fn canonical(&self, evidence: &Evidence) -> Step<'a> {
        let Some(caps) = self.registry.canonical().captures(&evidence.identifier) else {
            return Step::Nothing;
        };
        let section = match caps.name("section").and_then(|m| m.as_str().parse::<SectionNumber>().ok()) {
            Some(section) if is_valid_section(section) => section,
            _ => return Step::Nothing,
        };
        let entry = capture_number(&caps, "entry").map_or(0, |k| k.saturating_sub(1));
        let result = ClassificationResult::new(
            section,
            self.registry.canonical_confidence(),
            StrategyKind::CanonicalHierarchy,
        )
        .with_subsection(capture_subsection(&caps, "sub"))
        .with_entry(Some(entry))
        .with_sub_entry(capture_number(&caps, "subentry"));

        let leaf = caps.name("leaf").map_or("", |m| m.as_str());
        let trace = format!("canonical hierarchy: section {section} leaf {leaf}");
        Step::Candidate(Candidate { result, trace })
    }

    fn markers(&self, evidence: &Evidence) -> Step<'a> {
        for group in self.registry.groups() {
            if let Some((rule, m)) = group.first_match(&evidence.identifier) {
                let result = ClassificationResult::new(m.section, m.confidence, rule.class.strategy_kind())
                    .with_subsection(m.subsection)
                    .with_entry(m.entry)
                    .with_sub_entry(m.sub_entry);
                let trace = format!("{} rule '{}'", rule.class, rule.description);
                return Step::Candidate(Candidate { result, trace });
            }
        }
        Step::Nothing
    }

    fn span(&self, evidence: &Evidence) -> Step<'a> {
        let Some(rule) = self.registry.spans().iter().find(|s| s.matches(&evidence.identifier)) else {
            return Step::Nothing;
        };
        match rule.resolve(&evidence.identifier, evidence.label.as_deref()) {
            SpanVerdict::Resolved {
                section,
                keyword,
                from_label,
                confidence,
            } => {
                let source = if from_label { "label" } else { "identifier" };
                let trace = format!("span '{}' resolved by {source} keyword '{keyword}'", rule.description);
                let result = ClassificationResult::new(section, confidence, StrategyKind::SpanResolution);
                Step::Candidate(Candidate { result, trace })
            }
            SpanVerdict::Unresolved => {
                tracing::trace!("Span {} unresolved for {}", rule.description, evidence.identifier);
                Step::Unresolved(rule)
            }
        }
    }

    fn content(&self, evidence: &Evidence) -> Step<'a> {
        for value in evidence.values.iter() {
            if let Some((rule, m)) = self.registry.content_rules().first_match(value) {
                let result = ClassificationResult::new(
                    m.section,
                    m.confidence * VALUE_DISCOUNT,
                    StrategyKind::ValueContent,
                )
                .with_subsection(m.subsection)
                .with_entry(m.entry);
                let trace = format!("value matched '{}'", rule.description);
                return Step::Candidate(Candidate { result, trace });
            }
        }

        let label_rules = self.registry.group(StrategyClass::BareSection);
        if let (Some(label), Some(rules)) = (evidence.label.as_deref(), label_rules) {
            if let Some((rule, m)) = rules.first_match(label) {
                let result = ClassificationResult::new(
                    m.section,
                    m.confidence * LABEL_DISCOUNT,
                    StrategyKind::LabelContent,
                );
                let trace = format!("label matched '{}'", rule.description);
                return Step::Candidate(Candidate { result, trace });
            }
        }
        Step::Nothing
    }

    fn page(&self, evidence: &Evidence) -> Step<'a> {
        let Some(page) = evidence.page else {
            return Step::Nothing;
        };
        let sections = self.registry.sections_for_page(page);
        if sections.len() != 1 {
            return Step::Nothing;
        }
        let result = ClassificationResult::new(
            sections[0],
            self.registry.page_confidence(),
            StrategyKind::PageRange,
        );
        let trace = format!("page {page} lies only within section {}", sections[0]);
        Step::Candidate(Candidate { result, trace })
    }
}

/// Builds the canonical identifier of a location.
///
/// The classifier maps the returned identifier back onto the same
/// `(section, subsection, entry)` triple. Subsections are expected to be ASCII
/// alphanumeric; a single letter with an optional digit is written directly after
/// the section number, anything else after an underscore.
///
/// The leaf is the neutral `#field[0]`, so leaf-driven corrections such as the
/// section 16 index bands never fire on it. Container-driven corrections still
/// apply in the pipeline: a section 20 `cont` container is reassigned to section 21.
///
/// # Arguments
///
/// * `section` - Section number.
/// * `subsection` - Optional subsection token.
/// * `entry` - 0-based entry.
pub fn canonical_identifier(section: SectionNumber, subsection: Option<&str>, entry: u32) -> String {
    let sub = match subsection.map(normalize).filter(|s| !s.is_empty()) {
        None => String::new(),
        Some(s) if is_letter_suffix(&s) => s,
        Some(s) => format!("_{s}"),
    };
    let entry = if entry == 0 {
        String::new()
    } else {
        format!("-{}", entry + 1)
    };
    format!("form1[0].section{section}{sub}{entry}[0].#field[0]")
}

fn is_letter_suffix(token: &str) -> bool {
    match token.as_bytes() {
        [letter] => letter.is_ascii_lowercase(),
        [letter, digit] => letter.is_ascii_lowercase() && digit.is_ascii_digit(),
        _ => false,
    }
}
