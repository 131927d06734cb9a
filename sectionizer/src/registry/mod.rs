//! The pattern registry: compiled, read-only matcher rules.
//!
//! Rules are authored in a [`RuleCatalog`] (built in, or supplied as JSON) and
//! compiled once by [`PatternRegistry::from_catalog`]. The compiled registry is
//! never mutated afterwards, so a single instance can be shared by reference
//! across worker threads.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum::Display;

use crate::config::{is_valid_section, PageNumber, SectionNumber, SECTION_COUNT};
use crate::corrections::CorrectionSpec;
use crate::error::RegistryError;
use crate::models::StrategyKind;

pub mod rules;
pub mod sections;

#[cfg(test)]
mod tests;

/// Placeholder replaced by the section number when a template is expanded.
pub const SECTION_PLACEHOLDER: &str = "{n}";

/// Match-strategy class of a rule.
///
/// The marker classes run in the order of [`StrategyClass::MARKER_ORDER`]. `ContentMarker`
/// rules are only consulted by the content strategy, against field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StrategyClass {
    ExplicitMarker,
    IndexedForm,
    SectionLetter,
    SectionEntry,
    ShortPrefix,
    BareSection,
    ContentMarker,
}

impl StrategyClass {
    pub const MARKER_ORDER: [StrategyClass; 6] = [
        StrategyClass::ExplicitMarker,
        StrategyClass::IndexedForm,
        StrategyClass::SectionLetter,
        StrategyClass::SectionEntry,
        StrategyClass::ShortPrefix,
        StrategyClass::BareSection,
    ];

    pub fn strategy_kind(&self) -> StrategyKind {
        match self {
            StrategyClass::ExplicitMarker => StrategyKind::ExplicitMarker,
            StrategyClass::IndexedForm => StrategyKind::IndexedForm,
            StrategyClass::SectionLetter => StrategyKind::SectionLetter,
            StrategyClass::SectionEntry => StrategyKind::SectionEntry,
            StrategyClass::ShortPrefix => StrategyKind::ShortPrefix,
            StrategyClass::BareSection => StrategyKind::BareSection,
            StrategyClass::ContentMarker => StrategyKind::ValueContent,
        }
    }
}

/// A declarative rule template.
///
/// # Fields
///
/// * `class` - The group the expanded rules belong to.
/// * `pattern` - Regex over normalized text. `{n}` is replaced by each section number in scope.
/// * `sections` - Sections the template expands to. `None` means all sections; a pattern without `{n}` needs exactly one.
/// * `subsection` - Fixed subsection assigned when the pattern has no `sub` group.
/// * `confidence` - Base confidence of the expanded rules.
/// * `description` - Human-readable name, `{n}` is expanded as in `pattern`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub class: StrategyClass,
    pub pattern: String,
    #[serde(default)]
    pub sections: Option<Vec<SectionNumber>>,
    #[serde(default)]
    pub subsection: Option<String>,
    pub confidence: f32,
    pub description: String,
}

/// Keywords that single out one member of a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanKeywords {
    pub section: SectionNumber,
    pub keywords: Vec<String>,
}

/// A container name that declares a span of candidate sections, such as `Sections7-9`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanSpec {
    pub description: String,
    pub pattern: String,
    pub start: SectionNumber,
    pub end: SectionNumber,
    pub keywords: Vec<SpanKeywords>,
    #[serde(default = "default_span_identifier_confidence")]
    pub identifier_confidence: f32,
    #[serde(default = "default_span_label_confidence")]
    pub label_confidence: f32,
}

fn default_span_identifier_confidence() -> f32 {
    0.9
}

fn default_span_label_confidence() -> f32 {
    0.87
}

/// Pages a section is known to occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRangeSpec {
    pub section: SectionNumber,
    pub start: PageNumber,
    pub end: PageNumber,
}

/// A compiled page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRangeRule {
    pub section: SectionNumber,
    pub start: PageNumber,
    pub end: PageNumber,
}

impl PageRangeRule {
    pub fn contains(&self, page: PageNumber) -> bool {
        self.start <= page && page <= self.end
    }
}

/// The complete declarative input of the registry and the correction layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCatalog {
    pub version: String,
    #[serde(default = "rules::default_canonical_pattern")]
    pub canonical: String,
    #[serde(default = "rules::default_canonical_confidence")]
    pub canonical_confidence: f32,
    #[serde(default = "rules::default_page_confidence")]
    pub page_confidence: f32,
    pub rules: Vec<RuleSpec>,
    #[serde(default)]
    pub spans: Vec<SpanSpec>,
    #[serde(default)]
    pub page_ranges: Vec<PageRangeSpec>,
    #[serde(default)]
    pub corrections: Vec<CorrectionSpec>,
}

impl RuleCatalog {
    /// Parses a catalog from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Catalog`] if the document does not describe a catalog.
    pub fn from_json(json: &str) -> Result<RuleCatalog, RegistryError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// What a rule extracted from one piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub section: SectionNumber,
    pub subsection: Option<String>,
    pub entry: Option<u32>,
    pub sub_entry: Option<u32>,
    pub confidence: f32,
}

/// A compiled matcher rule targeting one section.
///
/// Named groups are read as follows: `sub` gives the subsection (leading `_` and
/// separators stripped), `entry` a 1-based entry number stored 0-based, and
/// `subentry` a 0-based container index.
#[derive(Debug, Clone)]
pub struct MatchRule {
    pub pattern: Regex,
    pub class: StrategyClass,
    pub target_section: SectionNumber,
    pub target_subsection: Option<String>,
    pub base_confidence: f32,
    pub description: String,
}

impl MatchRule {
    /// Applies the rule to normalized text.
    pub fn apply(&self, text: &str) -> Option<RuleMatch> {
        let caps = self.pattern.captures(text)?;
        let subsection = capture_subsection(&caps, "sub").or_else(|| self.target_subsection.clone());
        Some(RuleMatch {
            section: self.target_section,
            subsection,
            entry: capture_number(&caps, "entry").map(|n| n.saturating_sub(1)),
            sub_entry: capture_number(&caps, "subentry"),
            confidence: self.base_confidence,
        })
    }
}

/// Cleans a captured subsection token: `_d2` -> `d2`, `a.1` -> `a1`.
pub(crate) fn capture_subsection(caps: &Captures, name: &str) -> Option<String> {
    let raw = caps.name(name)?.as_str();
    let cleaned: String = raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if cleaned.is_empty() {
        return None;
    }
    Some(cleaned)
}

pub(crate) fn capture_number(caps: &Captures, name: &str) -> Option<u32> {
    caps.name(name)?.as_str().parse::<u32>().ok()
}

/// An ordered group of rules sharing a strategy class.
#[derive(Debug, Clone)]
pub struct RuleGroup {
    pub class: StrategyClass,
    pub rules: Vec<MatchRule>,
}

impl RuleGroup {
    /// Returns the first rule of the group matching `text`, in catalog order.
    pub fn first_match(&self, text: &str) -> Option<(&MatchRule, RuleMatch)> {
        self.rules.iter().find_map(|rule| rule.apply(text).map(|m| (rule, m)))
    }
}

/// How a span was settled.
#[derive(Debug, Clone, PartialEq)]
pub enum SpanVerdict {
    Resolved {
        section: SectionNumber,
        keyword: String,
        from_label: bool,
        confidence: f32,
    },
    Unresolved,
}

/// A span keyword compiled to match only at the start of a word.
///
/// Underscores, dots and dashes count as word separators, and the spaces of a
/// phrase also match `_` or `-`, so `home phone` hits `home_phone[0]`. The end of
/// the word is left open so stems such as `naturaliz` keep working.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    pub word: String,
    pattern: Regex,
}

impl KeywordMatcher {
    pub fn new(rule: &str, word: &str) -> Result<KeywordMatcher, RegistryError> {
        let word = word.trim().to_lowercase();
        let phrase: Vec<String> = word.split_whitespace().map(regex::escape).collect();
        let pattern = format!(r"(?:^|[^a-z0-9]){}", phrase.join(r"[\s_\-]+"));
        Ok(KeywordMatcher {
            pattern: compile(rule, &pattern)?,
            word,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// A compiled span rule.
#[derive(Debug, Clone)]
pub struct SpanRule {
    pub description: String,
    pub pattern: Regex,
    pub start: SectionNumber,
    pub end: SectionNumber,
    pub keywords: Vec<(SectionNumber, Vec<KeywordMatcher>)>,
    pub identifier_confidence: f32,
    pub label_confidence: f32,
}

impl SpanRule {
    pub fn matches(&self, identifier: &str) -> bool {
        self.pattern.is_match(identifier)
    }

    pub fn contains(&self, section: SectionNumber) -> bool {
        (self.start..=self.end).contains(&section)
    }

    /// Settles the span from keywords found in the identifier or the label.
    ///
    /// The span resolves only when every keyword hit points at the same member.
    /// Hits on two different members, or no hit at all, leave it unresolved.
    ///
    /// # Arguments
    ///
    /// * `identifier` - The normalized identifier.
    /// * `label` - The normalized label, if any.
    pub fn resolve(&self, identifier: &str, label: Option<&str>) -> SpanVerdict {
        let mut identifier_hits: BTreeSet<SectionNumber> = BTreeSet::new();
        let mut label_hits: BTreeSet<SectionNumber> = BTreeSet::new();
        let mut first_keyword: Option<&str> = None;

        for (section, keywords) in self.keywords.iter() {
            for keyword in keywords {
                let in_identifier = keyword.is_match(identifier);
                let in_label = label.map_or(false, |l| keyword.is_match(l));
                if in_identifier {
                    identifier_hits.insert(*section);
                }
                if in_label {
                    label_hits.insert(*section);
                }
                if (in_identifier || in_label) && first_keyword.is_none() {
                    first_keyword = Some(keyword.word.as_str());
                }
            }
        }

        let hits: BTreeSet<SectionNumber> = identifier_hits.union(&label_hits).copied().collect();
        if hits.len() != 1 {
            return SpanVerdict::Unresolved;
        }
        let section = *hits.iter().next().unwrap_or(&self.start);
        let from_label = identifier_hits.is_empty();
        SpanVerdict::Resolved {
            section,
            keyword: first_keyword.unwrap_or_default().to_string(),
            from_label,
            confidence: if from_label {
                self.label_confidence
            } else {
                self.identifier_confidence
            },
        }
    }
}

/// The `PatternRegistry` struct holds every compiled rule the strategy chain consults.
///
/// # Fields
///
/// * `version` - Catalog version the registry was built from.
/// * `canonical` - Pattern of the fully-structured hierarchical path.
/// * `groups` - Marker rule groups in priority order.
/// * `content_rules` - Rules applied to field values.
/// * `spans` - Span declarations and their keywords.
/// * `page_ranges` - Known page ranges per section.
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    version: String,
    canonical: Regex,
    canonical_confidence: f32,
    page_confidence: f32,
    groups: Vec<RuleGroup>,
    content_rules: RuleGroup,
    spans: Vec<SpanRule>,
    page_ranges: Vec<PageRangeRule>,
}

impl PatternRegistry {
    /// Compiles the built-in catalog.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if the built-in catalog is defective.
    pub fn load() -> Result<PatternRegistry, RegistryError> {
        PatternRegistry::from_catalog(&RuleCatalog::builtin())
    }

    /// Validates and compiles a catalog.
    ///
    /// # Errors
    ///
    /// Any pattern that fails to compile, section outside `1..=30`, confidence
    /// outside `(0, 1]`, malformed span or inverted page range is fatal.
    pub fn from_catalog(catalog: &RuleCatalog) -> Result<PatternRegistry, RegistryError> {
        check_confidence("canonical hierarchy", catalog.canonical_confidence)?;
        check_confidence("page range", catalog.page_confidence)?;
        let canonical = compile("canonical hierarchy", &catalog.canonical)?;

        let mut groups: Vec<RuleGroup> = StrategyClass::MARKER_ORDER
            .iter()
            .map(|class| RuleGroup {
                class: *class,
                rules: Vec::new(),
            })
            .collect();
        let mut content_rules = RuleGroup {
            class: StrategyClass::ContentMarker,
            rules: Vec::new(),
        };

        for spec in catalog.rules.iter() {
            let expanded = expand_rule(spec)?;
            if spec.class == StrategyClass::ContentMarker {
                content_rules.rules.extend(expanded);
            } else if let Some(group) = groups.iter_mut().find(|g| g.class == spec.class) {
                group.rules.extend(expanded);
            }
        }

        let spans = catalog.spans.iter().map(compile_span).collect::<Result<Vec<_>, _>>()?;

        for range in catalog.page_ranges.iter() {
            if !is_valid_section(range.section) {
                return Err(RegistryError::UnknownSection {
                    rule: format!("page range {}-{}", range.start, range.end),
                    section: range.section,
                });
            }
            if range.start > range.end {
                return Err(RegistryError::InvalidPageRange {
                    section: range.section,
                    start: range.start,
                    end: range.end,
                });
            }
        }

        let registry = PatternRegistry {
            version: catalog.version.clone(),
            canonical,
            canonical_confidence: catalog.canonical_confidence,
            page_confidence: catalog.page_confidence,
            groups,
            content_rules,
            spans,
            page_ranges: catalog
                .page_ranges
                .iter()
                .map(|range| PageRangeRule {
                    section: range.section,
                    start: range.start,
                    end: range.end,
                })
                .collect(),
        };
        tracing::debug!(
            "Loaded pattern registry {} ({} marker rules, {} content rules, {} spans, {} page ranges)",
            registry.version,
            registry.rule_count(),
            registry.content_rules.rules.len(),
            registry.spans.len(),
            registry.page_ranges.len()
        );
        return Ok(registry);
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn canonical(&self) -> &Regex {
        &self.canonical
    }

    pub fn canonical_confidence(&self) -> f32 {
        self.canonical_confidence
    }

    pub fn page_confidence(&self) -> f32 {
        self.page_confidence
    }

    /// Marker groups in priority order.
    pub fn groups(&self) -> &[RuleGroup] {
        &self.groups
    }

    pub fn group(&self, class: StrategyClass) -> Option<&RuleGroup> {
        if class == StrategyClass::ContentMarker {
            return Some(&self.content_rules);
        }
        self.groups.iter().find(|g| g.class == class)
    }

    pub fn content_rules(&self) -> &RuleGroup {
        &self.content_rules
    }

    pub fn spans(&self) -> &[SpanRule] {
        &self.spans
    }

    pub fn page_ranges(&self) -> &[PageRangeRule] {
        &self.page_ranges
    }

    /// Number of expanded marker rules.
    pub fn rule_count(&self) -> usize {
        self.groups.iter().map(|g| g.rules.len()).sum()
    }

    /// Returns every section whose known page range contains `page`, ascending.
    pub fn sections_for_page(&self, page: PageNumber) -> Vec<SectionNumber> {
        let sections: BTreeSet<SectionNumber> = self
            .page_ranges
            .iter()
            .filter(|range| range.contains(page))
            .map(|range| range.section)
            .collect();
        sections.into_iter().collect()
    }
}

fn check_confidence(rule: &str, confidence: f32) -> Result<(), RegistryError> {
    if !(confidence > 0.0 && confidence <= 1.0) {
        return Err(RegistryError::InvalidConfidence {
            rule: rule.to_string(),
            confidence,
        });
    }
    Ok(())
}

pub(crate) fn compile(rule: &str, pattern: &str) -> Result<Regex, RegistryError> {
    Regex::new(pattern).map_err(|source| RegistryError::InvalidPattern {
        rule: rule.to_string(),
        source,
    })
}

fn expand_rule(spec: &RuleSpec) -> Result<Vec<MatchRule>, RegistryError> {
    check_confidence(&spec.description, spec.confidence)?;
    let is_template = spec.pattern.contains(SECTION_PLACEHOLDER);

    let sections: Vec<SectionNumber> = match (&spec.sections, is_template) {
        (Some(sections), _) => sections.clone(),
        (None, true) => (1..=SECTION_COUNT).collect(),
        (None, false) => Vec::new(),
    };
    if !is_template && sections.len() != 1 {
        return Err(RegistryError::MissingTarget {
            rule: spec.description.clone(),
        });
    }

    let mut rules = Vec::with_capacity(sections.len());
    for section in sections {
        if !is_valid_section(section) {
            return Err(RegistryError::UnknownSection {
                rule: spec.description.clone(),
                section,
            });
        }
        let n = section.to_string();
        let description = spec.description.replace(SECTION_PLACEHOLDER, &n);
        let pattern = compile(&description, &spec.pattern.replace(SECTION_PLACEHOLDER, &n))?;
        rules.push(MatchRule {
            pattern,
            class: spec.class,
            target_section: section,
            target_subsection: spec.subsection.as_ref().map(|s| s.to_lowercase()),
            base_confidence: spec.confidence,
            description,
        });
    }
    Ok(rules)
}

fn compile_span(spec: &SpanSpec) -> Result<SpanRule, RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidSpan {
        rule: spec.description.clone(),
        reason,
    };
    if !is_valid_section(spec.start) || !is_valid_section(spec.end) {
        return Err(invalid(format!("bounds {}-{} are not sections", spec.start, spec.end)));
    }
    if spec.start >= spec.end {
        return Err(invalid(format!("bounds {}-{} do not form a span", spec.start, spec.end)));
    }
    check_confidence(&spec.description, spec.identifier_confidence)?;
    check_confidence(&spec.description, spec.label_confidence)?;

    let mut keywords = Vec::with_capacity(spec.keywords.len());
    for entry in spec.keywords.iter() {
        if !(spec.start..=spec.end).contains(&entry.section) {
            return Err(invalid(format!(
                "keyword section {} is outside {}-{}",
                entry.section, spec.start, spec.end
            )));
        }
        let compiled = entry
            .keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| KeywordMatcher::new(&spec.description, k))
            .collect::<Result<Vec<KeywordMatcher>, RegistryError>>()?;
        keywords.push((entry.section, compiled));
    }

    Ok(SpanRule {
        description: spec.description.clone(),
        pattern: compile(&spec.description, &spec.pattern)?,
        start: spec.start,
        end: spec.end,
        keywords,
        identifier_confidence: spec.identifier_confidence,
        label_confidence: spec.label_confidence,
    })
}
