//! Groups classified fields into a per-section structural report.
//!
//! Aggregation is a sequential reduction over the outcomes of a batch. Every
//! collection in the report is ordered: sections by number, subsections by name
//! and field identifiers lexicographically. Confidence sums are taken in that
//! order too, so the report does not depend on the order the outcomes arrive in.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strum::Display;

use crate::config::{PageNumber, ReportConfig, SectionNumber};
use crate::models::{ClassificationResult, FieldOutcome, StrategyKind};
use crate::normalizer::normalize;
use crate::registry::sections::{expectation, section_name};

/// How a subsection boundary was established.
///
/// Variants are declared strongest first, so `Ord` ranks `Known` lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
pub enum MappingStatus {
    /// Carried by a high-confidence result and present in the section's taxonomy.
    Known,
    /// Carried by a high-confidence result but absent from the taxonomy.
    Detected,
    /// Derived from container tokens shared by otherwise unassigned fields.
    Inferred,
}

/// Leaf widget family, read from the last path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FieldType {
    TextField,
    RadioButtonList,
    CheckBox,
    DropDownList,
    State,
    Date,
    Other,
}

impl FieldType {
    pub fn from_identifier(identifier: &str) -> FieldType {
        let normalized = normalize(identifier);
        let leaf = normalized.rsplit('.').next().unwrap_or_default();
        let leaf = leaf.split('[').next().unwrap_or_default();

        if leaf.contains("radiobuttonlist") {
            return FieldType::RadioButtonList;
        }
        if leaf.contains("checkbox") {
            return FieldType::CheckBox;
        }
        if leaf.contains("dropdownlist") {
            return FieldType::DropDownList;
        }
        if leaf == "state" || leaf.ends_with("_state") {
            return FieldType::State;
        }
        if leaf.contains("date") {
            return FieldType::Date;
        }
        if leaf.contains("textfield") {
            return FieldType::TextField;
        }
        return FieldType::Other;
    }
}

/// One classified field as it appears in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedField {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_entry: Option<u32>,
    pub confidence: f32,
    pub strategy: StrategyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<PageNumber>,
}

impl ClassifiedField {
    fn new(identifier: &str, result: &ClassificationResult, page: Option<PageNumber>) -> ClassifiedField {
        ClassifiedField {
            identifier: identifier.to_string(),
            subsection: result.subsection.clone(),
            entry: result.entry,
            sub_entry: result.sub_entry,
            confidence: result.confidence,
            strategy: result.strategy,
            page,
        }
    }

    fn sort_key(&self) -> (&str, Option<&str>, Option<u32>, Option<u32>, u32, Option<PageNumber>) {
        (
            self.identifier.as_str(),
            self.subsection.as_deref(),
            self.entry,
            self.sub_entry,
            self.confidence.to_bits(),
            self.page,
        )
    }
}

/// The `SubsectionReport` struct describes one subsection of a section.
///
/// # Fields
///
/// * `name` - Subsection token, or the shared container token for inferred subsections.
/// * `status` - How the boundary was established.
/// * `fields` - Sorted identifiers of the member fields.
/// * `pages` - Pages touched by the member fields, ascending.
/// * `page_range` - `(min, max)` of `pages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsectionReport {
    pub name: String,
    pub status: MappingStatus,
    pub fields: Vec<String>,
    pub pages: Vec<PageNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_range: Option<(PageNumber, PageNumber)>,
}

/// The `SectionReport` struct is the structural summary of one section.
///
/// # Fields
///
/// * `section` - Section number.
/// * `name` - Display name.
/// * `field_count` - Number of classified fields.
/// * `expected_fields` - Expected count from the structure table.
/// * `deviation` - `(field_count - expected) / expected`.
/// * `anomalous` - `|deviation|` exceeds the configured tolerance.
/// * `mean_confidence` - Mean confidence of the section's fields.
/// * `pages` - Pages touched, ascending.
/// * `page_range` - `(min, max)` of `pages`.
/// * `pages_out_of_range` - Pages outside the expected page range.
/// * `entries` - Distinct entry positions seen.
/// * `field_types` - Leaf widget distribution.
/// * `subsections` - Subsections ordered by name.
/// * `unassigned` - Sorted identifiers that belong to no subsection.
/// * `fields` - Every classified field, sorted by identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionReport {
    pub section: SectionNumber,
    pub name: String,
    pub field_count: usize,
    pub expected_fields: usize,
    pub deviation: f32,
    pub anomalous: bool,
    pub mean_confidence: f32,
    pub pages: Vec<PageNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_range: Option<(PageNumber, PageNumber)>,
    pub pages_out_of_range: Vec<PageNumber>,
    pub entries: Vec<u32>,
    pub field_types: BTreeMap<FieldType, usize>,
    pub subsections: Vec<SubsectionReport>,
    pub unassigned: Vec<String>,
    pub fields: Vec<ClassifiedField>,
}

impl SectionReport {
    pub fn subsection(&self, name: &str) -> Option<&SubsectionReport> {
        self.subsections.iter().find(|s| s.name == name)
    }
}

/// The `StructureReport` struct is the aggregator's output for a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureReport {
    pub total_fields: usize,
    pub sections: BTreeMap<SectionNumber, SectionReport>,
    pub unclassified: Vec<String>,
    pub malformed: Vec<String>,
}

impl StructureReport {
    pub fn classified_fields(&self) -> usize {
        self.sections.values().map(|s| s.field_count).sum()
    }

    pub fn section(&self, section: SectionNumber) -> Option<&SectionReport> {
        self.sections.get(&section)
    }
}

/// Aggregates classification outcomes into a structural report.
///
/// # Arguments
///
/// * `outcomes` - Per-record outcomes in any order.
/// * `config` - Thresholds for subsection detection and anomaly flags.
///
/// # Returns
///
/// The structural report. An empty input yields an empty report.
pub fn aggregate(outcomes: &[FieldOutcome], config: &ReportConfig) -> StructureReport {
    let mut grouped: BTreeMap<SectionNumber, Vec<ClassifiedField>> = BTreeMap::new();
    let mut unclassified: Vec<String> = Vec::new();
    let mut malformed: Vec<String> = Vec::new();

    for outcome in outcomes.iter() {
        match &outcome.result {
            Ok(Some(result)) => grouped
                .entry(result.section)
                .or_default()
                .push(ClassifiedField::new(&outcome.record.identifier, result, outcome.record.page)),
            Ok(None) => unclassified.push(outcome.record.identifier.clone()),
            Err(_) => malformed.push(outcome.record.identifier.clone()),
        }
    }
    unclassified.sort();
    malformed.sort();

    let sections = grouped
        .into_iter()
        .map(|(section, mut fields)| {
            fields.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
            (section, build_section(section, fields, config))
        })
        .collect();

    StructureReport {
        total_fields: outcomes.len(),
        sections,
        unclassified,
        malformed,
    }
}

fn build_section(section: SectionNumber, fields: Vec<ClassifiedField>, config: &ReportConfig) -> SectionReport {
    let expected = expectation(section);
    let field_count = fields.len();
    let expected_fields = expected.map_or(0, |e| e.expected_fields);

    let deviation = if expected_fields == 0 {
        0.0
    } else {
        (field_count as f32 - expected_fields as f32) / expected_fields as f32
    };
    let anomalous = expected_fields > 0 && deviation.abs() > config.anomaly_tolerance;

    let sum: f32 = fields.iter().map(|f| f.confidence).sum();
    let mean_confidence = if field_count == 0 { 0.0 } else { sum / field_count as f32 };

    let pages: BTreeSet<PageNumber> = fields.iter().filter_map(|f| f.page).collect();
    let pages_out_of_range: Vec<PageNumber> = match expected {
        Some(e) => pages.iter().copied().filter(|p| !e.contains_page(*p)).collect(),
        None => Vec::new(),
    };
    let entries: BTreeSet<u32> = fields.iter().filter_map(|f| f.entry).collect();

    let mut field_types: BTreeMap<FieldType, usize> = BTreeMap::new();
    for field in fields.iter() {
        *field_types.entry(FieldType::from_identifier(&field.identifier)).or_default() += 1;
    }

    let (subsections, unassigned) = infer_subsections(section, &fields, config);

    if anomalous {
        tracing::debug!(
            "Section {} has {} fields, expected {} (deviation {:.2})",
            section,
            field_count,
            expected_fields,
            deviation
        );
    }

    SectionReport {
        section,
        name: section_name(section).to_string(),
        field_count,
        expected_fields,
        deviation,
        anomalous,
        mean_confidence,
        page_range: range_of(&pages),
        pages: pages.into_iter().collect(),
        pages_out_of_range,
        entries: entries.into_iter().collect(),
        field_types,
        subsections,
        unassigned,
        fields,
    }
}

struct SubsectionBuilder {
    status: MappingStatus,
    fields: Vec<String>,
    pages: BTreeSet<PageNumber>,
}

impl SubsectionBuilder {
    fn add(&mut self, status: MappingStatus, field: &ClassifiedField) {
        self.status = self.status.min(status);
        self.fields.push(field.identifier.clone());
        if let Some(page) = field.page {
            self.pages.insert(page);
        }
    }
}

/// Splits the fields of a section into subsections and unassigned identifiers.
///
/// Results that carry a subsection at or above `high_confidence` are taken as
/// they are. The rest are clustered by their deepest shared container token.
fn infer_subsections(
    section: SectionNumber,
    fields: &[ClassifiedField],
    config: &ReportConfig,
) -> (Vec<SubsectionReport>, Vec<String>) {
    let taxonomy = expectation(section);
    let mut builders: BTreeMap<String, SubsectionBuilder> = BTreeMap::new();
    let mut remaining: Vec<&ClassifiedField> = Vec::new();

    let mut add = |name: String, status: MappingStatus, field: &ClassifiedField| {
        builders
            .entry(name)
            .or_insert_with(|| SubsectionBuilder {
                status,
                fields: Vec::new(),
                pages: BTreeSet::new(),
            })
            .add(status, field);
    };

    for field in fields.iter() {
        match field.subsection.as_deref() {
            Some(sub) if field.confidence >= config.high_confidence => {
                let status = if taxonomy.map_or(false, |t| t.knows_subsection(sub)) {
                    MappingStatus::Known
                } else {
                    MappingStatus::Detected
                };
                add(sub.to_string(), status, field);
            }
            _ => remaining.push(field),
        }
    }

    let tokens: Vec<Vec<String>> = remaining.iter().map(|f| container_tokens(&f.identifier)).collect();
    let mut token_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for field_tokens in tokens.iter() {
        let distinct: BTreeSet<&str> = field_tokens.iter().map(|t| t.as_str()).collect();
        for token in distinct {
            *token_counts.entry(token).or_default() += 1;
        }
    }

    let mut unassigned: Vec<String> = Vec::new();
    for (field, field_tokens) in remaining.iter().zip(tokens.iter()) {
        let shared = field_tokens
            .iter()
            .rev()
            .find(|t| token_counts.get(t.as_str()).copied().unwrap_or(0) >= config.min_cluster_size);
        match shared {
            Some(token) => add(token.clone(), MappingStatus::Inferred, field),
            None => {
                unassigned.push(field.identifier.clone());
            }
        }
    }

    let subsections = builders
        .into_iter()
        .map(|(name, mut builder)| {
            builder.fields.sort();
            SubsectionReport {
                name,
                status: builder.status,
                fields: builder.fields,
                page_range: range_of(&builder.pages),
                pages: builder.pages.into_iter().collect(),
            }
        })
        .collect();
    unassigned.sort();
    (subsections, unassigned)
}

/// Returns the `name[idx]` container segments of an identifier, outermost first.
///
/// The `form1[..]` root, the leaf and section containers are excluded; the
/// section container is shared by every field of the section and carries no
/// subsection information.
fn container_tokens(identifier: &str) -> Vec<String> {
    let normalized = normalize(identifier);
    let segments: Vec<&str> = normalized.split('.').collect();
    if segments.len() < 2 {
        return Vec::new();
    }
    segments[..segments.len() - 1]
        .iter()
        .filter(|s| is_container(s))
        .filter(|s| !s.starts_with("form1[") && !s.starts_with("section"))
        .map(|s| s.to_string())
        .collect()
}

fn is_container(segment: &str) -> bool {
    match segment.split_once('[') {
        Some((name, rest)) => {
            !name.is_empty()
                && rest.ends_with(']')
                && rest[..rest.len() - 1].chars().all(|c| c.is_ascii_digit())
                && rest.len() > 1
        }
        None => false,
    }
}

fn range_of(pages: &BTreeSet<PageNumber>) -> Option<(PageNumber, PageNumber)> {
    Some((*pages.first()?, *pages.last()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;
    use crate::models::FieldRecord;

    fn outcome(identifier: &str, page: Option<PageNumber>, result: Option<ClassificationResult>) -> FieldOutcome {
        let mut record = FieldRecord::new(identifier);
        record.page = page;
        FieldOutcome {
            record,
            result: Ok(result),
        }
    }

    fn classified(section: SectionNumber, subsection: Option<&str>, confidence: f32) -> Option<ClassificationResult> {
        Some(
            ClassificationResult::new(section, confidence, StrategyKind::CanonicalHierarchy)
                .with_subsection(subsection.map(|s| s.to_string())),
        )
    }

    #[test]
    fn test_empty_input_yields_empty_report() {
        let report = aggregate(&[], &ReportConfig::new());
        assert_eq!(report.total_fields, 0);
        assert!(report.sections.is_empty());
        assert!(report.unclassified.is_empty());
        assert!(report.malformed.is_empty());
    }

    #[test]
    fn test_repeated_identifiers_are_kept() {
        let identifier = "form1[0].Section13_2[0].TextField11[0]";
        let outcomes = vec![
            outcome(identifier, Some(22), classified(13, Some("2"), 0.99)),
            outcome(identifier, Some(22), classified(13, Some("2"), 0.99)),
            outcome(identifier, Some(23), classified(13, Some("2"), 0.99)),
            outcome("form1[0].#subform[3].textfield11[0]", None, classified(13, None, 0.75)),
            outcome("form1[0].#subform[3].textfield11[0]", None, classified(13, None, 0.75)),
        ];
        let report = aggregate(&outcomes, &ReportConfig::new());
        let section = report.section(13).unwrap();
        assert_eq!(section.field_count, 5);
        assert_eq!(section.subsection("2").unwrap().fields, vec![identifier; 3]);
        assert_eq!(section.subsection("#subform[3]").unwrap().fields.len(), 2);
        let listed: usize =
            section.subsections.iter().map(|s| s.fields.len()).sum::<usize>() + section.unassigned.len();
        assert_eq!(listed, section.field_count);
    }

    #[test]
    fn test_known_detected_and_inferred_are_distinct() {
        let outcomes = vec![
            outcome("form1[0].section21a[0].textfield11[0]", Some(86), classified(21, Some("a"), 0.99)),
            outcome("form1[0].section21a[0].textfield11[1]", Some(87), classified(21, Some("a"), 0.99)),
            outcome("form1[0].section21z[0].textfield11[0]", Some(88), classified(21, Some("z"), 0.95)),
            outcome("form1[0].#subform[7].textfield11[0]", Some(89), classified(21, None, 0.75)),
            outcome("form1[0].#subform[7].textfield11[1]", Some(90), classified(21, None, 0.75)),
            outcome("form1[0].#subform[9].checkbox1[0]", None, classified(21, None, 0.75)),
        ];
        let report = aggregate(&outcomes, &ReportConfig::new());
        let section = report.section(21).unwrap();

        let known = section.subsection("a").unwrap();
        assert_eq!(known.status, MappingStatus::Known);
        assert_eq!(known.fields.len(), 2);
        assert_eq!(known.page_range, Some((86, 87)));

        assert_eq!(section.subsection("z").unwrap().status, MappingStatus::Detected);

        let inferred = section.subsection("#subform[7]").unwrap();
        assert_eq!(inferred.status, MappingStatus::Inferred);
        assert_eq!(inferred.pages, vec![89, 90]);

        assert_eq!(section.unassigned, vec!["form1[0].#subform[9].checkbox1[0]".to_string()]);
        let names: Vec<&str> = section.subsections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["#subform[7]", "a", "z"]);
    }

    #[test]
    fn test_low_confidence_subsection_is_not_detected() {
        let outcomes = vec![outcome(
            "sect13a.1entry1name",
            None,
            Some(
                ClassificationResult::new(13, 0.8075, StrategyKind::ValueContent)
                    .with_subsection(Some("a1".to_string())),
            ),
        )];
        let mut low = outcomes.clone();
        if let Ok(Some(result)) = low[0].result.as_mut() {
            result.confidence = 0.7;
        }

        let report = aggregate(&outcomes, &ReportConfig::new());
        assert_eq!(report.section(13).unwrap().subsection("a1").unwrap().status, MappingStatus::Detected);

        let report = aggregate(&low, &ReportConfig::new());
        let section = report.section(13).unwrap();
        assert!(section.subsections.is_empty());
        assert_eq!(section.unassigned.len(), 1);
    }

    #[test]
    fn test_counts_pages_and_anomalies() {
        let outcomes = vec![
            outcome("form1[0].section14[0].radiobuttonlist[0]", Some(39), classified(14, None, 0.99)),
            outcome("form1[0].section14[0].textfield11[0]", Some(40), classified(14, None, 0.99)),
            outcome("form1[0].section14[0].from_datefield_name_2[0]", Some(70), classified(14, None, 0.99)),
            outcome("form1[0].sections7-9[0].p3-t68[0]", None, None),
            FieldOutcome {
                record: FieldRecord::new(""),
                result: Err(FieldError::MalformedIdentifier {
                    identifier: String::new(),
                    reason: "identifier is empty".to_string(),
                }),
            },
        ];
        let report = aggregate(&outcomes, &ReportConfig::new());
        assert_eq!(report.total_fields, 5);
        assert_eq!(report.classified_fields(), 3);
        assert_eq!(report.unclassified.len(), 1);
        assert_eq!(report.malformed, vec![String::new()]);

        let section = report.section(14).unwrap();
        assert_eq!(section.name, "Selective Service");
        assert_eq!(section.expected_fields, 5);
        assert!((section.deviation - (-0.4)).abs() < 1e-6);
        assert!(!section.anomalous);
        assert_eq!(section.page_range, Some((39, 70)));
        assert_eq!(section.pages_out_of_range, vec![70]);
        assert_eq!(section.field_types.get(&FieldType::RadioButtonList), Some(&1));
        assert_eq!(section.field_types.get(&FieldType::TextField), Some(&1));
        assert_eq!(section.field_types.get(&FieldType::Date), Some(&1));

        let strict = ReportConfig::new().with_anomaly_tolerance(0.3);
        assert!(aggregate(&outcomes, &strict).section(14).unwrap().anomalous);
    }

    #[test]
    fn test_field_type_detection() {
        assert_eq!(FieldType::from_identifier("form1[0].section12[0].school6_state[0]"), FieldType::State);
        assert_eq!(FieldType::from_identifier("form1[0].section12[0].DropDownList12[0]"), FieldType::DropDownList);
        assert_eq!(FieldType::from_identifier("form1[0].section12[0].#field[3]"), FieldType::Other);
        assert_eq!(FieldType::from_identifier("form1[0].section12[0].CheckBox3[0]"), FieldType::CheckBox);
    }

    #[test]
    fn test_container_tokens_skip_root_sections_and_leaf() {
        assert_eq!(
            container_tokens("form1[0].section16_3[0].#area[1].textfield11[0]"),
            vec!["#area[1]".to_string()]
        );
        assert!(container_tokens("textfield11[0]").is_empty());
        assert!(container_tokens("form1[0].sections7-9[0].p3-t68[0]").is_empty());
    }

    #[test]
    fn test_order_does_not_matter() {
        let mut outcomes = vec![
            outcome("form1[0].section13_2[0].textfield11[0]", Some(20), classified(13, Some("2"), 0.99)),
            outcome("form1[0].section13_2[0].textfield11[1]", Some(21), classified(13, Some("2"), 0.93)),
            outcome("form1[0].#subform[3].textfield11[0]", Some(22), classified(13, None, 0.75)),
            outcome("form1[0].#subform[3].textfield11[4]", Some(22), classified(13, None, 0.7225)),
            outcome("form1[0].section11[0].textfield11[0]", Some(12), classified(11, None, 0.99)),
        ];
        let forward = aggregate(&outcomes, &ReportConfig::new());
        outcomes.reverse();
        let backward = aggregate(&outcomes, &ReportConfig::new());
        assert_eq!(forward, backward);
    }
}
