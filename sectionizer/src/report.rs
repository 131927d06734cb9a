//! Classification-quality summary built from a [`StructureReport`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use strum::Display;

use crate::aggregator::{MappingStatus, StructureReport};
use crate::config::{ReportConfig, SectionNumber};
use crate::models::StrategyKind;

/// Confidence histogram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceTiers {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl ConfidenceTiers {
    pub fn record(&mut self, confidence: f32, config: &ReportConfig) {
        if confidence >= config.high_confidence {
            self.high += 1;
        } else if confidence >= config.medium_confidence {
            self.medium += 1;
        } else {
            self.low += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.high + self.medium + self.low
    }

    fn merge(&mut self, other: &ConfidenceTiers) {
        self.high += other.high;
        self.medium += other.medium;
        self.low += other.low;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display)]
pub enum RecommendationKind {
    LowConfidence,
    CountAnomaly,
    PageOutOfRange,
    Unclassified,
    MalformedInput,
}

/// A finding that deserves manual review. Never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<SectionNumber>,
    pub message: String,
}

/// The `SectionSummary` struct holds per-section quality figures.
///
/// # Fields
///
/// * `coverage` - `field_count / expected_fields`, `0` when nothing is expected.
/// * `mapping` - Number of subsections per mapping status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSummary {
    pub section: SectionNumber,
    pub name: String,
    pub field_count: usize,
    pub expected_fields: usize,
    pub coverage: f32,
    pub mean_confidence: f32,
    pub tiers: ConfidenceTiers,
    pub mapping: BTreeMap<MappingStatus, usize>,
    pub unassigned: usize,
}

/// The `Summary` struct is the machine-readable summary of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_version: Option<String>,
    pub total_fields: usize,
    pub classified: usize,
    pub classified_percent: f32,
    pub unclassified: usize,
    pub malformed: usize,
    pub tiers: ConfidenceTiers,
    pub strategies: BTreeMap<StrategyKind, usize>,
    pub sections: Vec<SectionSummary>,
    pub recommendations: Vec<Recommendation>,
}

impl Summary {
    pub fn with_registry_version(mut self, version: &str) -> Summary {
        self.registry_version = Some(version.to_string());
        return self;
    }

    pub fn sections_for_review(&self) -> Vec<SectionNumber> {
        self.recommendations
            .iter()
            .filter(|r| r.kind == RecommendationKind::LowConfidence)
            .filter_map(|r| r.section)
            .collect()
    }

    /// Renders the summary as a plain-text table.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        if let Some(version) = &self.registry_version {
            let _ = writeln!(out, "Registry: {}", version);
        }
        let _ = writeln!(
            out,
            "Fields: {} | Classified: {} ({:.1}%) | Unclassified: {} | Malformed: {}",
            self.total_fields, self.classified, self.classified_percent, self.unclassified, self.malformed
        );
        let _ = writeln!(
            out,
            "Confidence: high {} | medium {} | low {}",
            self.tiers.high, self.tiers.medium, self.tiers.low
        );
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{:>3}  {:<48} {:>6} {:>8} {:>6} {:>5} {:>5} {:>5}",
            "Sec", "Name", "Fields", "Expected", "Mean", "High", "Med", "Low"
        );
        for s in self.sections.iter() {
            let _ = writeln!(
                out,
                "{:>3}  {:<48} {:>6} {:>8} {:>6.3} {:>5} {:>5} {:>5}",
                s.section,
                truncate(&s.name, 48),
                s.field_count,
                s.expected_fields,
                s.mean_confidence,
                s.tiers.high,
                s.tiers.medium,
                s.tiers.low
            );
        }
        if !self.recommendations.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Recommendations:");
            for r in self.recommendations.iter() {
                let _ = writeln!(out, "  [{}] {}", r.kind, r.message);
            }
        }
        out
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// Summarizes a structural report.
///
/// # Arguments
///
/// * `report` - The aggregator's output.
/// * `config` - Tier bounds and the review threshold.
///
/// # Returns
///
/// Totals, per-section tiers and the recommendation list. Sections appear in
/// ascending order; recommendations follow the section order, then the
/// batch-level findings.
pub fn summarize(report: &StructureReport, config: &ReportConfig) -> Summary {
    let mut tiers = ConfidenceTiers::default();
    let mut strategies: BTreeMap<StrategyKind, usize> = BTreeMap::new();
    let mut sections = Vec::with_capacity(report.sections.len());
    let mut recommendations = Vec::new();

    for section in report.sections.values() {
        let mut section_tiers = ConfidenceTiers::default();
        for field in section.fields.iter() {
            section_tiers.record(field.confidence, config);
            *strategies.entry(field.strategy).or_default() += 1;
        }
        tiers.merge(&section_tiers);

        let mut mapping: BTreeMap<MappingStatus, usize> = BTreeMap::new();
        for sub in section.subsections.iter() {
            *mapping.entry(sub.status).or_default() += 1;
        }

        if section.mean_confidence < config.review_threshold {
            recommendations.push(Recommendation {
                kind: RecommendationKind::LowConfidence,
                section: Some(section.section),
                message: format!(
                    "Section {} ({}) has mean confidence {:.3}, below {:.2}; review manually",
                    section.section, section.name, section.mean_confidence, config.review_threshold
                ),
            });
        }
        if section.anomalous {
            recommendations.push(Recommendation {
                kind: RecommendationKind::CountAnomaly,
                section: Some(section.section),
                message: format!(
                    "Section {} has {} fields, expected about {} ({:+.0}%)",
                    section.section,
                    section.field_count,
                    section.expected_fields,
                    section.deviation * 100.0
                ),
            });
        }
        if !section.pages_out_of_range.is_empty() {
            let pages: Vec<String> = section.pages_out_of_range.iter().map(|p| p.to_string()).collect();
            recommendations.push(Recommendation {
                kind: RecommendationKind::PageOutOfRange,
                section: Some(section.section),
                message: format!(
                    "Section {} has fields on unexpected pages: {}",
                    section.section,
                    pages.join(", ")
                ),
            });
        }

        sections.push(SectionSummary {
            section: section.section,
            name: section.name.clone(),
            field_count: section.field_count,
            expected_fields: section.expected_fields,
            coverage: if section.expected_fields == 0 {
                0.0
            } else {
                section.field_count as f32 / section.expected_fields as f32
            },
            mean_confidence: section.mean_confidence,
            tiers: section_tiers,
            mapping,
            unassigned: section.unassigned.len(),
        });
    }

    if !report.unclassified.is_empty() {
        recommendations.push(Recommendation {
            kind: RecommendationKind::Unclassified,
            section: None,
            message: format!("{} fields could not be classified", report.unclassified.len()),
        });
    }
    if !report.malformed.is_empty() {
        recommendations.push(Recommendation {
            kind: RecommendationKind::MalformedInput,
            section: None,
            message: format!("{} fields have malformed identifiers", report.malformed.len()),
        });
    }

    let classified = report.classified_fields();
    let classified_percent = if report.total_fields == 0 {
        0.0
    } else {
        classified as f32 * 100.0 / report.total_fields as f32
    };

    Summary {
        registry_version: None,
        total_fields: report.total_fields,
        classified,
        classified_percent,
        unclassified: report.unclassified.len(),
        malformed: report.malformed.len(),
        tiers,
        strategies,
        sections,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::aggregate;
    use crate::models::{ClassificationResult, FieldOutcome, FieldRecord};

    fn outcome(identifier: &str, section: SectionNumber, confidence: f32) -> FieldOutcome {
        FieldOutcome {
            record: FieldRecord::new(identifier).with_page(20),
            result: Ok(Some(ClassificationResult::new(section, confidence, StrategyKind::PageRange))),
        }
    }

    #[test]
    fn test_empty_report() {
        let config = ReportConfig::new();
        let summary = summarize(&aggregate(&[], &config), &config);
        assert_eq!(summary.total_fields, 0);
        assert_eq!(summary.classified_percent, 0.0);
        assert!(summary.sections.is_empty());
        assert!(summary.recommendations.is_empty());
    }

    #[test]
    fn test_tiers_and_recommendations() {
        let config = ReportConfig::new();
        let mut outcomes = vec![
            outcome("a", 13, 0.99),
            outcome("b", 13, 0.8),
            outcome("c", 13, 0.79),
            outcome("d", 13, 0.5),
            outcome("e", 13, 0.2),
        ];
        outcomes.push(FieldOutcome {
            record: FieldRecord::new("form1[0].sections7-9[0].p3-t68[0]"),
            result: Ok(None),
        });

        let summary = summarize(&aggregate(&outcomes, &config), &config);
        assert_eq!(summary.total_fields, 6);
        assert_eq!(summary.classified, 5);
        assert!((summary.classified_percent - 83.333_336).abs() < 1e-3);
        assert_eq!(
            summary.tiers,
            ConfidenceTiers {
                high: 2,
                medium: 2,
                low: 1
            }
        );
        assert_eq!(summary.strategies.get(&StrategyKind::PageRange), Some(&5));

        // Mean 0.656 is under the 0.7 threshold and five fields are far from 1086.
        let kinds: Vec<RecommendationKind> = summary.recommendations.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RecommendationKind::LowConfidence,
                RecommendationKind::CountAnomaly,
                RecommendationKind::Unclassified
            ]
        );
        assert_eq!(summary.sections_for_review(), vec![13]);
    }

    #[test]
    fn test_render_text_lists_sections() {
        let config = ReportConfig::new();
        let outcomes = vec![outcome("a", 13, 0.99), outcome("b", 14, 0.99)];
        let summary = summarize(&aggregate(&outcomes, &config), &config).with_registry_version("v1");
        let text = summary.render_text();
        assert!(text.starts_with("Registry: v1"));
        assert!(text.contains("Employment Activities"));
        assert!(text.contains("Selective Service"));
        assert!(text.contains("[CountAnomaly]"));
        assert!(text.contains("[PageOutOfRange] Section 14"));
    }

    #[test]
    fn test_summary_serializes() {
        let config = ReportConfig::new();
        let summary = summarize(&aggregate(&[outcome("a", 21, 0.95)], &config), &config);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["sections"][0]["section"], 21);
        assert_eq!(json["tiers"]["high"], 1);
        assert_eq!(json["strategies"]["page_range"], 1);
        assert!(json.get("registry_version").is_none());
    }
}
