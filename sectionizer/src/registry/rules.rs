//! The built-in rule catalog.
//!
//! Templates are written against normalized identifiers. Every `{n}` must be
//! followed by something that cannot be a digit, otherwise `section1` would
//! claim `section13`.

use super::{PageRangeSpec, RuleCatalog, RuleSpec, SpanKeywords, SpanSpec, StrategyClass};
use crate::corrections::{CorrectionAction, CorrectionSpec, IndexBand};
use crate::registry::sections::SECTION_EXPECTATIONS;

pub const CATALOG_VERSION: &str = "2024.11-sf86";

/// Fully-structured path: `form1[f].[#subform[g].]section[_]N[sub][-k][c].[#area[a].]leaf[i]`.
pub const CANONICAL_PATTERN: &str = r"^form1\[(?P<form>\d+)\]\.(?:#subform\[(?P<subform>\d+)\]\.)?section_?(?P<section>\d{1,2})(?P<sub>_[0-9a-z]+|[a-z]\d?)?(?:-(?P<entry>\d+))?\[(?P<container>\d+)\]\.(?:#area\[(?P<subentry>\d+)\]\.)?(?P<leaf>[a-z#][a-z0-9_#\-]*)\[(?P<index>\d+)\]$";

pub fn default_canonical_pattern() -> String {
    CANONICAL_PATTERN.to_string()
}

pub fn default_canonical_confidence() -> f32 {
    0.99
}

pub fn default_page_confidence() -> f32 {
    0.75
}

const MARKER_TEMPLATES: &[(StrategyClass, &str, f32, &str)] = &[
    (
        StrategyClass::ExplicitMarker,
        r"(?:^|[^a-z0-9])section\s*[=:]\s*{n}(?:[^0-9]|$)",
        0.98,
        "explicit section={n} marker",
    ),
    (
        StrategyClass::ExplicitMarker,
        r"(?:^|[^a-z0-9])sec(?:tion)?_?(?:no|num|number)\s*[=:]\s*{n}(?:[^0-9]|$)",
        0.98,
        "explicit section number {n} marker",
    ),
    (
        StrategyClass::IndexedForm,
        r"^form1\[\d+\]\.(?:#subform\[\d+\]\.)*section_?{n}(?P<sub>_[0-9a-z]+|[a-z]\d?)?(?:-(?P<entry>\d+))?\[\d+\]",
        0.97,
        "form-rooted section {n} container",
    ),
    (
        StrategyClass::IndexedForm,
        r"^form1\[\d+\]\.(?:#subform\[\d+\]\.)*section{n}\\?\.\d+-{n}\\?\.\d+\[\d+\]",
        0.97,
        "form-rooted section {n} sub-range container",
    ),
    (
        StrategyClass::SectionLetter,
        r"(?:^|[^a-z0-9])section_?{n}(?P<sub>[a-z]\d?)(?:[\[\._\-]|$)",
        0.95,
        "section {n} lettered subsection",
    ),
    (
        StrategyClass::SectionLetter,
        r"(?:^|[^a-z0-9])sect{n}(?P<sub>[a-z]\d?)(?:[\[\._\-]|$)",
        0.95,
        "abbreviated section {n} lettered subsection",
    ),
    (
        StrategyClass::SectionEntry,
        r"(?:^|[^a-z0-9])section_?{n}_(?P<sub>\d+)-(?P<entry>\d+)(?:[\[\._]|$)",
        0.95,
        "section {n} subsection entry",
    ),
    (
        StrategyClass::SectionEntry,
        r"(?:^|[^a-z0-9])section_?{n}-(?P<entry>\d+)(?:[\[\._]|$)",
        0.94,
        "section {n} numbered entry",
    ),
    (
        StrategyClass::SectionEntry,
        r"(?:^|[^a-z0-9])section_?{n}_(?P<entry>\d+)(?:[\[\._]|$)",
        0.93,
        "section {n} underscore entry",
    ),
    (
        StrategyClass::ShortPrefix,
        r"(?:^|[^a-z0-9])s_?{n}(?:[_\.\[\-]|$)",
        0.85,
        "short s{n} prefix",
    ),
    (
        StrategyClass::ShortPrefix,
        r"(?:^|[^a-z0-9])sec_?{n}(?:[_\.\[\-]|$)",
        0.85,
        "short sec{n} prefix",
    ),
    (
        StrategyClass::ShortPrefix,
        r"(?:^|[^a-z0-9])sect_?{n}(?:[_\.\[\-]|$)",
        0.85,
        "short sect{n} prefix",
    ),
    (
        StrategyClass::BareSection,
        r"section[\s_\-]*{n}(?:[^0-9]|$)",
        0.80,
        "bare section {n}",
    ),
    (
        StrategyClass::ContentMarker,
        r"^sect(?:ion)?[\s_]*{n}(?:(?P<sub>[a-z](?:\.\d+)?)?entry(?P<entry>\d+)|[^0-9]|$)",
        0.95,
        "value marker sect{n}",
    ),
];

const SPAN_1_6: &[(u8, &[&str])] = &[
    (1, &["full name", "first name", "last name", "middle name"]),
    (2, &["date of birth", "birth date", "dob"]),
    (3, &["place of birth", "birth city", "birth country"]),
    (4, &["social security", "ssn"]),
    (5, &["other names", "maiden", "alias"]),
    (6, &["height", "weight", "hair color", "eye color", "sex"]),
];

const SPAN_7_9: &[(u8, &[&str])] = &[
    (7, &["email", "telephone", "home phone", "work phone", "mobile"]),
    (8, &["passport"]),
    (9, &["citizen", "naturaliz", "alien registration", "born"]),
];

fn span(description: &str, pattern: &str, start: u8, end: u8, keywords: &[(u8, &[&str])]) -> SpanSpec {
    SpanSpec {
        description: description.to_string(),
        pattern: pattern.to_string(),
        start,
        end,
        keywords: keywords
            .iter()
            .map(|(section, words)| SpanKeywords {
                section: *section,
                keywords: words.iter().map(|w| w.to_string()).collect(),
            })
            .collect(),
        identifier_confidence: super::default_span_identifier_confidence(),
        label_confidence: super::default_span_label_confidence(),
    }
}

fn builtin_corrections() -> Vec<CorrectionSpec> {
    vec![
        CorrectionSpec {
            name: "section16-area-entry".to_string(),
            section: 16,
            trigger: r"section16_3\[\d+\]\.#area\[(?P<n>\d+)\]".to_string(),
            action: CorrectionAction::EntryFromCapture { offset: 1 },
        },
        CorrectionSpec {
            name: "section16-person-index-bands".to_string(),
            section: 16,
            trigger: r"section16_3\[\d+\]\.textfield11\[(?P<n>\d+)\]$".to_string(),
            action: CorrectionAction::EntryFromIndexBands {
                bands: vec![
                    IndexBand { start: 0, end: 10, entry: 1 },
                    IndexBand { start: 11, end: 21, entry: 2 },
                    IndexBand { start: 22, end: 32, entry: 3 },
                ],
            },
        },
        CorrectionSpec {
            name: "section20-continuation".to_string(),
            section: 20,
            trigger: r"[_\.\-]cont(?:inuation)?(?:[\[\._]|$)".to_string(),
            action: CorrectionAction::ReassignSection { section: 21 },
        },
        CorrectionSpec {
            name: "section13-issue-5".to_string(),
            section: 13,
            trigger: r"section_?13_5(?:[\[\._\-]|$)".to_string(),
            action: CorrectionAction::SetSubsection {
                subsection: "5".to_string(),
            },
        },
        CorrectionSpec {
            name: "section13-issue-6".to_string(),
            section: 13,
            trigger: r"section_?13_6(?:[\[\._\-]|$)".to_string(),
            action: CorrectionAction::SetSubsection {
                subsection: "6".to_string(),
            },
        },
    ]
}

impl RuleCatalog {
    /// Returns the built-in catalog.
    pub fn builtin() -> RuleCatalog {
        let rules = MARKER_TEMPLATES
            .iter()
            .map(|(class, pattern, confidence, description)| RuleSpec {
                class: *class,
                pattern: pattern.to_string(),
                sections: None,
                subsection: None,
                confidence: *confidence,
                description: description.to_string(),
            })
            .collect();

        let spans = vec![
            span(
                "sections 1-6",
                r"(?:^|[^a-z0-9])sections_?1-6(?:[\[\._]|$)",
                1,
                6,
                SPAN_1_6,
            ),
            span(
                "sections 7-9",
                r"(?:^|[^a-z0-9])sections_?7-9(?:[\[\._]|$)",
                7,
                9,
                SPAN_7_9,
            ),
        ];

        let page_ranges = SECTION_EXPECTATIONS
            .iter()
            .map(|e| PageRangeSpec {
                section: e.section,
                start: e.page_start,
                end: e.page_end,
            })
            .collect();

        RuleCatalog {
            version: CATALOG_VERSION.to_string(),
            canonical: default_canonical_pattern(),
            canonical_confidence: default_canonical_confidence(),
            page_confidence: default_page_confidence(),
            rules,
            spans,
            page_ranges,
            corrections: builtin_corrections(),
        }
    }
}
