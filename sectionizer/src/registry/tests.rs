use super::rules::CATALOG_VERSION;
use super::*;
use crate::error::RegistryError;

fn template(class: StrategyClass, pattern: &str, confidence: f32) -> RuleSpec {
    RuleSpec {
        class,
        pattern: pattern.to_string(),
        sections: None,
        subsection: None,
        confidence,
        description: "test rule {n}".to_string(),
    }
}

fn catalog_with(rules: Vec<RuleSpec>) -> RuleCatalog {
    RuleCatalog {
        version: "test".to_string(),
        canonical: rules::default_canonical_pattern(),
        canonical_confidence: 0.99,
        page_confidence: 0.75,
        rules,
        spans: Vec::new(),
        page_ranges: Vec::new(),
        corrections: Vec::new(),
    }
}

#[test_log::test]
fn test_builtin_registry_loads() {
    let registry = PatternRegistry::load().unwrap();
    assert_eq!(registry.version(), CATALOG_VERSION);
    assert_eq!(registry.groups().len(), StrategyClass::MARKER_ORDER.len());
    for (group, class) in registry.groups().iter().zip(StrategyClass::MARKER_ORDER.iter()) {
        assert_eq!(group.class, *class);
        assert!(!group.rules.is_empty(), "{class} has no rules");
    }
    assert!(!registry.content_rules().rules.is_empty());
    assert_eq!(registry.spans().len(), 2);
    assert_eq!(registry.page_ranges().len(), 30);
}

#[test_log::test]
fn test_templates_expand_per_section() {
    let registry = PatternRegistry::load().unwrap();
    let bare = registry.group(StrategyClass::BareSection).unwrap();
    assert_eq!(bare.rules.len(), 30);
    let sections: Vec<SectionNumber> = bare.rules.iter().map(|r| r.target_section).collect();
    assert_eq!(sections, (1..=30).collect::<Vec<_>>());
    assert_eq!(bare.rules[6].description, "bare section 7");
}

#[test_log::test]
fn test_confidences_follow_group_priority() {
    let registry = PatternRegistry::load().unwrap();
    let mut previous = f32::MAX;
    for group in registry.groups() {
        let max = group.rules.iter().map(|r| r.base_confidence).fold(0.0f32, f32::max);
        assert!(max <= previous, "{} outranks an earlier group", group.class);
        previous = group.rules.iter().map(|r| r.base_confidence).fold(f32::MAX, f32::min);
    }
    assert!(registry.canonical_confidence() >= 0.95);
}

#[test_log::test]
fn test_rules_do_not_claim_longer_section_numbers() {
    let registry = PatternRegistry::load().unwrap();
    let samples = [
        "section{n}[0]",
        "section{n}a[0]",
        "section{n}_2-3[0]",
        "section_{n}_1[0]",
        "section{n}-2[0]",
        "s_{n}_field",
        "sec{n}_field",
        "sect{n}_field",
        "section {n} text",
        "section={n}",
    ];
    for section in 10..=30u8 {
        for sample in samples {
            let text = sample.replace("{n}", &section.to_string());
            for group in registry.groups() {
                if let Some((rule, m)) = group.first_match(&text) {
                    assert_eq!(m.section, section, "{} claimed {text}", rule.description);
                }
            }
        }
    }
}

#[test_log::test]
fn test_rules_ignore_span_containers() {
    let registry = PatternRegistry::load().unwrap();
    for identifier in ["form1[0].sections7-9[0].p3-t68[0]", "form1[0].sections1-6[0].textfield11[2]"] {
        for group in registry.groups() {
            assert!(group.first_match(identifier).is_none(), "{} matched {identifier}", group.class);
        }
        assert!(registry.canonical().captures(identifier).is_none());
        assert!(registry.spans().iter().any(|s| s.matches(identifier)));
    }
}

#[test_log::test]
fn test_span_resolution() {
    let registry = PatternRegistry::load().unwrap();
    let span = registry
        .spans()
        .iter()
        .find(|s| s.start == 7 && s.end == 9)
        .unwrap();
    let identifier = "form1[0].sections7-9[0].p3-t68[0]";

    assert_eq!(span.resolve(identifier, None), SpanVerdict::Unresolved);
    assert_eq!(
        span.resolve(identifier, Some("passport number")),
        SpanVerdict::Resolved {
            section: 8,
            keyword: "passport".to_string(),
            from_label: true,
            confidence: 0.87,
        }
    );
    assert_eq!(
        span.resolve("form1[0].sections7-9[0].email[0]", None),
        SpanVerdict::Resolved {
            section: 7,
            keyword: "email".to_string(),
            from_label: false,
            confidence: 0.9,
        }
    );
    assert_eq!(
        span.resolve(identifier, Some("email or passport")),
        SpanVerdict::Unresolved
    );
    assert!(span.contains(8));
    assert!(!span.contains(10));
}

#[test_log::test]
fn test_span_keywords_match_whole_words() {
    let registry = PatternRegistry::load().unwrap();
    let personal = registry.spans().iter().find(|s| s.start == 1 && s.end == 6).unwrap();
    let contact = registry.spans().iter().find(|s| s.start == 7 && s.end == 9).unwrap();

    assert_eq!(
        personal.resolve("form1[0].sections1-6[0].textfield11[0]", Some("county of residence: essex")),
        SpanVerdict::Unresolved
    );
    assert_eq!(
        contact.resolve("form1[0].sections7-9[0].textfield11[0]", Some("firstborn child's name")),
        SpanVerdict::Unresolved
    );
    assert_eq!(
        contact.resolve("form1[0].sections7-9[0].p3_mobileprefix[0]", None),
        SpanVerdict::Resolved {
            section: 7,
            keyword: "mobile".to_string(),
            from_label: false,
            confidence: 0.9,
        }
    );
    assert!(matches!(
        contact.resolve("form1[0].sections7-9[0].home_phone[0]", None),
        SpanVerdict::Resolved { section: 7, .. }
    ));
    assert!(matches!(
        contact.resolve("form1[0].sections7-9[0].textfield11[2]", Some("naturalized citizen")),
        SpanVerdict::Resolved { section: 9, .. }
    ));
    assert!(matches!(
        personal.resolve("form1[0].sections1-6[0].textfield11[0]", Some("sex (male/female)")),
        SpanVerdict::Resolved { section: 6, .. }
    ));
}

#[test_log::test]
fn test_sections_for_page() {
    let registry = PatternRegistry::load().unwrap();
    assert_eq!(registry.sections_for_page(20), vec![13]);
    assert_eq!(registry.sections_for_page(5), vec![1, 2, 3, 4, 5]);
    assert_eq!(registry.sections_for_page(39), vec![13, 14]);
    assert!(registry.sections_for_page(500).is_empty());
}

#[test_log::test]
fn test_catalog_json_round_trip_loads() {
    let catalog = RuleCatalog::builtin();
    let json = serde_json::to_string(&catalog).unwrap();
    let parsed = RuleCatalog::from_json(&json).unwrap();
    assert_eq!(parsed, catalog);
    assert!(PatternRegistry::from_catalog(&parsed).is_ok());
}

#[test_log::test]
fn test_minimal_json_catalog_uses_defaults() {
    let json = r#"{
        "version": "custom-1",
        "rules": [
            {"class": "bare_section", "pattern": "section[\\s_]*{n}(?:[^0-9]|$)", "confidence": 0.8, "description": "bare {n}"}
        ]
    }"#;
    let catalog = RuleCatalog::from_json(json).unwrap();
    assert_eq!(catalog.canonical, rules::CANONICAL_PATTERN);
    let registry = PatternRegistry::from_catalog(&catalog).unwrap();
    assert_eq!(registry.version(), "custom-1");
    assert_eq!(registry.rule_count(), 30);
    assert!(registry.spans().is_empty());
}

#[test_log::test]
fn test_invalid_pattern_is_fatal() {
    let catalog = catalog_with(vec![template(StrategyClass::BareSection, "section({n}", 0.8)]);
    let err = PatternRegistry::from_catalog(&catalog).unwrap_err();
    assert!(matches!(err, RegistryError::InvalidPattern { .. }));
    assert!(err.to_string().contains("test rule 1"));
}

#[test_log::test]
fn test_unknown_section_is_fatal() {
    let mut spec = template(StrategyClass::ShortPrefix, "s_?{n}_", 0.85);
    spec.sections = Some(vec![3, 31]);
    let err = PatternRegistry::from_catalog(&catalog_with(vec![spec])).unwrap_err();
    assert!(matches!(err, RegistryError::UnknownSection { section: 31, .. }));
}

#[test_log::test]
fn test_out_of_range_confidence_is_fatal() {
    for confidence in [0.0, -0.1, 1.01] {
        let catalog = catalog_with(vec![template(StrategyClass::BareSection, "section{n}", confidence)]);
        let err = PatternRegistry::from_catalog(&catalog).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidConfidence { .. }));
    }
}

#[test_log::test]
fn test_fixed_pattern_needs_one_section() {
    let spec = template(StrategyClass::ExplicitMarker, "passport_section", 0.9);
    let err = PatternRegistry::from_catalog(&catalog_with(vec![spec.clone()])).unwrap_err();
    assert!(matches!(err, RegistryError::MissingTarget { .. }));

    let mut fixed = spec;
    fixed.sections = Some(vec![8]);
    fixed.subsection = Some("A".to_string());
    let registry = PatternRegistry::from_catalog(&catalog_with(vec![fixed])).unwrap();
    let group = registry.group(StrategyClass::ExplicitMarker).unwrap();
    let (_, m) = group.first_match("form1[0].passport_section[0]").unwrap();
    assert_eq!(m.section, 8);
    assert_eq!(m.subsection.as_deref(), Some("a"));
}

#[test_log::test]
fn test_invalid_spans_are_fatal() {
    let mut catalog = RuleCatalog::builtin();
    catalog.spans[1].start = 9;
    catalog.spans[1].end = 7;
    assert!(matches!(
        PatternRegistry::from_catalog(&catalog),
        Err(RegistryError::InvalidSpan { .. })
    ));

    let mut catalog = RuleCatalog::builtin();
    catalog.spans[1].keywords[0].section = 12;
    assert!(matches!(
        PatternRegistry::from_catalog(&catalog),
        Err(RegistryError::InvalidSpan { .. })
    ));
}

#[test_log::test]
fn test_inverted_page_range_is_fatal() {
    let mut catalog = RuleCatalog::builtin();
    catalog.page_ranges[12] = PageRangeSpec {
        section: 13,
        start: 39,
        end: 19,
    };
    assert!(matches!(
        PatternRegistry::from_catalog(&catalog),
        Err(RegistryError::InvalidPageRange { section: 13, .. })
    ));
}
