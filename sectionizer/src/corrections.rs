//! Post-classification corrections for known structural quirks of the form.
//!
//! A correction rule pairs a section with a trigger pattern over the normalized
//! identifier. Rules run in table order and the first one that changes the result
//! wins. A rule whose action would leave the result as it is counts as not
//! triggered, which makes [`CorrectionTable::correct`] idempotent.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{is_valid_section, SectionNumber};
use crate::error::RegistryError;
use crate::models::{ClassificationResult, FieldRecord};
use crate::normalizer::normalize;
use crate::registry::{capture_number, compile};

/// Name of the capture group read by the capture-driven actions.
pub const CAPTURE_GROUP: &str = "n";

/// Maps a range of leaf indices onto an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexBand {
    pub start: u32,
    pub end: u32,
    pub entry: u32,
}

/// What a correction rule does when it fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorrectionAction {
    /// Moves the field to another section. Subsection and entry are cleared.
    ReassignSection { section: SectionNumber },
    /// Sets the entry to the number captured by `n` plus `offset`.
    EntryFromCapture { offset: u32 },
    /// Sets the entry from the band containing the index captured by `n`.
    EntryFromIndexBands { bands: Vec<IndexBand> },
    /// Sets a fixed subsection.
    SetSubsection { subsection: String },
}

/// A declarative correction rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionSpec {
    pub name: String,
    pub section: SectionNumber,
    pub trigger: String,
    pub action: CorrectionAction,
}

/// A compiled correction rule.
#[derive(Debug, Clone)]
pub struct CorrectionRule {
    pub name: String,
    pub section: SectionNumber,
    pub trigger: Regex,
    pub action: CorrectionAction,
}

impl CorrectionRule {
    /// Compiles and validates a correction spec.
    ///
    /// # Errors
    ///
    /// Fails on an invalid trigger, an unknown section, a capture-driven action
    /// whose trigger lacks the `n` group, overlapping bands, or a reassignment to
    /// the rule's own section.
    pub fn from_spec(spec: &CorrectionSpec) -> Result<CorrectionRule, RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidCorrection {
            rule: spec.name.clone(),
            reason: reason.to_string(),
        };
        if !is_valid_section(spec.section) {
            return Err(RegistryError::UnknownSection {
                rule: spec.name.clone(),
                section: spec.section,
            });
        }
        let trigger = compile(&spec.name, &spec.trigger)?;
        let has_capture = trigger.capture_names().flatten().any(|name| name == CAPTURE_GROUP);

        match &spec.action {
            CorrectionAction::ReassignSection { section } => {
                if !is_valid_section(*section) {
                    return Err(RegistryError::UnknownSection {
                        rule: spec.name.clone(),
                        section: *section,
                    });
                }
                if *section == spec.section {
                    return Err(invalid("reassignment target equals the source section"));
                }
            }
            CorrectionAction::EntryFromCapture { .. } => {
                if !has_capture {
                    return Err(invalid("trigger has no (?P<n>...) group"));
                }
            }
            CorrectionAction::EntryFromIndexBands { bands } => {
                if !has_capture {
                    return Err(invalid("trigger has no (?P<n>...) group"));
                }
                if bands.is_empty() {
                    return Err(invalid("no index bands"));
                }
                let mut sorted = bands.clone();
                sorted.sort_by_key(|b| b.start);
                for band in sorted.iter() {
                    if band.start > band.end {
                        return Err(invalid("index band is inverted"));
                    }
                }
                if sorted.windows(2).any(|pair| pair[0].end >= pair[1].start) {
                    return Err(invalid("index bands overlap"));
                }
            }
            CorrectionAction::SetSubsection { subsection } => {
                if subsection.trim().is_empty() {
                    return Err(invalid("subsection is empty"));
                }
            }
        }

        Ok(CorrectionRule {
            name: spec.name.clone(),
            section: spec.section,
            trigger,
            action: spec.action.clone(),
        })
    }

    /// Returns the corrected result, or `None` if the rule does not change anything.
    pub fn apply(&self, result: &ClassificationResult, identifier: &str) -> Option<ClassificationResult> {
        if result.section != self.section {
            return None;
        }
        let caps = self.trigger.captures(identifier)?;

        let mut corrected = result.clone();
        match &self.action {
            CorrectionAction::ReassignSection { section } => {
                corrected.section = *section;
                corrected.subsection = None;
                corrected.entry = None;
                corrected.sub_entry = None;
            }
            CorrectionAction::EntryFromCapture { offset } => {
                let n = capture_number(&caps, CAPTURE_GROUP)?;
                corrected.entry = Some(n.saturating_add(*offset));
            }
            CorrectionAction::EntryFromIndexBands { bands } => {
                let n = capture_number(&caps, CAPTURE_GROUP)?;
                let band = bands.iter().find(|b| b.start <= n && n <= b.end)?;
                corrected.entry = Some(band.entry);
            }
            CorrectionAction::SetSubsection { subsection } => {
                corrected.subsection = Some(subsection.trim().to_lowercase());
            }
        }

        if corrected.same_decision(result) {
            return None;
        }
        Some(corrected)
    }
}

/// The ordered set of correction rules.
#[derive(Debug, Clone, Default)]
pub struct CorrectionTable {
    rules: Vec<CorrectionRule>,
}

impl CorrectionTable {
    /// Compiles correction specs in the given order.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistryError`] found.
    pub fn from_specs(specs: &[CorrectionSpec]) -> Result<CorrectionTable, RegistryError> {
        let rules = specs.iter().map(CorrectionRule::from_spec).collect::<Result<Vec<_>, _>>()?;
        tracing::debug!("Loaded {} correction rules", rules.len());
        Ok(CorrectionTable { rules })
    }

    pub fn rules(&self) -> &[CorrectionRule] {
        &self.rules
    }

    /// Applies the first triggering rule to `result`.
    ///
    /// # Arguments
    ///
    /// * `result` - The classification produced by the strategy chain.
    /// * `record` - The record the result belongs to.
    ///
    /// # Returns
    ///
    /// The corrected result, or a copy of `result` if no rule fired. When the input
    /// carries a match trace, the name of the rule that fired is appended to it.
    pub fn correct(&self, result: &ClassificationResult, record: &FieldRecord) -> ClassificationResult {
        let identifier = normalize(&record.identifier);
        for rule in self.rules.iter() {
            if let Some(mut corrected) = rule.apply(result, &identifier) {
                tracing::trace!("Correction {} applied to {}", rule.name, record.identifier);
                if let Some(trace) = corrected.match_trace.as_mut() {
                    trace.push_str(&format!("; corrected by {}", rule.name));
                }
                return corrected;
            }
        }
        result.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StrategyKind;
    use crate::registry::RuleCatalog;

    fn builtin() -> CorrectionTable {
        CorrectionTable::from_specs(&RuleCatalog::builtin().corrections).unwrap()
    }

    fn result(section: SectionNumber) -> ClassificationResult {
        ClassificationResult::new(section, 0.97, StrategyKind::IndexedForm)
    }

    #[test_log::test]
    fn test_area_index_becomes_entry() {
        let table = builtin();
        let record = FieldRecord::new("form1[0].Section16_3[0].#area[1].From_Datefield_Name_2[0]");
        let input = result(16).with_subsection(Some("3".to_string())).with_entry(Some(0));

        let corrected = table.correct(&input, &record);
        assert_eq!(corrected.entry, Some(2));
        assert_eq!(corrected.subsection.as_deref(), Some("3"));
    }

    #[test_log::test]
    fn test_leaf_index_bands() {
        let table = builtin();
        let cases = [(0, 1), (10, 1), (11, 2), (21, 2), (22, 3), (32, 3)];
        for (index, entry) in cases {
            let record = FieldRecord::new(&format!("form1[0].Section16_3[0].TextField11[{index}]"));
            let corrected = table.correct(&result(16), &record);
            assert_eq!(corrected.entry, Some(entry), "index {index}");
        }

        let outside = FieldRecord::new("form1[0].Section16_3[0].TextField11[40]");
        assert!(table.correct(&result(16), &outside).same_decision(&result(16)));
    }

    #[test_log::test]
    fn test_continuation_moves_to_next_section() {
        let table = builtin();
        let record = FieldRecord::new("form1[0].Section20_cont[0].TextField11[0]");
        let input = result(20).with_subsection(Some("cont".to_string()));

        let corrected = table.correct(&input, &record);
        assert_eq!(corrected.section, 21);
        assert_eq!(corrected.subsection, None);
    }

    #[test_log::test]
    fn test_rules_only_touch_their_section() {
        let table = builtin();
        let record = FieldRecord::new("form1[0].Section16_3[0].TextField11[12]");
        let input = result(15);
        assert_eq!(table.correct(&input, &record), input);
    }

    #[test_log::test]
    fn test_correction_is_idempotent() {
        let table = builtin();
        let records = [
            "form1[0].Section16_3[0].#area[2].TextField11[0]",
            "form1[0].Section16_3[0].TextField11[15]",
            "form1[0].Section20_cont[0].TextField11[0]",
            "form1[0].Section13_2[0].TextField11[0]",
        ];
        for identifier in records {
            let record = FieldRecord::new(identifier);
            let mut input = result(16);
            input.match_trace = Some("indexed_form".to_string());
            if identifier.contains("20") {
                input.section = 20;
            }
            let once = table.correct(&input, &record);
            let twice = table.correct(&once, &record);
            assert_eq!(once, twice, "{identifier}");
        }
    }

    #[test_log::test]
    fn test_trace_names_the_rule() {
        let table = builtin();
        let record = FieldRecord::new("form1[0].Section16_3[0].#area[0].TextField11[0]");
        let mut input = result(16);
        input.match_trace = Some("canonical".to_string());
        let corrected = table.correct(&input, &record);
        assert_eq!(
            corrected.match_trace.as_deref(),
            Some("canonical; corrected by section16-area-entry")
        );
    }

    #[test_log::test]
    fn test_set_subsection_action() {
        let specs = vec![CorrectionSpec {
            name: "section13-federal".to_string(),
            section: 13,
            trigger: r"section13_5".to_string(),
            action: CorrectionAction::SetSubsection {
                subsection: "B".to_string(),
            },
        }];
        let table = CorrectionTable::from_specs(&specs).unwrap();
        let record = FieldRecord::new("form1[0].section13_5[0].textfield11[0]");
        let corrected = table.correct(&result(13), &record);
        assert_eq!(corrected.subsection.as_deref(), Some("b"));
    }

    #[test_log::test]
    fn test_invalid_specs_are_rejected() {
        let no_capture = CorrectionSpec {
            name: "bad".to_string(),
            section: 16,
            trigger: r"area\[\d+\]".to_string(),
            action: CorrectionAction::EntryFromCapture { offset: 0 },
        };
        assert!(matches!(
            CorrectionRule::from_spec(&no_capture),
            Err(RegistryError::InvalidCorrection { .. })
        ));

        let self_move = CorrectionSpec {
            name: "loop".to_string(),
            section: 20,
            trigger: "cont".to_string(),
            action: CorrectionAction::ReassignSection { section: 20 },
        };
        assert!(CorrectionRule::from_spec(&self_move).is_err());

        let overlap = CorrectionSpec {
            name: "overlap".to_string(),
            section: 16,
            trigger: r"textfield11\[(?P<n>\d+)\]".to_string(),
            action: CorrectionAction::EntryFromIndexBands {
                bands: vec![
                    IndexBand { start: 0, end: 10, entry: 1 },
                    IndexBand { start: 10, end: 20, entry: 2 },
                ],
            },
        };
        assert!(CorrectionRule::from_spec(&overlap).is_err());

        let unknown = CorrectionSpec {
            name: "unknown".to_string(),
            section: 31,
            trigger: "x".to_string(),
            action: CorrectionAction::ReassignSection { section: 1 },
        };
        assert!(matches!(
            CorrectionRule::from_spec(&unknown),
            Err(RegistryError::UnknownSection { section: 31, .. })
        ));
    }
}
