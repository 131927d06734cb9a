//! Field fixtures and a seeded synthetic batch generator.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use strum::Display;

use crate::classifier::canonical_identifier;
use crate::config::SectionNumber;
use crate::models::{FieldRecord, FieldValue};
use crate::registry::sections::expectation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BuiltinFieldSet {
    Canonical,
    Markers,
    Spans,
    Content,
    Mixed,
}

fn canonical_fields() -> Vec<FieldRecord> {
    vec![
        FieldRecord::new("form1[0].Section11[0].TextField11[3]").with_page(11),
        FieldRecord::new("form1[0].Section11-2[0].School6_State[0]").with_page(12),
        FieldRecord::new("form1[0].Section11-4[0].From_Datefield_Name_2[0]").with_page(14),
        FieldRecord::new("form1[0].section_13_1-2[0].p3-t68[0]").with_page(20),
        FieldRecord::new("form1[0].#subform[12].section13_2[0].RadioButtonList[0]").with_page(22),
        FieldRecord::new("form1[0].Section16_1[0].TextField11[0]").with_page(43),
        FieldRecord::new("form1[0].Section16_3[0].#area[1].From_Datefield_Name_2[0]").with_page(44),
        FieldRecord::new("form1[0].Section16_3[0].TextField11[14]").with_page(45),
        FieldRecord::new("form1[0].Section20_cont[0].TextField11[0]").with_page(84),
        FieldRecord::new("form1[0].Section21d2[0].#field[25]").with_page(89),
    ]
}

fn marker_fields() -> Vec<FieldRecord> {
    vec![
        FieldRecord::new(r"form1[0].Section9\.1-9\.4[0].#field[10]").with_page(8),
        FieldRecord::new("form1[0].Section13_1[0].#subform[3].TextField11[0]"),
        FieldRecord::new("section21a[0].textfield11[0]"),
        FieldRecord::new("section13_2-2.TextField11"),
        FieldRecord::new("s_21_textfield"),
        FieldRecord::new("sec12_school_name").with_label("Name of school"),
        FieldRecord::new("field section=14 marker"),
        FieldRecord::new("my section 27 field"),
    ]
}

fn span_fields() -> Vec<FieldRecord> {
    vec![
        FieldRecord::new("form1[0].Sections7-9[0].p3-t68[0]"),
        FieldRecord::new("form1[0].Sections7-9[0].TextField11[1]").with_label("Passport number"),
        FieldRecord::new("form1[0].Sections7-9[0].email_address[0]"),
        FieldRecord::new("form1[0].Sections7-9[0].TextField11[3]").with_label("Passport of a naturalized citizen"),
        FieldRecord::new("form1[0].Sections7-9[0].TextField11[4]").with_page(8),
        FieldRecord::new("form1[0].Sections1-6[0].TextField11[2]").with_label("Social Security Number"),
        FieldRecord::new("form1[0].Sections1-6[0].DropDownList12[0]").with_label("Hair color"),
    ]
}

fn content_fields() -> Vec<FieldRecord> {
    vec![
        FieldRecord::new("form1[0].#subform[5].TextField11[0]")
            .with_value(FieldValue::Text("sect13A.1Entry1SupervisorName".to_string())),
        FieldRecord::new("form1[0].#subform[5].TextField11[1]")
            .with_value(FieldValue::List(vec!["n/a".to_string(), "Section 17 spouse".to_string()])),
        FieldRecord::new("form1[0].#subform[5].CheckBox1[0]").with_value(FieldValue::Flag(true)),
        FieldRecord::new("form1[0].#subform[6].TextField11[0]").with_label("Section 12 - Where you went to school"),
        FieldRecord::new("form1[0].#subform[6].TextField11[1]").with_page(20),
        FieldRecord::new("form1[0].#subform[6].TextField11[2]").with_page(5),
        FieldRecord::new(""),
        FieldRecord::new(" [].# "),
    ]
}

/// Returns a fixed set of realistic field records.
pub fn builtin_fields(set: BuiltinFieldSet) -> Vec<FieldRecord> {
    match set {
        BuiltinFieldSet::Canonical => canonical_fields(),
        BuiltinFieldSet::Markers => marker_fields(),
        BuiltinFieldSet::Spans => span_fields(),
        BuiltinFieldSet::Content => content_fields(),
        BuiltinFieldSet::Mixed => {
            let mut records = canonical_fields();
            records.extend(marker_fields());
            records.extend(span_fields());
            records.extend(content_fields());
            records
        }
    }
}

const LEAVES: [&str; 7] = [
    "TextField11",
    "RadioButtonList",
    "CheckBox1",
    "DropDownList12",
    "School6_State",
    "From_Datefield_Name_2",
    "#field",
];

const SPAN_LABELS: [&str; 6] = [
    "Passport number",
    "Email address",
    "Alien registration number",
    "Home phone",
    "Other information",
    "Continue on next page",
];

fn pick<'a>(rng: &mut StdRng, items: &[&'a str]) -> &'a str {
    items[rng.random_range(0..items.len())]
}

fn page_in(rng: &mut StdRng, section: SectionNumber) -> u16 {
    match expectation(section) {
        Some(e) => rng.random_range(e.page_start..=e.page_end),
        None => 1,
    }
}

/// Generates a reproducible batch of `count` records.
///
/// The mix covers canonical paths, lettered and entry markers, resolvable and
/// unresolvable spans, value and page evidence, unclassifiable containers and
/// malformed identifiers.
pub fn synthetic_batch(count: usize, seed: u64) -> Vec<FieldRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::with_capacity(count);

    for i in 0..count {
        let section: SectionNumber = rng.random_range(1..=30);
        let index: u32 = rng.random_range(0..40);
        let leaf = pick(&mut rng, &LEAVES);
        let roll: u32 = rng.random_range(0..100);

        let record = match roll {
            0..=39 => {
                let subsections = expectation(section).map_or(&[][..], |e| e.subsections);
                let subsection = if subsections.is_empty() || rng.random_bool(0.3) {
                    None
                } else {
                    Some(subsections[rng.random_range(0..subsections.len())])
                };
                let entry: u32 = rng.random_range(0..4);
                let identifier = canonical_identifier(section, subsection, entry)
                    .replace("#field[0]", &format!("{}[{}]", leaf, index));
                FieldRecord::new(&identifier).with_page(page_in(&mut rng, section))
            }
            40..=54 => {
                let identifier = format!("section{}_{}-{}.{}[{}]", section, index % 5 + 1, index % 3 + 1, leaf, index);
                FieldRecord::new(&identifier)
            }
            55..=64 => {
                let mut record = FieldRecord::new(&format!("form1[0].Sections7-9[0].{}[{}]", leaf, index));
                if rng.random_bool(0.6) {
                    record = record.with_label(pick(&mut rng, &SPAN_LABELS));
                }
                record
            }
            65..=74 => FieldRecord::new(&format!("form1[0].#subform[{}].{}[{}]", i % 7, leaf, index)).with_value(
                FieldValue::Text(format!("sect{}Entry{}Field{}", section, index % 4 + 1, i)),
            ),
            75..=84 => {
                let page = page_in(&mut rng, section);
                FieldRecord::new(&format!("form1[0].#subform[{}].{}[{}]", i % 5, leaf, index)).with_page(page)
            }
            85..=94 => FieldRecord::new(&format!("form1[0].#subform[{}].{}[{}]", i % 3, leaf, index)),
            _ => FieldRecord::new(if rng.random_bool(0.5) { "" } else { " .[]# " }),
        };
        records.push(record);
    }
    records
}

/// Returns a copy of `records` in a seeded random order.
pub fn shuffled(records: &[FieldRecord], seed: u64) -> Vec<FieldRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut copy = records.to_vec();
    copy.shuffle(&mut rng);
    copy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_batch_is_reproducible() {
        let a = synthetic_batch(300, 11);
        let b = synthetic_batch(300, 11);
        let c = synthetic_batch(300, 12);
        assert_eq!(a.len(), 300);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_shuffle_keeps_records() {
        let records = builtin_fields(BuiltinFieldSet::Mixed);
        let mut a: Vec<String> = shuffled(&records, 5).into_iter().map(|r| r.identifier).collect();
        let mut b: Vec<String> = records.into_iter().map(|r| r.identifier).collect();
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn test_builtin_sets_are_named() {
        assert_eq!(BuiltinFieldSet::Spans.to_string(), "Spans");
        assert!(builtin_fields(BuiltinFieldSet::Mixed).len() > builtin_fields(BuiltinFieldSet::Canonical).len());
    }
}
