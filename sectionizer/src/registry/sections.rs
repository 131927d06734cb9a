//! Structural expectations for the 30 questionnaire sections.
//!
//! The aggregator compares what it finds against this table. The strategy chain
//! never reads it directly; the built-in catalog copies the page ranges from here
//! into its own page rules.

use serde::Serialize;

use crate::config::{PageNumber, SectionNumber};

/// The `SectionStructureExpectation` struct describes what a section is expected to look like.
///
/// # Fields
///
/// * `section` - Section number.
/// * `name` - Display name.
/// * `expected_fields` - Typical field count of a complete form.
/// * `page_start` - First page the section occupies.
/// * `page_end` - Last page the section occupies.
/// * `subsections` - Known subsection taxonomy. Empty if the section has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionStructureExpectation {
    pub section: SectionNumber,
    pub name: &'static str,
    pub expected_fields: usize,
    pub page_start: PageNumber,
    pub page_end: PageNumber,
    pub subsections: &'static [&'static str],
}

impl SectionStructureExpectation {
    pub fn contains_page(&self, page: PageNumber) -> bool {
        self.page_start <= page && page <= self.page_end
    }

    pub fn knows_subsection(&self, subsection: &str) -> bool {
        self.subsections.iter().any(|s| *s == subsection)
    }
}

const fn expect(
    section: SectionNumber,
    name: &'static str,
    expected_fields: usize,
    pages: (PageNumber, PageNumber),
    subsections: &'static [&'static str],
) -> SectionStructureExpectation {
    SectionStructureExpectation {
        section,
        name,
        expected_fields,
        page_start: pages.0,
        page_end: pages.1,
        subsections,
    }
}

const NONE: &[&str] = &[];

pub static SECTION_EXPECTATIONS: [SectionStructureExpectation; 30] = [
    expect(1, "Full Name", 4, (5, 5), NONE),
    expect(2, "Date of Birth", 2, (5, 5), NONE),
    expect(3, "Place of Birth", 5, (5, 5), NONE),
    expect(4, "Social Security Number", 2, (5, 5), NONE),
    expect(5, "Other Names Used", 45, (5, 6), NONE),
    expect(6, "Your Identifying Information", 6, (6, 6), NONE),
    expect(7, "Your Contact Information", 17, (6, 6), NONE),
    expect(8, "U.S. Passport Information", 10, (6, 7), NONE),
    expect(9, "Citizenship", 78, (7, 9), &["1", "2", "3", "4"]),
    expect(10, "Dual/Multiple Citizenship & Foreign Passport Info", 122, (9, 11), &["1", "2"]),
    expect(11, "Where You Have Lived", 252, (11, 15), NONE),
    expect(12, "Where You Went to School", 150, (15, 19), NONE),
    expect(13, "Employment Activities", 1086, (19, 39), &["1", "2", "3", "4", "5", "6", "a", "b", "c"]),
    expect(14, "Selective Service", 5, (39, 40), NONE),
    expect(15, "Military History", 95, (40, 43), &["1", "2", "3"]),
    expect(16, "People Who Know You Well", 154, (43, 46), &["1", "3"]),
    expect(17, "Marital/Relationship Status", 332, (46, 53), &["1", "2", "3"]),
    expect(18, "Relatives", 964, (53, 63), &["1", "2", "3", "4", "5"]),
    expect(19, "Foreign Contacts", 277, (63, 67), NONE),
    expect(20, "Foreign Business, Activities, Government Contacts", 790, (67, 85), &["a", "b", "c"]),
    expect(
        21,
        "Psychological and Emotional Health",
        486,
        (85, 91),
        &["a", "a2", "b", "b2", "c", "d1", "d2", "d3", "e", "e1"],
    ),
    expect(22, "Police Record", 267, (91, 95), &["1", "2", "3", "4", "5", "6"]),
    expect(23, "Illegal Use of Drugs or Drug Activity", 191, (95, 98), &["1", "2", "3", "4", "5", "6"]),
    expect(24, "Use of Alcohol", 160, (98, 100), &["1", "2", "3", "4"]),
    expect(25, "Investigations and Clearance", 79, (100, 101), &["1", "2", "3"]),
    expect(26, "Financial Record", 237, (101, 110), &["1", "2", "3", "4", "5", "6", "7", "8", "9"]),
    expect(27, "Use of Information Technology Systems", 57, (110, 111), &["1", "2", "3"]),
    expect(28, "Involvement in Non-Criminal Court Actions", 23, (111, 112), NONE),
    expect(29, "Association Record", 141, (112, 115), &["1", "2", "3", "4", "5", "6", "7"]),
    expect(30, "General Remarks / Continuation", 25, (115, 136), NONE),
];

/// Returns the expectation of `section`, if it is a valid section.
pub fn expectation(section: SectionNumber) -> Option<&'static SectionStructureExpectation> {
    SECTION_EXPECTATIONS.iter().find(|e| e.section == section)
}

/// Returns the display name of `section`.
pub fn section_name(section: SectionNumber) -> &'static str {
    expectation(section).map_or("Unknown Section", |e| e.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{is_valid_section, SECTION_COUNT};

    #[test]
    fn test_table_covers_every_section_in_order() {
        assert_eq!(SECTION_EXPECTATIONS.len(), SECTION_COUNT as usize);
        for (i, e) in SECTION_EXPECTATIONS.iter().enumerate() {
            assert_eq!(e.section as usize, i + 1);
            assert!(is_valid_section(e.section));
            assert!(e.page_start <= e.page_end, "section {} has inverted pages", e.section);
            assert!(e.expected_fields > 0);
        }
    }

    #[test]
    fn test_section_21_taxonomy() {
        let e = expectation(21).unwrap();
        for sub in ["a", "a2", "b", "b2", "c", "d1", "d2", "d3", "e", "e1"] {
            assert!(e.knows_subsection(sub), "missing {sub}");
        }
        assert!(!e.knows_subsection("f"));
    }

    #[test]
    fn test_lookup() {
        assert_eq!(section_name(8), "U.S. Passport Information");
        assert_eq!(section_name(31), "Unknown Section");
        assert!(expectation(0).is_none());
        assert!(expectation(13).unwrap().contains_page(20));
        assert!(!expectation(13).unwrap().contains_page(40));
    }
}
