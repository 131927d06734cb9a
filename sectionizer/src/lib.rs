//! # Sectionizer
//!
//! The `sectionizer` library assigns raw field identifiers extracted from a fillable
//! questionnaire to a location in its 30-section outline
//! (section → subsection → entry → sub-entry), together with a confidence score.
//!
//! Records flow one way:
//! normalizer → strategy chain (consulting the pattern registry) → corrections →
//! aggregator → report.
//!
//! ## Quick Start
//!
//! Add the library to your project's dependencies in `Cargo.toml`:
//!
//! ```bash
//! cargo add sectionizer
//! ```
//!
//! ## Examples
//!
//! Classify a single field:
//!
//! ```rust
//! # use sectionizer::models::FieldRecord;
//! # use sectionizer::pipeline::Sectionizer;
//! # fn main() -> anyhow::Result<()> {
//! let sectionizer = Sectionizer::new()?;
//! let record = FieldRecord::new("form1[0].Sections7-9[0].TextField11[1]").with_label("Passport number");
//! let result = sectionizer.classify_record(&record)?.unwrap();
//! assert_eq!(result.section, 8);
//! # Ok(())
//! # }
//! ```
//!
//! Run a whole batch and print the summary:
//!
//! ```rust
//! # use sectionizer::pipeline::{records_from_json, Sectionizer};
//! # fn main() -> anyhow::Result<()> {
//! let json = r#"[{"name": "form1[0].Section11[0].TextField11[0]", "page": 11}]"#;
//! let records = records_from_json(json)?;
//! let run = Sectionizer::new()?.run_parsed(&records);
//! println!("{}", run.summary.render_text());
//! # Ok(())
//! # }
//! ```
//!
//! ## Tests
//!
//! ```sh
//! cargo test
//! ```

pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod corrections;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod test_utils;
