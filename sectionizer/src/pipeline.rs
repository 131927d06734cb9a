use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::aggregator::{aggregate, StructureReport};
use crate::classifier::Classifier;
use crate::config::{ClassifyOptions, ReportConfig};
use crate::corrections::CorrectionTable;
use crate::error::{FieldError, RegistryError};
use crate::models::{ClassificationResult, FieldOutcome, FieldRecord};
use crate::registry::{PatternRegistry, RuleCatalog};
use crate::report::{summarize, Summary};

/// The `Sectionizer` struct runs the whole pipeline: normalize, classify, correct,
/// aggregate and summarize.
///
/// # Fields
///
/// * `registry` - Compiled matcher rules, shared read-only by all workers.
/// * `corrections` - Post-classification correction table.
/// * `options` - Verbosity and confidence floor applied to every record.
/// * `report_config` - Thresholds used by the aggregator and the summary.
#[derive(Debug, Clone)]
pub struct Sectionizer {
    registry: PatternRegistry,
    corrections: CorrectionTable,
    options: ClassifyOptions,
    report_config: ReportConfig,
}

/// Everything a batch run produces.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub outcomes: Vec<FieldOutcome>,
    pub structure: StructureReport,
    pub summary: Summary,
}

/// Serializable per-field row of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRow {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<ClassificationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&FieldOutcome> for FieldRow {
    fn from(outcome: &FieldOutcome) -> Self {
        FieldRow {
            identifier: outcome.record.identifier.clone(),
            classification: outcome.classification().cloned(),
            error: outcome.error().map(|e| e.to_string()),
        }
    }
}

impl Sectionizer {
    /// Builds a pipeline from the built-in catalog.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if the catalog fails validation.
    pub fn new() -> Result<Sectionizer, RegistryError> {
        Sectionizer::from_catalog(&RuleCatalog::builtin())
    }

    /// Builds a pipeline from a catalog. Both the registry and the correction
    /// table are validated; any defect is fatal.
    pub fn from_catalog(catalog: &RuleCatalog) -> Result<Sectionizer, RegistryError> {
        let registry = PatternRegistry::from_catalog(catalog)?;
        let corrections = CorrectionTable::from_specs(&catalog.corrections)?;
        Ok(Sectionizer {
            registry,
            corrections,
            options: ClassifyOptions::new(),
            report_config: ReportConfig::new(),
        })
    }

    pub fn with_options(mut self, options: ClassifyOptions) -> Sectionizer {
        self.options = options;
        return self;
    }

    pub fn with_report_config(mut self, report_config: ReportConfig) -> Sectionizer {
        self.report_config = report_config;
        return self;
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    pub fn corrections(&self) -> &CorrectionTable {
        &self.corrections
    }

    pub fn options(&self) -> &ClassifyOptions {
        &self.options
    }

    pub fn report_config(&self) -> &ReportConfig {
        &self.report_config
    }

    /// Classifies and corrects one record.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError`] if the identifier is malformed.
    pub fn classify_record(&self, record: &FieldRecord) -> Result<Option<ClassificationResult>, FieldError> {
        let classifier = Classifier::new(&self.registry);
        let result = classifier.classify(record, &self.options)?;
        Ok(result.map(|r| self.corrections.correct(&r, record)))
    }

    /// Classifies and corrects records in parallel. Output order follows input order.
    pub fn classify_batch(&self, records: &[FieldRecord]) -> Vec<FieldOutcome> {
        records
            .par_iter()
            .map(|record| FieldOutcome {
                record: record.clone(),
                result: self.classify_record(record),
            })
            .collect()
    }

    pub fn aggregate(&self, outcomes: &[FieldOutcome]) -> StructureReport {
        aggregate(outcomes, &self.report_config)
    }

    pub fn summarize(&self, report: &StructureReport) -> Summary {
        summarize(report, &self.report_config).with_registry_version(self.registry.version())
    }

    /// Runs the full pipeline over a batch.
    ///
    /// # Arguments
    ///
    /// * `records` - The batch, in any order. May be empty.
    ///
    /// # Returns
    ///
    /// Per-record outcomes in input order, the structural report and the summary.
    pub fn run(&self, records: &[FieldRecord]) -> BatchReport {
        let time = std::time::Instant::now();
        self.log_start(records.len());
        let outcomes = self.classify_batch(records);
        self.finish(outcomes, time)
    }

    /// Runs the full pipeline over records parsed by [`records_from_json`].
    ///
    /// Elements rejected while parsing are reported as malformed outcomes in
    /// place, next to the classified ones.
    pub fn run_parsed(&self, records: &[Result<FieldRecord, FieldError>]) -> BatchReport {
        let time = std::time::Instant::now();
        self.log_start(records.len());
        let outcomes: Vec<FieldOutcome> = records
            .par_iter()
            .map(|parsed| match parsed {
                Ok(record) => FieldOutcome {
                    record: record.clone(),
                    result: self.classify_record(record),
                },
                Err(err) => FieldOutcome {
                    record: FieldRecord::new(err.identifier()),
                    result: Err(err.clone()),
                },
            })
            .collect();
        self.finish(outcomes, time)
    }

    fn log_start(&self, count: usize) {
        if self.options.verbose {
            tracing::info!("Classifying {} fields with registry {}", count, self.registry.version());
        }
    }

    fn finish(&self, outcomes: Vec<FieldOutcome>, time: std::time::Instant) -> BatchReport {
        let verbose = self.options.verbose;
        if verbose {
            let classified = outcomes.iter().filter(|o| o.is_classified()).count();
            tracing::info!(
                "Classified {}/{} fields in {:.2}s",
                classified,
                outcomes.len(),
                time.elapsed().as_secs_f32()
            );
        }
        for outcome in outcomes.iter() {
            if let Some(err) = outcome.error() {
                tracing::warn!("Skipped field: {}", err);
            }
        }

        let structure = self.aggregate(&outcomes);
        if verbose {
            tracing::info!(
                "Aggregated {} sections in {:.2}s",
                structure.sections.len(),
                time.elapsed().as_secs_f32()
            );
        }

        let summary = self.summarize(&structure);
        if verbose {
            tracing::info!(
                "Summarized with {} recommendations in {:.2}s",
                summary.recommendations.len(),
                time.elapsed().as_secs_f32()
            );
        }

        BatchReport {
            outcomes,
            structure,
            summary,
        }
    }
}

/// One element of a field dump, kept as raw JSON until it is validated.
///
/// Validation is per element, so a record with a missing or non-string
/// identifier is rejected on its own while the rest of the dump still loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(serde_json::Value);

impl RawRecord {
    /// Converts the raw element into a [`FieldRecord`].
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::MalformedIdentifier`] when the element is not a valid
    /// record. The error names the identifier as found in the dump (its JSON
    /// text when it is not a string, empty when it is missing).
    pub fn into_record(self) -> Result<FieldRecord, FieldError> {
        let identifier = match self.0.get("identifier").or_else(|| self.0.get("name")) {
            Some(serde_json::Value::String(identifier)) => identifier.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        serde_json::from_value(self.0).map_err(|err| FieldError::MalformedIdentifier {
            identifier,
            reason: format!("invalid field record: {}", err),
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordDocument {
    Records(Vec<RawRecord>),
    Dump { fields: Vec<RawRecord> },
}

/// Parses field records from JSON.
///
/// Accepts either a bare array of records or an extraction dump of the form
/// `{"fields": [...]}`. Each element is validated on its own: a bad element
/// becomes an `Err` in the returned list and never hides the others.
///
/// # Errors
///
/// Fails only when the document itself is not an array or a dump.
pub fn records_from_json(json: &str) -> Result<Vec<Result<FieldRecord, FieldError>>> {
    let document: RecordDocument =
        serde_json::from_str(json).context("Failed to parse field records; expected an array or {\"fields\": [...]}")?;
    let raw = match document {
        RecordDocument::Records(records) => records,
        RecordDocument::Dump { fields } => fields,
    };
    return Ok(raw.into_iter().map(RawRecord::into_record).collect());
}
