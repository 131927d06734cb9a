use serde::{Deserialize, Serialize};

pub type SectionNumber = u8;
pub type PageNumber = u16;

/// Number of top-level sections in the questionnaire outline.
pub const SECTION_COUNT: SectionNumber = 30;

/// Lower bound of the "high" confidence tier.
pub const HIGH_CONFIDENCE: f32 = 0.8;
/// Lower bound of the "medium" confidence tier.
pub const MEDIUM_CONFIDENCE: f32 = 0.5;

/// Clamps a threshold into `[0, 1]`. NaN becomes `0.0`.
fn unit_interval(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Returns `true` if `section` addresses one of the outline's sections.
pub fn is_valid_section(section: SectionNumber) -> bool {
    (1..=SECTION_COUNT).contains(&section)
}

/// `ClassifyOptions` controls a single classification call.
///
/// # Fields
///
/// * `verbose` - Populates `match_trace` on results. Never changes the decision itself.
/// * `min_confidence` - Confidence floor. `0.0` accepts whatever the first matching strategy yields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifyOptions {
    pub verbose: bool,
    pub min_confidence: f32,
}

impl ClassifyOptions {
    /// Creates a new `ClassifyOptions` with `verbose = false` and `min_confidence = 0.0`.
    pub fn new() -> ClassifyOptions {
        ClassifyOptions {
            verbose: false,
            min_confidence: 0.0,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> ClassifyOptions {
        self.verbose = verbose;
        return self;
    }

    /// Sets the confidence floor, clamped into `[0, 1]`. NaN resets the floor to `0.0`.
    pub fn with_min_confidence(mut self, min_confidence: f32) -> ClassifyOptions {
        self.min_confidence = unit_interval(min_confidence);
        return self;
    }
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// `ReportConfig` holds the thresholds used by the aggregator and the report generator.
///
/// # Fields
///
/// * `review_threshold` - Sections whose mean confidence falls below this value are recommended for manual review.
/// * `anomaly_tolerance` - Relative deviation from the expected field count tolerated before a section is flagged.
/// * `high_confidence` - Lower bound of the high tier, also the bar a subsection must clear to count as detected.
/// * `medium_confidence` - Lower bound of the medium tier.
/// * `min_cluster_size` - Minimum number of fields sharing a container token before a subsection is inferred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    pub review_threshold: f32,
    pub anomaly_tolerance: f32,
    pub high_confidence: f32,
    pub medium_confidence: f32,
    pub min_cluster_size: usize,
}

impl ReportConfig {
    pub fn new() -> ReportConfig {
        ReportConfig {
            review_threshold: 0.7,
            anomaly_tolerance: 0.5,
            high_confidence: HIGH_CONFIDENCE,
            medium_confidence: MEDIUM_CONFIDENCE,
            min_cluster_size: 2,
        }
    }

    pub fn with_review_threshold(mut self, threshold: f32) -> ReportConfig {
        self.review_threshold = unit_interval(threshold);
        return self;
    }

    pub fn with_anomaly_tolerance(mut self, tolerance: f32) -> ReportConfig {
        self.anomaly_tolerance = tolerance.max(0.0);
        return self;
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_options_defaults() {
        let options = ClassifyOptions::default();
        assert!(!options.verbose);
        assert_eq!(options.min_confidence, 0.0);
    }

    #[test]
    fn test_min_confidence_is_clamped() {
        assert_eq!(ClassifyOptions::new().with_min_confidence(1.7).min_confidence, 1.0);
        assert_eq!(ClassifyOptions::new().with_min_confidence(-0.2).min_confidence, 0.0);
        assert_eq!(ClassifyOptions::new().with_min_confidence(f32::NAN).min_confidence, 0.0);
        assert_eq!(ReportConfig::new().with_review_threshold(f32::NAN).review_threshold, 0.0);
        assert_eq!(ReportConfig::new().with_anomaly_tolerance(f32::NAN).anomaly_tolerance, 0.0);
    }

    #[test]
    fn test_section_bounds() {
        assert!(!is_valid_section(0));
        assert!(is_valid_section(1));
        assert!(is_valid_section(30));
        assert!(!is_valid_section(31));
    }
}
