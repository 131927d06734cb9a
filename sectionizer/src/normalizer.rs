//! Identifier normalization.
//!
//! Every pattern in the registry is authored against lower-case, trimmed
//! identifiers. Brackets, dots, dashes, underscores and backslashes are kept as-is
//! because the strategies read structure out of them.

use crate::error::FieldError;

/// Lower-cases and trims an identifier. Total and side-effect free.
///
/// # Arguments
///
/// * `identifier` - The raw identifier.
///
/// # Returns
///
/// The canonical form used for matching.
pub fn normalize(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

/// Validates an identifier at the pipeline boundary and normalizes it.
///
/// # Errors
///
/// Returns [`FieldError::MalformedIdentifier`] if the identifier is empty after
/// trimming or contains no alphanumeric character at all.
pub fn normalize_identifier(identifier: &str) -> Result<String, FieldError> {
    let normalized = normalize(identifier);
    if normalized.is_empty() {
        return Err(FieldError::MalformedIdentifier {
            identifier: identifier.to_string(),
            reason: "identifier is empty".to_string(),
        });
    }
    if !normalized.chars().any(|c| c.is_alphanumeric()) {
        return Err(FieldError::MalformedIdentifier {
            identifier: identifier.to_string(),
            reason: "identifier has no alphanumeric content".to_string(),
        });
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_keeps_structure() {
        assert_eq!(
            normalize("  form1[0].Sections7-9[0].TextField11[1] "),
            "form1[0].sections7-9[0].textfield11[1]"
        );
        assert_eq!(
            normalize(r"form1[0].Section9\.1-9\.4[0].#field[10]"),
            r"form1[0].section9\.1-9\.4[0].#field[10]"
        );
        assert_eq!(normalize("section_13_1-2"), "section_13_1-2");
    }

    #[test]
    fn test_normalize_is_total() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_normalize_identifier_rejects_empty() {
        let err = normalize_identifier("").unwrap_err();
        assert_eq!(err.identifier(), "");
        assert!(err.to_string().contains("empty"));

        let err = normalize_identifier(" \t ").unwrap_err();
        assert_eq!(err.identifier(), " \t ");
    }

    #[test]
    fn test_normalize_identifier_rejects_punctuation_only() {
        let err = normalize_identifier("[].#").unwrap_err();
        assert!(err.to_string().contains("alphanumeric"));
    }

    #[test]
    fn test_normalize_identifier_accepts_regular_names() {
        assert_eq!(
            normalize_identifier("Section21A[0].TextField11[0]").unwrap(),
            "section21a[0].textfield11[0]"
        );
    }
}
