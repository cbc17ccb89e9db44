// Copyright (c) 2025 - Cowboy AI, Inc.
//! DNS Label Validation
//!
//! Network, cluster, datacenter, node, partition and namespace names all end
//! up embedded in container names, hostnames and catalog keys. Each one must
//! therefore be a single RFC 1123 label.

use thiserror::Error;

/// Label validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("label is empty")]
    Empty,

    #[error("label exceeds maximum length of 63 characters: {0}")]
    TooLong(String),

    #[error("invalid character {ch:?} in label {label:?}")]
    InvalidCharacter { label: String, ch: char },

    #[error("label cannot start or end with hyphen: {0}")]
    InvalidLabelFormat(String),
}

/// Maximum length for a single label (RFC 1123)
pub const MAX_LABEL_LENGTH: usize = 63;

/// Validate a single DNS label.
///
/// # Rules
/// - Non-empty, at most 63 characters
/// - ASCII alphanumerics and hyphens only
/// - Cannot start or end with a hyphen
pub fn validate_label(label: &str) -> Result<(), LabelError> {
    if label.is_empty() {
        return Err(LabelError::Empty);
    }

    if label.len() > MAX_LABEL_LENGTH {
        return Err(LabelError::TooLong(label.to_string()));
    }

    if let Some(ch) = label
        .chars()
        .find(|ch| !ch.is_ascii_alphanumeric() && *ch != '-')
    {
        return Err(LabelError::InvalidCharacter {
            label: label.to_string(),
            ch,
        });
    }

    if label.starts_with('-') || label.ends_with('-') {
        return Err(LabelError::InvalidLabelFormat(label.to_string()));
    }

    Ok(())
}

/// Convenience predicate over [`validate_label`].
pub fn is_valid_label(label: &str) -> bool {
    validate_label(label).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("dc1" ; "short")]
    #[test_case("dc1-server1" ; "with hyphen")]
    #[test_case("9lives" ; "leading digit")]
    #[test_case("A" ; "single char")]
    fn test_valid_labels(label: &str) {
        assert!(is_valid_label(label), "{label} should be valid");
    }

    #[test]
    fn test_empty_label() {
        assert_eq!(validate_label(""), Err(LabelError::Empty));
    }

    #[test]
    fn test_label_too_long() {
        let long = "a".repeat(64);
        assert!(matches!(validate_label(&long), Err(LabelError::TooLong(_))));
        assert!(is_valid_label(&"a".repeat(63)));
    }

    #[test]
    fn test_invalid_characters() {
        assert_eq!(
            validate_label("dc_1"),
            Err(LabelError::InvalidCharacter {
                label: "dc_1".into(),
                ch: '_'
            })
        );
        assert!(!is_valid_label("dc1.example"));
        assert!(!is_valid_label("ns/app"));
    }

    #[test]
    fn test_hyphen_boundaries() {
        assert!(matches!(
            validate_label("-dc1"),
            Err(LabelError::InvalidLabelFormat(_))
        ));
        assert!(matches!(
            validate_label("dc1-"),
            Err(LabelError::InvalidLabelFormat(_))
        ));
    }
}
