//! Candidate name validation, run before any network work.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const DEFAULT_MAX_NAME_LEN: usize = 50;

/// Which characters a candidate name may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NamePolicy {
    #[default]
    LettersOnly,
    LettersAndDigits,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("name must be a single word without spaces")]
    ContainsWhitespace,
    #[error("name may only contain English letters")]
    NonAlphabetic,
    #[error("name is {len} characters long, the limit is {max}")]
    TooLong { len: usize, max: usize },
}

/// A validated, trimmed candidate name. Only `NameValidator` creates these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CandidateName(String);

impl CandidateName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased form used for all comparisons.
    pub fn folded(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CandidateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CandidateName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct NameValidator {
    policy: NamePolicy,
    max_len: usize,
}

impl Default for NameValidator {
    fn default() -> Self {
        Self {
            policy: NamePolicy::default(),
            max_len: DEFAULT_MAX_NAME_LEN,
        }
    }
}

impl NameValidator {
    pub fn new(policy: NamePolicy, max_len: usize) -> Self {
        Self { policy, max_len }
    }

    pub fn with_policy(mut self, policy: NamePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn validate(&self, raw: &str) -> Result<CandidateName, ValidationError> {
        let name = raw.trim();

        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }

        if name.chars().any(char::is_whitespace) {
            return Err(ValidationError::ContainsWhitespace);
        }

        let allowed = |c: char| match self.policy {
            NamePolicy::LettersOnly => c.is_ascii_alphabetic(),
            NamePolicy::LettersAndDigits => c.is_ascii_alphanumeric(),
        };
        if !name.chars().all(allowed) {
            return Err(ValidationError::NonAlphabetic);
        }

        // All remaining chars are ASCII, so byte length is character length.
        if name.len() > self.max_len {
            return Err(ValidationError::TooLong {
                len: name.len(),
                max: self.max_len,
            });
        }

        Ok(CandidateName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_and_accepts() {
        let validator = NameValidator::default();
        let name = validator.validate("  Monica \n").unwrap();
        assert_eq!(name.as_str(), "Monica");
        assert_eq!(name.folded(), "monica");
    }

    #[test]
    fn test_rule_order() {
        let validator = NameValidator::default();
        assert_eq!(validator.validate("   "), Err(ValidationError::EmptyName));
        // Whitespace is reported before the character check
        assert_eq!(
            validator.validate("blue 42"),
            Err(ValidationError::ContainsWhitespace)
        );
        assert_eq!(
            validator.validate("nova\tstar"),
            Err(ValidationError::ContainsWhitespace)
        );
        assert_eq!(validator.validate("café"), Err(ValidationError::NonAlphabetic));
        assert_eq!(validator.validate("nova-x"), Err(ValidationError::NonAlphabetic));
    }

    #[test]
    fn test_digit_policy() {
        let strict = NameValidator::default();
        assert_eq!(strict.validate("nova7"), Err(ValidationError::NonAlphabetic));

        let relaxed = NameValidator::default().with_policy(NamePolicy::LettersAndDigits);
        assert_eq!(relaxed.validate("nova7").unwrap().as_str(), "nova7");
        assert_eq!(relaxed.validate("nova_7"), Err(ValidationError::NonAlphabetic));
    }

    #[test]
    fn test_max_len() {
        let validator = NameValidator::default().with_max_len(5);
        assert!(validator.validate("abcde").is_ok());
        assert_eq!(
            validator.validate("abcdef"),
            Err(ValidationError::TooLong { len: 6, max: 5 })
        );

        let long = "a".repeat(DEFAULT_MAX_NAME_LEN + 1);
        assert!(matches!(
            NameValidator::default().validate(&long),
            Err(ValidationError::TooLong { .. })
        ));
    }
}
