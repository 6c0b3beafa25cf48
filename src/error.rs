// SPDX-License-Identifier: MIT
//! Error types for value parsing and environment configuration.

use std::fmt::{self, Display, Formatter};

use thiserror::Error;

/// Validation rule that rejected a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Rule {
    /// No `<digits><unit>` component was found in a duration string.
    Duration,
    /// A matched duration unit had no entry in the unit table.
    DurationUnit,
    /// A size string did not have the `<number>[unit]` shape.
    Size,
    /// A matched size unit had no entry in the unit table.
    SizeUnit,
    /// A boolean flag was not one of the accepted spellings.
    Flag,
}

impl Rule {
    /// Stable machine-readable tag for the rule.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Duration => "duration",
            Self::DurationUnit => "duration_unit",
            Self::Size => "size",
            Self::SizeUnit => "size_unit",
            Self::Flag => "flag",
        }
    }
}

impl Display for Rule {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A duration or size string failed validation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid {rule} value {value:?}")]
pub struct ValidationError {
    /// The offending input, exactly as supplied.
    pub value: String,
    /// Which rule rejected it.
    pub rule: Rule,
}

impl ValidationError {
    pub(crate) fn new(value: &str, rule: Rule) -> Self {
        Self {
            value: value.to_string(),
            rule,
        }
    }

    pub(crate) fn flag(value: &str) -> Self {
        Self::new(value, Rule::Flag)
    }
}

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The variable was set but its value did not parse.
    #[error("environment variable {name} is invalid")]
    InvalidVar {
        /// Variable name.
        name: String,
        /// Parser failure for the value.
        #[source]
        source: ValidationError,
    },
    /// The variable was set to a value that is not valid unicode.
    #[error("environment variable {name} is not valid unicode")]
    NotUnicode {
        /// Variable name.
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn rule_tags_are_stable() {
        assert_eq!(Rule::Duration.as_str(), "duration");
        assert_eq!(Rule::DurationUnit.as_str(), "duration_unit");
        assert_eq!(Rule::Size.as_str(), "size");
        assert_eq!(Rule::SizeUnit.as_str(), "size_unit");
        assert_eq!(Rule::Flag.as_str(), "flag");
    }

    #[test]
    fn validation_error_display_names_rule_and_value() {
        let err = ValidationError::new("abc", Rule::Duration);
        assert_eq!(err.to_string(), "invalid duration value \"abc\"");
    }

    #[test]
    fn config_error_keeps_validation_source() {
        let err = ConfigError::InvalidVar {
            name: "LOGSHIP_EXPORT_TIMEOUT".into(),
            source: ValidationError::new("soon", Rule::Duration),
        };
        assert_eq!(
            err.to_string(),
            "environment variable LOGSHIP_EXPORT_TIMEOUT is invalid"
        );
        let source = err.source().expect("source present");
        assert_eq!(source.to_string(), "invalid duration value \"soon\"");

        let err = ConfigError::NotUnicode {
            name: "RUST_ENV".into(),
        };
        assert!(err.source().is_none());
    }
}
