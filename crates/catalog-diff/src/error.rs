//! Error types for catalog comparison.
//!
//! Errors are categorized so callers can tell configuration mistakes
//! (fatal at setup) apart from bad input and from internal bugs.

use std::path::PathBuf;
use thiserror::Error;

/// Broad classes of failure, used by callers to pick an exit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed ignore rule, bad regex, unknown filter name
    Configuration,
    /// A supplied catalog is unusable
    Input,
    /// Two resources share an identity after normalization
    Identity,
    /// A bug: an invariant of the differ did not hold
    Internal,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Configuration => "Configuration error",
            Self::Input => "Invalid catalog input",
            Self::Identity => "Duplicate resource identity",
            Self::Internal => "Internal error",
        }
    }
}

/// Errors that can occur while loading, validating or comparing catalogs.
#[derive(Debug, Error)]
pub enum Error {
    /// An ignore rule could not be parsed
    #[error("invalid ignore rule '{rule}': {message}")]
    InvalidRule {
        /// The rule text as supplied
        rule: String,
        /// What is wrong with it
        message: String,
    },

    /// A regular expression inside a rule failed to compile
    #[error("invalid regex '{pattern}': {source}")]
    InvalidRegex {
        /// The pattern as supplied
        pattern: String,
        /// Underlying compile error
        #[source]
        source: regex::Error,
    },

    /// A post-filter name is not registered
    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    /// The catalog failed to build and has no resources
    #[error("catalog was not built successfully: {reason}")]
    CatalogNotBuilt {
        /// Why the build failed
        reason: String,
    },

    /// Two resources normalize to the same comparison key
    #[error("duplicate resource {resource} (declared at {first} and {second})")]
    DuplicateResource {
        /// Human-readable `Type[Title]`
        resource: String,
        /// Location of the first declaration
        first: String,
        /// Location of the conflicting declaration
        second: String,
    },

    /// The catalog is well-formed JSON but semantically invalid
    #[error("invalid catalog: {}", .problems.join("; "))]
    InvalidCatalog {
        /// Every problem found, in catalog order
        problems: Vec<String>,
    },

    /// Invariant violation inside the differ
    #[error("internal error: {0}")]
    Internal(String),

    /// Catalog document could not be parsed
    #[error("failed to parse catalog {}: {source}", .path.as_ref().map_or_else(|| "<input>".to_string(), |p| p.display().to_string()))]
    Parse {
        /// File the document was read from, if any
        path: Option<PathBuf>,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRule { .. } | Self::InvalidRegex { .. } | Self::UnknownFilter(_) => {
                ErrorCategory::Configuration
            }
            Self::CatalogNotBuilt { .. }
            | Self::InvalidCatalog { .. }
            | Self::Parse { .. }
            | Self::Io(_) => ErrorCategory::Input,
            Self::DuplicateResource { .. } => ErrorCategory::Identity,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    pub(crate) fn invalid_rule(rule: &str, message: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;
