//! Error types for the sync pipeline.
//!
//! Every variant is fatal to the current run. Nothing is retried; the binary
//! prints the chain and exits non-zero.

use std::fmt;

/// Top-level error enum for the sync pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Required configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The session is not on the expected portal origin.
    #[error("session is on {actual}, expected {expected}; sign in again")]
    SessionOrigin { expected: String, actual: String },

    /// HTML did not have the expected structure.
    #[error("parse error: {0}")]
    Parse(String),

    /// Neither due-date format matched.
    #[error("could not resolve due date from {raw:?}")]
    DateResolution { raw: String },

    /// Network or HTTP failure.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// The external store is missing structure we rely on.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// The external collection's fields don't match what we write.
    #[error("schema error: {0}")]
    Schema(String),

    /// A failure while processing one assignment.
    #[error("assignment {name:?} ({link}): {source}")]
    Assignment {
        name: String,
        link: String,
        #[source]
        source: Box<SyncError>,
    },

    /// The upsert batch finished but some operations failed.
    #[error("{} of {} writes failed ({created} created, {updated} updated){}", .failures.len(), .created + .updated + .failures.len(), FailureList(.failures))]
    PartialBatch {
        created: usize,
        updated: usize,
        failures: Vec<SyncError>,
    },
}

impl SyncError {
    /// Attach the assignment's name and link to an error.
    pub fn for_assignment(self, name: &str, link: &str) -> Self {
        SyncError::Assignment {
            name: name.to_string(),
            link: link.to_string(),
            source: Box::new(self),
        }
    }

    /// Build a [`SyncError::Config`] naming every missing option.
    pub fn missing_options(names: &[&str]) -> Self {
        SyncError::Config(format!("missing required options: {}", names.join(", ")))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Fetch(err.to_string())
    }
}

struct FailureList<'a>(&'a [SyncError]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for failure in self.0 {
            write!(f, "\n  - {}", failure)?;
        }
        Ok(())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
