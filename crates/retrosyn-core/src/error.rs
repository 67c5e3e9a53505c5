//! Error types for tree construction, record ingestion and the availability cache.

use std::path::PathBuf;

use crate::reaction::ReactionKey;

/// Failures surfaced by tree construction, traversal and enumeration.
///
/// Dead branches and cycles are not errors; they are ordinary expansion
/// outcomes.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("target substance `{target}` is already available, nothing to synthesize")]
    TrivialTarget { target: String },

    #[error("empty tree: root `{root}` has no children")]
    EmptyTree { root: String },

    #[error("pathway enumeration exceeded the budget of {limit} partial pathways")]
    PathwayBudgetExceeded { limit: usize },

    #[error("invalid tree snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Reaction records that cannot be ingested.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("reaction {key} has no reactants")]
    EmptyReactants { key: ReactionKey },

    #[error("reaction {key} has no products")]
    EmptyProducts { key: ReactionKey },

    #[error("reaction {key} lists `{name}` as both reactant and product")]
    ReactantIsProduct { key: ReactionKey, name: String },

    #[error("malformed reaction records: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures reading or writing the persisted availability cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cannot access availability cache {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("availability cache {path} is not a name -> bool JSON object: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures of an external substance lookup.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// Worth retrying: timeouts, throttling, server errors.
    #[error("transient lookup failure: {0}")]
    Transient(String),

    #[error("lookup failed: {0}")]
    Fatal(String),
}

impl LookupError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
