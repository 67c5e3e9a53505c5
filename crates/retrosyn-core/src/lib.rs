//! Retrosynthesis derivation trees.
//!
//! Given a target substance and a corpus of extracted reaction records,
//! build the tree of ways to make the target from available starting
//! materials, then enumerate the minimal reaction pathways it contains.
//!
//! ```text
//! reaction records ──► ReactionIndex ──► DerivationTree ──► Vec<Pathway>
//!                                            ▲
//!                                            │ is_available(name)?
//!                                    AvailabilityOracle
//!                              (cache → curated set → lookup)
//! ```
//!
//! Everything here is single-threaded and in-memory. The only I/O is the
//! oracle's cache file and whatever [`SubstanceLookup`] the caller plugs in.
//!
//! ## Module Organization
//!
//! - `reaction`: records, normalization, text and JSON ingestion
//! - `index`: product → producing reactions
//! - `oracle`: availability cache, curated substances, retrying lookup
//! - `tree`: arena-backed derivation tree and its expansion
//! - `pathways`: pathway search, dedup and subsumption filtering
//! - `render`: DOT export and reaction summaries
//! - `snapshot`: versioned node/edge/reaction snapshot

pub mod error;
pub mod index;
pub mod oracle;
pub mod pathways;
pub mod reaction;
pub mod render;
pub mod snapshot;
pub mod tree;

pub use error::{CacheError, LookupError, RecordError, TreeError};
pub use index::ReactionIndex;
pub use oracle::{
    AvailabilityCache, AvailabilityOracle, CachedOracle, CommonSubstances, QueryKind, RetryPolicy,
    SubstanceLookup,
};
pub use pathways::{remove_supersets, EnumerationLimits, Pathway};
pub use reaction::{
    normalize_name, parse_extraction_results, parse_reaction_blocks, Reaction, ReactionKey,
    ReactionRecord, ReactionSet,
};
pub use render::DotOptions;
pub use snapshot::{NodeRecord, TreeSnapshot, SNAPSHOT_FORMAT_VERSION};
pub use tree::{DerivationNode, DerivationTree, NodeId, TreeStats};
