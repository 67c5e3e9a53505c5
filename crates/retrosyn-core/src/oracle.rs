//! Availability oracle: is a substance a common, purchasable starting material?
//!
//! Lookup order for [`CachedOracle`]:
//! 1. the persisted [`AvailabilityCache`] (keyed by the name as asked),
//! 2. the curated [`CommonSubstances`] set,
//! 3. an external [`SubstanceLookup`] (resolve to a structure identifier,
//!    then look for a matching record), retried on transient failure.
//!
//! A failed lookup means "not available"; it is never an error. Every
//! answer that was not a cache hit is written back to the cache at once.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CacheError, LookupError};
use crate::reaction::normalize_name;

/// Anything that can answer the availability question.
pub trait AvailabilityOracle {
    fn is_available(&mut self, substance: &str) -> bool;
}

impl<F> AvailabilityOracle for F
where
    F: FnMut(&str) -> bool,
{
    fn is_available(&mut self, substance: &str) -> bool {
        self(substance)
    }
}

// ============================================================================
// Curated substances
// ============================================================================

const BUILTIN_POLYMERS: &[&str] = &[
    "Polyethylene",
    "Polypropylene",
    "Polystyrene",
    "Polyvinyl chloride",
    "Polyethylene terephthalate",
    "Polytetrafluoroethylene",
    "Polycarbonate",
    "Poly(methyl methacrylate)",
    "Polyurethane",
    "Polyamide",
    "Polyvinyl acetate",
    "Polybutadiene",
    "Polychloroprene",
    "Poly(acrylonitrile-butadiene-styrene)",
    "Polyoxymethylene",
    "Polylactic acid",
    "Polyethylene glycol",
    "Poly(vinyl alcohol)",
    "Polyacrylamide",
    "Polyethylene oxide",
    "Poly(ethylene-co-vinyl acetate)",
];

const BUILTIN_REAGENTS: &[&str] = &["CCl2"];

/// Names that are always considered available, lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonSubstances {
    names: HashSet<String>,
}

impl CommonSubstances {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The fixed list of well-known polymers and reagents.
    pub fn builtin() -> Self {
        Self::from_names(BUILTIN_POLYMERS.iter().chain(BUILTIN_REAGENTS))
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::empty();
        set.extend(names);
        set
    }

    /// Parse a JSON array of names (common laboratory reagents and solvents).
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let names: Vec<String> = serde_json::from_str(json)?;
        Ok(Self::from_names(names))
    }

    pub fn extend<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.names.extend(
            names
                .into_iter()
                .map(|n| normalize_name(n.as_ref()))
                .filter(|n| !n.is_empty()),
        );
    }

    pub fn merge(&mut self, other: CommonSubstances) {
        self.names.extend(other.names);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&normalize_name(name))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ============================================================================
// Persisted cache
// ============================================================================

/// `substance name -> available?`, optionally backed by a JSON file that is
/// rewritten after every new entry.
#[derive(Debug, Default)]
pub struct AvailabilityCache {
    entries: BTreeMap<String, bool>,
    path: Option<PathBuf>,
}

impl AvailabilityCache {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the cache file at `path`; a missing file starts an empty cache
    /// that will be created on the first insert.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|source| CacheError::Format {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        tracing::debug!(path = %path.display(), entries = entries.len(), "loaded availability cache");
        Ok(Self {
            entries,
            path: Some(path),
        })
    }

    pub fn get(&self, substance: &str) -> Option<bool> {
        self.entries.get(substance).copied()
    }

    /// Record an answer and flush the whole cache to disk.
    pub fn insert(&mut self, substance: &str, available: bool) -> Result<(), CacheError> {
        self.entries.insert(substance.to_string(), available);
        self.flush()
    }

    pub fn flush(&self) -> Result<(), CacheError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.entries).map_err(|source| {
            CacheError::Format {
                path: path.clone(),
                source,
            }
        })?;
        fs::write(path, json).map_err(|source| CacheError::Io {
            path: path.clone(),
            source,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// External lookup
// ============================================================================

/// How a record query identifies the compound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryKind {
    Smiles,
    Name,
}

/// An external chemical database.
pub trait SubstanceLookup {
    /// Resolve a name to a canonical structure identifier (SMILES).
    fn canonical_identifier(&self, name: &str) -> Result<Option<String>, LookupError>;

    /// Whether any record matches `query`.
    fn has_record(&self, query: &str, kind: QueryKind) -> Result<bool, LookupError>;
}

/// Bounded retries with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::from_secs(1),
        }
    }
}

/// The production oracle: cache, curated set, then external lookup.
pub struct CachedOracle {
    cache: AvailabilityCache,
    common: CommonSubstances,
    lookup: Option<Box<dyn SubstanceLookup>>,
    retry: RetryPolicy,
}

impl CachedOracle {
    pub fn new(cache: AvailabilityCache, common: CommonSubstances) -> Self {
        Self {
            cache,
            common,
            lookup: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_lookup(mut self, lookup: impl SubstanceLookup + 'static) -> Self {
        self.lookup = Some(Box::new(lookup));
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> &AvailabilityCache {
        &self.cache
    }

    fn resolve(&self, substance: &str) -> bool {
        if self.common.contains(substance) {
            return true;
        }
        let Some(lookup) = self.lookup.as_deref() else {
            return false;
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.query(lookup, substance) {
                Ok(found) => return found,
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    tracing::debug!(substance, attempt, "retrying substance lookup: {err}");
                    std::thread::sleep(self.retry.delay);
                }
                Err(err) => {
                    tracing::warn!(substance, attempt, "substance lookup failed, treating as unavailable: {err}");
                    return false;
                }
            }
        }
    }

    fn query(&self, lookup: &dyn SubstanceLookup, substance: &str) -> Result<bool, LookupError> {
        match lookup.canonical_identifier(substance)? {
            Some(identifier) => {
                if self.common.contains(&identifier) {
                    return Ok(true);
                }
                lookup.has_record(&identifier, QueryKind::Smiles)
            }
            None => lookup.has_record(substance, QueryKind::Name),
        }
    }
}

impl AvailabilityOracle for CachedOracle {
    fn is_available(&mut self, substance: &str) -> bool {
        if let Some(hit) = self.cache.get(substance) {
            return hit;
        }
        let available = self.resolve(substance);
        tracing::debug!(substance, available, "availability resolved");
        if let Err(err) = self.cache.insert(substance, available) {
            tracing::warn!("could not persist availability cache: {err}");
        }
        available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use tempfile::tempdir;

    /// Fails transiently `failures` times, then answers from a fixed list.
    struct FakeLookup {
        known: Vec<&'static str>,
        failures: Cell<u32>,
        fatal: bool,
        calls: Rc<Cell<u32>>,
    }

    impl FakeLookup {
        fn new(known: Vec<&'static str>) -> (Self, Rc<Cell<u32>>) {
            let calls = Rc::new(Cell::new(0));
            (
                Self {
                    known,
                    failures: Cell::new(0),
                    fatal: false,
                    calls: calls.clone(),
                },
                calls,
            )
        }

        fn knows(&self, name: &str) -> bool {
            self.known.iter().any(|k| *k == name)
        }
    }

    impl SubstanceLookup for FakeLookup {
        fn canonical_identifier(&self, name: &str) -> Result<Option<String>, LookupError> {
            self.calls.set(self.calls.get() + 1);
            if self.fatal {
                return Err(LookupError::Fatal("bad request".into()));
            }
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(LookupError::Transient("503".into()));
            }
            Ok(self.knows(name).then(|| format!("SMILES:{name}")))
        }

        fn has_record(&self, query: &str, _kind: QueryKind) -> Result<bool, LookupError> {
            Ok(query.starts_with("SMILES:") || self.knows(query))
        }
    }

    fn no_delay(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_closure_is_an_oracle() {
        let mut oracle = |s: &str| s == "water";
        assert!(oracle.is_available("water"));
        assert!(!oracle.is_available("gold"));
    }

    #[test]
    fn test_builtin_common_substances_are_case_normalized() {
        let common = CommonSubstances::builtin();
        assert!(common.contains("polystyrene"));
        assert!(common.contains("POLY(VINYL ALCOHOL)"));
        assert!(common.contains("ccl2"));
        assert!(!common.contains("polyimide"));
    }

    #[test]
    fn test_common_substances_from_json() {
        let common = CommonSubstances::from_json_str(r#"["Acetone", " Ethanol "]"#).unwrap();
        assert!(common.contains("acetone"));
        assert!(common.contains("ethanol"));
        assert_eq!(common.len(), 2);
    }

    #[test]
    fn test_curated_set_answers_without_lookup() {
        let (lookup, calls) = FakeLookup::new(vec![]);
        let mut oracle = CachedOracle::new(
            AvailabilityCache::in_memory(),
            CommonSubstances::from_names(["acetone"]),
        )
        .with_lookup(lookup);
        assert!(oracle.is_available("Acetone"));
        assert_eq!(calls.get(), 0);
        assert_eq!(oracle.cache().get("Acetone"), Some(true));
    }

    #[test]
    fn test_cache_hit_skips_lookup() {
        let (lookup, calls) = FakeLookup::new(vec!["aniline"]);
        let mut oracle = CachedOracle::new(AvailabilityCache::in_memory(), CommonSubstances::empty())
            .with_lookup(lookup);
        assert!(oracle.is_available("aniline"));
        assert!(oracle.is_available("aniline"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let (lookup, calls) = FakeLookup::new(vec!["aniline"]);
        lookup.failures.set(2);
        let mut oracle = CachedOracle::new(AvailabilityCache::in_memory(), CommonSubstances::empty())
            .with_lookup(lookup)
            .with_retry(no_delay(3));
        assert!(oracle.is_available("aniline"));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_exhausted_retries_mean_unavailable_and_are_cached() {
        let (lookup, calls) = FakeLookup::new(vec!["aniline"]);
        lookup.failures.set(5);
        let mut oracle = CachedOracle::new(AvailabilityCache::in_memory(), CommonSubstances::empty())
            .with_lookup(lookup)
            .with_retry(no_delay(2));
        assert!(!oracle.is_available("aniline"));
        assert_eq!(calls.get(), 2);
        assert_eq!(oracle.cache().get("aniline"), Some(false));
    }

    #[test]
    fn test_fatal_failure_is_not_retried() {
        let (mut lookup, calls) = FakeLookup::new(vec!["aniline"]);
        lookup.fatal = true;
        let mut oracle = CachedOracle::new(AvailabilityCache::in_memory(), CommonSubstances::empty())
            .with_lookup(lookup)
            .with_retry(no_delay(4));
        assert!(!oracle.is_available("aniline"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_offline_oracle_only_uses_curated_set() {
        let mut oracle = CachedOracle::new(AvailabilityCache::in_memory(), CommonSubstances::builtin());
        assert!(oracle.is_available("polyamide"));
        assert!(!oracle.is_available("4,4'-oxydianiline"));
    }

    #[test]
    fn test_cache_persists_across_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("substance_query_result.json");

        let (lookup, _) = FakeLookup::new(vec!["Aniline"]);
        let mut oracle = CachedOracle::new(AvailabilityCache::load(&path).unwrap(), CommonSubstances::empty())
            .with_lookup(lookup);
        assert!(oracle.is_available("Aniline"));
        assert!(!oracle.is_available("unobtainium"));
        assert!(path.exists());

        let reloaded = AvailabilityCache::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("Aniline"), Some(true));
        assert_eq!(reloaded.get("aniline"), None);
        assert_eq!(reloaded.get("unobtainium"), Some(false));
    }

    #[test]
    fn test_malformed_cache_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            AvailabilityCache::load(&path),
            Err(CacheError::Format { .. })
        ));
    }
}
