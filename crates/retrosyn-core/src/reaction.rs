//! Reaction records and their ingestion formats.
//!
//! Three input shapes are accepted:
//!
//! - a JSON record map `{key: {reactants, products, conditions, source}}`,
//! - plain-text reaction blocks carrying their own `Reaction idx:` line,
//! - extraction results `{source: [reactions_text, properties_text]}` whose
//!   blocks are numbered sequentially on ingestion.
//!
//! Names are matched by normalized string only (trimmed, lower-cased).

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::RecordError;

/// Normalize a substance name for matching.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

// ============================================================================
// Keys and records
// ============================================================================

/// Stable identifier of a reaction record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReactionKey(String);

impl ReactionKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReactionKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for ReactionKey {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<u32> for ReactionKey {
    fn from(raw: u32) -> Self {
        Self(raw.to_string())
    }
}

/// A record as it appears in input files, before normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReactionRecord {
    pub reactants: Vec<String>,
    pub products: Vec<String>,
    #[serde(default)]
    pub conditions: String,
    #[serde(default)]
    pub source: String,
}

/// A normalized reaction: non-empty, disjoint reactant and product sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub key: ReactionKey,
    pub reactants: Vec<String>,
    pub products: Vec<String>,
    pub conditions: String,
    pub source: String,
}

impl Reaction {
    pub fn new(key: impl Into<ReactionKey>, record: ReactionRecord) -> Result<Self, RecordError> {
        let key = key.into();
        let reactants = normalized_set(&record.reactants);
        let products = normalized_set(&record.products);

        if reactants.is_empty() {
            return Err(RecordError::EmptyReactants { key });
        }
        if products.is_empty() {
            return Err(RecordError::EmptyProducts { key });
        }
        if let Some(shared) = reactants.iter().find(|r| products.contains(r)) {
            return Err(RecordError::ReactantIsProduct {
                key,
                name: shared.clone(),
            });
        }

        Ok(Self {
            key,
            reactants,
            products,
            conditions: record.conditions.trim().to_string(),
            source: record.source.trim().to_string(),
        })
    }

    pub fn produces(&self, substance: &str) -> bool {
        self.products.iter().any(|p| p == substance)
    }
}

/// Normalize names, dropping blanks and repeats while keeping first-seen order.
fn normalized_set(names: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let name = normalize_name(name);
        if !name.is_empty() && !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

// ============================================================================
// Reaction set
// ============================================================================

/// Reactions in insertion order, addressable by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Reaction>", into = "Vec<Reaction>")]
pub struct ReactionSet {
    reactions: Vec<Reaction>,
    positions: HashMap<ReactionKey, usize>,
}

impl ReactionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a reaction. A reaction with the same key is replaced in place
    /// and returned.
    pub fn insert(&mut self, reaction: Reaction) -> Option<Reaction> {
        match self.positions.get(&reaction.key) {
            Some(&pos) => {
                tracing::debug!(key = %reaction.key, "replacing reaction with duplicate key");
                Some(std::mem::replace(&mut self.reactions[pos], reaction))
            }
            None => {
                self.positions
                    .insert(reaction.key.clone(), self.reactions.len());
                self.reactions.push(reaction);
                None
            }
        }
    }

    /// Build a set from raw records, skipping records that break the
    /// reaction invariant.
    pub fn from_records<K, I>(records: I) -> Self
    where
        K: Into<ReactionKey>,
        I: IntoIterator<Item = (K, ReactionRecord)>,
    {
        let mut set = Self::new();
        for (key, record) in records {
            match Reaction::new(key, record) {
                Ok(reaction) => {
                    set.insert(reaction);
                }
                Err(err) => tracing::warn!("skipping reaction record: {err}"),
            }
        }
        set
    }

    /// Parse a JSON record map, keeping the document order of its keys.
    pub fn from_json_str(json: &str) -> Result<Self, RecordError> {
        let records: OrderedMap<ReactionRecord> = serde_json::from_str(json)?;
        Ok(Self::from_records(records.0))
    }

    /// Merge another set into this one; keys already present are replaced.
    pub fn extend(&mut self, other: ReactionSet) {
        for reaction in other.reactions {
            self.insert(reaction);
        }
    }

    pub fn get(&self, key: &ReactionKey) -> Option<&Reaction> {
        self.positions.get(key).map(|&pos| &self.reactions[pos])
    }

    pub fn contains(&self, key: &ReactionKey) -> bool {
        self.positions.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reaction> {
        self.reactions.iter()
    }

    pub fn len(&self) -> usize {
        self.reactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty()
    }
}

impl From<Vec<Reaction>> for ReactionSet {
    fn from(reactions: Vec<Reaction>) -> Self {
        let mut set = Self::new();
        for reaction in reactions {
            set.insert(reaction);
        }
        set
    }
}

impl From<ReactionSet> for Vec<Reaction> {
    fn from(set: ReactionSet) -> Self {
        set.reactions
    }
}

impl<'a> IntoIterator for &'a ReactionSet {
    type Item = &'a Reaction;
    type IntoIter = std::slice::Iter<'a, Reaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.reactions.iter()
    }
}

/// A JSON object read as a list of entries in document order.
struct OrderedMap<V>(Vec<(String, V)>);

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor<V>(std::marker::PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, V>()? {
                    entries.push((key, value));
                }
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor(std::marker::PhantomData))
    }
}

// ============================================================================
// Text blocks
// ============================================================================

#[derive(Default)]
struct BlockState {
    idx: Option<String>,
    reactants: Vec<String>,
    products: Vec<String>,
    conditions: String,
}

impl BlockState {
    fn take_record(&mut self, source: &str) -> ReactionRecord {
        let state = std::mem::take(self);
        ReactionRecord {
            reactants: state.reactants,
            products: state.products,
            conditions: state.conditions,
            source: source.to_string(),
        }
    }
}

fn split_names(list: &str) -> Vec<String> {
    list.trim()
        .split(", ")
        .map(normalize_name)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse reaction blocks that carry their own index:
///
/// ```text
/// Reaction idx: 12
/// Reactants: pyromellitic dianhydride, 4,4'-oxydianiline
/// Products: poly(amic acid)
/// Conditions: dmac, room temperature
/// Source: some_paper
/// ```
///
/// A record is complete on its `Source:` line.
pub fn parse_reaction_blocks(text: &str) -> ReactionSet {
    let mut set = ReactionSet::new();
    let mut state = BlockState::default();

    for line in text.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("Reaction idx:") {
            state.idx = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("Reactants:") {
            state.reactants = split_names(rest);
        } else if let Some(rest) = line.strip_prefix("Products:") {
            state.products = split_names(rest);
        } else if let Some(rest) = line.strip_prefix("Conditions:") {
            state.conditions = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("Source:") {
            let idx = state.idx.take();
            let record = state.take_record(rest.trim());
            let Some(idx) = idx else {
                tracing::warn!("reaction block without `Reaction idx:` line, skipping");
                continue;
            };
            match Reaction::new(idx, record) {
                Ok(reaction) => {
                    set.insert(reaction);
                }
                Err(err) => tracing::warn!("skipping reaction block: {err}"),
            }
        }
    }

    set
}

/// Parse unnumbered blocks ending on `Conditions:`, assigning keys from
/// `next_idx` onward.
fn parse_unindexed_blocks(text: &str, source: &str, next_idx: &mut u32, set: &mut ReactionSet) {
    let mut state = BlockState::default();

    for line in text.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("Reactants:") {
            state.reactants = split_names(rest);
        } else if let Some(rest) = line.strip_prefix("Products:") {
            state.products = split_names(rest);
        } else if let Some(rest) = line.strip_prefix("Conditions:") {
            state.conditions = rest.trim().to_string();
            let record = state.take_record(source);
            let key = ReactionKey::from(*next_idx);
            *next_idx += 1;
            match Reaction::new(key, record) {
                Ok(reaction) => {
                    set.insert(reaction);
                }
                Err(err) => tracing::warn!(source, "skipping reaction block: {err}"),
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExtractionEntry {
    Texts(Vec<Option<String>>),
    Single(String),
}

impl ExtractionEntry {
    fn reactions_text(&self) -> &str {
        match self {
            Self::Texts(texts) => texts.first().and_then(|t| t.as_deref()).unwrap_or(""),
            Self::Single(text) => text,
        }
    }
}

/// Parse extraction results keyed by source label.
///
/// Each value is `[reactions_text, properties_text]`; only the reactions
/// text is read. Keys are numbered from 1 across all sources in document
/// order.
pub fn parse_extraction_results(json: &str) -> Result<ReactionSet, RecordError> {
    let entries: OrderedMap<ExtractionEntry> = serde_json::from_str(json)?;
    let mut set = ReactionSet::new();
    let mut next_idx = 1u32;
    for (source, entry) in entries.0 {
        parse_unindexed_blocks(entry.reactions_text(), &source, &mut next_idx, &mut set);
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(reactants: &[&str], products: &[&str]) -> ReactionRecord {
        ReactionRecord {
            reactants: reactants.iter().map(|s| s.to_string()).collect(),
            products: products.iter().map(|s| s.to_string()).collect(),
            conditions: "reflux".to_string(),
            source: "paper".to_string(),
        }
    }

    #[test]
    fn test_reaction_names_are_normalized() {
        let r = Reaction::new("1", record(&["  Aniline ", "aniline"], &["Polyimide"])).unwrap();
        assert_eq!(r.reactants, vec!["aniline"]);
        assert_eq!(r.products, vec!["polyimide"]);
        assert!(r.produces("polyimide"));
    }

    #[test]
    fn test_reaction_rejects_shared_name() {
        let err = Reaction::new("7", record(&["Water", "a"], &["water"])).unwrap_err();
        assert!(matches!(err, RecordError::ReactantIsProduct { ref name, .. } if name == "water"));
    }

    #[test]
    fn test_reaction_rejects_empty_sides() {
        assert!(matches!(
            Reaction::new("1", record(&[" "], &["x"])),
            Err(RecordError::EmptyReactants { .. })
        ));
        assert!(matches!(
            Reaction::new("1", record(&["a"], &[])),
            Err(RecordError::EmptyProducts { .. })
        ));
    }

    #[test]
    fn test_json_records_keep_document_order() {
        let json = r#"{
            "10": {"reactants": ["b"], "products": ["c"]},
            "2": {"reactants": ["a"], "products": ["b"], "conditions": "heat", "source": "s"},
            "3": {"reactants": ["x"], "products": ["x"]}
        }"#;
        let set = ReactionSet::from_json_str(json).unwrap();
        let keys: Vec<&str> = set.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["10", "2"]);
        assert_eq!(set.get(&"2".into()).unwrap().conditions, "heat");
    }

    #[test]
    fn test_insert_replaces_same_key_in_place() {
        let mut set = ReactionSet::new();
        set.insert(Reaction::new("1", record(&["a"], &["b"])).unwrap());
        set.insert(Reaction::new("2", record(&["b"], &["c"])).unwrap());
        let old = set.insert(Reaction::new("1", record(&["z"], &["b"])).unwrap());
        assert!(old.is_some());
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().next().unwrap().reactants, vec!["z"]);
    }

    #[test]
    fn test_parse_reaction_blocks() {
        let text = "\
Reaction idx: 4
Reactants: Pyromellitic dianhydride, 4,4'-Oxydianiline
Products: Poly(amic acid)
Conditions: DMAc, room temperature
Source: paper_a

Reaction idx: 5
Reactants: Poly(amic acid)
Products: Polyimide, Water
Conditions: 300 C
Source: paper_b
";
        let set = parse_reaction_blocks(text);
        assert_eq!(set.len(), 2);
        let r4 = set.get(&"4".into()).unwrap();
        assert_eq!(
            r4.reactants,
            vec!["pyromellitic dianhydride", "4,4'-oxydianiline"]
        );
        assert_eq!(r4.conditions, "DMAc, room temperature");
        assert_eq!(r4.source, "paper_a");
        assert_eq!(set.get(&"5".into()).unwrap().products, vec!["polyimide", "water"]);
    }

    #[test]
    fn test_parse_reaction_blocks_skips_block_without_index() {
        let text = "Reactants: a\nProducts: b\nConditions: c\nSource: s\n";
        assert!(parse_reaction_blocks(text).is_empty());
    }

    #[test]
    fn test_parse_extraction_results_numbers_across_sources() {
        let json = r#"{
            "paper_b": ["Reactants: a\nProducts: b\nConditions: heat\n\nReactants: b\nProducts: c\nConditions: cool", "props"],
            "paper_a": ["Reactants: c\nProducts: d\nConditions: none", ""]
        }"#;
        let set = parse_extraction_results(json).unwrap();
        let keys: Vec<&str> = set.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["1", "2", "3"]);
        assert_eq!(set.get(&"3".into()).unwrap().source, "paper_a");
        assert_eq!(set.get(&"1".into()).unwrap().source, "paper_b");
    }
}
