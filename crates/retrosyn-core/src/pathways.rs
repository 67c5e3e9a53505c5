//! Pathway enumeration over a constructed derivation tree.
//!
//! A pathway is the list of reactions that, fired together, turn available
//! substances into the target. At each node the children are grouped by
//! reaction key; all reactants of one reaction must be satisfied at once,
//! so their sub-pathway sets are combined by Cartesian product and the
//! reaction key is put in front.
//!
//! The product step is exponential in the worst case. Pass an
//! [`EnumerationLimits`] budget to bound the number of partial pathways
//! materialised during the search.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::error::TreeError;
use crate::reaction::ReactionKey;
use crate::tree::{DerivationTree, NodeId};

/// An ordered, duplicate-free list of reaction keys, target reaction first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pathway(Vec<ReactionKey>);

impl Pathway {
    /// Build a pathway, keeping only the first occurrence of each key.
    pub fn new(keys: Vec<ReactionKey>) -> Self {
        let mut seen = HashSet::with_capacity(keys.len());
        Self(keys.into_iter().filter(|k| seen.insert(k.clone())).collect())
    }

    pub fn reactions(&self) -> &[ReactionKey] {
        &self.0
    }

    pub fn key_set(&self) -> BTreeSet<&ReactionKey> {
        self.0.iter().collect()
    }

    pub fn contains(&self, key: &ReactionKey) -> bool {
        self.0.contains(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<ReactionKey> {
        self.0
    }
}

impl fmt::Display for Pathway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{key}")?;
        }
        Ok(())
    }
}

/// Bounds on pathway enumeration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumerationLimits {
    /// Maximum number of partial pathways built across the whole search.
    pub max_partial_pathways: Option<usize>,
}

impl EnumerationLimits {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn max_partial_pathways(limit: usize) -> Self {
        Self {
            max_partial_pathways: Some(limit),
        }
    }
}

impl DerivationTree {
    /// Every minimal pathway realising the target, without a search budget.
    pub fn find_all_paths(&self) -> Vec<Pathway> {
        let mut search = PathwaySearch::new(self, None);
        let raw = search.search(NodeId::ROOT);
        minimal_pathways(raw)
    }

    /// [`find_all_paths`](Self::find_all_paths) under a search budget.
    pub fn find_all_paths_with(&self, limits: EnumerationLimits) -> Result<Vec<Pathway>, TreeError> {
        let mut search = PathwaySearch::new(self, limits.max_partial_pathways);
        let raw = search.search(NodeId::ROOT);
        if let Some(limit) = search.exceeded {
            return Err(TreeError::PathwayBudgetExceeded { limit });
        }
        Ok(minimal_pathways(raw))
    }
}

type RawPath = Vec<ReactionKey>;

struct PathwaySearch<'a> {
    tree: &'a DerivationTree,
    budget: Option<usize>,
    produced: usize,
    exceeded: Option<usize>,
}

impl<'a> PathwaySearch<'a> {
    fn new(tree: &'a DerivationTree, budget: Option<usize>) -> Self {
        Self {
            tree,
            budget,
            produced: 0,
            exceeded: None,
        }
    }

    fn charge(&mut self, count: usize) -> bool {
        self.produced = self.produced.saturating_add(count);
        match self.budget {
            Some(limit) if self.produced > limit => {
                self.exceeded = Some(limit);
                false
            }
            _ => true,
        }
    }

    fn search(&mut self, id: NodeId) -> Vec<RawPath> {
        let tree = self.tree;
        let node = tree.node(id);
        if node.is_leaf() {
            return vec![Vec::new()];
        }

        // reaction key -> combined sub-pathways, in first-seen order
        let mut groups: Vec<(&ReactionKey, Vec<RawPath>)> = Vec::new();
        for &child in node.children() {
            if self.exceeded.is_some() {
                return Vec::new();
            }
            let Some(key) = tree.node(child).reaction() else {
                continue;
            };
            let sub = self.search(child);

            match groups.iter_mut().find(|(k, _)| *k == key) {
                None => {
                    if !self.charge(sub.len()) {
                        return Vec::new();
                    }
                    groups.push((key, sub));
                }
                Some((_, acc)) => {
                    if !self.charge(acc.len().saturating_mul(sub.len())) {
                        return Vec::new();
                    }
                    *acc = cartesian_concat(acc, &sub);
                }
            }
        }

        let mut pathways = Vec::new();
        for (key, paths) in groups {
            for path in paths {
                let mut full = Vec::with_capacity(path.len() + 1);
                full.push(key.clone());
                full.extend(path);
                pathways.push(full);
            }
        }
        pathways
    }
}

fn cartesian_concat(left: &[RawPath], right: &[RawPath]) -> Vec<RawPath> {
    let mut out = Vec::with_capacity(left.len() * right.len());
    for l in left {
        for r in right {
            let mut joined = Vec::with_capacity(l.len() + r.len());
            joined.extend_from_slice(l);
            joined.extend_from_slice(r);
            out.push(joined);
        }
    }
    out
}

/// Dedup keys inside each pathway, then keep only minimal pathways.
fn minimal_pathways(raw: Vec<RawPath>) -> Vec<Pathway> {
    remove_supersets(raw.into_iter().map(Pathway::new).collect())
}

/// Drop every pathway whose key set strictly contains another's. Pathways
/// with equal key sets collapse onto the first one.
pub fn remove_supersets(pathways: Vec<Pathway>) -> Vec<Pathway> {
    let sets: Vec<BTreeSet<&ReactionKey>> = pathways.iter().map(Pathway::key_set).collect();

    let keep: Vec<bool> = sets
        .iter()
        .enumerate()
        .map(|(i, current)| {
            !sets.iter().enumerate().any(|(j, other)| {
                i != j
                    && other.is_subset(current)
                    && (other.len() < current.len() || j < i)
            })
        })
        .collect();

    pathways
        .into_iter()
        .zip(keep)
        .filter_map(|(p, keep)| keep.then_some(p))
        .collect()
}
