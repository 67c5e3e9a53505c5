//! Product name -> producing reactions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::reaction::{normalize_name, ReactionKey, ReactionSet};

/// Maps every product substance to the reactions yielding it, in the order
/// the reactions appear in the source set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionIndex {
    producers: HashMap<String, Vec<ReactionKey>>,
}

impl ReactionIndex {
    pub fn build(reactions: &ReactionSet) -> Self {
        let mut producers: HashMap<String, Vec<ReactionKey>> = HashMap::new();
        for reaction in reactions {
            for product in &reaction.products {
                let keys = producers.entry(normalize_name(product)).or_default();
                if !keys.contains(&reaction.key) {
                    keys.push(reaction.key.clone());
                }
            }
        }
        Self { producers }
    }

    /// Reactions producing `substance`; empty when there are none.
    pub fn producers(&self, substance: &str) -> &[ReactionKey] {
        self.producers
            .get(substance)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn products(&self) -> impl Iterator<Item = &str> {
        self.producers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }
}
