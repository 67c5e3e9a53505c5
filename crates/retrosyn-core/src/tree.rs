//! Derivation tree: recursive "how do I make X" expansion.
//!
//! Nodes live in an arena addressed by [`NodeId`]; each node owns an ordered
//! list of child ids and keeps its parent id. Expansion is depth-first, so
//! every node created while trying one reaction of a parent sits after a
//! known arena mark. Discarding that reaction is a truncation of the arena
//! and of the parent's child list.
//!
//! Expansion outcomes per node:
//! - **expandable**: the substance is available (leaf), or at least one
//!   producing reaction has every reactant expandable;
//! - **dead**: no producing reaction, or every producing reaction hit a
//!   cycle or a dead reactant.
//!
//! Only "no producing reaction at all" records the substance as
//! unexpandable; a substance whose reactions all fail is dead without
//! being recorded.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

use crate::error::TreeError;
use crate::index::ReactionIndex;
use crate::oracle::AvailabilityOracle;
use crate::reaction::{normalize_name, ReactionKey, ReactionSet};

/// Arena index of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Id for arena slot `index`; `None` past `u32::MAX`, which caps a
    /// tree at about four billion nodes.
    pub fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index).ok().map(Self)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// One occurrence of "substance S is needed here".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationNode {
    pub(crate) substance: String,
    pub(crate) reaction: Option<ReactionKey>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) ancestors: BTreeSet<String>,
    pub(crate) reaction_line: Vec<ReactionKey>,
    pub(crate) is_leaf: bool,
    pub(crate) children: Vec<NodeId>,
}

impl DerivationNode {
    pub(crate) fn root(substance: String) -> Self {
        Self {
            substance,
            reaction: None,
            parent: None,
            ancestors: BTreeSet::new(),
            reaction_line: Vec::new(),
            is_leaf: false,
            children: Vec::new(),
        }
    }

    pub fn substance(&self) -> &str {
        &self.substance
    }

    /// The reaction producing this substance for its parent; `None` at the root.
    pub fn reaction(&self) -> Option<&ReactionKey> {
        self.reaction.as_ref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Substance names from the root down to the parent.
    pub fn ancestors(&self) -> &BTreeSet<String> {
        &self.ancestors
    }

    /// Reaction keys from the root down to this node.
    pub fn reaction_line(&self) -> &[ReactionKey] {
        &self.reaction_line
    }

    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }
}

/// Summary counts for a constructed tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    pub nodes: usize,
    pub leaves: usize,
    pub max_depth: usize,
    pub reactions_used: usize,
    pub unexpandable_substances: usize,
}

// ============================================================================
// Tree
// ============================================================================

/// The derivation tree for one target substance.
#[derive(Debug, Clone)]
pub struct DerivationTree {
    pub(crate) target: String,
    pub(crate) reactions: ReactionSet,
    pub(crate) index: ReactionIndex,
    pub(crate) nodes: Vec<DerivationNode>,
    pub(crate) unexpandable: BTreeSet<String>,
    pub(crate) reaction_infos: BTreeSet<ReactionKey>,
}

impl DerivationTree {
    /// Index `reactions` and plant a root for `target`. Nothing is expanded
    /// until [`construct`](Self::construct).
    pub fn new(target: &str, reactions: ReactionSet) -> Self {
        let target = normalize_name(target);
        let index = ReactionIndex::build(&reactions);
        Self {
            nodes: vec![DerivationNode::root(target.clone())],
            target,
            reactions,
            index,
            unexpandable: BTreeSet::new(),
            reaction_infos: BTreeSet::new(),
        }
    }

    /// Expand the tree from the root.
    ///
    /// Returns `Ok(true)` when the target can be derived from available
    /// substances, `Ok(false)` when every route dies, and
    /// [`TreeError::TrivialTarget`] when the target itself is available.
    pub fn construct<O>(&mut self, oracle: &mut O) -> Result<bool, TreeError>
    where
        O: AvailabilityOracle + ?Sized,
    {
        self.nodes.truncate(1);
        self.nodes[0] = DerivationNode::root(self.target.clone());
        self.unexpandable.clear();
        self.reaction_infos.clear();

        if oracle.is_available(&self.target) {
            return Err(TreeError::TrivialTarget {
                target: self.target.clone(),
            });
        }

        let mut expander = Expander {
            reactions: &self.reactions,
            index: &self.index,
            oracle,
            nodes: &mut self.nodes,
            unexpandable: &mut self.unexpandable,
        };
        let expandable = expander.expand(NodeId::ROOT);

        self.reaction_infos = self.used_reaction_keys();
        tracing::info!(
            target = %self.target,
            expandable,
            nodes = self.nodes.len(),
            unexpandable = self.unexpandable.len(),
            "derivation tree constructed"
        );
        Ok(expandable)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn reactions(&self) -> &ReactionSet {
        &self.reactions
    }

    pub fn index(&self) -> &ReactionIndex {
        &self.index
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// # Panics
    /// If `id` does not belong to this tree.
    pub fn node(&self, id: NodeId) -> &DerivationNode {
        &self.nodes[id.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&DerivationNode> {
        self.nodes.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the root has no children, i.e. the target cannot be made.
    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    /// All nodes in arena order (a depth-first pre-order).
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &DerivationNode)> {
        self.nodes
            .iter()
            .enumerate()
            // add_child never grows the arena past u32 ids
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    /// Node ids breadth-first from the root.
    pub fn level_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue = VecDeque::from([NodeId::ROOT]);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(self.node(id).children.iter().copied());
        }
        order
    }

    /// Substances with no producing reaction that are not available.
    pub fn unexpandable_substances(&self) -> &BTreeSet<String> {
        &self.unexpandable
    }

    /// Reaction keys appearing on some edge of the constructed tree.
    pub fn reaction_infos(&self) -> &BTreeSet<ReactionKey> {
        &self.reaction_infos
    }

    pub(crate) fn used_reaction_keys(&self) -> BTreeSet<ReactionKey> {
        self.nodes
            .iter()
            .filter_map(|n| n.reaction.clone())
            .collect()
    }

    pub fn stats(&self) -> TreeStats {
        TreeStats {
            nodes: self.nodes.len(),
            leaves: self.nodes.iter().filter(|n| n.is_leaf).count(),
            max_depth: self.nodes.iter().map(DerivationNode::depth).max().unwrap_or(0),
            reactions_used: self.reaction_infos.len(),
            unexpandable_substances: self.unexpandable.len(),
        }
    }
}

// ============================================================================
// Expansion
// ============================================================================

/// Borrowed expansion context: read-only reaction data, the oracle and the
/// two mutable accumulators (arena and unexpandable set).
struct Expander<'a, O: ?Sized> {
    reactions: &'a ReactionSet,
    index: &'a ReactionIndex,
    oracle: &'a mut O,
    nodes: &'a mut Vec<DerivationNode>,
    unexpandable: &'a mut BTreeSet<String>,
}

impl<O: AvailabilityOracle + ?Sized> Expander<'_, O> {
    fn expand(&mut self, id: NodeId) -> bool {
        let substance = self.nodes[id.index()].substance.clone();

        if self.oracle.is_available(&substance) {
            self.nodes[id.index()].is_leaf = true;
            return true;
        }

        let reactions = self.reactions;
        let index = self.index;
        let producers = index.producers(&substance);
        if producers.is_empty() {
            tracing::debug!(substance, "no producing reaction");
            self.unexpandable.insert(substance);
            return false;
        }

        for key in producers {
            let Some(reaction) = reactions.get(key) else {
                continue;
            };
            let arena_mark = self.nodes.len();
            let child_mark = self.nodes[id.index()].children.len();

            for reactant in &reaction.reactants {
                let Some(child) = self.add_child(id, reactant, key) else {
                    tracing::warn!(substance, reaction = %key, "node arena full, dropping reaction");
                    self.discard(id, arena_mark, child_mark);
                    break;
                };
                if self.nodes[child.index()].ancestors.contains(reactant) {
                    tracing::debug!(substance, reaction = %key, reactant, "cycle, dropping reaction");
                    self.discard(id, arena_mark, child_mark);
                    break;
                }
                if !self.expand(child) {
                    tracing::debug!(substance, reaction = %key, reactant, "dead reactant, dropping reaction");
                    self.discard(id, arena_mark, child_mark);
                    break;
                }
            }
        }

        !self.nodes[id.index()].children.is_empty()
    }

    fn add_child(&mut self, parent: NodeId, substance: &str, reaction: &ReactionKey) -> Option<NodeId> {
        let id = NodeId::from_index(self.nodes.len())?;
        let p = &self.nodes[parent.index()];

        let mut ancestors = p.ancestors.clone();
        ancestors.insert(p.substance.clone());
        let mut reaction_line = p.reaction_line.clone();
        reaction_line.push(reaction.clone());

        self.nodes.push(DerivationNode {
            substance: substance.to_string(),
            reaction: Some(reaction.clone()),
            parent: Some(parent),
            ancestors,
            reaction_line,
            is_leaf: false,
            children: Vec::new(),
        });
        self.nodes[parent.index()].children.push(id);
        Some(id)
    }

    /// Drop every child added under the reaction being tried, with their
    /// subtrees.
    fn discard(&mut self, parent: NodeId, arena_mark: usize, child_mark: usize) {
        self.nodes.truncate(arena_mark);
        self.nodes[parent.index()].children.truncate(child_mark);
    }
}
