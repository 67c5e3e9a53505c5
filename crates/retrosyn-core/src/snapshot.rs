//! Explicit, versioned tree snapshot: node list + edge list + reaction map.
//!
//! Ancestor sets, reaction lines and the used-reaction set are not trusted;
//! they are rebuilt from the edges on restore. Restore also re-validates
//! every reaction and checks that each edge follows a reaction that makes
//! the parent from exactly its reactants, with no cycles.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

use crate::error::TreeError;
use crate::index::ReactionIndex;
use crate::reaction::{Reaction, ReactionKey, ReactionRecord, ReactionSet};
use crate::tree::{DerivationNode, DerivationTree, NodeId};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub substance: String,
    pub reaction: Option<ReactionKey>,
    pub is_leaf: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub format_version: u32,
    pub target: String,
    pub reactions: Vec<Reaction>,
    /// Node 0 is the root.
    pub nodes: Vec<NodeRecord>,
    /// `(parent, child)` pairs, in each parent's child order.
    pub edges: Vec<(u32, u32)>,
    pub unexpandable_substances: Vec<String>,
    pub reaction_infos: Vec<ReactionKey>,
}

impl DerivationTree {
    pub fn to_snapshot(&self) -> TreeSnapshot {
        let nodes = self
            .nodes()
            .map(|(_, n)| NodeRecord {
                substance: n.substance().to_string(),
                reaction: n.reaction().cloned(),
                is_leaf: n.is_leaf(),
            })
            .collect();
        let edges = self
            .nodes()
            .flat_map(|(id, n)| n.children().iter().map(move |c| (id.raw(), c.raw())))
            .collect();

        TreeSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            target: self.target().to_string(),
            reactions: self.reactions().iter().cloned().collect(),
            nodes,
            edges,
            unexpandable_substances: self.unexpandable_substances().iter().cloned().collect(),
            reaction_infos: self.reaction_infos().iter().cloned().collect(),
        }
    }

    pub fn from_snapshot(snapshot: TreeSnapshot) -> Result<Self, TreeError> {
        let invalid = |msg: String| TreeError::InvalidSnapshot(msg);

        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(invalid(format!(
                "unsupported format version {}",
                snapshot.format_version
            )));
        }
        let Some(root) = snapshot.nodes.first() else {
            return Err(invalid("no root node".to_string()));
        };
        if root.reaction.is_some() || root.substance != snapshot.target {
            return Err(invalid("node 0 is not the target root".to_string()));
        }

        let mut reactions = ReactionSet::new();
        for stored in snapshot.reactions {
            let key = stored.key.clone();
            let reaction = Reaction::new(
                key.clone(),
                ReactionRecord {
                    reactants: stored.reactants,
                    products: stored.products,
                    conditions: stored.conditions,
                    source: stored.source,
                },
            )
            .map_err(|err| invalid(format!("reaction {key}: {err}")))?;
            if reactions.insert(reaction).is_some() {
                return Err(invalid(format!("reaction {key} stored twice")));
            }
        }

        let count = snapshot.nodes.len();
        let mut nodes: Vec<DerivationNode> = snapshot
            .nodes
            .into_iter()
            .map(|record| {
                let mut node = DerivationNode::root(record.substance);
                node.reaction = record.reaction;
                node.is_leaf = record.is_leaf;
                node
            })
            .collect();

        for &(parent, child) in &snapshot.edges {
            let (p, c) = (parent as usize, child as usize);
            if p >= count || c >= count || c == 0 {
                return Err(invalid(format!("edge {parent} -> {child} out of range")));
            }
            if nodes[c].parent.is_some() {
                return Err(invalid(format!("node {child} has two parents")));
            }
            nodes[c].parent = Some(NodeId::new(parent));
            nodes[p].children.push(NodeId::new(child));
        }

        // Rebuild ancestors and reaction lines top-down.
        let mut reached = 1usize;
        let mut queue = VecDeque::from([0usize]);
        while let Some(p) = queue.pop_front() {
            // reaction key -> reactants seen under p, in child order
            let mut groups: Vec<(ReactionKey, Vec<String>)> = Vec::new();
            for child in nodes[p].children.clone() {
                let c = child.index();
                let Some(key) = nodes[c].reaction.clone() else {
                    return Err(invalid(format!("node {c} has no reaction")));
                };
                let Some(reaction) = reactions.get(&key) else {
                    return Err(invalid(format!("node {c} uses unknown reaction {key}")));
                };
                if !reaction.produces(&nodes[p].substance) {
                    return Err(invalid(format!(
                        "reaction {key} does not produce `{}`",
                        nodes[p].substance
                    )));
                }
                match groups.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, names)) => names.push(nodes[c].substance.clone()),
                    None => groups.push((key.clone(), vec![nodes[c].substance.clone()])),
                }
                let mut ancestors = nodes[p].ancestors.clone();
                ancestors.insert(nodes[p].substance.clone());
                if ancestors.contains(&nodes[c].substance) {
                    return Err(invalid(format!(
                        "node {c} repeats ancestor substance `{}`",
                        nodes[c].substance
                    )));
                }
                let mut line = nodes[p].reaction_line.clone();
                line.push(key);
                nodes[c].ancestors = ancestors;
                nodes[c].reaction_line = line;
                reached += 1;
                queue.push_back(c);
            }
            for (key, names) in groups {
                let expected = reactions.get(&key).map(|r| r.reactants.as_slice());
                if expected != Some(names.as_slice()) {
                    return Err(invalid(format!(
                        "children of node {p} under reaction {key} are not its reactants"
                    )));
                }
            }
        }
        if reached != count {
            return Err(invalid(format!(
                "{} nodes are not reachable from the root",
                count - reached
            )));
        }

        let index = ReactionIndex::build(&reactions);
        let mut tree = Self {
            target: snapshot.target,
            reactions,
            index,
            nodes,
            unexpandable: snapshot.unexpandable_substances.into_iter().collect(),
            reaction_infos: BTreeSet::new(),
        };
        // derived from the nodes; the stored list is not trusted
        tree.reaction_infos = tree.used_reaction_keys();
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reaction::parse_reaction_blocks;

    fn tree() -> DerivationTree {
        let text = "\
Reaction idx: 1
Reactants: m, n
Products: t
Conditions: heat
Source: s1
Reaction idx: 2
Reactants: a
Products: m
Conditions: cool
Source: s2
Reaction idx: 3
Reactants: x
Products: n
Conditions: none
Source: s3
Reaction idx: 4
Reactants: b
Products: n
Conditions: none
Source: s3
";
        let mut tree = DerivationTree::new("t", parse_reaction_blocks(text));
        assert!(tree
            .construct(&mut |s: &str| s == "a" || s == "b")
            .unwrap());
        tree
    }

    #[test]
    fn test_snapshot_restores_structure_and_paths() {
        let tree = tree();
        let restored = DerivationTree::from_snapshot(tree.to_snapshot()).unwrap();

        assert_eq!(restored.len(), tree.len());
        for ((_, a), (_, b)) in tree.nodes().zip(restored.nodes()) {
            assert_eq!(a, b);
        }
        assert_eq!(restored.unexpandable_substances(), tree.unexpandable_substances());
        assert_eq!(restored.reaction_infos(), tree.reaction_infos());
        assert_eq!(restored.index(), tree.index());
        assert_eq!(restored.find_all_paths(), tree.find_all_paths());
    }

    #[test]
    fn test_snapshot_rejects_cycle() {
        let mut snapshot = tree().to_snapshot();
        // rename the leaf under m to the root substance
        let leaf = snapshot
            .nodes
            .iter()
            .position(|n| n.substance == "a")
            .unwrap();
        snapshot.nodes[leaf].substance = "t".to_string();
        assert!(matches!(
            DerivationTree::from_snapshot(snapshot),
            Err(TreeError::InvalidSnapshot(msg)) if msg.contains("repeats ancestor")
        ));
    }

    fn position(snapshot: &TreeSnapshot, substance: &str) -> usize {
        snapshot
            .nodes
            .iter()
            .position(|n| n.substance == substance)
            .unwrap()
    }

    fn rejection(snapshot: TreeSnapshot) -> String {
        match DerivationTree::from_snapshot(snapshot) {
            Err(TreeError::InvalidSnapshot(msg)) => msg,
            other => panic!("expected InvalidSnapshot, got {other:?}"),
        }
    }

    #[test]
    fn test_snapshot_rejects_mismatched_reaction() {
        // a is made into m by 2; 4 makes n, not m
        let mut foreign = tree().to_snapshot();
        let leaf = position(&foreign, "a");
        foreign.nodes[leaf].reaction = Some(ReactionKey::from(4u32));
        assert!(rejection(foreign).contains("does not produce `m`"));

        // right reaction, wrong reactant under it
        let mut renamed = tree().to_snapshot();
        let leaf = position(&renamed, "a");
        renamed.nodes[leaf].substance = "zzz".to_string();
        assert!(rejection(renamed).contains("not its reactants"));

        // a reactant missing from the children
        let mut missing = tree().to_snapshot();
        let r2 = missing
            .reactions
            .iter_mut()
            .find(|r| r.key.as_str() == "2")
            .unwrap();
        r2.reactants.push("c".to_string());
        assert!(rejection(missing).contains("not its reactants"));
    }

    #[test]
    fn test_snapshot_revalidates_reactions() {
        let mut looped = tree().to_snapshot();
        let r2 = looped
            .reactions
            .iter_mut()
            .find(|r| r.key.as_str() == "2")
            .unwrap();
        r2.reactants = vec!["M".to_string(), "m".to_string()];
        assert!(rejection(looped).starts_with("reaction 2:"));

        let mut doubled = tree().to_snapshot();
        let copy = doubled.reactions[0].clone();
        doubled.reactions.push(copy);
        assert!(rejection(doubled).contains("stored twice"));
    }

    #[test]
    fn test_snapshot_recomputes_reaction_infos() {
        let tree = tree();
        let mut snapshot = tree.to_snapshot();
        snapshot.reaction_infos = vec![ReactionKey::from(3u32)];
        let restored = DerivationTree::from_snapshot(snapshot).unwrap();
        assert_eq!(restored.reaction_infos(), tree.reaction_infos());
        assert!(!restored.reaction_infos().contains(&ReactionKey::from(3u32)));
    }

    #[test]
    fn test_snapshot_rejects_orphans_and_bad_versions() {
        let mut orphaned = tree().to_snapshot();
        orphaned.edges.pop();
        assert!(DerivationTree::from_snapshot(orphaned).is_err());

        let mut versioned = tree().to_snapshot();
        versioned.format_version = 99;
        assert!(DerivationTree::from_snapshot(versioned).is_err());
    }
}
