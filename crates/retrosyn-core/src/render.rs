//! Text renderings of a tree for downstream consumers: Graphviz DOT for
//! image generation, and reaction summaries for review or prompting.

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::error::TreeError;
use crate::reaction::ReactionKey;
use crate::tree::{DerivationTree, NodeId};

const NODE_FILL: &str = "#82b0d2";
const LEAF_FILL: &str = "#8ecfc9";
const ROOT_FILL: &str = "#beb8dc";
const LINE_COLOR: &str = "#999999";

/// Options for [`DerivationTree::to_dot`].
#[derive(Debug, Clone, Default)]
pub struct DotOptions {
    /// Draw unlabeled dots instead of substance names.
    pub simple: bool,
    pub dpi: Option<u32>,
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

impl DerivationTree {
    /// Unique display name: the root's substance, otherwise
    /// `depth-substance-k1.k2...` with the node's reaction line.
    pub fn display_name(&self, id: NodeId) -> String {
        let node = self.node(id);
        if node.reaction().is_none() {
            return node.substance().to_string();
        }
        let line: Vec<&str> = node.reaction_line().iter().map(ReactionKey::as_str).collect();
        format!("{}-{}-{}", node.depth(), node.substance(), line.join("."))
    }

    /// Name used by the level-order DOT export: `depth-substance-parent`.
    /// Nodes sharing it are drawn once.
    fn level_name(&self, id: NodeId) -> String {
        let node = self.node(id);
        match node.parent() {
            None => node.substance().to_string(),
            Some(parent) => format!(
                "{}-{}-{}",
                node.depth(),
                node.substance(),
                self.node(parent).substance()
            ),
        }
    }

    /// Graphviz DOT, laid out left to right, walked level by level.
    pub fn to_dot(&self, options: &DotOptions) -> Result<String, TreeError> {
        if self.is_empty() {
            return Err(TreeError::EmptyTree {
                root: self.target().to_string(),
            });
        }

        let mut out = String::new();
        let _ = writeln!(out, "digraph \"Substances Tree\" {{");
        match options.dpi {
            Some(dpi) => {
                let _ = writeln!(out, "  graph [rankdir=LR, dpi={dpi}];");
            }
            None => {
                let _ = writeln!(out, "  graph [rankdir=LR];");
            }
        }
        let _ = writeln!(
            out,
            "  node [shape=ellipse, style=filled, fillcolor=\"{NODE_FILL}\", color=\"{LINE_COLOR}\", fontname=\"Arial\", fontsize=8];"
        );
        let _ = writeln!(
            out,
            "  edge [color=\"{LINE_COLOR}\", fontname=\"Arial\", fontsize=8, arrowhead=none];"
        );

        let label = |substance: &str| {
            if options.simple {
                String::new()
            } else {
                escape(substance)
            }
        };

        let root = self.node(self.root());
        let _ = writeln!(
            out,
            "  \"{}\" [label=\"{}\", width=0.1, height=0.1, fillcolor=\"{ROOT_FILL}\"];",
            escape(&self.level_name(self.root())),
            label(root.substance())
        );

        let mut level = vec![self.root()];
        while !level.is_empty() {
            let mut next = Vec::new();
            let mut drawn_nodes: HashSet<String> = HashSet::new();
            let mut drawn_edges: HashSet<(String, String)> = HashSet::new();

            for id in level {
                let node = self.node(id);
                next.extend(node.children().iter().copied());
                let Some(parent) = node.parent() else {
                    continue;
                };

                let from = self.level_name(parent);
                let to = self.level_name(id);
                if drawn_edges.insert((from.clone(), to.clone())) {
                    let _ = writeln!(out, "  \"{}\" -> \"{}\";", escape(&from), escape(&to));
                }
                if drawn_nodes.insert(to.clone()) {
                    let fill = if node.is_leaf() { LEAF_FILL } else { NODE_FILL };
                    let _ = writeln!(
                        out,
                        "  \"{}\" [label=\"{}\", width=0.1, height=0.1, fillcolor=\"{fill}\"];",
                        escape(&to),
                        label(node.substance())
                    );
                }
            }
            level = next;
        }

        out.push_str("}\n");
        Ok(out)
    }

    /// One text block per known reaction in `keys`:
    ///
    /// ```text
    /// Reaction idx: 1
    /// Reactants: a, b
    /// Products: c
    /// Conditions: ...
    /// Source: ...
    /// ```
    pub fn reaction_summary<'k>(&self, keys: impl IntoIterator<Item = &'k ReactionKey>) -> String {
        let mut out = String::new();
        for key in keys {
            let Some(r) = self.reactions().get(key) else {
                continue;
            };
            let _ = write!(
                out,
                "Reaction idx: {}\nReactants: {}\nProducts: {}\nConditions: {}\nSource: {}\n\n",
                r.key,
                r.reactants.join(", "),
                r.products.join(", "),
                r.conditions,
                r.source
            );
        }
        out
    }

    /// [`reaction_summary`](Self::reaction_summary) of every reaction used by the tree.
    pub fn reactions_in_tree(&self) -> String {
        self.reaction_summary(self.reaction_infos())
    }
}
