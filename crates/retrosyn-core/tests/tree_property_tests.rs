use proptest::prelude::*;
use retrosyn_core::{
    DerivationTree, EnumerationLimits, Pathway, Reaction, ReactionRecord, ReactionSet, TreeError,
};
use std::collections::{BTreeSet, HashSet};

const MAX_SUBSTANCES: usize = 8;
const MAX_REACTIONS: usize = 12;
const MAX_REACTANTS: usize = 3;
const PARTIAL_PATHWAY_BUDGET: usize = 50_000;

#[derive(Debug, Clone)]
struct ReactionCase {
    substance_count: usize,
    // (reactant indices, product index)
    reactions: Vec<(Vec<usize>, usize)>,
    available: Vec<bool>,
}

fn reaction_case_strategy() -> impl Strategy<Value = ReactionCase> {
    (2usize..=MAX_SUBSTANCES).prop_flat_map(|substance_count| {
        (
            Just(substance_count),
            prop::collection::vec(
                (
                    prop::collection::vec(0usize..substance_count, 1..=MAX_REACTANTS),
                    0usize..substance_count,
                ),
                0..=MAX_REACTIONS,
            ),
            prop::collection::vec(prop::bool::weighted(0.3), substance_count),
        )
            .prop_map(|(substance_count, reactions, available)| ReactionCase {
                substance_count,
                reactions,
                available,
            })
    })
}

fn name(i: usize) -> String {
    format!("s{i}")
}

fn reaction_set(case: &ReactionCase) -> ReactionSet {
    ReactionSet::from_records(case.reactions.iter().enumerate().map(|(i, (rs, p))| {
        (
            (i + 1) as u32,
            ReactionRecord {
                reactants: rs.iter().map(|r| name(*r)).collect(),
                products: vec![name(*p)],
                ..Default::default()
            },
        )
    }))
}

/// Target is always s0; it is never available so construction is not trivial.
fn build(case: &ReactionCase) -> (DerivationTree, Result<bool, TreeError>) {
    let available: HashSet<String> = (1..case.substance_count)
        .filter(|i| case.available[*i])
        .map(name)
        .collect();
    let mut tree = DerivationTree::new("s0", reaction_set(case));
    let result = tree.construct(&mut |s: &str| available.contains(s));
    (tree, result)
}

/// Pathways under a budget; `None` for the rare case that blows up.
fn bounded_paths(tree: &DerivationTree) -> Option<Vec<Pathway>> {
    tree.find_all_paths_with(EnumerationLimits::max_partial_pathways(PARTIAL_PATHWAY_BUDGET))
        .ok()
}

fn reaction_of<'a>(tree: &'a DerivationTree, key: &retrosyn_core::ReactionKey) -> &'a Reaction {
    tree.reactions().get(key).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_nodes_never_repeat_an_ancestor(case in reaction_case_strategy()) {
        let (tree, _) = build(&case);
        for (_, node) in tree.nodes() {
            prop_assert!(!node.ancestors().contains(node.substance()));
        }
    }

    #[test]
    fn prop_reactions_are_all_or_nothing(case in reaction_case_strategy()) {
        let (tree, _) = build(&case);
        for (_, node) in tree.nodes() {
            let mut groups: Vec<(retrosyn_core::ReactionKey, Vec<String>)> = Vec::new();
            for child in node.children() {
                let child = tree.node(*child);
                let key = child.reaction().unwrap().clone();
                match groups.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, names)) => names.push(child.substance().to_string()),
                    None => groups.push((key, vec![child.substance().to_string()])),
                }
            }
            for (key, names) in groups {
                let reaction = reaction_of(&tree, &key);
                prop_assert_eq!(&names, &reaction.reactants);
                prop_assert!(reaction.produces(node.substance()));
            }
        }
    }

    #[test]
    fn prop_surviving_nodes_are_leaves_or_have_children(case in reaction_case_strategy()) {
        let (tree, result) = build(&case);
        let expandable = result.unwrap();
        prop_assert_eq!(expandable, !tree.is_empty());
        for (id, node) in tree.nodes() {
            if id == tree.root() {
                continue;
            }
            prop_assert!(node.is_leaf() != !node.children().is_empty());
        }
    }

    #[test]
    fn prop_pathways_are_deduplicated_and_minimal(case in reaction_case_strategy()) {
        let (tree, _) = build(&case);
        let Some(paths) = bounded_paths(&tree) else {
            return Ok(());
        };
        let sets: Vec<BTreeSet<_>> = paths.iter().map(|p| p.key_set()).collect();

        for (i, path) in paths.iter().enumerate() {
            prop_assert_eq!(sets[i].len(), path.len(), "repeated key in {}", path);
            for (j, other) in sets.iter().enumerate() {
                if i != j {
                    prop_assert!(!(other.is_subset(&sets[i])), "{} contains {}", path, paths[j]);
                }
            }
        }
    }

    #[test]
    fn prop_find_all_paths_is_idempotent(case in reaction_case_strategy()) {
        let (tree, _) = build(&case);
        let Some(first) = bounded_paths(&tree) else {
            return Ok(());
        };
        let first: HashSet<_> = first.into_iter().collect();
        let second: HashSet<_> = tree.find_all_paths().into_iter().collect();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_unexpandable_substances_have_no_producer(case in reaction_case_strategy()) {
        let (tree, _) = build(&case);
        for substance in tree.unexpandable_substances() {
            prop_assert!(tree.index().producers(substance).is_empty());
        }
    }
}
