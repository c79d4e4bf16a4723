//! Connectivity of node sets within a semantic graph.
//!
//! A node set is an alignable fragment when the edges it induces form a single
//! rooted tree-like subgraph: exactly one member has no parent inside the set,
//! and every other member is reachable from it by edges inside the set.

use std::collections::{BTreeSet, VecDeque};

use super::{NodeId, SemanticGraph};

/// BFS over induced edges from `root`, restricted to `members`.
fn descendants_within(
    graph: &SemanticGraph,
    root: NodeId,
    members: &BTreeSet<NodeId>,
) -> BTreeSet<NodeId> {
    let mut visited = BTreeSet::new();
    let mut queue = VecDeque::new();
    visited.insert(root);
    queue.push_back(root);
    while let Some(node) = queue.pop_front() {
        for child in graph.children(node) {
            if members.contains(&child) && visited.insert(child) {
                queue.push_back(child);
            }
        }
    }
    visited
}

/// Members with no parent inside the set, ascending.
pub fn local_roots(graph: &SemanticGraph, nodes: &[NodeId]) -> Vec<NodeId> {
    let members: BTreeSet<NodeId> = nodes.iter().copied().collect();
    members
        .iter()
        .copied()
        .filter(|&n| !graph.parents(n).iter().any(|p| members.contains(p)))
        .collect()
}

/// Two differently-labeled leaves hanging off the same single parent.
///
/// Such pairs ("never" as `ever` + `-` under one predicate) are alignable
/// together even though neither dominates the other.
pub fn is_leaf_sibling_pair(graph: &SemanticGraph, a: NodeId, b: NodeId) -> bool {
    if a == b || graph.concept(a) == graph.concept(b) {
        return false;
    }
    let parents_a = graph.parents(a);
    parents_a.len() == 1
        && parents_a == graph.parents(b)
        && graph.children(a).is_empty()
        && graph.children(b).is_empty()
}

/// True iff `nodes` induces a connected subgraph with a single root.
///
/// Empty and singleton sets are trivially connected. The leaf-sibling pair
/// (see [`is_leaf_sibling_pair`]) is accepted as well.
pub fn is_connected_subgraph(graph: &SemanticGraph, nodes: &[NodeId]) -> bool {
    let members: BTreeSet<NodeId> = nodes.iter().copied().collect();
    if members.len() <= 1 {
        return true;
    }
    if members.len() == 2 {
        let mut it = members.iter().copied();
        if let (Some(a), Some(b)) = (it.next(), it.next()) {
            if is_leaf_sibling_pair(graph, a, b) {
                return true;
            }
        }
    }
    let roots = local_roots(graph, nodes);
    match roots.as_slice() {
        [root] => descendants_within(graph, *root, &members).len() == members.len(),
        _ => false,
    }
}

/// Split `nodes` into rooted components.
///
/// Each local root yields the members reachable from it. Components may
/// overlap when a member has parents under two roots. Members reachable from
/// no root (only possible inside a cycle) become singleton components.
/// When every member carries the same concept the set is split into
/// singletons, since identical concepts are never one semantic unit.
pub fn rooted_components(graph: &SemanticGraph, nodes: &[NodeId]) -> Vec<Vec<NodeId>> {
    let members: BTreeSet<NodeId> = nodes.iter().copied().collect();
    let Some(first) = members.iter().next().copied() else {
        return vec![];
    };
    if members.iter().all(|&n| graph.concept(n) == graph.concept(first)) {
        return members.into_iter().map(|n| vec![n]).collect();
    }

    let mut covered = BTreeSet::new();
    let mut components = Vec::new();
    for root in local_roots(graph, nodes) {
        let component = descendants_within(graph, root, &members);
        covered.extend(component.iter().copied());
        components.push(component.into_iter().collect::<Vec<_>>());
    }
    for node in members {
        if !covered.contains(&node) {
            components.push(vec![node]);
        }
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;

    /// a -> b -> c, a -> d, plus a second root e -> f.
    fn chain() -> (SemanticGraph, Vec<NodeId>) {
        let mut g = SemanticGraph::new();
        let a = g.add_node("a", "A").unwrap();
        let b = g.add_node("b", "B").unwrap();
        let c = g.add_node("c", "C").unwrap();
        let d = g.add_node("d", "D").unwrap();
        let e = g.add_node("e", "E").unwrap();
        let f = g.add_node("f", "F").unwrap();
        g.add_edge(a, ":ARG0", b).unwrap();
        g.add_edge(b, ":ARG1", c).unwrap();
        g.add_edge(a, ":mod", d).unwrap();
        g.add_edge(e, ":ARG0", f).unwrap();
        g.set_root(a).unwrap();
        (g, vec![a, b, c, d, e, f])
    }

    #[test]
    fn trivial_sets_are_connected() {
        let (g, n) = chain();
        assert!(is_connected_subgraph(&g, &[]));
        assert!(is_connected_subgraph(&g, &[n[2]]));
    }

    #[test]
    fn rooted_chain_is_connected() {
        let (g, n) = chain();
        assert!(is_connected_subgraph(&g, &[n[0], n[1], n[2]]));
        assert!(is_connected_subgraph(&g, &[n[0], n[1], n[3]]));
    }

    #[test]
    fn gap_is_disconnected() {
        let (g, n) = chain();
        assert!(!is_connected_subgraph(&g, &[n[0], n[2]]));
        assert!(!is_connected_subgraph(&g, &[n[0], n[4]]));
    }

    #[test]
    fn leaf_siblings_are_jointly_alignable() {
        let mut g = SemanticGraph::new();
        let p = g.add_node("p", "sleep-01").unwrap();
        let e = g.add_node("e", "ever").unwrap();
        let neg = g.add_node("n", "-").unwrap();
        g.add_edge(p, ":time", e).unwrap();
        g.add_edge(p, ":polarity", neg).unwrap();
        g.set_root(p).unwrap();
        assert!(is_connected_subgraph(&g, &[e, neg]));
    }

    #[test]
    fn components_follow_local_roots() {
        let (g, n) = chain();
        let comps = rooted_components(&g, &[n[0], n[2], n[4], n[5]]);
        assert_eq!(comps, vec![vec![n[0]], vec![n[2]], vec![n[4], n[5]]]);
    }

    #[test]
    fn identical_concepts_split_into_singletons() {
        let mut g = SemanticGraph::new();
        let a = g.add_node("a", "dog").unwrap();
        let b = g.add_node("b", "dog").unwrap();
        g.add_edge(a, ":mod", b).unwrap();
        g.set_root(a).unwrap();
        assert_eq!(rooted_components(&g, &[a, b]), vec![vec![a], vec![b]]);
    }
}
