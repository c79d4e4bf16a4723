//! Connectivity repair for proposed node fragments.
//!
//! A primary record must own a connected, rooted fragment. When a proposal
//! is disconnected, repair first tries to bridge the components with a single
//! free node; failing that, the largest component is kept and the rest fall
//! back to unaligned.

use std::collections::BTreeSet;

use crate::graph::traverse::{is_connected_subgraph, local_roots, rooted_components};
use crate::graph::{NodeId, SemanticGraph};

/// What repair did to a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Already connected.
    Intact,
    /// Connected after adding free bridging nodes.
    Bridged { added: Vec<NodeId> },
    /// Reduced to its largest component.
    Reduced { dropped: Vec<NodeId> },
}

impl RepairOutcome {
    pub fn is_lossless(&self) -> bool {
        !matches!(self, Self::Reduced { .. })
    }

    /// Nodes removed from the original proposal.
    pub fn dropped(&self) -> &[NodeId] {
        match self {
            Self::Reduced { dropped } => dropped,
            _ => &[],
        }
    }
}

/// A free node that is a parent of every component root, or failing that,
/// one adjacent to some member of every component. Lowest id wins.
fn find_bridge(
    graph: &SemanticGraph,
    members: &BTreeSet<NodeId>,
    components: &[Vec<NodeId>],
    is_free: &dyn Fn(NodeId) -> bool,
) -> Option<NodeId> {
    let roots: Vec<NodeId> = components
        .iter()
        .filter_map(|c| local_roots(graph, c).first().copied())
        .collect();
    let free: Vec<NodeId> = graph
        .nodes()
        .filter(|n| !members.contains(n) && is_free(*n))
        .collect();

    let parent_of_all = free.iter().copied().find(|&b| {
        roots
            .iter()
            .all(|&root| graph.parents(root).contains(&b))
    });
    if parent_of_all.is_some() {
        return parent_of_all;
    }
    free.into_iter().find(|&b| {
        components
            .iter()
            .all(|c| c.iter().any(|&n| graph.are_adjacent(b, n)))
    })
}

/// Make `nodes` a connected fragment in place.
///
/// `is_free` says whether a node outside the fragment may be pulled in as a
/// bridge (i.e. no other record owns it).
pub fn repair(
    graph: &SemanticGraph,
    nodes: &mut Vec<NodeId>,
    is_free: &dyn Fn(NodeId) -> bool,
) -> RepairOutcome {
    let original: Vec<NodeId> = nodes.clone();
    let mut added = Vec::new();
    loop {
        if is_connected_subgraph(graph, nodes) {
            return if added.is_empty() {
                RepairOutcome::Intact
            } else {
                RepairOutcome::Bridged { added }
            };
        }
        let members: BTreeSet<NodeId> = nodes.iter().copied().collect();
        let components = rooted_components(graph, nodes);
        if let Some(bridge) = find_bridge(graph, &members, &components, is_free) {
            nodes.push(bridge);
            added.push(bridge);
            continue;
        }

        let mut largest: &[NodeId] = &[];
        for component in &components {
            if component.len() > largest.len() {
                largest = component;
            }
        }
        let kept: BTreeSet<NodeId> = largest.iter().copied().collect();
        nodes.retain(|n| kept.contains(n));
        let dropped: Vec<NodeId> = original
            .iter()
            .copied()
            .filter(|n| !kept.contains(n))
            .collect();
        tracing::debug!(
            kept = kept.len(),
            dropped = dropped.len(),
            "no bridging node, keeping largest component"
        );
        return RepairOutcome::Reduced { dropped };
    }
}
