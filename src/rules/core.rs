//! Language-independent completion rules for named entities, dates,
//! quantities and role frames.

use crate::graph::NodeId;
use crate::sentence::Sentence;

use super::{CompletionRules, include};

/// Frames whose argument slot is realized by the same word as the frame.
const ROLE_FRAMES: [(&str, &str); 3] = [
    ("have-degree-91", ":ARG3"),
    ("have-rel-role-91", ":ARG2"),
    ("have-org-role-91", ":ARG2"),
];

/// Always-on structural rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreRules;

impl CompletionRules for CoreRules {
    fn name(&self) -> &'static str {
        "core"
    }

    fn complete(
        &self,
        sentence: &Sentence,
        _span: usize,
        nodes: &mut Vec<NodeId>,
        taken: &dyn Fn(NodeId) -> bool,
    ) {
        loop {
            let before = nodes.len();
            self.pass(sentence, nodes, taken);
            if nodes.len() == before {
                break;
            }
        }
    }
}

impl CoreRules {
    fn pass(&self, sentence: &Sentence, nodes: &mut Vec<NodeId>, taken: &dyn Fn(NodeId) -> bool) {
        let graph = sentence.graph();
        for edge in graph.edges() {
            let (s, r, t) = (edge.source, edge.relation.as_str(), edge.target);
            let has_s = nodes.contains(&s);
            let has_t = nodes.contains(&t);
            if has_t && !has_s && !taken(s) {
                let parent = graph.concept(s);
                let pulls_parent = (parent == "name" && r.starts_with(":op"))
                    || (parent == "date-entity" && r != ":mod" && !r.ends_with("-of"))
                    || (parent.ends_with("quantity") && matches!(r, ":quant" | ":unit"))
                    || ROLE_FRAMES.contains(&(parent, r))
                    || r == ":name";
                if pulls_parent {
                    include(nodes, s);
                }
            } else if has_s && !has_t {
                let parent = graph.concept(s);
                let child = graph.concept(t);
                // a name always owns its strings, even ones claimed elsewhere
                if parent == "name" && r.starts_with(":op") {
                    include(nodes, t);
                } else if parent == "date-entity"
                    && r != ":mod"
                    && !r.ends_with("-of")
                    && !taken(t)
                {
                    include(nodes, t);
                } else if !taken(t)
                    && ROLE_FRAMES
                        .iter()
                        .any(|&(frame, arg)| child == frame && r == format!("{arg}-of"))
                {
                    include(nodes, t);
                }
            }
        }
    }
}
