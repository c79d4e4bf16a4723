//! English morphology rules: agentive and nominal suffixes, "-able",
//! comparatives and superlatives, and exact lemma matches.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::graph::NodeId;
use crate::sentence::Sentence;

use super::{CompletionRules, include};

static SENSE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-\d+$").unwrap());

/// Concepts too generic to seed from a lemma match.
const GENERIC_CONCEPTS: [&str; 7] = ["thing", "person", "and", "or", "-", "name", "have-degree-91"];

fn ends_with_any(word: &str, suffixes: &[&str]) -> bool {
    let word = word.to_lowercase();
    suffixes.iter().any(|s| word.ends_with(s))
}

/// Concept label with quotes and sense number stripped, lowercased.
fn bare_concept(concept: &str) -> String {
    SENSE_SUFFIX
        .replace(concept.trim_matches('"'), "")
        .to_lowercase()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishRules;

impl CompletionRules for EnglishRules {
    fn name(&self) -> &'static str {
        "english"
    }

    fn complete(
        &self,
        sentence: &Sentence,
        span: usize,
        nodes: &mut Vec<NodeId>,
        taken: &dyn Fn(NodeId) -> bool,
    ) {
        if nodes.is_empty() {
            return;
        }
        let graph = sentence.graph();
        let range = sentence.span(span);
        let last = range.end - 1;
        let last_lemma = sentence.lemmas()[last].as_str();
        let last_token = sentence.tokens()[last].as_str();
        let next_lemma = sentence
            .lemmas()
            .get(range.end)
            .map(|l| l.to_lowercase())
            .unwrap_or_default();
        let any_able = range
            .tokens()
            .any(|t| ends_with_any(&sentence.tokens()[t], &["able", "ible"]));
        let has_of = range
            .tokens()
            .any(|t| sentence.tokens()[t].eq_ignore_ascii_case("of"));

        for edge in graph.edges() {
            let (s, r, t) = (edge.source, edge.relation.as_str(), edge.target);
            let has_s = nodes.contains(&s);
            let has_t = nodes.contains(&t);
            if has_t && !has_s && !taken(s) {
                let pull = match (graph.concept(s), r) {
                    ("person", ":ARG0-of") => {
                        matches!(graph.concept(t), "have-org-role-91" | "have-rel-role-91")
                            || ends_with_any(last_lemma, &["er", "or", "ist"])
                    }
                    ("thing", ":ARG0-of" | ":ARG1-of" | ":ARG2-of") => {
                        ends_with_any(last_lemma, &["ment", "tion", "sion"]) || r == ":ARG1-of"
                    }
                    ("possible-01", _) => any_able,
                    ("have-degree-91", ":ARG2") => ends_with_any(last_token, &["est", "er"]),
                    ("person" | "thing", ":quant") => matches!(next_lemma.as_str(), "have" | "be"),
                    ("mean-01", _) => has_of,
                    _ => false,
                };
                if pull {
                    include(nodes, s);
                }
            } else if has_s && !has_t && !taken(t) {
                let pull = match (graph.concept(s), r, graph.concept(t)) {
                    (_, ":ARG1-of", "possible-01") => any_able,
                    (_, ":mode", "imperative") => true,
                    ("have-degree-91", ":ARG3", "more" | "most") => {
                        ends_with_any(last_token, &["est", "er"])
                    }
                    _ => false,
                };
                if pull {
                    include(nodes, t);
                }
            }
        }
    }

    /// A concept whose bare label equals the lemma of exactly one span, and
    /// which occurs once in the graph.
    fn exact_matches(&self, sentence: &Sentence) -> Vec<(usize, NodeId)> {
        let graph = sentence.graph();
        let mut by_label: HashMap<String, Vec<usize>> = HashMap::new();
        for i in 0..sentence.span_count() {
            by_label
                .entry(sentence.token_label(i).to_lowercase())
                .or_default()
                .push(i);
        }
        let mut concept_counts: HashMap<&str, usize> = HashMap::new();
        for n in graph.nodes() {
            *concept_counts.entry(graph.concept(n)).or_insert(0) += 1;
        }
        graph
            .nodes()
            .filter(|&n| {
                let concept = graph.concept(n);
                concept_counts.get(concept) == Some(&1) && !GENERIC_CONCEPTS.contains(&concept)
            })
            .filter_map(|n| match by_label.get(&bare_concept(graph.concept(n)))?.as_slice() {
                [only] => Some((*only, n)),
                _ => None,
            })
            .collect()
    }
}
