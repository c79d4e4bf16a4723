//! Preprocessed sentences: tokens, lemmas, span partition, and their graph.
//!
//! Spans are the atomic units of text an alignment can anchor on. They
//! partition the tokens and never change during alignment; everything else in
//! the crate addresses them by their position in [`Sentence::spans`].

use serde::{Deserialize, Serialize};

use crate::error::CorpusError;
use crate::graph::SemanticGraph;

/// Result type for sentence and corpus operations.
pub type CorpusResult<T> = std::result::Result<T, CorpusError>;

/// A contiguous, non-empty token range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Span covering exactly one token.
    pub fn single(token: usize) -> Self {
        Self::new(token, token + 1)
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, token: usize) -> bool {
        (self.start..self.end).contains(&token)
    }

    /// Token indices covered by the span.
    pub fn tokens(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// One sentence with its annotations and graph.
#[derive(Debug, Clone)]
pub struct Sentence {
    id: String,
    tokens: Vec<String>,
    lemmas: Vec<String>,
    pos: Vec<String>,
    spans: Vec<Span>,
    /// token index → span index
    token_span: Vec<usize>,
    coref: Vec<Vec<Span>>,
    graph: SemanticGraph,
}

impl Sentence {
    /// Create a sentence with one span per token and lemmas equal to tokens.
    pub fn new(id: impl Into<String>, tokens: Vec<String>, graph: SemanticGraph) -> Self {
        let spans: Vec<Span> = (0..tokens.len()).map(Span::single).collect();
        Self {
            id: id.into(),
            lemmas: tokens.clone(),
            pos: Vec::new(),
            token_span: (0..tokens.len()).collect(),
            spans,
            tokens,
            coref: Vec::new(),
            graph,
        }
    }

    /// Replace lemmas. Must match the token count.
    pub fn with_lemmas(mut self, lemmas: Vec<String>) -> CorpusResult<Self> {
        self.check_length("lemmas", lemmas.len())?;
        self.lemmas = lemmas;
        Ok(self)
    }

    /// Attach part-of-speech tags. Must match the token count.
    pub fn with_pos(mut self, pos: Vec<String>) -> CorpusResult<Self> {
        self.check_length("pos", pos.len())?;
        self.pos = pos;
        Ok(self)
    }

    /// Replace the span partition.
    pub fn with_spans(mut self, spans: Vec<Span>) -> CorpusResult<Self> {
        let mut token_span = Vec::with_capacity(self.tokens.len());
        let mut next = 0;
        for (i, span) in spans.iter().enumerate() {
            if span.is_empty() {
                return Err(self.partition_error(format!("span {i} ({span}) is empty")));
            }
            if span.start != next {
                return Err(self.partition_error(format!(
                    "span {i} starts at token {} but token {next} is next",
                    span.start
                )));
            }
            token_span.extend(std::iter::repeat_n(i, span.len()));
            next = span.end;
        }
        if next != self.tokens.len() {
            return Err(self.partition_error(format!(
                "spans cover {next} tokens, sentence has {}",
                self.tokens.len()
            )));
        }
        self.spans = spans;
        self.token_span = token_span;
        Ok(self)
    }

    /// Attach coreference chains (each a list of co-referent token ranges).
    pub fn with_coref(mut self, chains: Vec<Vec<Span>>) -> CorpusResult<Self> {
        for mention in chains.iter().flatten() {
            if mention.is_empty() || mention.end > self.tokens.len() {
                return Err(CorpusError::InvalidSpan {
                    sentence: self.id.clone(),
                    start: mention.start,
                    end: mention.end,
                });
            }
        }
        self.coref = chains;
        Ok(self)
    }

    fn check_length(&self, field: &str, actual: usize) -> CorpusResult<()> {
        if actual == self.tokens.len() {
            Ok(())
        } else {
            Err(CorpusError::LengthMismatch {
                sentence: self.id.clone(),
                field: field.into(),
                expected: self.tokens.len(),
                actual,
            })
        }
    }

    fn partition_error(&self, message: String) -> CorpusError {
        CorpusError::InvalidPartition {
            sentence: self.id.clone(),
            message,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn lemmas(&self) -> &[String] {
        &self.lemmas
    }

    /// POS tag of a token, if tags were supplied.
    pub fn pos(&self, token: usize) -> Option<&str> {
        self.pos.get(token).map(String::as_str)
    }

    pub fn has_pos(&self) -> bool {
        !self.pos.is_empty()
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn span(&self, index: usize) -> Span {
        self.spans[index]
    }

    pub fn coref(&self) -> &[Vec<Span>] {
        &self.coref
    }

    pub fn graph(&self) -> &SemanticGraph {
        &self.graph
    }

    /// Position of `span` in the partition.
    pub fn span_index(&self, span: Span) -> Option<usize> {
        let index = *self.token_span.get(span.start)?;
        (self.spans[index] == span).then_some(index)
    }

    /// Span containing `token`.
    pub fn span_of_token(&self, token: usize) -> Option<usize> {
        self.token_span.get(token).copied()
    }

    /// Lemma sequence of a span, space-joined. This is the token label the
    /// scoring models key on.
    pub fn token_label(&self, index: usize) -> String {
        self.spans[index]
            .tokens()
            .map(|t| self.lemmas[t].as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Lemmas of the individual tokens of a span.
    pub fn span_lemmas(&self, index: usize) -> &[String] {
        let span = self.spans[index];
        &self.lemmas[span.start..span.end]
    }

    /// POS tag of the first token of a span, or the empty string.
    pub fn span_pos(&self, index: usize) -> &str {
        self.pos(self.spans[index].start).unwrap_or("")
    }

    /// Signed offset from span `from` to span `to`, in span units.
    pub fn span_distance(&self, from: usize, to: usize) -> i32 {
        to as i32 - from as i32
    }

    /// True if every token of the span is punctuation.
    pub fn is_punctuation(&self, index: usize) -> bool {
        self.spans[index].tokens().all(|t| {
            let token = &self.tokens[t];
            !token.is_empty() && token.chars().all(|c| !c.is_alphanumeric())
        })
    }

    /// True if the span sits inside an open parenthesis.
    pub fn in_parentheses(&self, index: usize) -> bool {
        let start = self.spans[index].start;
        let mut depth = 0i32;
        for token in &self.tokens[..start] {
            match token.as_str() {
                "(" | "-LRB-" => depth += 1,
                ")" | "-RRB-" => depth = (depth - 1).max(0),
                _ => {}
            }
        }
        depth > 0
    }

    /// Index of the coreference chain with a mention starting in this span.
    pub fn coref_chain(&self, index: usize) -> Option<usize> {
        let span = self.spans[index];
        self.coref
            .iter()
            .position(|chain| chain.iter().any(|m| span.contains(m.start)))
    }

    /// True if the span holds a coreference mention other than its chain's first.
    pub fn is_later_mention(&self, index: usize) -> bool {
        let span = self.spans[index];
        self.coref.iter().any(|chain| {
            let first = chain.iter().map(|m| m.start).min();
            chain
                .iter()
                .any(|m| span.contains(m.start) && Some(m.start) != first)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    fn sentence(s: &str) -> Sentence {
        Sentence::new("t", words(s), SemanticGraph::new())
    }

    #[test]
    fn default_partition_is_one_span_per_token() {
        let s = sentence("John saw Mary");
        assert_eq!(s.span_count(), 3);
        assert_eq!(s.span_of_token(2), Some(2));
        assert_eq!(s.token_label(1), "saw");
    }

    #[test]
    fn merged_spans() {
        let s = sentence("New York is big")
            .with_spans(vec![Span::new(0, 2), Span::new(2, 3), Span::new(3, 4)])
            .unwrap();
        assert_eq!(s.token_label(0), "New York");
        assert_eq!(s.span_of_token(1), Some(0));
        assert_eq!(s.span_index(Span::new(0, 2)), Some(0));
        assert_eq!(s.span_index(Span::new(1, 2)), None);
        assert_eq!(s.span_distance(2, 0), -2);
    }

    #[test]
    fn invalid_partitions_are_rejected() {
        let gap = sentence("a b c").with_spans(vec![Span::new(0, 1), Span::new(2, 3)]);
        assert!(matches!(gap, Err(CorpusError::InvalidPartition { .. })));
        let short = sentence("a b c").with_spans(vec![Span::new(0, 2)]);
        assert!(matches!(short, Err(CorpusError::InvalidPartition { .. })));
        let empty = sentence("a").with_spans(vec![Span::new(0, 0), Span::new(0, 1)]);
        assert!(matches!(empty, Err(CorpusError::InvalidPartition { .. })));
    }

    #[test]
    fn lemma_count_must_match() {
        let err = sentence("dogs bark").with_lemmas(words("dog")).unwrap_err();
        assert!(matches!(err, CorpusError::LengthMismatch { .. }));
    }

    #[test]
    fn punctuation_and_parentheses() {
        let s = sentence("he ( the boss ) left .");
        assert!(s.is_punctuation(1));
        assert!(s.is_punctuation(6));
        assert!(!s.is_punctuation(0));
        assert!(s.in_parentheses(3));
        assert!(!s.in_parentheses(5));
    }

    #[test]
    fn later_coref_mentions() {
        let s = sentence("John said he left")
            .with_coref(vec![vec![Span::single(0), Span::single(2)]])
            .unwrap();
        assert!(!s.is_later_mention(0));
        assert!(s.is_later_mention(2));
        assert_eq!(s.coref_chain(2), Some(0));
        assert_eq!(s.coref_chain(1), None);
    }
}
