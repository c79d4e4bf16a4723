//! Frequency-rank prior for leaving a span unaligned.
//!
//! Common spans (function words) are cheap to leave unaligned, rare ones are
//! expensive. This is a crude prior to break ties against plausible but wrong
//! exact matches, not a learned model.

use std::collections::HashMap;

use crate::corpus::Corpus;
use crate::sentence::Sentence;

/// Probability of leaving punctuation, parenthesized spans and later
/// coreference mentions unaligned.
const FAVORED_NULL: f64 = 0.5;
/// Floor for a span repeating an earlier span's lemmas.
const REPEATED_NULL: f64 = 0.1;

/// Rank table over token labels.
#[derive(Debug, Clone, PartialEq)]
pub struct NullModel {
    /// 1-based rank by descending corpus frequency.
    ranks: HashMap<String, usize>,
    floor: f64,
}

impl NullModel {
    /// Rank every span label in the corpus. Ties rank alphabetically.
    pub fn from_corpus(corpus: &Corpus, floor: f64) -> Self {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for sentence in corpus.sentences() {
            for i in 0..sentence.span_count() {
                *counts.entry(sentence.token_label(i)).or_insert(0) += 1;
            }
        }
        let mut ordered: Vec<(String, usize)> = counts.into_iter().collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let ranks = ordered
            .into_iter()
            .enumerate()
            .map(|(i, (label, _))| (label, i + 1))
            .collect();
        Self {
            ranks,
            floor: floor.ln(),
        }
    }

    /// Rank of a token label. Unknown labels rank last.
    pub fn rank(&self, token: &str) -> usize {
        self.ranks
            .get(token)
            .copied()
            .unwrap_or_else(|| self.ranks.len().max(1))
    }

    /// `max(0.5 · ln(1 / rank), ln(floor))`.
    pub fn rank_logp(&self, token: &str) -> f64 {
        (0.5 * (1.0 / self.rank(token) as f64).ln()).max(self.floor)
    }

    /// Log-probability that span `index` of `sentence` realizes nothing.
    pub fn logp(&self, sentence: &Sentence, index: usize) -> f64 {
        let token = sentence.token_label(index);
        if sentence.is_punctuation(index)
            || sentence.is_later_mention(index)
            || sentence.in_parentheses(index)
        {
            return FAVORED_NULL.ln();
        }
        let logp = self.rank_logp(&token);
        let repeated = (0..index).any(|j| sentence.token_label(j) == token);
        if repeated {
            logp.max(REPEATED_NULL.ln())
        } else {
            logp
        }
    }
}
