//! Token-label / fragment-label co-occurrence table.
//!
//! Smoothing runs over the labels actually observed with a token, plus one
//! slot for everything unseen, never over the open-ended label space.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use super::{ModelResult, checked, smoothed_logp};

/// Counts of fragment labels per token label.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationTable<L: Eq + Hash> {
    alpha: f64,
    counts: HashMap<String, HashMap<L, f64>>,
    /// Marginal count per token label. Pruning leaves it untouched.
    totals: HashMap<String, f64>,
}

impl<L: Clone + Debug + Eq + Hash> TranslationTable<L> {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            counts: HashMap::new(),
            totals: HashMap::new(),
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Record one co-occurrence.
    pub fn observe(&mut self, token: &str, label: L) {
        self.add(token, label, 1.0);
    }

    /// Add `weight` to a pair.
    pub fn add(&mut self, token: &str, label: L, weight: f64) {
        *self
            .counts
            .entry(token.to_string())
            .or_default()
            .entry(label)
            .or_insert(0.0) += weight;
        *self.totals.entry(token.to_string()).or_insert(0.0) += weight;
    }

    pub fn count(&self, token: &str, label: &L) -> f64 {
        self.counts
            .get(token)
            .and_then(|labels| labels.get(label))
            .copied()
            .unwrap_or(0.0)
    }

    /// True if the pair has a positive count.
    pub fn contains(&self, token: &str, label: &L) -> bool {
        self.count(token, label) > 0.0
    }

    pub fn token_total(&self, token: &str) -> f64 {
        self.totals.get(token).copied().unwrap_or(0.0)
    }

    /// Number of distinct labels observed with `token`.
    pub fn vocabulary(&self, token: &str) -> usize {
        self.counts.get(token).map_or(0, HashMap::len)
    }

    /// Number of distinct token labels.
    pub fn token_count(&self) -> usize {
        self.totals.len()
    }

    /// Number of stored (token, label) pairs.
    pub fn len(&self) -> usize {
        self.counts.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Smoothed log-probability of `label` given `token`, seen or not.
    pub fn smoothed(&self, token: &str, label: &L) -> ModelResult<f64> {
        let logp = smoothed_logp(
            self.count(token, label),
            self.token_total(token),
            self.vocabulary(token),
            self.alpha,
        );
        checked(logp, || format!("translation {token:?} -> {label:?}"))
    }

    /// Smoothed log-probability, only for observed pairs.
    pub fn logp(&self, token: &str, label: &L) -> ModelResult<Option<f64>> {
        if !self.contains(token, label) {
            return Ok(None);
        }
        self.smoothed(token, label).map(Some)
    }

    /// Drop labels whose count is at most `fraction` of their token's total.
    ///
    /// Returns the number of pairs removed. Totals keep the pruned mass so the
    /// remaining probabilities stay comparable across epochs.
    pub fn prune(&mut self, fraction: f64) -> usize {
        let mut removed = 0;
        for (token, labels) in self.counts.iter_mut() {
            let total = self.totals.get(token).copied().unwrap_or(0.0);
            let before = labels.len();
            labels.retain(|_, count| *count > fraction * total);
            removed += before - labels.len();
        }
        self.counts.retain(|_, labels| !labels.is_empty());
        removed
    }

    /// Iterate over `(token, label, count)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &L, f64)> {
        self.counts.iter().flat_map(|(token, labels)| {
            labels
                .iter()
                .map(move |(label, &count)| (token.as_str(), label, count))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observed_pairs_are_smoothed_over_local_vocabulary() {
        let mut table = TranslationTable::new(1.0);
        table.observe("dog", "dog".to_string());
        table.observe("dog", "dog".to_string());
        table.observe("dog", "cat".to_string());
        // ln(2 + 1) - ln(3 + 1 * (2 + 1))
        let expected = 3f64.ln() - 6f64.ln();
        let got = table.logp("dog", &"dog".to_string()).unwrap().unwrap();
        assert!((got - expected).abs() < 1e-12);
        assert_eq!(table.logp("dog", &"bird".to_string()).unwrap(), None);
        assert!(table.smoothed("dog", &"bird".to_string()).unwrap() < got);
    }

    #[test]
    fn pruning_keeps_totals() {
        let mut table = TranslationTable::new(1.0);
        for _ in 0..200 {
            table.observe("the", "<null>".to_string());
        }
        table.observe("the", "that".to_string());
        assert_eq!(table.prune(0.01), 1);
        assert!(!table.contains("the", &"that".to_string()));
        assert_eq!(table.token_total("the"), 201.0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn unknown_tokens_are_uniform() {
        let table: TranslationTable<String> = TranslationTable::new(0.5);
        assert!(table.smoothed("zzz", &"x".to_string()).unwrap().abs() < 1e-12);
    }
}
