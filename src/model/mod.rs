//! Scoring models.
//!
//! All probabilities are handled in log space. Every model is rebuilt from an
//! alignment collection between epochs and is read-only while sentences are
//! being aligned.
//!
//! - [`translation`]: smoothed token-label / fragment-label co-occurrence
//! - [`parts`]: per-part backoff counts (concepts, internal edges, relations)
//! - [`null`]: frequency-rank prior for leaving a span unaligned
//! - [`distance`]: Skellam / Gaussian offset models

pub mod distance;
pub mod null;
pub mod parts;
pub mod translation;

use crate::error::ModelError;

pub use distance::DistanceModel;
pub use null::NullModel;
pub use parts::PartsModel;
pub use translation::TranslationTable;

/// Result type for scoring operations.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Floor for every probability the models hand out.
pub const MIN_PROBABILITY: f64 = 1e-6;

/// Rounding slack before a positive log-probability counts as improper.
const LOG_TOLERANCE: f64 = 1e-9;

/// Fail on log-probabilities that decode to p > 1.
pub fn checked(logp: f64, context: impl FnOnce() -> String) -> ModelResult<f64> {
    if logp > LOG_TOLERANCE || logp.is_nan() {
        return Err(ModelError::ImproperProbability {
            logp,
            context: context(),
        });
    }
    Ok(logp)
}

/// Additive smoothing over the observed vocabulary plus one unseen slot:
/// `ln(count + α) − ln(total + α·(V + 1))`.
pub fn smoothed_logp(count: f64, total: f64, vocabulary: usize, alpha: f64) -> f64 {
    (count + alpha).ln() - (total + alpha * (vocabulary as f64 + 1.0)).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoothing_is_proper() {
        assert!(smoothed_logp(3.0, 3.0, 1, 1.0) < 0.0);
        assert!(smoothed_logp(0.0, 0.0, 0, 1.0).abs() < 1e-12);
    }

    #[test]
    fn positive_logs_are_trapped() {
        assert!(checked(-0.5, || "ok".into()).is_ok());
        assert!(matches!(
            checked(0.1, || "bad".into()),
            Err(ModelError::ImproperProbability { .. })
        ));
        assert!(checked(f64::NAN, || "nan".into()).is_err());
    }
}
