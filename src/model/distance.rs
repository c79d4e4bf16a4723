//! Positional offset models.
//!
//! Offsets are signed differences between span positions. The Skellam
//! distribution (difference of two Poisson counts) fits them naturally; the
//! Gaussian is a coarser alternative. Both clip offsets to
//! `[-MAX_DISTANCE, MAX_DISTANCE]`, floor probabilities at
//! [`MIN_PROBABILITY`], and memoize per offset until refit.

use dashmap::DashMap;

use crate::config::DistanceKind;

use super::MIN_PROBABILITY;

/// Offsets beyond this magnitude are scored as if they were this far.
pub const MAX_DISTANCE: i32 = 100;

/// Lower bound on the variance used to fit either distribution.
const MIN_STDEV: f64 = 1.0;

fn clip(distance: i32) -> i32 {
    distance.clamp(-MAX_DISTANCE, MAX_DISTANCE)
}

fn log_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// `ln I_n(x)`, the modified Bessel function of the first kind, by its power
/// series summed in log space.
fn ln_bessel_i(n: u32, x: f64) -> f64 {
    if x <= 0.0 {
        return if n == 0 { 0.0 } else { f64::NEG_INFINITY };
    }
    let ln_half_x = (x / 2.0).ln();
    // ln j! and ln (j + n)!
    let mut ln_fact_j = 0.0;
    let mut ln_fact_jn: f64 = (1..=n).map(|k| (k as f64).ln()).sum();
    let mut acc = f64::NEG_INFINITY;
    let peak = x / 2.0;
    for j in 0u32..10_000 {
        if j > 0 {
            ln_fact_j += (j as f64).ln();
            ln_fact_jn += ((j + n) as f64).ln();
        }
        let term = (2 * j + n) as f64 * ln_half_x - ln_fact_j - ln_fact_jn;
        acc = log_add(acc, term);
        if j as f64 > peak && term < acc - 36.0 {
            break;
        }
    }
    acc
}

/// Skellam distribution with mean `μ1 − μ2` and variance `μ1 + μ2`.
#[derive(Debug, Clone)]
pub struct SkellamDistance {
    mean: f64,
    stdev: f64,
    mu1: f64,
    mu2: f64,
    memo: DashMap<i32, f64>,
}

impl SkellamDistance {
    pub fn new(mean: f64, stdev: f64) -> Self {
        let mut model = Self {
            mean: 0.0,
            stdev: MIN_STDEV,
            mu1: 0.5,
            mu2: 0.5,
            memo: DashMap::new(),
        };
        model.update_parameters(mean, stdev);
        model
    }

    /// Refit. The variance is raised to at least `|mean| + 0.1` so both
    /// Poisson rates stay positive.
    pub fn update_parameters(&mut self, mean: f64, stdev: f64) {
        let stdev = if stdev > 0.0 { stdev } else { MIN_STDEV };
        let variance = (stdev * stdev).max(mean.abs() + 0.1);
        self.mean = mean;
        self.stdev = stdev;
        self.mu2 = (variance - mean) / 2.0;
        self.mu1 = mean + self.mu2;
        self.memo.clear();
    }

    pub fn logp(&self, distance: i32) -> f64 {
        let k = clip(distance);
        if let Some(hit) = self.memo.get(&k) {
            return *hit;
        }
        let (mu1, mu2) = (self.mu1, self.mu2);
        let logp = -(mu1 + mu2)
            + (k as f64 / 2.0) * (mu1 / mu2).ln()
            + ln_bessel_i(k.unsigned_abs(), 2.0 * (mu1 * mu2).sqrt());
        let logp = logp.min(0.0).max(MIN_PROBABILITY.ln());
        self.memo.insert(k, logp);
        logp
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn stdev(&self) -> f64 {
        self.stdev
    }
}

/// Normal density evaluated at integer offsets.
#[derive(Debug, Clone)]
pub struct GaussianDistance {
    mean: f64,
    stdev: f64,
    memo: DashMap<i32, f64>,
}

impl GaussianDistance {
    pub fn new(mean: f64, stdev: f64) -> Self {
        let mut model = Self {
            mean: 0.0,
            stdev: MIN_STDEV,
            memo: DashMap::new(),
        };
        model.update_parameters(mean, stdev);
        model
    }

    /// Refit. The standard deviation is floored at 1 so the density stays
    /// below 1 everywhere.
    pub fn update_parameters(&mut self, mean: f64, stdev: f64) {
        self.mean = mean;
        self.stdev = stdev.max(MIN_STDEV);
        self.memo.clear();
    }

    pub fn logp(&self, distance: i32) -> f64 {
        let k = clip(distance);
        if let Some(hit) = self.memo.get(&k) {
            return *hit;
        }
        let z = (k as f64 - self.mean) / self.stdev;
        let logp = -0.5 * (2.0 * std::f64::consts::PI * self.stdev * self.stdev).ln() - 0.5 * z * z;
        let logp = logp.max(MIN_PROBABILITY.ln());
        self.memo.insert(k, logp);
        logp
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn stdev(&self) -> f64 {
        self.stdev
    }
}

/// Offset model selected by [`DistanceKind`].
#[derive(Debug, Clone)]
pub enum DistanceModel {
    Skellam(SkellamDistance),
    Gaussian(GaussianDistance),
}

impl DistanceModel {
    pub fn new(kind: DistanceKind, mean: f64, stdev: f64) -> Self {
        match kind {
            DistanceKind::Skellam => Self::Skellam(SkellamDistance::new(mean, stdev)),
            DistanceKind::Gaussian => Self::Gaussian(GaussianDistance::new(mean, stdev)),
        }
    }

    pub fn kind(&self) -> DistanceKind {
        match self {
            Self::Skellam(_) => DistanceKind::Skellam,
            Self::Gaussian(_) => DistanceKind::Gaussian,
        }
    }

    /// Log-probability of a signed span offset.
    pub fn logp(&self, distance: i32) -> f64 {
        match self {
            Self::Skellam(m) => m.logp(distance),
            Self::Gaussian(m) => m.logp(distance),
        }
    }

    /// Score used when there is no neighbor to measure against: the offset
    /// one standard deviation out.
    pub fn default_logp(&self) -> f64 {
        self.logp(self.stdev().round() as i32)
    }

    pub fn update_parameters(&mut self, mean: f64, stdev: f64) {
        match self {
            Self::Skellam(m) => m.update_parameters(mean, stdev),
            Self::Gaussian(m) => m.update_parameters(mean, stdev),
        }
    }

    /// Refit from observed offsets; needs at least two observations.
    pub fn fit(&mut self, offsets: &[i32]) -> bool {
        match fit(offsets) {
            Some((mean, stdev)) => {
                self.update_parameters(mean, stdev);
                true
            }
            None => false,
        }
    }

    pub fn mean(&self) -> f64 {
        match self {
            Self::Skellam(m) => m.mean(),
            Self::Gaussian(m) => m.mean(),
        }
    }

    pub fn stdev(&self) -> f64 {
        match self {
            Self::Skellam(m) => m.stdev(),
            Self::Gaussian(m) => m.stdev(),
        }
    }
}

/// Sample mean and standard deviation of clipped offsets.
pub fn fit(offsets: &[i32]) -> Option<(f64, f64)> {
    if offsets.len() < 2 {
        return None;
    }
    let n = offsets.len() as f64;
    let values: Vec<f64> = offsets.iter().map(|&d| clip(d) as f64).collect();
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((mean, variance.sqrt()))
}
