//! Weighted outcome sampling.
//!
//! A forecast yields a discrete distribution of outcomes with relative
//! weights. Exactly one is drawn per resolved interaction: a single uniform
//! draw in `[0, 1)` is compared against the cumulative normalized weights in
//! input order.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;

/// Errors for outcome sets that cannot be sampled.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SamplerError {
    #[error("Cannot sample from an empty outcome set")]
    Empty,

    #[error("Outcome `{label}` has invalid weight {weight} (weights must be positive and finite)")]
    InvalidWeight { label: String, weight: f64 },
}

/// One candidate outcome and its relative likelihood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub label: String,
    pub weight: f64,
}

impl Outcome {
    pub fn new(label: impl Into<String>, weight: f64) -> Self {
        Self {
            label: label.into(),
            weight,
        }
    }
}

/// Check that `outcomes` is a samplable distribution.
pub fn validate(outcomes: &[Outcome]) -> Result<(), SamplerError> {
    if outcomes.is_empty() {
        return Err(SamplerError::Empty);
    }
    for outcome in outcomes {
        if !outcome.weight.is_finite() || outcome.weight <= 0.0 {
            return Err(SamplerError::InvalidWeight {
                label: outcome.label.clone(),
                weight: outcome.weight,
            });
        }
    }
    Ok(())
}

/// Select the outcome that `draw` (in `[0, 1)`) falls on.
///
/// Weights are normalized; they need not sum to one. The final cumulative
/// bound is pinned to exactly 1.0, so accumulated rounding can never let a
/// draw fall past the last outcome.
pub fn select(outcomes: &[Outcome], draw: f64) -> Result<&Outcome, SamplerError> {
    validate(outcomes)?;

    // Scale by the largest weight first so the total stays finite
    let max = outcomes.iter().map(|o| o.weight).fold(0.0, f64::max);
    let total: f64 = outcomes.iter().map(|o| o.weight / max).sum();
    let last = outcomes.len() - 1;
    let mut cumulative = 0.0;

    for (i, outcome) in outcomes.iter().enumerate() {
        cumulative += outcome.weight / max / total;
        let bound = if i == last { 1.0 } else { cumulative };
        if draw < bound {
            return Ok(outcome);
        }
    }

    // Only reachable for draws outside [0, 1) or NaN
    outcomes.last().ok_or(SamplerError::Empty)
}

/// Sample with a caller-provided RNG (useful for testing).
pub fn sample_with_rng<'a, R: Rng>(
    outcomes: &'a [Outcome],
    rng: &mut R,
) -> Result<&'a Outcome, SamplerError> {
    validate(outcomes)?;
    select(outcomes, rng.gen::<f64>())
}

/// A shareable sampler owning its RNG.
///
/// Seeded samplers make a whole session reproducible: the pipeline draws in
/// batch order, after every forecast has returned.
pub struct OutcomeSampler {
    rng: Mutex<StdRng>,
}

impl OutcomeSampler {
    /// A sampler seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// A deterministic sampler.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Draw one outcome from `outcomes`.
    pub fn sample<'a>(&self, outcomes: &'a [Outcome]) -> Result<&'a Outcome, SamplerError> {
        validate(outcomes)?;
        let draw = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            rng.gen::<f64>()
        };
        select(outcomes, draw)
    }
}

impl Default for OutcomeSampler {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl std::fmt::Debug for OutcomeSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeSampler").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storm_the_base() -> Vec<Outcome> {
        vec![
            Outcome::new("succeeds quietly", 0.7),
            Outcome::new("triggers alarm", 0.3),
        ]
    }

    #[test]
    fn test_select_with_huge_weights() {
        let outcomes = vec![Outcome::new("a", 1e308), Outcome::new("b", 1e308)];
        assert_eq!(select(&outcomes, 0.1).unwrap().label, "a");
        assert_eq!(select(&outcomes, 0.9).unwrap().label, "b");
    }

    #[test]
    fn test_select_by_cumulative_weight() {
        let outcomes = storm_the_base();
        assert_eq!(select(&outcomes, 0.5).unwrap().label, "succeeds quietly");
        assert_eq!(select(&outcomes, 0.95).unwrap().label, "triggers alarm");
        assert_eq!(select(&outcomes, 0.0).unwrap().label, "succeeds quietly");
    }

    #[test]
    fn test_weights_are_normalized() {
        let outcomes = vec![Outcome::new("a", 7.0), Outcome::new("b", 3.0)];
        assert_eq!(select(&outcomes, 0.69).unwrap().label, "a");
        assert_eq!(select(&outcomes, 0.71).unwrap().label, "b");
    }

    #[test]
    fn test_last_outcome_always_reachable() {
        // Thirds never sum to exactly 1.0 in floating point
        let outcomes = vec![
            Outcome::new("a", 1.0 / 3.0),
            Outcome::new("b", 1.0 / 3.0),
            Outcome::new("c", 1.0 / 3.0),
        ];
        let just_below_one = 1.0 - f64::EPSILON;
        assert_eq!(select(&outcomes, just_below_one).unwrap().label, "c");
    }

    #[test]
    fn test_single_outcome_ignores_draw() {
        let outcomes = vec![Outcome::new("only", 0.01)];
        for draw in [0.0, 0.25, 0.5, 0.999_999] {
            assert_eq!(select(&outcomes, draw).unwrap().label, "only");
        }
    }

    #[test]
    fn test_empty_is_rejected() {
        assert_eq!(select(&[], 0.5), Err(SamplerError::Empty));
        assert_eq!(OutcomeSampler::seeded(1).sample(&[]), Err(SamplerError::Empty));
    }

    #[test]
    fn test_non_positive_weight_is_rejected() {
        let outcomes = vec![Outcome::new("a", 1.0), Outcome::new("b", 0.0)];
        assert!(matches!(
            select(&outcomes, 0.1),
            Err(SamplerError::InvalidWeight { .. })
        ));
        let outcomes = vec![Outcome::new("a", f64::NAN)];
        assert!(validate(&outcomes).is_err());
    }

    #[test]
    fn test_sampler_totality() {
        let sampler = OutcomeSampler::from_entropy();
        let outcomes = storm_the_base();
        for _ in 0..1000 {
            let picked = sampler.sample(&outcomes).unwrap();
            assert!(outcomes.iter().any(|o| o.label == picked.label));
        }
    }

    #[test]
    fn test_seeded_sampler_is_reproducible() {
        let outcomes: Vec<Outcome> = (0..10).map(|i| Outcome::new(format!("o{i}"), 1.0)).collect();
        let a = OutcomeSampler::seeded(42);
        let b = OutcomeSampler::seeded(42);
        for _ in 0..50 {
            assert_eq!(a.sample(&outcomes).unwrap(), b.sample(&outcomes).unwrap());
        }
    }

    #[test]
    fn test_sample_with_rng() {
        let mut rng = StdRng::seed_from_u64(7);
        let outcomes = storm_the_base();
        let picked = sample_with_rng(&outcomes, &mut rng).unwrap();
        assert!(picked.label == "succeeds quietly" || picked.label == "triggers alarm");
    }
}
