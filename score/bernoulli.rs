//! # Bernoulli Bias Score
//!
//! Score for binary outcomes under a multiplicative shift of the predicted
//! odds. With outcomes `yᵢ ∈ {0, 1}`, predictions `pᵢ` and `Y = Σ yᵢ`, the
//! penalized log-likelihood ratio of "odds scaled by `q`" against "model is
//! calibrated" is
//!
//! ```text
//! score(q)     = Y·ln(q) − Σ ln(1 − pᵢ + q·pᵢ) − penalty
//! q·dscore/dq  = Y − Σ q·pᵢ / (1 − pᵢ + q·pᵢ)
//! ```
//!
//! The score is concave in `ln q` (not in `q` itself once `q` is large), so
//! it has a single maximizer (`q_mle`) and at most two roots once the penalty
//! is subtracted.
//!
//! Empty subsets and expectation vectors made entirely of zeros or ones are
//! not rejected here. They belong to the caller; see [`crate::subset`].

use crate::memo::ExpectationsKey;
use crate::optim::{self, BisectionConfig};
use crate::scoring::{ScoreCaches, ScoreError, ScoringFunction};
use crate::types::{Direction, QRange};
use ndarray::ArrayView1;

/// Bernoulli scoring function with its own caches.
#[derive(Debug)]
pub struct Bernoulli {
    direction: Direction,
    search: BisectionConfig,
    caches: ScoreCaches,
}

impl Bernoulli {
    pub fn new(direction: Direction) -> Self {
        Self::with_search(direction, BisectionConfig::default())
    }

    pub fn with_search(direction: Direction, search: BisectionConfig) -> Self {
        Self {
            direction,
            search,
            caches: ScoreCaches::new(),
        }
    }

    pub fn search(&self) -> &BisectionConfig {
        &self.search
    }
}

impl ScoringFunction for Bernoulli {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn caches(&self) -> &ScoreCaches {
        &self.caches
    }

    fn score(
        &self,
        observed_sum: f64,
        expectations: ArrayView1<'_, f64>,
        penalty: f64,
        q: f64,
    ) -> f64 {
        assert!(
            q > 0.0,
            "score called with observed_sum={observed_sum:.2}, expectations of length={}, penalty={penalty:.2}, q={q:.2}; q must be positive",
            expectations.len()
        );

        let key = (
            observed_sum.to_bits(),
            ExpectationsKey::snapshot(expectations),
            penalty.to_bits(),
            q.to_bits(),
        );
        self.caches.score.evaluate(key, || {
            let log_normalizer: f64 = expectations
                .iter()
                .map(|&p| (1.0 - p + q * p).ln())
                .sum();
            observed_sum * q.ln() - log_normalizer - penalty
        })
    }

    fn q_dscore(&self, observed_sum: f64, expectations: ArrayView1<'_, f64>, q: f64) -> f64 {
        assert!(
            q > 0.0,
            "q_dscore called with observed_sum={observed_sum:.2}, expectations of length={}, q={q:.2}; q must be positive",
            expectations.len()
        );

        let key = (
            observed_sum.to_bits(),
            ExpectationsKey::snapshot(expectations),
            q.to_bits(),
        );
        self.caches.q_dscore.evaluate(key, || {
            let adjusted_sum: f64 = expectations
                .iter()
                .map(|&p| q * p / (1.0 - p + q * p))
                .sum();
            observed_sum - adjusted_sum
        })
    }

    fn qmle(
        &self,
        observed_sum: f64,
        expectations: ArrayView1<'_, f64>,
    ) -> Result<f64, ScoreError> {
        let key = (
            observed_sum.to_bits(),
            ExpectationsKey::snapshot(expectations),
        );
        self.caches.qmle.try_evaluate(key, || {
            optim::bisection_q_mle(
                self,
                observed_sum,
                expectations,
                self.direction,
                &self.search,
            )
                .map_err(ScoreError::from)
        })
    }

    fn compute_qs(
        &self,
        observed_sum: f64,
        expectations: ArrayView1<'_, f64>,
        penalty: f64,
    ) -> Result<QRange, ScoreError> {
        let key = (
            observed_sum.to_bits(),
            ExpectationsKey::snapshot(expectations),
            penalty.to_bits(),
        );
        self.caches.compute_qs.try_evaluate(key, || -> Result<QRange, ScoreError> {
            let q_mle = self.qmle(observed_sum, expectations)?;

            let peak = self.score(observed_sum, expectations, penalty, q_mle);
            if peak.is_nan() || peak <= 0.0 {
                return Ok(QRange::absent(q_mle));
            }

            let q_min = optim::bisection_q_min(
                self,
                observed_sum,
                expectations,
                penalty,
                q_mle,
                &self.search,
            )?;
            let q_max = optim::bisection_q_max(
                self,
                observed_sum,
                expectations,
                penalty,
                q_mle,
                &self.search,
            )?;

            let (exists, q_min, q_max) =
                optim::direction_assertions(self.direction, q_mle, q_min, q_max);
            if !exists {
                log::debug!(
                    "Positive-score region around q_mle={q_mle:.4} lies outside the {} direction",
                    self.direction
                );
                return Ok(QRange::absent(q_mle));
            }

            Ok(QRange {
                exists,
                q_mle,
                q_min,
                q_max,
            })
        })
    }
}
