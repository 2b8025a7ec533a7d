//! The contract every score family implements, and the caches it carries.

use crate::memo::{ExpectationsKey, Memo};
use crate::optim::BisectionError;
use crate::types::{CacheHits, Direction, QRange};
use ndarray::ArrayView1;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    #[error("Root finding failed: {0}")]
    Bisection(#[from] BisectionError),
}

pub type ScoreKey = (u64, ExpectationsKey, u64, u64);
pub type DScoreKey = (u64, ExpectationsKey, u64);
pub type QmleKey = (u64, ExpectationsKey);
pub type QsKey = (u64, ExpectationsKey, u64);

/// Four independent memo tables, one per cached operation.
///
/// A fresh set is created with every scoring function and lives exactly as
/// long as it does; nothing is ever evicted. Build a new scoring function for
/// each scan run.
#[derive(Debug, Default)]
pub struct ScoreCaches {
    pub score: Memo<ScoreKey, f64>,
    pub q_dscore: Memo<DScoreKey, f64>,
    pub qmle: Memo<QmleKey, f64>,
    pub compute_qs: Memo<QsKey, QRange>,
}

impl ScoreCaches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hits(&self) -> CacheHits {
        CacheHits {
            score: self.score.hits(),
            qmle: self.qmle.hits(),
            compute_qs: self.compute_qs.hits(),
            q_dscore: self.q_dscore.hits(),
        }
    }

    /// Number of stored entries across all four tables.
    pub fn entries(&self) -> usize {
        self.score.len() + self.q_dscore.len() + self.qmle.len() + self.compute_qs.len()
    }
}

/// A penalized log-likelihood-ratio score over an effect parameter `q`.
///
/// Implementors fix the score shape (Bernoulli here; Poisson or Gaussian would
/// be siblings) and must memoize all four operations in their [`ScoreCaches`].
/// `score` and `q_dscore` panic when `q <= 0`.
pub trait ScoringFunction {
    fn direction(&self) -> Direction;

    fn caches(&self) -> &ScoreCaches;

    /// Penalized score at `q`.
    fn score(
        &self,
        observed_sum: f64,
        expectations: ArrayView1<'_, f64>,
        penalty: f64,
        q: f64,
    ) -> f64;

    /// `q` times the derivative of the score in `q`. Shares the derivative's
    /// sign and is independent of the penalty.
    fn q_dscore(&self, observed_sum: f64, expectations: ArrayView1<'_, f64>, q: f64) -> f64;

    /// The `q` maximizing the unpenalized score.
    fn qmle(&self, observed_sum: f64, expectations: ArrayView1<'_, f64>)
    -> Result<f64, ScoreError>;

    /// Whether the penalized score is positive anywhere in the instance's
    /// direction, and if so the roots bracketing that region.
    fn compute_qs(
        &self,
        observed_sum: f64,
        expectations: ArrayView1<'_, f64>,
        penalty: f64,
    ) -> Result<QRange, ScoreError>;

    fn cache_hits(&self) -> CacheHits {
        self.caches().hits()
    }
}
