//! # Bisection Searches for the Effect Parameter
//!
//! Stateless routines that locate the defining points of a score curve:
//!
//! - `q_mle`, where the unpenalized score peaks. Found on the sign of
//!   `q_dscore`, which decreases monotonically in `q`.
//! - `q_min` and `q_max`, the roots of the penalized score on either side of
//!   `q_mle`. Found on the sign of the score itself, which rises up to `q_mle`
//!   and falls after it.
//!
//! Every search works on a closed bracket inside `[q_lower, q_upper]` and stops
//! once the bracket is no wider than `tolerance`. Before bisecting, the far
//! end of the bracket must show the opposite sign; a curve that never crosses
//! inside the bracket (an all-ones or all-zeros subset, or non-finite input)
//! reports [`BisectionError::NoSignChange`] instead of converging onto the
//! edge. A search that runs out of iterations reports
//! [`BisectionError::DidNotConverge`].
//!
//! The routines are generic over [`ScoringFunction`], so each outcome family
//! reuses them unchanged.

use crate::scoring::ScoringFunction;
use crate::types::Direction;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Bracket and stopping rule shared by all three searches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BisectionConfig {
    /// Smallest `q` considered. Must be positive.
    pub q_lower: f64,
    /// Largest `q` considered.
    pub q_upper: f64,
    /// Absolute bracket width at which a search stops.
    pub tolerance: f64,
    /// Halving steps allowed per search.
    pub max_iterations: usize,
}

impl Default for BisectionConfig {
    fn default() -> Self {
        Self {
            q_lower: 1e-6,
            q_upper: 1e6,
            tolerance: 1e-6,
            max_iterations: 200,
        }
    }
}

/// Identifies which search failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSearch {
    QMle,
    QMin,
    QMax,
}

impl fmt::Display for RootSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RootSearch::QMle => "q_mle",
            RootSearch::QMin => "q_min",
            RootSearch::QMax => "q_max",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BisectionError {
    #[error(
        "The {search} bisection did not converge within {iterations} iterations. Remaining bracket width was {width:.6e}."
    )]
    DidNotConverge {
        search: RootSearch,
        iterations: usize,
        width: f64,
    },
    #[error(
        "The {search} search has no sign change inside the bracket; the curve is still on the same side at q = {edge:e}."
    )]
    NoSignChange { search: RootSearch, edge: f64 },
}

/// Finds the `q` that maximizes the unpenalized score on the side of `q = 1`
/// allowed by `direction`.
///
/// The search is oriented at `q = 1` first: a positive `q_dscore` there puts
/// the maximizer in `[1, q_upper]`, a negative one in `[q_lower, 1]`. A
/// maximizer on the side `direction` forbids is reported as `1`.
pub fn bisection_q_mle<S: ScoringFunction + ?Sized>(
    scorer: &S,
    observed_sum: f64,
    expectations: ArrayView1<'_, f64>,
    direction: Direction,
    config: &BisectionConfig,
) -> Result<f64, BisectionError> {
    let pivot = 1.0_f64.clamp(config.q_lower, config.q_upper);
    let slope_at_pivot = scorer.q_dscore(observed_sum, expectations, pivot);

    let rising = slope_at_pivot > 0.0;
    let falling = slope_at_pivot < 0.0;
    let (lower, upper, edge) = match direction {
        Direction::Positive if !rising => return Ok(pivot),
        Direction::Negative if !falling => return Ok(pivot),
        _ if rising => (pivot, config.q_upper, config.q_upper),
        _ if falling => (config.q_lower, pivot, config.q_lower),
        _ if slope_at_pivot == 0.0 => return Ok(pivot),
        _ => {
            return Err(BisectionError::NoSignChange {
                search: RootSearch::QMle,
                edge: pivot,
            });
        }
    };

    // the slope must cross zero before the far edge
    let slope_at_edge = scorer.q_dscore(observed_sum, expectations, edge);
    let crosses = if rising {
        slope_at_edge <= 0.0
    } else {
        slope_at_edge >= 0.0
    };
    if !crosses {
        return Err(BisectionError::NoSignChange {
            search: RootSearch::QMle,
            edge,
        });
    }

    bisect(RootSearch::QMle, lower, upper, config, |q| {
        scorer.q_dscore(observed_sum, expectations, q) > 0.0
    })
}

/// Finds the root of the penalized score in `[q_lower, q_mle]`.
///
/// Assumes `score(q_mle) > 0`. The penalized score must be non-positive at
/// `q_lower`, otherwise there is no root to find.
pub fn bisection_q_min<S: ScoringFunction + ?Sized>(
    scorer: &S,
    observed_sum: f64,
    expectations: ArrayView1<'_, f64>,
    penalty: f64,
    q_mle: f64,
    config: &BisectionConfig,
) -> Result<f64, BisectionError> {
    let at_edge = scorer.score(observed_sum, expectations, penalty, config.q_lower);
    if at_edge.is_nan() || at_edge > 0.0 {
        return Err(BisectionError::NoSignChange {
            search: RootSearch::QMin,
            edge: config.q_lower,
        });
    }

    bisect(RootSearch::QMin, config.q_lower, q_mle, config, |q| {
        scorer.score(observed_sum, expectations, penalty, q) <= 0.0
    })
}

/// Finds the root of the penalized score in `[q_mle, q_upper]`.
///
/// The penalized score must be non-positive at `q_upper`.
pub fn bisection_q_max<S: ScoringFunction + ?Sized>(
    scorer: &S,
    observed_sum: f64,
    expectations: ArrayView1<'_, f64>,
    penalty: f64,
    q_mle: f64,
    config: &BisectionConfig,
) -> Result<f64, BisectionError> {
    let at_edge = scorer.score(observed_sum, expectations, penalty, config.q_upper);
    if at_edge.is_nan() || at_edge > 0.0 {
        return Err(BisectionError::NoSignChange {
            search: RootSearch::QMax,
            edge: config.q_upper,
        });
    }

    bisect(RootSearch::QMax, q_mle, config.q_upper, config, |q| {
        scorer.score(observed_sum, expectations, penalty, q) > 0.0
    })
}

/// Restricts a positive-score region to the requested direction.
///
/// Returns `(exists, q_min, q_max)`. A region on the wrong side of `q = 1`
/// is reported as absent with `(0, 0)` bounds; an accepted region is clamped
/// so that it does not cross `q = 1`.
pub fn direction_assertions(
    direction: Direction,
    q_mle: f64,
    q_min: f64,
    q_max: f64,
) -> (bool, f64, f64) {
    match direction {
        Direction::Both => (true, q_min, q_max),
        Direction::Positive if q_mle < 1.0 => (false, 0.0, 0.0),
        Direction::Positive => (true, q_min.max(1.0), q_max),
        Direction::Negative if q_mle > 1.0 => (false, 0.0, 0.0),
        Direction::Negative => (true, q_min, q_max.min(1.0)),
    }
}

/// Halves `[lower, upper]` until it is within tolerance.
///
/// `raise_lower(mid)` decides which half is kept: `true` moves the lower end
/// up to `mid`, `false` moves the upper end down.
fn bisect(
    search: RootSearch,
    lower: f64,
    upper: f64,
    config: &BisectionConfig,
    mut raise_lower: impl FnMut(f64) -> bool,
) -> Result<f64, BisectionError> {
    let (mut lo, mut hi) = (lower, upper);
    let mut iterations = 0;

    while hi - lo > config.tolerance {
        if iterations == config.max_iterations {
            return Err(BisectionError::DidNotConverge {
                search,
                iterations,
                width: hi - lo,
            });
        }
        let mid = 0.5 * (lo + hi);
        if raise_lower(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
        iterations += 1;
    }

    let root = 0.5 * (lo + hi);
    log::debug!("{search} bisection converged to {root:.8} after {iterations} iterations");
    Ok(root)
}
