// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// Types shared between the kernel, the bisection module, and the scan driver.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which side of `q = 1` counts as an anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Outcomes higher than predicted (`q > 1`).
    Positive,
    /// Outcomes lower than predicted (`q < 1`).
    Negative,
    #[default]
    Both,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Direction::Positive => "positive",
            Direction::Negative => "negative",
            Direction::Both => "both",
        };
        f.write_str(label)
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Direction::Positive),
            "negative" => Ok(Direction::Negative),
            "both" => Ok(Direction::Both),
            other => Err(format!(
                "Invalid direction '{other}'. Expected 'positive', 'negative', or 'both'."
            )),
        }
    }
}

/// Outcome of `compute_qs`.
///
/// `q_min` and `q_max` are only meaningful when `exists` is true; otherwise
/// both are `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QRange {
    pub exists: bool,
    pub q_mle: f64,
    pub q_min: f64,
    pub q_max: f64,
}

impl QRange {
    pub fn absent(q_mle: f64) -> Self {
        Self {
            exists: false,
            q_mle,
            q_min: 0.0,
            q_max: 0.0,
        }
    }
}

/// Cache hit counters of a scoring function, one per memoized operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHits {
    pub score: u64,
    pub qmle: u64,
    pub compute_qs: u64,
    pub q_dscore: u64,
}

impl CacheHits {
    pub fn total(&self) -> u64 {
        self.score + self.qmle + self.compute_qs + self.q_dscore
    }
}
