//! Scores every cluster of an existing assignment and ranks them.
//!
//! Clusters are independent subsets, so they are scored in parallel. Scoring
//! functions are not shareable across threads; each rayon worker builds its
//! own `Bernoulli` through `map_init` and keeps it for every cluster it
//! handles, which keeps its caches warm within the run.

use crate::bernoulli::Bernoulli;
use crate::clusters::cluster_ids;
use crate::config::ScanConfig;
use crate::data::ScanRecords;
use crate::scoring::{ScoreError, ScoringFunction};
use crate::subset::{SubsetAggregate, SubsetError};
use crate::types::QRange;
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid subset: {0}")]
    Subset(#[from] SubsetError),
    #[error("Scoring failed for cluster {cluster}: {source}")]
    Score {
        cluster: i64,
        #[source]
        source: ScoreError,
    },
    #[error(
        "No cluster could be scored: {admitted} admitted, {skipped} skipped. A single cluster spanning every record cannot be scanned."
    )]
    NoScorableClusters { admitted: usize, skipped: usize },
}

/// Score of one cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterScore {
    pub cluster: i64,
    pub size: usize,
    pub observed_sum: f64,
    pub expected_sum: f64,
    pub range: QRange,
    /// Penalized score at `q_mle`, or 0 when no anomalous region exists.
    pub score: f64,
}

/// Scores each admitted cluster and returns them best first.
///
/// Ordering is by score descending, then by cluster label. A cluster that
/// cannot be scored (it spans every record, or its score has no bounded
/// region) is skipped with a warning; the scan fails only when no cluster
/// is left.
pub fn scan_clusters(
    records: &ScanRecords,
    config: &ScanConfig,
) -> Result<Vec<ClusterScore>, ScanError> {
    let ids = cluster_ids(records.clusters.view(), config.outliers);
    log::info!(
        "Scanning {} clusters over {} records (direction={}, penalty={})",
        ids.len(),
        records.len(),
        config.direction,
        config.penalty
    );

    let results: Vec<Result<ClusterScore, ScanError>> = ids
        .par_iter()
        .map_init(
            || Bernoulli::with_search(config.direction, config.search),
            |scorer, &cluster| score_cluster(&*scorer, records, config.penalty, cluster),
        )
        .collect();

    let mut scores = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(score) => scores.push(score),
            Err(e) => log::warn!("Skipping cluster: {e}"),
        }
    }
    if scores.is_empty() {
        return Err(ScanError::NoScorableClusters {
            admitted: ids.len(),
            skipped: ids.len(),
        });
    }

    scores.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.cluster.cmp(&b.cluster))
    });
    Ok(scores)
}

/// The highest-scoring cluster whose anomalous region exists, if any.
pub fn best_cluster(scores: &[ClusterScore]) -> Option<&ClusterScore> {
    scores.iter().find(|s| s.range.exists)
}

/// Scores a single cluster with a caller-owned scoring function.
pub fn score_cluster<S: ScoringFunction>(
    scorer: &S,
    records: &ScanRecords,
    penalty: f64,
    cluster: i64,
) -> Result<ClusterScore, ScanError> {
    let subset = SubsetAggregate::for_cluster(
        records.outcomes.view(),
        records.probabilities.view(),
        records.clusters.view(),
        cluster,
    )?;

    let range = scorer
        .compute_qs(subset.observed_sum, subset.expectations.view(), penalty)
        .map_err(|source| ScanError::Score { cluster, source })?;
    let score = if range.exists {
        scorer.score(
            subset.observed_sum,
            subset.expectations.view(),
            penalty,
            range.q_mle,
        )
    } else {
        0.0
    };

    log::debug!(
        "cluster {cluster}: n={} observed={} expected={:.3} q_mle={:.4} score={score:.4}",
        subset.len(),
        subset.observed_sum,
        subset.expected_sum(),
        range.q_mle
    );

    Ok(ClusterScore {
        cluster,
        size: subset.len(),
        observed_sum: subset.observed_sum,
        expected_sum: subset.expected_sum(),
        range,
        score,
    })
}
