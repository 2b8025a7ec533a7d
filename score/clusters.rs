//! Accuracy-based bias aggregation over an existing cluster assignment.
//!
//! These helpers rank clusters by how much worse the classifier does inside a
//! cluster than outside it. They do not build clusters. Density-based
//! clustering labels unassigned points with [`OUTLIER_CLUSTER`]; whether that
//! label takes part in aggregation is decided by an explicit [`OutlierPolicy`]
//! passed to every helper that iterates over clusters.

use crate::subset::SubsetError;
use itertools::Itertools;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Label assigned to points that belong to no cluster.
pub const OUTLIER_CLUSTER: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierPolicy {
    /// Skip the outlier label when iterating clusters.
    #[default]
    Exclude,
    /// Treat the outlier label as an ordinary cluster.
    Include,
}

impl OutlierPolicy {
    pub fn admits(self, cluster: i64) -> bool {
        match self {
            OutlierPolicy::Exclude => cluster != OUTLIER_CLUSTER,
            OutlierPolicy::Include => true,
        }
    }
}

/// Sorted, de-duplicated cluster labels admitted by `policy`.
pub fn cluster_ids(clusters: ArrayView1<'_, i64>, policy: OutlierPolicy) -> Vec<i64> {
    clusters
        .iter()
        .copied()
        .filter(|&id| policy.admits(id))
        .sorted_unstable()
        .dedup()
        .collect()
}

/// Fraction of records with no classification error.
pub fn accuracy(errors: ArrayView1<'_, f64>) -> Result<f64, SubsetError> {
    if errors.is_empty() {
        return Err(SubsetError::Empty {
            context: "accuracy of an empty record set".to_string(),
        });
    }
    let correct = errors.iter().filter(|&&e| e == 0.0).count();
    Ok(correct as f64 / errors.len() as f64)
}

/// Accuracy of cluster `cluster` minus the accuracy of every other record.
///
/// Negative values mean the classifier underperforms on the cluster.
pub fn bias_acc(
    errors: ArrayView1<'_, f64>,
    clusters: ArrayView1<'_, i64>,
    cluster: i64,
) -> Result<f64, SubsetError> {
    check_lengths(errors, clusters)?;

    let (inside, outside): (Vec<f64>, Vec<f64>) = errors
        .iter()
        .zip(clusters.iter())
        .partition_map(|(&e, &c)| {
            if c == cluster {
                itertools::Either::Left(e)
            } else {
                itertools::Either::Right(e)
            }
        });

    if inside.is_empty() {
        return Err(SubsetError::Empty {
            context: format!("cluster {cluster}"),
        });
    }
    if outside.is_empty() {
        return Err(SubsetError::WholeDataset {
            records: errors.len(),
            context: format!("cluster {cluster}"),
        });
    }

    Ok(accuracy(ArrayView1::from(&inside))? - accuracy(ArrayView1::from(&outside))?)
}

/// Cluster with the most negative accuracy bias, and that bias.
///
/// Ties keep the lowest cluster label. Returns `None` when `policy` admits no
/// cluster.
pub fn most_biased_cluster(
    errors: ArrayView1<'_, f64>,
    clusters: ArrayView1<'_, i64>,
    policy: OutlierPolicy,
) -> Result<Option<(i64, f64)>, SubsetError> {
    let mut best: Option<(i64, f64)> = None;
    for id in cluster_ids(clusters, policy) {
        let bias = bias_acc(errors, clusters, id)?;
        log::debug!("cluster {id} has accuracy bias {bias:.4}");
        if best.is_none_or(|(_, lowest)| bias < lowest) {
            best = Some((id, bias));
        }
    }
    Ok(best)
}

/// The most negative accuracy bias over admitted clusters.
pub fn max_negative_bias(
    errors: ArrayView1<'_, f64>,
    clusters: ArrayView1<'_, i64>,
    policy: OutlierPolicy,
) -> Result<Option<f64>, SubsetError> {
    Ok(most_biased_cluster(errors, clusters, policy)?.map(|(_, bias)| bias))
}

/// Size of the smallest admitted cluster.
pub fn min_cluster_size(clusters: ArrayView1<'_, i64>, policy: OutlierPolicy) -> Option<usize> {
    clusters
        .iter()
        .copied()
        .filter(|&id| policy.admits(id))
        .counts()
        .into_values()
        .min()
}

/// Cluster whose errors have the highest population variance; the next
/// candidate for splitting. Ties keep the lowest cluster label.
pub fn next_cluster(
    errors: ArrayView1<'_, f64>,
    clusters: ArrayView1<'_, i64>,
    policy: OutlierPolicy,
) -> Result<Option<i64>, SubsetError> {
    check_lengths(errors, clusters)?;

    let mut best: Option<(i64, f64)> = None;
    for id in cluster_ids(clusters, policy) {
        let members: Vec<f64> = errors
            .iter()
            .zip(clusters.iter())
            .filter(|&(_, &c)| c == id)
            .map(|(&e, _)| e)
            .collect();
        let variance = population_variance(&members);
        if best.is_none_or(|(_, highest)| variance > highest) {
            best = Some((id, variance));
        }
    }
    Ok(best.map(|(id, _)| id))
}

/// Population variance of the per-cluster accuracy biases.
pub fn bias_variance(
    errors: ArrayView1<'_, f64>,
    clusters: ArrayView1<'_, i64>,
    policy: OutlierPolicy,
) -> Result<f64, SubsetError> {
    let biases = cluster_ids(clusters, policy)
        .into_iter()
        .map(|id| bias_acc(errors, clusters, id))
        .collect::<Result<Vec<f64>, _>>()?;
    Ok(population_variance(&biases))
}

fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

fn check_lengths(
    errors: ArrayView1<'_, f64>,
    clusters: ArrayView1<'_, i64>,
) -> Result<(), SubsetError> {
    if errors.len() != clusters.len() {
        return Err(SubsetError::LengthMismatch {
            outcomes: errors.len(),
            predictions: errors.len(),
            labels: clusters.len(),
        });
    }
    Ok(())
}
