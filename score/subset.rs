//! Selection boundary between record-level data and the scoring kernel.
//!
//! The kernel only sees `(observed_sum, expectations)`. Empty selections and
//! selections covering the whole dataset make the score meaningless, so they
//! are rejected here, before any scoring function is called.

use ndarray::{Array1, ArrayView1};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubsetError {
    #[error(
        "Record arrays have mismatched lengths: {outcomes} outcomes, {predictions} predictions, {labels} labels."
    )]
    LengthMismatch {
        outcomes: usize,
        predictions: usize,
        labels: usize,
    },
    #[error("The selected subset is empty ({context}).")]
    Empty { context: String },
    #[error("The selected subset covers the entire dataset of {records} records ({context}).")]
    WholeDataset { records: usize, context: String },
}

/// Aggregates of a selected subset, ready for a scoring function.
#[derive(Debug, Clone, PartialEq)]
pub struct SubsetAggregate {
    pub observed_sum: f64,
    pub expectations: Array1<f64>,
}

impl SubsetAggregate {
    /// Collects the records for which `selected(i)` holds.
    pub fn from_selection(
        outcomes: ArrayView1<'_, f64>,
        probabilities: ArrayView1<'_, f64>,
        selected: impl Fn(usize) -> bool,
    ) -> Result<Self, SubsetError> {
        Self::collect(outcomes, probabilities, selected, "custom selection")
    }

    /// Collects the records carrying cluster label `cluster`.
    pub fn for_cluster(
        outcomes: ArrayView1<'_, f64>,
        probabilities: ArrayView1<'_, f64>,
        clusters: ArrayView1<'_, i64>,
        cluster: i64,
    ) -> Result<Self, SubsetError> {
        if clusters.len() != outcomes.len() {
            return Err(SubsetError::LengthMismatch {
                outcomes: outcomes.len(),
                predictions: probabilities.len(),
                labels: clusters.len(),
            });
        }
        Self::collect(
            outcomes,
            probabilities,
            |i| clusters[i] == cluster,
            &format!("cluster {cluster}"),
        )
    }

    pub fn len(&self) -> usize {
        self.expectations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expectations.is_empty()
    }

    /// Sum of predicted probabilities, the outcome count the model expects.
    pub fn expected_sum(&self) -> f64 {
        self.expectations.sum()
    }

    fn collect(
        outcomes: ArrayView1<'_, f64>,
        probabilities: ArrayView1<'_, f64>,
        selected: impl Fn(usize) -> bool,
        context: &str,
    ) -> Result<Self, SubsetError> {
        let records = outcomes.len();
        if probabilities.len() != records {
            return Err(SubsetError::LengthMismatch {
                outcomes: records,
                predictions: probabilities.len(),
                labels: records,
            });
        }

        let mut observed_sum = 0.0;
        let mut expectations = Vec::new();
        for i in (0..records).filter(|&i| selected(i)) {
            observed_sum += outcomes[i];
            expectations.push(probabilities[i]);
        }

        if expectations.is_empty() {
            return Err(SubsetError::Empty {
                context: context.to_string(),
            });
        }
        if expectations.len() == records {
            return Err(SubsetError::WholeDataset {
                records,
                context: context.to_string(),
            });
        }

        Ok(Self {
            observed_sum,
            expectations: Array1::from(expectations),
        })
    }
}
