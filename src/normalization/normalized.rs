//! Normalized count matrix

use ndarray::{Array2, ArrayView2};

use super::{cpm, log_cpm};
use crate::data::CountMatrix;

/// Counts together with their library sizes and normalization factors.
///
/// Immutable: filtering or re-normalizing produces a new value from a new
/// `CountMatrix`.
#[derive(Debug, Clone)]
pub struct NormalizedMatrix {
    counts: CountMatrix,
    lib_sizes: Vec<f64>,
    norm_factors: Vec<f64>,
    reference_sample: Option<usize>,
}

impl NormalizedMatrix {
    pub(crate) fn new(
        counts: CountMatrix,
        lib_sizes: Vec<f64>,
        norm_factors: Vec<f64>,
        reference_sample: Option<usize>,
    ) -> Self {
        Self {
            counts,
            lib_sizes,
            norm_factors,
            reference_sample,
        }
    }

    /// Underlying raw counts
    pub fn count_matrix(&self) -> &CountMatrix {
        &self.counts
    }

    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.counts()
    }

    pub fn gene_ids(&self) -> &[String] {
        self.counts.gene_ids()
    }

    pub fn sample_ids(&self) -> &[String] {
        self.counts.sample_ids()
    }

    pub fn n_genes(&self) -> usize {
        self.counts.n_genes()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.n_samples()
    }

    pub fn lib_sizes(&self) -> &[f64] {
        &self.lib_sizes
    }

    pub fn norm_factors(&self) -> &[f64] {
        &self.norm_factors
    }

    /// Index of the TMM reference sample, if one was used
    pub fn reference_sample(&self) -> Option<usize> {
        self.reference_sample
    }

    /// Library size times normalization factor
    pub fn effective_lib_sizes(&self) -> Vec<f64> {
        self.lib_sizes
            .iter()
            .zip(self.norm_factors.iter())
            .map(|(l, f)| l * f)
            .collect()
    }

    /// Normalized counts per million
    pub fn cpm(&self) -> Array2<f64> {
        cpm(self.counts.counts(), &self.effective_lib_sizes())
    }

    /// Normalized log2 counts per million
    pub fn log_cpm(&self, prior_count: f64) -> Array2<f64> {
        log_cpm(self.counts.counts(), &self.effective_lib_sizes(), prior_count)
    }

    /// Undo the normalization: CPM scaled back by the effective library sizes
    pub fn recovered_counts(&self) -> Array2<f64> {
        let mut values = self.cpm();
        for (j, eff) in self.effective_lib_sizes().into_iter().enumerate() {
            values.column_mut(j).mapv_inplace(|v| v * eff / 1e6);
        }
        values
    }
}
