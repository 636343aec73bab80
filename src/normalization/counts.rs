//! Counts-per-million transformations
//!
//! CPM divides each count by its sample's (effective) library size and
//! scales by one million; log-CPM adds a prior count first so zeros stay
//! finite.

use ndarray::{Array2, ArrayView2};

/// Counts per million for a genes x samples matrix
///
/// `lib_sizes` are the per-sample library sizes (raw or effective).
pub fn cpm(counts: ArrayView2<f64>, lib_sizes: &[f64]) -> Array2<f64> {
    let (n_genes, n_samples) = counts.dim();
    debug_assert_eq!(lib_sizes.len(), n_samples);

    let mut result = counts.to_owned();
    for j in 0..n_samples {
        let lib_size = lib_sizes[j];
        for i in 0..n_genes {
            result[[i, j]] = result[[i, j]] * 1e6 / lib_size;
        }
    }
    result
}

/// log2 counts per million with a prior count.
///
/// `log2((count + prior) / (lib_size + 2 * prior) * 1e6)`; with
/// `prior = 0.5` this is the voom transformation of `log2((y + 0.5) /
/// (N + 1) * 1e6)`.
pub fn log_cpm(counts: ArrayView2<f64>, lib_sizes: &[f64], prior_count: f64) -> Array2<f64> {
    let (n_genes, n_samples) = counts.dim();
    debug_assert_eq!(lib_sizes.len(), n_samples);

    let mut result = Array2::zeros((n_genes, n_samples));
    for j in 0..n_samples {
        let denom = lib_sizes[j] + 2.0 * prior_count;
        for i in 0..n_genes {
            result[[i, j]] = ((counts[[i, j]] + prior_count) / denom * 1e6).log2();
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_cpm_columns_sum_to_million() {
        let counts = array![[100.0, 200.0], [300.0, 400.0]];
        let result = cpm(counts.view(), &[400.0, 600.0]);
        assert!((result[[0, 0]] - 250_000.0).abs() < 1e-6);
        let col_sum: f64 = result.column(1).sum();
        assert!((col_sum - 1e6).abs() < 1e-6);
    }

    #[test]
    fn test_log_cpm_zero_is_finite() {
        let counts = array![[0.0, 10.0], [99.0, 89.0]];
        let result = log_cpm(counts.view(), &[99.0, 99.0], 0.5);
        assert!(result[[0, 0]].is_finite());
        let expected = (10.5f64 / 100.0 * 1e6).log2();
        assert!((result[[0, 1]] - expected).abs() < 1e-10);
    }
}
