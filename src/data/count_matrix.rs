//! Count matrix representation for RNA-seq data

use std::collections::HashSet;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{LimmaError, Result};

/// Return the first identifier that occurs more than once
fn first_duplicate(ids: &[String]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().find(|id| !seen.insert(id.as_str())).map(|s| s.as_str())
}

/// A count matrix of RNA-seq read counts.
/// Rows are genes, columns are samples.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    /// Raw count data (genes x samples)
    counts: Array2<f64>,
    /// Gene identifiers
    gene_ids: Vec<String>,
    /// Sample identifiers
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a new count matrix from raw data.
    ///
    /// Counts must be non-negative integers, identifiers unique, and every
    /// sample must have a positive library size.
    pub fn new(
        counts: Array2<f64>,
        gene_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        let (n_genes, n_samples) = counts.dim();

        if gene_ids.len() != n_genes {
            return Err(LimmaError::DimensionMismatch {
                expected: format!("{} gene IDs", n_genes),
                got: format!("{} gene IDs", gene_ids.len()),
            });
        }

        if sample_ids.len() != n_samples {
            return Err(LimmaError::DimensionMismatch {
                expected: format!("{} sample IDs", n_samples),
                got: format!("{} sample IDs", sample_ids.len()),
            });
        }

        if let Some(dup) = first_duplicate(&gene_ids) {
            return Err(LimmaError::InputShape {
                reason: format!("duplicate gene identifier '{}'", dup),
            });
        }

        if let Some(dup) = first_duplicate(&sample_ids) {
            return Err(LimmaError::InputShape {
                reason: format!("duplicate sample identifier '{}'", dup),
            });
        }

        if counts.iter().any(|&x| x < 0.0 || !x.is_finite()) {
            return Err(LimmaError::InvalidCountMatrix {
                reason: "Counts must be non-negative finite values".to_string(),
            });
        }

        if counts.iter().any(|&x| x != x.round()) {
            return Err(LimmaError::InvalidCountMatrix {
                reason: "Counts must be integers".to_string(),
            });
        }

        for (j, col) in counts.axis_iter(Axis(1)).enumerate() {
            if col.sum() <= 0.0 {
                return Err(LimmaError::InvalidCountMatrix {
                    reason: format!("sample '{}' has a library size of 0", sample_ids[j]),
                });
            }
        }

        Ok(Self {
            counts,
            gene_ids,
            sample_ids,
        })
    }

    /// Get the number of genes
    pub fn n_genes(&self) -> usize {
        self.counts.nrows()
    }

    /// Get the number of samples
    pub fn n_samples(&self) -> usize {
        self.counts.ncols()
    }

    /// Get the raw counts as a view
    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.view()
    }

    /// Get gene IDs
    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    /// Get sample IDs
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Get counts for a specific sample
    pub fn sample_counts(&self, sample_idx: usize) -> ArrayView1<'_, f64> {
        self.counts.column(sample_idx)
    }

    /// Get gene index by ID
    pub fn gene_index(&self, gene_id: &str) -> Option<usize> {
        self.gene_ids.iter().position(|id| id == gene_id)
    }

    /// Get sample index by ID
    pub fn sample_index(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|id| id == sample_id)
    }

    /// Sum of counts per sample (library size)
    pub fn library_sizes(&self) -> Vec<f64> {
        self.counts
            .axis_iter(Axis(1))
            .map(|col| col.sum())
            .collect()
    }

    /// Total counts per gene across samples
    pub fn gene_totals(&self) -> Vec<f64> {
        self.counts
            .axis_iter(Axis(0))
            .map(|row| row.sum())
            .collect()
    }

    /// Keep the genes flagged `true` in `keep`.
    ///
    /// An all-false mask is reported as `EmptyResultAfterFiltering` so the
    /// caller can surface the degenerate analysis.
    pub fn subset_by_mask(&self, keep: &[bool]) -> Result<Self> {
        if keep.len() != self.n_genes() {
            return Err(LimmaError::DimensionMismatch {
                expected: format!("{} mask entries", self.n_genes()),
                got: format!("{} mask entries", keep.len()),
            });
        }

        let indices: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter(|(_, &k)| k)
            .map(|(i, _)| i)
            .collect();

        if indices.is_empty() {
            return Err(LimmaError::EmptyResultAfterFiltering {
                n_genes: self.n_genes(),
            });
        }

        self.subset_genes(&indices)
    }

    /// Subset to specific genes
    pub fn subset_genes(&self, gene_indices: &[usize]) -> Result<Self> {
        let new_counts = self.counts.select(Axis(0), gene_indices);
        let new_gene_ids: Vec<String> = gene_indices
            .iter()
            .map(|&i| self.gene_ids[i].clone())
            .collect();

        Self::new(new_counts, new_gene_ids, self.sample_ids.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn test_count_matrix_creation() {
        let counts = array![[10.0, 20.0, 30.0], [5.0, 15.0, 25.0]];
        let matrix = CountMatrix::new(counts, ids("gene", 2), ids("s", 3)).unwrap();
        assert_eq!(matrix.n_genes(), 2);
        assert_eq!(matrix.n_samples(), 3);
        assert_eq!(matrix.sample_index("s2"), Some(1));
    }

    #[test]
    fn test_negative_counts_rejected() {
        let counts = array![[10.0, -5.0], [5.0, 15.0]];
        assert!(CountMatrix::new(counts, ids("gene", 2), ids("s", 2)).is_err());
    }

    #[test]
    fn test_fractional_counts_rejected() {
        let counts = array![[10.5, 5.0], [5.0, 15.0]];
        assert!(CountMatrix::new(counts, ids("gene", 2), ids("s", 2)).is_err());
    }

    #[test]
    fn test_duplicate_identifiers_rejected() {
        let counts = array![[10.0, 5.0], [5.0, 15.0]];
        let genes = vec!["g".to_string(), "g".to_string()];
        let err = CountMatrix::new(counts, genes, ids("s", 2)).unwrap_err();
        assert!(matches!(err, LimmaError::InputShape { .. }));
    }

    #[test]
    fn test_zero_library_rejected() {
        let counts = array![[10.0, 0.0], [5.0, 0.0]];
        assert!(CountMatrix::new(counts, ids("gene", 2), ids("s", 2)).is_err());
    }

    #[test]
    fn test_library_sizes() {
        let counts = array![[10.0, 20.0], [5.0, 15.0]];
        let matrix = CountMatrix::new(counts, ids("gene", 2), ids("s", 2)).unwrap();
        assert_eq!(matrix.library_sizes(), vec![15.0, 35.0]);
        assert_eq!(matrix.gene_totals(), vec![30.0, 20.0]);
    }

    #[test]
    fn test_empty_mask_signals_empty_result() {
        let counts = array![[10.0, 20.0], [5.0, 15.0]];
        let matrix = CountMatrix::new(counts, ids("gene", 2), ids("s", 2)).unwrap();

        let kept = matrix.subset_by_mask(&[false, true]).unwrap();
        assert_eq!(kept.gene_ids(), &["gene2".to_string()]);

        let err = matrix.subset_by_mask(&[false, false]).unwrap_err();
        assert!(matches!(err, LimmaError::EmptyResultAfterFiltering { n_genes: 2 }));
    }
}
