//! Expression filtering on counts-per-million
//!
//! A gene is kept when its CPM reaches a cutoff in enough samples. The
//! cutoff scales `min_count` by the median library size, so the same
//! `min_count` means roughly the same read depth whatever the sequencing
//! depth; the required number of samples follows the smallest group.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::data::CountMatrix;
use crate::error::{LimmaError, Result};
use crate::normalization::cpm;
use crate::stats::median;

/// Tolerance used when comparing sample counts against fractional minimums
const TOL: f64 = 1e-14;

/// Configurable parameters for expression filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    /// Minimum count in a sample of median library size
    pub min_count: f64,
    /// Minimum total count across all samples
    pub min_total_count: f64,
    /// Group size above which the sample requirement is relaxed
    pub large_n: f64,
    /// Proportion of samples beyond `large_n` that must pass
    pub min_prop: f64,
    /// Explicit number of samples that must pass the CPM cutoff
    /// (defaults to the smallest group size)
    pub min_samples: Option<f64>,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            min_count: 10.0,
            min_total_count: 15.0,
            large_n: 10.0,
            min_prop: 0.7,
            min_samples: None,
        }
    }
}

/// Summary of a filtering run, useful for reporting
#[derive(Debug, Clone)]
pub struct FilterSummary {
    pub cpm_cutoff: f64,
    pub min_samples: f64,
    pub n_kept: usize,
    pub n_total: usize,
}

/// CPM cutoff equivalent to `min_count` reads in a library of median size
pub fn cpm_cutoff(lib_sizes: &[f64], min_count: f64) -> f64 {
    min_count / median(lib_sizes) * 1e6
}

/// Number of samples that must pass the CPM cutoff for the given groups
pub fn min_sample_size(groups: &[String], params: &FilterParams) -> f64 {
    if let Some(n) = params.min_samples {
        return n;
    }

    let mut sizes: HashMap<&str, usize> = HashMap::new();
    for g in groups {
        *sizes.entry(g.as_str()).or_insert(0) += 1;
    }
    let smallest = sizes.values().copied().min().unwrap_or(0) as f64;

    if smallest > params.large_n {
        params.large_n + (smallest - params.large_n) * params.min_prop
    } else {
        smallest
    }
}

/// Compute the keep-mask over genes.
///
/// `groups[j]` is the group label of sample `j`.
pub fn filter_by_expression(
    counts: &CountMatrix,
    groups: &[String],
    params: &FilterParams,
) -> Result<(Vec<bool>, FilterSummary)> {
    if groups.len() != counts.n_samples() {
        return Err(LimmaError::InputShape {
            reason: format!(
                "{} group labels for {} samples",
                groups.len(),
                counts.n_samples()
            ),
        });
    }

    let lib_sizes = counts.library_sizes();
    let cutoff = cpm_cutoff(&lib_sizes, params.min_count);
    let min_samples = min_sample_size(groups, params);
    let cpm_values = cpm(counts.counts(), &lib_sizes);
    let totals = counts.gene_totals();

    let keep: Vec<bool> = cpm_values
        .outer_iter()
        .zip(totals.iter())
        .map(|(row, &total)| {
            let passing = row.iter().filter(|&&v| v >= cutoff).count() as f64;
            passing >= min_samples - TOL && total >= params.min_total_count - TOL
        })
        .collect();

    let n_kept = keep.iter().filter(|&&k| k).count();
    log::info!(
        "Expression filter: CPM cutoff {:.3} in >= {} samples keeps {} of {} genes",
        cutoff,
        min_samples,
        n_kept,
        counts.n_genes()
    );

    let summary = FilterSummary {
        cpm_cutoff: cutoff,
        min_samples,
        n_kept,
        n_total: counts.n_genes(),
    };
    Ok((keep, summary))
}

/// Filter the matrix, signalling `EmptyResultAfterFiltering` when no gene is kept
pub fn apply_expression_filter(
    counts: &CountMatrix,
    groups: &[String],
    params: &FilterParams,
) -> Result<CountMatrix> {
    let (keep, _) = filter_by_expression(counts, groups, params)?;
    counts.subset_by_mask(&keep)
}
