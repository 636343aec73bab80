//! Library-size scaling factors: trimmed mean of M-values (TMM)
//!
//! Robinson & Oshlack (2010). Each sample is compared against a reference
//! sample; per-gene log-ratios (M) and mean log-expression (A) are trimmed
//! at both tails and the remaining M values are averaged with inverse
//! asymptotic-variance weights. Factors are centred to geometric mean 1.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use super::NormalizedMatrix;
use crate::data::CountMatrix;
use crate::error::{LimmaError, Result};
use crate::stats::{average_ranks, geometric_mean, quantile};

/// Method for normalization factor estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormMethod {
    /// Trimmed mean of M-values
    Tmm,
    /// Upper-quartile scaling
    UpperQuartile,
    /// All factors equal to one
    None,
}

/// Configurable parameters for normalization factors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TmmParams {
    pub method: NormMethod,
    /// Fraction trimmed from each tail of the log-ratios
    pub logratio_trim: f64,
    /// Fraction trimmed from each tail of the mean log-expression
    pub sum_trim: f64,
    /// Weight log-ratios by inverse asymptotic variance
    pub do_weighting: bool,
    /// Genes with mean log-expression at or below this are ignored
    pub a_cutoff: f64,
    /// Quantile used for upper-quartile scaling and reference selection
    pub upper_quantile: f64,
    /// Fixed reference sample; chosen from the data when `None`
    pub reference_sample: Option<usize>,
}

impl Default for TmmParams {
    fn default() -> Self {
        Self {
            method: NormMethod::Tmm,
            logratio_trim: 0.3,
            sum_trim: 0.05,
            do_weighting: true,
            a_cutoff: -1e10,
            upper_quantile: 0.75,
            reference_sample: None,
        }
    }
}

/// Estimate normalization factors and wrap the counts as a [`NormalizedMatrix`]
pub fn calc_norm_factors(counts: &CountMatrix, params: &TmmParams) -> Result<NormalizedMatrix> {
    let n_samples = counts.n_samples();
    if counts.n_genes() == 0 || n_samples == 0 {
        return Err(LimmaError::EmptyData {
            reason: "Count matrix is empty".to_string(),
        });
    }
    if !(0.0..0.5).contains(&params.logratio_trim) || !(0.0..0.5).contains(&params.sum_trim) {
        return Err(LimmaError::InvalidInput {
            reason: "trim fractions must lie in [0, 0.5)".to_string(),
        });
    }

    let lib_sizes = counts.library_sizes();

    let (raw_factors, reference) = match params.method {
        NormMethod::None => (vec![1.0; n_samples], None),
        NormMethod::UpperQuartile => {
            let f = upper_quantile_factors(counts, &lib_sizes, params.upper_quantile);
            if f.iter().any(|&x| !(x > 0.0)) {
                return Err(LimmaError::NumericalInstability {
                    operation: "upper-quartile normalization".to_string(),
                    details: "a sample has an upper quartile of zero".to_string(),
                });
            }
            (f, None)
        }
        NormMethod::Tmm => {
            let reference = match params.reference_sample {
                Some(r) if r >= n_samples => {
                    return Err(LimmaError::InvalidInput {
                        reason: format!(
                            "reference sample {} out of bounds ({} samples)",
                            r, n_samples
                        ),
                    });
                }
                Some(r) => r,
                None => select_reference_sample(counts, &lib_sizes, params.upper_quantile),
            };
            log::debug!("TMM reference sample: {}", counts.sample_ids()[reference]);

            let factors = (0..n_samples)
                .map(|j| {
                    tmm_factor(
                        counts.sample_counts(j),
                        counts.sample_counts(reference),
                        lib_sizes[j],
                        lib_sizes[reference],
                        params,
                    )
                })
                .collect();
            (factors, Some(reference))
        }
    };

    let norm_factors = center_factors(&raw_factors);
    if norm_factors.iter().any(|&x| !(x > 0.0) || !x.is_finite()) {
        return Err(LimmaError::NumericalInstability {
            operation: "normalization factors".to_string(),
            details: format!("non-positive factor in {:?}", norm_factors),
        });
    }

    Ok(NormalizedMatrix::new(
        counts.clone(),
        lib_sizes,
        norm_factors,
        reference,
    ))
}

/// Per-sample quantile of library-scaled counts
fn upper_quantile_factors(counts: &CountMatrix, lib_sizes: &[f64], p: f64) -> Vec<f64> {
    (0..counts.n_samples())
        .map(|j| {
            let scaled: Vec<f64> = counts
                .sample_counts(j)
                .iter()
                .map(|&c| c / lib_sizes[j])
                .collect();
            quantile(&scaled, p)
        })
        .collect()
}

/// Sample whose upper quartile is closest to the mean upper quartile.
/// Ties resolve to the first sample so the choice is reproducible.
fn select_reference_sample(counts: &CountMatrix, lib_sizes: &[f64], p: f64) -> usize {
    let f75 = upper_quantile_factors(counts, lib_sizes, p);

    let med = {
        let mut sorted = f75.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        crate::stats::quantile_type7(&sorted, 0.5)
    };

    if med < 1e-20 {
        // mostly-zero data: fall back to the sample with the largest sqrt-sum
        let sqrt_sums: Vec<f64> = (0..counts.n_samples())
            .map(|j| counts.sample_counts(j).iter().map(|c| c.sqrt()).sum())
            .collect();
        return argmax_first(&sqrt_sums);
    }

    let mean = f75.iter().sum::<f64>() / f75.len() as f64;
    let deltas: Vec<f64> = f75.iter().map(|f| -(f - mean).abs()).collect();
    argmax_first(&deltas)
}

fn argmax_first(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// TMM factor of `obs` relative to `reference`
fn tmm_factor(
    obs: ArrayView1<f64>,
    reference: ArrayView1<f64>,
    lib_obs: f64,
    lib_ref: f64,
    params: &TmmParams,
) -> f64 {
    let mut log_ratios = Vec::with_capacity(obs.len());
    let mut abs_expr = Vec::with_capacity(obs.len());
    let mut variances = Vec::with_capacity(obs.len());

    for (&o, &r) in obs.iter().zip(reference.iter()) {
        let po = o / lib_obs;
        let pr = r / lib_ref;
        let m = (po / pr).log2();
        let a = (po.log2() + pr.log2()) / 2.0;
        if !m.is_finite() || !a.is_finite() || a <= params.a_cutoff {
            continue;
        }
        log_ratios.push(m);
        abs_expr.push(a);
        variances.push((lib_obs - o) / lib_obs / o + (lib_ref - r) / lib_ref / r);
    }

    if log_ratios.is_empty() {
        return 1.0;
    }
    if log_ratios.iter().all(|m| m.abs() < 1e-6) {
        return 1.0;
    }

    let n = log_ratios.len() as f64;
    let lo_l = (n * params.logratio_trim).floor() + 1.0;
    let hi_l = n + 1.0 - lo_l;
    let lo_s = (n * params.sum_trim).floor() + 1.0;
    let hi_s = n + 1.0 - lo_s;

    let rank_m = average_ranks(&log_ratios);
    let rank_a = average_ranks(&abs_expr);

    let mut num = 0.0;
    let mut den = 0.0;
    let mut kept = 0usize;
    for k in 0..log_ratios.len() {
        let keep = rank_m[k] >= lo_l && rank_m[k] <= hi_l && rank_a[k] >= lo_s && rank_a[k] <= hi_s;
        if !keep {
            continue;
        }
        if params.do_weighting {
            num += log_ratios[k] / variances[k];
            den += 1.0 / variances[k];
        } else {
            num += log_ratios[k];
            den += 1.0;
        }
        kept += 1;
    }

    let f = if kept == 0 || !(den > 0.0) { 0.0 } else { num / den };
    if f.is_finite() {
        f.exp2()
    } else {
        1.0
    }
}

/// Scale factors to geometric mean 1
fn center_factors(factors: &[f64]) -> Vec<f64> {
    let center = geometric_mean(factors);
    factors.iter().map(|f| f / center).collect()
}
