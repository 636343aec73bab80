//! Competitive gene-set test on ranks with inter-gene correlation
//!
//! Wu & Smyth (2012). The moderated t-statistics of a set are compared with
//! those of all other genes by a Wilcoxon rank-sum test whose variance is
//! inflated for the average correlation between genes of the set.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::gene_sets::{GeneSetCollection, Universe};
use super::EnrichmentReport;
use crate::data::AnnotationProvider;
use crate::error::{LimmaError, Result};
use crate::io::{CameraResult, Direction};
use crate::model::ModeratedFit;
use crate::stats::{average_ranks, tie_group_sizes};
use crate::testing::{benjamini_hochberg, upper_tail_t};

/// Configurable parameters for the competitive rank test.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraParams {
    /// Fixed inter-gene correlation; estimated per set from the residuals when `None`
    pub inter_gene_correlation: Option<f64>,
    /// Sets with fewer universe members are skipped
    pub min_set_size: usize,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            inter_gene_correlation: Some(0.01),
            min_set_size: 2,
        }
    }
}

/// One-sided p-values of the correlation-adjusted rank-sum test
#[derive(Debug, Clone, Copy)]
pub(crate) struct RankSumTest {
    /// Set statistics tend to be smaller than the rest
    pub less: f64,
    /// Set statistics tend to be larger than the rest
    pub greater: f64,
}

/// Wilcoxon rank-sum test of `index` against the remaining statistics with
/// variance adjusted for correlation among the `index` genes
pub(crate) fn rank_sum_with_correlation(
    index: &[usize],
    ranks: &[f64],
    tie_sizes: &[usize],
    correlation: f64,
    df: f64,
) -> RankSumTest {
    let n = ranks.len() as f64;
    let n1 = index.len() as f64;
    let n2 = n - n1;

    let r1: f64 = index.iter().map(|&i| ranks[i]).sum();
    let u = n1 * n2 + n1 * (n1 + 1.0) / 2.0 - r1;
    let mu = n1 * n2 / 2.0;

    let mut sigma2 = if correlation == 0.0 || index.len() == 1 {
        n1 * n2 * (n + 1.0) / 12.0
    } else {
        (1.0f64.asin() * n1 * n2
            + 0.5f64.asin() * n1 * n2 * (n2 - 1.0)
            + (correlation / 2.0).asin() * n1 * (n1 - 1.0) * n2 * (n2 - 1.0)
            + ((correlation + 1.0) / 2.0).asin() * n1 * (n1 - 1.0) * n2)
            / (2.0 * PI)
    };

    let ties: f64 = tie_sizes
        .iter()
        .map(|&t| {
            let t = t as f64;
            t * (t + 1.0) * (t - 1.0)
        })
        .sum();
    if ties > 0.0 {
        sigma2 *= 1.0 - ties / (n * (n + 1.0) * (n - 1.0));
    }

    let sigma = sigma2.sqrt();
    let z_lower = (u + 0.5 - mu) / sigma;
    let z_upper = (u - 0.5 - mu) / sigma;

    RankSumTest {
        less: upper_tail_t(z_upper, df),
        greater: upper_tail_t(-z_lower, df),
    }
}

/// Average correlation of a set from standardized residuals.
///
/// With `m` genes and residual df `d`, the variance inflation factor is
/// `||sum of z||^2 / (d * m)`, and `rho = (vif - 1) / (m - 1)`.
fn estimate_correlation(fit: &ModeratedFit, rows: &[usize], df: f64) -> f64 {
    let m = rows.len();
    if m < 2 {
        return 0.0;
    }
    let z = &fit.fit.std_residuals;
    let n_samples = z.ncols();
    let mut total = 0.0;
    for j in 0..n_samples {
        let s: f64 = rows.iter().map(|&r| z[[r, j]]).sum();
        total += s * s;
    }
    let vif = total / (df * m as f64);
    let rho = (vif - 1.0) / (m as f64 - 1.0);
    // keep the inflated variance positive
    rho.max(-1.0 / (m as f64 - 1.0) + 1e-8).min(1.0)
}

/// Competitive rank test of every gene set against the moderated t of the
/// coefficient of interest.
pub fn camera_ranks(
    fit: &ModeratedFit,
    collection: &GeneSetCollection,
    provider: &dyn AnnotationProvider,
    params: &CameraParams,
) -> Result<EnrichmentReport<CameraResult>> {
    let gene_ids = &fit.fit.gene_ids;
    let (universe, unmapped) = Universe::build(gene_ids, provider);
    let mut warnings: Vec<_> = unmapped.into_iter().collect();
    if universe.len() < 2 {
        return Err(LimmaError::EmptyData {
            reason: "fewer than two tested genes map to an external identifier".to_string(),
        });
    }

    let coef = fit.fit.coef;
    let stats: Vec<f64> = universe.rows.iter().map(|&row| fit.t[[row, coef]]).collect();
    let ranks = average_ranks(&stats);
    let tie_sizes = tie_group_sizes(&stats);

    let df_residual = {
        let d = &fit.fit.df_residual;
        d.iter().sum::<f64>() / d.len() as f64
    };

    let (restricted, dropped) = universe.restrict(collection);
    warnings.extend(dropped);

    let mut out = Vec::with_capacity(restricted.len());
    for (name, members) in restricted {
        let m = members.len();
        if m < params.min_set_size {
            log::debug!("Skipping gene set '{}' of size {}", name, m);
            continue;
        }
        if m == universe.len() {
            log::warn!("Gene set '{}' covers the whole universe; nothing to compare against", name);
            continue;
        }

        let (correlation, df) = match params.inter_gene_correlation {
            Some(rho) => (rho, f64::INFINITY),
            None => {
                let rows: Vec<usize> = members.iter().map(|&pos| universe.rows[pos]).collect();
                let rho = estimate_correlation(fit, &rows, df_residual);
                (rho, df_residual.min(universe.len() as f64 - 2.0))
            }
        };

        let test = rank_sum_with_correlation(&members, &ranks, &tie_sizes, correlation, df);
        let direction = if test.greater < test.less {
            Direction::Up
        } else {
            Direction::Down
        };
        let p_value = (2.0 * test.less.min(test.greater)).min(1.0);

        out.push(CameraResult {
            gene_set: name,
            set_size: m,
            correlation,
            direction,
            p_value,
            q_value: f64::NAN,
        });
    }

    let raw: Vec<f64> = out.iter().map(|r| r.p_value).collect();
    for (r, q) in out.iter_mut().zip(benjamini_hochberg(&raw)) {
        r.q_value = q;
    }
    out.sort_by(|a, b| a.p_value.total_cmp(&b.p_value).then_with(|| a.gene_set.cmp(&b.gene_set)));

    log::info!("Competitive rank test: {} gene sets scored", out.len());
    Ok(EnrichmentReport {
        results: out,
        warnings,
    })
}
