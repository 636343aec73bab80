//! Precision weights from the mean-variance trend of log-CPM values
//!
//! Law et al. (2014). A per-gene unweighted fit gives residual standard
//! deviations; a lowess curve of sqrt(sigma) against average log-count is
//! then evaluated at each fitted observation, and the weight is the inverse
//! of the predicted variance.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::design::DesignMatrix;
use super::fitting::{lm_fit, ExpressionValues};
use crate::error::Result;
use crate::normalization::NormalizedMatrix;
use crate::stats::{interpolate, lowess};

/// Configurable parameters for voom.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoomParams {
    /// Lowess span
    pub span: f64,
    /// Lowess robustness iterations
    pub robust_iter: usize,
    /// Count added before taking logs
    pub prior_count: f64,
}

impl Default for VoomParams {
    fn default() -> Self {
        Self {
            span: 0.5,
            robust_iter: 3,
            prior_count: 0.5,
        }
    }
}

/// Mean-variance trend fitted by voom
#[derive(Debug, Clone)]
pub struct MeanVarianceTrend {
    /// Average log2 count per gene, sorted
    pub x: Vec<f64>,
    /// Smoothed sqrt residual standard deviation
    pub y: Vec<f64>,
}

impl MeanVarianceTrend {
    /// Predicted sqrt standard deviation at a log2 count
    pub fn predict(&self, log_count: f64) -> f64 {
        interpolate(&self.x, &self.y, log_count)
    }
}

/// Log-CPM values with voom precision weights
pub fn voom(
    normalized: &NormalizedMatrix,
    design: &DesignMatrix,
    params: &VoomParams,
) -> Result<(ExpressionValues, MeanVarianceTrend)> {
    let expr = ExpressionValues::from_log_cpm(normalized, params.prior_count)?;
    let fit = lm_fit(&expr, design)?;

    let lib_sizes = normalized.effective_lib_sizes();
    let n_samples = lib_sizes.len();
    let mean_log_lib = lib_sizes.iter().map(|l| (l + 1.0).log2()).sum::<f64>() / n_samples as f64;

    // genes with no reads carry no information about the trend
    let totals = normalized.count_matrix().gene_totals();
    let (sx, sy): (Vec<f64>, Vec<f64>) = (0..fit.n_genes())
        .filter(|&i| totals[i] > 0.0)
        .map(|i| (fit.amean[i] + mean_log_lib - 1e6f64.log2(), fit.sigma[i].sqrt()))
        .unzip();

    let range = sx.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
        - sx.iter().cloned().fold(f64::INFINITY, f64::min);
    let delta = if range.is_finite() { 0.01 * range } else { 0.0 };
    let (tx, ty) = lowess(&sx, &sy, params.span, params.robust_iter, delta);
    let trend = MeanVarianceTrend { x: tx, y: ty };

    let x = design.matrix();
    let mut weights = Array2::zeros(expr.values().dim());
    for i in 0..fit.n_genes() {
        for j in 0..n_samples {
            let fitted: f64 = (0..fit.n_coefs())
                .map(|k| fit.coefficients[[i, k]] * x[[j, k]])
                .sum();
            let log_count = (fitted.exp2() * 1e-6 * (lib_sizes[j] + 1.0)).log2();
            let predicted = trend.predict(log_count);
            weights[[i, j]] = 1.0 / predicted.powi(4);
        }
    }

    if weights.iter().any(|w: &f64| !w.is_finite() || *w <= 0.0) {
        // a flat zero trend gives infinite weights; fall back to equal weights
        log::warn!("voom trend reached zero; affected observations get unit weight");
        weights.mapv_inplace(|w| if w.is_finite() && w > 0.0 { w } else { 1.0 });
    }

    log::info!("voom: precision weights for {} genes x {} samples", fit.n_genes(), n_samples);
    let voomed = ExpressionValues::new(
        expr.values().clone(),
        Some(weights),
        expr.gene_ids().to_vec(),
        expr.sample_ids().to_vec(),
    )?;
    Ok((voomed, trend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CountMatrix;
    use crate::normalization::{calc_norm_factors, TmmParams};

    fn simulated() -> (NormalizedMatrix, DesignMatrix) {
        // deterministic Poisson-scaled noise around gene-specific means
        let n_genes = 60;
        let n_samples = 6;
        let counts = Array2::from_shape_fn((n_genes, n_samples), |(i, j)| {
            let mean = 5.0 * 1.12f64.powi(i as i32);
            let wobble = (((i * 7 + j * 13) % 11) as f64 - 5.0) / 5.0;
            (mean + 1.5 * mean.sqrt() * wobble).round().max(0.0)
        });
        let counts = CountMatrix::new(
            counts,
            (0..n_genes).map(|i| format!("g{}", i)).collect(),
            (0..n_samples).map(|j| format!("s{}", j)).collect(),
        )
        .unwrap();
        let normalized = calc_norm_factors(&counts, &TmmParams::default()).unwrap();
        let design = DesignMatrix::new(
            Array2::from_shape_fn((n_samples, 2), |(i, j)| if j == 0 || i >= 3 { 1.0 } else { 0.0 }),
            vec!["Intercept".into(), "group".into()],
            1,
        )
        .unwrap();
        (normalized, design)
    }

    #[test]
    fn test_weights_positive_and_shaped() {
        let (normalized, design) = simulated();
        let (voomed, trend) = voom(&normalized, &design, &VoomParams::default()).unwrap();
        let weights = voomed.weights().unwrap();

        assert_eq!(weights.dim(), (60, 6));
        assert!(weights.iter().all(|&w| w > 0.0 && w.is_finite()));
        assert!(trend.x.windows(2).all(|p| p[0] <= p[1]));
    }

    #[test]
    fn test_high_counts_weigh_more() {
        let (normalized, design) = simulated();
        let (voomed, _) = voom(&normalized, &design, &VoomParams::default()).unwrap();
        let weights = voomed.weights().unwrap();

        let low: f64 = weights.row(0).sum();
        let high: f64 = weights.row(59).sum();
        assert!(high > low, "high-count weight {} <= low-count weight {}", high, low);
    }
}
