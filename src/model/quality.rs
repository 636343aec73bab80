//! Sample quality weights
//!
//! Down-weights samples whose residuals are consistently larger than the
//! model predicts across genes. Each round refits the model with the current
//! weights, estimates a per-sample variance factor from leverage-adjusted
//! squared standardized residuals, and divides it out.

use serde::{Deserialize, Serialize};

use super::design::DesignMatrix;
use super::fitting::{lm_fit, ExpressionValues};
use crate::error::{LimmaError, Result};
use crate::stats::geometric_mean;

/// Leverages at or above this are ignored
const MAX_LEVERAGE: f64 = 1.0 - 1e-8;

/// Configurable parameters for sample quality weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeightParams {
    pub max_iter: usize,
    /// Stop when no weight changes by more than this
    pub tol: f64,
}

impl Default for QualityWeightParams {
    fn default() -> Self {
        Self {
            max_iter: 50,
            tol: 1e-5,
        }
    }
}

/// Estimate one weight per sample, normalized to geometric mean 1
pub fn sample_quality_weights(
    expr: &ExpressionValues,
    design: &DesignMatrix,
    params: &QualityWeightParams,
) -> Result<Vec<f64>> {
    let n_samples = expr.n_samples();
    let mut weights = vec![1.0; n_samples];

    for iteration in 1..=params.max_iter {
        let fit = lm_fit(&expr.with_sample_weights(&weights)?, design)?;

        let mut variance_factors = vec![0.0; n_samples];
        for (j, factor) in variance_factors.iter_mut().enumerate() {
            let mut sum = 0.0;
            let mut n = 0usize;
            for i in 0..fit.n_genes() {
                let h = fit.leverages[[i, j]];
                if fit.sigma[i] <= 0.0 || h >= MAX_LEVERAGE {
                    continue;
                }
                let z = fit.std_residuals[[i, j]];
                sum += z * z / (1.0 - h);
                n += 1;
            }
            if n == 0 {
                return Err(LimmaError::NumericalInstability {
                    operation: "sample quality weights".to_string(),
                    details: format!("no informative residuals for sample {}", expr.sample_ids()[j]),
                });
            }
            *factor = (sum / n as f64).max(1e-8);
        }

        let updated: Vec<f64> = weights
            .iter()
            .zip(variance_factors.iter())
            .map(|(w, v)| w / v)
            .collect();
        let center = geometric_mean(&updated);
        let updated: Vec<f64> = updated.iter().map(|w| w / center).collect();

        let change = weights
            .iter()
            .zip(updated.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f64, f64::max);
        weights = updated;

        log::debug!("quality weights iteration {}: max change {:.3e}", iteration, change);
        if change < params.tol {
            log::info!("Sample quality weights converged after {} iterations", iteration);
            return Ok(weights);
        }
    }

    log::warn!(
        "Sample quality weights did not converge in {} iterations",
        params.max_iter
    );
    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_noisy_sample_downweighted() {
        let n_genes = 200;
        let n_samples = 8;
        let noisy = 5;
        let values = Array2::from_shape_fn((n_genes, n_samples), |(i, j)| {
            let base = 4.0 + (i % 17) as f64 * 0.3;
            let noise = ((((i * 31 + j * 17) % 23) as f64) - 11.0) / 11.0 * 0.2;
            base + if j == noisy { 6.0 * noise } else { noise }
        });
        let expr = ExpressionValues::new(
            values,
            None,
            (0..n_genes).map(|i| format!("g{}", i)).collect(),
            (0..n_samples).map(|j| format!("s{}", j)).collect(),
        )
        .unwrap();
        let design = DesignMatrix::new(
            Array2::from_shape_fn((n_samples, 2), |(i, j)| if j == 0 || i >= 4 { 1.0 } else { 0.0 }),
            vec!["Intercept".into(), "group".into()],
            1,
        )
        .unwrap();

        let weights = sample_quality_weights(&expr, &design, &QualityWeightParams::default()).unwrap();

        assert!((geometric_mean(&weights) - 1.0).abs() < 1e-10);
        for (j, &w) in weights.iter().enumerate() {
            assert!(w > 0.0);
            if j != noisy {
                assert!(weights[noisy] < w, "noisy weight {} >= weight {} of sample {}", weights[noisy], w, j);
            }
        }
    }
}
