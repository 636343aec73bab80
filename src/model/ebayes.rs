//! Empirical Bayes moderation of the per-gene variances
//!
//! Smyth (2004). Residual variances are modelled as scaled chi-square draws
//! around a common prior; the prior scale s0² and degrees of freedom d0 are
//! estimated by matching moments of log s², and each gene's variance is
//! shrunk towards s0². With a positive fold-change threshold the test is
//! TREAT (McCarthy & Smyth 2009) against H0: |beta| <= tau.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use statrs::function::gamma::digamma;

use super::fitting::LinearFit;
use crate::error::{LimmaError, Result};
use crate::io::{FitResult, SortBy};
use crate::stats::{median, trigamma, trigamma_inverse};
use crate::testing::{benjamini_hochberg, pvalue_t, upper_tail_t};

/// Configurable parameters for empirical Bayes moderation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EbayesParams {
    /// Minimum absolute log2 fold change; `> 0` switches to TREAT
    pub lfc_threshold: f64,
}

impl Default for EbayesParams {
    fn default() -> Self {
        Self { lfc_threshold: 0.0 }
    }
}

/// Linear fit with moderated statistics for every coefficient
#[derive(Debug, Clone)]
pub struct ModeratedFit {
    pub fit: LinearFit,
    /// Prior variance s0²
    pub s2_prior: f64,
    /// Prior degrees of freedom d0 (may be infinite)
    pub df_prior: f64,
    /// Posterior variance per gene
    pub s2_post: Vec<f64>,
    /// Total degrees of freedom per gene
    pub df_total: Vec<f64>,
    /// Moderated t-statistics (genes x coefficients)
    pub t: Array2<f64>,
    /// Two-sided p-values (genes x coefficients)
    pub p_values: Array2<f64>,
    pub lfc_threshold: f64,
}

/// Prior (scale, df) from the sample variances and their degrees of freedom
pub(crate) fn fit_f_dist(s2: &[f64], df: &[f64]) -> (f64, f64) {
    let ok: Vec<(f64, f64)> = s2
        .iter()
        .zip(df.iter())
        .filter(|(&x, &d)| x.is_finite() && x > -1e-15 && d.is_finite() && d > 1e-15)
        .map(|(&x, &d)| (x.max(0.0), d))
        .collect();
    let n = ok.len();
    if n == 0 {
        return (f64::NAN, f64::NAN);
    }
    if n == 1 {
        return (ok[0].0, 0.0);
    }

    let values: Vec<f64> = ok.iter().map(|(x, _)| *x).collect();
    let mut m = median(&values);
    if m == 0.0 {
        log::warn!("More than half of the residual variances are exactly zero");
        m = 1.0;
    }

    let e: Vec<f64> = ok
        .iter()
        .map(|&(x, d)| x.max(1e-5 * m).ln() - digamma(d / 2.0) + (d / 2.0).ln())
        .collect();
    let emean = e.iter().sum::<f64>() / n as f64;
    let evar = e.iter().map(|v| (v - emean).powi(2)).sum::<f64>() / (n - 1) as f64
        - ok.iter().map(|&(_, d)| trigamma(d / 2.0)).sum::<f64>() / n as f64;

    if evar > 0.0 {
        let df2 = 2.0 * trigamma_inverse(evar);
        let s20 = (emean + digamma(df2 / 2.0) - (df2 / 2.0).ln()).exp();
        (s20, df2)
    } else {
        (emean.exp(), f64::INFINITY)
    }
}

/// Moderate the variances of a linear fit and compute t-statistics and p-values
pub fn ebayes(fit: LinearFit, params: &EbayesParams) -> Result<ModeratedFit> {
    if params.lfc_threshold < 0.0 {
        return Err(LimmaError::InvalidInput {
            reason: format!("lfc_threshold must be non-negative, got {}", params.lfc_threshold),
        });
    }

    let s2: Vec<f64> = fit.sigma.iter().map(|s| s * s).collect();
    let (s2_prior, df_prior) = fit_f_dist(&s2, &fit.df_residual);
    if s2_prior.is_nan() {
        return Err(LimmaError::NumericalInstability {
            operation: "empirical Bayes".to_string(),
            details: "no gene has a finite residual variance".to_string(),
        });
    }
    log::info!("eBayes prior: s0^2 = {:.4}, d0 = {:.3}", s2_prior, df_prior);

    let df_pooled: f64 = fit.df_residual.iter().sum();
    let (s2_post, df_total): (Vec<f64>, Vec<f64>) = s2
        .iter()
        .zip(fit.df_residual.iter())
        .map(|(&s2, &d)| {
            if df_prior.is_infinite() {
                (s2_prior, df_pooled)
            } else {
                let post = (df_prior * s2_prior + d * s2) / (df_prior + d);
                (post, (d + df_prior).min(df_pooled))
            }
        })
        .unzip();

    let (n_genes, n_coefs) = fit.coefficients.dim();
    let mut t = Array2::zeros((n_genes, n_coefs));
    let mut p_values = Array2::zeros((n_genes, n_coefs));
    let tau = params.lfc_threshold;

    for i in 0..n_genes {
        let s_post = s2_post[i].sqrt();
        for k in 0..n_coefs {
            let coef = fit.coefficients[[i, k]];
            let se = fit.stdev_unscaled[[i, k]] * s_post;
            if tau > 0.0 {
                let t_right = (coef.abs() - tau) / se;
                let t_left = (coef.abs() + tau) / se;
                p_values[[i, k]] =
                    (upper_tail_t(t_right, df_total[i]) + upper_tail_t(t_left, df_total[i])).min(1.0);
                t[[i, k]] = coef.signum() * t_right.max(0.0);
            } else {
                t[[i, k]] = coef / se;
                p_values[[i, k]] = pvalue_t(t[[i, k]], df_total[i]);
            }
        }
    }

    Ok(ModeratedFit {
        fit,
        s2_prior,
        df_prior,
        s2_post,
        df_total,
        t,
        p_values,
        lfc_threshold: tau,
    })
}

/// Result table for the coefficient of interest, BH-adjusted and sorted
pub fn top_table(moderated: &ModeratedFit, sort_by: SortBy) -> FitResult {
    let fit = &moderated.fit;
    let k = fit.coef;
    let p_values: Vec<f64> = moderated.p_values.column(k).to_vec();
    let adj_p_values = benjamini_hochberg(&p_values);

    FitResult {
        coef_name: fit.coef_names[k].clone(),
        lfc_threshold: moderated.lfc_threshold,
        gene_ids: fit.gene_ids.clone(),
        log_fold_changes: fit.coefficients.column(k).to_vec(),
        ave_expr: fit.amean.clone(),
        t: moderated.t.column(k).to_vec(),
        p_values,
        adj_p_values,
    }
    .sorted(sort_by)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{lm_fit, DesignMatrix, ExpressionValues};

    /// Deterministic noise in [-1, 1]
    fn noise(i: usize, j: usize) -> f64 {
        ((((i * 37 + j * 11 + 5) % 19) as f64) - 9.0) / 9.0
    }

    fn two_group(n_genes: usize, de_gene: usize) -> (ExpressionValues, DesignMatrix) {
        let n = 10;
        let values = Array2::from_shape_fn((n_genes, n), |(i, j)| {
            let treated = j >= 5;
            let mean = if i == de_gene && treated {
                5.0
            } else if i == de_gene {
                2.0
            } else {
                3.0 + (i % 5) as f64
            };
            mean + 0.1 * noise(i, j)
        });
        let expr = ExpressionValues::new(
            values,
            None,
            (0..n_genes).map(|i| format!("g{}", i)).collect(),
            (0..n).map(|j| format!("s{}", j)).collect(),
        )
        .unwrap();
        let design = DesignMatrix::new(
            Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 || i >= 5 { 1.0 } else { 0.0 }),
            vec!["Intercept".into(), "group_treated_vs_control".into()],
            1,
        )
        .unwrap();
        (expr, design)
    }

    #[test]
    fn test_two_group_effect_detected() {
        let (expr, design) = two_group(40, 7);
        let fit = lm_fit(&expr, &design).unwrap();
        let moderated = ebayes(fit, &EbayesParams::default()).unwrap();
        let table = top_table(&moderated, SortBy::PValue);

        assert_eq!(table.gene_ids[0], "g7");
        assert!((table.log_fold_changes[0] - 3.0).abs() < 0.15);
        assert!(table.adj_p_values[0] < 0.05);
        assert!(moderated.s2_prior > 0.0);
    }

    #[test]
    fn test_posterior_between_prior_and_sample() {
        let (expr, design) = two_group(40, 7);
        let fit = lm_fit(&expr, &design).unwrap();
        let moderated = ebayes(fit.clone(), &EbayesParams::default()).unwrap();
        for (i, &post) in moderated.s2_post.iter().enumerate() {
            let s2 = fit.sigma[i] * fit.sigma[i];
            let lo = s2.min(moderated.s2_prior) - 1e-12;
            let hi = s2.max(moderated.s2_prior) + 1e-12;
            assert!(post >= lo && post <= hi);
            assert!(moderated.df_total[i] <= 40.0 * 8.0 + 1e-9);
        }
    }

    #[test]
    fn test_equal_variances_give_infinite_prior_df() {
        let s2 = vec![0.5; 20];
        let df = vec![4.0; 20];
        let (s20, d0) = fit_f_dist(&s2, &df);
        assert!(d0.is_infinite());
        // exp(E[log s²]) adjusted for the chi-square log bias
        let expected = 0.5 * (2.0f64.ln() - digamma(2.0)).exp();
        assert!((s20 - expected).abs() < 1e-10);
    }

    #[test]
    fn test_prior_recovers_scaled_chisq() {
        // variances spread around 1 with more dispersion than chi-square(4)/4 alone
        let s2: Vec<f64> = (0..500).map(|i| 0.1 + 3.0 * ((i * 7919) % 500) as f64 / 500.0).collect();
        let df = vec![4.0; 500];
        let (s20, d0) = fit_f_dist(&s2, &df);
        assert!(s20 > 0.0 && s20.is_finite());
        assert!(d0 > 0.0);
    }

    #[test]
    fn test_treat_is_more_conservative() {
        let (expr, design) = two_group(40, 7);
        let fit = lm_fit(&expr, &design).unwrap();
        let plain = ebayes(fit.clone(), &EbayesParams::default()).unwrap();
        let treat = ebayes(fit, &EbayesParams { lfc_threshold: 1.0 }).unwrap();

        for i in 0..40 {
            assert!(treat.p_values[[i, 1]] >= plain.p_values[[i, 1]] - 1e-12);
            assert!(treat.t[[i, 1]].abs() <= plain.t[[i, 1]].abs() + 1e-12);
        }
        // an effect of 3 still clears a threshold of 1
        assert!(treat.p_values[[7, 1]] < 1e-4);
    }
}
