//! Per-gene weighted least squares

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;

use super::design::DesignMatrix;
use crate::error::{LimmaError, Result};
use crate::normalization::NormalizedMatrix;

/// Log-expression values ready for linear modelling, with optional
/// per-observation precision weights (genes x samples).
#[derive(Debug, Clone)]
pub struct ExpressionValues {
    values: Array2<f64>,
    weights: Option<Array2<f64>>,
    gene_ids: Vec<String>,
    sample_ids: Vec<String>,
}

impl ExpressionValues {
    pub fn new(
        values: Array2<f64>,
        weights: Option<Array2<f64>>,
        gene_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        let (n_genes, n_samples) = values.dim();
        if gene_ids.len() != n_genes || sample_ids.len() != n_samples {
            return Err(LimmaError::DimensionMismatch {
                expected: format!("{} genes x {} samples", n_genes, n_samples),
                got: format!("{} gene ids, {} sample ids", gene_ids.len(), sample_ids.len()),
            });
        }
        if let Some(w) = &weights {
            if w.dim() != values.dim() {
                return Err(LimmaError::DimensionMismatch {
                    expected: format!("{:?} weights", values.dim()),
                    got: format!("{:?} weights", w.dim()),
                });
            }
            if w.iter().any(|&x| !(x > 0.0) || !x.is_finite()) {
                return Err(LimmaError::InvalidInput {
                    reason: "precision weights must be positive and finite".to_string(),
                });
            }
        }
        Ok(Self {
            values,
            weights,
            gene_ids,
            sample_ids,
        })
    }

    /// Unweighted log-CPM values of a normalized matrix
    pub fn from_log_cpm(normalized: &NormalizedMatrix, prior_count: f64) -> Result<Self> {
        Self::new(
            normalized.log_cpm(prior_count),
            None,
            normalized.gene_ids().to_vec(),
            normalized.sample_ids().to_vec(),
        )
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn weights(&self) -> Option<&Array2<f64>> {
        self.weights.as_ref()
    }

    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_genes(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.values.ncols()
    }

    /// Multiply every observation weight of sample `j` by `sample_weights[j]`
    pub fn with_sample_weights(&self, sample_weights: &[f64]) -> Result<Self> {
        if sample_weights.len() != self.n_samples() {
            return Err(LimmaError::DimensionMismatch {
                expected: format!("{} sample weights", self.n_samples()),
                got: format!("{} sample weights", sample_weights.len()),
            });
        }
        let mut weights = self
            .weights
            .clone()
            .unwrap_or_else(|| Array2::ones(self.values.dim()));
        for (j, &sw) in sample_weights.iter().enumerate() {
            weights.column_mut(j).mapv_inplace(|w| w * sw);
        }
        Self::new(
            self.values.clone(),
            Some(weights),
            self.gene_ids.clone(),
            self.sample_ids.clone(),
        )
    }
}

/// Result of fitting the linear model to every gene
#[derive(Debug, Clone)]
pub struct LinearFit {
    pub gene_ids: Vec<String>,
    pub coef_names: Vec<String>,
    /// Index of the coefficient of interest
    pub coef: usize,
    /// Estimated coefficients (genes x coefficients)
    pub coefficients: Array2<f64>,
    /// Standard errors divided by sigma (genes x coefficients)
    pub stdev_unscaled: Array2<f64>,
    /// Residual standard deviation per gene
    pub sigma: Vec<f64>,
    /// Residual degrees of freedom per gene
    pub df_residual: Vec<f64>,
    /// Average log-expression per gene
    pub amean: Vec<f64>,
    /// Weighted residuals divided by sigma (genes x samples)
    pub std_residuals: Array2<f64>,
    /// Leverages (diagonal of the weighted hat matrix), genes x samples
    pub leverages: Array2<f64>,
}

impl LinearFit {
    pub fn n_genes(&self) -> usize {
        self.gene_ids.len()
    }

    pub fn n_coefs(&self) -> usize {
        self.coef_names.len()
    }
}

/// Fit of a single gene
pub(crate) struct GeneFit {
    pub coefficients: Vec<f64>,
    pub stdev_unscaled: Vec<f64>,
    pub sigma: f64,
    pub df_residual: f64,
    /// sqrt(w) * (y - X b)
    pub weighted_residuals: Vec<f64>,
    pub leverages: Vec<f64>,
}

/// Fit the linear model to every gene in parallel.
///
/// A gene whose weighted design loses rank is reported as
/// `RankDeficientDesign` naming the gene.
pub fn lm_fit(expr: &ExpressionValues, design: &DesignMatrix) -> Result<LinearFit> {
    let n_genes = expr.n_genes();
    let n_samples = expr.n_samples();
    let n_coefs = design.n_coefs();

    if design.n_samples() != n_samples {
        return Err(LimmaError::DimensionMismatch {
            expected: format!("{} design rows", n_samples),
            got: format!("{} design rows", design.n_samples()),
        });
    }
    if n_samples <= n_coefs {
        return Err(LimmaError::InvalidDesign {
            reason: format!(
                "{} samples leave no residual degrees of freedom for {} coefficients",
                n_samples, n_coefs
            ),
        });
    }
    if n_genes == 0 {
        return Err(LimmaError::EmptyData {
            reason: "no genes to fit".to_string(),
        });
    }

    let x = design.matrix();
    let values = expr.values();
    let weights = expr.weights();

    let fits: Vec<Result<GeneFit>> = (0..n_genes)
        .into_par_iter()
        .map(|i| {
            let w = weights.map(|w| w.row(i));
            fit_gene(values.row(i), w, x).ok_or_else(|| LimmaError::RankDeficientDesign {
                context: format!("gene '{}'", expr.gene_ids()[i]),
                reason: "weighted design matrix is singular".to_string(),
            })
        })
        .collect();

    let mut coefficients = Array2::zeros((n_genes, n_coefs));
    let mut stdev_unscaled = Array2::zeros((n_genes, n_coefs));
    let mut std_residuals = Array2::zeros((n_genes, n_samples));
    let mut leverages = Array2::zeros((n_genes, n_samples));
    let mut sigma = Vec::with_capacity(n_genes);
    let mut df_residual = Vec::with_capacity(n_genes);

    for (i, fit) in fits.into_iter().enumerate() {
        let fit = fit?;
        for k in 0..n_coefs {
            coefficients[[i, k]] = fit.coefficients[k];
            stdev_unscaled[[i, k]] = fit.stdev_unscaled[k];
        }
        for j in 0..n_samples {
            std_residuals[[i, j]] = if fit.sigma > 0.0 {
                fit.weighted_residuals[j] / fit.sigma
            } else {
                0.0
            };
            leverages[[i, j]] = fit.leverages[j];
        }
        sigma.push(fit.sigma);
        df_residual.push(fit.df_residual);
    }

    let amean = values
        .outer_iter()
        .map(|row| row.sum() / n_samples as f64)
        .collect();

    log::info!(
        "Fitted linear model: {} genes, {} coefficients, {} residual df",
        n_genes,
        n_coefs,
        n_samples - n_coefs
    );

    Ok(LinearFit {
        gene_ids: expr.gene_ids().to_vec(),
        coef_names: design.coef_names().to_vec(),
        coef: design.coef(),
        coefficients,
        stdev_unscaled,
        sigma,
        df_residual,
        amean,
        std_residuals,
        leverages,
    })
}

/// Weighted least squares fit of one gene. `None` if `X'WX` is singular.
pub(crate) fn fit_gene(
    y: ArrayView1<f64>,
    weights: Option<ArrayView1<f64>>,
    design: &Array2<f64>,
) -> Option<GeneFit> {
    let n_samples = design.nrows();
    let n_coefs = design.ncols();
    let w = |i: usize| weights.map_or(1.0, |w| w[i]);

    let mut xtwx = vec![0.0; n_coefs * n_coefs];
    let mut xtwy = vec![0.0; n_coefs];
    for i in 0..n_samples {
        let wi = w(i);
        for j in 0..n_coefs {
            xtwy[j] += wi * design[[i, j]] * y[i];
            for k in 0..n_coefs {
                xtwx[j * n_coefs + k] += wi * design[[i, j]] * design[[i, k]];
            }
        }
    }

    let chol = cholesky(&xtwx, n_coefs)?;
    let beta = cholesky_solve(&chol, &xtwy, n_coefs);
    let inverse = cholesky_inverse(&chol, n_coefs);

    let mut rss = 0.0;
    let mut weighted_residuals = Vec::with_capacity(n_samples);
    let mut leverages = Vec::with_capacity(n_samples);
    for i in 0..n_samples {
        let fitted: f64 = (0..n_coefs).map(|k| design[[i, k]] * beta[k]).sum();
        let wi = w(i);
        let r = wi.sqrt() * (y[i] - fitted);
        rss += r * r;
        weighted_residuals.push(r);

        let mut h = 0.0;
        for j in 0..n_coefs {
            for k in 0..n_coefs {
                h += design[[i, j]] * inverse[j * n_coefs + k] * design[[i, k]];
            }
        }
        leverages.push(wi * h);
    }

    let df_residual = (n_samples - n_coefs) as f64;
    let sigma = (rss / df_residual).sqrt();
    let stdev_unscaled = (0..n_coefs)
        .map(|k| inverse[k * n_coefs + k].max(0.0).sqrt())
        .collect();

    Some(GeneFit {
        coefficients: beta,
        stdev_unscaled,
        sigma,
        df_residual,
        weighted_residuals,
        leverages,
    })
}

/// Cholesky factor `L` (row-major, lower triangular) of a symmetric matrix.
/// `None` when a pivot is not positive relative to the diagonal.
fn cholesky(a: &[f64], n: usize) -> Option<Vec<f64>> {
    let max_diag = (0..n).map(|i| a[i * n + i].abs()).fold(0.0f64, f64::max);
    let tol = 1e-10 * max_diag.max(f64::MIN_POSITIVE);

    let mut l = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i * n + j];
            for k in 0..j {
                sum -= l[i * n + k] * l[j * n + k];
            }
            if i == j {
                if !(sum > tol) {
                    return None;
                }
                l[i * n + j] = sum.sqrt();
            } else {
                l[i * n + j] = sum / l[j * n + j];
            }
        }
    }
    Some(l)
}

fn cholesky_solve(l: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * n + j] * y[j];
        }
        y[i] = sum / l[i * n + i];
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[j * n + i] * x[j];
        }
        x[i] = sum / l[i * n + i];
    }
    x
}

fn cholesky_inverse(l: &[f64], n: usize) -> Vec<f64> {
    let mut result = vec![0.0; n * n];
    for i in 0..n {
        let mut e = vec![0.0; n];
        e[i] = 1.0;
        let col = cholesky_solve(l, &e, n);
        for j in 0..n {
            result[j * n + i] = col[j];
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    fn two_group_design(n_per_group: usize) -> DesignMatrix {
        let n = 2 * n_per_group;
        let matrix = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 || i >= n_per_group {
                1.0
            } else {
                0.0
            }
        });
        DesignMatrix::new(matrix, vec!["Intercept".into(), "group".into()], 1).unwrap()
    }

    #[test]
    fn test_fit_recovers_group_difference() {
        let y = Array1::from(vec![1.0, 1.2, 0.8, 4.1, 3.9, 4.0]);
        let design = two_group_design(3);
        let fit = fit_gene(y.view(), None, design.matrix()).unwrap();

        assert!((fit.coefficients[0] - 1.0).abs() < 1e-10);
        assert!((fit.coefficients[1] - 3.0).abs() < 1e-10);
        assert_eq!(fit.df_residual, 4.0);
        // rss = 0.08 + 0.02
        assert!((fit.sigma - (0.1f64 / 4.0).sqrt()).abs() < 1e-10);
        // unscaled sd of a difference of means: sqrt(1/3 + 1/3)
        assert!((fit.stdev_unscaled[1] - (2.0f64 / 3.0).sqrt()).abs() < 1e-10);
        // leverages sum to the number of coefficients
        let h: f64 = fit.leverages.iter().sum();
        assert!((h - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_weights_shift_estimate() {
        let design = DesignMatrix::new(
            Array2::ones((3, 1)),
            vec!["Intercept".into()],
            0,
        )
        .unwrap();
        let y = array![0.0, 0.0, 3.0];
        let w = array![1.0, 1.0, 4.0];
        let fit = fit_gene(y.view(), Some(w.view()), design.matrix()).unwrap();
        assert!((fit.coefficients[0] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_lm_fit_all_genes() {
        let design = two_group_design(3);
        let values = array![
            [1.0, 1.2, 0.8, 4.1, 3.9, 4.0],
            [5.0, 5.1, 4.9, 5.0, 5.2, 4.8],
        ];
        let expr = ExpressionValues::new(
            values,
            None,
            vec!["g1".into(), "g2".into()],
            (1..=6).map(|i| format!("s{}", i)).collect(),
        )
        .unwrap();
        let fit = lm_fit(&expr, &design).unwrap();

        assert_eq!(fit.n_genes(), 2);
        assert!((fit.coefficients[[0, 1]] - 3.0).abs() < 1e-10);
        assert!(fit.coefficients[[1, 1]].abs() < 1e-10);
        assert!((fit.amean[1] - 5.0).abs() < 1e-10);
        assert_eq!(fit.df_residual, vec![4.0, 4.0]);
    }

    #[test]
    fn test_no_residual_df_rejected() {
        let design = two_group_design(1);
        let expr = ExpressionValues::new(
            array![[1.0, 2.0]],
            None,
            vec!["g1".into()],
            vec!["a".into(), "b".into()],
        )
        .unwrap();
        assert!(matches!(lm_fit(&expr, &design), Err(LimmaError::InvalidDesign { .. })));
    }

    #[test]
    fn test_singular_cholesky_detected() {
        let a = vec![1.0, 1.0, 1.0, 1.0];
        assert!(cholesky(&a, 2).is_none());
        let b = vec![4.0, 2.0, 2.0, 3.0];
        let l = cholesky(&b, 2).unwrap();
        let x = cholesky_solve(&l, &[2.0, 1.0], 2);
        assert!((x[0] - 0.5).abs() < 1e-12);
        assert!(x[1].abs() < 1e-12);
    }

    #[test]
    fn test_sample_weights_multiply() {
        let expr = ExpressionValues::new(
            array![[1.0, 2.0], [3.0, 4.0]],
            Some(array![[2.0, 2.0], [1.0, 1.0]]),
            vec!["g1".into(), "g2".into()],
            vec!["a".into(), "b".into()],
        )
        .unwrap();
        let weighted = expr.with_sample_weights(&[0.5, 3.0]).unwrap();
        let w = weighted.weights().unwrap();
        assert_eq!(w[[0, 0]], 1.0);
        assert_eq!(w[[1, 1]], 3.0);
    }
}
