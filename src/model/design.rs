//! Design matrix construction for the linear model

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::data::SampleMetadata;
use crate::error::{LimmaError, Result};

/// Description of the model to fit.
///
/// The covariate of interest is either a factor (compare `test_level`
/// against `reference`) or numeric (test the slope). Additional factor and
/// numeric covariates are adjusted for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignSpec {
    /// Metadata column holding the covariate of interest
    pub variable: String,
    /// Treat `variable` as a numeric covariate
    pub numeric: bool,
    /// Reference level of `variable` (first level alphabetically if unset)
    pub reference: Option<String>,
    /// Level compared against the reference (first non-reference level if unset)
    pub test_level: Option<String>,
    /// Additional factor covariates, e.g. site, sex or library-size bucket
    pub factors: Vec<String>,
    /// Additional numeric covariates
    pub numeric_covariates: Vec<String>,
}

impl DesignSpec {
    /// Two-group comparison on a single factor
    pub fn group(variable: &str) -> Self {
        Self {
            variable: variable.to_string(),
            ..Self::default()
        }
    }
}

/// Model matrix with coefficient names and the coefficient under test
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    matrix: Array2<f64>,
    coef_names: Vec<String>,
    coef: usize,
}

impl DesignMatrix {
    /// Wrap an explicit matrix; `coef` indexes the coefficient of interest.
    pub fn new(matrix: Array2<f64>, coef_names: Vec<String>, coef: usize) -> Result<Self> {
        if coef_names.len() != matrix.ncols() {
            return Err(LimmaError::DimensionMismatch {
                expected: format!("{} coefficient names", matrix.ncols()),
                got: format!("{} coefficient names", coef_names.len()),
            });
        }
        if coef >= matrix.ncols() {
            return Err(LimmaError::InvalidDesign {
                reason: format!("coefficient index {} out of range", coef),
            });
        }
        check_full_rank(&matrix)?;
        Ok(Self {
            matrix,
            coef_names,
            coef,
        })
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub fn coef_names(&self) -> &[String] {
        &self.coef_names
    }

    /// Index of the coefficient of interest
    pub fn coef(&self) -> usize {
        self.coef
    }

    pub fn coef_name(&self) -> &str {
        &self.coef_names[self.coef]
    }

    pub fn n_samples(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_coefs(&self) -> usize {
        self.matrix.ncols()
    }

    /// Residual degrees of freedom of an unweighted fit
    pub fn df_residual(&self) -> usize {
        self.n_samples().saturating_sub(self.n_coefs())
    }
}

/// Factor levels with the reference moved to the front
fn ordered_levels(metadata: &SampleMetadata, column: &str, reference: Option<&str>) -> Result<Vec<String>> {
    let mut levels = metadata.levels(column).ok_or_else(|| LimmaError::InvalidDesign {
        reason: format!("variable '{}' not found in metadata", column),
    })?;
    if let Some(reference) = reference {
        let pos = levels.iter().position(|l| l == reference).ok_or_else(|| {
            LimmaError::InvalidDesign {
                reason: format!("reference level '{}' not present in '{}'", reference, column),
            }
        })?;
        let r = levels.remove(pos);
        levels.insert(0, r);
    }
    Ok(levels)
}

/// Treatment-coded indicator columns for one factor
fn push_factor_columns(
    metadata: &SampleMetadata,
    column: &str,
    levels: &[String],
    columns: &mut Vec<Vec<f64>>,
    coef_names: &mut Vec<String>,
) -> Result<()> {
    let values = metadata.column(column).ok_or_else(|| LimmaError::InvalidDesign {
        reason: format!("variable '{}' not found in metadata", column),
    })?;
    for level in levels.iter().skip(1) {
        columns.push(values.iter().map(|v| if v == level { 1.0 } else { 0.0 }).collect());
        coef_names.push(format!("{}_{}_vs_{}", column, level, levels[0]));
    }
    Ok(())
}

/// Build the design matrix for `spec` from sample metadata.
///
/// Column order is intercept, adjustment factors, the covariate of interest,
/// then numeric adjustment covariates.
pub fn build_design(metadata: &SampleMetadata, spec: &DesignSpec) -> Result<DesignMatrix> {
    let n_samples = metadata.n_samples();
    if n_samples == 0 {
        return Err(LimmaError::EmptyData {
            reason: "no samples to build a design from".to_string(),
        });
    }

    let mut columns: Vec<Vec<f64>> = vec![vec![1.0; n_samples]];
    let mut coef_names = vec!["Intercept".to_string()];

    for factor in &spec.factors {
        let levels = ordered_levels(metadata, factor, None)?;
        push_factor_columns(metadata, factor, &levels, &mut columns, &mut coef_names)?;
    }

    let coef = if spec.numeric {
        columns.push(metadata.numeric(&spec.variable)?);
        coef_names.push(spec.variable.clone());
        columns.len() - 1
    } else {
        let levels = ordered_levels(metadata, &spec.variable, spec.reference.as_deref())?;
        if levels.len() < 2 {
            return Err(LimmaError::InvalidDesign {
                reason: format!(
                    "variable '{}' needs at least two levels, found {:?}",
                    spec.variable, levels
                ),
            });
        }
        let first_col = columns.len();
        push_factor_columns(metadata, &spec.variable, &levels, &mut columns, &mut coef_names)?;

        let test_level = match &spec.test_level {
            Some(level) => level.clone(),
            None => {
                if levels.len() > 2 {
                    log::info!(
                        "'{}' has {} levels; testing '{}' vs '{}'",
                        spec.variable,
                        levels.len(),
                        levels[1],
                        levels[0]
                    );
                }
                levels[1].clone()
            }
        };
        let offset = levels
            .iter()
            .skip(1)
            .position(|l| *l == test_level)
            .ok_or_else(|| LimmaError::InvalidDesign {
                reason: format!(
                    "test level '{}' is not a non-reference level of '{}'",
                    test_level, spec.variable
                ),
            })?;
        first_col + offset
    };

    for covariate in &spec.numeric_covariates {
        columns.push(metadata.numeric(covariate)?);
        coef_names.push(covariate.clone());
    }

    let mut matrix = Array2::zeros((n_samples, columns.len()));
    for (j, column) in columns.iter().enumerate() {
        for (i, &v) in column.iter().enumerate() {
            matrix[[i, j]] = v;
        }
    }

    log::debug!("Design columns: {:?}", coef_names);
    DesignMatrix::new(matrix, coef_names, coef)
}

/// Check that a design matrix has full column rank.
///
/// Uses Householder QR with column pivoting; a zero column (a level without
/// samples) and a linear combination of columns are reported separately.
pub fn check_full_rank(matrix: &Array2<f64>) -> Result<()> {
    let nrow = matrix.nrows();
    let ncol = matrix.ncols();

    if nrow == 0 || ncol == 0 {
        return Err(LimmaError::InvalidDesign {
            reason: "design matrix has zero rows or columns".to_string(),
        });
    }

    let rank = qr_rank(matrix);
    if rank < ncol {
        let has_zero_column = (0..ncol).any(|j| matrix.column(j).iter().all(|&v| v == 0.0));
        let reason = if has_zero_column {
            format!(
                "rank {} < {} columns: levels or combinations of levels without any samples give column(s) of zeros",
                rank, ncol
            )
        } else {
            format!(
                "rank {} < {} columns: one or more covariates are linear combinations of the others",
                rank, ncol
            )
        };
        return Err(LimmaError::RankDeficientDesign {
            context: "design matrix".to_string(),
            reason,
        });
    }

    Ok(())
}

/// Numerical rank by Householder QR with column pivoting.
///
/// Counts diagonal elements of R above `max(nrow, ncol) * eps * max|diag(R)|`.
pub(crate) fn qr_rank(matrix: &Array2<f64>) -> usize {
    let nrow = matrix.nrows();
    let ncol = matrix.ncols();
    let k = nrow.min(ncol);

    let mut r = matrix.to_owned();
    let mut col_norms_sq: Vec<f64> = (0..ncol)
        .map(|j| r.column(j).iter().map(|&v| v * v).sum())
        .collect();

    for step in 0..k {
        let mut best_col = step;
        for j in (step + 1)..ncol {
            if col_norms_sq[j] > col_norms_sq[best_col] {
                best_col = j;
            }
        }
        if best_col != step {
            for i in 0..nrow {
                r.swap([i, step], [i, best_col]);
            }
            col_norms_sq.swap(step, best_col);
        }

        let mut alpha = (step..nrow).map(|i| r[[i, step]] * r[[i, step]]).sum::<f64>().sqrt();
        if alpha < f64::EPSILON * 1e3 {
            break;
        }
        if r[[step, step]] > 0.0 {
            alpha = -alpha;
        }

        let v0 = r[[step, step]] - alpha;
        r[[step, step]] = alpha;

        let v_norm_sq = v0 * v0 + ((step + 1)..nrow).map(|i| r[[i, step]] * r[[i, step]]).sum::<f64>();
        if v_norm_sq < f64::MIN_POSITIVE {
            continue;
        }
        let tau = 2.0 / v_norm_sq;

        for j in (step + 1)..ncol {
            let mut dot = v0 * r[[step, j]];
            for i in (step + 1)..nrow {
                dot += r[[i, step]] * r[[i, j]];
            }
            let scale = tau * dot;
            r[[step, j]] -= scale * v0;
            for i in (step + 1)..nrow {
                r[[i, j]] -= scale * r[[i, step]];
            }
        }

        for j in (step + 1)..ncol {
            col_norms_sq[j] = (col_norms_sq[j] - r[[step, j]] * r[[step, j]]).max(0.0);
        }
    }

    let max_dim = nrow.max(ncol) as f64;
    let max_abs_diag = (0..k).map(|i| r[[i, i]].abs()).fold(0.0f64, f64::max);
    let tol = max_dim * f64::EPSILON * max_abs_diag;

    (0..k).filter(|&i| r[[i, i]].abs() > tol).count()
}
