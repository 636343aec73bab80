//! P-value calculation from test statistics

use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Degrees of freedom above which the t distribution is replaced by the normal
const NORMAL_DF: f64 = 1e6;

/// Two-sided p-value of a z-statistic
pub fn pvalue_normal(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    2.0 * standard_normal_upper(z.abs())
}

/// Two-sided p-value of a t-statistic with `df` degrees of freedom.
///
/// Infinite (or very large) `df` uses the normal limit.
pub fn pvalue_t(stat: f64, df: f64) -> f64 {
    if stat.is_nan() || df.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    (2.0 * upper_tail_t(stat.abs(), df)).min(1.0)
}

/// `P(T > stat)` for a t distribution with `df` degrees of freedom
pub fn upper_tail_t(stat: f64, df: f64) -> f64 {
    if stat.is_nan() || df.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if df.is_infinite() || df > NORMAL_DF {
        return standard_normal_upper(stat);
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(t_dist) => t_dist.cdf(-stat),
        Err(_) => f64::NAN,
    }
}

fn standard_normal_upper(z: f64) -> f64 {
    match Normal::new(0.0, 1.0) {
        Ok(normal) => normal.cdf(-z),
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pvalue_symmetric() {
        let p1 = pvalue_normal(2.0);
        let p2 = pvalue_normal(-2.0);
        assert!((p1 - p2).abs() < 1e-10);
        assert!((p1 - 0.04550026).abs() < 1e-6);
    }

    #[test]
    fn test_pvalue_zero() {
        assert!((pvalue_normal(0.0) - 1.0).abs() < 1e-10);
        assert!((pvalue_t(0.0, 4.0) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_pvalue_t_distribution() {
        // large df approaches normal
        let p_normal = pvalue_normal(2.0);
        let p_t_large = pvalue_t(2.0, 1000.0);
        assert!((p_normal - p_t_large).abs() < 0.001);
        assert_eq!(pvalue_t(2.0, f64::INFINITY), p_normal);

        // small df is more conservative
        let p_t_small = pvalue_t(2.0, 3.0);
        assert!(p_t_small > p_normal);
        // qt(0.975, 3) = 3.182446
        assert!((pvalue_t(3.182446, 3.0) - 0.05).abs() < 1e-5);
    }

    #[test]
    fn test_invalid_df() {
        assert!(pvalue_t(1.0, 0.0).is_nan());
        assert!(upper_tail_t(f64::NAN, 3.0).is_nan());
    }
}
