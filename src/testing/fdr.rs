//! P-value adjustment for multiple testing
//!
//! - Benjamini-Hochberg (BH) false discovery rate
//! - Bonferroni family-wise error rate

/// Apply Benjamini-Hochberg FDR correction to p-values.
///
/// Step-up procedure: p-values are ranked, scaled by `m / rank`, and a
/// running minimum is taken from the largest rank down, so adjusted values
/// are monotone in the raw p-values. NaN entries are passed through and do
/// not count towards `m`.
pub fn benjamini_hochberg(pvalues: &[f64]) -> Vec<f64> {
    let n = pvalues.len();
    if n == 0 {
        return vec![];
    }

    // NaN sorts last
    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| {
        let (pa, pb) = (pvalues[a], pvalues[b]);
        match (pa.is_nan(), pb.is_nan()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => pa.total_cmp(&pb),
        }
    });

    let m = pvalues.iter().filter(|p| !p.is_nan()).count();
    if m == 0 {
        return vec![f64::NAN; n];
    }

    let mut padj = vec![f64::NAN; n];
    let mut cummin = f64::INFINITY;
    let mut rank = m;

    for &i in indices.iter().rev() {
        let p = pvalues[i];
        if p.is_nan() {
            continue;
        }
        let adj = (p * m as f64 / rank as f64).min(1.0);
        cummin = cummin.min(adj);
        padj[i] = cummin;
        rank -= 1;
    }

    padj
}

/// Apply Bonferroni correction to p-values.
///
/// Multiplies each p-value by the number of tests; controls the
/// family-wise error rate rather than the FDR.
pub fn bonferroni(pvalues: &[f64]) -> Vec<f64> {
    let m = pvalues.iter().filter(|p| !p.is_nan()).count();
    pvalues
        .iter()
        .map(|&p| if p.is_nan() { f64::NAN } else { (p * m as f64).min(1.0) })
        .collect()
}
