//! Differential expression and enrichment result tables

use serde::{Deserialize, Serialize};

/// Ordering of a result table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// Ascending p-value
    PValue,
    /// Descending absolute log fold change
    LogFc,
    /// Descending absolute moderated t
    T,
    /// Descending average expression
    AveExpr,
    /// Input gene order
    None,
}

/// Per-gene results for the coefficient of interest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Name of the tested coefficient
    pub coef_name: String,
    /// Minimum fold change tested against (0 for an ordinary test)
    pub lfc_threshold: f64,
    pub gene_ids: Vec<String>,
    /// log2 fold change (the coefficient estimate)
    pub log_fold_changes: Vec<f64>,
    /// Average log2 CPM
    pub ave_expr: Vec<f64>,
    /// Moderated t-statistic
    pub t: Vec<f64>,
    pub p_values: Vec<f64>,
    /// BH-adjusted p-values
    pub adj_p_values: Vec<f64>,
}

impl FitResult {
    pub fn n_genes(&self) -> usize {
        self.gene_ids.len()
    }

    /// Row index of a gene
    pub fn gene_index(&self, gene_id: &str) -> Option<usize> {
        self.gene_ids.iter().position(|g| g == gene_id)
    }

    /// Reorder the rows
    pub fn sorted(mut self, by: SortBy) -> Self {
        let n = self.n_genes();
        let mut order: Vec<usize> = (0..n).collect();
        let desc_abs = |v: &[f64], a: usize, b: usize| v[b].abs().total_cmp(&v[a].abs());
        match by {
            SortBy::None => return self,
            SortBy::PValue => order.sort_by(|&a, &b| self.p_values[a].total_cmp(&self.p_values[b])),
            SortBy::LogFc => order.sort_by(|&a, &b| desc_abs(&self.log_fold_changes, a, b)),
            SortBy::T => order.sort_by(|&a, &b| desc_abs(&self.t, a, b)),
            SortBy::AveExpr => order.sort_by(|&a, &b| self.ave_expr[b].total_cmp(&self.ave_expr[a])),
        }

        fn permute<T: Clone>(values: &[T], order: &[usize]) -> Vec<T> {
            order.iter().map(|&i| values[i].clone()).collect()
        }
        self.gene_ids = permute(&self.gene_ids, &order);
        self.log_fold_changes = permute(&self.log_fold_changes, &order);
        self.ave_expr = permute(&self.ave_expr, &order);
        self.t = permute(&self.t, &order);
        self.p_values = permute(&self.p_values, &order);
        self.adj_p_values = permute(&self.adj_p_values, &order);
        self
    }

    /// Genes with adjusted p-value below `alpha`
    pub fn significant_genes(&self, alpha: f64) -> Vec<&str> {
        self.gene_ids
            .iter()
            .zip(self.adj_p_values.iter())
            .filter(|(_, &p)| p.is_finite() && p < alpha)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Significant genes with positive log fold change
    pub fn upregulated_genes(&self, alpha: f64) -> Vec<&str> {
        self.gene_ids
            .iter()
            .zip(self.adj_p_values.iter().zip(self.log_fold_changes.iter()))
            .filter(|(_, (&p, &lfc))| p.is_finite() && p < alpha && lfc > 0.0)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Significant genes with negative log fold change
    pub fn downregulated_genes(&self, alpha: f64) -> Vec<&str> {
        self.gene_ids
            .iter()
            .zip(self.adj_p_values.iter().zip(self.log_fold_changes.iter()))
            .filter(|(_, (&p, &lfc))| p.is_finite() && p < alpha && lfc < 0.0)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn summary(&self, alpha: f64) -> ResultsSummary {
        ResultsSummary {
            coef_name: self.coef_name.clone(),
            total_genes: self.n_genes(),
            significant: self.significant_genes(alpha).len(),
            upregulated: self.upregulated_genes(alpha).len(),
            downregulated: self.downregulated_genes(alpha).len(),
            alpha,
        }
    }
}

/// Up/down counts at a significance level
#[derive(Debug, Clone)]
pub struct ResultsSummary {
    pub coef_name: String,
    pub total_genes: usize,
    pub significant: usize,
    pub upregulated: usize,
    pub downregulated: usize,
    pub alpha: f64,
}

impl std::fmt::Display for ResultsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Differential Expression Summary ({})", self.coef_name)?;
        writeln!(f, "==================================")?;
        writeln!(f, "Genes tested: {}", self.total_genes)?;
        writeln!(f, "Significant (adj.P.Val < {}): {}", self.alpha, self.significant)?;
        writeln!(f, "  Up: {}", self.upregulated)?;
        writeln!(f, "  Down: {}", self.downregulated)?;
        writeln!(
            f,
            "  NotSig: {}",
            self.total_genes - self.significant
        )?;
        Ok(())
    }
}

/// Direction of a gene-set result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "Up"),
            Direction::Down => write!(f, "Down"),
        }
    }
}

/// Over-representation result for one gene set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OraResult {
    pub gene_set: String,
    /// Genes of the set present in the universe
    pub set_size: usize,
    /// Significant genes in the set
    pub overlap: usize,
    /// Overlap expected by chance
    pub expected: f64,
    /// Over-representation p-value (upper tail)
    pub p_over: f64,
    /// Under-representation p-value (lower tail)
    pub p_under: f64,
    /// BH-adjusted over-representation p-value
    pub q_value: f64,
    /// Significant genes in the set
    pub genes: Vec<String>,
}

/// Competitive rank test result for one gene set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraResult {
    pub gene_set: String,
    pub set_size: usize,
    /// Inter-gene correlation used for the variance inflation
    pub correlation: f64,
    pub direction: Direction,
    pub p_value: f64,
    pub q_value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> FitResult {
        FitResult {
            coef_name: "group_b_vs_a".to_string(),
            lfc_threshold: 0.0,
            gene_ids: vec!["g1".into(), "g2".into(), "g3".into()],
            log_fold_changes: vec![0.1, -2.0, 3.0],
            ave_expr: vec![5.0, 7.0, 2.0],
            t: vec![0.5, -6.0, 4.0],
            p_values: vec![0.6, 0.0001, 0.001],
            adj_p_values: vec![0.6, 0.0003, 0.0015],
        }
    }

    #[test]
    fn test_summary_counts() {
        let summary = result().summary(0.05);
        assert_eq!(summary.significant, 2);
        assert_eq!(summary.upregulated, 1);
        assert_eq!(summary.downregulated, 1);
        assert!(format!("{}", summary).contains("NotSig: 1"));
    }

    #[test]
    fn test_sorting() {
        let by_p = result().sorted(SortBy::PValue);
        assert_eq!(by_p.gene_ids, vec!["g2", "g3", "g1"]);
        assert_eq!(by_p.log_fold_changes, vec![-2.0, 3.0, 0.1]);

        let by_lfc = result().sorted(SortBy::LogFc);
        assert_eq!(by_lfc.gene_ids, vec!["g3", "g2", "g1"]);

        let by_expr = result().sorted(SortBy::AveExpr);
        assert_eq!(by_expr.gene_ids[0], "g2");
    }
}
