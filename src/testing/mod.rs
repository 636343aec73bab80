//! Multiple-testing correction and p-values from test statistics

mod fdr;
mod pvalue;

pub use fdr::{benjamini_hochberg, bonferroni};
pub use pvalue::{pvalue_normal, pvalue_t, upper_tail_t};
