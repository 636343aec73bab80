//! Normalization of RNA-seq count data

mod counts;
mod norm_factors;
mod normalized;

pub use counts::{cpm, log_cpm};
pub use norm_factors::{calc_norm_factors, NormMethod, TmmParams};
pub use normalized::NormalizedMatrix;
