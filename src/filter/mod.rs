//! Gene filtering prior to normalization and model fitting

mod expression;

pub use expression::{
    apply_expression_filter, cpm_cutoff, filter_by_expression, min_sample_size, FilterParams,
    FilterSummary,
};
