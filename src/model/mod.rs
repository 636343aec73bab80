//! Weighted linear models with empirical Bayes moderation

mod design;
mod ebayes;
mod fitting;
mod quality;
mod voom;

pub use design::{build_design, check_full_rank, DesignMatrix, DesignSpec};
pub use ebayes::{ebayes, top_table, EbayesParams, ModeratedFit};
pub use fitting::{lm_fit, ExpressionValues, LinearFit};
pub use quality::{sample_quality_weights, QualityWeightParams};
pub use voom::{voom, MeanVarianceTrend, VoomParams};
