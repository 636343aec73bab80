//! Gene-set enrichment: over-representation and competitive rank tests

mod camera;
mod gene_sets;
mod ora;

pub use camera::{camera_ranks, CameraParams};
pub use gene_sets::GeneSetCollection;
pub use ora::{over_representation, OraDirection, OraParams};

use crate::error::PipelineWarning;

/// Enrichment results together with the data-quality warnings raised while
/// building the universe and restricting the gene sets
#[derive(Debug, Clone)]
pub struct EnrichmentReport<T> {
    pub results: Vec<T>,
    pub warnings: Vec<PipelineWarning>,
}
