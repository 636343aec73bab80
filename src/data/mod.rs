//! Data structures for count-based expression analysis

mod annotation;
mod collapse;
mod count_matrix;
mod metadata;

pub use annotation::{map_external_ids, AnnotationProvider, GeneAnnotation, IdentityAnnotation, InMemoryAnnotation};
pub use collapse::{collapse_replicates, replicate_groups};
pub use count_matrix::CountMatrix;
pub use metadata::{join_metadata, AnnotatedCounts, SampleMetadata, LIB_SIZE_BUCKET};
