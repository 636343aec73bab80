//! Input/output: count files, metadata, annotation, gene sets and result tables

mod counts;
mod results;
mod tables;
mod writers;

pub(crate) use tables::table_reader;

pub use counts::{read_count_directory, read_count_matrix};
pub use results::{CameraResult, Direction, FitResult, OraResult, ResultsSummary, SortBy};
pub use tables::{read_annotation, read_gene_sets, read_metadata, read_replicate_map};
pub use writers::{write_camera_results, write_matrix, write_ora_results, write_results};
