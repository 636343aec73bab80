//! Error types for rust_limma

use thiserror::Error;

/// Main error type for the analysis pipeline
#[derive(Error, Debug)]
pub enum LimmaError {
    #[error("Input shape mismatch: {reason}")]
    InputShape { reason: String },

    #[error("No genes left after expression filtering ({n_genes} genes tested, 0 kept)")]
    EmptyResultAfterFiltering { n_genes: usize },

    #[error("Rank-deficient design for {context}: {reason}")]
    RankDeficientDesign { context: String, reason: String },

    #[error("Invalid count matrix: {reason}")]
    InvalidCountMatrix { reason: String },

    #[error("Invalid metadata: {reason}")]
    InvalidMetadata { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Invalid design specification: {reason}")]
    InvalidDesign { reason: String },

    #[error("Numerical instability in {operation}: {details}")]
    NumericalInstability { operation: String, details: String },

    #[error("Empty data: {reason}")]
    EmptyData { reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, LimmaError>;

/// Non-fatal data-quality conditions. These are logged when raised and
/// handed back next to the results; the affected rows are skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineWarning {
    /// Genes without an external annotation, dropped from the enrichment universe
    UnmappedGeneIdentifier { count: usize },
    /// A gene set sharing no genes with the tested universe
    ZeroOverlapGeneSet { gene_set: String },
}

impl std::fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineWarning::UnmappedGeneIdentifier { count } => {
                write!(f, "{} gene(s) have no external annotation and were dropped", count)
            }
            PipelineWarning::ZeroOverlapGeneSet { gene_set } => {
                write!(f, "gene set '{}' has no genes in the tested universe and was dropped", gene_set)
            }
        }
    }
}
