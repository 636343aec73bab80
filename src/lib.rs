//! rust_limma: linear-model differential expression analysis of RNA-seq counts
//!
//! Counts are filtered on CPM, scaled by TMM normalization factors, turned
//! into log-CPM with voom precision weights and fitted gene by gene with
//! weighted least squares. Variances are moderated by empirical Bayes, p-values
//! adjusted by Benjamini-Hochberg, and the ranked genes tested for gene-set
//! enrichment.
//!
//! # Example
//!
//! ```ignore
//! use rust_limma::prelude::*;
//!
//! let counts = read_count_directory("counts/")?;
//! let metadata = read_metadata("samples.tsv")?;
//!
//! let mut config = AnalysisConfig::default();
//! config.design = DesignSpec::group("condition");
//!
//! let analysis = run_pipeline(counts, &metadata, &config)?;
//! println!("{}", analysis.summary);
//! write_results("results.tsv", &analysis.results)?;
//! ```

pub mod cli;
pub mod config;
pub mod data;
pub mod enrichment;
pub mod error;
pub mod filter;
pub mod io;
pub mod model;
pub mod normalization;
pub mod stats;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::AnalysisConfig;
    pub use crate::data::{
        collapse_replicates, join_metadata, replicate_groups, AnnotatedCounts, AnnotationProvider,
        CountMatrix, IdentityAnnotation, InMemoryAnnotation, SampleMetadata,
    };
    pub use crate::enrichment::{camera_ranks, over_representation, EnrichmentReport, GeneSetCollection};
    pub use crate::error::{LimmaError, PipelineWarning, Result};
    pub use crate::filter::{filter_by_expression, FilterParams, FilterSummary};
    pub use crate::io::{
        read_annotation, read_count_directory, read_count_matrix, read_gene_sets, read_metadata,
        read_replicate_map, write_camera_results, write_matrix, write_ora_results, write_results,
        CameraResult, FitResult, OraResult, ResultsSummary, SortBy,
    };
    pub use crate::model::{
        build_design, ebayes, lm_fit, sample_quality_weights, top_table, voom, DesignMatrix,
        DesignSpec, ExpressionValues, MeanVarianceTrend, ModeratedFit,
    };
    pub use crate::normalization::{calc_norm_factors, NormMethod, NormalizedMatrix, TmmParams};
    pub use crate::testing::benjamini_hochberg;
    pub use crate::{run_enrichment, run_pipeline, Analysis, Enrichment};
}

use prelude::*;

/// Every intermediate value of a differential expression run
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Filtered counts with metadata aligned to their columns
    pub data: AnnotatedCounts,
    pub filter: FilterSummary,
    pub normalized: NormalizedMatrix,
    pub design: DesignMatrix,
    /// Mean-variance trend, when voom weights were used
    pub trend: Option<MeanVarianceTrend>,
    /// Per-sample quality weights, when estimated
    pub sample_weights: Option<Vec<f64>>,
    pub moderated: ModeratedFit,
    /// Result table sorted by p-value
    pub results: FitResult,
    pub summary: ResultsSummary,
}

/// Run the differential expression pipeline on a loaded count matrix.
///
/// Stages run in order: metadata join, expression filter, normalization
/// factors, log-CPM with optional voom and sample quality weights, linear
/// fit, empirical Bayes moderation and BH adjustment.
pub fn run_pipeline(
    counts: CountMatrix,
    metadata: &SampleMetadata,
    config: &AnalysisConfig,
) -> Result<Analysis> {
    log::info!(
        "Starting analysis of {} genes x {} samples",
        counts.n_genes(),
        counts.n_samples()
    );

    let mut samples = metadata.align_to(counts.sample_ids())?;
    if let Some(n_buckets) = config.lib_size_buckets {
        samples.add_library_size_bucket(&counts.library_sizes(), n_buckets)?;
    }
    let joined = join_metadata(counts, &samples)?;

    // Without a grouping column every sample is in one group
    let groups: Vec<String> = match config.filter_column() {
        Some(column) => joined.groups(column)?.to_vec(),
        None => vec![String::new(); joined.counts().n_samples()],
    };
    let (keep, filter) = filter_by_expression(joined.counts(), &groups, &config.filter)?;
    let data = joined.with_counts(joined.counts().subset_by_mask(&keep)?)?;

    let normalized = calc_norm_factors(data.counts(), &config.tmm)?;
    log::debug!("Normalization factors: {:?}", normalized.norm_factors());

    let design = build_design(data.samples(), &config.design)?;
    log::info!(
        "Design: {} coefficients ({}), testing '{}'",
        design.n_coefs(),
        design.coef_names().join(", "),
        design.coef_name()
    );

    let (mut expr, trend) = if config.use_voom {
        let (expr, trend) = voom(&normalized, &design, &config.voom)?;
        (expr, Some(trend))
    } else {
        (ExpressionValues::from_log_cpm(&normalized, config.voom.prior_count)?, None)
    };

    let sample_weights = if config.quality_weights {
        let weights = sample_quality_weights(&expr, &design, &config.quality)?;
        expr = expr.with_sample_weights(&weights)?;
        Some(weights)
    } else {
        None
    };

    let fit = lm_fit(&expr, &design)?;
    let moderated = ebayes(fit, &config.ebayes)?;
    let results = top_table(&moderated, SortBy::PValue);
    let summary = results.summary(config.alpha);
    log::info!(
        "{} of {} genes significant at adj.P.Val < {} ({} up, {} down)",
        summary.significant,
        summary.total_genes,
        summary.alpha,
        summary.upregulated,
        summary.downregulated
    );

    Ok(Analysis {
        data,
        filter,
        normalized,
        design,
        trend,
        sample_weights,
        moderated,
        results,
        summary,
    })
}

/// Over-representation and competitive rank results of one collection
#[derive(Debug, Clone)]
pub struct Enrichment {
    pub ora: EnrichmentReport<OraResult>,
    pub camera: EnrichmentReport<CameraResult>,
}

impl Enrichment {
    /// Warnings raised by either test, duplicates removed
    pub fn warnings(&self) -> Vec<PipelineWarning> {
        let mut all = self.ora.warnings.clone();
        for w in &self.camera.warnings {
            if !all.contains(w) {
                all.push(w.clone());
            }
        }
        all
    }
}

/// Test a gene-set collection against the results of [`run_pipeline`]
pub fn run_enrichment(
    analysis: &Analysis,
    collection: &GeneSetCollection,
    provider: &dyn AnnotationProvider,
    config: &AnalysisConfig,
) -> Result<Enrichment> {
    let ora = over_representation(&analysis.results, collection, provider, &config.ora)?;
    let camera = camera_ranks(&analysis.moderated, collection, provider, &config.camera)?;
    Ok(Enrichment { ora, camera })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Direction;
    use ndarray::Array2;

    const N_GENES: usize = 60;
    const N_SAMPLES: usize = 6;

    /// Deterministic noise in [-1, 1]
    fn wobble(i: usize, j: usize) -> f64 {
        ((((i * 31 + j * 17 + 7) % 13) as f64) - 6.0) / 6.0
    }

    /// g0..g3 eight-fold up in the treated samples, g58 and g59 barely expressed
    fn counts() -> CountMatrix {
        let depth = [1.0, 1.2, 0.9, 1.1, 0.95, 1.05];
        let values = Array2::from_shape_fn((N_GENES, N_SAMPLES), |(i, j)| {
            if i >= N_GENES - 2 {
                return (j % 2) as f64;
            }
            let treated = j >= 3;
            let base = 50.0 + 20.0 * i as f64;
            let mean = if i < 4 && treated { 8.0 * base } else { base } * depth[j];
            (mean + 1.5 * mean.sqrt() * wobble(i, j)).round().max(0.0)
        });
        CountMatrix::new(
            values,
            (0..N_GENES).map(|i| format!("g{}", i)).collect(),
            (0..N_SAMPLES).map(|j| format!("s{}", j)).collect(),
        )
        .unwrap()
    }

    fn metadata() -> SampleMetadata {
        // listed in a different order from the count columns, plus one extra record
        let ids = ["s5", "s4", "s3", "s2", "s1", "s0", "s9"];
        let mut meta = SampleMetadata::new(ids.iter().map(|s| s.to_string()).collect());
        let groups = ["treated", "treated", "treated", "control", "control", "control", "control"];
        meta.add_column("condition", groups.iter().map(|s| s.to_string()).collect())
            .unwrap();
        meta
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            design: DesignSpec {
                reference: Some("control".to_string()),
                ..DesignSpec::group("condition")
            },
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn test_full_pipeline() {
        let analysis = run_pipeline(counts(), &metadata(), &config()).unwrap();

        assert_eq!(analysis.filter.n_total, N_GENES);
        assert_eq!(analysis.filter.n_kept, N_GENES - 2);
        assert_eq!(analysis.results.n_genes(), N_GENES - 2);
        assert_eq!(analysis.data.samples().n_samples(), N_SAMPLES);
        assert!(analysis.trend.is_some());

        let gm: f64 = analysis.normalized.norm_factors().iter().map(|f| f.ln()).sum::<f64>()
            / N_SAMPLES as f64;
        assert!(gm.abs() < 1e-10);

        for gene in ["g0", "g1", "g2", "g3"] {
            let i = analysis.results.gene_index(gene).unwrap();
            let lfc = analysis.results.log_fold_changes[i];
            assert!((lfc - 3.0).abs() < 0.35, "{} logFC {}", gene, lfc);
            assert!(analysis.results.adj_p_values[i] < 0.05);
        }

        // sorted by p-value, adjusted never below raw
        let p = &analysis.results.p_values;
        assert!(p.windows(2).all(|w| w[0] <= w[1]));
        assert!(analysis
            .results
            .adj_p_values
            .iter()
            .zip(p.iter())
            .all(|(adj, raw)| adj >= raw));

        assert!(analysis.summary.upregulated >= 4);
        println!("{}", analysis.summary);
    }

    #[test]
    fn test_pipeline_with_quality_weights() {
        let config = AnalysisConfig {
            quality_weights: true,
            ..config()
        };
        let analysis = run_pipeline(counts(), &metadata(), &config).unwrap();
        let weights = analysis.sample_weights.as_ref().unwrap();
        assert_eq!(weights.len(), N_SAMPLES);
        assert!(weights.iter().all(|w| w.is_finite() && *w > 0.0));

        let i = analysis.results.gene_index("g0").unwrap();
        assert!(analysis.results.adj_p_values[i] < 0.05);
    }

    #[test]
    fn test_pipeline_without_voom() {
        let config = AnalysisConfig {
            use_voom: false,
            ..config()
        };
        let analysis = run_pipeline(counts(), &metadata(), &config).unwrap();
        assert!(analysis.trend.is_none());
        let i = analysis.results.gene_index("g1").unwrap();
        assert!((analysis.results.log_fold_changes[i] - 3.0).abs() < 0.35);
    }

    #[test]
    fn test_everything_filtered() {
        let mut config = config();
        config.filter.min_count = 1e9;
        let err = run_pipeline(counts(), &metadata(), &config).unwrap_err();
        assert!(matches!(err, LimmaError::EmptyResultAfterFiltering { n_genes: N_GENES }));
    }

    #[test]
    fn test_missing_metadata_sample() {
        let mut meta = SampleMetadata::new(vec!["s0".to_string(), "s1".to_string()]);
        meta.add_column("condition", vec!["a".to_string(), "b".to_string()])
            .unwrap();
        let err = run_pipeline(counts(), &meta, &config()).unwrap_err();
        assert!(matches!(err, LimmaError::InputShape { .. }));
    }

    #[test]
    fn test_enrichment_after_pipeline() {
        let config = config();
        let analysis = run_pipeline(counts(), &metadata(), &config).unwrap();

        let mut sets = GeneSetCollection::new();
        sets.insert("de", ["g0", "g1", "g2", "g3"]);
        sets.insert("null", (20..30).map(|i| format!("g{}", i)));
        sets.insert("missing", ["ENTREZ:0"]);

        let enrichment = run_enrichment(&analysis, &sets, &IdentityAnnotation, &config).unwrap();

        assert_eq!(enrichment.ora.results[0].gene_set, "de");
        assert_eq!(enrichment.ora.results[0].overlap, 4);
        assert!(enrichment.ora.results.iter().all(|r| r.gene_set != "missing"));

        let de = enrichment.camera.results.iter().find(|r| r.gene_set == "de").unwrap();
        assert_eq!(de.direction, Direction::Up);

        assert_eq!(
            enrichment.warnings(),
            vec![PipelineWarning::ZeroOverlapGeneSet {
                gene_set: "missing".to_string()
            }]
        );
    }
}
