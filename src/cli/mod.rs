//! Command-line interface for rust_limma

use clap::{Args, Parser, Subcommand};

use crate::config::AnalysisConfig;
use crate::enrichment::OraDirection;
use crate::error::{LimmaError, Result};
use crate::normalization::NormMethod;

#[derive(Parser)]
#[command(name = "rust_limma")]
#[command(version)]
#[command(about = "Linear-model differential expression analysis of RNA-seq counts in Rust")]
#[command(disable_help_flag = true)]
#[command(disable_version_flag = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full differential expression pipeline
    #[command(
        about = "Run the full differential expression pipeline",
        long_about = "Run the full differential expression pipeline\n\n\
            Filters lowly expressed genes, computes TMM normalization factors,\n\
            fits a weighted linear model on voom log-CPM values, moderates the\n\
            variances by empirical Bayes and adjusts p-values by Benjamini-Hochberg.\n\n\
            With --gene-sets, the ranked genes are also tested for hypergeometric\n\
            over-representation and with a correlation-adjusted rank-sum test.",
        after_long_help = "\
Examples:
  # Two-group comparison from a directory of HTSeq count files
  rust_limma run -c counts/ -m samples.tsv -d condition --reference control

  # Adjust for site and sex, with sample quality weights
  rust_limma run -c counts.tsv -m samples.tsv -d condition \\
    --covariate site --covariate sex --quality-weights

  # Minimum fold change (TREAT) and gene-set enrichment
  rust_limma run -c counts/ -m samples.tsv -d condition --lfc-threshold 1 \\
    --annotation genes.tsv --gene-sets sets.gmt -o study1

  # Start from a JSON configuration and override one value
  rust_limma run -c counts/ -m samples.tsv --config analysis.json --alpha 0.1"
    )]
    Run(RunArgs),

    /// Filter and normalize counts, writing log-CPM values
    #[command(
        long_about = "Filter and normalize count data.\n\n\
            Outputs a matrix of log2 counts-per-million computed with TMM\n\
            normalization factors.",
        after_long_help = "\
Examples:
  rust_limma normalize -c counts/ -o logcpm.tsv
  rust_limma normalize -c counts.tsv -m samples.tsv -g condition -o logcpm.tsv --method upperquartile"
    )]
    Normalize(NormalizeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Count table or directory of per-sample count files
    #[arg(short, long,
        long_help = "Count data.\n\
            A directory: one two-column file (gene id, count) per sample, the\n\
            sample id taken from the file name; HTSeq '__' summary rows skipped.\n\
            A file: first column = gene IDs, remaining columns = counts per sample.\n\
            Comma or tab delimited (auto-detected).")]
    pub counts: String,

    /// Path to sample metadata file
    #[arg(short, long,
        long_help = "Path to sample metadata file.\n\
            Format: first column = sample IDs (a superset of the count columns),\n\
            remaining columns = covariates.")]
    pub metadata: String,

    /// Covariate of interest
    #[arg(short, long,
        long_help = "Metadata column holding the covariate of interest.\n\
            Categorical unless --numeric is given. Required unless set in --config.")]
    pub design: Option<String>,

    /// Treat the covariate of interest as numeric and test its slope
    #[arg(long)]
    pub numeric: bool,

    /// Reference level of the covariate of interest
    #[arg(long,
        long_help = "Reference level of the covariate of interest.\n\
            Without this, the alphabetically first level is used as reference.")]
    pub reference: Option<String>,

    /// Level compared against the reference
    #[arg(long,
        long_help = "Level compared against the reference.\n\
            Without this, the first non-reference level is tested.")]
    pub test_level: Option<String>,

    /// Additional categorical covariate
    #[arg(long, value_name = "VAR",
        long_help = "Additional categorical covariates to adjust for.\n\
            Can be specified multiple times: --covariate site --covariate sex")]
    pub covariate: Vec<String>,

    /// Numeric covariate
    #[arg(long, value_name = "VAR",
        long_help = "Numeric covariates to adjust for.\n\
            Can be specified multiple times: --continuous age --continuous rin")]
    pub continuous: Vec<String>,

    /// Adjust for library size in this many quantile buckets
    #[arg(long, value_name = "N",
        long_help = "Add a categorical 'lib_size_bucket' covariate splitting library\n\
            sizes into N quantile bins, and adjust for it.")]
    pub lib_size_buckets: Option<usize>,

    /// Technical replicate map (run, sample)
    #[arg(long,
        long_help = "Two-column table mapping count columns (runs) to biological\n\
            samples. Runs of the same sample are summed before analysis.")]
    pub replicates: Option<String>,

    /// JSON analysis configuration
    #[arg(long,
        long_help = "JSON file with analysis parameters. Absent fields keep their\n\
            defaults; command-line options override file values.")]
    pub config: Option<String>,

    /// Output prefix [default: limma]
    #[arg(short, long, default_value = "limma",
        long_help = "Output prefix. Writes <prefix>_results.tsv and, with\n\
            --gene-sets, <prefix>_ora.tsv and <prefix>_camera.tsv.")]
    pub output: String,

    /// Significance threshold [default: 0.05]
    #[arg(short, long)]
    pub alpha: Option<f64>,

    /// Minimum log2 fold change to test against (TREAT) [default: 0]
    #[arg(long,
        long_help = "Log2 fold change threshold for testing H0: |logFC| <= threshold.\n\
            When > 0, moderated t-statistics are tested with TREAT.")]
    pub lfc_threshold: Option<f64>,

    /// Normalization method [default: tmm]
    #[arg(long,
        long_help = "Normalization factor method.\n\
            tmm:           Trimmed mean of M-values (default)\n\
            upperquartile: Upper-quartile scaling\n\
            none:          All factors equal to one")]
    pub norm_method: Option<String>,

    /// Minimum count in a library of median size [default: 10]
    #[arg(long)]
    pub min_count: Option<f64>,

    /// Fit plain log-CPM values without voom precision weights
    #[arg(long)]
    pub no_voom: bool,

    /// Estimate sample quality weights
    #[arg(long,
        long_help = "Estimate one weight per sample from its residual variance and\n\
            down-weight outlying samples in the fit.")]
    pub quality_weights: bool,

    /// Gene annotation table (gene_id, symbol, chromosome, external_id)
    #[arg(long,
        long_help = "Gene annotation table mapping gene IDs to the identifiers used\n\
            in the gene sets. Without it, gene IDs are used directly.")]
    pub annotation: Option<String>,

    /// Gene-set collection (.gmt or JSON)
    #[arg(long)]
    pub gene_sets: Option<String>,

    /// Genes counted as hits in over-representation [default: both]
    #[arg(long, value_name = "up|down|both")]
    pub ora_direction: Option<String>,

    /// Inter-gene correlation for the rank test, or 'estimate' [default: 0.01]
    #[arg(long,
        long_help = "Inter-gene correlation used by the competitive rank test.\n\
            A number fixes it for every set; 'estimate' computes it per set\n\
            from the residuals.")]
    pub correlation: Option<String>,

    /// Number of threads (0 = auto) [default: 0]
    #[arg(short = 't', long, default_value = "0")]
    pub threads: usize,
}

#[derive(Args, Debug, Clone)]
pub struct NormalizeArgs {
    /// Count table or directory of per-sample count files
    #[arg(short, long)]
    pub counts: String,

    /// Output file path
    #[arg(short, long)]
    pub output: String,

    /// Sample metadata, to filter by group
    #[arg(short, long)]
    pub metadata: Option<String>,

    /// Metadata column whose smallest group sets the filter's sample count
    #[arg(short, long)]
    pub group: Option<String>,

    /// Normalization method [default: tmm]
    #[arg(long, default_value = "tmm")]
    pub method: String,

    /// Prior count added before taking logs [default: 0.5]
    #[arg(long, default_value = "0.5")]
    pub prior_count: f64,

    /// Keep every gene
    #[arg(long)]
    pub no_filter: bool,
}

/// Parse a normalization method name
pub fn parse_norm_method(name: &str) -> Result<NormMethod> {
    match name.to_ascii_lowercase().as_str() {
        "tmm" => Ok(NormMethod::Tmm),
        "upperquartile" | "uq" => Ok(NormMethod::UpperQuartile),
        "none" => Ok(NormMethod::None),
        other => Err(LimmaError::InvalidInput {
            reason: format!("unknown normalization method '{}'. Use: tmm, upperquartile, none", other),
        }),
    }
}

fn parse_ora_direction(name: &str) -> Result<OraDirection> {
    match name.to_ascii_lowercase().as_str() {
        "up" => Ok(OraDirection::Up),
        "down" => Ok(OraDirection::Down),
        "both" => Ok(OraDirection::Both),
        other => Err(LimmaError::InvalidInput {
            reason: format!("unknown ORA direction '{}'. Use: up, down, both", other),
        }),
    }
}

impl RunArgs {
    /// Load `--config` (or the defaults) and apply the command-line overrides
    pub fn to_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_file(path)?,
            None => AnalysisConfig::default(),
        };

        if let Some(variable) = &self.design {
            config.design.variable = variable.clone();
        }
        if config.design.variable.is_empty() {
            return Err(LimmaError::InvalidDesign {
                reason: "no covariate of interest; pass --design or set design.variable in --config"
                    .to_string(),
            });
        }
        if self.numeric {
            config.design.numeric = true;
        }
        if self.reference.is_some() {
            config.design.reference = self.reference.clone();
        }
        if self.test_level.is_some() {
            config.design.test_level = self.test_level.clone();
        }
        config.design.factors.extend(self.covariate.iter().cloned());
        config.design.numeric_covariates.extend(self.continuous.iter().cloned());

        if let Some(n) = self.lib_size_buckets {
            config.lib_size_buckets = Some(n);
        }
        if config.lib_size_buckets.is_some()
            && !config.design.factors.iter().any(|f| f == crate::data::LIB_SIZE_BUCKET)
        {
            config.design.factors.push(crate::data::LIB_SIZE_BUCKET.to_string());
        }

        if let Some(alpha) = self.alpha {
            config.alpha = alpha;
            config.ora.alpha = alpha;
        }
        if let Some(tau) = self.lfc_threshold {
            config.ebayes.lfc_threshold = tau;
        }
        if let Some(method) = &self.norm_method {
            config.tmm.method = parse_norm_method(method)?;
        }
        if let Some(min_count) = self.min_count {
            config.filter.min_count = min_count;
        }
        if self.no_voom {
            config.use_voom = false;
        }
        if self.quality_weights {
            config.quality_weights = true;
        }
        if let Some(direction) = &self.ora_direction {
            config.ora.direction = parse_ora_direction(direction)?;
        }
        if let Some(corr) = &self.correlation {
            config.camera.inter_gene_correlation = if corr.eq_ignore_ascii_case("estimate") {
                None
            } else {
                Some(corr.parse().map_err(|_| LimmaError::InvalidInput {
                    reason: format!("--correlation must be a number or 'estimate', got '{}'", corr),
                })?)
            };
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["rust_limma", "run", "-c", "counts/", "-m", "samples.tsv"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Some(Commands::Run(args)) => args,
            _ => panic!("expected the run subcommand"),
        }
    }

    #[test]
    fn test_run_overrides() {
        let args = run_args(&[
            "-d", "condition", "--reference", "ctrl", "--covariate", "site", "--alpha", "0.1",
            "--lfc-threshold", "1", "--norm-method", "UpperQuartile", "--quality-weights",
            "--correlation", "estimate", "--ora-direction", "down",
        ]);
        let config = args.to_config().unwrap();
        assert_eq!(config.design.variable, "condition");
        assert_eq!(config.design.reference.as_deref(), Some("ctrl"));
        assert_eq!(config.design.factors, vec!["site".to_string()]);
        assert_eq!(config.alpha, 0.1);
        assert_eq!(config.ora.alpha, 0.1);
        assert_eq!(config.ebayes.lfc_threshold, 1.0);
        assert_eq!(config.tmm.method, NormMethod::UpperQuartile);
        assert!(config.quality_weights);
        assert_eq!(config.camera.inter_gene_correlation, None);
        assert_eq!(config.ora.direction, OraDirection::Down);
        assert_eq!(args.output, "limma");
    }

    #[test]
    fn test_design_required() {
        let err = run_args(&[]).to_config().unwrap_err();
        assert!(matches!(err, LimmaError::InvalidDesign { .. }));
    }

    #[test]
    fn test_config_file_then_flags() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"design": {{"variable": "group"}}, "alpha": 0.01, "use_voom": false}}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = run_args(&["--config", path.as_str(), "--lib-size-buckets", "3"]).to_config().unwrap();
        assert_eq!(config.design.variable, "group");
        assert_eq!(config.alpha, 0.01);
        assert!(!config.use_voom);
        assert_eq!(config.lib_size_buckets, Some(3));
        assert_eq!(config.design.factors, vec!["lib_size_bucket".to_string()]);
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(run_args(&["-d", "g", "--correlation", "high"]).to_config().is_err());
        assert!(parse_norm_method("rle").is_err());
        assert!(parse_ora_direction("sideways").is_err());
    }
}
