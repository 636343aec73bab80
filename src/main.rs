//! rust_limma command-line interface

use std::path::Path;

use clap::Parser;
use log::{info, LevelFilter};

use rust_limma::cli::{parse_norm_method, Cli, Commands, NormalizeArgs, RunArgs};
use rust_limma::prelude::*;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let args: Vec<String> = std::env::args().collect();

    // Find the first non-flag argument (potential subcommand)
    let first_positional = args.iter().skip(1).find(|a| !a.starts_with('-'));
    let subcommands = ["run", "normalize", "help"];
    let has_subcommand = first_positional.map_or(false, |a| subcommands.contains(&a.as_str()));

    if !has_subcommand {
        if args.len() == 1 {
            print_no_args();
            return;
        }
        if args.iter().any(|a| a == "--help") {
            print_long_help();
            return;
        }
        if args.iter().any(|a| a == "-h") {
            print_short_help();
            return;
        }
        if args.iter().any(|a| a == "-V" || a == "--version") {
            println!("rust_limma {}", VERSION);
            return;
        }
        print_no_args();
        return;
    }

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Some(Commands::Run(args)) => run_analysis(&args),
        Some(Commands::Normalize(args)) => run_normalize(&args),
        None => {
            print_no_args();
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Custom help output
// ---------------------------------------------------------------------------

fn print_no_args() {
    println!("rust_limma v{}", VERSION);
    println!("Run `rust_limma -h` for usage or `rust_limma --help` for detailed information.");
}

fn print_short_help() {
    println!("rust_limma v{}", VERSION);
    println!();
    println!("Usage: rust_limma <COMMAND> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  run        Run the full differential expression pipeline");
    println!("  normalize  Filter and normalize counts, write log-CPM");
    println!();
    println!("Run `rust_limma <COMMAND> -h` for command-specific options.");
}

fn print_long_help() {
    println!("rust_limma v{}", VERSION);
    println!("Linear-model differential expression analysis of RNA-seq counts");
    println!();
    println!("Usage: rust_limma <COMMAND> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  run        Run the full differential expression pipeline");
    println!("               - CPM expression filter and TMM normalization");
    println!("               - voom precision weights, optional sample quality weights");
    println!("               - empirical Bayes moderated t, optional TREAT threshold");
    println!("               - Benjamini-Hochberg adjusted p-values");
    println!("               - gene-set over-representation and rank tests");
    println!("  normalize  Filter and normalize counts, write log-CPM");
    println!();
    println!("Global Options:");
    println!("  -v, --verbose    Enable verbose output");
    println!("  -h               Print short help");
    println!("      --help       Print detailed help");
    println!("  -V, --version    Print version");
    println!();
    println!("Examples:");
    println!("  rust_limma run -c counts/ -m samples.tsv -d condition --reference control");
    println!();
    println!("  rust_limma run -c counts.tsv -m samples.tsv -d condition \\");
    println!("    --covariate site --quality-weights --gene-sets sets.gmt -o study1");
    println!();
    println!("  rust_limma normalize -c counts/ -o logcpm.tsv");
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Count data from a directory of per-sample files or a single table
fn load_counts(path: &str) -> Result<CountMatrix> {
    info!("Loading counts from: {}", path);
    let counts = if Path::new(path).is_dir() {
        read_count_directory(path)?
    } else {
        read_count_matrix(path)?
    };
    info!("  {} genes, {} samples", counts.n_genes(), counts.n_samples());
    Ok(counts)
}

fn run_analysis(args: &RunArgs) -> Result<()> {
    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
            .ok();
    }

    let config = args.to_config()?;

    let mut counts = load_counts(&args.counts)?;
    if let Some(path) = &args.replicates {
        info!("Collapsing technical replicates using: {}", path);
        let map = read_replicate_map(path)?;
        counts = collapse_replicates(&counts, &replicate_groups(&counts, &map))?;
    }

    info!("Loading metadata from: {}", args.metadata);
    let metadata = read_metadata(&args.metadata)?;

    let analysis = run_pipeline(counts, &metadata, &config)?;

    let results_path = format!("{}_results.tsv", args.output);
    info!("Writing results to: {}", results_path);
    write_results(&results_path, &analysis.results)?;

    if let Some(sets_path) = &args.gene_sets {
        let collection = read_gene_sets(sets_path)?;
        let enrichment = match &args.annotation {
            Some(path) => {
                let annotation = read_annotation(path)?;
                run_enrichment(&analysis, &collection, &annotation, &config)?
            }
            None => run_enrichment(&analysis, &collection, &IdentityAnnotation, &config)?,
        };

        let ora_path = format!("{}_ora.tsv", args.output);
        let camera_path = format!("{}_camera.tsv", args.output);
        info!("Writing enrichment results to: {}, {}", ora_path, camera_path);
        write_ora_results(&ora_path, &enrichment.ora.results)?;
        write_camera_results(&camera_path, &enrichment.camera.results)?;

        let warnings = enrichment.warnings();
        if !warnings.is_empty() {
            println!("\n{} data-quality warning(s):", warnings.len());
            for w in &warnings {
                println!("  {}", w);
            }
        }
    }

    println!("\n{}", analysis.summary);
    Ok(())
}

fn run_normalize(args: &NormalizeArgs) -> Result<()> {
    let counts = load_counts(&args.counts)?;

    let counts = if args.no_filter {
        counts
    } else {
        let groups = match (&args.metadata, &args.group) {
            (Some(path), Some(column)) => {
                let metadata = read_metadata(path)?;
                join_metadata(counts.clone(), &metadata)?.groups(column)?.to_vec()
            }
            (None, Some(_)) => {
                return Err(LimmaError::InvalidInput {
                    reason: "--group needs --metadata".to_string(),
                });
            }
            _ => vec![String::new(); counts.n_samples()],
        };
        let (keep, _) = filter_by_expression(&counts, &groups, &FilterParams::default())?;
        counts.subset_by_mask(&keep)?
    };

    let params = TmmParams {
        method: parse_norm_method(&args.method)?,
        ..TmmParams::default()
    };
    info!("Computing normalization factors ({})...", args.method);
    let normalized = calc_norm_factors(&counts, &params)?;

    info!("Writing log-CPM values to: {}", args.output);
    write_matrix(
        &args.output,
        normalized.gene_ids(),
        normalized.sample_ids(),
        &normalized.log_cpm(args.prior_count),
    )?;

    info!("Done!");
    Ok(())
}
