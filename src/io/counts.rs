//! Readers for per-sample count files and count tables

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use ndarray::Array2;

use super::table_reader;
use crate::data::CountMatrix;
use crate::error::{LimmaError, Result};

/// Prefix of the summary rows HTSeq appends (`__no_feature`, `__ambiguous`, ...)
const SUMMARY_PREFIX: &str = "__";

/// Sample identifier of a count file: its name without extensions
fn sample_id_from_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let stem = name.split('.').next().unwrap_or(name);
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

/// Read one two-column `gene_id count` file
fn read_count_file(path: &Path) -> Result<(Vec<String>, Vec<f64>)> {
    let reader = BufReader::new(File::open(path)?);
    let mut genes = Vec::new();
    let mut counts = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let mut fields = line.split_whitespace();
        let gene = match fields.next() {
            Some(g) => g,
            None => continue,
        };
        if gene.starts_with(SUMMARY_PREFIX) {
            continue;
        }
        let value = fields.next().ok_or_else(|| LimmaError::InvalidCountMatrix {
            reason: format!("{}:{}: missing count for '{}'", path.display(), line_no + 1, gene),
        })?;
        let count: u64 = value.parse().map_err(|_| LimmaError::InvalidCountMatrix {
            reason: format!(
                "{}:{}: count '{}' is not a non-negative integer",
                path.display(),
                line_no + 1,
                value
            ),
        })?;
        genes.push(gene.to_string());
        counts.push(count as f64);
    }

    Ok((genes, counts))
}

/// Read a directory of per-sample count files into one matrix.
///
/// Files are taken in file-name order; every file must list the same genes
/// in the same order.
pub fn read_count_directory<P: AsRef<Path>>(dir: P) -> Result<CountMatrix> {
    let dir = dir.as_ref();
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| !n.starts_with('.'))
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(LimmaError::EmptyData {
            reason: format!("no count files in {}", dir.display()),
        });
    }

    let mut gene_ids: Option<Vec<String>> = None;
    let mut columns = Vec::with_capacity(paths.len());
    let mut sample_ids = Vec::with_capacity(paths.len());

    for path in &paths {
        let sample = sample_id_from_path(path).ok_or_else(|| LimmaError::InputShape {
            reason: format!("cannot derive a sample id from {}", path.display()),
        })?;
        let (genes, counts) = read_count_file(path)?;

        match &gene_ids {
            None => gene_ids = Some(genes),
            Some(reference) if *reference != genes => {
                let expected: HashSet<&String> = reference.iter().collect();
                let missing = genes.iter().filter(|g| !expected.contains(g)).count();
                return Err(LimmaError::InputShape {
                    reason: format!(
                        "sample '{}' lists {} genes ({} not in the first file); expected the {} genes of '{}' in the same order",
                        sample,
                        genes.len(),
                        missing,
                        reference.len(),
                        sample_ids.first().map(String::as_str).unwrap_or("")
                    ),
                });
            }
            Some(_) => {}
        }

        log::debug!("Read {} counts for sample {}", counts.len(), sample);
        sample_ids.push(sample);
        columns.push(counts);
    }

    let gene_ids = gene_ids.unwrap_or_default();
    if gene_ids.is_empty() {
        return Err(LimmaError::EmptyData {
            reason: "count files contain no genes".to_string(),
        });
    }

    let mut counts = Array2::zeros((gene_ids.len(), columns.len()));
    for (j, column) in columns.iter().enumerate() {
        for (i, &v) in column.iter().enumerate() {
            counts[[i, j]] = v;
        }
    }

    log::info!(
        "Loaded {} genes x {} samples from {}",
        gene_ids.len(),
        sample_ids.len(),
        dir.display()
    );
    CountMatrix::new(counts, gene_ids, sample_ids)
}

/// Read a count matrix from a delimited table.
///
/// First column is the gene id, the header holds sample ids; tab or comma
/// delimited.
pub fn read_count_matrix<P: AsRef<Path>>(path: P) -> Result<CountMatrix> {
    let mut reader = table_reader(path.as_ref())?;
    let header = reader.headers()?.clone();
    if header.len() < 2 {
        return Err(LimmaError::InvalidCountMatrix {
            reason: "not enough columns in header".to_string(),
        });
    }
    let sample_ids: Vec<String> = header.iter().skip(1).map(String::from).collect();
    let n_samples = sample_ids.len();

    let mut gene_ids = Vec::new();
    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() != n_samples + 1 {
            return Err(LimmaError::InvalidCountMatrix {
                reason: format!("row has {} columns, expected {}", record.len(), n_samples + 1),
            });
        }
        gene_ids.push(record[0].to_string());
        for field in record.iter().skip(1) {
            values.push(field.parse::<f64>().map_err(|_| LimmaError::InvalidCountMatrix {
                reason: format!("invalid count value '{}' for gene '{}'", field, &record[0]),
            })?);
        }
    }

    if gene_ids.is_empty() {
        return Err(LimmaError::EmptyData {
            reason: "no genes found in count matrix".to_string(),
        });
    }

    let counts = Array2::from_shape_vec((gene_ids.len(), n_samples), values).map_err(|e| {
        LimmaError::InvalidCountMatrix {
            reason: e.to_string(),
        }
    })?;
    CountMatrix::new(counts, gene_ids, sample_ids)
}
