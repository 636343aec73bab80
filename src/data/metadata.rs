//! Per-sample covariates and their join onto the count matrix

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::CountMatrix;
use crate::error::{LimmaError, Result};
use crate::stats::quantile;

/// Name of the column written by [`SampleMetadata::add_library_size_bucket`]
pub const LIB_SIZE_BUCKET: &str = "lib_size_bucket";

/// Sample metadata: one record per sample, arbitrary covariate columns.
///
/// Values are kept as strings; numeric covariates are parsed on demand
/// by [`SampleMetadata::numeric`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleMetadata {
    /// Sample identifiers
    sample_ids: Vec<String>,
    /// Covariate columns (column name -> value per sample)
    columns: HashMap<String, Vec<String>>,
    /// Column names in insertion order
    column_order: Vec<String>,
}

impl SampleMetadata {
    /// Create new sample metadata
    pub fn new(sample_ids: Vec<String>) -> Self {
        let mut seen = HashSet::new();
        for id in &sample_ids {
            if !seen.insert(id) {
                log::warn!("Duplicate sample ID in metadata: '{}'. The first record is used.", id);
            }
        }
        Self {
            sample_ids,
            columns: HashMap::new(),
            column_order: Vec::new(),
        }
    }

    /// Add (or replace) a covariate column
    pub fn add_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.sample_ids.len() {
            return Err(LimmaError::DimensionMismatch {
                expected: format!("{} values", self.sample_ids.len()),
                got: format!("{} values", values.len()),
            });
        }
        if self.columns.insert(name.to_string(), values).is_none() {
            self.column_order.push(name.to_string());
        }
        Ok(())
    }

    /// Check if a column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Get the values of a column
    pub fn column(&self, name: &str) -> Option<&Vec<String>> {
        self.columns.get(name)
    }

    /// Column names in insertion order
    pub fn column_names(&self) -> &[String] {
        &self.column_order
    }

    /// Get the value of a column for a specific sample
    pub fn get_value(&self, name: &str, sample_idx: usize) -> Result<&str> {
        self.columns
            .get(name)
            .and_then(|v| v.get(sample_idx))
            .map(|s| s.as_str())
            .ok_or_else(|| LimmaError::InvalidInput {
                reason: format!("column '{}' or sample index {} not found", name, sample_idx),
            })
    }

    /// Parse a column as numeric values
    pub fn numeric(&self, name: &str) -> Result<Vec<f64>> {
        let values = self.columns.get(name).ok_or_else(|| LimmaError::InvalidMetadata {
            reason: format!("column '{}' not found", name),
        })?;
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                v.trim().parse::<f64>().map_err(|_| LimmaError::InvalidMetadata {
                    reason: format!(
                        "column '{}' has non-numeric value '{}' for sample '{}'",
                        name, v, self.sample_ids[i]
                    ),
                })
            })
            .collect()
    }

    /// Unique levels of a column (sorted)
    pub fn levels(&self, name: &str) -> Option<Vec<String>> {
        self.columns.get(name).map(|values| {
            let mut unique: Vec<String> = values.to_vec();
            unique.sort();
            unique.dedup();
            unique
        })
    }

    /// Sample indices holding `level` in column `name`
    pub fn samples_with_level(&self, name: &str, level: &str) -> Vec<usize> {
        self.columns
            .get(name)
            .map(|values| {
                values
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| v.as_str() == level)
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get sample IDs
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Get number of samples
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Subset metadata to specific samples, in the given order
    pub fn subset(&self, sample_indices: &[usize]) -> Result<Self> {
        let new_ids: Vec<String> = sample_indices
            .iter()
            .map(|&i| self.sample_ids[i].clone())
            .collect();

        let mut new_meta = SampleMetadata::new(new_ids);

        for name in &self.column_order {
            let values = &self.columns[name];
            let new_values: Vec<String> = sample_indices
                .iter()
                .map(|&i| values[i].clone())
                .collect();
            new_meta.add_column(name, new_values)?;
        }

        Ok(new_meta)
    }

    /// Reorder and subset the metadata to `sample_ids`.
    ///
    /// The metadata must describe every requested sample; extra records are
    /// dropped.
    pub fn align_to(&self, sample_ids: &[String]) -> Result<Self> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, id) in self.sample_ids.iter().enumerate() {
            index.entry(id.as_str()).or_insert(i);
        }

        let missing: Vec<&str> = sample_ids
            .iter()
            .filter(|id| !index.contains_key(id.as_str()))
            .map(|s| s.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(LimmaError::InputShape {
                reason: format!("samples missing from metadata: {:?}", missing),
            });
        }

        let extra = self.n_samples().saturating_sub(sample_ids.len());
        if extra > 0 {
            log::info!("Dropping {} metadata record(s) without count data", extra);
        }

        let indices: Vec<usize> = sample_ids.iter().map(|id| index[id.as_str()]).collect();
        self.subset(&indices)
    }

    /// Derive a categorical library-size column by splitting library sizes at
    /// their quantiles into `n_buckets` bins labelled `q1..qN`.
    pub fn add_library_size_bucket(&mut self, lib_sizes: &[f64], n_buckets: usize) -> Result<()> {
        if n_buckets == 0 {
            return Err(LimmaError::InvalidInput {
                reason: "number of library size buckets must be positive".to_string(),
            });
        }

        let breaks: Vec<f64> = (1..n_buckets)
            .map(|k| quantile(lib_sizes, k as f64 / n_buckets as f64))
            .collect();

        let labels: Vec<String> = lib_sizes
            .iter()
            .map(|&size| {
                let bucket = breaks.iter().filter(|&&b| size > b).count();
                format!("q{}", bucket + 1)
            })
            .collect();

        self.add_column(LIB_SIZE_BUCKET, labels)
    }
}

/// A count matrix together with metadata aligned to its columns
#[derive(Debug, Clone)]
pub struct AnnotatedCounts {
    counts: CountMatrix,
    samples: SampleMetadata,
}

impl AnnotatedCounts {
    /// Get the count matrix
    pub fn counts(&self) -> &CountMatrix {
        &self.counts
    }

    /// Get the aligned sample metadata
    pub fn samples(&self) -> &SampleMetadata {
        &self.samples
    }

    /// Group label of every sample for `column`
    pub fn groups(&self, column: &str) -> Result<&[String]> {
        self.samples
            .column(column)
            .map(|v| v.as_slice())
            .ok_or_else(|| LimmaError::InvalidMetadata {
                reason: format!("group column '{}' not found in metadata", column),
            })
    }

    /// Replace the count matrix (e.g. after filtering genes), keeping samples
    pub fn with_counts(&self, counts: CountMatrix) -> Result<Self> {
        if counts.sample_ids() != self.counts.sample_ids() {
            return Err(LimmaError::InputShape {
                reason: "replacement count matrix has different samples".to_string(),
            });
        }
        Ok(Self {
            counts,
            samples: self.samples.clone(),
        })
    }
}

/// Attach sample metadata to a count matrix.
///
/// Metadata sample identifiers must be a superset of the matrix columns.
pub fn join_metadata(counts: CountMatrix, metadata: &SampleMetadata) -> Result<AnnotatedCounts> {
    let samples = metadata.align_to(counts.sample_ids())?;
    Ok(AnnotatedCounts { counts, samples })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sample_metadata_levels() {
        let mut meta = SampleMetadata::new(strings(&["s1", "s2", "s3", "s4"]));
        meta.add_column("group", strings(&["control", "control", "case", "case"]))
            .unwrap();

        assert_eq!(meta.levels("group").unwrap(), vec!["case", "control"]);
        assert_eq!(meta.samples_with_level("group", "control"), vec![0, 1]);
    }

    #[test]
    fn test_numeric_column() {
        let mut meta = SampleMetadata::new(strings(&["s1", "s2"]));
        meta.add_column("age", strings(&["31", "x"])).unwrap();
        assert!(meta.numeric("age").is_err());

        meta.add_column("age", strings(&["31", "28.5"])).unwrap();
        assert_eq!(meta.numeric("age").unwrap(), vec![31.0, 28.5]);
        assert_eq!(meta.column_names(), &["age".to_string()]);
    }

    #[test]
    fn test_join_reorders_and_drops_extra() {
        let counts = CountMatrix::new(
            array![[1.0, 2.0], [3.0, 4.0]],
            strings(&["g1", "g2"]),
            strings(&["b", "a"]),
        )
        .unwrap();

        let mut meta = SampleMetadata::new(strings(&["a", "b", "c"]));
        meta.add_column("group", strings(&["x", "y", "z"])).unwrap();

        let joined = join_metadata(counts, &meta).unwrap();
        assert_eq!(joined.samples().sample_ids(), &strings(&["b", "a"])[..]);
        assert_eq!(joined.groups("group").unwrap(), &strings(&["y", "x"])[..]);
    }

    #[test]
    fn test_join_missing_sample_is_shape_error() {
        let counts = CountMatrix::new(
            array![[1.0, 2.0]],
            strings(&["g1"]),
            strings(&["a", "missing"]),
        )
        .unwrap();
        let meta = SampleMetadata::new(strings(&["a"]));

        let err = join_metadata(counts, &meta).unwrap_err();
        assert!(matches!(err, LimmaError::InputShape { .. }));
    }

    #[test]
    fn test_library_size_bucket() {
        let mut meta = SampleMetadata::new(strings(&["s1", "s2", "s3", "s4"]));
        meta.add_library_size_bucket(&[100.0, 400.0, 200.0, 300.0], 2).unwrap();
        assert_eq!(
            meta.column(LIB_SIZE_BUCKET).unwrap(),
            &strings(&["q1", "q2", "q1", "q2"])
        );
    }
}
