//! Analysis configuration
//!
//! Every stage's parameters grouped in one serde value, so a run can be
//! described by a JSON file and then adjusted from the command line.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::enrichment::{CameraParams, OraParams};
use crate::error::Result;
use crate::filter::FilterParams;
use crate::model::{DesignSpec, EbayesParams, QualityWeightParams, VoomParams};
use crate::normalization::TmmParams;

/// Parameters of a full differential expression run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub design: DesignSpec,
    /// Metadata column whose groups set the filter's minimum sample count;
    /// the design variable when unset and categorical
    pub filter_group: Option<String>,
    /// Add a library-size bucket factor with this many quantile bins
    pub lib_size_buckets: Option<usize>,
    pub filter: FilterParams,
    pub tmm: TmmParams,
    /// Weight observations by the mean-variance trend; plain log-CPM otherwise
    pub use_voom: bool,
    pub voom: VoomParams,
    /// Estimate per-sample quality weights
    pub quality_weights: bool,
    pub quality: QualityWeightParams,
    pub ebayes: EbayesParams,
    /// Significance level of the up/down summary
    pub alpha: f64,
    pub ora: OraParams,
    pub camera: CameraParams,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            design: DesignSpec::default(),
            filter_group: None,
            lib_size_buckets: None,
            filter: FilterParams::default(),
            tmm: TmmParams::default(),
            use_voom: true,
            voom: VoomParams::default(),
            quality_weights: false,
            quality: QualityWeightParams::default(),
            ebayes: EbayesParams::default(),
            alpha: 0.05,
            ora: OraParams::default(),
            camera: CameraParams::default(),
        }
    }
}

impl AnalysisConfig {
    /// Read a configuration from JSON; absent fields keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        Ok(config)
    }

    /// Column whose groups drive the expression filter, if any
    pub fn filter_column(&self) -> Option<&str> {
        match &self.filter_group {
            Some(column) => Some(column.as_str()),
            None if !self.design.numeric && !self.design.variable.is_empty() => {
                Some(self.design.variable.as_str())
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::OraDirection;
    use crate::normalization::NormMethod;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "design": {{"variable": "group", "reference": "ctrl", "factors": ["site"]}},
                "tmm": {{"method": "upperquartile"}},
                "ebayes": {{"lfc_threshold": 1.0}},
                "ora": {{"direction": "up"}},
                "quality_weights": true
            }}"#
        )
        .unwrap();

        let config = AnalysisConfig::from_file(file.path()).unwrap();
        assert_eq!(config.design.variable, "group");
        assert_eq!(config.design.reference.as_deref(), Some("ctrl"));
        assert_eq!(config.design.factors, vec!["site".to_string()]);
        assert_eq!(config.tmm.method, NormMethod::UpperQuartile);
        assert!((config.tmm.logratio_trim - 0.3).abs() < 1e-12);
        assert_eq!(config.ebayes.lfc_threshold, 1.0);
        assert_eq!(config.ora.direction, OraDirection::Up);
        assert!(config.quality_weights);
        assert!(config.use_voom);
        assert_eq!(config.alpha, 0.05);
        assert_eq!(config.filter.min_count, 10.0);
    }

    #[test]
    fn test_filter_column() {
        let mut config = AnalysisConfig::default();
        assert_eq!(config.filter_column(), None);

        config.design = DesignSpec::group("condition");
        assert_eq!(config.filter_column(), Some("condition"));

        config.design.numeric = true;
        assert_eq!(config.filter_column(), None);

        config.filter_group = Some("site".to_string());
        assert_eq!(config.filter_column(), Some("site"));
    }
}
