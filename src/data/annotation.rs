//! Gene annotation records and the provider interface used to map gene
//! identifiers onto the external identifiers gene sets are written in.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::PipelineWarning;

/// Annotation of a single gene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneAnnotation {
    pub gene_id: String,
    pub symbol: Option<String>,
    pub chromosome: Option<String>,
    /// Identifier used by gene-set collections (e.g. Entrez)
    pub external_id: Option<String>,
}

/// Source of gene annotations.
///
/// Implementations may wrap a database or web service; the pipeline only
/// needs lookups by gene identifier.
pub trait AnnotationProvider: Sync {
    fn lookup(&self, gene_id: &str) -> Option<GeneAnnotation>;
}

/// Fixed annotation table held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryAnnotation {
    records: HashMap<String, GeneAnnotation>,
}

impl InMemoryAnnotation {
    /// Build from records, keeping the first record for each gene identifier
    pub fn new(records: Vec<GeneAnnotation>) -> Self {
        let mut map = HashMap::with_capacity(records.len());
        let mut duplicates = 0usize;
        for record in records {
            if map.contains_key(&record.gene_id) {
                duplicates += 1;
                continue;
            }
            map.insert(record.gene_id.clone(), record);
        }
        if duplicates > 0 {
            log::info!("Dropped {} duplicate annotation record(s), keeping the first", duplicates);
        }
        Self { records: map }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl AnnotationProvider for InMemoryAnnotation {
    fn lookup(&self, gene_id: &str) -> Option<GeneAnnotation> {
        self.records.get(gene_id).cloned()
    }
}

/// Provider that treats every gene identifier as its own external identifier
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityAnnotation;

impl AnnotationProvider for IdentityAnnotation {
    fn lookup(&self, gene_id: &str) -> Option<GeneAnnotation> {
        Some(GeneAnnotation {
            gene_id: gene_id.to_string(),
            symbol: None,
            chromosome: None,
            external_id: Some(gene_id.to_string()),
        })
    }
}

/// Map gene identifiers to external identifiers.
///
/// Returns `(gene index, external id)` for every mapped gene. Genes without
/// an external identifier are dropped and reported as a warning; when two
/// genes map to the same external identifier only the first is kept.
pub fn map_external_ids(
    gene_ids: &[String],
    provider: &dyn AnnotationProvider,
) -> (Vec<(usize, String)>, Option<PipelineWarning>) {
    let mut mapped = Vec::with_capacity(gene_ids.len());
    let mut seen = std::collections::HashSet::new();
    let mut unmapped = 0usize;

    for (i, gene_id) in gene_ids.iter().enumerate() {
        match provider.lookup(gene_id).and_then(|a| a.external_id) {
            Some(ext) if !ext.is_empty() => {
                if seen.insert(ext.clone()) {
                    mapped.push((i, ext));
                } else {
                    log::debug!("External id '{}' already mapped; skipping gene '{}'", ext, gene_id);
                }
            }
            _ => unmapped += 1,
        }
    }

    let warning = if unmapped > 0 {
        let w = PipelineWarning::UnmappedGeneIdentifier { count: unmapped };
        log::warn!("{}", w);
        Some(w)
    } else {
        None
    };

    (mapped, warning)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(gene: &str, ext: Option<&str>) -> GeneAnnotation {
        GeneAnnotation {
            gene_id: gene.to_string(),
            symbol: Some(format!("SYM_{}", gene)),
            chromosome: Some("1".to_string()),
            external_id: ext.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_first_record_wins() {
        let table = InMemoryAnnotation::new(vec![
            record("ENSG1", Some("100")),
            record("ENSG1", Some("999")),
            record("ENSG2", Some("200")),
        ]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("ENSG1").unwrap().external_id.as_deref(), Some("100"));
    }

    #[test]
    fn test_unmapped_genes_reported() {
        let table = InMemoryAnnotation::new(vec![
            record("ENSG1", Some("100")),
            record("ENSG2", None),
        ]);
        let genes: Vec<String> = ["ENSG1", "ENSG2", "ENSG3"].iter().map(|s| s.to_string()).collect();

        let (mapped, warning) = map_external_ids(&genes, &table);
        assert_eq!(mapped, vec![(0, "100".to_string())]);
        assert_eq!(warning, Some(PipelineWarning::UnmappedGeneIdentifier { count: 2 }));
    }

    #[test]
    fn test_identity_maps_everything() {
        let genes: Vec<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let (mapped, warning) = map_external_ids(&genes, &IdentityAnnotation);
        assert_eq!(mapped.len(), 2);
        assert!(warning.is_none());
    }
}
