//! Gene-set collections and the tested gene universe

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::data::{map_external_ids, AnnotationProvider};
use crate::error::PipelineWarning;

/// Named gene sets keyed by external gene identifier. Read-only input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneSetCollection {
    sets: BTreeMap<String, BTreeSet<String>>,
}

impl GeneSetCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add genes to a set, creating it if needed
    pub fn insert<I, S>(&mut self, name: &str, genes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sets
            .entry(name.to_string())
            .or_default()
            .extend(genes.into_iter().map(Into::into));
    }

    pub fn get(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.sets.get(name)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Sets in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.sets.iter()
    }
}

impl<S: Into<String>> FromIterator<(S, Vec<String>)> for GeneSetCollection {
    fn from_iter<T: IntoIterator<Item = (S, Vec<String>)>>(iter: T) -> Self {
        let mut collection = Self::new();
        for (name, genes) in iter {
            let name: String = name.into();
            collection.insert(&name, genes);
        }
        collection
    }
}

/// Tested genes that carry an external identifier
#[derive(Debug, Clone)]
pub(crate) struct Universe {
    /// Row index in the results for each universe member
    pub rows: Vec<usize>,
    /// External identifier -> position in `rows`
    pub index: HashMap<String, usize>,
}

impl Universe {
    /// Map the tested gene ids through `provider`; unmapped genes are dropped
    pub fn build(gene_ids: &[String], provider: &dyn AnnotationProvider) -> (Self, Option<PipelineWarning>) {
        let (mapped, warning) = map_external_ids(gene_ids, provider);
        let mut rows = Vec::with_capacity(mapped.len());
        let mut index = HashMap::with_capacity(mapped.len());
        for (pos, (row, ext)) in mapped.into_iter().enumerate() {
            rows.push(row);
            index.insert(ext, pos);
        }
        (Self { rows, index }, warning)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Restrict every set to the universe.
    ///
    /// Returns `(name, universe positions)` for sets with at least one member;
    /// sets without any are reported as `ZeroOverlapGeneSet`.
    pub fn restrict(&self, collection: &GeneSetCollection) -> (Vec<(String, Vec<usize>)>, Vec<PipelineWarning>) {
        let mut restricted = Vec::with_capacity(collection.len());
        let mut warnings = Vec::new();
        for (name, genes) in collection.iter() {
            let members: Vec<usize> = genes.iter().filter_map(|g| self.index.get(g).copied()).collect();
            if members.is_empty() {
                let w = PipelineWarning::ZeroOverlapGeneSet { gene_set: name.clone() };
                log::warn!("{}", w);
                warnings.push(w);
            } else {
                restricted.push((name.clone(), members));
            }
        }
        (restricted, warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::IdentityAnnotation;

    #[test]
    fn test_collection_from_pairs() {
        let collection: GeneSetCollection = vec![
            ("b", vec!["x".to_string(), "y".to_string()]),
            ("a", vec!["z".to_string()]),
            ("b", vec!["x".to_string()]),
        ]
        .into_iter()
        .collect();
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.get("b").unwrap().len(), 2);
        let names: Vec<&String> = collection.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_zero_overlap_set_dropped() {
        let genes: Vec<String> = ["g1", "g2", "g3"].iter().map(|s| s.to_string()).collect();
        let (universe, warning) = Universe::build(&genes, &IdentityAnnotation);
        assert!(warning.is_none());

        let mut collection = GeneSetCollection::new();
        collection.insert("present", ["g1", "g3", "other"]);
        collection.insert("absent", ["nope"]);

        let (restricted, warnings) = universe.restrict(&collection);
        assert_eq!(restricted.len(), 1);
        assert_eq!(restricted[0].0, "present");
        assert_eq!(restricted[0].1.len(), 2);
        assert_eq!(
            warnings,
            vec![PipelineWarning::ZeroOverlapGeneSet { gene_set: "absent".to_string() }]
        );
    }
}
