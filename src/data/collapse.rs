//! Collapse technical replicates by summing counts

use std::collections::HashMap;
use ndarray::Array2;

use super::CountMatrix;
use crate::error::{LimmaError, Result};

/// Sum technical replicate columns into one column per biological sample.
///
/// `groups[j]` names the biological sample that column `j` belongs to.
/// The result has one column per distinct group, ordered alphabetically
/// and named after the group.
pub fn collapse_replicates(counts: &CountMatrix, groups: &[String]) -> Result<CountMatrix> {
    let n_genes = counts.n_genes();
    let n_samples = counts.n_samples();

    if groups.len() != n_samples {
        return Err(LimmaError::InputShape {
            reason: format!(
                "replicate grouping has {} entries for {} count columns",
                groups.len(),
                n_samples
            ),
        });
    }

    let mut members: HashMap<&str, Vec<usize>> = HashMap::new();
    for (j, group) in groups.iter().enumerate() {
        members.entry(group.as_str()).or_default().push(j);
    }

    let mut group_order: Vec<&str> = members.keys().copied().collect();
    group_order.sort();

    let raw = counts.counts();
    let mut new_counts = Array2::zeros((n_genes, group_order.len()));
    for (new_j, group_name) in group_order.iter().enumerate() {
        for &old_j in &members[group_name] {
            for i in 0..n_genes {
                new_counts[[i, new_j]] += raw[[i, old_j]];
            }
        }
    }

    let n_collapsed = n_samples - group_order.len();
    if n_collapsed > 0 {
        log::info!(
            "Collapsed {} technical replicate column(s) into {} samples",
            n_samples,
            group_order.len()
        );
    }

    let original_total: f64 = raw.sum();
    let collapsed_total: f64 = new_counts.sum();
    if (original_total - collapsed_total).abs() > 1e-6 {
        return Err(LimmaError::NumericalInstability {
            operation: "collapse_replicates".to_string(),
            details: format!(
                "total count changed from {} to {}",
                original_total, collapsed_total
            ),
        });
    }

    let sample_ids: Vec<String> = group_order.iter().map(|g| g.to_string()).collect();
    CountMatrix::new(new_counts, counts.gene_ids().to_vec(), sample_ids)
}

/// Build the grouping vector for [`collapse_replicates`] from a run -> sample
/// map. Columns absent from the map are their own biological sample.
pub fn replicate_groups(counts: &CountMatrix, run_to_sample: &HashMap<String, String>) -> Vec<String> {
    counts
        .sample_ids()
        .iter()
        .map(|run| run_to_sample.get(run).cloned().unwrap_or_else(|| run.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_collapse_replicates() {
        let counts = CountMatrix::new(
            array![
                [10.0, 20.0, 15.0, 25.0, 30.0, 35.0],
                [100.0, 200.0, 150.0, 250.0, 300.0, 350.0],
                [5.0, 10.0, 8.0, 12.0, 15.0, 18.0]
            ],
            strings(&["gene1", "gene2", "gene3"]),
            strings(&["s1_L1", "s1_L2", "s2_L1", "s2_L2", "s3_L1", "s3_L2"]),
        )
        .unwrap();

        let groups = strings(&["s1", "s1", "s2", "s2", "s3", "s3"]);
        let collapsed = collapse_replicates(&counts, &groups).unwrap();

        assert_eq!(collapsed.n_samples(), 3);
        assert_eq!(collapsed.n_genes(), 3);
        assert_eq!(collapsed.sample_ids(), &strings(&["s1", "s2", "s3"])[..]);

        let c = collapsed.counts();
        assert_eq!(c[[0, 0]], 30.0);
        assert_eq!(c[[0, 1]], 40.0);
        assert_eq!(c[[0, 2]], 65.0);
        assert_eq!(c[[1, 2]], 650.0);
    }

    #[test]
    fn test_collapse_wrong_length() {
        let counts = CountMatrix::new(
            array![[10.0, 20.0]],
            strings(&["gene1"]),
            strings(&["a", "b"]),
        )
        .unwrap();
        assert!(collapse_replicates(&counts, &strings(&["x"])).is_err());
    }

    #[test]
    fn test_replicate_groups_defaults_to_run() {
        let counts = CountMatrix::new(
            array![[10.0, 20.0, 5.0]],
            strings(&["gene1"]),
            strings(&["r1", "r2", "r3"]),
        )
        .unwrap();
        let mut map = HashMap::new();
        map.insert("r1".to_string(), "s1".to_string());
        map.insert("r2".to_string(), "s1".to_string());

        let groups = replicate_groups(&counts, &map);
        assert_eq!(groups, strings(&["s1", "s1", "r3"]));
    }
}
