//! Over-representation analysis with the hypergeometric distribution

use serde::{Deserialize, Serialize};
use statrs::distribution::{DiscreteCDF, Hypergeometric};

use super::gene_sets::{GeneSetCollection, Universe};
use super::EnrichmentReport;
use crate::data::AnnotationProvider;
use crate::error::{LimmaError, Result};
use crate::io::{FitResult, OraResult};
use crate::testing::benjamini_hochberg;

/// Which significant genes are counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OraDirection {
    Up,
    Down,
    Both,
}

/// Configurable parameters for over-representation analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OraParams {
    /// Adjusted p-value below which a gene counts as significant
    pub alpha: f64,
    pub direction: OraDirection,
    /// Sets with fewer universe members are skipped
    pub min_set_size: usize,
    /// Sets with more universe members are skipped
    pub max_set_size: Option<usize>,
}

impl Default for OraParams {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            direction: OraDirection::Both,
            min_set_size: 1,
            max_set_size: None,
        }
    }
}

/// `P(X >= k)` and `P(X <= k)` for X ~ Hypergeometric(N, K, n)
fn hypergeometric_tails(k: u64, population: u64, successes: u64, draws: u64) -> Result<(f64, f64)> {
    if draws == 0 || successes == 0 {
        return Ok((1.0, 1.0));
    }
    let dist = Hypergeometric::new(population, successes, draws).map_err(|e| {
        LimmaError::InvalidInput {
            reason: format!(
                "hypergeometric(N={}, K={}, n={}): {}",
                population, successes, draws, e
            ),
        }
    })?;
    let upper = if k == 0 { 1.0 } else { dist.sf(k - 1) };
    let lower = dist.cdf(k);
    Ok((upper.clamp(0.0, 1.0), lower.clamp(0.0, 1.0)))
}

/// Test every gene set for over-representation of significant genes.
///
/// The universe is every tested gene with an external identifier. Results
/// are sorted by over-representation p-value; q-values are BH-adjusted over
/// the sets actually tested.
pub fn over_representation(
    results: &FitResult,
    collection: &GeneSetCollection,
    provider: &dyn AnnotationProvider,
    params: &OraParams,
) -> Result<EnrichmentReport<OraResult>> {
    let (universe, unmapped) = Universe::build(&results.gene_ids, provider);
    let mut warnings: Vec<_> = unmapped.into_iter().collect();
    if universe.len() == 0 {
        return Err(LimmaError::EmptyData {
            reason: "no tested gene maps to an external identifier".to_string(),
        });
    }

    let significant: Vec<bool> = universe
        .rows
        .iter()
        .map(|&row| {
            let p = results.adj_p_values[row];
            let lfc = results.log_fold_changes[row];
            p.is_finite()
                && p < params.alpha
                && match params.direction {
                    OraDirection::Up => lfc > 0.0,
                    OraDirection::Down => lfc < 0.0,
                    OraDirection::Both => true,
                }
        })
        .collect();
    let n_significant = significant.iter().filter(|&&s| s).count();
    log::info!(
        "ORA: {} of {} universe genes significant at {}",
        n_significant,
        universe.len(),
        params.alpha
    );

    let (restricted, dropped) = universe.restrict(collection);
    warnings.extend(dropped);

    let population = universe.len() as u64;
    let mut out = Vec::with_capacity(restricted.len());
    for (name, members) in restricted {
        let set_size = members.len();
        if set_size < params.min_set_size || params.max_set_size.map_or(false, |m| set_size > m) {
            log::debug!("Skipping gene set '{}' of size {}", name, set_size);
            continue;
        }

        let hits: Vec<usize> = members.into_iter().filter(|&pos| significant[pos]).collect();
        let overlap = hits.len();
        let (p_over, p_under) = hypergeometric_tails(
            overlap as u64,
            population,
            set_size as u64,
            n_significant as u64,
        )?;

        let mut genes: Vec<String> = hits
            .iter()
            .map(|&pos| results.gene_ids[universe.rows[pos]].clone())
            .collect();
        genes.sort();

        out.push(OraResult {
            gene_set: name,
            set_size,
            overlap,
            expected: n_significant as f64 * set_size as f64 / population as f64,
            p_over,
            p_under,
            q_value: f64::NAN,
            genes,
        });
    }

    let raw: Vec<f64> = out.iter().map(|r| r.p_over).collect();
    for (r, q) in out.iter_mut().zip(benjamini_hochberg(&raw)) {
        r.q_value = q;
    }
    out.sort_by(|a, b| a.p_over.total_cmp(&b.p_over).then_with(|| a.gene_set.cmp(&b.gene_set)));

    Ok(EnrichmentReport {
        results: out,
        warnings,
    })
}
