//! Tab-delimited writers for result tables

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::Array2;

use super::results::{CameraResult, FitResult, OraResult};
use crate::error::{LimmaError, Result};

/// Write differential expression results
pub fn write_results<P: AsRef<Path>>(path: P, results: &FitResult) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "gene_id\tlogFC\tAveExpr\tt\tP.Value\tadj.P.Val")?;
    for i in 0..results.n_genes() {
        writeln!(
            out,
            "{}\t{:.6}\t{:.6}\t{:.6}\t{:.6e}\t{:.6e}",
            results.gene_ids[i],
            results.log_fold_changes[i],
            results.ave_expr[i],
            results.t[i],
            results.p_values[i],
            results.adj_p_values[i],
        )?;
    }
    out.flush()?;
    Ok(())
}

/// Write over-representation results keyed by gene-set name
pub fn write_ora_results<P: AsRef<Path>>(path: P, results: &[OraResult]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "gene_set\tset_size\toverlap\texpected\tp_over\tp_under\tq_value\tgenes")?;
    for r in results {
        writeln!(
            out,
            "{}\t{}\t{}\t{:.4}\t{:.6e}\t{:.6e}\t{:.6e}\t{}",
            r.gene_set,
            r.set_size,
            r.overlap,
            r.expected,
            r.p_over,
            r.p_under,
            r.q_value,
            r.genes.join(",")
        )?;
    }
    out.flush()?;
    Ok(())
}

/// Write competitive rank test results keyed by gene-set name
pub fn write_camera_results<P: AsRef<Path>>(path: P, results: &[CameraResult]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "gene_set\tset_size\tcorrelation\tdirection\tp_value\tq_value")?;
    for r in results {
        writeln!(
            out,
            "{}\t{}\t{:.4}\t{}\t{:.6e}\t{:.6e}",
            r.gene_set, r.set_size, r.correlation, r.direction, r.p_value, r.q_value
        )?;
    }
    out.flush()?;
    Ok(())
}

/// Write a genes x samples matrix with gene ids as the first column
pub fn write_matrix<P: AsRef<Path>>(
    path: P,
    gene_ids: &[String],
    sample_ids: &[String],
    values: &Array2<f64>,
) -> Result<()> {
    if values.dim() != (gene_ids.len(), sample_ids.len()) {
        return Err(LimmaError::DimensionMismatch {
            expected: format!("{} x {}", gene_ids.len(), sample_ids.len()),
            got: format!("{:?}", values.dim()),
        });
    }
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "gene_id\t{}", sample_ids.join("\t"))?;
    for (gene, row) in gene_ids.iter().zip(values.outer_iter()) {
        let fields: Vec<String> = row.iter().map(|v| format!("{:.6}", v)).collect();
        writeln!(out, "{}\t{}", gene, fields.join("\t"))?;
    }
    out.flush()?;
    Ok(())
}
