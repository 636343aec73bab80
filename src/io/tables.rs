//! Readers for metadata, replicate maps, annotation tables and gene sets

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::data::{GeneAnnotation, InMemoryAnnotation, SampleMetadata};
use crate::enrichment::GeneSetCollection;
use crate::error::{LimmaError, Result};

/// Delimited-table reader; tab when the header line contains one, else comma
pub(crate) fn table_reader(path: &Path) -> Result<csv::Reader<File>> {
    let mut first_line = String::new();
    BufReader::new(File::open(path)?).read_line(&mut first_line)?;
    if first_line.trim().is_empty() {
        return Err(LimmaError::EmptyData {
            reason: format!("{} is empty", path.display()),
        });
    }
    let delimiter = if first_line.contains('\t') { b'\t' } else { b',' };

    Ok(csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?)
}

/// Read sample metadata.
///
/// First column is the sample id; every other column is a covariate kept
/// as strings.
pub fn read_metadata<P: AsRef<Path>>(path: P) -> Result<SampleMetadata> {
    let mut reader = table_reader(path.as_ref())?;
    let header = reader.headers()?.clone();
    let column_names: Vec<String> = header.iter().skip(1).map(String::from).collect();

    let mut sample_ids = Vec::new();
    let mut columns: Vec<Vec<String>> = vec![Vec::new(); column_names.len()];
    for record in reader.records() {
        let record = record?;
        if record.len() != column_names.len() + 1 {
            return Err(LimmaError::InvalidMetadata {
                reason: format!(
                    "row has {} columns, expected {}",
                    record.len(),
                    column_names.len() + 1
                ),
            });
        }
        sample_ids.push(record[0].to_string());
        for (k, value) in record.iter().skip(1).enumerate() {
            columns[k].push(value.to_string());
        }
    }

    if sample_ids.is_empty() {
        return Err(LimmaError::EmptyData {
            reason: "no samples found in metadata".to_string(),
        });
    }

    let mut metadata = SampleMetadata::new(sample_ids);
    for (name, values) in column_names.iter().zip(columns) {
        metadata.add_column(name, values)?;
    }
    Ok(metadata)
}

/// Read a two-column `run, sample` table mapping technical replicates to
/// biological samples
pub fn read_replicate_map<P: AsRef<Path>>(path: P) -> Result<HashMap<String, String>> {
    let mut reader = table_reader(path.as_ref())?;
    let mut map = HashMap::new();
    for record in reader.records() {
        let record = record?;
        if record.len() < 2 {
            return Err(LimmaError::InvalidMetadata {
                reason: "replicate map rows need a run and a sample column".to_string(),
            });
        }
        if map.insert(record[0].to_string(), record[1].to_string()).is_some() {
            return Err(LimmaError::InvalidMetadata {
                reason: format!("run '{}' listed twice in replicate map", &record[0]),
            });
        }
    }
    Ok(map)
}

/// Read an annotation table with columns `gene_id, symbol, chromosome,
/// external_id`; empty fields are missing values
pub fn read_annotation<P: AsRef<Path>>(path: P) -> Result<InMemoryAnnotation> {
    let mut reader = table_reader(path.as_ref())?;
    let records = reader
        .deserialize::<GeneAnnotation>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    log::info!("Read {} annotation records", records.len());
    Ok(InMemoryAnnotation::new(records))
}

/// Read gene sets from a `.gmt` file (name, description, genes...) or a
/// JSON object mapping set names to gene lists
pub fn read_gene_sets<P: AsRef<Path>>(path: P) -> Result<GeneSetCollection> {
    let path = path.as_ref();
    let is_gmt = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("gmt"));

    let collection = if is_gmt {
        let mut collection = GeneSetCollection::new();
        for line in BufReader::new(File::open(path)?).lines() {
            let line = line?;
            let mut fields = line.split('\t');
            let name = match fields.next() {
                Some(n) if !n.trim().is_empty() => n.trim().to_string(),
                _ => continue,
            };
            let _description = fields.next();
            collection.insert(&name, fields.map(str::trim).filter(|g| !g.is_empty()));
        }
        collection
    } else {
        serde_json::from_reader(BufReader::new(File::open(path)?))?
    };

    log::info!("Read {} gene sets from {}", collection.len(), path.display());
    Ok(collection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AnnotationProvider;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_metadata() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample,group,site").unwrap();
        writeln!(file, "s1,ctrl,A").unwrap();
        writeln!(file, "s2,case,B").unwrap();

        let meta = read_metadata(file.path()).unwrap();
        assert_eq!(meta.n_samples(), 2);
        assert_eq!(meta.column_names(), &["group".to_string(), "site".to_string()]);
        assert_eq!(meta.get_value("site", 1).unwrap(), "B");
    }

    #[test]
    fn test_read_replicate_map() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "run\tsample").unwrap();
        writeln!(file, "r1\tS1").unwrap();
        writeln!(file, "r2\tS1").unwrap();
        let map = read_replicate_map(file.path()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["r2"], "S1");
    }

    #[test]
    fn test_read_annotation_with_missing_fields() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id,symbol,chromosome,external_id").unwrap();
        writeln!(file, "ENSG1,TP53,17,7157").unwrap();
        writeln!(file, "ENSG2,,,").unwrap();
        let table = read_annotation(file.path()).unwrap();
        assert_eq!(table.lookup("ENSG1").unwrap().external_id.as_deref(), Some("7157"));
        assert_eq!(table.lookup("ENSG2").unwrap().external_id, None);
    }

    #[test]
    fn test_read_gene_sets_json_and_gmt() {
        let mut json = NamedTempFile::new().unwrap();
        write!(json, r#"{{"SET_A": ["1", "2"], "SET_B": ["3"]}}"#).unwrap();
        let sets = read_gene_sets(json.path()).unwrap();
        assert_eq!(sets.len(), 2);
        assert!(sets.get("SET_A").unwrap().contains("2"));

        let mut gmt = tempfile::Builder::new().suffix(".gmt").tempfile().unwrap();
        writeln!(gmt, "SET_C\thttp://example.org\t10\t11\t12").unwrap();
        writeln!(gmt, "SET_D\tna\t13").unwrap();
        let sets = read_gene_sets(gmt.path()).unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets.get("SET_C").unwrap().len(), 3);
    }
}
