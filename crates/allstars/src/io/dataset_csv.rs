//! Delimited text reader for labeled tabular datasets.
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use csv::StringRecord;
use ndarray::{Array1, Array2};

use crate::data_handling::Dataset;

/// Configuration for reading a labeled CSV file.
#[derive(Debug, Clone)]
pub struct CsvReaderConfig {
    /// Column holding the target values.
    pub label_column: String,
    pub delimiter: u8,
    /// Optional list of feature columns to load (in order).
    /// When `None`, every column except the label and ignored ones is a feature.
    pub feature_columns: Option<Vec<String>>,
    /// Columns skipped when auto-selecting features.
    pub ignore_columns: Vec<String>,
}

impl Default for CsvReaderConfig {
    fn default() -> Self {
        Self {
            label_column: "label".to_string(),
            delimiter: b',',
            feature_columns: None,
            ignore_columns: Vec::new(),
        }
    }
}

/// Read a comma separated file whose `label_column` holds the target.
pub fn read_dataset_csv<P: AsRef<Path>>(path: P, label_column: &str) -> Result<Dataset> {
    let config = CsvReaderConfig {
        label_column: label_column.to_string(),
        ..CsvReaderConfig::default()
    };
    read_dataset_csv_with_config(path, &config)
}

/// Read a delimited file using a custom configuration.
pub fn read_dataset_csv_with_config<P: AsRef<Path>>(path: P, config: &CsvReaderConfig) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(&path)
        .with_context(|| format!("Failed to open dataset: {}", path.as_ref().display()))?;

    let headers = reader
        .headers()
        .context("Failed to read header row")?
        .clone();

    let label_idx = find_column(&headers, &config.label_column)
        .ok_or_else(|| anyhow!("Missing label column '{}'", config.label_column))?;
    let feature_indices = resolve_feature_indices(&headers, config, label_idx)?;
    if feature_indices.is_empty() {
        return Err(anyhow!("No feature columns detected in header"));
    }

    let mut features = Vec::new();
    let mut labels = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let label = record
            .get(label_idx)
            .ok_or_else(|| anyhow!("Missing label value at row {}", row_idx + 1))?
            .parse::<f64>()
            .with_context(|| format!("Invalid label at row {}", row_idx + 1))?;
        labels.push(label);

        for &idx in &feature_indices {
            let value = record
                .get(idx)
                .ok_or_else(|| anyhow!("Missing feature value at row {}", row_idx + 1))?;
            let parsed = value.parse::<f64>().with_context(|| {
                format!(
                    "Invalid feature '{}' at row {}",
                    headers.get(idx).unwrap_or(""),
                    row_idx + 1
                )
            })?;
            features.push(parsed);
        }
    }
    if labels.is_empty() {
        return Err(anyhow!("Dataset {} has no rows", path.as_ref().display()));
    }

    let x = Array2::from_shape_vec((labels.len(), feature_indices.len()), features)
        .context("Failed to build feature matrix")?;
    let y = Array1::from_vec(labels);
    let feature_names = feature_indices
        .iter()
        .map(|&idx| headers.get(idx).unwrap_or("").to_string())
        .collect();

    log::debug!(
        "Read {} rows x {} features from {}",
        x.nrows(),
        x.ncols(),
        path.as_ref().display()
    );
    Ok(Dataset::new(x, y, feature_names)?)
}

fn find_column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| header.eq_ignore_ascii_case(name))
}

fn resolve_feature_indices(
    headers: &StringRecord,
    config: &CsvReaderConfig,
    label_idx: usize,
) -> Result<Vec<usize>> {
    if let Some(names) = &config.feature_columns {
        return names
            .iter()
            .map(|name| find_column(headers, name).ok_or_else(|| anyhow!("Missing feature column '{}'", name)))
            .collect();
    }
    Ok((0..headers.len())
        .filter(|&idx| idx != label_idx)
        .filter(|&idx| {
            let name = headers.get(idx).unwrap_or("");
            !config
                .ignore_columns
                .iter()
                .any(|ignored| ignored.eq_ignore_ascii_case(name))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn label_column_can_sit_anywhere() {
        let file = write("a,Target,b\n1.0,0,2.5\n3.0,1,4.5\n");
        let data = read_dataset_csv(file.path(), "target").unwrap();
        assert_eq!(data.feature_names, vec!["a", "b"]);
        assert_eq!(data.x.row(1).to_vec(), vec![3.0, 4.5]);
        assert_eq!(data.y.to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn non_numeric_cells_name_the_row() {
        let file = write("a,label\n1.0,0\nabc,1\n");
        let err = read_dataset_csv(file.path(), "label").unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn ignored_and_explicit_columns() {
        let file = write("id\tx\ty\tlabel\n7\t1\t2\t0\n8\t3\t4\t1\n");
        let config = CsvReaderConfig {
            label_column: "label".into(),
            delimiter: b'\t',
            ignore_columns: vec!["id".into()],
            ..CsvReaderConfig::default()
        };
        let data = read_dataset_csv_with_config(file.path(), &config).unwrap();
        assert_eq!(data.feature_names, vec!["x", "y"]);

        let config = CsvReaderConfig {
            feature_columns: Some(vec!["y".into()]),
            ..config
        };
        let data = read_dataset_csv_with_config(file.path(), &config).unwrap();
        assert_eq!(data.x.column(0).to_vec(), vec![2.0, 4.0]);
    }
}
