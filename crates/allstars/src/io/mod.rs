//! Dataset readers.
pub mod dataset_csv;

pub use dataset_csv::{read_dataset_csv, read_dataset_csv_with_config, CsvReaderConfig};
