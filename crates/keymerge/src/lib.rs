#![forbid(unsafe_code)]

//! Merge two or more tabular datasets that share key columns into one
//! full-outer union.
//!
//! ```no_run
//! use keymerge::{InputSource, MergeOptions, merge_sources};
//!
//! let source = InputSource::CsvFiles {
//!     paths: vec!["users.csv".into(), "emails.csv".into()],
//!     delimiter: b',',
//! };
//! let outcome = merge_sources(source, &MergeOptions::new(["Username"]))?;
//! for warning in outcome.diagnostics.warnings() {
//!     eprintln!("{warning}");
//! }
//! # Ok::<(), keymerge::KeymergeError>(())
//! ```

use std::fs;
use std::path::Path;

pub use km_index::{DatasetIndex, extract_key};
pub use km_io::{
    InputSource, IoError, load_datasets, read_csv_path, read_csv_str, read_json_records_path,
    read_json_records_str, write_csv_string, write_json_records_string,
};
pub use km_join::{
    CrossReference, FatalSchemaError, MergeError, MergeOutcome, MergedRecord, MergedTable,
    cross_reference, materialize, merge_datasets, report_missing_keys, union_non_key_columns,
    validate_headers,
};
pub use km_runtime::{
    DEFAULT_DELIMITER, DEFAULT_KEY_SEPARATOR, DiagnosticRecord, DiagnosticsLedger,
    DuplicatePolicy, IssueKind, MergeOptions, MergeWarning, OptionsError,
};
pub use km_types::{CompositeKey, Dataset, DatasetError, Header, Row};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeymergeError {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    Options(#[from] OptionsError),
}

/// Loads every dataset of `source`, then merges them.
pub fn merge_sources(
    source: InputSource,
    options: &MergeOptions,
) -> Result<MergeOutcome, KeymergeError> {
    options.validate()?;
    let datasets = load_datasets(source)?;
    Ok(merge_datasets(&datasets, options)?)
}

/// Reads a JSON `MergeOptions` document.
pub fn load_options(path: &Path) -> Result<MergeOptions, KeymergeError> {
    let input = fs::read_to_string(path).map_err(IoError::from)?;
    Ok(MergeOptions::from_json_str(&input)?)
}
