#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::fmt;

use km_types::CompositeKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default composite-key separator: unit separators around a pipe, which
/// does not occur in ordinary delimited text.
pub const DEFAULT_KEY_SEPARATOR: &str = "\u{1f}|\u{1f}";

pub const DEFAULT_DELIMITER: u8 = b',';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the first row per key; later rows are dropped with a warning.
    #[default]
    KeepFirst,
    /// Keep every row per key in encounter order.
    AllowDuplicates,
}

impl DuplicatePolicy {
    #[must_use]
    pub fn from_allow_duplicates(allow: bool) -> Self {
        if allow {
            Self::AllowDuplicates
        } else {
            Self::KeepFirst
        }
    }

    #[must_use]
    pub fn allows_duplicates(self) -> bool {
        matches!(self, Self::AllowDuplicates)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    pub key_columns: Vec<String>,
    pub delimiter: u8,
    pub key_separator: String,
    pub allow_duplicates: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            key_columns: Vec::new(),
            delimiter: DEFAULT_DELIMITER,
            key_separator: DEFAULT_KEY_SEPARATOR.to_owned(),
            allow_duplicates: false,
        }
    }
}

impl MergeOptions {
    pub fn new<I, S>(key_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key_columns: key_columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    #[must_use]
    pub fn with_key_separator(mut self, separator: impl Into<String>) -> Self {
        self.key_separator = separator.into();
        self
    }

    #[must_use]
    pub fn with_allow_duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }

    #[must_use]
    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        DuplicatePolicy::from_allow_duplicates(self.allow_duplicates)
    }

    pub fn from_json_str(input: &str) -> Result<Self, OptionsError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.key_columns.is_empty() {
            return Err(OptionsError::NoKeyColumns);
        }
        let mut seen = HashSet::<&str>::with_capacity(self.key_columns.len());
        for column in &self.key_columns {
            if !seen.insert(column.as_str()) {
                return Err(OptionsError::RepeatedKeyColumn {
                    column: column.clone(),
                });
            }
        }
        if self.key_separator.is_empty() {
            return Err(OptionsError::EmptySeparator);
        }
        if self.key_separator.starts_with('\\') {
            return Err(OptionsError::EscapeSeparator);
        }
        if matches!(self.delimiter, b'"' | b'\n' | b'\r') {
            return Err(OptionsError::InvalidDelimiter {
                delimiter: char::from(self.delimiter),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("at least one key column is required")]
    NoKeyColumns,
    #[error("key column {column:?} is listed more than once")]
    RepeatedKeyColumn { column: String },
    #[error("composite key separator must not be empty")]
    EmptySeparator,
    #[error("composite key separator must not start with a backslash")]
    EscapeSeparator,
    #[error("delimiter {delimiter:?} cannot be used for delimited text")]
    InvalidDelimiter { delimiter: char },
    #[error("at least two datasets are required, got {count}")]
    TooFewDatasets { count: usize },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    DuplicateKey,
    MissingKey,
}

/// Non-fatal findings produced while indexing and cross-referencing.
/// Dataset numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeWarning {
    DuplicateKey {
        dataset: usize,
        key: CompositeKey,
    },
    MissingKey {
        key: CompositeKey,
        found_in: Vec<usize>,
        missing_from: Vec<usize>,
    },
}

impl MergeWarning {
    #[must_use]
    pub fn kind(&self) -> IssueKind {
        match self {
            Self::DuplicateKey { .. } => IssueKind::DuplicateKey,
            Self::MissingKey { .. } => IssueKind::MissingKey,
        }
    }

    #[must_use]
    pub fn key(&self) -> &CompositeKey {
        match self {
            Self::DuplicateKey { key, .. } | Self::MissingKey { key, .. } => key,
        }
    }
}

impl fmt::Display for MergeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateKey { dataset, key } => write!(
                f,
                "duplicate key \"{key}\" in dataset {dataset}; only the first row is kept"
            ),
            Self::MissingKey { key, found_in, .. } => {
                let found = found_in
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "key \"{key}\" is only present in dataset(s) {found}")
            }
        }
    }
}

/// Ordered side-channel of warnings for one merge.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsLedger {
    warnings: Vec<MergeWarning>,
}

impl DiagnosticsLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
        }
    }

    pub fn push(&mut self, warning: MergeWarning) {
        self.warnings.push(warning);
    }

    #[must_use]
    pub fn warnings(&self) -> &[MergeWarning] {
        &self.warnings
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn of_kind(&self, kind: IssueKind) -> impl Iterator<Item = &MergeWarning> {
        self.warnings
            .iter()
            .filter(move |warning| warning.kind() == kind)
    }

    /// Flat export rows with keys encoded as single strings.
    #[must_use]
    pub fn to_records(&self, key_separator: &str) -> Vec<DiagnosticRecord> {
        self.warnings
            .iter()
            .map(|warning| {
                let (dataset, found_in, missing_from) = match warning {
                    MergeWarning::DuplicateKey { dataset, .. } => {
                        (Some(*dataset), Vec::new(), Vec::new())
                    }
                    MergeWarning::MissingKey {
                        found_in,
                        missing_from,
                        ..
                    } => (None, found_in.clone(), missing_from.clone()),
                };
                DiagnosticRecord {
                    kind: warning.kind(),
                    key: warning.key().encode(key_separator),
                    dataset,
                    found_in,
                    missing_from,
                    message: warning.to_string(),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub kind: IssueKind,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub found_in: Vec<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_from: Vec<usize>,
    pub message: String,
}
