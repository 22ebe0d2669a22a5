#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ordered, unique column names of one dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Header {
    columns: Vec<String>,
}

impl Header {
    pub fn new<I, S>(columns: I) -> Result<Self, DatasetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns.into_iter().map(Into::into).collect::<Vec<String>>();
        let mut seen = HashSet::<&str>::with_capacity(columns.len());
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(DatasetError::DuplicateColumn { name: name.clone() });
            }
        }
        Ok(Self { columns })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column == name)
    }

    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }
}

/// One record: column name to text value. Columns without an entry are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    values: BTreeMap<String, String>,
}

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.values.insert(column.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    /// Value for `column`, or the empty string when absent.
    #[must_use]
    pub fn get_or_blank(&self, column: &str) -> &str {
        self.get(column).unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl<K, V> FromIterator<(K, V)> for Row
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(column, value)| (column.into(), value.into()))
                .collect(),
        }
    }
}

/// A header plus its rows in source order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    header: Header,
    rows: Vec<Row>,
}

impl Dataset {
    pub fn new(header: Header, rows: Vec<Row>) -> Result<Self, DatasetError> {
        for (row_idx, row) in rows.iter().enumerate() {
            if let Some(column) = row.columns().find(|column| !header.contains(column)) {
                return Err(DatasetError::UnknownColumn {
                    row: row_idx,
                    column: column.to_owned(),
                });
            }
        }
        Ok(Self { header, rows })
    }

    pub fn from_rows<I, S>(columns: I, rows: Vec<Row>) -> Result<Self, DatasetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Header::new(columns)?, rows)
    }

    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The tuple of a row's key-column values, in key-column order.
///
/// Equality and hashing are component-wise, so values containing the
/// separator token can never collide. [`CompositeKey::encode`] gives a
/// reversible single-string form for display and serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeKey {
    parts: Vec<String>,
}

impl CompositeKey {
    #[must_use]
    pub fn new(parts: Vec<String>) -> Self {
        Self { parts }
    }

    #[must_use]
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Human-readable form used in warnings: components joined by `", "`.
    #[must_use]
    pub fn display(&self) -> String {
        self.parts.join(", ")
    }

    /// Joins the components with `separator`. Backslashes and every
    /// occurrence of the separator's first character inside a component are
    /// backslash-escaped, so the separator only ever appears raw between
    /// components.
    #[must_use]
    pub fn encode(&self, separator: &str) -> String {
        let lead = separator.chars().next();
        let mut out = String::new();
        for (idx, part) in self.parts.iter().enumerate() {
            if idx > 0 {
                out.push_str(separator);
            }
            for ch in part.chars() {
                if ch == '\\' || Some(ch) == lead {
                    out.push('\\');
                }
                out.push(ch);
            }
        }
        out
    }

    /// Inverse of [`CompositeKey::encode`]. An empty input decodes to one
    /// empty component. Separators starting with `\` are not reversible.
    pub fn decode(encoded: &str, separator: &str) -> Result<Self, DatasetError> {
        if separator.is_empty() {
            return Err(DatasetError::EmptySeparator);
        }

        let mut parts = Vec::new();
        let mut current = String::new();
        let mut rest = encoded;
        while let Some(ch) = rest.chars().next() {
            if rest.starts_with(separator) {
                parts.push(std::mem::take(&mut current));
                rest = &rest[separator.len()..];
            } else if ch == '\\' {
                let Some(escaped) = rest[1..].chars().next() else {
                    return Err(DatasetError::InvalidKeyEncoding {
                        encoded: encoded.to_owned(),
                    });
                };
                current.push(escaped);
                rest = &rest[1 + escaped.len_utf8()..];
            } else {
                current.push(ch);
                rest = &rest[ch.len_utf8()..];
            }
        }
        parts.push(current);
        Ok(Self { parts })
    }
}

impl From<Vec<String>> for CompositeKey {
    fn from(parts: Vec<String>) -> Self {
        Self::new(parts)
    }
}

impl From<&[&str]> for CompositeKey {
    fn from(parts: &[&str]) -> Self {
        Self::new(parts.iter().map(|part| (*part).to_owned()).collect())
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DatasetError {
    #[error("column {name:?} appears more than once in the header")]
    DuplicateColumn { name: String },
    #[error("row {row} has column {column:?} which is not in the header")]
    UnknownColumn { row: usize, column: String },
    #[error("composite key separator must not be empty")]
    EmptySeparator,
    #[error("encoded composite key {encoded:?} contains an invalid escape")]
    InvalidKeyEncoding { encoded: String },
}
