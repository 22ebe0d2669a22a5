#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use km_join::MergedTable;
use km_types::{Dataset, DatasetError, Header, Row};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("csv input has no headers")]
    MissingHeaders,
    #[error("json input must be an array of objects")]
    NotRecordArray,
    #[error("json record {record} field {field:?} holds a nested value")]
    NestedValue { record: usize, field: String },
    #[error("{}: {source}", path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: Box<IoError>,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

impl IoError {
    fn at(path: &Path, source: IoError) -> Self {
        Self::Path {
            path: path.to_path_buf(),
            source: Box::new(source),
        }
    }
}

/// Where the datasets of one merge come from. Files and frames never mix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    CsvFiles { paths: Vec<PathBuf>, delimiter: u8 },
    JsonFiles { paths: Vec<PathBuf> },
    Frames(Vec<Dataset>),
}

impl InputSource {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::CsvFiles { paths, .. } | Self::JsonFiles { paths } => paths.len(),
            Self::Frames(frames) => frames.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn load_datasets(source: InputSource) -> Result<Vec<Dataset>, IoError> {
    match source {
        InputSource::CsvFiles { paths, delimiter } => paths
            .iter()
            .map(|path| read_csv_path(path, delimiter))
            .collect(),
        InputSource::JsonFiles { paths } => paths
            .iter()
            .map(|path| read_json_records_path(path))
            .collect(),
        InputSource::Frames(frames) => Ok(frames),
    }
}

/// Parses delimited text with a header row. Cells are kept verbatim; short
/// records leave trailing columns absent and surplus fields are ignored.
pub fn read_csv_str(input: &str, delimiter: u8) -> Result<Dataset, IoError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(input.as_bytes());

    let headers = reader.headers().cloned().map_err(IoError::from)?;

    if headers.is_empty() {
        return Err(IoError::MissingHeaders);
    }
    let header = Header::new(headers.iter())?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(header.iter().zip(record.iter()).collect::<Row>());
    }

    Ok(Dataset::new(header, rows)?)
}

pub fn read_csv_path(path: &Path, delimiter: u8) -> Result<Dataset, IoError> {
    fs::read_to_string(path)
        .map_err(IoError::from)
        .and_then(|input| read_csv_str(&input, delimiter))
        .map_err(|err| IoError::at(path, err))
}

/// Parses a JSON array of flat objects. The header lists keys in order of
/// first appearance; `null` leaves a value absent.
pub fn read_json_records_str(input: &str) -> Result<Dataset, IoError> {
    let Value::Array(records) = serde_json::from_str::<Value>(input)? else {
        return Err(IoError::NotRecordArray);
    };

    let mut columns = Vec::<String>::new();
    let mut rows = Vec::with_capacity(records.len());
    for (idx, record) in records.into_iter().enumerate() {
        let Value::Object(fields) = record else {
            return Err(IoError::NotRecordArray);
        };
        for name in fields.keys() {
            if !columns.contains(name) {
                columns.push(name.clone());
            }
        }
        rows.push(json_row(idx, fields)?);
    }

    Ok(Dataset::from_rows(columns, rows)?)
}

fn json_row(idx: usize, fields: Map<String, Value>) -> Result<Row, IoError> {
    let mut row = Row::new();
    for (name, value) in fields {
        match value {
            Value::Null => {}
            Value::String(text) => row.insert(name, text),
            Value::Bool(flag) => row.insert(name, flag.to_string()),
            Value::Number(number) => row.insert(name, number.to_string()),
            Value::Array(_) | Value::Object(_) => {
                return Err(IoError::NestedValue {
                    record: idx,
                    field: name,
                });
            }
        }
    }
    Ok(row)
}

pub fn read_json_records_path(path: &Path) -> Result<Dataset, IoError> {
    fs::read_to_string(path)
        .map_err(IoError::from)
        .and_then(|input| read_json_records_str(&input))
        .map_err(|err| IoError::at(path, err))
}

pub fn write_csv_string(table: &MergedTable, delimiter: u8) -> Result<String, IoError> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());

    writer.write_record(table.header().columns())?;
    for row in table.rows() {
        writer.write_record(row)?;
    }

    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

/// Serializes rows as a JSON array of objects in header order.
pub fn write_json_records_string(table: &MergedTable) -> Result<String, IoError> {
    let records = table
        .rows()
        .iter()
        .map(|row| {
            table
                .header()
                .iter()
                .zip(row)
                .map(|(column, value)| (column.to_owned(), Value::String(value.clone())))
                .collect::<Map<_, _>>()
        })
        .map(Value::Object)
        .collect::<Vec<_>>();
    Ok(serde_json::to_string_pretty(&Value::Array(records))?)
}
