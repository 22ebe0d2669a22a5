#![forbid(unsafe_code)]

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};

use km_index::DatasetIndex;
use km_runtime::{DiagnosticsLedger, DuplicatePolicy, MergeOptions, MergeWarning, OptionsError};
use km_types::{CompositeKey, Dataset, DatasetError, Header, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header problems that make a merge meaningless. Dataset numbers are 1-based.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FatalSchemaError {
    #[error("dataset {dataset} is missing key column {column:?}")]
    MissingKeyColumn { dataset: usize, column: String },
    #[error(
        "column {column:?} appears in datasets {first_dataset} and {second_dataset}; \
         inputs sharing non-key columns should be concatenated, not merged"
    )]
    SharedColumn {
        column: String,
        first_dataset: usize,
        second_dataset: usize,
    },
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Options(#[from] OptionsError),
    #[error(transparent)]
    Schema(#[from] FatalSchemaError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

fn is_key_column(key_columns: &[String], column: &str) -> bool {
    key_columns.iter().any(|key| key == column)
}

/// Checks every header carries all key columns, then that no non-key column
/// is owned by more than one dataset.
pub fn validate_headers(
    headers: &[&Header],
    key_columns: &[String],
) -> Result<(), FatalSchemaError> {
    for (pos, header) in headers.iter().enumerate() {
        if let Some(column) = key_columns.iter().find(|column| !header.contains(column)) {
            return Err(FatalSchemaError::MissingKeyColumn {
                dataset: pos + 1,
                column: column.clone(),
            });
        }
    }

    let mut owners = HashMap::<&str, usize>::new();
    for (pos, header) in headers.iter().enumerate() {
        for column in header.iter().filter(|c| !is_key_column(key_columns, c)) {
            match owners.entry(column) {
                Entry::Occupied(owner) => {
                    return Err(FatalSchemaError::SharedColumn {
                        column: column.to_owned(),
                        first_dataset: owner.get() + 1,
                        second_dataset: pos + 1,
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(pos);
                }
            }
        }
    }

    Ok(())
}

/// Non-key columns of all indexes, dataset order then header order.
#[must_use]
pub fn union_non_key_columns(indexes: &[DatasetIndex<'_>]) -> Vec<String> {
    let mut seen = HashSet::<&str>::new();
    let mut columns = Vec::new();
    for index in indexes {
        for column in index.non_key_columns() {
            if seen.insert(column.as_str()) {
                columns.push(column.clone());
            }
        }
    }
    columns
}

/// All values contributed for one key, one slot per union column.
/// An empty slot means no dataset contributed that column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedRecord {
    key: CompositeKey,
    fields: Vec<Option<Vec<String>>>,
}

impl MergedRecord {
    fn empty(key: CompositeKey, width: usize) -> Self {
        Self {
            key,
            fields: vec![None; width],
        }
    }

    #[must_use]
    pub fn key(&self) -> &CompositeKey {
        &self.key
    }

    #[must_use]
    pub fn field(&self, slot: usize) -> Option<&[String]> {
        self.fields.get(slot)?.as_deref()
    }

    #[must_use]
    pub fn fields(&self) -> &[Option<Vec<String>>] {
        &self.fields
    }

    /// Longest contributed bucket, never less than 1.
    #[must_use]
    pub fn max_duplicate_count(&self) -> usize {
        self.fields
            .iter()
            .flatten()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .max(1)
    }

    /// First writer wins: an occupied slot is left untouched.
    fn fill(&mut self, slot: usize, values: Vec<String>) -> bool {
        match self.fields.get_mut(slot) {
            Some(field) if field.is_none() => {
                *field = Some(values);
                true
            }
            _ => false,
        }
    }
}

/// Result of checking every dataset against every other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossReference {
    columns: Vec<String>,
    dataset_count: usize,
    records: Vec<MergedRecord>,
    positions: HashMap<CompositeKey, usize>,
    missing: HashMap<CompositeKey, BTreeSet<usize>>,
}

impl CrossReference {
    /// Union of non-key columns; record slots follow this order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Records in first-appearance order (dataset order, then row order).
    #[must_use]
    pub fn records(&self) -> &[MergedRecord] {
        &self.records
    }

    #[must_use]
    pub fn record(&self, key: &CompositeKey) -> Option<&MergedRecord> {
        self.positions.get(key).map(|&pos| &self.records[pos])
    }

    /// 0-based positions of datasets the key was looked up in and not found in.
    #[must_use]
    pub fn missing_from(&self, key: &CompositeKey) -> Option<&BTreeSet<usize>> {
        self.missing.get(key)
    }

    /// 0-based positions of datasets holding the key: every position not in
    /// its missing set.
    #[must_use]
    pub fn found_in(&self, key: &CompositeKey) -> Vec<usize> {
        let missing = self.missing.get(key);
        (0..self.dataset_count)
            .filter(|pos| missing.is_none_or(|set| !set.contains(pos)))
            .collect()
    }
}

fn contribute(
    record: &mut MergedRecord,
    source: &DatasetIndex<'_>,
    key: &CompositeKey,
    slots: &HashMap<&str, usize>,
) {
    for column in source.non_key_columns() {
        let Some(&slot) = slots.get(column.as_str()) else {
            continue;
        };
        if record.field(slot).is_some() {
            continue;
        }
        if let Some(values) = source.column_values(key, column) {
            record.fill(slot, values);
        }
    }
}

/// Pairwise full-outer cross-referencing over `indexes`, which must be in
/// dataset order.
///
/// For each ordered pair `(a, b)` of distinct datasets and each key of `a`:
/// when `b` holds the key its columns are contributed, otherwise `a`'s own
/// columns are contributed and `b` joins the key's missing set. Needs at
/// least two indexes to produce records.
#[must_use]
pub fn cross_reference(indexes: &[DatasetIndex<'_>]) -> CrossReference {
    let columns = union_non_key_columns(indexes);
    let slots = columns
        .iter()
        .enumerate()
        .map(|(slot, column)| (column.as_str(), slot))
        .collect::<HashMap<_, _>>();

    let mut records = Vec::<MergedRecord>::new();
    let mut positions = HashMap::<CompositeKey, usize>::new();
    let mut missing = HashMap::<CompositeKey, BTreeSet<usize>>::new();

    for (origin_pos, origin) in indexes.iter().enumerate() {
        for (target_pos, target) in indexes.iter().enumerate() {
            if origin_pos == target_pos {
                continue;
            }
            for key in origin.keys() {
                let record_pos = *positions.entry(key.clone()).or_insert_with(|| {
                    records.push(MergedRecord::empty(key.clone(), columns.len()));
                    records.len() - 1
                });

                let source = if target.contains_key(key) {
                    target
                } else {
                    missing.entry(key.clone()).or_default().insert(target_pos);
                    origin
                };
                contribute(&mut records[record_pos], source, key, &slots);
            }
        }
    }

    CrossReference {
        dataset_count: indexes.len(),
        columns,
        records,
        positions,
        missing,
    }
}

/// Pushes one missing-key warning per key absent from at least one dataset,
/// in record order.
pub fn report_missing_keys(cross_reference: &CrossReference, ledger: &mut DiagnosticsLedger) {
    for record in cross_reference.records() {
        let key = record.key();
        let Some(missing) = cross_reference.missing_from(key) else {
            continue;
        };
        if missing.is_empty() {
            continue;
        }

        let found_in = cross_reference
            .found_in(key)
            .into_iter()
            .map(|pos| pos + 1)
            .collect::<Vec<_>>();
        let missing_from = missing.iter().map(|pos| pos + 1).collect::<Vec<_>>();

        #[cfg(feature = "tracing")]
        tracing::warn!(key = %key, ?found_in, ?missing_from, "key missing from some datasets");

        ledger.push(MergeWarning::MissingKey {
            key: key.clone(),
            found_in,
            missing_from,
        });
    }
}

/// Flattened merge output: key columns then non-key columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedTable {
    header: Header,
    rows: Vec<Vec<String>>,
}

impl MergedTable {
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
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

    #[must_use]
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.header.position(column)?;
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    /// Row `idx` as a column → value mapping.
    #[must_use]
    pub fn row(&self, idx: usize) -> Option<Row> {
        let values = self.rows.get(idx)?;
        Some(self.header.iter().zip(values.iter().map(String::as_str)).collect())
    }

    /// Rows whose key columns equal `key`, in output order.
    pub fn rows_for_key<'t, 'k>(
        &'t self,
        key: &'k CompositeKey,
    ) -> impl Iterator<Item = &'t [String]> + use<'t, 'k> {
        self.rows
            .iter()
            .filter(move |row| row.len() >= key.len() && row[..key.len()] == *key.parts())
            .map(Vec::as_slice)
    }
}

/// Emits one row per record under [`DuplicatePolicy::KeepFirst`], or
/// `max_duplicate_count` rows per record under
/// [`DuplicatePolicy::AllowDuplicates`]. Buckets of different columns are
/// zipped by position only; row `i` of a key does not imply its values came
/// from one source row.
pub fn materialize(
    cross_reference: &CrossReference,
    key_columns: &[String],
    policy: DuplicatePolicy,
) -> Result<MergedTable, MergeError> {
    let header = Header::new(key_columns.iter().chain(cross_reference.columns()).cloned())?;

    let mut rows = Vec::with_capacity(cross_reference.records().len());
    for record in cross_reference.records() {
        let copies = if policy.allows_duplicates() {
            record.max_duplicate_count()
        } else {
            1
        };
        for i in 0..copies {
            let mut row = Vec::with_capacity(header.len());
            row.extend(record.key().parts().iter().cloned());
            row.extend(record.fields().iter().map(|slot| {
                slot.as_ref()
                    .and_then(|values| values.get(i))
                    .cloned()
                    .unwrap_or_default()
            }));
            rows.push(row);
        }
    }

    Ok(MergedTable { header, rows })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub table: MergedTable,
    pub diagnostics: DiagnosticsLedger,
}

/// Validate, index, cross-reference, report, and materialize.
///
/// Fails before any indexing when options or headers are invalid; otherwise
/// always produces a table, with duplicate-key warnings (in encounter order)
/// ahead of missing-key warnings in the returned ledger.
pub fn merge_datasets(
    datasets: &[Dataset],
    options: &MergeOptions,
) -> Result<MergeOutcome, MergeError> {
    options.validate()?;
    if datasets.len() < 2 {
        return Err(OptionsError::TooFewDatasets {
            count: datasets.len(),
        }
        .into());
    }

    let headers = datasets.iter().map(Dataset::header).collect::<Vec<_>>();
    validate_headers(&headers, &options.key_columns)?;

    let policy = options.duplicate_policy();
    let mut diagnostics = DiagnosticsLedger::new();
    let indexes = datasets
        .iter()
        .enumerate()
        .map(|(pos, dataset)| {
            DatasetIndex::build(pos, dataset, &options.key_columns, policy, &mut diagnostics)
        })
        .collect::<Vec<_>>();

    let cross_reference = cross_reference(&indexes);
    report_missing_keys(&cross_reference, &mut diagnostics);
    let table = materialize(&cross_reference, &options.key_columns, policy)?;

    #[cfg(feature = "tracing")]
    tracing::info!(
        datasets = datasets.len(),
        keys = cross_reference.records().len(),
        rows = table.len(),
        warnings = diagnostics.len(),
        "merge complete"
    );

    Ok(MergeOutcome { table, diagnostics })
}
