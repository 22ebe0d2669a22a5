#![forbid(unsafe_code)]

use std::collections::HashMap;

use km_runtime::{DiagnosticsLedger, DuplicatePolicy, MergeWarning};
use km_types::{CompositeKey, Dataset, Row};

/// Reads the key columns of `row` in order. Absent values become `""`.
#[must_use]
pub fn extract_key(row: &Row, key_columns: &[String]) -> CompositeKey {
    CompositeKey::new(
        key_columns
            .iter()
            .map(|column| row.get_or_blank(column).to_owned())
            .collect(),
    )
}

/// Key → bucket lookup for one dataset. Rows are borrowed from the dataset.
#[derive(Debug, Clone)]
pub struct DatasetIndex<'a> {
    position: usize,
    non_key_columns: Vec<String>,
    keys: Vec<CompositeKey>,
    buckets: HashMap<CompositeKey, Vec<&'a Row>>,
}

impl<'a> DatasetIndex<'a> {
    /// Groups `dataset` rows by composite key in source order.
    ///
    /// `position` is the 0-based dataset position; warnings report it
    /// 1-based. Under [`DuplicatePolicy::KeepFirst`] every repeated key
    /// pushes a [`MergeWarning::DuplicateKey`] and the row is dropped.
    pub fn build(
        position: usize,
        dataset: &'a Dataset,
        key_columns: &[String],
        policy: DuplicatePolicy,
        ledger: &mut DiagnosticsLedger,
    ) -> Self {
        let non_key_columns = dataset
            .header()
            .iter()
            .filter(|column| !key_columns.iter().any(|key| key.as_str() == *column))
            .map(str::to_owned)
            .collect();

        let mut keys = Vec::new();
        let mut buckets = HashMap::<CompositeKey, Vec<&'a Row>>::with_capacity(dataset.len());
        for row in dataset.rows() {
            let key = extract_key(row, key_columns);
            match buckets.get_mut(&key) {
                Some(bucket) if policy.allows_duplicates() => bucket.push(row),
                Some(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(dataset = position + 1, key = %key, "dropping duplicate key row");
                    ledger.push(MergeWarning::DuplicateKey {
                        dataset: position + 1,
                        key,
                    });
                }
                None => {
                    keys.push(key.clone());
                    buckets.insert(key, vec![row]);
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            dataset = position + 1,
            rows = dataset.len(),
            keys = keys.len(),
            "indexed dataset"
        );

        Self {
            position,
            non_key_columns,
            keys,
            buckets,
        }
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn non_key_columns(&self) -> &[String] {
        &self.non_key_columns
    }

    /// Keys in first-encounter order.
    #[must_use]
    pub fn keys(&self) -> &[CompositeKey] {
        &self.keys
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn contains_key(&self, key: &CompositeKey) -> bool {
        self.buckets.contains_key(key)
    }

    #[must_use]
    pub fn bucket(&self, key: &CompositeKey) -> Option<&[&'a Row]> {
        self.buckets.get(key).map(Vec::as_slice)
    }

    /// Values of `column` across the key's bucket, blank where absent.
    #[must_use]
    pub fn column_values(&self, key: &CompositeKey, column: &str) -> Option<Vec<String>> {
        self.bucket(key).map(|rows| {
            rows.iter()
                .map(|row| row.get_or_blank(column).to_owned())
                .collect()
        })
    }

    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        self.buckets.values().any(|bucket| bucket.len() > 1)
    }
}
