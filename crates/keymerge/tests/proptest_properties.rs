#![forbid(unsafe_code)]

//! Property tests for the merge engine: every key seen in any input comes
//! out the expected number of times, and composite key encoding is
//! reversible.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use keymerge::{CompositeKey, Dataset, MergeOptions, Row, merge_datasets};

/// Key values drawn from a tiny alphabet so datasets overlap and repeat.
fn arb_keys(max_len: usize) -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-d]", 0..=max_len)
}

/// 2..=4 key lists, one per dataset.
fn arb_dataset_keys() -> impl Strategy<Value = Vec<Vec<String>>> {
    proptest::collection::vec(arb_keys(8), 2..=4)
}

fn build_datasets(per_dataset: &[Vec<String>]) -> Vec<Dataset> {
    per_dataset
        .iter()
        .enumerate()
        .map(|(pos, keys)| {
            let column = format!("c{pos}");
            let rows = keys
                .iter()
                .enumerate()
                .map(|(row, key)| {
                    Row::new()
                        .with("id", key.clone())
                        .with(column.clone(), format!("{pos}:{row}"))
                })
                .collect();
            Dataset::from_rows(["id".to_owned(), column], rows).expect("dataset")
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Single-row mode emits each distinct key exactly once.
    #[test]
    fn prop_every_key_appears_once(per_dataset in arb_dataset_keys()) {
        let datasets = build_datasets(&per_dataset);
        let out = merge_datasets(&datasets, &MergeOptions::new(["id"])).expect("merge");

        let expected = per_dataset.iter().flatten().cloned().collect::<BTreeSet<_>>();
        let mut counts = BTreeMap::<String, usize>::new();
        for row in out.table.rows() {
            *counts.entry(row[0].clone()).or_default() += 1;
        }
        prop_assert_eq!(counts.keys().cloned().collect::<BTreeSet<_>>(), expected);
        prop_assert!(counts.values().all(|&count| count == 1));
    }

    /// Duplicate mode emits max-bucket-length rows per key.
    #[test]
    fn prop_duplicate_mode_emits_max_bucket_rows(per_dataset in arb_dataset_keys()) {
        let datasets = build_datasets(&per_dataset);
        let options = MergeOptions::new(["id"]).with_allow_duplicates(true);
        let out = merge_datasets(&datasets, &options).expect("merge");

        let mut expected = BTreeMap::<String, usize>::new();
        for keys in &per_dataset {
            let mut local = BTreeMap::<&str, usize>::new();
            for key in keys {
                *local.entry(key).or_default() += 1;
            }
            for (key, count) in local {
                let slot = expected.entry(key.to_owned()).or_default();
                *slot = (*slot).max(count);
            }
        }

        let mut counts = BTreeMap::<String, usize>::new();
        for row in out.table.rows() {
            *counts.entry(row[0].clone()).or_default() += 1;
        }
        prop_assert_eq!(counts, expected);
        let only_missing_keys = out
            .diagnostics
            .warnings()
            .iter()
            .all(|w| matches!(w, keymerge::MergeWarning::MissingKey { .. }));
        prop_assert!(only_missing_keys);
    }

    /// Each output value comes from a row carrying the same key.
    #[test]
    fn prop_values_never_cross_keys(per_dataset in arb_dataset_keys()) {
        let datasets = build_datasets(&per_dataset);
        let out = merge_datasets(&datasets, &MergeOptions::new(["id"])).expect("merge");

        for row in out.table.rows() {
            for (pos, value) in row.iter().enumerate().skip(1) {
                if value.is_empty() {
                    continue;
                }
                let (dataset, source_row) = value.split_once(':').expect("tagged value");
                let dataset: usize = dataset.parse().expect("dataset");
                let source_row: usize = source_row.parse().expect("row");
                prop_assert_eq!(dataset, pos - 1);
                prop_assert_eq!(&per_dataset[dataset][source_row], &row[0]);
            }
        }
    }

    /// Encoding with any non-empty separator decodes to the same key.
    #[test]
    fn prop_key_encoding_round_trips(
        parts in proptest::collection::vec("[a-c|\\\\]{0,4}", 1..4),
        separator in prop_oneof![Just("|"), Just("||"), Just("\u{1f}|\u{1f}")],
    ) {
        let key = CompositeKey::new(parts);
        let decoded = CompositeKey::decode(&key.encode(separator), separator).expect("decode");
        prop_assert_eq!(decoded, key);
    }
}
