#![no_main]

use keymerge::{MergeOptions, merge_datasets, read_csv_str};
use libfuzzer_sys::fuzz_target;

// Input is two CSV documents separated by a NUL byte, merged on their first
// header column.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Some((left, right)) = text.split_once('\0') else {
        return;
    };
    let (Ok(left), Ok(right)) = (read_csv_str(left, b','), read_csv_str(right, b',')) else {
        return;
    };
    let Some(key) = left.header().columns().first().cloned() else {
        return;
    };

    for allow in [false, true] {
        let options = MergeOptions::new([key.clone()]).with_allow_duplicates(allow);
        if let Ok(out) = merge_datasets(&[left.clone(), right.clone()], &options) {
            let width = out.table.header().len();
            assert!(out.table.rows().iter().all(|row| row.len() == width));
        }
    }
});
