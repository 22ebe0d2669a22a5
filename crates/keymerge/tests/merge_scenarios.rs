use std::io::Write;

use keymerge::{
    CompositeKey, Dataset, FatalSchemaError, InputSource, IssueKind, KeymergeError, MergeError,
    MergeOptions, MergeWarning, Row, merge_datasets, merge_sources, read_csv_str,
    read_json_records_str, write_csv_string,
};

fn csv(input: &str) -> Dataset {
    read_csv_str(input, b',').expect("csv")
}

#[test]
fn matching_user_rows_merge_into_one() {
    let datasets = [
        csv("Username,Dept\na,IT\n"),
        csv("Username,Email\na,a@x\n"),
    ];
    let out = merge_datasets(&datasets, &MergeOptions::new(["Username"])).expect("merge");

    assert_eq!(
        out.table.row(0),
        Some(
            Row::new()
                .with("Username", "a")
                .with("Dept", "IT")
                .with("Email", "a@x")
        )
    );
    assert_eq!(out.table.len(), 1);
    assert!(out.diagnostics.is_empty());
}

#[test]
fn user_missing_from_empty_file_keeps_blank_email() {
    let datasets = [csv("Username,Dept\nb,HR\n"), csv("Username,Email\n")];
    let out = merge_datasets(&datasets, &MergeOptions::new(["Username"])).expect("merge");

    assert_eq!(
        write_csv_string(&out.table, b',').expect("write"),
        "Username,Dept,Email\nb,HR,\n"
    );
    let missing = out
        .diagnostics
        .of_kind(IssueKind::MissingKey)
        .collect::<Vec<_>>();
    assert_eq!(missing.len(), 1);
    assert_eq!(
        missing[0],
        &MergeWarning::MissingKey {
            key: CompositeKey::from(&["b"][..]),
            found_in: vec![1],
            missing_from: vec![2],
        }
    );
    assert_eq!(
        missing[0].to_string(),
        "key \"b\" is only present in dataset(s) 1"
    );
}

#[test]
fn repeated_username_keeps_first_row_only() {
    let datasets = [
        csv("Username,Dept\ndup,IT\ndup,HR\n"),
        csv("Username,Email\ndup,d@x\n"),
    ];
    let out = merge_datasets(&datasets, &MergeOptions::new(["Username"])).expect("merge");

    assert_eq!(out.table.value(0, "Dept"), Some("IT"));
    assert_eq!(
        out.diagnostics.warnings(),
        &[MergeWarning::DuplicateKey {
            dataset: 1,
            key: CompositeKey::from(&["dup"][..]),
        }]
    );
}

#[test]
fn key_only_in_first_dataset_blanks_second_fields() {
    let datasets = [
        csv("id,name,team\n1,ada,core\n2,bob,ops\n"),
        csv("id,email,phone\n1,ada@x,555\n"),
    ];
    let out = merge_datasets(&datasets, &MergeOptions::new(["id"])).expect("merge");

    let rows = out
        .table
        .rows_for_key(&CompositeKey::from(&["2"][..]))
        .collect::<Vec<_>>();
    assert_eq!(rows, vec![&["2", "bob", "ops", "", ""].map(str::to_owned)[..]]);
    assert!(matches!(
        out.diagnostics.warnings(),
        [MergeWarning::MissingKey { missing_from, .. }] if missing_from == &[2]
    ));
}

#[test]
fn duplicate_expansion_emits_longest_bucket() {
    let datasets = [
        csv("id,x\nk,x1\nk,x2\n"),
        csv("id,y\nk,y1\nk,y2\nk,y3\nk,y4\n"),
        csv("id,z\nk,z1\n"),
    ];
    let options = MergeOptions::new(["id"]).with_allow_duplicates(true);
    let out = merge_datasets(&datasets, &options).expect("merge");

    assert_eq!(
        write_csv_string(&out.table, b',').expect("write"),
        "id,x,y,z\nk,x1,y1,z1\nk,x2,y2,\nk,,y3,\nk,,y4,\n"
    );
}

#[test]
fn shared_value_column_aborts_without_output() {
    let datasets = [csv("id,name\n1,a\n"), csv("id,name\n1,b\n")];
    let err = merge_datasets(&datasets, &MergeOptions::new(["id"])).expect_err("must fail");
    assert_eq!(
        err.to_string(),
        "column \"name\" appears in datasets 1 and 2; \
         inputs sharing non-key columns should be concatenated, not merged"
    );
}

#[test]
fn key_values_containing_separator_do_not_collide() {
    let datasets = [
        csv("a,b,left\nx|y,z,L1\nx,y|z,L2\n"),
        csv("a,b,right\nx|y,z,R1\n"),
    ];
    let options = MergeOptions::new(["a", "b"]).with_key_separator("|");
    let out = merge_datasets(&datasets, &options).expect("merge");

    assert_eq!(out.table.len(), 2);
    assert_eq!(out.table.value(0, "right"), Some("R1"));
    assert_eq!(out.table.value(1, "right"), Some(""));
}

#[test]
fn json_and_csv_frames_merge_together_in_memory() {
    let frames = vec![
        read_json_records_str(r#"[{"Username":"a","Dept":"IT"}]"#).expect("json"),
        csv("Username,Email\na,a@x\n"),
    ];
    let out = merge_sources(InputSource::Frames(frames), &MergeOptions::new(["Username"]))
        .expect("merge");
    assert_eq!(out.table.value(0, "Email"), Some("a@x"));
}

#[test]
fn csv_files_with_missing_key_column_report_dataset() {
    let mut first = tempfile::NamedTempFile::new().expect("tmp");
    write!(first, "id,x\n1,a\n").expect("write");
    let mut second = tempfile::NamedTempFile::new().expect("tmp");
    write!(second, "ident,y\n1,b\n").expect("write");

    let source = InputSource::CsvFiles {
        paths: vec![first.path().to_path_buf(), second.path().to_path_buf()],
        delimiter: b',',
    };
    let err = merge_sources(source, &MergeOptions::new(["id"])).expect_err("must fail");
    assert!(matches!(
        err,
        KeymergeError::Merge(MergeError::Schema(FatalSchemaError::MissingKeyColumn {
            dataset: 2,
            ..
        }))
    ));
}
