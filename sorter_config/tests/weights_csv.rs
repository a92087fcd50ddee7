use std::fs::File;
use std::io::Write;

use rstest::rstest;
use sorter_config::{WeightRow, load_weights_csv, weights_from_rows};
use tempfile::tempdir;

#[rstest]
fn rows_are_ordered_by_channel() {
    let rows = vec![
        WeightRow {
            channel: 1,
            weight: 1.05,
        },
        WeightRow {
            channel: 0,
            weight: 1.0,
        },
    ];
    let w = weights_from_rows(&rows).unwrap();
    assert_eq!(w, vec![1.0, 1.05]);
}

#[rstest]
fn rejects_duplicate_channel() {
    let rows = vec![
        WeightRow {
            channel: 0,
            weight: 1.0,
        },
        WeightRow {
            channel: 0,
            weight: 1.1,
        },
    ];
    let err = weights_from_rows(&rows).expect_err("duplicate channel");
    assert!(format!("{err}").contains("duplicate"));
}

#[rstest]
#[case(0.0)]
#[case(-1.0)]
#[case(f32::NAN)]
fn rejects_non_positive_weight(#[case] weight: f32) {
    let rows = vec![WeightRow { channel: 0, weight }];
    assert!(weights_from_rows(&rows).is_err());
}

#[rstest]
fn rejects_gap_in_channels() {
    let rows = vec![
        WeightRow {
            channel: 0,
            weight: 1.0,
        },
        WeightRow {
            channel: 2,
            weight: 1.0,
        },
    ];
    let err = weights_from_rows(&rows).expect_err("gap");
    assert!(format!("{err}").contains("out of range"));
}

#[rstest]
fn loads_csv_with_strict_headers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("weights.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "channel,weight").unwrap();
    writeln!(f, "0,1.0").unwrap();
    writeln!(f, "1,1.05").unwrap();
    writeln!(f, "2,1.1").unwrap();
    writeln!(f, "3,1.2").unwrap();
    drop(f);

    let w = load_weights_csv(&path).unwrap();
    assert_eq!(w.len(), 4);
    assert!((w[3] - 1.2).abs() < 1e-6);
}

#[rstest]
fn rejects_wrong_headers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("weights.csv");
    std::fs::write(&path, "sensor,factor\n0,1.0\n").unwrap();
    let err = load_weights_csv(&path).expect_err("bad headers");
    assert!(format!("{err}").contains("headers 'channel,weight'"));
}

#[rstest]
fn reports_bad_row_number() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("weights.csv");
    std::fs::write(&path, "channel,weight\n0,1.0\n1,abc\n").unwrap();
    let err = load_weights_csv(&path).expect_err("bad row");
    assert!(format!("{err}").contains("row 3"));
}
