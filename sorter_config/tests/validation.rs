use rstest::rstest;
use sorter_config::{
    Config, OutletRecord, OutletSource, default_outlets, encode_outlet_image, load_toml,
    resolve_outlets,
};

fn reject(toml: &str, needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("config should be rejected");
    assert!(
        format!("{err}").contains(needle),
        "expected '{needle}' in '{err}'"
    );
}

#[test]
fn empty_document_uses_defaults_and_validates() {
    let cfg = load_toml("").expect("parse empty TOML");
    cfg.validate().expect("defaults are valid");
    assert_eq!(cfg.encoder.steps_per_cycle, 200);
    assert_eq!(cfg.queue.length, 19);
    assert_eq!(cfg.scanner.weights.len(), 4);
    assert_eq!(cfg.phases.diameter_finalize, 150);
}

#[test]
fn full_document_parses() {
    let toml = r#"
[encoder]
steps_per_cycle = 100

[phases]
scan_start = 0
outlet_reset = 40
diameter_finalize = 70
outlet_commit = 90

[scanner]
weights = [1.0, 1.0, 1.0]
min_valid_width = 2
units_per_mm = 1

[queue]
length = 31

[[outlets]]
min_mm = 0
max_mm = 255
offset = 1

[[outlets]]
min_mm = 20
max_mm = 255
offset = 12
closed_angle = 10
open_angle = 100

[pins]
encoder_a = 17
encoder_b = 27
encoder_index = 22
sensors = [5, 6, 13]
outlets = [12, 16]
"#;
    let cfg = load_toml(toml).expect("parse");
    cfg.validate().expect("valid");
    assert_eq!(cfg.outlets.len(), 2);
    assert_eq!(cfg.outlets[0].open_angle, 90);
    assert_eq!(cfg.outlets[1].closed_angle, 10);
}

#[rstest]
#[case("[encoder]\nsteps_per_cycle = 2\n", "steps_per_cycle must be >= 4")]
#[case("[phases]\noutlet_commit = 200\n", "phases.outlet_commit must be <")]
#[case("[phases]\nscan_start = 100\n", "must differ")]
#[case("[scanner]\nweights = []\n", "1..=8 entries")]
#[case("[scanner]\nweights = [1.0, -0.5]\n", "positive finite")]
#[case("[scanner]\nunits_per_mm = 0\n", "units_per_mm must be >= 1")]
#[case("[queue]\nlength = 1\n", "queue.length")]
#[case("[simulation]\nstep_hz = 0\n", "step_hz must be > 0")]
#[case("[logging]\nrotation = \"weekly\"\n", "logging.rotation")]
#[case("[pins]\nsensors = [1, 2]\n", "one pin per scanner weight")]
fn rejects_invalid_values(#[case] toml: &str, #[case] needle: &str) {
    reject(toml, needle);
}

#[rstest]
#[case("[[outlets]]\nmin_mm = 20\nmax_mm = 20\noffset = 1\n", "min_mm must be < max_mm")]
#[case("[[outlets]]\nmin_mm = 1\nmax_mm = 20\noffset = 0\n", "offset must be in [1, 19]")]
#[case("[[outlets]]\nmin_mm = 1\nmax_mm = 20\noffset = 20\n", "offset must be in [1, 19]")]
#[case(
    "[[outlets]]\nmin_mm = 1\nmax_mm = 20\noffset = 2\nopen_angle = 200\n",
    "angles must be <= 180"
)]
fn rejects_invalid_outlets(#[case] toml: &str, #[case] needle: &str) {
    reject(toml, needle);
}

#[test]
fn outlet_resolution_prefers_config_then_store_then_defaults() {
    let mut cfg = Config::default();
    let stored = vec![OutletRecord {
        min_mm: 5,
        max_mm: 9,
        offset: 3,
        closed_angle: 0,
        open_angle: 45,
    }];
    let image = encode_outlet_image(&stored);

    let (table, src) = resolve_outlets(&cfg, Some(&image));
    assert_eq!(src, OutletSource::Store);
    assert_eq!(table, stored);

    let (table, src) = resolve_outlets(&cfg, Some(&[0x00, 0x01]));
    assert_eq!(src, OutletSource::Defaults);
    assert_eq!(table, default_outlets());

    cfg.outlets = default_outlets();
    let (_, src) = resolve_outlets(&cfg, Some(&image));
    assert_eq!(src, OutletSource::Config);
}
