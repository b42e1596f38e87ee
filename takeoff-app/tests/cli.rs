use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

const PLAN: &str = "0\nSECTION\n2\nHEADER\n9\n$INSUNITS\n70\n4\n0\nENDSEC\n\
0\nSECTION\n2\nBLOCKS\n\
0\nBLOCK\n2\nPORTE90\n10\n0\n20\n0\n\
0\nLINE\n8\n0\n10\n0\n20\n0\n11\n900\n21\n0\n\
0\nENDBLK\n0\nENDSEC\n\
0\nSECTION\n2\nENTITIES\n\
0\nLINE\n8\nMURS\n10\n0\n20\n0\n11\n4000\n21\n0\n\
0\nLWPOLYLINE\n8\nDALLE\n90\n4\n70\n1\n10\n0\n20\n0\n10\n4000\n20\n0\n10\n4000\n20\n3000\n10\n0\n20\n3000\n\
0\nINSERT\n8\nMENUISERIES\n2\nPORTE90\n10\n1000\n20\n0\n\
0\nCIRCLE\n8\nMURS\n10\n0\n20\n0\n40\n10\n\
0\nENDSEC\n0\nEOF\n";

fn write_plan(dir: &Path) -> PathBuf {
    let path = dir.join("plan.dxf");
    fs::write(&path, PLAN).expect("write plan");
    path
}

fn command(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("takeoff-app").expect("binary built");
    cmd.current_dir(dir).env_remove("TAKEOFF_CONFIG");
    cmd
}

fn quantity(rows: &[serde_json::Value], designation: &str) -> f64 {
    rows.iter()
        .find(|row| row["designation"] == designation)
        .and_then(|row| row["quantity"].as_f64())
        .unwrap_or_else(|| panic!("row `{designation}` missing"))
}

#[test]
fn json_output_contains_quantities() {
    let dir = tempfile::tempdir().expect("temp dir");
    let plan = write_plan(dir.path());

    let output = command(dir.path())
        .arg(&plan)
        .args(["--wall-height", "2.5", "--format", "json"])
        .output()
        .expect("run binary");
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json stdout");
    let rows = value["rows"].as_array().expect("rows array");
    assert!((quantity(rows, "Walls — Total length") - 4.0).abs() < 1e-9);
    assert!((quantity(rows, "Slabs — Total surface") - 12.0).abs() < 1e-9);
    assert!((quantity(rows, "Openings — PORTE90") - 1.0).abs() < 1e-9);
    assert!((quantity(rows, "Walls — Gross surface (length × height)") - 10.0).abs() < 1e-9);
    assert!((quantity(rows, "Openings — Estimated surface") - 1.89).abs() < 1e-9);
    assert!((quantity(rows, "Walls — Net surface (gross − openings)") - 8.11).abs() < 1e-9);

    let diagnostics = value["diagnostics"].as_array().expect("diagnostics");
    assert!(
        diagnostics
            .iter()
            .any(|d| d["message"].as_str().is_some_and(|m| m.contains("CIRCLE")))
    );
}

#[test]
fn table_is_the_default_format() {
    let dir = tempfile::tempdir().expect("temp dir");
    let plan = write_plan(dir.path());

    command(dir.path())
        .arg(&plan)
        .assert()
        .success()
        .stdout(predicate::str::contains("Walls — Total length"))
        .stdout(predicate::str::contains("[Deductions]"));
}

#[test]
fn config_file_supplies_defaults() {
    let dir = tempfile::tempdir().expect("temp dir");
    let plan = write_plan(dir.path());
    let config = dir.path().join("takeoff.toml");
    fs::write(&config, "[takeoff]\nwall_height_m = 0.0\n\n[output]\nformat = \"json\"\n")
        .expect("write config");

    let output = command(dir.path())
        .arg(&plan)
        .arg("--config")
        .arg(&config)
        .output()
        .expect("run binary");
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json stdout");
    let rows = value["rows"].as_array().expect("rows array");
    assert!(
        !rows
            .iter()
            .any(|row| row["category"] == "Deductions"),
        "wall height 0 emits no deduction rows"
    );
}

#[test]
fn missing_input_exits_with_failure() {
    let dir = tempfile::tempdir().expect("temp dir");
    command(dir.path())
        .arg(dir.path().join("absent.dxf"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("absent.dxf"));
}

#[test]
fn invalid_scale_exits_with_failure() {
    let dir = tempfile::tempdir().expect("temp dir");
    let plan = write_plan(dir.path());
    command(dir.path())
        .arg(&plan)
        .args(["--scale", "0"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn unreadable_explicit_config_is_fatal() {
    let dir = tempfile::tempdir().expect("temp dir");
    let plan = write_plan(dir.path());
    let config = dir.path().join("broken.toml");
    fs::write(&config, "[takeoff]\nscale_factor = \"oops\"\n").expect("write config");

    command(dir.path())
        .arg(&plan)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("broken.toml"))
        .stdout(predicate::str::is_empty());

    command(dir.path())
        .arg(&plan)
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("absent.toml"));
}

#[test]
fn broken_discovered_config_is_reported_on_stderr() {
    let dir = tempfile::tempdir().expect("temp dir");
    let plan = write_plan(dir.path());
    fs::create_dir(dir.path().join("config")).expect("config dir");
    fs::write(dir.path().join("config").join("default.toml"), "[output\n")
        .expect("write config");

    command(dir.path())
        .arg(&plan)
        .assert()
        .success()
        .stderr(predicate::str::contains("default.toml"))
        .stdout(predicate::str::contains("Walls — Total length"));
}

#[test]
fn arc_step_below_floor_exits_with_failure() {
    let dir = tempfile::tempdir().expect("temp dir");
    let plan = write_plan(dir.path());
    command(dir.path())
        .arg(&plan)
        .args(["--arc-step", "1e-9"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("arc step"));
}
