//! CLI binary smoke tests using assert_cmd.
//!
//! These run the compiled `attrition` binary against the fixture bundles of
//! the core crate.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};

fn cmd() -> Command {
    Command::cargo_bin("attrition").unwrap()
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../attrition-core/tests/fixtures")
        .join(name)
}

fn configured() -> Command {
    let mut c = cmd();
    c.arg("--config").arg(fixture("service.json"));
    c
}

// ---------------------------------------------------------------------------
// Top-level
// ---------------------------------------------------------------------------

#[test]
fn no_args_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn help_flag() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("predict"))
        .stdout(predicate::str::contains("batch"))
        .stdout(predicate::str::contains("health"));
}

#[test]
fn version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("attrition"));
}

#[test]
fn unknown_variant_is_rejected_by_parser() {
    cmd()
        .args(["predict", "payroll", "x.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

// ---------------------------------------------------------------------------
// Predictions
// ---------------------------------------------------------------------------

#[test]
fn predict_at_risk_employee() {
    configured()
        .arg("predict")
        .arg("demographic")
        .arg(fixture("demographic_at_risk.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"risk_level\": \"High\""))
        .stdout(predicate::str::contains("\"Full Name\": \"Jordan Blake\""))
        .stdout(predicate::str::contains("num__Performance Rating"));
}

#[test]
fn predict_satisfied_survey() {
    configured()
        .arg("predict")
        .arg("survey")
        .arg(fixture("survey_satisfied.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"risk_level\": \"Low\""))
        .stdout(predicate::str::contains("Job Satisfaction"));
}

#[test]
fn predict_rejects_more_than_one_record() {
    configured()
        .arg("predict")
        .arg("demographic")
        .arg(fixture("demographic_batch.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("single record"));
}

#[test]
fn batch_writes_csv_table() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("scores.csv");
    configured()
        .arg("batch")
        .arg("demographic")
        .arg(fixture("demographic_batch.json"))
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    let content = std::fs::read_to_string(&out).unwrap();
    let mut lines = content.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("Employee ID,Full Name,attrition_probability,risk_level"));
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].contains("Jordan Blake") && rows[0].contains("High"));
    assert!(rows[1].contains("Riley Chen") && rows[1].contains("Low"));
}

/// Survey reference data without its label column, edited by `edit` and
/// written to `dir` as a request table.
fn survey_table(dir: &Path, edit: impl Fn(&mut Vec<Vec<String>>)) -> PathBuf {
    let content = std::fs::read_to_string(fixture("survey_reference.csv")).unwrap();
    let mut rows: Vec<Vec<String>> = content
        .lines()
        .map(|line| {
            let mut cells: Vec<String> = line.split(',').map(str::to_string).collect();
            cells.pop();
            cells
        })
        .collect();
    edit(&mut rows);
    let path = dir.join("survey_batch.csv");
    let body: Vec<String> = rows.iter().map(|r| r.join(",")).collect();
    std::fs::write(&path, body.join("\n") + "\n").unwrap();
    path
}

#[test]
fn batch_accepts_request_table() {
    let dir = tempfile::tempdir().unwrap();
    let input = survey_table(dir.path(), |_| {});
    configured()
        .arg("batch")
        .arg("survey")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("attrition_probability").count(6));
}

#[test]
fn table_with_unlabelled_columns_is_rejected() {
    configured()
        .arg("batch")
        .arg("survey")
        .arg(fixture("survey_reference.csv"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"error\": \"validation_error\""))
        .stdout(predicate::str::contains("\"field\": \"Attrition\""));
}

#[test]
fn misspelled_table_column_is_a_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = survey_table(dir.path(), |rows| {
        let col = rows[0].iter().position(|h| h == "Job Satisfaction").unwrap();
        rows[0][col] = "Job Satisfactoin".to_string();
    });
    configured()
        .arg("batch")
        .arg("survey")
        .arg(&input)
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"error\": \"validation_error\""))
        .stdout(predicate::str::contains("\"record_index\": 0"))
        .stdout(predicate::str::contains("\"field\": \"Job Satisfactoin\""));
}

#[test]
fn unparseable_table_cell_is_a_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = survey_table(dir.path(), |rows| {
        let col = rows[0].iter().position(|h| h == "Work-Life Balance").unwrap();
        rows[2][col] = "five".to_string();
    });
    configured()
        .arg("batch")
        .arg("survey")
        .arg(&input)
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"error\": \"validation_error\""))
        .stdout(predicate::str::contains("\"record_index\": 1"))
        .stdout(predicate::str::contains("\"field\": \"Work-Life Balance\""));
}

#[test]
fn invalid_record_prints_structured_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("batch.json");
    let content = std::fs::read_to_string(fixture("demographic_batch.json")).unwrap();
    let mut records: serde_json::Value = serde_json::from_str(&content).unwrap();
    records[1].as_object_mut().unwrap().remove("Salary");
    std::fs::write(&input, records.to_string()).unwrap();

    configured()
        .arg("batch")
        .arg("demographic")
        .arg(&input)
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"error\": \"validation_error\""))
        .stdout(predicate::str::contains("\"record_index\": 1"))
        .stdout(predicate::str::contains("\"field\": \"Salary\""));
}

#[test]
fn explain_limits_contributions() {
    configured()
        .args(["explain", "demographic"])
        .arg(fixture("demographic_at_risk.json"))
        .args(["--limit", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"display_name\":").count(2))
        .stdout(predicate::str::contains("Performance Rating"));
}

// ---------------------------------------------------------------------------
// Status and baseline
// ---------------------------------------------------------------------------

#[test]
fn health_reports_ready_variants() {
    configured()
        .arg("health")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"healthy\""))
        .stdout(predicate::str::contains("\"baseline_ready\": true"));
}

#[test]
fn health_without_models_is_unavailable() {
    cmd()
        .args([
            "health",
            "--demographic-bundle",
            "/nonexistent/demographic.json",
            "--survey-bundle",
            "/nonexistent/survey.json",
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"status\": \"unavailable\""));
}

#[test]
fn missing_bundle_fails_only_its_variant() {
    configured()
        .args(["--survey-bundle", "/nonexistent/survey.json", "predict", "survey"])
        .arg(fixture("survey_satisfied.json"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"status\": 503"));

    configured()
        .args(["--survey-bundle", "/nonexistent/survey.json", "predict", "demographic"])
        .arg(fixture("demographic_at_risk.json"))
        .assert()
        .success();
}

#[test]
fn features_lists_survey_questions() {
    configured()
        .args(["features", "survey"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Stress levels/work pressure"))
        .stdout(predicate::str::contains("num__Age").not());
}

#[test]
fn baseline_dependence_and_unknown_feature() {
    configured()
        .args(["baseline", "demographic", "--feature", "Salary"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"feature\": \"num__Salary\""));

    configured()
        .args(["baseline", "survey", "--feature", "Salary"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"status\": 404"));
}

#[test]
fn baseline_importance_lists_every_feature() {
    configured()
        .args(["baseline", "survey"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mean_abs_contribution").count(19));
}
