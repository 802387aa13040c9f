//! CLI integration tests using assert_cmd.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn scenarios() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../scenarios")
}

/// A command isolated in `dir`: no config is picked up and the JSON store
/// lives under `dir/usages`.
fn qattempt(dir: &Path) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("qattempt").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("QATTEMPT_STORE_DIR", dir.join("usages"))
        .env_remove("RUST_LOG");
    cmd
}

fn run_json(dir: &Path, scenario: &Path) -> serde_json::Value {
    let output = qattempt(dir)
        .arg("run")
        .arg("--scenario")
        .arg(scenario)
        .arg("--format")
        .arg("json")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn usage_id(summary: &serde_json::Value) -> String {
    summary["usage_id"].as_str().unwrap().to_string()
}

const TF_BANK: &str = r#"
[[questions]]
type = "truefalse"
id = "tf"
name = "TF"
correct_answer = true
"#;

const TF_SCENARIO: &str = r#"
[usage]
behaviour = "deferredfeedback"
bank = "bank.toml"
finish_all = true

[[slots]]
question = "tf"

[[actions]]
slot = 1
data = { answer = "1" }
"#;

#[test]
fn validate_bundled_bank() {
    let dir = TempDir::new().unwrap();
    qattempt(dir.path())
        .arg("validate")
        .arg("--bank")
        .arg(scenarios().join("bank.toml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Scenario bank (3 questions)"))
        .stdout(predicate::str::contains("All question banks valid"));
}

#[test]
fn validate_reports_warnings() {
    let dir = TempDir::new().unwrap();
    let bank = dir.path().join("dup.toml");
    std::fs::write(&bank, format!("{TF_BANK}{TF_BANK}")).unwrap();

    qattempt(dir.path())
        .arg("validate")
        .arg("--bank")
        .arg(&bank)
        .assert()
        .success()
        .stdout(predicate::str::contains("[tf] WARNING: duplicate question ID"))
        .stdout(predicate::str::contains("1 warning(s) found"));
}

#[test]
fn validate_nonexistent_file() {
    let dir = TempDir::new().unwrap();
    qattempt(dir.path())
        .arg("validate")
        .arg("--bank")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    qattempt(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created qattempt.toml"))
        .stdout(predicate::str::contains("Created scenarios/example.toml"));

    assert!(dir.path().join("qattempt.toml").exists());
    assert!(dir.path().join("scenarios/bank.toml").exists());

    qattempt(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn init_scenario_runs() {
    let dir = TempDir::new().unwrap();
    qattempt(dir.path()).arg("init").assert().success();

    let summary = run_json(dir.path(), &dir.path().join("scenarios/example.toml"));
    assert_eq!(summary["total_mark"], 2.0);
    assert_eq!(summary["slots"][1]["state"], "graded_right");
}

#[test]
fn run_deferred_scenario() {
    let dir = TempDir::new().unwrap();
    let summary = run_json(dir.path(), &scenarios().join("deferred.toml"));

    assert_eq!(summary["total_mark"], 2.0);
    assert_eq!(summary["max_total"], 2.0);
    assert_eq!(summary["store"], "json");
    assert_eq!(summary["slots"][0]["state"], "graded_right");
    assert_eq!(summary["slots"][0]["response_summary"], "True");
}

#[test]
fn run_interactive_scenario_text() {
    let dir = TempDir::new().unwrap();
    qattempt(dir.path())
        .arg("run")
        .arg("--scenario")
        .arg(scenarios().join("interactive.toml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("gradedright"))
        .stdout(predicate::str::contains("Total: 0.50 / 1.00"))
        .stderr(predicate::str::contains("Saved usage"));
}

#[test]
fn run_cbm_scenario_reports_negative_mark() {
    let dir = TempDir::new().unwrap();
    let summary = run_json(dir.path(), &scenarios().join("cbm.toml"));
    assert_eq!(summary["total_mark"], -2.0);
    assert_eq!(summary["slots"][1]["mark"], -4.0);
}

#[test]
fn config_can_clamp_negative_marks() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("qattempt.toml"), "clamp_negative_marks = true\n").unwrap();

    let summary = run_json(dir.path(), &scenarios().join("cbm.toml"));
    assert_eq!(summary["total_mark"], 2.0);
}

#[test]
fn run_essay_scenario_with_manual_mark() {
    let dir = TempDir::new().unwrap();
    let summary = run_json(dir.path(), &scenarios().join("essay.toml"));

    assert_eq!(summary["slots"][0]["behaviour"], "manualgraded");
    assert_eq!(summary["slots"][0]["state"], "manually_graded_partial");
    assert_eq!(summary["slots"][0]["mark"], 7.0);
    assert_eq!(summary["total_mark"], 8.0);
}

#[test]
fn run_fails_on_action_after_finish() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("bank.toml"), TF_BANK).unwrap();
    let scenario = dir.path().join("late.toml");
    std::fs::write(
        &scenario,
        r#"
[usage]
behaviour = "deferredfeedback"
bank = "bank.toml"

[[slots]]
question = "tf"

[[actions]]
slot = 1
finish = true

[[actions]]
slot = 1
data = { answer = "0" }
"#,
    )
    .unwrap();

    qattempt(dir.path())
        .arg("run")
        .arg("--scenario")
        .arg(&scenario)
        .assert()
        .failure()
        .stderr(predicate::str::contains("action 2 on slot 1 failed"))
        .stderr(predicate::str::contains("finished question attempt"));
}

#[test]
fn show_and_list_stored_usage() {
    let dir = TempDir::new().unwrap();
    let id = usage_id(&run_json(dir.path(), &scenarios().join("deferred.toml")));

    qattempt(dir.path())
        .arg("show")
        .arg("--usage")
        .arg(&id)
        .assert()
        .success()
        .stdout(predicate::str::contains("Slot 1: sky-blue [deferredfeedback]"))
        .stdout(predicate::str::contains("-finish=1"))
        .stdout(predicate::str::contains("gradedright"));

    qattempt(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains(id.as_str()))
        .stdout(predicate::str::contains("deferred-demo"));
}

#[test]
fn regrade_after_bank_change() {
    let dir = TempDir::new().unwrap();
    let bank = dir.path().join("bank.toml");
    let scenario = dir.path().join("tf.toml");
    std::fs::write(&bank, TF_BANK).unwrap();
    std::fs::write(&scenario, TF_SCENARIO).unwrap();

    let id = usage_id(&run_json(dir.path(), &scenario));
    std::fs::write(&bank, TF_BANK.replace("correct_answer = true", "correct_answer = false"))
        .unwrap();

    qattempt(dir.path())
        .args(["regrade", "--usage", &id, "--dry-run", "--bank"])
        .arg(&bank)
        .assert()
        .success()
        .stdout(predicate::str::contains("gradedwrong"))
        .stdout(predicate::str::contains("1 slot(s) would change"));

    qattempt(dir.path())
        .args(["regrade", "--usage", &id, "--bank"])
        .arg(&bank)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 slot(s) changed"));

    qattempt(dir.path())
        .args(["show", "--usage", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("gradedwrong"));

    qattempt(dir.path())
        .args(["regrade", "--all", "--bank"])
        .arg(&bank)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 slot(s) changed, 1 unchanged"));
}

#[test]
fn regrade_unknown_usage_fails() {
    let dir = TempDir::new().unwrap();
    qattempt(dir.path())
        .args([
            "regrade",
            "--usage",
            "00000000-0000-0000-0000-000000000000",
            "--bank",
        ])
        .arg(scenarios().join("bank.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 usage(s) failed to regrade"));
}
