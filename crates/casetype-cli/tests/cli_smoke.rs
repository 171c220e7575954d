//! CLI binary smoke tests using assert_cmd.
//!
//! These tests exercise the compiled `casetype` binary end to end: seeding a
//! case store, training on it, then querying the written artifact.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("casetype").unwrap();
    cmd.env_remove("CASETYPE_MODEL");
    cmd
}

fn seed_and_train(dir: &Path) -> (String, String) {
    let cases = dir.join("cases.json");
    let model = dir.join("model.bin");
    cmd()
        .args(["seed", "--count", "60", "--seed", "7", "--output"])
        .arg(&cases)
        .assert()
        .success();
    cmd()
        .args(["train", "--num_boost_round", "10", "-d"])
        .arg(&cases)
        .arg("-o")
        .arg(&model)
        .assert()
        .success();
    (
        cases.to_string_lossy().into_owned(),
        model.to_string_lossy().into_owned(),
    )
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
        .stdout(predicate::str::contains("train"))
        .stdout(predicate::str::contains("predict"))
        .stdout(predicate::str::contains("seed"));
}

#[test]
fn version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("casetype"));
}

// ---------------------------------------------------------------------------
// Train
// ---------------------------------------------------------------------------

#[test]
fn train_no_config_prints_template() {
    cmd()
        .arg("train")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"train_data\""))
        .stdout(predicate::str::contains("\"learning_rate\""))
        .stderr(predicate::str::contains("No config file provided"));
}

#[test]
fn train_nonexistent_config_errors() {
    cmd()
        .args(["train", "/nonexistent/config.json"])
        .assert()
        .failure();
}

#[test]
fn train_rejects_unsupported_data_file() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("cases.parquet");
    std::fs::write(&data, b"").unwrap();
    cmd()
        .args(["train", "-d"])
        .arg(&data)
        .assert()
        .failure();
}

#[test]
fn train_writes_artifact_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let (_, model) = seed_and_train(dir.path());
    assert!(Path::new(&model).exists());

    let report = dir.path().join("report.html");
    cmd()
        .args(["report", "--model", &model, "-o"])
        .arg(&report)
        .assert()
        .success();
    let html = std::fs::read_to_string(&report).unwrap();
    assert!(html.contains("idade"));
}

// ---------------------------------------------------------------------------
// Serving commands
// ---------------------------------------------------------------------------

#[test]
fn predict_from_flags() {
    let dir = tempfile::tempdir().unwrap();
    let (_, model) = seed_and_train(dir.path());
    cmd()
        .args([
            "predict", "--model", &model, "--idade", "30", "--etnia", "Parda", "--localizacao",
            "Centro",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"classe_predita\""))
        .stdout(predicate::str::contains("\"probabilidades\""));
}

#[test]
fn predict_batch_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let (_, model) = seed_and_train(dir.path());
    let input = dir.path().join("requests.json");
    std::fs::write(
        &input,
        r#"[{"idade": 30, "etnia": "Parda", "localizacao": "Centro"},
            {"idade": 70, "etnia": "Desconhecida", "localizacao": "Outra"}]"#,
    )
    .unwrap();
    let output = cmd()
        .args(["predict", "--model", &model, "--input"])
        .arg(&input)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let parsed: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 2);
}

#[test]
fn predict_missing_field_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (_, model) = seed_and_train(dir.path());
    cmd()
        .args(["predict", "--model", &model, "--idade", "30", "--etnia", "Parda"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("localizacao"));
}

#[test]
fn predict_without_artifact_fails() {
    cmd()
        .args([
            "predict", "--model", "/nonexistent/model.bin", "--idade", "30", "--etnia", "A",
            "--localizacao", "X",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("model not loaded"));
}

#[test]
fn importances_list_expanded_features() {
    let dir = tempfile::tempdir().unwrap();
    let (_, model) = seed_and_train(dir.path());
    let output = cmd()
        .args(["importances", "--model", &model])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"idade\""))
        .stdout(predicate::str::contains("\"etnia_"))
        .get_output()
        .stdout
        .clone();
    // Encoder layout order: categorical blocks first, age last.
    let text = String::from_utf8(output).unwrap();
    let age = text.find("\"idade\"").unwrap();
    let location = text.find("\"localizacao_").unwrap();
    assert!(location < age);
}

#[test]
fn health_reports_store_and_missing_model() {
    let dir = tempfile::tempdir().unwrap();
    let (cases, _) = seed_and_train(dir.path());
    cmd()
        .args(["health", "--model", "/nonexistent/model.bin", "--store", &cases])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"model_loaded\": false"))
        .stdout(predicate::str::contains("\"num_records\": 60"));
}

#[test]
fn model_path_from_environment() {
    let dir = tempfile::tempdir().unwrap();
    let (_, model) = seed_and_train(dir.path());
    cmd()
        .env("CASETYPE_MODEL", &model)
        .arg("health")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"model_loaded\": true"));
}

// ---------------------------------------------------------------------------
// Seed
// ---------------------------------------------------------------------------

#[test]
fn seed_to_stdout_is_reproducible() {
    let run = || {
        cmd()
            .args(["seed", "--count", "5", "--seed", "11"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone()
    };
    let first = run();
    assert_eq!(first, run());
    let parsed: serde_json::Value = serde_json::from_slice(&first).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 5);
    assert!(parsed[0]["vitima"]["idade"].is_u64());
}

// ---------------------------------------------------------------------------
// Cases
// ---------------------------------------------------------------------------

#[test]
fn cases_add_get_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("cases.json");
    let input = dir.path().join("new.json");
    std::fs::write(
        &input,
        r#"{"data_do_caso": "2024-05-01", "tipo_do_caso": "Furto", "localizacao": "Centro",
            "vitima": {"etnia": "Parda", "idade": 30}}"#,
    )
    .unwrap();

    cmd()
        .args(["cases", "add"])
        .arg(&input)
        .arg("--store")
        .arg(&store)
        .assert()
        .success();
    cmd()
        .args(["cases", "get", "2024-05-01", "--store"])
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Furto\""));
    cmd()
        .args(["cases", "delete", "2024-05-01", "--store"])
        .arg(&store)
        .assert()
        .success();
    cmd()
        .args(["cases", "get", "2024-05-01", "--store"])
        .arg(&store)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Case not found"));
}
