use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{now}"));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn run_qz<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_qz"))
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute qz binary: {err}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_qz(args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "qz command failed (status={}):\nstdout:\n{stdout}\nstderr:\n{stderr}",
            output.status
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn expect_failure<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_qz(args);
    assert!(!output.status.success(), "command was expected to fail");
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// A reviewable batch: ten records, several with the correct answer not
/// yet in first position so the upload path exercises the reconciler.
fn sample_batch() -> Value {
    let answers = [
        "Mercury", "Venus", "Earth", "Mars", "Jupiter", "Saturn", "Uranus", "Neptune", "Pluto",
        "Ceres",
    ];
    let records: Vec<Value> = answers
        .iter()
        .enumerate()
        .map(|(index, answer)| {
            let choices = if index % 3 == 0 {
                json!(["decoy-a", answer, "decoy-b", "decoy-c"])
            } else {
                json!([answer, "decoy-a", "decoy-b", "decoy-c"])
            };
            json!({
                "questionText": format!("{answer} is the subject of statement {index}."),
                "choices": choices,
                "answer": answer,
                "tags": ["space", format!("category-{index}"), format!("topic-{index}")],
            })
        })
        .collect();
    Value::Array(records)
}

fn write_batch_file(dir: &Path) -> PathBuf {
    let path = dir.join("batch.json");
    let rendered = serde_json::to_string_pretty(&sample_batch())
        .unwrap_or_else(|err| panic!("batch fixture must serialize: {err}"));
    fs::write(&path, rendered)
        .unwrap_or_else(|err| panic!("failed to write batch file {}: {err}", path.display()));
    path
}

#[test]
fn upload_then_slot_then_stats_round_trip() {
    let dir = unique_temp_dir("qz-cli-roundtrip");
    let db = dir.join("quizsmith.sqlite3");
    let batch = write_batch_file(&dir);

    let uploaded = run_json([
        "--db",
        db.to_string_lossy().as_ref(),
        "upload",
        "--file",
        batch.to_string_lossy().as_ref(),
        "--date",
        "2031-01-01",
        "--elevated",
    ]);
    assert_eq!(uploaded["command"], "upload");
    assert_eq!(uploaded["committed"], 10);
    assert_eq!(uploaded["tag_index_entries"], 30);
    assert_eq!(uploaded["date"], "2031-01-01");
    let repairs = uploaded["repairs"]
        .as_array()
        .unwrap_or_else(|| panic!("repairs must be an array"));
    assert_eq!(repairs.len(), 4, "records 1, 4, 7, 10 need reordering");

    // The day is now occupied, so the finder moves to the next one.
    let slot = run_json([
        "--db",
        db.to_string_lossy().as_ref(),
        "slot",
        "find",
        "--start",
        "2031-01-01",
    ]);
    assert_eq!(slot["date"], "2031-01-02");

    let stats = run_json(["--db", db.to_string_lossy().as_ref(), "stats"]);
    assert_eq!(stats["total_records"], 10);
    assert_eq!(stats["days"]["2031-01-01"], 10);
    assert_eq!(stats["tags"]["space"], 10);
}

#[test]
fn a_second_upload_to_the_same_date_conflicts() {
    let dir = unique_temp_dir("qz-cli-conflict");
    let db = dir.join("quizsmith.sqlite3");
    let batch = write_batch_file(&dir);

    let db_arg = db.to_string_lossy().to_string();
    let batch_arg = batch.to_string_lossy().to_string();
    run_json([
        "--db", db_arg.as_str(),
        "upload",
        "--file", batch_arg.as_str(),
        "--date", "2031-02-01",
        "--elevated",
    ]);

    let stderr = expect_failure([
        "--db", db_arg.as_str(),
        "upload",
        "--file", batch_arg.as_str(),
        "--date", "2031-02-01",
        "--elevated",
    ]);
    assert!(
        stderr.contains("already holds"),
        "conflict must be reported, got:\n{stderr}"
    );

    let stats = run_json(["--db", db_arg.as_str(), "stats"]);
    assert_eq!(stats["total_records"], 10, "the losing commit must not merge");
}

#[test]
fn upload_without_elevated_access_is_denied() {
    let dir = unique_temp_dir("qz-cli-denied");
    let db = dir.join("quizsmith.sqlite3");
    let batch = write_batch_file(&dir);

    let stderr = expect_failure([
        "--db",
        db.to_string_lossy().as_ref(),
        "upload",
        "--file",
        batch.to_string_lossy().as_ref(),
        "--date",
        "2031-03-01",
    ]);
    assert!(
        stderr.contains("elevated access"),
        "denial must be reported, got:\n{stderr}"
    );

    let stats = run_json(["--db", db.to_string_lossy().as_ref(), "stats"]);
    assert_eq!(stats["total_records"], 0, "a denied upload writes nothing");
}

#[test]
fn legacy_date_formats_are_rejected_by_name() {
    let dir = unique_temp_dir("qz-cli-legacy-date");
    let db = dir.join("quizsmith.sqlite3");
    let batch = write_batch_file(&dir);

    let stderr = expect_failure([
        "--db",
        db.to_string_lossy().as_ref(),
        "upload",
        "--file",
        batch.to_string_lossy().as_ref(),
        "--date",
        "01-01-2031",
        "--elevated",
    ]);
    assert!(
        stderr.contains("MM-DD-YYYY"),
        "legacy convention must be named, got:\n{stderr}"
    );
}

#[test]
fn slot_find_on_an_empty_store_returns_the_start_date() {
    let dir = unique_temp_dir("qz-cli-slot");
    let db = dir.join("quizsmith.sqlite3");

    let slot = run_json([
        "--db",
        db.to_string_lossy().as_ref(),
        "slot",
        "find",
        "--start",
        "2031-06-15",
    ]);
    assert_eq!(slot["command"], "slot.find");
    assert_eq!(slot["date"], "2031-06-15");
}

#[test]
fn a_malformed_batch_file_reports_the_record_position() {
    let dir = unique_temp_dir("qz-cli-bad-batch");
    let db = dir.join("quizsmith.sqlite3");

    let mut batch = sample_batch();
    if let Some(record) = batch.get_mut(4) {
        if let Some(object) = record.as_object_mut() {
            object.remove("answer");
        }
    }
    let path = dir.join("batch.json");
    let rendered = serde_json::to_string_pretty(&batch)
        .unwrap_or_else(|err| panic!("batch fixture must serialize: {err}"));
    fs::write(&path, rendered)
        .unwrap_or_else(|err| panic!("failed to write batch file {}: {err}", path.display()));

    let stderr = expect_failure([
        "--db",
        db.to_string_lossy().as_ref(),
        "upload",
        "--file",
        path.to_string_lossy().as_ref(),
        "--date",
        "2031-04-01",
        "--elevated",
    ]);
    assert!(
        stderr.contains("record 5"),
        "position must be 1-indexed, got:\n{stderr}"
    );
}
