use std::fs;
use std::process::Command;

use serde_json::Value;
use tempfile::tempdir;

fn binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_restaurant-pipeline"))
}

#[test]
fn test_canonicalize_stdout_is_pure_json() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("tickets.jsonl");
    fs::write(
        &input,
        "{\"ticket_id\":\"T1\",\"order_id\":\"A\",\"tags\":[\"b\",\"a\"]}\n\
         {\"ticket_id\":\"T1\",\"order_id\":\"A\",\"tags\":[\"a\",\"b\"]}\n",
    )
    .unwrap();

    let output = binary().arg("canonicalize").arg(&input).output().unwrap();
    assert!(output.status.success());

    let rows: Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["tags"], "[\"a\",\"b\"]");

    // Progress goes to stderr.
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("tickets: 2 rows in, 1 duplicates"));
}

#[test]
fn test_parse_stdout_is_pure_json() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("orders.csv");
    fs::write(&input, "id;subtotal\nA;10.5\n").unwrap();

    let output = binary().arg("parse").arg(&input).output().unwrap();
    assert!(output.status.success());

    let rows: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows[0]["id"], "A");
    assert_eq!(rows[0]["subtotal"], 10.5);
}

#[test]
fn test_missing_config_exits_with_error() {
    let output = binary()
        .args(["run", "--config", "/no/such/pipeline.json"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Cannot read config"));
}
