// CLI integration tests for the `lmpx` command flows and error envelopes.
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;

fn cmd(env: &Path) -> Command {
    let exe = env!("CARGO_BIN_EXE_lmpx");
    let mut command = Command::new(exe);
    command.arg("--env").arg(env);
    command
}

fn run(env: &Path, args: &[&str]) -> Output {
    cmd(env).args(args).output().expect("run lmpx")
}

fn parse_json(bytes: &[u8]) -> Value {
    let text = std::str::from_utf8(bytes).expect("utf8");
    serde_json::from_str(text.trim()).expect("valid json")
}

fn parse_json_lines(bytes: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

#[test]
fn put_get_del_flow() {
    let temp = tempfile::tempdir().expect("tempdir");
    let env = temp.path().join("data");

    let put = run(&env, &["put", "greeting", "hello"]);
    assert!(put.status.success(), "{}", String::from_utf8_lossy(&put.stderr));
    let put_json = parse_json(&put.stdout);
    assert_eq!(put_json["key"], "greeting");
    assert_eq!(put_json["value"], "hello");

    let get = run(&env, &["get", "greeting"]);
    assert!(get.status.success());
    let get_json = parse_json(&get.stdout);
    assert_eq!(get_json["value"], "hello");

    let del = run(&env, &["del", "greeting"]);
    assert!(del.status.success());
    assert_eq!(parse_json(&del.stdout)["deleted"], true);

    let missing = run(&env, &["get", "greeting"]);
    assert_eq!(missing.status.code(), Some(3));
    let err = parse_json(&missing.stderr);
    assert_eq!(err["error"]["kind"], "NotFound");
}

#[test]
fn no_overwrite_conflict_exits_with_key_exists() {
    let temp = tempfile::tempdir().expect("tempdir");
    let env = temp.path().join("data");
    assert!(run(&env, &["put", "k", "v1"]).status.success());

    let conflict = run(&env, &["put", "k", "v2", "--no-overwrite"]);
    assert_eq!(conflict.status.code(), Some(4));
    let err = parse_json(&conflict.stderr);
    assert_eq!(err["error"]["kind"], "KeyExists");
    assert_eq!(err["error"]["code"], -30799);

    let get = run(&env, &["get", "k"]);
    assert_eq!(parse_json(&get.stdout)["value"], "v1");
}

#[test]
fn scan_respects_from_and_limit() {
    let temp = tempfile::tempdir().expect("tempdir");
    let env = temp.path().join("data");
    for (key, value) in [("c", "3"), ("a", "1"), ("d", "4"), ("b", "2")] {
        let out = cmd(&env)
            .args(["--db", "letters", "put", key, value])
            .output()
            .expect("put");
        assert!(out.status.success());
    }

    let scan = cmd(&env)
        .args(["--db", "letters", "scan", "--from", "b", "--limit", "2"])
        .output()
        .expect("scan");
    assert!(scan.status.success());
    let rows = parse_json_lines(&scan.stdout);
    let keys: Vec<&str> = rows.iter().map(|row| row["key"].as_str().expect("key")).collect();
    assert_eq!(keys, ["b", "c"]);
    assert_eq!(rows[0]["value"], "2");
}

#[test]
fn dup_sort_database_deletes_a_single_pair() {
    let temp = tempfile::tempdir().expect("tempdir");
    let env = temp.path().join("data");
    for value in ["v1", "v2", "v3"] {
        let out = cmd(&env)
            .args(["--db", "tags", "--dup-sort", "put", "k", value])
            .output()
            .expect("put");
        assert!(out.status.success());
    }

    let del = cmd(&env)
        .args(["--db", "tags", "del", "k", "v2"])
        .output()
        .expect("del");
    assert!(del.status.success());

    let scan = cmd(&env).args(["--db", "tags", "scan"]).output().expect("scan");
    let values: Vec<String> = parse_json_lines(&scan.stdout)
        .iter()
        .map(|row| row["value"].as_str().expect("value").to_string())
        .collect();
    assert_eq!(values, ["v1", "v3"]);

    let stat = cmd(&env).args(["--db", "tags", "stat"]).output().expect("stat");
    let stat_json = parse_json(&stat.stdout);
    assert_eq!(stat_json["entries"], 2);
    assert_eq!(stat_json["dup_sort"], true);
}

#[test]
fn missing_database_is_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let env = temp.path().join("data");
    let out = cmd(&env).args(["--db", "absent", "stat"]).output().expect("stat");
    assert_eq!(out.status.code(), Some(3));
    let err = parse_json(&out.stderr);
    assert!(
        err["error"]["message"]
            .as_str()
            .expect("message")
            .contains("absent")
    );
}

#[test]
fn usage_errors_exit_two() {
    let temp = tempfile::tempdir().expect("tempdir");
    let env = temp.path().join("data");
    let out = run(&env, &["put", "k", "v", "--no-overwrite", "--append"]);
    assert_eq!(out.status.code(), Some(2));
    let err = parse_json(&out.stderr);
    assert_eq!(err["error"]["kind"], "Usage");
}

#[test]
fn config_file_sets_environment_options() {
    let temp = tempfile::tempdir().expect("tempdir");
    let env = temp.path().join("data");
    let config = temp.path().join("lmpx.json");
    std::fs::write(&config, r#"{"map_size": 1048576, "max_dbs": 4}"#).expect("write config");

    let out = Command::new(env!("CARGO_BIN_EXE_lmpx"))
        .arg("--config")
        .arg(&config)
        .arg("--env")
        .arg(&env)
        .arg("stat")
        .output()
        .expect("stat");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(parse_json(&out.stdout)["map_size"], 1048576);

    std::fs::write(&config, r#"{"bogus": 1}"#).expect("write config");
    let out = Command::new(env!("CARGO_BIN_EXE_lmpx"))
        .arg("--config")
        .arg(&config)
        .arg("--env")
        .arg(&env)
        .arg("stat")
        .output()
        .expect("stat");
    assert!(!out.status.success());
    assert!(parse_json(&out.stderr)["error"]["path"].is_string());
}

#[test]
fn copy_produces_an_openable_environment() {
    let temp = tempfile::tempdir().expect("tempdir");
    let env = temp.path().join("data");
    let backup = temp.path().join("backup");
    assert!(run(&env, &["put", "k", "v"]).status.success());

    let copy = run(&env, &["copy", backup.to_str().expect("utf8"), "--compact"]);
    assert!(copy.status.success(), "{}", String::from_utf8_lossy(&copy.stderr));
    assert_eq!(parse_json(&copy.stdout)["compact"], true);

    let get = run(&backup, &["get", "k"]);
    assert!(get.status.success());
    assert_eq!(parse_json(&get.stdout)["value"], "v");
}
