//! CLI scenarios that need no database.
//!
//! Every command below must fail (or succeed) before any connection is
//! attempted, so PODESK_DATABASE_URL is removed from the environment.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn podesk() -> Command {
    let mut cmd = Command::cargo_bin("podesk").expect("binary builds");
    cmd.env_remove("PODESK_DATABASE_URL")
        .env_remove("PODESK_CONFIG");
    cmd
}

fn repo_base_yaml() -> String {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../config/base.yaml")
        .to_string_lossy()
        .to_string()
}

fn temp_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f
}

#[test]
fn help_lists_top_level_commands() {
    podesk()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("db"))
        .stdout(predicate::str::contains("config-hash"))
        .stdout(predicate::str::contains("order"))
        .stdout(predicate::str::contains("scan"));
}

#[test]
fn config_hash_is_stable_across_runs() {
    let base = repo_base_yaml();
    let first = podesk().args(["config-hash", &base]).assert().success();
    let out1 = String::from_utf8(first.get_output().stdout.clone()).unwrap();
    let second = podesk().args(["config-hash", &base]).assert().success();
    let out2 = String::from_utf8(second.get_output().stdout.clone()).unwrap();

    let hash_line = out1.lines().next().unwrap();
    assert!(hash_line.starts_with("config_hash="));
    assert_eq!(hash_line.trim_start_matches("config_hash=").len(), 64);
    assert_eq!(out1, out2);
}

#[test]
fn config_hash_refuses_secret_literals() {
    let yaml = "dispatch:\n  webhook_url_env: \"sk-live-abcdef0123456789\"\n";
    let f = temp_file(".yaml", yaml);
    podesk()
        .args(["config-hash", f.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"));
}

#[test]
fn order_create_rejects_invalid_draft_before_connecting() {
    let text = "title: Chairs\nteam: Ops\ndate: 2020-01-01\n- 0 pcs Chair\n";
    let f = temp_file(".txt", text);
    podesk()
        .args(["order", "create", "--file", f.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("INVALID_DRAFT"))
        .stderr(predicate::str::contains("requested_by"));
}

#[test]
fn order_create_rejects_past_date_json_draft() {
    let f = temp_file(
        ".json",
        r#"{"title":"Desks","team":"Ops","requested_by":"alice","requested_date":"2020-01-01",
            "articles":[{"quantity":1,"unit":"pcs","description":"Desk"}]}"#,
    );
    podesk()
        .args(["order", "create", "--file", f.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("INVALID_DRAFT"))
        .stderr(predicate::str::contains("before today"));
}

#[test]
fn malformed_id_and_amount_fail_fast() {
    podesk()
        .args(["order", "show", "--id", "ORDER-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid --id"));

    podesk()
        .args([
            "order", "pay", "--id", "CMD-2025-06-0001", "--amount", "12,3.4", "--by", "treasury",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid --amount"));
}

#[test]
fn db_status_without_url_names_the_variable() {
    podesk()
        .args(["db", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("PODESK_DATABASE_URL"));
}
