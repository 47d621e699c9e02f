use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::process::Command;

fn dupscan(td: &assert_fs::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("dupscan").unwrap();
    cmd.current_dir(td.path())
        .env_remove("DUPSCAN_STORE_URI")
        .env_remove("DUPSCAN_DB_NAME")
        .env("DUPSCAN_LOG", "off");
    cmd
}

fn read_json(p: &std::path::Path) -> Value {
    serde_json::from_slice(&std::fs::read(p).unwrap()).unwrap()
}

/// A dump directory at `datastore/app` plus an `index_failures.json` report.
fn seed(td: &assert_fs::TempDir) {
    let db = td.child("datastore/app");
    db.create_dir_all().unwrap();
    db.child("users.json")
        .write_str(
            &json!([
                { "_id": "u1", "email": "a@x" },
                { "_id": "u2", "email": "a@x" },
                { "_id": "u3", "email": "b@x" }
            ])
            .to_string(),
        )
        .unwrap();
    db.child("sharan.rels.clientContact.json")
        .write_str(&json!([{ "_id": 1, "pair": "p" }, { "_id": 2, "pair": "p" }]).to_string())
        .unwrap();
    db.child("meta.json")
        .write_str(
            &json!([{
                "collectionType": "sharan.rels.clientContact",
                "source": { "cardinality": 5 },
                "dest": { "cardinality": 10 }
            }])
            .to_string(),
        )
        .unwrap();
    td.child("index_failures.json")
        .write_str(
            &json!({
                "users": { "email_1": { "err": { "code": 11000 } } },
                "sharan.rels.clientContact": { "pair_1": { "err": { "errorResponse": { "code": 11000 } } } },
                "orders": { "ref_1": { "err": { "code": 85 } } }
            })
            .to_string(),
        )
        .unwrap();
}

#[test]
fn generate_writes_plan() {
    let td = assert_fs::TempDir::new().unwrap();
    seed(&td);
    dupscan(&td)
        .args(["generate", "--out", "plans/scan_plan.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("users: email"))
        .stdout(predicate::str::contains("Plan: 2 target(s)"));
    let plan = read_json(&td.child("plans/scan_plan.json").path());
    assert_eq!(
        plan,
        json!([
            { "collection": "users", "fields": ["email"] },
            { "collection": "sharan.rels.clientContact", "fields": ["pair"] }
        ])
    );
}

#[test]
fn scan_end_to_end() {
    let td = assert_fs::TempDir::new().unwrap();
    seed(&td);
    dupscan(&td)
        .args(["scan", "--workers", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("users: email (1 groups, largest 2)"))
        .stdout(predicate::str::contains("destCardinality=10 sourceCardinality=5"))
        .stdout(predicate::str::contains("Reports: 3 written, 0 failed"));

    td.child("scan_plan.json").assert(predicate::path::is_file());
    td.child("results/users_duplicates.json").assert(predicate::path::is_file());
    td.child("results/run_summary.json").assert(predicate::path::is_file());
    let rel = read_json(&td.child("results/sharan.rels.clientContact_duplicates.json").path());
    assert_eq!(rel["sourceCardinality"], json!(5));
    assert_eq!(rel["results"][0]["duplicates"][0]["members"], json!([1, 2]));
}

#[test]
fn scan_reports_when_nothing_found() {
    let td = assert_fs::TempDir::new().unwrap();
    seed(&td);
    td.child("plan.json")
        .write_str(r#"[{"collection":"users","fields":["_id"]}]"#)
        .unwrap();
    dupscan(&td)
        .args(["scan", "--plan", "plan.json", "--results-dir", "out"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No duplicates found"));
    assert_eq!(read_json(&td.child("out/duplicates_all.json").path()), json!([]));
}

#[test]
fn missing_report_is_fatal() {
    let td = assert_fs::TempDir::new().unwrap();
    seed(&td);
    dupscan(&td)
        .args(["scan", "--report", "nope.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.json"));
    td.child("results").assert(predicate::path::missing());
}

#[test]
fn unreachable_store_is_fatal() {
    let td = assert_fs::TempDir::new().unwrap();
    seed(&td);
    dupscan(&td)
        .args(["scan", "--store-uri", "mongodb://localhost:27017"])
        .assert()
        .failure();
    dupscan(&td)
        .env("DUPSCAN_DB_NAME", "missing")
        .args(["index-audit"])
        .assert()
        .failure();
}

#[test]
fn index_audit_flags_wide_collections() {
    let td = assert_fs::TempDir::new().unwrap();
    seed(&td);
    td.child("datastore/app/users.indexes.json")
        .write_str(
            &json!([
                { "name": "_id_", "key": { "_id": 1 }, "accesses": { "ops": 7 } },
                { "name": "email_1", "key": { "email": 1 }, "accesses": { "ops": 90 } }
            ])
            .to_string(),
        )
        .unwrap();
    dupscan(&td)
        .args(["index-audit", "--ceiling", "2", "--exclude", "meta"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Index audit across 2 collection(s), ceiling 2"))
        .stdout(predicate::str::contains("busiest: email_1"));
    let report = read_json(&td.child("index_audit/users_indexes.json").path());
    assert_eq!(report["indexCount"], json!(2));
    td.child("index_audit/sharan.rels.clientContact_indexes.json").assert(predicate::path::missing());
}
