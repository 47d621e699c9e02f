use dupscan_core::config::{CollectionFilter, PlanSource, ScanConfig};
use dupscan_core::pipeline::run;
use dupscan_core::plan::write_plan;
use dupscan_core::store::MemoryStore;
use dupscan_core::writer::{RUN_ARTIFACT, SUMMARY_ARTIFACT};
use dupscan_core::{DupscanError, ScanTarget};
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;

const REL: &str = "sharan.rels.clientContact";

fn store() -> MemoryStore {
    let mut s = MemoryStore::new();
    s.insert_many(
        "users",
        vec![
            json!({ "_id": "u1", "email": "a@x" }),
            json!({ "_id": "u2", "email": "a@x" }),
            json!({ "_id": "u3", "email": "b@x" }),
        ],
    );
    s.insert_many(
        REL,
        vec![
            json!({ "_id": 1, "pair": "c1|k1" }),
            json!({ "_id": 2, "pair": "c1|k1" }),
        ],
    );
    s.insert_many("orders", vec![json!({ "_id": 1, "ref": "r1" }), json!({ "_id": 2, "ref": "r2" })]);
    s.insert_many(
        "meta",
        vec![json!({ "collectionType": REL, "source": { "cardinality": 5 }, "dest": { "cardinality": 10 } })],
    );
    s
}

fn failure_report(dir: &Path) -> std::path::PathBuf {
    let report = json!({
        "users": { "_id_": {}, "email_1": { "err": { "code": 11000 } } },
        "sharan.rels.clientContact": { "pair_1": { "err": { "errorResponse": { "code": 11000 } } } },
        "orders": { "ref_1": { "err": { "code": 11000 } } },
        "ghost": { "name_1": { "err": { "code": 11000 } } }
    });
    let p = dir.join("index_failures.json");
    std::fs::write(&p, serde_json::to_vec(&report).unwrap()).unwrap();
    p
}

fn config(td: &TempDir) -> ScanConfig {
    ScanConfig {
        plan: PlanSource::FailureReport {
            report: failure_report(td.path()),
            plan_out: td.path().join("scan_plan.json"),
        },
        results_dir: td.path().join("results"),
        ..ScanConfig::default()
    }
}

fn read(p: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(p).unwrap()).unwrap()
}

#[test]
fn full_run_writes_reports_and_summary() {
    let td = tempfile::tempdir().unwrap();
    let cfg = config(&td);
    let out = run(&store(), &cfg).unwrap();

    let names: Vec<&str> = out.results.iter().map(|r| r.collection.as_str()).collect();
    assert_eq!(names, vec!["users", REL]);
    assert_eq!(out.results[1].source_cardinality, Some(json!(5)));
    assert_eq!(out.results[1].dest_cardinality, Some(json!(10)));
    assert_eq!(out.results[0].dest_cardinality, None);

    let s = &out.summary;
    assert_eq!(s.targets_planned, 4);
    assert_eq!(s.targets_scanned, 3);
    assert_eq!(s.targets_failed, 1);
    assert_eq!(s.fields_scanned, 3);
    assert_eq!(s.fields_clean, 1);
    assert_eq!(s.collections_with_duplicates, 2);
    assert_eq!(s.duplicate_groups, 2);
    assert_eq!(s.enriched, 1);
    assert_eq!(s.reports_written, 3);
    assert_eq!(s.write_failures, 0);
    assert_eq!(s.report_digest.as_ref().map(String::len), Some(64));

    let results = td.path().join("results");
    let users = read(&results.join("users_duplicates.json"));
    assert_eq!(users["results"][0]["field"], json!("email"));
    assert_eq!(users["results"][0]["duplicates"][0]["members"], json!(["u1", "u2"]));
    assert!(users.get("destCardinality").is_none());
    let rel = read(&results.join("sharan.rels.clientContact_duplicates.json"));
    assert_eq!(rel["destCardinality"], json!(10));
    assert_eq!(rel["sourceCardinality"], json!(5));
    assert!(!results.join("orders_duplicates.json").exists());
    assert_eq!(read(&results.join(RUN_ARTIFACT)).as_array().unwrap().len(), 2);

    let summary = read(&results.join(SUMMARY_ARTIFACT));
    assert_eq!(summary["targetsFailed"], json!(1));
    assert!(summary["startedUtc"].as_str().unwrap().ends_with('Z'));

    // The generated plan is left on disk for reuse.
    let plan = read(&td.path().join("scan_plan.json"));
    assert_eq!(plan.as_array().unwrap().len(), 4);
}

#[test]
fn worker_pool_keeps_plan_order() {
    let td = tempfile::tempdir().unwrap();
    let sequential = run(&store(), &config(&td)).unwrap();

    let td2 = tempfile::tempdir().unwrap();
    let cfg = ScanConfig { workers: 4, ..config(&td2) };
    let pooled = run(&store(), &cfg).unwrap();

    let order = |o: &dupscan_core::pipeline::RunOutput| {
        o.results.iter().map(|r| r.collection.clone()).collect::<Vec<_>>()
    };
    assert_eq!(order(&sequential), order(&pooled));
    assert_eq!(sequential.results, pooled.results);
    assert_eq!(sequential.summary.duplicate_groups, pooled.summary.duplicate_groups);
}

#[test]
fn missing_report_aborts_before_any_scan() {
    let td = tempfile::tempdir().unwrap();
    let cfg = ScanConfig {
        plan: PlanSource::FailureReport {
            report: td.path().join("nope.json"),
            plan_out: td.path().join("scan_plan.json"),
        },
        results_dir: td.path().join("results"),
        ..ScanConfig::default()
    };
    let err = run(&store(), &cfg).expect_err("missing report");
    assert!(matches!(err, DupscanError::ConfigGeneration { .. }));
    assert!(err.is_fatal());
    assert!(!td.path().join("results").exists());
}

#[test]
fn precomputed_plan_skips_generation() {
    let td = tempfile::tempdir().unwrap();
    let plan = td.path().join("plan.json");
    write_plan(&plan, &[ScanTarget { collection: "users".into(), fields: vec!["email".into()] }]).unwrap();
    let cfg = ScanConfig {
        plan: PlanSource::Precomputed(plan),
        results_dir: td.path().join("out"),
        ..ScanConfig::default()
    };
    let out = run(&store(), &cfg).unwrap();
    assert_eq!(out.results.len(), 1);
    assert_eq!(out.summary.report_digest, None);
    assert_eq!(out.summary.targets_planned, 1);
}

#[test]
fn collection_filter_drops_targets() {
    let td = tempfile::tempdir().unwrap();
    let cfg = ScanConfig {
        filter: CollectionFilter::new(&[], &["*.rels.*".to_string(), "ghost".to_string()]).unwrap(),
        progress: true,
        ..config(&td)
    };
    let out = run(&store(), &cfg).unwrap();
    assert_eq!(out.summary.targets_filtered_out, 2);
    assert_eq!(out.summary.targets_failed, 0);
    assert_eq!(out.results.len(), 1);
    assert_eq!(out.results[0].collection, "users");
}

#[test]
fn nothing_found_still_writes_empty_run_artifact() {
    let td = tempfile::tempdir().unwrap();
    let plan = td.path().join("plan.json");
    write_plan(&plan, &[ScanTarget { collection: "orders".into(), fields: vec!["ref".into()] }]).unwrap();
    let cfg = ScanConfig {
        plan: PlanSource::Precomputed(plan),
        results_dir: td.path().join("out"),
        ..ScanConfig::default()
    };
    let out = run(&store(), &cfg).unwrap();
    assert!(out.results.is_empty());
    assert_eq!(read(&td.path().join("out").join(RUN_ARTIFACT)), json!([]));
}

#[test]
fn progress_counters_accumulate_while_ticking() {
    use dupscan_core::progress::Progress;
    use std::time::Duration;

    let p = Progress::with_interval(true, Duration::from_millis(5));
    p.set_stage("Scanning");
    p.set_targets_total(3);
    p.start();
    for _ in 0..3 {
        p.inc_target();
        p.add_groups(2);
    }
    std::thread::sleep(Duration::from_millis(20));
    p.stop();
    assert_eq!(p.targets_done(), 3);
    assert_eq!(p.groups_found.load(std::sync::atomic::Ordering::Relaxed), 6);
}
