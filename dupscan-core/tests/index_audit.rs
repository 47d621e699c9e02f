use dupscan_core::config::{CollectionFilter, IndexAuditConfig};
use dupscan_core::index_audit::{audit_collection, audit_indexes};
use dupscan_core::store::{IndexDefinition, IndexUsage, MemoryStore};
use serde_json::json;

fn index(name: &str) -> IndexDefinition {
    let mut key = serde_json::Map::new();
    key.insert(name.to_string(), json!(1));
    IndexDefinition { name: name.to_string(), key: key.into(), unique: None }
}

fn usage(name: &str, ops: u64) -> IndexUsage {
    IndexUsage { name: name.to_string(), ops, since: None }
}

fn store() -> MemoryStore {
    let mut s = MemoryStore::new();
    s.insert_many("wide", vec![json!({ "_id": 1 })]);
    for n in ["c", "b", "a"] {
        s.add_index("wide", index(n));
    }
    s.set_index_usage("wide", usage("_id_", 3));
    s.set_index_usage("wide", usage("b", 0));
    s.set_index_usage("wide", usage("c", 40));
    s.insert_many("narrow", vec![json!({ "_id": 1 })]);
    s
}

#[test]
fn busiest_indexes_first_unknown_last() {
    let r = audit_collection(&store(), "wide").unwrap();
    assert_eq!(r.index_count, 4);
    let names: Vec<&str> = r.indexes.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["c", "_id_", "b", "a"]);
    assert_eq!(r.indexes[0].ops, Some(40));
    assert_eq!(r.indexes[3].ops, None);
}

#[test]
fn only_collections_at_the_ceiling_are_reported() {
    let td = tempfile::tempdir().unwrap();
    let cfg = IndexAuditConfig { output_dir: td.path().join("audit"), ceiling: 4, ..IndexAuditConfig::default() };
    let summary = audit_indexes(&store(), &cfg).unwrap();
    assert_eq!(summary.collections_checked, 2);
    assert_eq!(summary.flagged.len(), 1);
    assert_eq!(summary.flagged[0].collection, "wide");
    assert_eq!(summary.written.len(), 1);

    let report: serde_json::Value =
        serde_json::from_slice(&std::fs::read(td.path().join("audit").join("wide_indexes.json")).unwrap()).unwrap();
    assert_eq!(report["indexCount"], json!(4));
    assert_eq!(report["indexes"][0]["name"], json!("c"));
    assert!(report["indexes"][3]["ops"].is_null());
    assert!(!td.path().join("audit").join("narrow_indexes.json").exists());
}

#[test]
fn failures_are_contained() {
    let td = tempfile::tempdir().unwrap();
    let mut s = store();
    s.fail_index_stats("wide");
    s.fail_collection("narrow");
    let cfg = IndexAuditConfig {
        output_dir: td.path().to_path_buf(),
        ceiling: 1,
        filter: CollectionFilter::new(&["w*".to_string(), "n*".to_string()], &[]).unwrap(),
    };
    let summary = audit_indexes(&s, &cfg).unwrap();
    assert_eq!(summary.collections_checked, 2);
    assert_eq!(summary.collections_failed, 1);
    assert_eq!(summary.flagged.len(), 1);
    assert!(summary.flagged[0].indexes.iter().all(|i| i.ops.is_none()));
}
