use crate::config::IndexAuditConfig;
use crate::error::StoreError;
use crate::path_safety::artifact_file_name;
use crate::store::DocumentStore;
use crate::writer::write_artifact;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

pub const INDEXES_SUFFIX: &str = "_indexes.json";

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
    pub collection: String,
    pub index_count: usize,
    pub indexes: Vec<IndexEntry>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub name: String,
    pub key: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    /// `None` when the store has no usage counters for this index.
    pub ops: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IndexAuditSummary {
    pub collections_checked: usize,
    pub collections_failed: usize,
    /// Collections at or above the ceiling, in store order.
    pub flagged: Vec<IndexReport>,
    pub written: Vec<PathBuf>,
    pub write_failures: usize,
}

/// Indexes of one collection merged with their usage, busiest first.
/// Indexes without counters sort last, ties by name.
pub fn audit_collection(store: &dyn DocumentStore, collection: &str) -> Result<IndexReport, StoreError> {
    let defs = store.list_indexes(collection)?;
    let usage: HashMap<String, (u64, Option<String>)> = match store.index_stats(collection) {
        Ok(stats) => stats.into_iter().map(|u| (u.name, (u.ops, u.since))).collect(),
        Err(e) => {
            warn!(collection, error = %e, "index usage unavailable");
            HashMap::new()
        }
    };
    let mut indexes: Vec<IndexEntry> = defs
        .into_iter()
        .map(|d| {
            let (ops, since) = match usage.get(&d.name) {
                Some((ops, since)) => (Some(*ops), since.clone()),
                None => (None, None),
            };
            IndexEntry { name: d.name, key: d.key, unique: d.unique, ops, since }
        })
        .collect();
    indexes.sort_by(|a, b| match (a.ops, b.ops) {
        (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.name.cmp(&b.name)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.name.cmp(&b.name),
    });
    Ok(IndexReport { collection: collection.to_string(), index_count: indexes.len(), indexes })
}

/// Audit every admitted collection and write a report for each one whose
/// index count meets `cfg.ceiling`. Only listing the collections can fail.
pub fn audit_indexes(
    store: &dyn DocumentStore,
    cfg: &IndexAuditConfig,
) -> Result<IndexAuditSummary, StoreError> {
    let mut summary = IndexAuditSummary::default();
    for collection in store.collection_names()? {
        if !cfg.filter.admits(&collection) {
            continue;
        }
        summary.collections_checked += 1;
        let report = match audit_collection(store, &collection) {
            Ok(r) => r,
            Err(e) => {
                summary.collections_failed += 1;
                warn!(collection = %collection, error = %e, "index audit skipped");
                continue;
            }
        };
        if report.index_count < cfg.ceiling {
            continue;
        }
        info!(collection = %collection, indexes = report.index_count, ceiling = cfg.ceiling, "index ceiling reached");
        if let Err(e) = std::fs::create_dir_all(&cfg.output_dir) {
            warn!(dir = %cfg.output_dir.display(), error = %e, "index audit directory unavailable");
        }
        match write_artifact(&cfg.output_dir, &artifact_file_name(&collection, INDEXES_SUFFIX), &report) {
            Ok(p) => summary.written.push(p),
            Err(e) => {
                summary.write_failures += 1;
                warn!(error = %e, "index report not written");
            }
        }
        summary.flagged.push(report);
    }
    Ok(summary)
}
