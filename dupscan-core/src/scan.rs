use crate::error::{DupscanError, Result};
use crate::model::{CollectionResult, DuplicateGroup, FieldScanResult, ScanTarget};
use crate::store::DocumentStore;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, Default)]
pub struct ScanOptions {
    pub timeout: Option<Duration>,
    pub include_index_count: bool,
}

/// Per-target field bookkeeping. `scanned` counts every attempted field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldTally {
    pub scanned: usize,
    pub clean: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub enum TargetOutcome {
    Scanned { result: CollectionResult, tally: FieldTally },
    /// The collection could not be opened; nothing was scanned.
    Skipped(DupscanError),
}

/// Group `collection` by `field` and keep groups with more than one member,
/// largest first.
pub fn scan_field(
    store: &dyn DocumentStore,
    collection: &str,
    field: &str,
    timeout: Option<Duration>,
) -> Result<Vec<DuplicateGroup>> {
    let deadline = timeout.map(|t| Instant::now() + t);
    let rows = store.group_by_field(collection, field, 2, deadline).map_err(|source| {
        DupscanError::Scan { collection: collection.to_string(), field: Some(field.to_string()), source }
    })?;
    let mut groups: Vec<DuplicateGroup> = rows
        .into_iter()
        .filter(|r| r.ids.len() > 1)
        .map(|r| DuplicateGroup { key: r.key, count: r.ids.len() as u64, members: r.ids })
        .collect();
    groups.sort_by(|a, b| b.count.cmp(&a.count));
    Ok(groups)
}

/// Scan every field of `target`. Field failures are logged and counted as
/// clean; only a failure to open the collection skips it.
pub fn scan_target(store: &dyn DocumentStore, target: &ScanTarget, opts: &ScanOptions) -> TargetOutcome {
    let collection = target.collection.as_str();
    let docs = match store.count_documents(collection) {
        Ok(n) => n,
        Err(source) => {
            let err = DupscanError::Scan { collection: collection.to_string(), field: None, source };
            warn!(collection, error = %err, "collection skipped");
            return TargetOutcome::Skipped(err);
        }
    };
    debug!(collection, documents = docs, fields = target.fields.len(), "scanning collection");

    let mut result = CollectionResult::new(collection);
    let mut tally = FieldTally::default();
    for field in &target.fields {
        tally.scanned += 1;
        match scan_field(store, collection, field, opts.timeout) {
            Ok(groups) if groups.is_empty() => {
                tally.clean += 1;
                info!(collection, field = %field, "checked, clean");
            }
            Ok(groups) => {
                info!(collection, field = %field, groups = groups.len(), "duplicates found");
                result.results.push(FieldScanResult { field: field.clone(), duplicates: groups });
            }
            Err(err) => {
                tally.failed += 1;
                warn!(collection, field = %field, error = %err, "field scan failed, treating as clean");
            }
        }
    }

    if opts.include_index_count {
        match store.list_indexes(collection) {
            Ok(ix) => result.index_count = Some(ix.len() as u64),
            Err(e) => warn!(collection, error = %e, "index count unavailable"),
        }
    }
    TargetOutcome::Scanned { result, tally }
}
