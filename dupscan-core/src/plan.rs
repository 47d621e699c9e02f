use crate::config::{DUPLICATE_KEY_CODE, SINGLE_FIELD_INDEX_SUFFIX};
use crate::error::{DupscanError, Result};
use crate::failure_report::FailureReport;
use crate::model::ScanTarget;
use serde_json::Value;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use tracing::{debug, info, warn};

/// A plan derived from a failure report, plus the report's blake3 digest.
#[derive(Debug, Clone)]
pub struct GeneratedPlan {
    pub targets: Vec<ScanTarget>,
    pub report_digest: String,
}

/// Field name for a single-field index: the `_1` suffix removed once.
pub fn strip_index_suffix(index: &str) -> &str {
    index.strip_suffix(SINGLE_FIELD_INDEX_SUFFIX).unwrap_or(index)
}

/// Derive scan targets from a parsed report. Only duplicate-key failures
/// contribute fields; collections left without fields are dropped.
pub fn generate_plan(report: &FailureReport) -> Vec<ScanTarget> {
    let mut targets = Vec::new();
    for cf in &report.collections {
        let mut fields: Vec<String> = Vec::new();
        for (index, failure) in &cf.indexes {
            if !failure.has_code(DUPLICATE_KEY_CODE) {
                debug!(collection = %cf.collection, index = %index, code = ?failure.code(), "index failure ignored");
                continue;
            }
            let field = strip_index_suffix(index);
            if field.is_empty() {
                warn!(collection = %cf.collection, index = %index, "index name has no field part");
                continue;
            }
            if !fields.iter().any(|f| f == field) {
                fields.push(field.to_string());
            }
        }
        if fields.is_empty() {
            debug!(collection = %cf.collection, "no duplicate-key failures");
            continue;
        }
        targets.push(ScanTarget { collection: cf.collection.clone(), fields });
    }
    targets
}

/// Read the report at `report_path`, derive the plan and persist it to `plan_out`.
pub fn generate_plan_file(report_path: &Path, plan_out: &Path) -> Result<GeneratedPlan> {
    let gen_err = |path: &Path, reason: String| DupscanError::ConfigGeneration {
        path: path.to_path_buf(),
        reason,
    };
    let bytes = fs::read(report_path).map_err(|e| gen_err(report_path, e.to_string()))?;
    let report = FailureReport::parse(&bytes).map_err(|reason| gen_err(report_path, reason))?;
    let targets = generate_plan(&report);
    write_plan(plan_out, &targets).map_err(|e| gen_err(plan_out, e.to_string()))?;
    info!(
        report = %report_path.display(),
        plan = %plan_out.display(),
        collections = report.collections.len(),
        targets = targets.len(),
        "scan plan generated"
    );
    Ok(GeneratedPlan { targets, report_digest: blake3::hash(&bytes).to_hex().to_string() })
}

pub fn write_plan(path: &Path, targets: &[ScanTarget]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut w = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut w, targets)?;
    std::io::Write::flush(&mut w)
}

/// Load a plan artifact. Malformed elements are skipped with a warning;
/// repeated collections are merged into their first occurrence.
pub fn load_plan(path: &Path) -> Result<Vec<ScanTarget>> {
    let load_err = |reason: String| DupscanError::ConfigLoad { path: path.to_path_buf(), reason };
    let bytes = fs::read(path).map_err(|e| load_err(e.to_string()))?;
    let root: Value = serde_json::from_slice(&bytes).map_err(|e| load_err(format!("invalid JSON: {e}")))?;
    let Value::Array(items) = root else {
        return Err(load_err("plan must be an array of {collection, fields}".to_string()));
    };

    let mut targets: Vec<ScanTarget> = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let Some(target) = parse_target(i, item) else { continue };
        match targets.iter_mut().find(|t| t.collection == target.collection) {
            Some(existing) => {
                for f in target.fields {
                    if !existing.fields.contains(&f) {
                        existing.fields.push(f);
                    }
                }
            }
            None => targets.push(target),
        }
    }
    info!(plan = %path.display(), entries = items.len(), targets = targets.len(), "scan plan loaded");
    Ok(targets)
}

fn parse_target(i: usize, item: &Value) -> Option<ScanTarget> {
    let collection = match item.get("collection").and_then(Value::as_str) {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => {
            warn!(entry = i, "plan entry skipped: collection must be a non-empty string");
            return None;
        }
    };
    let Some(raw_fields) = item.get("fields").and_then(Value::as_array) else {
        warn!(entry = i, collection = %collection, "plan entry skipped: fields must be an array");
        return None;
    };
    let mut fields: Vec<String> = Vec::with_capacity(raw_fields.len());
    for f in raw_fields {
        match f.as_str() {
            Some(s) if !s.is_empty() => {
                if !fields.iter().any(|x| x == s) {
                    fields.push(s.to_string());
                }
            }
            _ => warn!(entry = i, collection = %collection, value = %f, "invalid field name skipped"),
        }
    }
    if fields.is_empty() {
        warn!(entry = i, collection = %collection, "plan entry skipped: no fields to scan");
        return None;
    }
    Some(ScanTarget { collection, fields })
}
