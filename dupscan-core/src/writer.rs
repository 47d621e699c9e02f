use crate::error::DupscanError;
use crate::model::CollectionResult;
use crate::path_safety::{artifact_file_name, resolve_in_dir, PathPolicy};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DUPLICATES_SUFFIX: &str = "_duplicates.json";
/// Combined run artifact. Never ends in [`DUPLICATES_SUFFIX`], so no
/// collection name can map onto it.
pub const RUN_ARTIFACT: &str = "duplicates_all.json";
pub const SUMMARY_ARTIFACT: &str = "run_summary.json";

#[derive(Debug, Default)]
pub struct WriteReport {
    pub written: Vec<PathBuf>,
    pub failures: Vec<DupscanError>,
}

/// Write one `<collection>_duplicates.json` per result and the combined
/// `duplicates_all.json`. A failed artifact does not stop the others. A
/// collection whose file name was already taken by an earlier one is recorded
/// as a failure rather than overwriting it.
pub fn write_reports(dir: &Path, results: &[CollectionResult]) -> WriteReport {
    let mut report = WriteReport::default();
    if let Err(e) = fs::create_dir_all(dir) {
        warn!(dir = %dir.display(), error = %e, "results directory unavailable");
    }
    let mut claimed: HashMap<String, &str> = HashMap::new();
    for r in results {
        let name = artifact_file_name(&r.collection, DUPLICATES_SUFFIX);
        if let Some(first) = claimed.get(name.as_str()) {
            let err = DupscanError::Write {
                path: dir.join(&name),
                reason: format!("collection {} maps to the same file as {first}", r.collection),
            };
            record(&mut report, Err(err));
            continue;
        }
        record(&mut report, write_artifact(dir, &name, r));
        claimed.insert(name, &r.collection);
    }
    record(&mut report, write_artifact(dir, RUN_ARTIFACT, results));
    info!(dir = %dir.display(), written = report.written.len(), failed = report.failures.len(), "reports written");
    report
}

fn record(report: &mut WriteReport, outcome: Result<PathBuf, DupscanError>) {
    match outcome {
        Ok(p) => report.written.push(p),
        Err(e) => {
            warn!(error = %e, "artifact not written");
            report.failures.push(e);
        }
    }
}

/// Serialize `value` as pretty JSON to `dir/file_name`.
pub fn write_artifact<T: Serialize + ?Sized>(
    dir: &Path,
    file_name: &str,
    value: &T,
) -> Result<PathBuf, DupscanError> {
    let path = resolve_in_dir(dir, file_name, PathPolicy::default()).map_err(|e| {
        DupscanError::Write { path: dir.join(file_name), reason: format!("{e:#}") }
    })?;
    let write = || -> std::io::Result<()> {
        let mut w = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut w, value)?;
        w.write_all(b"\n")?;
        w.flush()
    };
    write().map_err(|e| DupscanError::Write { path: path.clone(), reason: e.to_string() })?;
    Ok(path)
}
