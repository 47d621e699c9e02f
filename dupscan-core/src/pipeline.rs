//! The audit run: plan → (scan → enrich per target) → write.

use crate::config::{PlanSource, ScanConfig, StoreConfig};
use crate::enrich::{enrich, Enrichment};
use crate::error::{DupscanError, Result};
use crate::model::{CollectionResult, ScanTarget};
use crate::plan::{generate_plan_file, load_plan};
use crate::progress::Progress;
use crate::scan::{scan_target, ScanOptions, TargetOutcome};
use crate::store::{DocumentStore, JsonDirStore};
use crate::writer::{write_artifact, write_reports, SUMMARY_ARTIFACT};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use tracing::{info, info_span, warn};

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub started_utc: String,
    pub finished_utc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_digest: Option<String>,
    pub targets_planned: usize,
    pub targets_filtered_out: usize,
    pub targets_scanned: usize,
    pub targets_failed: usize,
    pub fields_scanned: usize,
    pub fields_clean: usize,
    pub fields_failed: usize,
    pub collections_with_duplicates: usize,
    pub duplicate_groups: usize,
    pub enriched: usize,
    pub enrichment_misses: usize,
    pub reports_written: usize,
    pub write_failures: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Targets: {} planned, {} scanned, {} failed, {} filtered out",
            self.targets_planned, self.targets_scanned, self.targets_failed, self.targets_filtered_out
        )?;
        writeln!(
            f,
            "Fields: {} scanned, {} clean, {} failed",
            self.fields_scanned, self.fields_clean, self.fields_failed
        )?;
        writeln!(
            f,
            "Collections with duplicates: {} ({} groups)",
            self.collections_with_duplicates, self.duplicate_groups
        )?;
        writeln!(
            f,
            "Relationship metadata: {} attached, {} missing",
            self.enriched, self.enrichment_misses
        )?;
        write!(f, "Reports: {} written, {} failed", self.reports_written, self.write_failures)
    }
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub summary: RunSummary,
    /// Collections with at least one duplicate finding, in plan order.
    pub results: Vec<CollectionResult>,
}

/// Plan first, then connect to the store described by `store_cfg` for the
/// rest of the run. The connection is released when this returns.
pub fn run_connected(store_cfg: &StoreConfig, cfg: &ScanConfig) -> Result<RunOutput> {
    let started_utc = now_utc();
    let plan = plan_stage(cfg)?;
    let store = JsonDirStore::connect(store_cfg).map_err(|e| {
        tracing::error!(error = %e, "fatal: store unavailable");
        DupscanError::Connect(e)
    })?;
    Ok(execute(&store, cfg, plan, started_utc))
}

/// Run the full audit against `store`. Only plan generation or loading can fail
/// the run; every other failure is logged and reflected in the summary.
pub fn run(store: &dyn DocumentStore, cfg: &ScanConfig) -> Result<RunOutput> {
    let started_utc = now_utc();
    let plan = plan_stage(cfg)?;
    Ok(execute(store, cfg, plan, started_utc))
}

fn execute(
    store: &dyn DocumentStore,
    cfg: &ScanConfig,
    (targets, report_digest): (Vec<ScanTarget>, Option<String>),
    started_utc: String,
) -> RunOutput {
    let planned = targets.len();
    let targets: Vec<ScanTarget> = targets
        .into_iter()
        .filter(|t| {
            let keep = cfg.filter.admits(&t.collection);
            if !keep {
                info!(collection = %t.collection, "excluded by collection filter");
            }
            keep
        })
        .collect();
    let mut summary = RunSummary {
        report_digest,
        targets_planned: planned,
        targets_filtered_out: planned - targets.len(),
        ..RunSummary::default()
    };

    let progress = Progress::new(cfg.progress);
    progress.set_stage("Scanning");
    progress.set_targets_total(targets.len());
    progress.start();
    let outcomes = scan_all(store, cfg, &targets, &progress);
    progress.stop();

    let mut results = Vec::new();
    for (outcome, enrichment) in outcomes {
        match outcome {
            TargetOutcome::Scanned { result, tally } => {
                summary.targets_scanned += 1;
                summary.fields_scanned += tally.scanned;
                summary.fields_clean += tally.clean;
                summary.fields_failed += tally.failed;
                match enrichment {
                    Enrichment::Attached => summary.enriched += 1,
                    Enrichment::Missing | Enrichment::Failed => summary.enrichment_misses += 1,
                    Enrichment::NotApplicable => {}
                }
                if !result.results.is_empty() {
                    summary.collections_with_duplicates += 1;
                    summary.duplicate_groups += result.group_count();
                    results.push(result);
                }
            }
            TargetOutcome::Skipped(_) => summary.targets_failed += 1,
        }
    }

    let written = write_reports(&cfg.results_dir, &results);
    summary.reports_written = written.written.len();
    summary.write_failures = written.failures.len();
    summary.started_utc = started_utc;
    summary.finished_utc = now_utc();
    if let Err(e) = write_artifact(&cfg.results_dir, SUMMARY_ARTIFACT, &summary) {
        warn!(error = %e, "run summary not written");
    }
    info!(
        collections = summary.collections_with_duplicates,
        groups = summary.duplicate_groups,
        failed_targets = summary.targets_failed,
        "audit run complete"
    );
    RunOutput { summary, results }
}

fn plan_stage(cfg: &ScanConfig) -> Result<(Vec<ScanTarget>, Option<String>)> {
    let _span = info_span!("plan").entered();
    let outcome = match &cfg.plan {
        PlanSource::FailureReport { report, plan_out } => generate_plan_file(report, plan_out)
            .and_then(|g| Ok((load_plan(plan_out)?, Some(g.report_digest)))),
        PlanSource::Precomputed(path) => load_plan(path).map(|t| (t, None)),
    };
    if let Err(e) = &outcome {
        tracing::error!(error = %e, "fatal: no scan plan");
    }
    outcome
}

/// Scan and enrich each target on a bounded pool. The output is positional:
/// entry `i` belongs to `targets[i]`.
fn scan_all(
    store: &dyn DocumentStore,
    cfg: &ScanConfig,
    targets: &[ScanTarget],
    progress: &Progress,
) -> Vec<(TargetOutcome, Enrichment)> {
    let opts = ScanOptions { timeout: cfg.scan_timeout, include_index_count: cfg.include_index_count };
    let process = |t: &ScanTarget| {
        let _span = info_span!("target", collection = %t.collection).entered();
        let mut outcome = scan_target(store, t, &opts);
        let enrichment = match &mut outcome {
            TargetOutcome::Scanned { result, .. } => {
                progress.add_groups(result.group_count());
                enrich(store, result, &cfg.meta_collection, &cfg.relationship_token)
            }
            TargetOutcome::Skipped(_) => Enrichment::NotApplicable,
        };
        progress.inc_target();
        (outcome, enrichment)
    };

    if cfg.workers <= 1 {
        return targets.iter().map(process).collect();
    }
    match rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.workers)
        .thread_name(|i| format!("dupscan-scan-{i}"))
        .build()
    {
        Ok(pool) => pool.install(|| targets.par_iter().map(process).collect()),
        Err(e) => {
            warn!(error = %e, workers = cfg.workers, "worker pool unavailable, scanning sequentially");
            targets.iter().map(process).collect()
        }
    }
}

fn now_utc() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
