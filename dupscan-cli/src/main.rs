use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use dupscan_core::config::{
    CollectionFilter, IndexAuditConfig, PlanSource, ScanConfig, StoreConfig, DEFAULT_DB_NAME,
    DEFAULT_STORE_URI, ENV_DB_NAME, ENV_STORE_URI,
};
use dupscan_core::index_audit::audit_indexes;
use dupscan_core::pipeline::run_connected;
use dupscan_core::plan::generate_plan_file;
use dupscan_core::store::JsonDirStore;
use dupscan_core::CollectionResult;

const LOG_ENV: &str = "DUPSCAN_LOG";

#[derive(Parser)]
#[command(name = "dupscan", version, about = "Duplicate-key and index-ceiling audit for a document store")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Args, Clone)]
struct StoreArgs {
    /// Store location (a dump directory, optionally `file://`)
    #[arg(long, env = ENV_STORE_URI, default_value = DEFAULT_STORE_URI)]
    store_uri: String,
    /// Database name under the store location
    #[arg(long, env = ENV_DB_NAME, default_value = DEFAULT_DB_NAME)]
    db: String,
}

impl StoreArgs {
    fn config(&self) -> StoreConfig {
        StoreConfig { uri: self.store_uri.clone(), database: self.db.clone() }
    }
}

#[derive(Subcommand)]
enum Cmd {
    /// Derive a scan plan from an index-build failure report
    Generate {
        #[arg(long, default_value = "index_failures.json")]
        report: PathBuf,
        #[arg(long, default_value = "scan_plan.json")]
        out: PathBuf,
    },
    /// Plan, scan for duplicate values, enrich relationship collections and write reports
    Scan {
        #[command(flatten)]
        store: StoreArgs,
        /// Failure report to generate the plan from
        #[arg(long, default_value = "index_failures.json", conflicts_with = "plan")]
        report: PathBuf,
        /// Where the generated plan is written
        #[arg(long, default_value = "scan_plan.json")]
        plan_out: PathBuf,
        /// Use an existing plan instead of generating one
        #[arg(long)]
        plan: Option<PathBuf>,
        #[arg(long, default_value = "results")]
        results_dir: PathBuf,
        #[arg(long, default_value = "meta")]
        meta_collection: String,
        /// Collection-name token marking relationship collections
        #[arg(long, default_value = ".rels.")]
        rels_token: String,
        /// Collections scanned concurrently (1 = sequential)
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..=64))]
        workers: u16,
        /// Per-field scan timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Record each collection's index count in its report
        #[arg(long, default_value_t = false)]
        with_index_count: bool,
        #[arg(long)]
        include: Vec<String>,
        #[arg(long)]
        exclude: Vec<String>,
        #[arg(long, default_value_t = false)]
        progress: bool,
    },
    /// Flag collections whose index count reaches the ceiling
    IndexAudit {
        #[command(flatten)]
        store: StoreArgs,
        #[arg(long, default_value_t = 64)]
        ceiling: usize,
        #[arg(long, default_value = "index_audit")]
        output: PathBuf,
        #[arg(long)]
        include: Vec<String>,
        #[arg(long)]
        exclude: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "dupscan starting");
    match cli.cmd {
        Cmd::Generate { report, out } => generate(&report, &out)?,
        Cmd::Scan {
            store,
            report,
            plan_out,
            plan,
            results_dir,
            meta_collection,
            rels_token,
            workers,
            timeout_secs,
            with_index_count,
            include,
            exclude,
            progress,
        } => {
            let plan = match plan {
                Some(p) => PlanSource::Precomputed(p),
                None => PlanSource::FailureReport { report, plan_out },
            };
            let cfg = ScanConfig {
                plan,
                results_dir,
                meta_collection,
                relationship_token: rels_token,
                workers: workers as usize,
                scan_timeout: timeout_secs.map(Duration::from_secs),
                include_index_count: with_index_count,
                filter: CollectionFilter::new(&include, &exclude).context("bad collection glob")?,
                progress,
            };
            scan(&store.config(), &cfg)?;
        }
        Cmd::IndexAudit { store, ceiling, output, include, exclude } => {
            let cfg = IndexAuditConfig {
                output_dir: output,
                ceiling,
                filter: CollectionFilter::new(&include, &exclude).context("bad collection glob")?,
            };
            index_audit(&store.config(), &cfg)?;
        }
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new("dupscan=info,dupscan_core=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false);
    let _ = if json { builder.json().try_init() } else { builder.try_init() };
}

fn generate(report: &Path, out: &Path) -> Result<()> {
    let plan = generate_plan_file(report, out)?;
    for t in &plan.targets {
        println!("{}: {}", t.collection, t.fields.join(", "));
    }
    println!("Plan: {} target(s) written to {}", plan.targets.len(), out.display());
    Ok(())
}

fn scan(store_cfg: &StoreConfig, cfg: &ScanConfig) -> Result<()> {
    let out = run_connected(store_cfg, cfg).context("scan aborted")?;
    for r in &out.results {
        println!("{}", describe(r));
    }
    if out.results.is_empty() {
        println!("No duplicates found");
    }
    println!("{}", out.summary);
    Ok(())
}

fn describe(r: &CollectionResult) -> String {
    let fields: Vec<String> = r
        .results
        .iter()
        .map(|f| {
            let top = f.duplicates.first().map(|g| g.count).unwrap_or(0);
            format!("{} ({} groups, largest {})", f.field, f.duplicates.len(), top)
        })
        .collect();
    let mut line = format!("{}: {}", r.collection, fields.join("; "));
    if let Some(d) = &r.dest_cardinality {
        line.push_str(&format!(" destCardinality={d}"));
    }
    if let Some(s) = &r.source_cardinality {
        line.push_str(&format!(" sourceCardinality={s}"));
    }
    line
}

fn index_audit(store_cfg: &StoreConfig, cfg: &IndexAuditConfig) -> Result<()> {
    let store = JsonDirStore::connect(store_cfg)
        .with_context(|| format!("connect to {}/{}", store_cfg.uri, store_cfg.database))?;
    let summary = audit_indexes(&store, cfg).context("list collections")?;
    println!("Index audit across {} collection(s), ceiling {}:", summary.collections_checked, cfg.ceiling);
    for r in &summary.flagged {
        let busiest = r.indexes.first().map(|i| i.name.as_str()).unwrap_or("-");
        println!("  {:30}  indexes {:4}   busiest: {}", r.collection, r.index_count, busiest);
    }
    if summary.flagged.is_empty() {
        println!("  (no collection at or above the ceiling)");
    }
    if summary.collections_failed > 0 || summary.write_failures > 0 {
        println!("  {} collection(s) failed, {} report(s) not written", summary.collections_failed, summary.write_failures);
    }
    Ok(())
}
