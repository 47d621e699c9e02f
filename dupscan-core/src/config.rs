use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the store location, read by the CLI.
pub const ENV_STORE_URI: &str = "DUPSCAN_STORE_URI";
/// Environment variable holding the database name.
pub const ENV_DB_NAME: &str = "DUPSCAN_DB_NAME";

pub const DEFAULT_STORE_URI: &str = "./datastore";
pub const DEFAULT_DB_NAME: &str = "app";

/// Error code reported by the store for a duplicate-key collision.
pub const DUPLICATE_KEY_CODE: i64 = 11000;
/// Suffix the store appends to single-field ascending index names.
pub const SINGLE_FIELD_INDEX_SUFFIX: &str = "_1";

/// Connection parameters for a [`DocumentStore`](crate::store::DocumentStore).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    pub uri: String,
    pub database: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { uri: DEFAULT_STORE_URI.to_string(), database: DEFAULT_DB_NAME.to_string() }
    }
}

/// Where the scan plan comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlanSource {
    /// Generate the plan from a failure report, writing it to `plan_out`.
    FailureReport { report: PathBuf, plan_out: PathBuf },
    /// Load a previously generated (or hand-written) plan.
    Precomputed(PathBuf),
}

#[derive(Clone, Debug)]
pub struct ScanConfig {
    pub plan: PlanSource,
    pub results_dir: PathBuf,
    pub meta_collection: String,
    pub relationship_token: String,
    pub workers: usize,
    pub scan_timeout: Option<Duration>,
    pub include_index_count: bool,
    pub filter: CollectionFilter,
    pub progress: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            plan: PlanSource::FailureReport {
                report: PathBuf::from("index_failures.json"),
                plan_out: PathBuf::from("scan_plan.json"),
            },
            results_dir: PathBuf::from("results"),
            meta_collection: "meta".to_string(),
            relationship_token: ".rels.".to_string(),
            workers: 1,
            scan_timeout: None,
            include_index_count: false,
            filter: CollectionFilter::default(),
            progress: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct IndexAuditConfig {
    pub output_dir: PathBuf,
    pub ceiling: usize,
    pub filter: CollectionFilter,
}

impl Default for IndexAuditConfig {
    fn default() -> Self {
        Self { output_dir: PathBuf::from("index_audit"), ceiling: 64, filter: CollectionFilter::default() }
    }
}

/// Include/exclude glob patterns over collection names. An empty include
/// list admits everything.
#[derive(Clone, Debug, Default)]
pub struct CollectionFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl CollectionFilter {
    pub fn new(includes: &[String], excludes: &[String]) -> Result<Self, globset::Error> {
        Ok(Self { include: build_globset(includes)?, exclude: build_globset(excludes)? })
    }

    pub fn admits(&self, collection: &str) -> bool {
        if let Some(inc) = &self.include {
            if !inc.is_match(collection) {
                return false;
            }
        }
        match &self.exclude {
            Some(exc) => !exc.is_match(collection),
            None => true,
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>, globset::Error> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut b = GlobSetBuilder::new();
    for g in patterns {
        b.add(Glob::new(g)?);
    }
    Ok(Some(b.build()?))
}
