use std::path::PathBuf;

/// Errors raised by a [`DocumentStore`](crate::store::DocumentStore) backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("unsupported store uri: {0}")]
    UnsupportedUri(String),

    #[error("database not found at {0}")]
    DatabaseNotFound(PathBuf),

    #[error("query on {collection}.{field} exceeded its deadline")]
    Timeout { collection: String, field: String },

    #[error("malformed data in {collection}: {reason}")]
    Malformed { collection: String, reason: String },

    #[error("store failure: {0}")]
    Failed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stage-level error taxonomy for an audit run.
///
/// `ConfigGeneration`, `ConfigLoad` and `Connect` are fatal. The remaining
/// variants are logged and contained at the smallest scope that produced them.
#[derive(Debug, thiserror::Error)]
pub enum DupscanError {
    #[error("config generation failed for {path}: {reason}")]
    ConfigGeneration { path: PathBuf, reason: String },

    #[error("scan plan load failed for {path}: {reason}")]
    ConfigLoad { path: PathBuf, reason: String },

    #[error("store connection failed: {0}")]
    Connect(#[source] StoreError),

    #[error("scan of {collection}{} failed: {source}", .field.as_deref().map(|f| format!(".{f}")).unwrap_or_default())]
    Scan {
        collection: String,
        field: Option<String>,
        #[source]
        source: StoreError,
    },

    #[error("metadata lookup for {collection} failed: {source}")]
    Enrichment {
        collection: String,
        #[source]
        source: StoreError,
    },

    #[error("writing {path} failed: {reason}")]
    Write { path: PathBuf, reason: String },
}

impl DupscanError {
    /// True for errors that must abort the run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DupscanError::ConfigGeneration { .. }
                | DupscanError::ConfigLoad { .. }
                | DupscanError::Connect(_)
        )
    }
}

pub type Result<T, E = DupscanError> = std::result::Result<T, E>;
