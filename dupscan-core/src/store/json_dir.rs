use super::{find_first, group_documents, DocumentStore, GroupRow, IndexDefinition, IndexUsage};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::path_safety::{artifact_file_name, resolve_in_dir, PathPolicy};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::debug;
use walkdir::WalkDir;

const DOCS_SUFFIX: &str = ".json";
const INDEXES_SUFFIX: &str = ".indexes.json";

/// Store backed by a dump directory:
///
/// ```text
/// <uri>/<database>/<collection>.json          JSON array of documents
/// <uri>/<database>/<collection>.indexes.json  index definitions + usage counters
/// ```
///
/// Collections are parsed on first use and cached until the store is dropped.
pub struct JsonDirStore {
    db_dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<Vec<Value>>>>,
}

#[derive(Deserialize)]
struct StoredIndex {
    #[serde(flatten)]
    definition: IndexDefinition,
    #[serde(default)]
    accesses: Option<StoredAccesses>,
}

#[derive(Deserialize)]
struct StoredAccesses {
    ops: u64,
    #[serde(default)]
    since: Option<String>,
}

impl JsonDirStore {
    pub fn connect(cfg: &StoreConfig) -> Result<Self, StoreError> {
        let root = match cfg.uri.strip_prefix("file://") {
            Some(rest) => rest,
            None if cfg.uri.contains("://") => {
                return Err(StoreError::UnsupportedUri(cfg.uri.clone()));
            }
            None => cfg.uri.as_str(),
        };
        let db_dir = Path::new(root).join(&cfg.database);
        if !db_dir.is_dir() {
            return Err(StoreError::DatabaseNotFound(db_dir));
        }
        debug!(db = %db_dir.display(), "store connection opened");
        Ok(Self { db_dir, cache: RwLock::new(HashMap::new()) })
    }

    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }

    fn file_for(&self, collection: &str, suffix: &str) -> Result<PathBuf, StoreError> {
        resolve_in_dir(&self.db_dir, &artifact_file_name(collection, suffix), PathPolicy::default())
            .map_err(|e| StoreError::Malformed {
                collection: collection.to_string(),
                reason: format!("{e:#}"),
            })
    }

    fn docs(&self, collection: &str) -> Result<Arc<Vec<Value>>, StoreError> {
        if let Some(docs) = self.cache.read().unwrap_or_else(PoisonError::into_inner).get(collection) {
            return Ok(Arc::clone(docs));
        }
        let path = self.file_for(collection, DOCS_SUFFIX)?;
        if !path.is_file() {
            return Err(StoreError::CollectionNotFound(collection.to_string()));
        }
        let docs: Vec<Value> = serde_json::from_reader(BufReader::new(File::open(&path)?))
            .map_err(|e| StoreError::Malformed {
                collection: collection.to_string(),
                reason: e.to_string(),
            })?;
        debug!(collection, documents = docs.len(), "collection loaded");
        let docs = Arc::new(docs);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collection.to_string(), Arc::clone(&docs));
        Ok(docs)
    }

    fn stored_indexes(&self, collection: &str) -> Result<Vec<StoredIndex>, StoreError> {
        // Existence is decided by the documents file.
        self.docs(collection)?;
        let path = self.file_for(collection, INDEXES_SUFFIX)?;
        if !path.is_file() {
            return Ok(vec![StoredIndex {
                definition: IndexDefinition {
                    name: "_id_".to_string(),
                    key: json!({ "_id": 1 }),
                    unique: None,
                },
                accesses: None,
            }]);
        }
        serde_json::from_reader(BufReader::new(File::open(&path)?)).map_err(|e| {
            StoreError::Malformed { collection: collection.to_string(), reason: e.to_string() }
        })
    }
}

impl Drop for JsonDirStore {
    fn drop(&mut self) {
        debug!(db = %self.db_dir.display(), "store connection released");
    }
}

impl DocumentStore for JsonDirStore {
    fn collection_names(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for ent in WalkDir::new(&self.db_dir).min_depth(1).max_depth(1) {
            let ent = ent.map_err(|e| StoreError::Failed(e.to_string()))?;
            if !ent.file_type().is_file() {
                continue;
            }
            let Some(name) = ent.file_name().to_str() else { continue };
            if name.ends_with(INDEXES_SUFFIX) {
                continue;
            }
            if let Some(stem) = name.strip_suffix(DOCS_SUFFIX) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn count_documents(&self, collection: &str) -> Result<u64, StoreError> {
        Ok(self.docs(collection)?.len() as u64)
    }

    fn group_by_field(
        &self,
        collection: &str,
        field: &str,
        min_count: usize,
        deadline: Option<Instant>,
    ) -> Result<Vec<GroupRow>, StoreError> {
        let docs = self.docs(collection)?;
        group_documents(docs.iter(), collection, field, min_count, deadline)
    }

    fn find_one(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Option<Value>, StoreError> {
        match self.docs(collection) {
            Ok(docs) => Ok(find_first(docs.iter(), field, value)),
            Err(StoreError::CollectionNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDefinition>, StoreError> {
        Ok(self.stored_indexes(collection)?.into_iter().map(|i| i.definition).collect())
    }

    fn index_stats(&self, collection: &str) -> Result<Vec<IndexUsage>, StoreError> {
        Ok(self
            .stored_indexes(collection)?
            .into_iter()
            .filter_map(|i| {
                i.accesses.map(|a| IndexUsage { name: i.definition.name, ops: a.ops, since: a.since })
            })
            .collect())
    }
}
