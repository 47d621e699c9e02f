//! Document store seam. The pipeline only talks to [`DocumentStore`]; the CLI
//! backs it with [`JsonDirStore`], tests with [`MemoryStore`].

pub mod json_dir;
pub mod memory;

pub use json_dir::JsonDirStore;
pub use memory::MemoryStore;

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;

/// One group produced by a grouping query: the shared value and the
/// identifiers of every document carrying it.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupRow {
    pub key: Value,
    pub ids: Vec<Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct IndexDefinition {
    pub name: String,
    pub key: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
}

/// Usage counters the store keeps per index.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct IndexUsage {
    pub name: String,
    pub ops: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
}

pub trait DocumentStore: Send + Sync {
    fn collection_names(&self) -> Result<Vec<String>, StoreError>;

    /// Fails with [`StoreError::CollectionNotFound`] when the collection does not exist.
    fn count_documents(&self, collection: &str) -> Result<u64, StoreError>;

    /// Group every document by the value at `field` (dotted paths allowed,
    /// missing values group under null) and return groups with at least
    /// `min_count` members, in first-seen order.
    fn group_by_field(
        &self,
        collection: &str,
        field: &str,
        min_count: usize,
        deadline: Option<Instant>,
    ) -> Result<Vec<GroupRow>, StoreError>;

    /// First document whose `field` equals `value`. A missing collection
    /// yields `Ok(None)`.
    fn find_one(&self, collection: &str, field: &str, value: &Value)
        -> Result<Option<Value>, StoreError>;

    fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDefinition>, StoreError>;

    fn index_stats(&self, collection: &str) -> Result<Vec<IndexUsage>, StoreError>;
}

const DEADLINE_CHECK_EVERY: usize = 1024;

/// Resolve a dotted path inside a document.
pub fn field_value<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |cur, seg| cur.as_object()?.get(seg))
}

/// Shared grouping kernel for the in-process stores.
pub(crate) fn group_documents<'a, I>(
    docs: I,
    collection: &str,
    field: &str,
    min_count: usize,
    deadline: Option<Instant>,
) -> Result<Vec<GroupRow>, StoreError>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut rows: Vec<GroupRow> = Vec::new();
    for (pos, doc) in docs.into_iter().enumerate() {
        if pos % DEADLINE_CHECK_EVERY == 0 {
            if let Some(d) = deadline {
                if Instant::now() >= d {
                    return Err(StoreError::Timeout {
                        collection: collection.to_string(),
                        field: field.to_string(),
                    });
                }
            }
        }
        let key = field_value(doc, field).cloned().unwrap_or(Value::Null);
        // Documents without `_id` are identified by position.
        let id = doc.get("_id").cloned().unwrap_or_else(|| Value::from(pos as u64));
        let canon = key.to_string();
        match slots.get(&canon) {
            Some(&i) => rows[i].ids.push(id),
            None => {
                slots.insert(canon, rows.len());
                rows.push(GroupRow { key, ids: vec![id] });
            }
        }
    }
    rows.retain(|r| r.ids.len() >= min_count);
    Ok(rows)
}

pub(crate) fn find_first<'a, I>(docs: I, field: &str, value: &Value) -> Option<Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    docs.into_iter().find(|d| field_value(d, field) == Some(value)).cloned()
}
