use super::{find_first, group_documents, DocumentStore, GroupRow, IndexDefinition, IndexUsage};
use crate::error::StoreError;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

#[derive(Default, Debug, Clone)]
struct MemCollection {
    docs: Vec<Value>,
    indexes: Vec<IndexDefinition>,
    usage: Vec<IndexUsage>,
}

/// In-memory store. Populate it up front, then share it read-only.
///
/// Failures can be injected per collection, per field, or for metadata
/// lookups to exercise the pipeline's error containment.
#[derive(Default, Debug, Clone)]
pub struct MemoryStore {
    collections: BTreeMap<String, MemCollection>,
    broken_collections: HashSet<String>,
    broken_fields: HashSet<(String, String)>,
    broken_lookups: HashSet<String>,
    broken_stats: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append documents, creating the collection (with its `_id_` index) if needed.
    pub fn insert_many(&mut self, collection: &str, docs: impl IntoIterator<Item = Value>) {
        self.entry(collection).docs.extend(docs);
    }

    pub fn add_index(&mut self, collection: &str, index: IndexDefinition) {
        self.entry(collection).indexes.push(index);
    }

    pub fn set_index_usage(&mut self, collection: &str, usage: IndexUsage) {
        let c = self.entry(collection);
        c.usage.retain(|u| u.name != usage.name);
        c.usage.push(usage);
    }

    pub fn fail_collection(&mut self, collection: &str) {
        self.broken_collections.insert(collection.to_string());
    }

    pub fn fail_field(&mut self, collection: &str, field: &str) {
        self.broken_fields.insert((collection.to_string(), field.to_string()));
    }

    /// Make `find_one` against `collection` fail.
    pub fn fail_lookups(&mut self, collection: &str) {
        self.broken_lookups.insert(collection.to_string());
    }

    pub fn fail_index_stats(&mut self, collection: &str) {
        self.broken_stats.insert(collection.to_string());
    }

    fn entry(&mut self, collection: &str) -> &mut MemCollection {
        self.collections.entry(collection.to_string()).or_insert_with(|| MemCollection {
            indexes: vec![IndexDefinition {
                name: "_id_".to_string(),
                key: json!({ "_id": 1 }),
                unique: None,
            }],
            ..MemCollection::default()
        })
    }

    fn open(&self, collection: &str) -> Result<&MemCollection, StoreError> {
        if self.broken_collections.contains(collection) {
            return Err(StoreError::Failed(format!("collection {collection} unavailable")));
        }
        self.collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))
    }
}

impl DocumentStore for MemoryStore {
    fn collection_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.collections.keys().cloned().collect())
    }

    fn count_documents(&self, collection: &str) -> Result<u64, StoreError> {
        Ok(self.open(collection)?.docs.len() as u64)
    }

    fn group_by_field(
        &self,
        collection: &str,
        field: &str,
        min_count: usize,
        deadline: Option<Instant>,
    ) -> Result<Vec<GroupRow>, StoreError> {
        let c = self.open(collection)?;
        if self.broken_fields.contains(&(collection.to_string(), field.to_string())) {
            return Err(StoreError::Failed(format!("aggregation on {collection}.{field} rejected")));
        }
        group_documents(&c.docs, collection, field, min_count, deadline)
    }

    fn find_one(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Option<Value>, StoreError> {
        if self.broken_lookups.contains(collection) {
            return Err(StoreError::Failed(format!("lookup on {collection} rejected")));
        }
        Ok(self.collections.get(collection).and_then(|c| find_first(&c.docs, field, value)))
    }

    fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDefinition>, StoreError> {
        Ok(self.open(collection)?.indexes.clone())
    }

    fn index_stats(&self, collection: &str) -> Result<Vec<IndexUsage>, StoreError> {
        let c = self.open(collection)?;
        if self.broken_stats.contains(collection) {
            return Err(StoreError::Failed(format!("index stats on {collection} unavailable")));
        }
        Ok(c.usage.clone())
    }
}
