use crate::error::{DupscanError, StoreError};
use crate::model::{present, CollectionResult};
use crate::store::DocumentStore;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

/// Key field of a relationship metadata record.
pub const COLLECTION_TYPE_FIELD: &str = "collectionType";

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipMetadata {
    pub collection_type: String,
    #[serde(default)]
    pub source: Option<CardinalitySide>,
    #[serde(default)]
    pub dest: Option<CardinalitySide>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CardinalitySide {
    #[serde(default, deserialize_with = "present")]
    pub cardinality: Option<Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enrichment {
    /// Not a relationship collection, or nothing was found to annotate.
    NotApplicable,
    Attached,
    /// No metadata record for this collection.
    Missing,
    /// The lookup failed; treated like `Missing`.
    Failed,
}

pub fn is_relationship(collection: &str, token: &str) -> bool {
    !token.is_empty() && collection.contains(token)
}

/// Attach `destCardinality` / `sourceCardinality` from the metadata record of
/// a relationship collection that has duplicate findings. Never fails.
pub fn enrich(
    store: &dyn DocumentStore,
    result: &mut CollectionResult,
    meta_collection: &str,
    token: &str,
) -> Enrichment {
    if result.results.is_empty() || !is_relationship(&result.collection, token) {
        return Enrichment::NotApplicable;
    }
    match lookup(store, meta_collection, &result.collection) {
        Ok(Some(meta)) => {
            result.dest_cardinality = meta.dest.and_then(|d| d.cardinality);
            result.source_cardinality = meta.source.and_then(|s| s.cardinality);
            info!(
                collection = %result.collection,
                dest = ?result.dest_cardinality,
                source = ?result.source_cardinality,
                "relationship metadata attached"
            );
            Enrichment::Attached
        }
        Ok(None) => {
            info!(collection = %result.collection, meta = meta_collection, "no relationship metadata record");
            Enrichment::Missing
        }
        Err(err) => {
            warn!(error = %err, "relationship metadata unavailable");
            Enrichment::Failed
        }
    }
}

fn lookup(
    store: &dyn DocumentStore,
    meta_collection: &str,
    collection: &str,
) -> Result<Option<RelationshipMetadata>, DupscanError> {
    let enrich_err = |source: StoreError| DupscanError::Enrichment { collection: collection.to_string(), source };
    let Some(doc) = store
        .find_one(meta_collection, COLLECTION_TYPE_FIELD, &Value::from(collection))
        .map_err(enrich_err)?
    else {
        return Ok(None);
    };
    serde_json::from_value(doc).map(Some).map_err(|e| {
        enrich_err(StoreError::Malformed { collection: meta_collection.to_string(), reason: e.to_string() })
    })
}
