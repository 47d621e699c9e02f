use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A collection paired with the fields that must be checked for duplicate values.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ScanTarget {
    pub collection: String,
    pub fields: Vec<String>,
}

/// Documents sharing one value of the scanned field.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DuplicateGroup {
    pub key: Value,
    pub count: u64,
    pub members: Vec<Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FieldScanResult {
    pub field: String,
    pub duplicates: Vec<DuplicateGroup>,
}

/// Per-collection report. Optional fields are omitted, never written as null,
/// unless the metadata record itself stored a null cardinality.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionResult {
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_count: Option<u64>,
    pub results: Vec<FieldScanResult>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub dest_cardinality: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub source_cardinality: Option<Value>,
}

impl CollectionResult {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            index_count: None,
            results: Vec::new(),
            dest_cardinality: None,
            source_cardinality: None,
        }
    }

    pub fn group_count(&self) -> usize {
        self.results.iter().map(|r| r.duplicates.len()).sum()
    }
}

/// Deserialize a field that is present in the input as `Some`, keeping an
/// explicit `null` as `Some(Value::Null)`. Absent fields fall back to `None`
/// through `#[serde(default)]`.
pub(crate) fn present<'de, D>(de: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(de).map(Some)
}
