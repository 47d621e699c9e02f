//! Typed view of the failure report left behind by an index build.
//!
//! ```json
//! { "users": { "email_1": { "err": { "code": 11000 } } } }
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};

/// One index entry of the report. Unknown keys are ignored.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct IndexFailure {
    #[serde(default)]
    pub err: Option<ErrorEnvelope>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default, rename = "errorResponse")]
    pub error_response: Option<ErrorResponse>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ErrorResponse {
    #[serde(default)]
    pub code: Option<Value>,
}

/// Where an error code may live, tried in order. The first location holding a
/// non-null value decides, even if another location would have matched.
pub const CODE_LOCATIONS: &[(&str, fn(&IndexFailure) -> Option<&Value>)] =
    &[("err.code", err_code), ("err.errorResponse.code", error_response_code)];

fn err_code(f: &IndexFailure) -> Option<&Value> {
    f.err.as_ref()?.code.as_ref()
}

fn error_response_code(f: &IndexFailure) -> Option<&Value> {
    f.err.as_ref()?.error_response.as_ref()?.code.as_ref()
}

impl IndexFailure {
    /// The error code per [`CODE_LOCATIONS`], if any location carries one.
    pub fn code(&self) -> Option<&Value> {
        CODE_LOCATIONS.iter().find_map(|(_, locate)| locate(self).filter(|v| !v.is_null()))
    }

    /// True when the decisive code equals `wanted`. Integral floats count.
    pub fn has_code(&self, wanted: i64) -> bool {
        match self.code() {
            Some(v) => {
                v.as_i64() == Some(wanted)
                    || v.as_f64().map(|f| f.fract() == 0.0 && f == wanted as f64).unwrap_or(false)
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionFailures {
    pub collection: String,
    pub indexes: Vec<(String, IndexFailure)>,
}

/// The parsed report, in the key order of the source document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FailureReport {
    pub collections: Vec<CollectionFailures>,
}

impl FailureReport {
    /// Parse and validate the whole report. Any structural problem rejects it.
    pub fn parse(bytes: &[u8]) -> Result<Self, String> {
        let root: Value = serde_json::from_slice(bytes).map_err(|e| format!("invalid JSON: {e}"))?;
        Self::from_value(root)
    }

    pub fn from_value(root: Value) -> Result<Self, String> {
        let Value::Object(root) = root else {
            return Err("top-level value must be an object keyed by collection".to_string());
        };
        let mut collections = Vec::with_capacity(root.len());
        for (collection, entries) in root {
            let entries: Map<String, Value> = match entries {
                Value::Object(m) => m,
                other => {
                    return Err(format!(
                        "collection {collection:?} must map index names to error records, found {}",
                        kind(&other)
                    ))
                }
            };
            let mut indexes = Vec::with_capacity(entries.len());
            for (index, record) in entries {
                let failure: IndexFailure = serde_json::from_value(record)
                    .map_err(|e| format!("{collection}.{index}: {e}"))?;
                indexes.push((index, failure));
            }
            collections.push(CollectionFailures { collection, indexes });
        }
        Ok(Self { collections })
    }
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
