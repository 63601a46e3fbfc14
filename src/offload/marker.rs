// SPDX-License-Identifier: MIT

//! Reference marker that replaces an offloaded field
//!
//! Wire format:
//! `{"__chunked__": true, "__chunk_ref__": "<id>", "__total_size__": <n>, "__field_path__": "<key>"}`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sdk::error::OffloadError;
use crate::sdk::store::StoredRef;

pub const CHUNKED_KEY: &str = "__chunked__";
pub const REF_ID_KEY: &str = "__chunk_ref__";
pub const TOTAL_SIZE_KEY: &str = "__total_size__";
pub const FIELD_PATH_KEY: &str = "__field_path__";

/// Reference to a payload held in the remote chunk store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkedRef {
    #[serde(rename = "__chunked__")]
    pub chunked: bool,
    #[serde(rename = "__chunk_ref__")]
    pub ref_id: String,
    /// Exact byte length of the marshalled payload
    #[serde(rename = "__total_size__")]
    pub total_size: u64,
    /// Top-level key the payload came from; empty for the whole message
    #[serde(rename = "__field_path__", default)]
    pub field_path: String,
}

impl ChunkedRef {
    pub fn new(ref_id: impl Into<String>, total_size: u64, field_path: impl Into<String>) -> Self {
        Self {
            chunked: true,
            ref_id: ref_id.into(),
            total_size,
            field_path: field_path.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            CHUNKED_KEY: true,
            REF_ID_KEY: self.ref_id,
            TOTAL_SIZE_KEY: self.total_size,
            FIELD_PATH_KEY: self.field_path,
        })
    }

    pub fn into_stored_ref(self) -> StoredRef {
        StoredRef {
            id: self.ref_id,
            total_size: self.total_size,
            field_path: self.field_path,
        }
    }
}

/// True iff `value` is an object whose `__chunked__` key is boolean `true`.
///
/// No other key is looked at, so user objects that happen to carry `__chunk_ref__`
/// or similar names are never taken for markers.
pub fn is_marker(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|obj| obj.get(CHUNKED_KEY))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Strictly decode a marker.
///
/// `Ok(None)` when the value is not a marker at all; `Err(InvalidReference)` when it
/// is one but the id, size or path is unusable.
pub fn decode(value: &Value) -> Result<Option<ChunkedRef>, OffloadError> {
    if !is_marker(value) {
        return Ok(None);
    }
    let Some(obj) = value.as_object() else {
        return Ok(None);
    };

    let ref_id = match obj.get(REF_ID_KEY) {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::String(_)) => {
            return Err(OffloadError::invalid_reference("empty reference id"));
        }
        Some(_) => {
            return Err(OffloadError::invalid_reference(
                "reference id is not a string",
            ));
        }
        None => return Err(OffloadError::invalid_reference("missing reference id")),
    };

    let total_size = obj
        .get(TOTAL_SIZE_KEY)
        .and_then(Value::as_u64)
        .ok_or_else(|| {
            OffloadError::invalid_reference(format!(
                "reference {} has no valid total size",
                ref_id
            ))
        })?;

    let field_path = match obj.get(FIELD_PATH_KEY) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(path)) => path.clone(),
        Some(_) => {
            return Err(OffloadError::invalid_reference(format!(
                "reference {} has a non-string field path",
                ref_id
            )));
        }
    };

    Ok(Some(ChunkedRef {
        chunked: true,
        ref_id,
        total_size,
        field_path,
    }))
}
