// SPDX-License-Identifier: MIT

//! On-disk record format for locally offloaded values

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const LMO_MAGIC: u64 = 0x1343B7E;
pub const LMO_VERSION: u32 = 1;
/// Bytes of the marshalled value kept as a readable preview
pub const LMO_HEAD: usize = 100;
pub const LMO_EXTENSION: &str = "lmo";

/// z-base-32: lowercase only, so ids never collide on case-insensitive filesystems
const ID_ALPHABET: &[u8; 32] = b"ybndrfg8ejkmcpqxot1uwisza345h769";
pub const ID_LEN: usize = 26;

/// One offloaded value, stored as a single JSON file.
///
/// `data` is only present in the file itself; the copy embedded in a message has
/// it cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LargeObjectRecord {
    pub magic: u64,
    pub version: u32,
    pub id: String,
    pub head: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Borrowed view used when writing, so the value is not cloned
#[derive(Serialize)]
pub(crate) struct RecordFile<'a> {
    pub magic: u64,
    pub version: u32,
    pub id: &'a str,
    pub head: &'a str,
    pub size: u64,
    pub data: &'a Value,
}

impl LargeObjectRecord {
    /// Reference-only record for a value whose marshalled form is `bytes`
    pub fn reference(id: String, bytes: &[u8]) -> Self {
        Self {
            magic: LMO_MAGIC,
            version: LMO_VERSION,
            id,
            head: head_of(bytes),
            size: bytes.len() as u64,
            data: None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn into_value(self) -> Option<Value> {
        self.data
    }
}

fn head_of(bytes: &[u8]) -> String {
    String::from_utf8_lossy(&bytes[..bytes.len().min(LMO_HEAD)]).into_owned()
}

/// Fresh 26-character id derived from a random UUID
pub fn new_id() -> String {
    let mut id = String::with_capacity(ID_LEN);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;

    for byte in Uuid::new_v4().into_bytes() {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            id.push(ID_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        id.push(ID_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }

    id
}

pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_LEN && id.bytes().all(|b| ID_ALPHABET.contains(&b))
}

/// True when `value` carries the record magic at `magic`
pub fn is_record(value: &Value) -> bool {
    value
        .get("magic")
        .and_then(Value::as_f64)
        .is_some_and(|magic| magic == LMO_MAGIC as f64)
}

/// Same check as [`is_record`] on unparsed JSON text
pub fn is_record_raw(raw: &[u8]) -> bool {
    #[derive(Deserialize)]
    struct MagicOnly {
        #[serde(default)]
        magic: Option<f64>,
    }

    serde_json::from_slice::<MagicOnly>(raw)
        .ok()
        .and_then(|m| m.magic)
        .is_some_and(|magic| magic == LMO_MAGIC as f64)
}
