// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::Value;

use super::error::OffloadError;

/// A value selected for offloading.
///
/// `bytes` is the marshalled form whose length was compared against the threshold.
/// `value` holds the parsed value when one exists; it is `None` only for a whole
/// message that was not valid JSON.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Top-level key, or empty for the whole message
    pub field_path: String,
    pub bytes: Vec<u8>,
    pub value: Option<Value>,
}

impl Candidate {
    pub fn is_whole_message(&self) -> bool {
        self.field_path.is_empty()
    }
}

/// A reference recognized inside a message, independent of backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRef {
    pub id: String,
    pub total_size: u64,
    /// Empty when the reference stands in for the whole message
    pub field_path: String,
}

/// Backend that can move large values out of a message and bring them back.
///
/// Implementations never delete what they stored: the same reference may be
/// rehydrated any number of times by any number of consumers.
#[async_trait]
pub trait LargeValueStore: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &str;

    /// Byte threshold above which a candidate is offloaded
    fn threshold(&self) -> usize;

    /// Persist a candidate and return the inline reference that replaces it.
    ///
    /// `Ok(None)` means the backend declined; the caller keeps the inline value.
    async fn offload(&self, candidate: &Candidate) -> Result<Option<Value>, OffloadError>;

    /// Recognize a reference produced by this backend.
    ///
    /// Returns `Ok(None)` for ordinary values and `Err(InvalidReference)` for a
    /// reference that is present but malformed.
    fn recognize(&self, value: &Value) -> Result<Option<StoredRef>, OffloadError>;

    /// Fetch the exact marshalled bytes behind a reference
    async fn rehydrate(&self, reference: &StoredRef) -> Result<Vec<u8>, OffloadError>;
}
