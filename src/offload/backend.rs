// SPDX-License-Identifier: MIT

//! The two `LargeValueStore` backends and capability-based selection

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::chunk::{ChunkCodec, ChunkStoreClient};
use super::lmo::{self, LocalObjectStore};
use super::marker::{self, ChunkedRef};
use crate::sdk::config::OffloadConfig;
use crate::sdk::error::OffloadError;
use crate::sdk::store::{Candidate, LargeValueStore, StoredRef};

/// Offloads to the remote chunk store, leaving `ChunkedRef` markers inline
pub struct RemoteValueStore {
    codec: ChunkCodec,
    threshold: usize,
}

impl RemoteValueStore {
    pub fn new(codec: ChunkCodec, threshold: usize) -> Self {
        Self { codec, threshold }
    }

    pub fn from_config(config: &OffloadConfig, client: Arc<dyn ChunkStoreClient>) -> Self {
        let codec = ChunkCodec::new(client, config.remote.chunk_size, config.remote.deadline());
        Self::new(codec, config.remote.threshold)
    }
}

#[async_trait]
impl LargeValueStore for RemoteValueStore {
    fn name(&self) -> &str {
        "remote"
    }

    fn threshold(&self) -> usize {
        self.threshold
    }

    async fn offload(&self, candidate: &Candidate) -> Result<Option<Value>, OffloadError> {
        let ref_id = Uuid::new_v4().to_string();
        if let Err(e) = self.codec.store(&ref_id, &candidate.bytes).await {
            log::error!(
                "Failed to store field '{}' as {}: {}",
                candidate.field_path,
                ref_id,
                e
            );
            return Err(e);
        }

        let reference = ChunkedRef::new(
            ref_id,
            candidate.bytes.len() as u64,
            candidate.field_path.clone(),
        );
        Ok(Some(reference.to_value()))
    }

    fn recognize(&self, value: &Value) -> Result<Option<StoredRef>, OffloadError> {
        Ok(marker::decode(value)?.map(ChunkedRef::into_stored_ref))
    }

    async fn rehydrate(&self, reference: &StoredRef) -> Result<Vec<u8>, OffloadError> {
        self.codec.fetch(&reference.id, reference.total_size).await
    }
}

/// Offloads to record files under the tenant directory
pub struct LocalValueStore {
    objects: LocalObjectStore,
    deadline: Duration,
}

impl LocalValueStore {
    pub fn new(objects: LocalObjectStore, deadline: Duration) -> Self {
        Self { objects, deadline }
    }

    pub fn from_config(config: &OffloadConfig) -> Result<Self, OffloadError> {
        Ok(Self::new(
            LocalObjectStore::from_config(&config.local)?,
            config.local.deadline(),
        ))
    }

    pub fn objects(&self) -> &LocalObjectStore {
        &self.objects
    }
}

#[async_trait]
impl LargeValueStore for LocalValueStore {
    fn name(&self) -> &str {
        "local"
    }

    fn threshold(&self) -> usize {
        self.objects.threshold()
    }

    async fn offload(&self, candidate: &Candidate) -> Result<Option<Value>, OffloadError> {
        // Records hold JSON values; raw non-JSON messages stay inline
        let Some(value) = candidate.value.as_ref() else {
            log::warn!(
                "Message of {} bytes is not JSON; keeping it inline",
                candidate.bytes.len()
            );
            return Ok(None);
        };

        let write = self.objects.serialize_marshalled(value, &candidate.bytes);
        let record = match tokio::time::timeout(self.deadline, write).await {
            Ok(result) => result?,
            Err(_) => return Err(OffloadError::Timeout(self.deadline)),
        };

        record
            .map(|r| serde_json::to_value(&r).map_err(OffloadError::from))
            .transpose()
    }

    fn recognize(&self, value: &Value) -> Result<Option<StoredRef>, OffloadError> {
        if !lmo::is_record(value) {
            return Ok(None);
        }
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| OffloadError::invalid_reference("record has no id"))?;
        let size = value.get("size").and_then(Value::as_u64).unwrap_or(0);

        Ok(Some(StoredRef {
            id: id.to_string(),
            total_size: size,
            field_path: String::new(),
        }))
    }

    async fn rehydrate(&self, reference: &StoredRef) -> Result<Vec<u8>, OffloadError> {
        let read = self.objects.deserialize(&reference.id);
        let record = match tokio::time::timeout(self.deadline, read).await {
            Ok(result) => result?,
            Err(_) => return Err(OffloadError::Timeout(self.deadline)),
        };

        let value = record.into_value().ok_or_else(|| {
            OffloadError::invalid_reference(format!("record {} has no data", reference.id))
        })?;
        Ok(serde_json::to_vec(&value)?)
    }
}

/// Pick the backend for a message from the host's capabilities.
///
/// The remote store wins when both are available and a client is at hand. `None`
/// means offloading is off and messages pass through untouched.
pub fn select_store(
    config: &OffloadConfig,
    remote_client: Option<Arc<dyn ChunkStoreClient>>,
) -> Result<Option<Arc<dyn LargeValueStore>>, OffloadError> {
    let capabilities = config.capabilities();

    if capabilities.remote_store {
        if let Some(client) = remote_client {
            return Ok(Some(Arc::new(RemoteValueStore::from_config(config, client))));
        }
        log::warn!("Remote store enabled but no chunk client supplied");
    }

    if capabilities.local_store {
        return Ok(Some(Arc::new(LocalValueStore::from_config(config)?)));
    }

    Ok(None)
}
