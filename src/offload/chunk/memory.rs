// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::client::{ChunkStoreClient, GetChunkRequest, GetChunkResponse, StoreChunkRequest};
use crate::sdk::error::ChunkRpcError;

/// Largest payload the store accepts unless configured otherwise
pub const DEFAULT_MAX_PAYLOAD: u64 = 1 << 30;

/// Bytes received so far for one reference. Chunks must arrive contiguously.
struct Payload {
    total_size: u64,
    data: Vec<u8>,
}

impl Payload {
    fn is_complete(&self) -> bool {
        self.data.len() as u64 == self.total_size
    }
}

/// In-process chunk store.
///
/// Backs the reference chunk host and doubles as an in-process client. Only the
/// owner-facing `delete` removes entries. A payload is readable once every byte up to
/// its total size has been stored.
#[derive(Clone)]
pub struct MemoryChunkStore {
    payloads: Arc<RwLock<HashMap<String, Payload>>>,
    max_payload: u64,
}

impl Default for MemoryChunkStore {
    fn default() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects payloads whose declared total size exceeds `max_payload`
    pub fn with_max_payload(max_payload: u64) -> Self {
        Self {
            payloads: Arc::new(RwLock::new(HashMap::new())),
            max_payload,
        }
    }

    pub fn max_payload(&self) -> u64 {
        self.max_payload
    }

    /// Lifecycle-owner removal of a payload. Returns whether it existed.
    pub async fn delete(&self, ref_id: &str) -> bool {
        let mut payloads = self.payloads.write().await;
        payloads.remove(ref_id).is_some()
    }

    /// True once any chunk of `ref_id` has been stored, complete or not
    pub async fn contains(&self, ref_id: &str) -> bool {
        let payloads = self.payloads.read().await;
        payloads.contains_key(ref_id)
    }

    /// Number of stored payloads
    pub async fn len(&self) -> usize {
        self.payloads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.payloads.read().await.is_empty()
    }
}

#[async_trait]
impl ChunkStoreClient for MemoryChunkStore {
    async fn store_chunk(&self, request: StoreChunkRequest) -> Result<(), ChunkRpcError> {
        if request.total_size > self.max_payload {
            return Err(ChunkRpcError::rpc(format!(
                "total size {} exceeds maximum payload {}",
                request.total_size, self.max_payload
            )));
        }

        let end = request
            .offset
            .checked_add(request.data.len() as u64)
            .filter(|end| *end <= request.total_size)
            .ok_or_else(|| {
                ChunkRpcError::rpc(format!(
                    "chunk [{}, +{}) exceeds total size {}",
                    request.offset,
                    request.data.len(),
                    request.total_size
                ))
            })?;
        if request.is_last && end != request.total_size {
            return Err(ChunkRpcError::rpc(format!(
                "final chunk ends at {} of {}",
                end, request.total_size
            )));
        }

        let mut payloads = self.payloads.write().await;

        let written = match payloads.get(&request.ref_id) {
            Some(payload) if payload.total_size != request.total_size => {
                return Err(ChunkRpcError::rpc(format!(
                    "total size {} does not match stored size {} for {}",
                    request.total_size, payload.total_size, request.ref_id
                )));
            }
            Some(payload) => payload.data.len() as u64,
            None => 0,
        };
        if request.offset > written {
            return Err(ChunkRpcError::rpc(format!(
                "chunk at offset {} leaves a gap after {} stored bytes of {}",
                request.offset, written, request.ref_id
            )));
        }

        let payload = payloads
            .entry(request.ref_id.clone())
            .or_insert_with(|| Payload {
                total_size: request.total_size,
                data: Vec::new(),
            });
        let offset = request.offset as usize;
        if end <= written {
            // Resent chunk
            payload.data[offset..end as usize].copy_from_slice(&request.data);
        } else {
            payload.data.truncate(offset);
            payload.data.extend_from_slice(&request.data);
        }
        Ok(())
    }

    async fn get_chunk(&self, request: GetChunkRequest) -> Result<GetChunkResponse, ChunkRpcError> {
        let payloads = self.payloads.read().await;
        let payload = payloads
            .get(&request.ref_id)
            .ok_or_else(|| ChunkRpcError::NotFound(request.ref_id.clone()))?;

        if !payload.is_complete() {
            return Err(ChunkRpcError::rpc(format!(
                "payload {} is incomplete: {} of {} bytes stored",
                request.ref_id,
                payload.data.len(),
                payload.total_size
            )));
        }

        let total = payload.total_size;
        if request.offset > total {
            return Err(ChunkRpcError::rpc(format!(
                "offset {} beyond end {}",
                request.offset, total
            )));
        }

        let end = request.offset.saturating_add(request.length).min(total);
        Ok(GetChunkResponse {
            data: payload.data[request.offset as usize..end as usize].to_vec(),
            total_size: total,
            is_last: end >= total,
        })
    }
}
