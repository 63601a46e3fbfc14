// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::sdk::error::ChunkRpcError;

/// Request to store one window of a payload
#[derive(Debug, Clone)]
pub struct StoreChunkRequest {
    pub ref_id: String,
    pub data: Vec<u8>,
    pub offset: u64,
    pub total_size: u64,
    pub is_last: bool,
}

/// Request to read up to `length` bytes starting at `offset`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetChunkRequest {
    pub ref_id: String,
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone, Default)]
pub struct GetChunkResponse {
    pub data: Vec<u8>,
    pub total_size: u64,
    pub is_last: bool,
}

/// Client side of the remote chunk store.
///
/// Only store and get are exposed. Deleting a payload is left to whoever tracks its
/// consumers.
#[async_trait]
pub trait ChunkStoreClient: Send + Sync {
    async fn store_chunk(&self, request: StoreChunkRequest) -> Result<(), ChunkRpcError>;

    async fn get_chunk(&self, request: GetChunkRequest) -> Result<GetChunkResponse, ChunkRpcError>;
}
