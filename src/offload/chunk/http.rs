// SPDX-License-Identifier: MIT

//! HTTP chunk client - talks to a chunk host over the `/chunks/{ref_id}` routes

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use url::Url;

use super::client::{ChunkStoreClient, GetChunkRequest, GetChunkResponse, StoreChunkRequest};
use crate::sdk::error::{ChunkRpcError, OffloadError};

pub const TOTAL_SIZE_HEADER: &str = "x-chunk-total-size";
pub const IS_LAST_HEADER: &str = "x-chunk-is-last";

/// `ChunkStoreClient` backed by a remote chunk host
pub struct HttpChunkClient {
    client: Client,
    base_url: Url,
}

impl HttpChunkClient {
    /// Create a client for the host at `endpoint` (e.g. `http://127.0.0.1:7420`)
    pub fn new(endpoint: &str) -> Result<Self, OffloadError> {
        let mut base_url = Url::parse(endpoint)
            .map_err(|e| OffloadError::config(format!("invalid endpoint {}: {}", endpoint, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    /// URL for `ref_id`, always a single percent-encoded segment under `chunks/`
    fn chunk_url(&self, ref_id: &str) -> Result<Url, ChunkRpcError> {
        if ref_id.is_empty() || ref_id == "." || ref_id == ".." {
            return Err(ChunkRpcError::rpc(format!("invalid chunk reference {:?}", ref_id)));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ChunkRpcError::rpc(format!("endpoint {} cannot hold a path", self.base_url)))?
            .pop_if_empty()
            .push("chunks")
            .push(ref_id);
        Ok(url)
    }

    async fn status_error(ref_id: &str, response: reqwest::Response) -> ChunkRpcError {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return ChunkRpcError::NotFound(ref_id.to_string());
        }
        let body = response.text().await.unwrap_or_default();
        ChunkRpcError::rpc(format!("chunk host returned {}: {}", status, body))
    }
}

#[async_trait]
impl ChunkStoreClient for HttpChunkClient {
    async fn store_chunk(&self, request: StoreChunkRequest) -> Result<(), ChunkRpcError> {
        let url = self.chunk_url(&request.ref_id)?;
        let response = self
            .client
            .put(url)
            .query(&[
                ("offset", request.offset.to_string()),
                ("total_size", request.total_size.to_string()),
                ("is_last", request.is_last.to_string()),
            ])
            .body(request.data)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(&request.ref_id, response).await);
        }
        Ok(())
    }

    async fn get_chunk(&self, request: GetChunkRequest) -> Result<GetChunkResponse, ChunkRpcError> {
        let url = self.chunk_url(&request.ref_id)?;
        let response = self
            .client
            .get(url)
            .query(&[
                ("offset", request.offset.to_string()),
                ("length", request.length.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(&request.ref_id, response).await);
        }

        let headers = response.headers();
        let total_size = headers
            .get(TOTAL_SIZE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| ChunkRpcError::rpc(format!("missing {} header", TOTAL_SIZE_HEADER)))?;
        let is_last = headers
            .get(IS_LAST_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "true")
            .unwrap_or(false);

        let data = response.bytes().await?.to_vec();
        Ok(GetChunkResponse {
            data,
            total_size,
            is_last,
        })
    }
}
