// SPDX-License-Identifier: MIT

//! Chunk codec - moves a byte payload to and from the remote chunk store
//!
//! Chunks of one reference are sent strictly in order, one call at a time. A single
//! deadline covers the whole sequence; when it fires the call returns `Timeout` and
//! chunks already written stay where they are.

use std::sync::Arc;
use std::time::Duration;

use super::client::{ChunkStoreClient, GetChunkRequest, StoreChunkRequest};
use crate::sdk::error::OffloadError;

/// Upper bound on the buffer reserved up front for a fetch
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

pub struct ChunkCodec {
    client: Arc<dyn ChunkStoreClient>,
    chunk_size: usize,
    deadline: Duration,
}

impl ChunkCodec {
    pub fn new(client: Arc<dyn ChunkStoreClient>, chunk_size: usize, deadline: Duration) -> Self {
        Self {
            client,
            chunk_size: chunk_size.max(1),
            deadline,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Store `data` under `ref_id` in `ceil(len / chunk_size)` calls
    pub async fn store(&self, ref_id: &str, data: &[u8]) -> Result<(), OffloadError> {
        match tokio::time::timeout(self.deadline, self.store_sequence(ref_id, data)).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!(
                    "Storing {} timed out after {:?}; written chunks are left in place",
                    ref_id,
                    self.deadline
                );
                Err(OffloadError::Timeout(self.deadline))
            }
        }
    }

    /// Fetch and reassemble the payload behind `ref_id`
    pub async fn fetch(&self, ref_id: &str, total_size: u64) -> Result<Vec<u8>, OffloadError> {
        match tokio::time::timeout(self.deadline, self.fetch_sequence(ref_id, total_size)).await
        {
            Ok(result) => result,
            Err(_) => {
                log::warn!("Fetching {} timed out after {:?}", ref_id, self.deadline);
                Err(OffloadError::Timeout(self.deadline))
            }
        }
    }

    async fn store_sequence(&self, ref_id: &str, data: &[u8]) -> Result<(), OffloadError> {
        let total_size = data.len() as u64;
        let mut calls = 0usize;

        for (index, window) in data.chunks(self.chunk_size).enumerate() {
            let offset = (index * self.chunk_size) as u64;
            let is_last = offset + window.len() as u64 >= total_size;

            log::debug!(
                "StoreChunk {} offset={} len={} last={}",
                ref_id,
                offset,
                window.len(),
                is_last
            );

            self.client
                .store_chunk(StoreChunkRequest {
                    ref_id: ref_id.to_string(),
                    data: window.to_vec(),
                    offset,
                    total_size,
                    is_last,
                })
                .await
                .map_err(|e| e.at_offset(offset))?;
            calls += 1;
        }

        log::debug!("Stored {} bytes for {} in {} chunks", total_size, ref_id, calls);
        Ok(())
    }

    async fn fetch_sequence(&self, ref_id: &str, total_size: u64) -> Result<Vec<u8>, OffloadError> {
        let mut buffer = Vec::with_capacity(total_size.min(MAX_PREALLOC) as usize);
        let max_len = self.chunk_size as u64;

        while (buffer.len() as u64) < total_size {
            let offset = buffer.len() as u64;
            let response = self
                .client
                .get_chunk(GetChunkRequest {
                    ref_id: ref_id.to_string(),
                    offset,
                    length: max_len,
                })
                .await
                .map_err(|e| e.at_offset(offset))?;

            if response.data.is_empty() {
                break;
            }
            if response.data.len() as u64 > max_len {
                return Err(OffloadError::transport(
                    offset,
                    format!(
                        "chunk of {} bytes exceeds maximum {}",
                        response.data.len(),
                        max_len
                    ),
                ));
            }
            if offset + response.data.len() as u64 > total_size {
                return Err(OffloadError::transport(
                    offset,
                    format!("chunk overruns declared size {}", total_size),
                ));
            }

            log::debug!(
                "GetChunk {} offset={} len={} last={}",
                ref_id,
                offset,
                response.data.len(),
                response.is_last
            );
            buffer.extend_from_slice(&response.data);

            if response.is_last {
                break;
            }
        }

        if (buffer.len() as u64) != total_size {
            return Err(OffloadError::transport(
                buffer.len() as u64,
                format!(
                    "payload ended after {} of {} bytes",
                    buffer.len(),
                    total_size
                ),
            ));
        }

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offload::chunk::client::GetChunkResponse;
    use crate::offload::chunk::memory::MemoryChunkStore;
    use crate::sdk::error::ChunkRpcError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Wraps a memory store and records every call made through it
    #[derive(Default)]
    struct RecordingClient {
        inner: MemoryChunkStore,
        stores: Mutex<Vec<(u64, usize, u64, bool)>>,
        gets: Mutex<Vec<GetChunkRequest>>,
    }

    #[async_trait]
    impl ChunkStoreClient for RecordingClient {
        async fn store_chunk(&self, request: StoreChunkRequest) -> Result<(), ChunkRpcError> {
            self.stores.lock().unwrap().push((
                request.offset,
                request.data.len(),
                request.total_size,
                request.is_last,
            ));
            self.inner.store_chunk(request).await
        }

        async fn get_chunk(
            &self,
            request: GetChunkRequest,
        ) -> Result<GetChunkResponse, ChunkRpcError> {
            self.gets.lock().unwrap().push(request.clone());
            self.inner.get_chunk(request).await
        }
    }

    /// Answers every call after sleeping
    struct SlowClient {
        delay: Duration,
    }

    #[async_trait]
    impl ChunkStoreClient for SlowClient {
        async fn store_chunk(&self, _request: StoreChunkRequest) -> Result<(), ChunkRpcError> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        async fn get_chunk(
            &self,
            _request: GetChunkRequest,
        ) -> Result<GetChunkResponse, ChunkRpcError> {
            tokio::time::sleep(self.delay).await;
            Ok(GetChunkResponse::default())
        }
    }

    /// Fails once a given offset is reached
    struct FailingClient {
        fail_at: u64,
        inner: MemoryChunkStore,
    }

    #[async_trait]
    impl ChunkStoreClient for FailingClient {
        async fn store_chunk(&self, request: StoreChunkRequest) -> Result<(), ChunkRpcError> {
            if request.offset >= self.fail_at {
                return Err(ChunkRpcError::rpc("connection reset"));
            }
            self.inner.store_chunk(request).await
        }

        async fn get_chunk(
            &self,
            request: GetChunkRequest,
        ) -> Result<GetChunkResponse, ChunkRpcError> {
            if request.offset >= self.fail_at {
                return Err(ChunkRpcError::rpc("connection reset"));
            }
            self.inner.get_chunk(request).await
        }
    }

    /// Stores the first `allowed` chunks, then never answers again
    struct StallingClient {
        allowed: usize,
        calls: AtomicUsize,
        inner: MemoryChunkStore,
    }

    #[async_trait]
    impl ChunkStoreClient for StallingClient {
        async fn store_chunk(&self, request: StoreChunkRequest) -> Result<(), ChunkRpcError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.allowed {
                return std::future::pending().await;
            }
            self.inner.store_chunk(request).await
        }

        async fn get_chunk(
            &self,
            request: GetChunkRequest,
        ) -> Result<GetChunkResponse, ChunkRpcError> {
            self.inner.get_chunk(request).await
        }
    }

    /// Claims a payload is complete after its first chunk
    struct TruncatingClient;

    #[async_trait]
    impl ChunkStoreClient for TruncatingClient {
        async fn store_chunk(&self, _request: StoreChunkRequest) -> Result<(), ChunkRpcError> {
            Ok(())
        }

        async fn get_chunk(
            &self,
            _request: GetChunkRequest,
        ) -> Result<GetChunkResponse, ChunkRpcError> {
            Ok(GetChunkResponse {
                data: vec![7; 4],
                total_size: 10,
                is_last: true,
            })
        }
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_store_offsets_are_contiguous() {
        let client = Arc::new(RecordingClient::default());
        let codec = ChunkCodec::new(client.clone(), 10, Duration::from_secs(5));

        codec.store("ref-1", &payload(25)).await.unwrap();

        let stores = client.stores.lock().unwrap().clone();
        assert_eq!(
            stores,
            vec![(0, 10, 25, false), (10, 10, 25, false), (20, 5, 25, true)]
        );
    }

    #[tokio::test]
    async fn test_store_exact_multiple() {
        let client = Arc::new(RecordingClient::default());
        let codec = ChunkCodec::new(client.clone(), 8, Duration::from_secs(5));

        codec.store("ref-2", &payload(32)).await.unwrap();

        let stores = client.stores.lock().unwrap().clone();
        assert_eq!(stores.len(), 4);
        let offsets: Vec<u64> = stores.iter().map(|s| s.0).collect();
        assert_eq!(offsets, vec![0, 8, 16, 24]);
        let lasts: Vec<bool> = stores.iter().map(|s| s.3).collect();
        assert_eq!(lasts, vec![false, false, false, true]);
    }

    #[tokio::test]
    async fn test_fetch_reassembles_exact_bytes() {
        let client = Arc::new(RecordingClient::default());
        let codec = ChunkCodec::new(client.clone(), 10, Duration::from_secs(5));
        let data = payload(25);

        codec.store("ref-3", &data).await.unwrap();
        let fetched = codec.fetch("ref-3", 25).await.unwrap();
        assert_eq!(fetched, data);

        let offsets: Vec<u64> = client.gets.lock().unwrap().iter().map(|g| g.offset).collect();
        assert_eq!(offsets, vec![0, 10, 20]);
        assert!(client.gets.lock().unwrap().iter().all(|g| g.length == 10));
    }

    #[tokio::test]
    async fn test_fetch_accepts_chunks_smaller_than_maximum() {
        // Producer used 4-byte chunks, consumer asks for 10; the store answers with
        // whatever it holds
        let store = Arc::new(MemoryChunkStore::new());
        let producer = ChunkCodec::new(store.clone(), 4, Duration::from_secs(5));
        let consumer = ChunkCodec::new(store, 10, Duration::from_secs(5));
        let data = payload(18);

        producer.store("ref-4", &data).await.unwrap();
        assert_eq!(consumer.fetch("ref-4", 18).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_fetch_unknown_reference_is_not_found() {
        let codec = ChunkCodec::new(
            Arc::new(MemoryChunkStore::new()),
            10,
            Duration::from_secs(5),
        );
        let err = codec.fetch("missing", 5).await.unwrap_err();
        assert!(err.is_not_found(), "{err:?}");
    }

    #[tokio::test]
    async fn test_store_failure_carries_offset() {
        let client = Arc::new(FailingClient {
            fail_at: 20,
            inner: MemoryChunkStore::new(),
        });
        let codec = ChunkCodec::new(client.clone(), 10, Duration::from_secs(5));

        let err = codec.store("ref-5", &payload(35)).await.unwrap_err();
        assert!(matches!(err, OffloadError::Transport { offset: 20, .. }), "{err:?}");
        // Chunks before the failure are not rolled back
        assert!(client.inner.contains("ref-5").await);
    }

    #[tokio::test]
    async fn test_fetch_failure_carries_offset() {
        let client = Arc::new(FailingClient {
            fail_at: 10,
            inner: MemoryChunkStore::new(),
        });
        client
            .inner
            .store_chunk(StoreChunkRequest {
                ref_id: "ref-6".into(),
                data: payload(30),
                offset: 0,
                total_size: 30,
                is_last: true,
            })
            .await
            .unwrap();
        let codec = ChunkCodec::new(client, 10, Duration::from_secs(5));

        let err = codec.fetch("ref-6", 30).await.unwrap_err();
        assert!(matches!(err, OffloadError::Transport { offset: 10, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_store_timeout() {
        let codec = ChunkCodec::new(
            Arc::new(SlowClient {
                delay: Duration::from_secs(10),
            }),
            10,
            Duration::from_millis(50),
        );
        let err = codec.store("ref-7", &payload(30)).await.unwrap_err();
        assert!(err.is_timeout(), "{err:?}");
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let codec = ChunkCodec::new(
            Arc::new(SlowClient {
                delay: Duration::from_secs(10),
            }),
            10,
            Duration::from_millis(50),
        );
        let err = codec.fetch("ref-8", 30).await.unwrap_err();
        assert!(err.is_timeout(), "{err:?}");
    }

    #[tokio::test]
    async fn test_fetch_short_payload_is_transport_error() {
        let codec = ChunkCodec::new(Arc::new(TruncatingClient), 10, Duration::from_secs(5));
        let err = codec.fetch("ref-9", 10).await.unwrap_err();
        assert!(matches!(err, OffloadError::Transport { offset: 4, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_fetch_empty_payload() {
        let codec = ChunkCodec::new(
            Arc::new(MemoryChunkStore::new()),
            10,
            Duration::from_secs(5),
        );
        assert!(codec.fetch("never-stored", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_timeout_leaves_written_chunks() {
        let client = Arc::new(StallingClient {
            allowed: 2,
            calls: AtomicUsize::new(0),
            inner: MemoryChunkStore::new(),
        });
        let codec = ChunkCodec::new(client.clone(), 10, Duration::from_millis(100));

        let err = codec.store("ref-10", &payload(30)).await.unwrap_err();
        assert!(err.is_timeout(), "{err:?}");
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert!(client.inner.contains("ref-10").await);

        // The first 20 bytes stay in place but are never served as the whole payload
        let reader = ChunkCodec::new(Arc::new(client.inner.clone()), 10, Duration::from_secs(5));
        let err = reader.fetch("ref-10", 30).await.unwrap_err();
        assert!(matches!(err, OffloadError::Transport { offset: 0, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_fetch_partially_stored_payload_fails() {
        let store = MemoryChunkStore::new();
        store
            .store_chunk(StoreChunkRequest {
                ref_id: "partial".into(),
                data: vec![7; 10],
                offset: 0,
                total_size: 30,
                is_last: false,
            })
            .await
            .unwrap();
        let codec = ChunkCodec::new(Arc::new(store), 10, Duration::from_secs(5));

        let err = codec.fetch("partial", 30).await.unwrap_err();
        assert!(matches!(err, OffloadError::Transport { offset: 0, .. }), "{err:?}");
    }
}
