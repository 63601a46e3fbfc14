// SPDX-License-Identifier: MIT

//! Remote chunk store plumbing
//!
//! This module provides:
//! - `ChunkStoreClient` - store/get calls against a remote chunk store
//! - `ChunkCodec` - splits payloads into offset windows and reassembles them
//! - `MemoryChunkStore` - in-process store, used by the chunk host and tests
//! - `HttpChunkClient` - client for a chunk host over HTTP

pub mod client;
pub mod codec;
pub mod http;
pub mod memory;

pub use client::{ChunkStoreClient, GetChunkRequest, GetChunkResponse, StoreChunkRequest};
pub use codec::ChunkCodec;
pub use http::HttpChunkClient;
pub use memory::MemoryChunkStore;
