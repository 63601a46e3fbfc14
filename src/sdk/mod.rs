// SPDX-License-Identifier: MIT

//! Shared building blocks: errors, configuration and the backend trait
//!
//! This module provides:
//! - `OffloadError` - the error taxonomy for every offload/resolve path
//! - `OffloadConfig` - per-backend thresholds, deadlines and capability flags
//! - `LargeValueStore` - the seam both backends implement

pub mod config;
pub mod error;
pub mod store;

pub use config::{Capabilities, LocalStoreConfig, OffloadConfig, RemoteStoreConfig};
pub use error::{ChunkRpcError, OffloadError};
pub use store::{Candidate, LargeValueStore, StoredRef};
