// SPDX-License-Identifier: MIT

//! Typed error handling for offload-rs
//!
//! `OffloadError` is the error every offload/resolve path returns. Timeouts are kept
//! apart from not-found and transport failures so callers can pick their own retry
//! policy.

use std::time::Duration;
use thiserror::Error;

/// Top-level error type for offload and resolve operations
#[derive(Debug, Error)]
pub enum OffloadError {
    /// Unknown reference id or missing record file
    #[error("reference not found: {0}")]
    NotFound(String),

    /// The overall deadline for a store or fetch sequence expired
    #[error("chunk transfer timed out after {0:?}")]
    Timeout(Duration),

    /// A reference marker or record is present but malformed
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// RPC or file I/O failure, annotated with the offset it happened at
    #[error("transport error at offset {offset}: {message}")]
    Transport { offset: u64, message: String },

    /// Marshal/unmarshal failure of a field value or record
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Configuration errors (invalid thresholds, missing endpoint, bad tenant)
    #[error("configuration error: {0}")]
    Config(String),
}

impl OffloadError {
    /// Create a transport error at the given offset
    pub fn transport(offset: u64, message: impl Into<String>) -> Self {
        Self::Transport {
            offset,
            message: message.into(),
        }
    }

    /// Create an invalid reference error
    pub fn invalid_reference(message: impl Into<String>) -> Self {
        Self::InvalidReference(message.into())
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors returned by a chunk store client for a single call
#[derive(Debug, Error)]
pub enum ChunkRpcError {
    /// The store does not know the reference id
    #[error("chunk reference not found: {0}")]
    NotFound(String),

    /// Any other failure of the call
    #[error("{0}")]
    Rpc(String),
}

impl ChunkRpcError {
    pub fn rpc(message: impl Into<String>) -> Self {
        Self::Rpc(message.into())
    }

    /// Map a failed call at `offset` into the offload error taxonomy
    pub fn at_offset(self, offset: u64) -> OffloadError {
        match self {
            Self::NotFound(ref_id) => OffloadError::NotFound(ref_id),
            Self::Rpc(message) => OffloadError::transport(offset, message),
        }
    }
}

impl From<reqwest::Error> for ChunkRpcError {
    fn from(err: reqwest::Error) -> Self {
        Self::Rpc(err.to_string())
    }
}
