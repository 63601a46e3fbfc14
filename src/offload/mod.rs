// SPDX-License-Identifier: MIT

//! Large-value offload and rehydrate for workflow messages
//!
//! This module provides:
//! - `SizeGate` - finds the top-level fields too large to stay inline
//! - `ChunkedRef` - the marker left in place of a remotely stored field
//! - `RemoteValueStore` / `LocalValueStore` - the two storage backends
//! - `MessageRefScanner` - offloads outbound messages and resolves inbound ones
//! - `server` - a reference chunk host

pub mod backend;
pub mod chunk;
pub mod gate;
pub mod lmo;
pub mod marker;
pub mod scanner;
pub mod server;

pub use backend::{select_store, LocalValueStore, RemoteValueStore};
pub use gate::{Evaluation, SizeGate};
pub use marker::ChunkedRef;
pub use scanner::MessageRefScanner;
