// SPDX-License-Identifier: MIT

//! Local large-message objects (LMO)
//!
//! File-backed alternative to the remote chunk store. A record is recognized by
//! the magic number at its `magic` field.

mod record;
mod store;

pub use record::{
    is_record, is_record_raw, is_valid_id, new_id, LargeObjectRecord, ID_LEN, LMO_EXTENSION,
    LMO_HEAD, LMO_MAGIC, LMO_VERSION,
};
pub use store::LocalObjectStore;
