// SPDX-License-Identifier: MIT

pub mod offload;
pub mod sdk;
