// SPDX-License-Identifier: MIT

//! Size gate - picks which parts of a message are too large to stay inline
//!
//! Sizes are measured on the general-purpose JSON encoding of each field, so binary
//! data carried as base64 strings counts after expansion.

use serde_json::{Map, Value};

use crate::sdk::error::OffloadError;
use crate::sdk::store::Candidate;

/// Result of running the gate over one message
#[derive(Debug)]
pub enum Evaluation {
    /// Nothing exceeds the threshold; forward the message unchanged
    Passthrough,
    /// Some top-level fields exceed the threshold.
    ///
    /// Each candidate's value has been moved out of `message`, leaving `null` in its
    /// slot until the caller splices a reference (or the original value) back.
    Fields {
        message: Map<String, Value>,
        candidates: Vec<Candidate>,
    },
    /// The message is not an object (or not JSON) and is too large as a whole
    WholeMessage(Candidate),
}

/// Per-field byte threshold check
#[derive(Debug, Clone, Copy)]
pub struct SizeGate {
    threshold: usize,
}

impl SizeGate {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// A value exactly at the threshold stays inline
    pub fn exceeds(&self, len: usize) -> bool {
        len > self.threshold
    }

    pub fn evaluate(&self, message: &[u8]) -> Result<Evaluation, OffloadError> {
        let parsed: Value = match serde_json::from_slice(message) {
            Ok(value) => value,
            Err(_) => {
                // Not JSON: only the total size can be judged
                return Ok(self.whole_message(message, None));
            }
        };

        let mut fields = match parsed {
            Value::Object(fields) => fields,
            other => return Ok(self.whole_message(message, Some(other))),
        };

        let mut candidates = Vec::new();
        for (key, value) in fields.iter_mut() {
            let bytes = serde_json::to_vec(value)?;
            if !self.exceeds(bytes.len()) {
                continue;
            }
            candidates.push(Candidate {
                field_path: key.clone(),
                bytes,
                value: Some(value.take()),
            });
        }

        if candidates.is_empty() {
            return Ok(Evaluation::Passthrough);
        }

        Ok(Evaluation::Fields {
            message: fields,
            candidates,
        })
    }

    fn whole_message(&self, message: &[u8], value: Option<Value>) -> Evaluation {
        if !self.exceeds(message.len()) {
            return Evaluation::Passthrough;
        }
        Evaluation::WholeMessage(Candidate {
            field_path: String::new(),
            bytes: message.to_vec(),
            value,
        })
    }
}
