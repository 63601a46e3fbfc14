// SPDX-License-Identifier: MIT

//! Message reference scanner - offloads outbound fields and resolves inbound ones
//!
//! Only top-level fields are looked at. A reference sitting at the top level of a
//! message (empty field path) stands in for the entire message.

use serde_json::{Map, Value};
use std::sync::Arc;

use super::backend::select_store;
use super::chunk::ChunkStoreClient;
use super::gate::{Evaluation, SizeGate};
use crate::sdk::config::OffloadConfig;
use crate::sdk::error::OffloadError;
use crate::sdk::store::LargeValueStore;

#[derive(Clone)]
pub struct MessageRefScanner {
    store: Arc<dyn LargeValueStore>,
    gate: SizeGate,
}

impl MessageRefScanner {
    pub fn new(store: Arc<dyn LargeValueStore>) -> Self {
        let gate = SizeGate::new(store.threshold());
        Self { store, gate }
    }

    /// Build a scanner for the backend the configuration allows, if any
    pub fn from_config(
        config: &OffloadConfig,
        remote_client: Option<Arc<dyn ChunkStoreClient>>,
    ) -> Result<Option<Self>, OffloadError> {
        Ok(select_store(config, remote_client)?.map(Self::new))
    }

    pub fn store(&self) -> &Arc<dyn LargeValueStore> {
        &self.store
    }

    /// Replace every oversized top-level field with a reference.
    ///
    /// When nothing is offloaded the input bytes are returned unchanged.
    pub async fn offload(&self, message: &[u8]) -> Result<Vec<u8>, OffloadError> {
        match self.gate.evaluate(message)? {
            Evaluation::Passthrough => Ok(message.to_vec()),
            Evaluation::WholeMessage(candidate) => {
                match self.store.offload(&candidate).await? {
                    Some(reference) => {
                        log::info!(
                            "Offloaded whole message of {} bytes to {} store",
                            candidate.bytes.len(),
                            self.store.name()
                        );
                        Ok(serde_json::to_vec(&reference)?)
                    }
                    None => Ok(message.to_vec()),
                }
            }
            Evaluation::Fields {
                message: mut fields,
                candidates,
            } => {
                let mut offloaded = 0usize;
                for candidate in candidates {
                    let replacement = match self.store.offload(&candidate).await? {
                        Some(reference) => {
                            offloaded += 1;
                            log::info!(
                                "Offloaded field '{}' ({} bytes) to {} store",
                                candidate.field_path,
                                candidate.bytes.len(),
                                self.store.name()
                            );
                            reference
                        }
                        None => candidate.value.unwrap_or(Value::Null),
                    };
                    if let Some(slot) = fields.get_mut(&candidate.field_path) {
                        *slot = replacement;
                    }
                }

                if offloaded == 0 {
                    return Ok(message.to_vec());
                }
                Ok(serde_json::to_vec(&fields)?)
            }
        }
    }

    /// Replace every top-level reference with the value it points to.
    ///
    /// Fails as a whole if any reference cannot be resolved. A message without
    /// references is returned unchanged.
    pub async fn resolve(&self, message: &[u8]) -> Result<Vec<u8>, OffloadError> {
        let Ok(parsed) = serde_json::from_slice::<Value>(message) else {
            return Ok(message.to_vec());
        };

        if let Some(reference) = self.store.recognize(&parsed)? {
            if !reference.field_path.is_empty() {
                return Err(OffloadError::invalid_reference(format!(
                    "top-level reference {} names field '{}'",
                    reference.id, reference.field_path
                )));
            }
            let bytes = self
                .store
                .rehydrate(&reference)
                .await
                .map_err(|e| self.fetch_failed(&reference.id, e))?;
            log::info!("Resolved whole message from {}", reference.id);
            return Ok(bytes);
        }

        let Value::Object(mut fields) = parsed else {
            return Ok(message.to_vec());
        };

        let resolved = self.resolve_fields(&mut fields).await?;
        if resolved == 0 {
            return Ok(message.to_vec());
        }
        Ok(serde_json::to_vec(&fields)?)
    }

    /// True when the message, or any of its top-level fields, is a reference
    pub fn contains_references(&self, message: &[u8]) -> bool {
        let Ok(parsed) = serde_json::from_slice::<Value>(message) else {
            return false;
        };
        let recognized = |value: &Value| !matches!(self.store.recognize(value), Ok(None));

        if recognized(&parsed) {
            return true;
        }
        parsed
            .as_object()
            .is_some_and(|fields| fields.values().any(recognized))
    }

    async fn resolve_fields(&self, fields: &mut Map<String, Value>) -> Result<usize, OffloadError> {
        let mut resolved = 0usize;

        for (key, value) in fields.iter_mut() {
            let Some(reference) = self.store.recognize(value)? else {
                continue;
            };

            let bytes = self
                .store
                .rehydrate(&reference)
                .await
                .map_err(|e| self.fetch_failed(&reference.id, e))?;
            *value = match serde_json::from_slice::<Value>(&bytes) {
                Ok(decoded) => decoded,
                Err(_) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
            };
            resolved += 1;
            log::debug!("Resolved field '{}' from {}", key, reference.id);
        }

        Ok(resolved)
    }

    fn fetch_failed(&self, id: &str, err: OffloadError) -> OffloadError {
        log::error!("Failed to fetch {} from {} store: {}", id, self.store.name(), err);
        err
    }
}
