// SPDX-License-Identifier: MIT

//! File-backed store for large values
//!
//! Each offloaded value becomes one file, `<root>/<tenant>/<id>.lmo`. Files are only
//! removed by an explicit `delete`.

use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::record::{
    is_valid_id, new_id, LargeObjectRecord, RecordFile, LMO_EXTENSION, LMO_MAGIC, LMO_VERSION,
};
use crate::sdk::config::{validate_tenant, LocalStoreConfig};
use crate::sdk::error::OffloadError;

pub struct LocalObjectStore {
    dir: PathBuf,
    threshold: usize,
}

impl LocalObjectStore {
    pub fn new(root: impl AsRef<Path>, tenant: &str, threshold: usize) -> Result<Self, OffloadError> {
        validate_tenant(tenant)?;
        Ok(Self {
            dir: root.as_ref().join(tenant),
            threshold,
        })
    }

    pub fn from_config(config: &LocalStoreConfig) -> Result<Self, OffloadError> {
        Self::new(&config.root, &config.tenant, config.threshold)
    }

    /// Tenant directory holding the record files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn record_path(&self, id: &str) -> Result<PathBuf, OffloadError> {
        if !is_valid_id(id) {
            return Err(OffloadError::invalid_reference(format!(
                "malformed object id {:?}",
                id
            )));
        }
        Ok(self.dir.join(format!("{}.{}", id, LMO_EXTENSION)))
    }

    /// Offload `value` if its marshalled size is over the threshold.
    ///
    /// Returns `None` when the value should stay inline, otherwise the record with
    /// its data cleared.
    pub async fn serialize(&self, value: &Value) -> Result<Option<LargeObjectRecord>, OffloadError> {
        let bytes = serde_json::to_vec(value)?;
        self.serialize_marshalled(value, &bytes).await
    }

    /// Like [`serialize`](Self::serialize) when the caller already holds the
    /// marshalled bytes of `value`.
    pub async fn serialize_marshalled(
        &self,
        value: &Value,
        bytes: &[u8],
    ) -> Result<Option<LargeObjectRecord>, OffloadError> {
        if bytes.len() <= self.threshold {
            return Ok(None);
        }

        let record = LargeObjectRecord::reference(new_id(), bytes);
        let contents = serde_json::to_vec(&RecordFile {
            magic: record.magic,
            version: record.version,
            id: &record.id,
            head: &record.head,
            size: record.size,
            data: value,
        })?;

        fs::create_dir_all(&self.dir).await.map_err(|e| {
            OffloadError::transport(0, format!("create {}: {}", self.dir.display(), e))
        })?;

        // Write beside the target and rename, so readers never see a partial file
        let path = self.record_path(&record.id)?;
        let staging = self
            .dir
            .join(format!("{}.{}.tmp", record.id, LMO_EXTENSION));
        fs::write(&staging, &contents)
            .await
            .map_err(|e| OffloadError::transport(0, format!("write {}: {}", staging.display(), e)))?;
        fs::rename(&staging, &path)
            .await
            .map_err(|e| OffloadError::transport(0, format!("rename {}: {}", path.display(), e)))?;

        log::info!(
            "Offloaded {} bytes to {}",
            record.size,
            path.display()
        );
        Ok(Some(record))
    }

    /// Read back the full record for `id`
    pub async fn deserialize(&self, id: &str) -> Result<LargeObjectRecord, OffloadError> {
        let path = self.record_path(id)?;
        let contents = fs::read(&path).await.map_err(|e| io_error(id, &path, e))?;
        let record: LargeObjectRecord = serde_json::from_slice(&contents)?;

        if record.magic != LMO_MAGIC {
            return Err(OffloadError::invalid_reference(format!(
                "{} has bad magic {:#x}",
                path.display(),
                record.magic
            )));
        }
        if record.version != LMO_VERSION {
            return Err(OffloadError::invalid_reference(format!(
                "{} has unsupported version {}",
                path.display(),
                record.version
            )));
        }
        if record.id != id {
            return Err(OffloadError::invalid_reference(format!(
                "{} holds record {}",
                path.display(),
                record.id
            )));
        }

        Ok(record)
    }

    /// Resolve an inline record (as found in a message) to its stored record
    pub async fn deserialize_from_value(
        &self,
        value: &Value,
    ) -> Result<LargeObjectRecord, OffloadError> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| OffloadError::invalid_reference("record has no id"))?;
        self.deserialize(id).await
    }

    /// Remove the record file for `id`. Never called implicitly.
    pub async fn delete(&self, id: &str) -> Result<(), OffloadError> {
        let path = self.record_path(id)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| io_error(id, &path, e))?;
        log::info!("Deleted {}", path.display());
        Ok(())
    }
}

fn io_error(id: &str, path: &Path, err: std::io::Error) -> OffloadError {
    if err.kind() == ErrorKind::NotFound {
        OffloadError::NotFound(id.to_string())
    } else {
        OffloadError::transport(0, format!("{}: {}", path.display(), err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offload::lmo::record::{is_record, ID_LEN};
    use serde_json::json;
    use tempfile::TempDir;

    const LIMIT: usize = 256 * 1024;

    fn record_files(dir: &Path) -> Vec<PathBuf> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// String value whose marshalled form is exactly `len` bytes
    fn value_of_len(len: usize) -> Value {
        Value::String("v".repeat(len - 2))
    }

    #[tokio::test]
    async fn test_serialize_over_limit_writes_one_record() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path(), "robot-1", LIMIT).unwrap();
        let value = value_of_len(300 * 1024);

        let record = store.serialize(&value).await.unwrap().unwrap();
        assert_eq!(record.magic, 0x1343B7E);
        assert_eq!(record.id.len(), ID_LEN);
        assert_eq!(record.size, 300 * 1024);
        assert!(record.data.is_none());

        let files = record_files(store.dir());
        assert_eq!(files.len(), 1);
        assert_eq!(
            files[0],
            temp_dir.path().join("robot-1").join(format!("{}.lmo", record.id))
        );

        let on_disk: Value = serde_json::from_slice(&std::fs::read(&files[0]).unwrap()).unwrap();
        assert!(is_record(&on_disk));
        assert_eq!(on_disk["data"], value);

        let restored = store.deserialize(&record.id).await.unwrap();
        assert_eq!(restored.value(), Some(&value));
        assert_eq!(restored.head, record.head);
    }

    #[tokio::test]
    async fn test_serialize_at_or_under_limit_is_not_offloaded() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path(), "robot-1", LIMIT).unwrap();

        assert!(store.serialize(&value_of_len(LIMIT)).await.unwrap().is_none());
        assert!(store.serialize(&json!({"a": 1})).await.unwrap().is_none());
        assert!(record_files(store.dir()).is_empty());

        assert!(store
            .serialize(&value_of_len(LIMIT + 1))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_deserialize_is_repeatable() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path(), "t", 16).unwrap();
        let value = json!({"rows": [1, 2, 3, 4, 5, 6, 7, 8, 9]});
        let record = store.serialize(&value).await.unwrap().unwrap();

        for _ in 0..3 {
            let restored = store.deserialize(&record.id).await.unwrap();
            assert_eq!(restored.into_value(), Some(value.clone()));
        }
        assert_eq!(record_files(store.dir()).len(), 1);
    }

    #[tokio::test]
    async fn test_deserialize_from_inline_value() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path(), "t", 16).unwrap();
        let value = json!(["a long enough array", "of strings"]);
        let record = store.serialize(&value).await.unwrap().unwrap();

        let inline = serde_json::to_value(&record).unwrap();
        let restored = store.deserialize_from_value(&inline).await.unwrap();
        assert_eq!(restored.into_value(), Some(value));

        let err = store
            .deserialize_from_value(&json!({"magic": 0x1343B7E}))
            .await
            .unwrap_err();
        assert!(matches!(err, OffloadError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path(), "t", 16).unwrap();
        let err = store.deserialize(&new_id()).await.unwrap_err();
        assert!(err.is_not_found(), "{err:?}");
    }

    #[tokio::test]
    async fn test_corrupt_record_is_encoding_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path(), "t", 16).unwrap();
        let id = new_id();
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.record_path(&id).unwrap(), b"{\"magic\": 2020").unwrap();

        let err = store.deserialize(&id).await.unwrap_err();
        assert!(matches!(err, OffloadError::Encoding(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_wrong_magic_is_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path(), "t", 16).unwrap();
        let id = new_id();
        std::fs::create_dir_all(store.dir()).unwrap();
        let bogus = json!({"magic": 1, "version": 1, "id": id, "head": "", "size": 0});
        std::fs::write(
            store.record_path(&id).unwrap(),
            serde_json::to_vec(&bogus).unwrap(),
        )
        .unwrap();

        let err = store.deserialize(&id).await.unwrap_err();
        assert!(matches!(err, OffloadError::InvalidReference(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_path_traversal_id_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path(), "t", 16).unwrap();
        for id in ["../secret", "", "a/b"] {
            assert!(matches!(
                store.deserialize(id).await,
                Err(OffloadError::InvalidReference(_))
            ));
            assert!(matches!(
                store.delete(id).await,
                Err(OffloadError::InvalidReference(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_explicit_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path(), "t", 16).unwrap();
        let record = store
            .serialize(&json!("a value well over sixteen bytes"))
            .await
            .unwrap()
            .unwrap();

        store.delete(&record.id).await.unwrap();
        assert!(record_files(store.dir()).is_empty());
        assert!(store.deserialize(&record.id).await.unwrap_err().is_not_found());
        assert!(store.delete(&record.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let first = LocalObjectStore::new(temp_dir.path(), "tenant-a", 16).unwrap();
        let second = LocalObjectStore::new(temp_dir.path(), "tenant-b", 16).unwrap();
        let record = first
            .serialize(&json!("a value well over sixteen bytes"))
            .await
            .unwrap()
            .unwrap();

        assert!(second.deserialize(&record.id).await.unwrap_err().is_not_found());
    }

    #[test]
    fn test_tenant_must_be_one_directory() {
        let temp_dir = TempDir::new().unwrap();
        for tenant in ["", ".", "..", "../other", "a/b", "a\\b"] {
            assert!(
                matches!(
                    LocalObjectStore::new(temp_dir.path(), tenant, 16),
                    Err(OffloadError::Config(_))
                ),
                "tenant {:?} accepted",
                tenant
            );
        }

        let mut config = LocalStoreConfig::default();
        config.root = temp_dir.path().to_path_buf();
        config.tenant = "../escape".into();
        assert!(LocalObjectStore::from_config(&config).is_err());

        config.tenant = "robot-1".into();
        let store = LocalObjectStore::from_config(&config).unwrap();
        assert_eq!(store.dir(), temp_dir.path().join("robot-1"));
    }
}
