//! Durable record of the in-progress upload.
//!
//! The record lives as a single JSON document (by default `multipart.json` in
//! the working directory) holding the target `Bucket`/`Key`, the `UploadId`
//! issued by the service and the `Parts` transferred so far. Fields the
//! record does not model, such as the rest of the service's creation
//! response, are kept verbatim across load/save cycles.
//!
//! There is no locking: two processes driving the same record at once is a
//! usage error and is not guarded against.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::contract::{CompletedPart, CreatedUpload, UploadTarget};
use crate::error::SessionError;

/// Default file name of the session record.
pub const DEFAULT_STATE_FILE: &str = "multipart.json";

/// Persisted multi-part upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSession {
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "UploadId")]
    pub upload_id: String,
    /// Completed parts in the order they were first recorded.
    #[serde(rename = "Parts", default)]
    pub parts: Vec<CompletedPart>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UploadSession {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, created: CreatedUpload) -> Self {
        let mut extra = created.fields;
        // identity fields are owned by the typed record
        for field in ["Bucket", "Key", "UploadId", "Parts"] {
            extra.remove(field);
        }
        Self {
            bucket: bucket.into(),
            key: key.into(),
            upload_id: created.upload_id,
            parts: Vec::new(),
            extra,
        }
    }

    pub fn target(&self) -> UploadTarget {
        UploadTarget {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            upload_id: self.upload_id.clone(),
        }
    }

    /// `s3://bucket/key` for display.
    pub fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }

    pub fn has_part(&self, part_number: i32) -> bool {
        self.parts.iter().any(|p| p.part_number == part_number)
    }

    /// Record a transferred part. A part number seen before has its ETag
    /// replaced in place, keeping its original position.
    pub fn record_part(&mut self, part: CompletedPart) {
        match self
            .parts
            .iter_mut()
            .find(|p| p.part_number == part.part_number)
        {
            Some(existing) => existing.e_tag = part.e_tag,
            None => self.parts.push(part),
        }
    }
}

/// Storage for at most one [`UploadSession`].
pub trait SessionStore: Send + Sync {
    fn exists(&self) -> bool;

    /// Fails with `NoActiveSession` when absent and `CorruptState` when the
    /// record does not parse.
    fn load(&self) -> Result<UploadSession, SessionError>;

    /// Replace the record. Readers never observe a partial write.
    fn save(&self, session: &UploadSession) -> Result<(), SessionError>;

    /// Remove the record; a missing record is not an error.
    fn delete(&self) -> Result<(), SessionError>;
}

fn decode(raw: &str, origin: &Path) -> Result<UploadSession, SessionError> {
    serde_json::from_str(raw).map_err(|e| SessionError::CorruptState {
        path: origin.to_path_buf(),
        reason: e.to_string(),
    })
}

fn encode(session: &UploadSession) -> Result<Vec<u8>, SessionError> {
    serde_json::to_vec_pretty(session).map_err(|e| SessionError::Io(io::Error::from(e)))
}

/// Session record kept as a JSON file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl Default for FileSessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_FILE)
    }
}

impl SessionStore for FileSessionStore {
    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn load(&self) -> Result<UploadSession, SessionError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SessionError::NoActiveSession)
            }
            Err(e) => return Err(SessionError::Io(e)),
        };
        let session = decode(&raw, &self.path)?;
        debug!(
            path = %self.path.display(),
            upload_id = %session.upload_id,
            parts = session.parts.len(),
            "Loaded session state"
        );
        Ok(session)
    }

    fn save(&self, session: &UploadSession) -> Result<(), SessionError> {
        let bytes = encode(session)?;

        // the temp file must share a filesystem with the target for the rename to be atomic
        let mut tmp = NamedTempFile::new_in(self.parent_dir())?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| SessionError::Io(e.error))?;

        debug!(
            path = %self.path.display(),
            upload_id = %session.upload_id,
            parts = session.parts.len(),
            "Saved session state"
        );
        Ok(())
    }

    fn delete(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Removed session state");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Io(e)),
        }
    }
}

/// In-process store holding the serialized record, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    raw: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an arbitrary serialized record, valid or not.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Mutex::new(Some(raw.into())),
        }
    }

    /// Current serialized record.
    pub fn raw(&self) -> Option<String> {
        self.slot().clone()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.raw.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStore for MemorySessionStore {
    fn exists(&self) -> bool {
        self.slot().is_some()
    }

    fn load(&self) -> Result<UploadSession, SessionError> {
        match self.slot().as_deref() {
            Some(raw) => decode(raw, Path::new("<memory>")),
            None => Err(SessionError::NoActiveSession),
        }
    }

    fn save(&self, session: &UploadSession) -> Result<(), SessionError> {
        let bytes = encode(session)?;
        let raw = String::from_utf8(bytes).map_err(|e| {
            SessionError::Io(io::Error::new(io::ErrorKind::InvalidData, e))
        })?;
        *self.slot() = Some(raw);
        Ok(())
    }

    fn delete(&self) -> Result<(), SessionError> {
        *self.slot() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample_session() -> UploadSession {
        let mut created = CreatedUpload::new("U1");
        created
            .fields
            .insert("ServerSideEncryption".into(), json!("AES256"));
        let mut session = UploadSession::new("bucket1", "obj.bin", created);
        session.record_part(CompletedPart {
            e_tag: "abc".into(),
            part_number: 1,
        });
        session
    }

    #[test]
    fn test_file_store_round_trip_is_stable() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join(DEFAULT_STATE_FILE));
        let session = sample_session();

        store.save(&session).unwrap();
        let first = fs::read(store.path()).unwrap();
        let loaded = store.load().unwrap();
        store.save(&loaded).unwrap();
        let second = fs::read(store.path()).unwrap();

        assert_eq!(loaded, session);
        assert_eq!(first, second);
    }

    #[test]
    fn test_record_uses_service_field_names() {
        let value = serde_json::to_value(sample_session()).unwrap();
        assert_eq!(
            value,
            json!({
                "Bucket": "bucket1",
                "Key": "obj.bin",
                "UploadId": "U1",
                "Parts": [{"ETag": "abc", "PartNumber": 1}],
                "ServerSideEncryption": "AES256"
            })
        );
    }

    #[test]
    fn test_unknown_fields_survive_load_and_save() {
        let raw = r#"{"Bucket":"b","Key":"k","UploadId":"u","ResponseMetadata":{"HTTPStatusCode":200}}"#;
        let store = MemorySessionStore::with_raw(raw);
        let session = store.load().unwrap();
        assert!(session.parts.is_empty());
        store.save(&session).unwrap();

        let reloaded: Value = serde_json::from_str(&store.raw().unwrap()).unwrap();
        assert_eq!(reloaded["ResponseMetadata"]["HTTPStatusCode"], json!(200));
        assert_eq!(reloaded["Parts"], json!([]));
    }

    #[test]
    fn test_missing_fields_are_corrupt_state() {
        let store = MemorySessionStore::with_raw(r#"{"Bucket":"b"}"#);
        assert!(matches!(
            store.load(),
            Err(SessionError::CorruptState { .. })
        ));

        let dir = tempdir().unwrap();
        let path = dir.path().join(DEFAULT_STATE_FILE);
        fs::write(&path, "{not json").unwrap();
        let store = FileSessionStore::new(&path);
        assert!(store.exists());
        assert!(matches!(
            store.load(),
            Err(SessionError::CorruptState { .. })
        ));
    }

    #[test]
    fn test_absent_record_and_idempotent_delete() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join(DEFAULT_STATE_FILE));
        assert!(!store.exists());
        assert!(matches!(store.load(), Err(SessionError::NoActiveSession)));
        store.delete().unwrap();

        store.save(&sample_session()).unwrap();
        assert!(store.exists());
        store.delete().unwrap();
        assert!(!store.exists());
    }

    #[test]
    fn test_save_leaves_no_temp_files_behind() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join(DEFAULT_STATE_FILE));
        store.save(&sample_session()).unwrap();
        store.save(&sample_session()).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_record_part_upserts_by_number() {
        let mut session = sample_session();
        session.record_part(CompletedPart {
            e_tag: "def".into(),
            part_number: 2,
        });
        session.record_part(CompletedPart {
            e_tag: "xyz".into(),
            part_number: 1,
        });

        assert_eq!(
            session.parts,
            vec![
                CompletedPart {
                    e_tag: "xyz".into(),
                    part_number: 1
                },
                CompletedPart {
                    e_tag: "def".into(),
                    part_number: 2
                },
            ]
        );
        assert!(session.has_part(2));
        assert!(!session.has_part(3));
    }
}
