use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Extended attribute holding the sideband record.
pub const SIDEBAND_ATTR: &str = "user.drivepull";

/// Out-of-band record tying a local file to the remote entry it represents.
/// Lives outside the file's byte content, so it can go stale if something
/// other than this engine edits the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sideband {
    #[serde(rename = "fileId")]
    pub remote_id: String,
    /// Last content hash known to match the file; absent until computed.
    #[serde(rename = "md5", default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

/// Per-file sideband channel. Absent, unparsable, or id-less records all read
/// back as `None`; corruption never blocks processing.
pub trait MetadataStore: Send + Sync {
    fn read(&self, path: &Path) -> Option<Sideband>;
    fn write(&self, path: &Path, record: &Sideband) -> io::Result<()>;
}

/// Production store backed by native extended attributes.
#[derive(Debug, Default, Clone, Copy)]
pub struct XattrStore;

impl XattrStore {
    pub fn new() -> Self {
        Self
    }
}

impl MetadataStore for XattrStore {
    fn read(&self, path: &Path) -> Option<Sideband> {
        let raw = xattr::get(path, SIDEBAND_ATTR).ok().flatten()?;
        decode(&raw)
    }

    fn write(&self, path: &Path, record: &Sideband) -> io::Result<()> {
        let encoded = serde_json::to_vec(record)?;
        xattr::set(path, SIDEBAND_ATTR, &encoded)
    }
}

/// In-memory store for tests and for filesystems without xattr support.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<PathBuf, Sideband>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryStore {
    fn read(&self, path: &Path) -> Option<Sideband> {
        self.records
            .lock()
            .expect("metadata store lock poisoned")
            .get(path)
            .cloned()
    }

    fn write(&self, path: &Path, record: &Sideband) -> io::Result<()> {
        self.records
            .lock()
            .expect("metadata store lock poisoned")
            .insert(path.to_path_buf(), record.clone());
        Ok(())
    }
}

fn decode(raw: &[u8]) -> Option<Sideband> {
    let record: Sideband = serde_json::from_slice(raw).ok()?;
    // A record without a remote id identifies nothing.
    if record.remote_id.is_empty() {
        return None;
    }
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn memory_store_round_trips_records() {
        let store = MemoryStore::new();
        let record = Sideband {
            remote_id: "E1".into(),
            content_hash: Some("abc123".into()),
        };

        assert!(store.read(Path::new("/tmp/a")).is_none());
        store.write(Path::new("/tmp/a"), &record).unwrap();
        assert_eq!(store.read(Path::new("/tmp/a")), Some(record));
    }

    #[test]
    fn corrupt_payload_reads_as_absent() {
        assert!(decode(b"not json").is_none());
        assert!(decode(b"{\"md5\":\"abc\"}").is_none());
        assert!(decode(b"{\"fileId\":\"\"}").is_none());
    }

    #[test]
    fn hash_is_optional() {
        let record = decode(b"{\"fileId\":\"E1\"}").unwrap();
        assert_eq!(record.remote_id, "E1");
        assert!(record.content_hash.is_none());
    }

    #[test]
    fn xattr_store_round_trips_when_supported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.bin");
        std::fs::write(&path, b"content").unwrap();

        let store = XattrStore::new();
        let record = Sideband {
            remote_id: "E1".into(),
            content_hash: None,
        };
        // Some filesystems (and some CI sandboxes) reject user xattrs; the
        // production path degrades to "no metadata" there, so skip.
        if store.write(&path, &record).is_err() {
            return;
        }
        assert_eq!(store.read(&path), Some(record));
    }
}
