use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::UntrackedPolicy;

use super::metadata::{MetadataStore, Sideband};
use super::names;

/// Where a remote file should land locally, and what we already know about
/// the file occupying that path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub exists: bool,
    pub path: PathBuf,
    pub metadata: Option<Sideband>,
}

/// Destinations accepted during the current run, keyed by path with the
/// owning remote id. Downloads are asynchronous, so a filesystem scan alone
/// cannot see a sibling's not-yet-written destination; the claim set closes
/// that gap. Claims are per-run state and are never persisted.
#[derive(Debug, Default)]
pub struct ClaimSet {
    claims: Mutex<HashMap<PathBuf, String>>,
}

impl ClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn owner(&self, path: &Path) -> Option<String> {
        self.claims
            .lock()
            .expect("claim set lock poisoned")
            .get(path)
            .cloned()
    }

    fn claim(&self, path: &Path, remote_id: &str) {
        self.claims
            .lock()
            .expect("claim set lock poisoned")
            .insert(path.to_path_buf(), remote_id.to_string());
    }

    /// Forgets all claims; called at the start of each run.
    pub fn clear(&self) {
        self.claims
            .lock()
            .expect("claim set lock poisoned")
            .clear();
    }
}

/// Scans candidate names (`name`, `name (1)`, `name (2)`, …) until one of:
/// nothing is there (fresh download destination), the occupant is untracked
/// (policy decides between overwrite and advancing), or the occupant's
/// sideband record names this remote id (already ours). A path tracked by a
/// different remote entry is never reused, so distinct entries cannot
/// silently overwrite each other.
pub async fn resolve_local_file(
    store: &dyn MetadataStore,
    claims: &ClaimSet,
    dir: &Path,
    remote_id: &str,
    sanitized_name: &str,
    policy: UntrackedPolicy,
) -> io::Result<Resolution> {
    let mut attempt = 0u32;
    loop {
        let candidate = match attempt {
            0 => sanitized_name.to_string(),
            n if n <= names::MAX_NUMBERED_ATTEMPTS => names::numbered(sanitized_name, n),
            _ => names::randomized(sanitized_name),
        };
        attempt += 1;

        let path = dir.join(&candidate);
        if let Some(owner) = claims.owner(&path)
            && owner != remote_id
        {
            continue;
        }

        if !tokio::fs::try_exists(&path).await? {
            claims.claim(&path, remote_id);
            return Ok(Resolution {
                exists: false,
                path,
                metadata: None,
            });
        }

        match store.read(&path) {
            None => match policy {
                UntrackedPolicy::Overwrite => {
                    claims.claim(&path, remote_id);
                    return Ok(Resolution {
                        exists: true,
                        path,
                        metadata: None,
                    });
                }
                UntrackedPolicy::KeepBoth => continue,
            },
            Some(record) if record.remote_id == remote_id => {
                claims.claim(&path, remote_id);
                return Ok(Resolution {
                    exists: true,
                    path,
                    metadata: Some(record),
                });
            }
            Some(_) => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::metadata::MemoryStore;
    use tempfile::tempdir;

    fn tracked(id: &str) -> Sideband {
        Sideband {
            remote_id: id.into(),
            content_hash: Some("abc123".into()),
        }
    }

    #[tokio::test]
    async fn fresh_name_is_accepted_without_metadata() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::new();
        let claims = ClaimSet::new();

        let resolution = resolve_local_file(
            &store,
            &claims,
            dir.path(),
            "E1",
            "report.txt",
            UntrackedPolicy::Overwrite,
        )
        .await
        .unwrap();

        assert!(!resolution.exists);
        assert_eq!(resolution.path, dir.path().join("report.txt"));
        assert!(resolution.metadata.is_none());
    }

    #[tokio::test]
    async fn untracked_file_is_overwritten_in_place_by_default() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::new();
        let claims = ClaimSet::new();
        std::fs::write(dir.path().join("report.txt"), b"old").unwrap();

        let resolution = resolve_local_file(
            &store,
            &claims,
            dir.path(),
            "E1",
            "report.txt",
            UntrackedPolicy::Overwrite,
        )
        .await
        .unwrap();

        assert!(resolution.exists);
        assert_eq!(resolution.path, dir.path().join("report.txt"));
        assert!(resolution.metadata.is_none());
    }

    #[tokio::test]
    async fn keep_both_policy_steps_around_untracked_files() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::new();
        let claims = ClaimSet::new();
        std::fs::write(dir.path().join("report.txt"), b"old").unwrap();

        let resolution = resolve_local_file(
            &store,
            &claims,
            dir.path(),
            "E1",
            "report.txt",
            UntrackedPolicy::KeepBoth,
        )
        .await
        .unwrap();

        assert!(!resolution.exists);
        assert_eq!(resolution.path, dir.path().join("report (1).txt"));
    }

    #[tokio::test]
    async fn matching_remote_id_returns_existing_metadata() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::new();
        let claims = ClaimSet::new();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, b"content").unwrap();
        store.write(&path, &tracked("E1")).unwrap();

        let resolution = resolve_local_file(
            &store,
            &claims,
            dir.path(),
            "E1",
            "report.txt",
            UntrackedPolicy::Overwrite,
        )
        .await
        .unwrap();

        assert!(resolution.exists);
        assert_eq!(resolution.path, path);
        assert_eq!(resolution.metadata, Some(tracked("E1")));
    }

    #[tokio::test]
    async fn foreign_remote_id_advances_to_numbered_name() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::new();
        let claims = ClaimSet::new();
        let occupied = dir.path().join("report.txt");
        std::fs::write(&occupied, b"content").unwrap();
        store.write(&occupied, &tracked("E1")).unwrap();

        let resolution = resolve_local_file(
            &store,
            &claims,
            dir.path(),
            "E2",
            "report.txt",
            UntrackedPolicy::Overwrite,
        )
        .await
        .unwrap();

        assert!(!resolution.exists);
        assert_eq!(resolution.path, dir.path().join("report (1).txt"));
    }

    #[tokio::test]
    async fn distinct_entries_resolve_to_distinct_paths_within_one_run() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::new();
        let claims = ClaimSet::new();

        let first = resolve_local_file(
            &store,
            &claims,
            dir.path(),
            "E1",
            "report.txt",
            UntrackedPolicy::Overwrite,
        )
        .await
        .unwrap();
        // Nothing has been downloaded yet; only the claim keeps E2 away.
        let second = resolve_local_file(
            &store,
            &claims,
            dir.path(),
            "E2",
            "report.txt",
            UntrackedPolicy::Overwrite,
        )
        .await
        .unwrap();

        assert_eq!(first.path, dir.path().join("report.txt"));
        assert_eq!(second.path, dir.path().join("report (1).txt"));
        assert_ne!(first.path, second.path);
    }

    #[tokio::test]
    async fn re_resolving_the_same_entry_is_stable() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::new();
        let claims = ClaimSet::new();

        let first = resolve_local_file(
            &store,
            &claims,
            dir.path(),
            "E1",
            "report.txt",
            UntrackedPolicy::Overwrite,
        )
        .await
        .unwrap();
        let again = resolve_local_file(
            &store,
            &claims,
            dir.path(),
            "E1",
            "report.txt",
            UntrackedPolicy::Overwrite,
        )
        .await
        .unwrap();

        assert_eq!(first.path, again.path);
    }
}
