use std::env;

/// What to do when a candidate local file exists but carries no sideband
/// metadata (an untracked file).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UntrackedPolicy {
    /// Claim the path and overwrite the untracked file in place.
    Overwrite,
    /// Treat the path as occupied and move on to the next candidate name.
    KeepBoth,
}

#[derive(Debug, Clone, Copy)]
pub struct PullConfig {
    /// Workers listing remote folders. The remote API serializes pagination
    /// per folder, so one worker is usually enough.
    pub list_workers: usize,
    pub verify_workers: usize,
    pub download_workers: usize,
    /// When set, local files without a known content hash are hashed and
    /// compared against the remote digest instead of being re-downloaded.
    pub verify_hashes: bool,
    pub untracked_policy: UntrackedPolicy,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            list_workers: 1,
            verify_workers: 2,
            download_workers: 4,
            verify_hashes: true,
            untracked_policy: UntrackedPolicy::Overwrite,
        }
    }
}

impl PullConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            list_workers: read_limit("DRIVEPULL_LIST_WORKERS", defaults.list_workers),
            verify_workers: read_limit("DRIVEPULL_VERIFY_WORKERS", defaults.verify_workers),
            download_workers: read_limit("DRIVEPULL_DOWNLOAD_WORKERS", defaults.download_workers),
            verify_hashes: read_flag("DRIVEPULL_VERIFY_HASHES", defaults.verify_hashes),
            untracked_policy: read_policy("DRIVEPULL_UNTRACKED_POLICY", defaults.untracked_policy),
        }
    }
}

fn read_limit(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn read_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(value) => matches!(value.as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn read_policy(name: &str, default: UntrackedPolicy) -> UntrackedPolicy {
    match env::var(name).as_deref() {
        Ok("overwrite") => UntrackedPolicy::Overwrite,
        Ok("keep-both") => UntrackedPolicy::KeepBoth,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_favor_download_concurrency() {
        let config = PullConfig::default();
        assert_eq!(config.list_workers, 1);
        assert_eq!(config.verify_workers, 2);
        assert_eq!(config.download_workers, 4);
        assert!(config.verify_hashes);
        assert_eq!(config.untracked_policy, UntrackedPolicy::Overwrite);
    }
}
