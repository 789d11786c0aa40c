use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use drive_core::{DriveClient, DriveError, RemoteEntry};
use filetime::FileTime;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

use crate::config::PullConfig;

use super::metadata::{MetadataStore, Sideband};
use super::names;
use super::pool::WorkerPool;
use super::reconcile::{self, ClaimSet, Resolution};
use super::transfer::{self, TransferError};
use super::verify;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("api error: {0}")]
    Api(#[from] DriveError),
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Outcome counters for one `synchronize` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub folders_listed: u64,
    pub downloads: u64,
    /// Local files adopted after their hash matched the remote digest.
    pub adopted: u64,
    /// Fast-path skips: hash, size, and mtime all matched.
    pub up_to_date: u64,
    pub skipped_no_content: u64,
    pub conflicts: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
struct SyncStats {
    folders_listed: AtomicU64,
    downloads: AtomicU64,
    adopted: AtomicU64,
    up_to_date: AtomicU64,
    skipped_no_content: AtomicU64,
    conflicts: AtomicU64,
    failures: AtomicU64,
}

impl SyncStats {
    fn reset(&self) {
        for counter in [
            &self.folders_listed,
            &self.downloads,
            &self.adopted,
            &self.up_to_date,
            &self.skipped_no_content,
            &self.conflicts,
            &self.failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn report(&self) -> SyncReport {
        SyncReport {
            folders_listed: self.folders_listed.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            adopted: self.adopted.load(Ordering::Relaxed),
            up_to_date: self.up_to_date.load(Ordering::Relaxed),
            skipped_no_content: self.skipped_no_content.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Pull-only synchronization engine: walks the remote tree and reconciles
/// every entry against the local filesystem, downloading only what is missing
/// or stale. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct PullEngine {
    inner: Arc<Inner>,
}

struct Inner {
    client: DriveClient,
    store: Arc<dyn MetadataStore>,
    config: PullConfig,
    claims: ClaimSet,
    stats: SyncStats,
    pools: Pools,
}

struct Pools {
    list: WorkerPool,
    verify: WorkerPool,
    download: WorkerPool,
}

impl PullEngine {
    /// Worker tasks are spawned immediately, so the engine must be built
    /// inside a Tokio runtime.
    pub fn new(client: DriveClient, store: Arc<dyn MetadataStore>, config: PullConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                store,
                config,
                claims: ClaimSet::new(),
                stats: SyncStats::default(),
                pools: Pools {
                    list: WorkerPool::new(config.list_workers),
                    verify: WorkerPool::new(config.verify_workers),
                    download: WorkerPool::new(config.download_workers),
                },
            }),
        }
    }

    /// Mirrors the remote tree rooted at `remote_root_id` into `local_root`
    /// and returns once every dispatched task has finished. Per-task errors
    /// are logged and counted, never propagated; only a failure to create the
    /// local root itself is fatal.
    pub async fn synchronize(
        &self,
        remote_root_id: &str,
        local_root: &Path,
    ) -> Result<SyncReport, EngineError> {
        self.inner.stats.reset();
        self.inner.claims.clear();
        tokio::fs::create_dir_all(local_root).await?;

        spawn_walk(
            &self.inner,
            remote_root_id.to_string(),
            local_root.to_path_buf(),
        );

        // Only list tasks submit list tasks, and only list/verify tasks
        // submit downloads, so draining in dependency order observes overall
        // completion.
        self.inner.pools.list.drain().await;
        self.inner.pools.verify.drain().await;
        self.inner.pools.download.drain().await;

        Ok(self.inner.stats.report())
    }
}

fn spawn_walk(engine: &Arc<Inner>, folder_id: String, dir: PathBuf) {
    let task_engine = Arc::clone(engine);
    engine.pools.list.submit(async move {
        if let Err(err) = walk_folder(&task_engine, &folder_id, &dir).await {
            // Aborts only this folder's subtree; queued siblings are
            // unaffected and there is no retry.
            warn!(folder = %folder_id, error = %err, "folder listing failed, skipping subtree");
            task_engine.stats.failures.fetch_add(1, Ordering::Relaxed);
        }
    });
}

async fn walk_folder(engine: &Arc<Inner>, folder_id: &str, dir: &Path) -> Result<(), EngineError> {
    let mut page_token: Option<String> = None;
    loop {
        let page = engine
            .client
            .list_children(folder_id, page_token.as_deref())
            .await?;
        for entry in page.items {
            let Some(name) = names::sanitize(&entry.name) else {
                debug!(id = %entry.id, "remote entry has no usable name, skipping");
                continue;
            };
            if entry.is_folder() {
                enter_folder(engine, entry, dir, &name).await?;
            } else {
                process_file(engine, entry, dir, &name).await?;
            }
        }
        page_token = page.next_page_token;
        if page_token.as_deref().is_none_or(str::is_empty) {
            break;
        }
    }
    engine.stats.folders_listed.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

async fn enter_folder(
    engine: &Arc<Inner>,
    entry: RemoteEntry,
    dir: &Path,
    name: &str,
) -> Result<(), EngineError> {
    let local_path = dir.join(name);
    match tokio::fs::metadata(&local_path).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            // Never deletes or renames the local occupant.
            warn!(path = %local_path.display(), "conflict: local entry is not a directory, skipping subtree");
            engine.stats.conflicts.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        Err(_) => tokio::fs::create_dir_all(&local_path).await?,
    }
    spawn_walk(engine, entry.id, local_path);
    Ok(())
}

async fn process_file(
    engine: &Arc<Inner>,
    entry: RemoteEntry,
    dir: &Path,
    name: &str,
) -> Result<(), EngineError> {
    if entry.size.is_none() {
        // Remote-native documents expose no byte content.
        info!(name = %entry.name, "remote file has no content, skipping");
        engine
            .stats
            .skipped_no_content
            .fetch_add(1, Ordering::Relaxed);
        return Ok(());
    }

    let resolution = reconcile::resolve_local_file(
        engine.store.as_ref(),
        &engine.claims,
        dir,
        &entry.id,
        name,
        engine.config.untracked_policy,
    )
    .await?;

    let local = if resolution.exists {
        local_file_info(&resolution.path).await
    } else {
        None
    };

    match plan_file_action(&engine.config, &entry, &resolution, local.as_ref()) {
        FileAction::SkipUpToDate => {
            debug!(path = %resolution.path.display(), "hash, size, and mtime match, skipping download");
            engine.stats.up_to_date.fetch_add(1, Ordering::Relaxed);
        }
        FileAction::Verify => spawn_verify(engine, entry, resolution.path),
        FileAction::Download => spawn_download(engine, entry, resolution.path),
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileAction {
    SkipUpToDate,
    Verify,
    Download,
}

fn plan_file_action(
    config: &PullConfig,
    entry: &RemoteEntry,
    resolution: &Resolution,
    local: Option<&LocalFileInfo>,
) -> FileAction {
    // An existing file whose content hash is unknown may already be correct;
    // hash it instead of re-downloading when verification is enabled.
    if config.verify_hashes
        && resolution.exists
        && resolution
            .metadata
            .as_ref()
            .is_none_or(|record| record.content_hash.is_none())
    {
        return FileAction::Verify;
    }

    if let (Some(record), Some(local)) = (&resolution.metadata, local)
        && let (Some(local_hash), Some(remote_hash)) = (&record.content_hash, &entry.md5)
        && local_hash.eq_ignore_ascii_case(remote_hash)
        && Some(local.size) == entry.size
    {
        if remote_mtime(entry) == Some(local.mtime) {
            return FileAction::SkipUpToDate;
        }
        // The mtime moved but the content may not have (externally touched
        // file); re-verify rather than re-download.
        if config.verify_hashes {
            return FileAction::Verify;
        }
    }

    FileAction::Download
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LocalFileInfo {
    size: u64,
    mtime: FileTime,
}

async fn local_file_info(path: &Path) -> Option<LocalFileInfo> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    Some(LocalFileInfo {
        size: meta.len(),
        mtime: FileTime::from_last_modification_time(&meta),
    })
}

fn remote_mtime(entry: &RemoteEntry) -> Option<FileTime> {
    let raw = entry.modified.as_deref()?;
    let parsed = OffsetDateTime::parse(raw, &Rfc3339).ok()?;
    Some(FileTime::from_unix_time(
        parsed.unix_timestamp(),
        parsed.nanosecond(),
    ))
}

fn spawn_verify(engine: &Arc<Inner>, entry: RemoteEntry, path: PathBuf) {
    let task_engine = Arc::clone(engine);
    engine.pools.verify.submit(async move {
        verify_local_file(&task_engine, entry, path).await;
    });
}

async fn verify_local_file(engine: &Arc<Inner>, entry: RemoteEntry, path: PathBuf) {
    info!(path = %path.display(), "computing local hash");
    match verify::file_md5(&path).await {
        Ok(digest)
            if entry
                .md5
                .as_deref()
                .is_some_and(|remote| digest.eq_ignore_ascii_case(remote)) =>
        {
            // The file already happens to be correct; stamp it instead of
            // transferring it again.
            info!(path = %path.display(), "hash matches, adopting local file");
            match record_synced(engine, &entry, &path) {
                Ok(()) => {
                    engine.stats.adopted.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to record sideband metadata");
                    engine.stats.failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Ok(_) => spawn_download(engine, entry, path),
        Err(err) => {
            // Unverifiable content is never silently accepted.
            warn!(path = %path.display(), error = %err, "local hash failed, falling back to download");
            spawn_download(engine, entry, path);
        }
    }
}

fn spawn_download(engine: &Arc<Inner>, entry: RemoteEntry, path: PathBuf) {
    let task_engine = Arc::clone(engine);
    engine.pools.download.submit(async move {
        if let Err(err) = download_file(&task_engine, &entry, &path).await {
            warn!(path = %path.display(), error = %err, "download failed");
            task_engine.stats.failures.fetch_add(1, Ordering::Relaxed);
        }
    });
}

async fn download_file(engine: &Inner, entry: &RemoteEntry, path: &Path) -> Result<(), EngineError> {
    info!(path = %path.display(), "downloading");
    transfer::download_to_path(&engine.client, &entry.id, path).await?;
    // Metadata is written only after the full content landed; a failed
    // transfer leaves the path untracked and safe to retry on the next run.
    record_synced(engine, entry, path)?;
    engine.stats.downloads.fetch_add(1, Ordering::Relaxed);
    info!(path = %path.display(), "download complete");
    Ok(())
}

fn record_synced(engine: &Inner, entry: &RemoteEntry, path: &Path) -> io::Result<()> {
    engine.store.write(
        path,
        &Sideband {
            remote_id: entry.id.clone(),
            content_hash: entry.md5.clone(),
        },
    )?;
    if let Some(mtime) = remote_mtime(entry) {
        filetime::set_file_mtime(path, mtime)?;
    }
    Ok(())
}
