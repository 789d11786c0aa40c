use std::io;
use std::path::Path;

use drive_core::{DriveClient, DriveError};
use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("api error: {0}")]
    Api(#[from] DriveError),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Streams the remote file's content into `target`, overwriting whatever is
/// there. On any failure the output handle is dropped and the error returned;
/// the caller writes no sideband metadata, so a half-written file reads as
/// untracked on the next run and gets overwritten again.
pub async fn download_to_path(
    client: &DriveClient,
    file_id: &str,
    target: &Path,
) -> Result<(), TransferError> {
    let response = client.fetch_content(file_id).await?;
    let mut file = tokio::fs::File::create(target).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}
