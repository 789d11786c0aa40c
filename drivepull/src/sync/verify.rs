use std::io;
use std::path::Path;

use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 16 * 1024;

/// Streams the file through an MD5 accumulator in fixed-size chunks so
/// arbitrarily large files stay within bounded memory. Returns the lowercase
/// hex digest.
pub async fn file_md5(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut context = md5::Context::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
    }
    Ok(format!("{:x}", context.compute()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn hashes_file_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello").unwrap();

        let digest = file_md5(&path).await.unwrap();
        assert_eq!(digest, "5d41402abc4b2a76b9719d911017c592");
    }

    #[tokio::test]
    async fn hashes_content_larger_than_one_chunk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let content = vec![0xabu8; CHUNK_SIZE * 3 + 17];
        std::fs::write(&path, &content).unwrap();

        let digest = file_md5(&path).await.unwrap();
        assert_eq!(digest, format!("{:x}", md5::compute(&content)));
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(file_md5(&dir.path().join("absent")).await.is_err());
    }
}
