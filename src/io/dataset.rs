//! Dataset presence check and download

use anyhow::{Context, Result, bail};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use url::Url;

/// Whether `path` names an existing file. Directories count as absent.
///
/// Only a missing path is `Ok(false)`; any other metadata error is returned.
pub async fn file_exists(path: &Path) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(!metadata.is_dir()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to check {}", path.display())),
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Stream `url` to `path` without buffering the body in memory.
///
/// The body is written to `<path>.part` and renamed once complete, so an
/// interrupted download never leaves a truncated dataset behind.
pub async fn download_file(url: &Url, path: &Path) -> Result<u64> {
    let response = reqwest::get(url.clone())
        .await
        .with_context(|| format!("Failed to request {}", url))?;

    if !response.status().is_success() {
        bail!("Failed to download {}: bad status {}", url, response.status());
    }

    let part = partial_path(path);
    let mut file = tokio::fs::File::create(&part)
        .await
        .with_context(|| format!("Failed to create {}", part.display()))?;

    let mut written = 0u64;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.with_context(|| format!("Failed to read response body from {}", url))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&part, path)
        .await
        .with_context(|| format!("Failed to move download into {}", path.display()))?;

    tracing::info!(bytes = written, path = %path.display(), "download completed");
    Ok(written)
}

/// Make sure the dataset is present at `path`, downloading it from `url` if not
pub async fn ensure_dataset(url: &Url, path: &Path) -> Result<()> {
    if file_exists(path).await? {
        tracing::info!(path = %path.display(), "dataset already present");
        return Ok(());
    }

    tracing::info!(%url, "dataset missing, downloading");
    download_file(url, path)
        .await
        .context("Failed to download the dataset")?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port
    pub(crate) async fn serve_once(status: &'static str, body: &'static str) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4096];
            let _ = socket.read(&mut request).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        Url::parse(&format!("http://{}/majestic_million.csv", addr)).unwrap()
    }

    #[tokio::test]
    async fn test_file_exists() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("data.csv");

        assert!(!file_exists(&file).await.unwrap());
        tokio::fs::write(&file, "a,b\n").await.unwrap();
        assert!(file_exists(&file).await.unwrap());
    }

    #[tokio::test]
    async fn test_directory_is_not_a_file() {
        let dir = TempDir::new().unwrap();
        assert!(!file_exists(dir.path()).await.unwrap());
    }

    #[tokio::test]
    async fn test_file_exists_propagates_other_errors() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("data.csv");
        tokio::fs::write(&file, "a\n").await.unwrap();

        // A regular file used as a directory fails with ENOTDIR, not NotFound
        let nested = file.join("inner.csv");
        let err = file_exists(&nested).await.unwrap_err();
        assert!(err.to_string().contains("Failed to check"));
    }

    #[tokio::test]
    async fn test_ensure_dataset_stops_on_check_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("data.csv");
        tokio::fs::write(&file, "a\n1\n").await.unwrap();
        let url = serve_once("200 OK", "b\n2\n").await;

        assert!(ensure_dataset(&url, &file.join("inner.csv")).await.is_err());
        assert_eq!(tokio::fs::read_to_string(&file).await.unwrap(), "a\n1\n");
    }

    #[tokio::test]
    async fn test_download_writes_body() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        let url = serve_once("200 OK", "a,b\n1,2\n").await;

        let written = download_file(&url, &path).await.unwrap();

        assert_eq!(written, 8);
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "a,b\n1,2\n");
        assert!(!file_exists(&partial_path(&path)).await.unwrap());
    }

    #[tokio::test]
    async fn test_download_bad_status() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        let url = serve_once("404 Not Found", "missing").await;

        let err = download_file(&url, &path).await.unwrap_err();

        assert!(err.to_string().contains("404"));
        assert!(!file_exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_dataset_skips_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        tokio::fs::write(&path, "a\n1\n").await.unwrap();

        // Nothing listens here; a download attempt would fail
        let url = Url::parse("http://127.0.0.1:9/data.csv").unwrap();
        ensure_dataset(&url, &path).await.unwrap();

        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "a\n1\n");
    }
}
