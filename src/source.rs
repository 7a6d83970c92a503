//! Upload sources
//!
//! A source is either a local file or a URL downloaded into a temporary
//! file first. Temporary files are removed when the [`SourceFile`] drops.

use crate::config::SourceSpec;
use crate::error::{Error, Result};
use crate::upload::{ProgressSink, ProgressState};
use percent_encoding::percent_decode_str;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Name used when a URL has no usable last path segment
pub const FALLBACK_FILE_NAME: &str = "downloaded_file";

/// A readable file plus the name it is sent under
#[derive(Debug)]
pub struct SourceFile {
    path: PathBuf,
    name: String,
    size: u64,
    // Deleted on drop
    temp: Option<NamedTempFile>,
}

impl SourceFile {
    /// Resolve a source, downloading it if it is a URL
    pub async fn resolve(
        spec: &SourceSpec,
        sink: Arc<dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        match spec {
            SourceSpec::File(path) => Self::local(path),
            SourceSpec::Url(url) => Self::download(url, sink, cancel).await,
        }
    }

    /// Use an existing local file
    pub fn local<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)
            .map_err(|e| Error::SourceRead(format!("failed to get file info for {:?}: {}", path, e)))?;
        if !metadata.is_file() {
            return Err(Error::SourceRead(format!("{:?} is not a regular file", path)));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| Error::SourceRead(format!("{:?} has no usable file name", path)))?;

        Ok(SourceFile {
            path: path.to_path_buf(),
            name,
            size: metadata.len(),
            temp: None,
        })
    }

    /// Download `url` into a temporary file
    pub async fn download(
        url: &str,
        sink: Arc<dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tgsend/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Download(e.to_string()))?;
        Self::download_into(&client, url, &std::env::temp_dir(), sink, cancel).await
    }

    /// Download `url` with `client` into a temporary file created in `dir`
    ///
    /// The temporary file is removed on every failure path.
    pub async fn download_into(
        client: &reqwest::Client,
        url: &str,
        dir: &Path,
        sink: Arc<dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let url =
            Url::parse(url).map_err(|e| Error::Config(format!("invalid URL '{}': {}", url, e)))?;
        info!("Downloading file from {}", url);

        let mut response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            sent = client.get(url.clone()).send() => {
                sent.map_err(|e| Error::Download(e.to_string()))?
            }
        };
        if !response.status().is_success() {
            return Err(Error::Download(format!("bad status: {}", response.status())));
        }

        // Redirects may change the final path, so name after the response URL
        let name = file_name_from_url(response.url());
        let temp = tempfile::Builder::new().prefix("tgsend-").tempfile_in(dir)?;
        let mut file = tokio::fs::File::from_std(temp.reopen()?);

        let expected = response.content_length();
        let mut progress = ProgressState::new(expected.unwrap_or(0));
        sink.start(expected);

        let result: Result<()> = async {
            loop {
                let chunk = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    chunk = response.chunk() => {
                        chunk.map_err(|e| Error::Download(e.to_string()))?
                    }
                };
                let Some(chunk) = chunk else { break };
                file.write_all(&chunk).await?;
                progress.record(chunk.len() as u64);
                sink.update(&progress.snapshot());
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        sink.finish(&progress.snapshot(), result.is_ok());
        result?;

        let size = progress.transferred();
        debug!("Downloaded {} bytes to {:?}", size, temp.path());
        Ok(SourceFile {
            path: temp.path().to_path_buf(),
            name,
            size,
            temp: Some(temp),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name used for classification and display
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether the file is a temporary download
    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }

    /// Open for streaming
    pub async fn open(&self) -> Result<tokio::fs::File> {
        tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| Error::SourceRead(format!("failed to open {:?}: {}", self.path, e)))
    }
}

/// Last non-empty path segment of a URL, percent-decoded, or [`FALLBACK_FILE_NAME`]
pub fn file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
        .and_then(|decoded| {
            // An encoded separator must not smuggle a directory into the name
            decoded
                .rsplit(['/', '\\'])
                .next()
                .map(str::trim)
                .filter(|s| !s.is_empty() && *s != "." && *s != "..")
                .map(str::to_string)
        })
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::{NullSink, ProgressSnapshot};
    use std::io::Write;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_file_name_from_url() {
        let url = Url::parse("https://example.com/media/clip.mp4?sig=abc").unwrap();
        assert_eq!(file_name_from_url(&url), "clip.mp4");
    }

    #[test]
    fn test_file_name_is_percent_decoded() {
        let url = Url::parse("https://example.com/media/my%20clip.mp4").unwrap();
        assert_eq!(file_name_from_url(&url), "my clip.mp4");

        let nested = Url::parse("https://example.com/a/..%2Fetc%2Fpasswd").unwrap();
        assert_eq!(file_name_from_url(&nested), "passwd");
    }

    #[test]
    fn test_file_name_fallback() {
        let root = Url::parse("https://example.com/").unwrap();
        assert_eq!(file_name_from_url(&root), FALLBACK_FILE_NAME);

        let trailing = Url::parse("https://example.com/files/").unwrap();
        assert_eq!(file_name_from_url(&trailing), FALLBACK_FILE_NAME);
    }

    #[test]
    fn test_local_source() {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(&[7u8; 1500]).unwrap();

        let source = SourceFile::local(file.path()).unwrap();
        assert_eq!(source.size(), 1500);
        assert!(source.name().ends_with(".pdf"));
        assert!(!source.is_temporary());
    }

    #[test]
    fn test_local_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = SourceFile::local(dir.path().join("missing.bin")).unwrap_err();
        assert!(matches!(err, Error::SourceRead(_)));
    }

    #[test]
    fn test_local_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SourceFile::local(dir.path()).is_err());
    }

    #[tokio::test]
    async fn test_invalid_url_is_config_error() {
        let err = SourceFile::download(
            "not a url",
            Arc::new(crate::upload::NullSink),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_cancelled_download() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = SourceFile::download(
            "http://127.0.0.1:9/file.bin",
            Arc::new(crate::upload::NullSink),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    //===============
    // HTTP downloads
    //===============

    /// Serve `response` to the first connection, optionally keeping it open
    async fn serve_once(response: &'static [u8], hold_open: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(response).await;
            let _ = socket.flush().await;
            if hold_open {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
        });
        format!("http://{}", addr)
    }

    fn local_client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    fn is_empty_dir(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    /// Cancels the token on the first progress update
    struct CancelOnFirstChunk(CancellationToken);

    impl ProgressSink for CancelOnFirstChunk {
        fn update(&self, _snapshot: &ProgressSnapshot) {
            self.0.cancel();
        }
    }

    #[tokio::test]
    async fn test_download_streams_into_named_temp_file() {
        let base = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\nConnection: close\r\n\r\nhello world",
            false,
        )
        .await;
        let dir = tempfile::tempdir().unwrap();

        let source = SourceFile::download_into(
            &local_client(),
            &format!("{}/files/my%20clip.mp4", base),
            dir.path(),
            Arc::new(NullSink),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(source.name(), "my clip.mp4");
        assert_eq!(source.size(), 11);
        assert!(source.is_temporary());
        assert_eq!(std::fs::read(source.path()).unwrap(), b"hello world");

        let path = source.path().to_path_buf();
        drop(source);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_download_bad_status() {
        let base = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            false,
        )
        .await;
        let dir = tempfile::tempdir().unwrap();

        let err = SourceFile::download_into(
            &local_client(),
            &format!("{}/missing.bin", base),
            dir.path(),
            Arc::new(NullSink),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Download(_)));
        assert!(is_empty_dir(dir.path()));
    }

    #[tokio::test]
    async fn test_truncated_body_removes_temp_file() {
        let base = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\nConnection: close\r\n\r\nonly ten b",
            false,
        )
        .await;
        let dir = tempfile::tempdir().unwrap();

        let err = SourceFile::download_into(
            &local_client(),
            &format!("{}/big.bin", base),
            dir.path(),
            Arc::new(NullSink),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Download(_)));
        assert!(is_empty_dir(dir.path()));
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_removes_temp_file() {
        let base = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\nfirst part",
            true,
        )
        .await;
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();

        let err = SourceFile::download_into(
            &local_client(),
            &format!("{}/slow.bin", base),
            dir.path(),
            Arc::new(CancelOnFirstChunk(cancel.clone())),
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert!(is_empty_dir(dir.path()));
    }
}
