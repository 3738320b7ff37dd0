//! Concurrent file download stage.
//!
//! Consumes the manifest's URL list after the session phase has finished.
//! Each worker writes to a distinct destination file, so the only shared
//! state is the credential pair and the output directory.

use std::path::PathBuf;

use futures::stream::{self, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::config::ArchiveOptions;
use crate::error::ArchiveError;

pub struct Downloader {
    client: reqwest::Client,
    username: String,
    password: String,
    output: PathBuf,
    max_workers: usize,
}

impl Downloader {
    /// Downloads go to `output`; credentials and the worker bound come from
    /// the option mapping (`max_workers`, default 1).
    pub fn new(options: &ArchiveOptions, output: PathBuf) -> Self {
        Self {
            client: reqwest::Client::new(),
            username: options.username().to_string(),
            password: options.password().to_string(),
            output,
            max_workers: options.max_workers(),
        }
    }

    /// Fetch every URL through the worker pool, in no particular completion
    /// order.
    ///
    /// A failed transfer is isolated: it is logged and does not cancel the
    /// other workers. Any failure surfaces afterwards as one aggregate error.
    pub async fn download(&self, files: &[String]) -> Result<(), ArchiveError> {
        info!("Downloading {} files using {} workers", files.len(), self.max_workers);

        let results: Vec<(String, Result<Saved, ArchiveError>)> = stream::iter(files.iter().cloned())
            .map(|url| async move {
                let result = self.fetch_file(&url).await;
                (url, result)
            })
            .buffer_unordered(self.max_workers)
            .collect()
            .await;

        let mut failed = 0;
        for (url, result) in &results {
            match result {
                Ok(Saved::Written) => info!("Saved {}", basename(url)),
                Ok(Saved::AlreadyComplete) => debug!("{} already complete", basename(url)),
                Err(err) => {
                    failed += 1;
                    error!("Failed to download {url}: {err}");
                }
            }
        }

        if failed > 0 {
            return Err(ArchiveError::Download(format!(
                "{failed} of {} downloads failed",
                results.len()
            )));
        }
        Ok(())
    }

    /// Fetch one URL into the output directory.
    ///
    /// An existing destination whose size equals the remote `Content-Length`
    /// is kept as-is; this is a size check only, not an integrity check. Any
    /// other existing file is overwritten from the start.
    async fn fetch_file(&self, url: &str) -> Result<Saved, ArchiveError> {
        let filename = basename(url);
        let dest = self.output.join(filename);

        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| ArchiveError::Download(e.to_string()))?
            .error_for_status()
            .map_err(|e| ArchiveError::Download(e.to_string()))?;

        if let Ok(meta) = std::fs::metadata(&dest) {
            if Some(meta.len()) == response.content_length() {
                return Ok(Saved::AlreadyComplete);
            }
        }

        let mut file = tokio::fs::File::create(&dest).await?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| ArchiveError::Download(e.to_string()))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(Saved::Written)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Saved {
    Written,
    AlreadyComplete,
}

/// Final path segment of a URL.
fn basename(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::Path;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn downloader(output: &Path, workers: &str) -> Downloader {
        let mut map = BTreeMap::new();
        map.insert("username".to_string(), "astro".to_string());
        map.insert("password".to_string(), "secret".to_string());
        map.insert("max_workers".to_string(), workers.to_string());
        let options = ArchiveOptions::from_map(map).unwrap();
        Downloader::new(&options, output.to_path_buf())
    }

    #[test]
    fn basename_of_url() {
        assert_eq!(
            basename("https://dataportal.eso.org/SAF/VCAM.2017.fits.fz"),
            "VCAM.2017.fits.fz"
        );
        assert_eq!(basename("plain"), "plain");
    }

    #[tokio::test]
    async fn downloads_to_url_basename() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/SAF/frame.fits.fz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fitsdata".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let files = vec![format!("{}/SAF/frame.fits.fz", server.uri())];
        downloader(dir.path(), "2").download(&files).await.unwrap();

        let written = std::fs::read(dir.path().join("frame.fits.fz")).unwrap();
        assert_eq!(written, b"fitsdata");
    }

    #[tokio::test]
    async fn equal_size_destination_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/frame.fits.fz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"remote!!".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        // same length as the remote body, different content
        std::fs::write(dir.path().join("frame.fits.fz"), b"local!!!").unwrap();

        let files = vec![format!("{}/frame.fits.fz", server.uri())];
        downloader(dir.path(), "1").download(&files).await.unwrap();

        let kept = std::fs::read(dir.path().join("frame.fits.fz")).unwrap();
        assert_eq!(kept, b"local!!!");
    }

    #[tokio::test]
    async fn size_mismatch_is_rewritten() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/frame.fits.fz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"full remote body".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frame.fits.fz"), b"partial").unwrap();

        let files = vec![format!("{}/frame.fits.fz", server.uri())];
        downloader(dir.path(), "1").download(&files).await.unwrap();

        let rewritten = std::fs::read(dir.path().join("frame.fits.fz")).unwrap();
        assert_eq!(rewritten, b"full remote body");
    }

    #[tokio::test]
    async fn failures_are_isolated_and_aggregated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok.fits.fz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/denied.fits.fz"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            format!("{}/denied.fits.fz", server.uri()),
            format!("{}/ok.fits.fz", server.uri()),
        ];
        let err = downloader(dir.path(), "2").download(&files).await.unwrap_err();

        assert!(err.to_string().contains("1 of 2 downloads failed"));
        // the sibling transfer still completed
        assert!(dir.path().join("ok.fits.fz").exists());
    }
}
