use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::Service;
use tracing::info;

use crate::config::ArchiveOptions;
use crate::download::Downloader;
use crate::error::ArchiveError;
use crate::session::ArchiveSession;
use crate::traits::ArchiveClient;

/// One archive request: the raw option mapping for a session.
#[derive(Debug, Clone, Default)]
pub struct ArchiveRequest {
    options: BTreeMap<String, String>,
}

impl ArchiveRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a request from an already-assembled option mapping.
    pub fn from_options(options: BTreeMap<String, String>) -> Self {
        Self { options }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_credentials(
        self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.with_option("username", username)
            .with_option("password", password)
    }

    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }
}

/// Outcome of one request-and-download cycle.
#[derive(Debug)]
pub struct RequestOutcome {
    /// Manifest file URLs; empty when the search matched nothing or the
    /// login was rejected.
    pub files: Vec<String>,
    /// Resolved output directory the files were written to.
    pub output: PathBuf,
}

/// `tower::Service` running the whole pipeline for one request:
/// session workflow first, then the download pool.
#[derive(Debug, Clone, Default)]
pub struct ArchiveService {
    // room for future extension (rate limiting, request queueing)
}

impl ArchiveService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Service<ArchiveRequest> for ArchiveService {
    type Response = RequestOutcome;
    type Error = ArchiveError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ArchiveRequest) -> Self::Future {
        Box::pin(async move {
            let options = ArchiveOptions::from_map(req.options)?;
            let mut session = ArchiveSession::new(options.clone())?;

            let manifest = session.execute().await?;
            let output = session.output();

            let files = match manifest {
                Some(manifest) => {
                    let downloader = Downloader::new(&options, output.clone());
                    downloader.download(&manifest.files).await?;
                    manifest.files
                }
                // no manifest: the download phase is skipped entirely
                None => Vec::new(),
            };

            info!("Request finished: {} files in {}", files.len(), output.display());
            Ok(RequestOutcome { files, output })
        })
    }
}
