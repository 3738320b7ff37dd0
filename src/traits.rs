use async_trait::async_trait;

use crate::error::ArchiveError;
use crate::manifest::Manifest;

#[async_trait]
pub trait ArchiveClient: Send + Sync {
    /// Launch the browser and open the archive query form.
    async fn initialize(&mut self) -> Result<(), ArchiveError>;

    /// Apply the staged query parameters to the form, in order.
    async fn apply_query(&mut self) -> Result<(), ArchiveError>;

    /// Run the search-and-request workflow.
    ///
    /// `Ok(None)` means the search matched nothing or the login was rejected;
    /// both are handled conditions, not failures.
    async fn request(&mut self) -> Result<Option<Manifest>, ArchiveError>;

    /// Release the browser session. Safe to call more than once.
    async fn close(&mut self) -> Result<(), ArchiveError>;

    /// Full workflow (initialize → apply_query → request → close).
    async fn execute(&mut self) -> Result<Option<Manifest>, ArchiveError> {
        self.initialize().await?;
        self.apply_query().await?;
        let manifest = self.request().await?;
        self.close().await?;
        Ok(manifest)
    }
}
