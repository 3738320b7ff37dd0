//! Archive request automation
//!
//! - Drives the ESO raw-data archive's multi-page query form in a browser
//! - Downloads the requested files concurrently with resume-by-size semantics
//!
//! # Service usage
//!
//! ```rust,ignore
//! use esoarchive_service::{ArchiveRequest, ArchiveService};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut service = ArchiveService::new();
//!
//!     let request = ArchiveRequest::new()
//!         .with_credentials("astro", "secret")
//!         .with_option("instrument", "VIRCAM")
//!         .with_option("nightobs", "20170101")
//!         .with_option("output", "./data/{nightobs}");
//!
//!     let outcome = service.call(request).await.unwrap();
//!     println!("Downloaded: {:?}", outcome.files);
//! }
//! ```
//!
//! # Session usage
//!
//! ```rust,ignore
//! use std::collections::BTreeMap;
//! use esoarchive_service::{ArchiveClient, ArchiveOptions, ArchiveSession};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut options = BTreeMap::new();
//!     options.insert("nightobs".to_string(), "20170101".to_string());
//!
//!     let options = ArchiveOptions::from_map(options).unwrap();
//!     let mut session = ArchiveSession::new(options).unwrap();
//!     let manifest = session.execute().await.unwrap();
//!     println!("Files: {:?}", manifest.map(|m| m.files.len()));
//! }
//! ```

pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod query;
pub mod service;
pub mod session;
pub mod traits;

// Re-export the primary types
pub use config::ArchiveOptions;
pub use download::Downloader;
pub use error::ArchiveError;
pub use manifest::Manifest;
pub use query::{QueryParams, Resolver};
pub use service::{ArchiveRequest, ArchiveService, RequestOutcome};
pub use session::{ArchiveSession, ARCHIVE_URL};
pub use traits::ArchiveClient;
