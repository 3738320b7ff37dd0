use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("browser initialization error: {0}")]
    BrowserInit(String),

    #[error("navigation error: {0}")]
    Navigation(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("javascript error: {0}")]
    JavaScript(String),

    #[error("login unsuccessful for {username}")]
    LoginFailed { username: String },

    #[error("invalid configuration for '{key}': {reason}")]
    Config { key: String, reason: String },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("download error: {0}")]
    Download(String),

    #[error("file operation error: {0}")]
    FileIO(#[from] std::io::Error),
}
