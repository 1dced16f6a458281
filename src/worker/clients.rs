use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("clients could not be claimed: {0}")]
    Claim(String),
    #[error("window for `{url}` could not be opened: {reason}")]
    OpenWindow { url: String, reason: String },
}

/// Browsing contexts controlled by the worker.
#[async_trait]
pub trait Clients: Send + Sync {
    /// Take control of already-open contexts. Returns how many were claimed.
    async fn claim(&self) -> Result<usize, ClientError>;

    /// Open or focus a context showing `url`.
    async fn open_window(&self, url: &str) -> Result<(), ClientError>;
}
