pub mod client;

use async_trait::async_trait;

/// The two calls the aging monitor makes against the gateway.
#[async_trait]
pub trait Gateway: std::fmt::Debug + Send + Sync {
    type Error: Send + Sync + std::fmt::Debug + std::error::Error + 'static;

    /// Fetches the gateway's own metrics exposition as text.
    async fn fetch_metrics(&self) -> Result<String, Self::Error>;

    /// Deletes the group addressed by `grouping_path` (`/job/<job>/...`).
    async fn delete_group(&self, grouping_path: &str) -> Result<(), Self::Error>;
}
