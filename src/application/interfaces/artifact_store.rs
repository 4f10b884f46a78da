use async_trait::async_trait;

use crate::domain::{DomainError, OutputLocation};

/// External storage where asynchronous jobs write their output.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Resolved key of the artifact under `location`, or `None` while it has
    /// not been written yet.
    async fn exists(&self, location: &OutputLocation) -> Result<Option<String>, DomainError>;
}
