use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::application::ArtifactStore;
use crate::domain::{DomainError, OutputLocation};

/// Artifact store backed by a set of `(bucket, key)` pairs.
pub struct InMemoryArtifactStore {
    objects: Arc<Mutex<HashSet<(String, String)>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub async fn put(&self, bucket: impl Into<String>, key: impl Into<String>) {
        let (bucket, key) = (bucket.into(), key.into());
        debug!("Stored artifact s3://{}/{}", bucket, key);
        self.objects.lock().await.insert((bucket, key));
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn exists(&self, location: &OutputLocation) -> Result<Option<String>, DomainError> {
        let key = location.artifact_key();
        let objects = self.objects.lock().await;
        Ok(objects
            .contains(&(location.bucket().to_string(), key.clone()))
            .then_some(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exists_resolves_output_key() {
        let store = InMemoryArtifactStore::new();
        let location = OutputLocation::new("videos", "reel/abc");
        assert_eq!(store.exists(&location).await.unwrap(), None);

        store.put("videos", "reel/abc/output.mp4").await;
        assert_eq!(
            store.exists(&location).await.unwrap().as_deref(),
            Some("reel/abc/output.mp4")
        );
        assert_eq!(
            store
                .exists(&OutputLocation::new("other", "reel/abc"))
                .await
                .unwrap(),
            None
        );
    }
}
