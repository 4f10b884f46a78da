use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::application::ArtifactStore;
use crate::domain::{DomainError, OutputLocation};

pub const ARTIFACT_STORE_DIR_ENV: &str = "ARTIFACT_STORE_DIR";

/// Artifact store over a mounted directory laid out as `{root}/{bucket}/{key}`.
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, location: &OutputLocation, key: &str) -> PathBuf {
        key.split('/')
            .fold(self.root.join(location.bucket()), |path, part| path.join(part))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn exists(&self, location: &OutputLocation) -> Result<Option<String>, DomainError> {
        let key = location.artifact_key();
        let path = self.path_for(location, &key);
        debug!("Checking {}", path.display());
        Ok(tokio::fs::try_exists(&path).await?.then_some(key))
    }
}
