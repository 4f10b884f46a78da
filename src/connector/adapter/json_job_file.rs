use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::domain::{DomainError, GenerationJob};

/// Keeps an interrupted video job on disk so a later session can resume it.
pub struct JsonJobFile {
    path: PathBuf,
}

impl JsonJobFile {
    pub const FILE_NAME: &'static str = "active_job.json";

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(Self::FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self, job: &GenerationJob) -> Result<(), DomainError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(job)?;
        tokio::fs::write(&self.path, json).await?;
        info!("Saved job {} to {}", job.handle(), self.path.display());
        Ok(())
    }

    /// The saved job, if any. Jobs that already finished are ignored.
    pub async fn load(&self) -> Result<Option<GenerationJob>, DomainError> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(None);
        }
        let json = tokio::fs::read_to_string(&self.path).await?;
        let job: GenerationJob = serde_json::from_str(&json)?;
        Ok(job.is_active().then_some(job))
    }

    pub async fn remove(&self) -> Result<(), DomainError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("Removed {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
