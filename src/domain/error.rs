use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("Transient polling error: {0}")]
    TransientPollingError(String),

    #[error("Job failed: {0}")]
    JobTerminalFailure(String),

    #[error("A generation job is already in progress: {0}")]
    JobInProgressError(String),

    #[error("No generation job is active")]
    NoActiveJob,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Gave up polling after {0} attempts")]
    PollLimitExceeded(u32),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::ConfigurationError(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::BackendError(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientPollingError(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::ConfigurationError(_))
    }

    pub fn is_backend_error(&self) -> bool {
        matches!(self, Self::BackendError(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientPollingError(_))
    }

    /// A remote call failed, whether or not retrying could help.
    pub fn is_service_failure(&self) -> bool {
        matches!(self, Self::BackendError(_) | Self::TransientPollingError(_))
    }

    /// The message without the variant prefix, for errors that carry one.
    pub fn detail(&self) -> String {
        match self {
            Self::BackendError(msg) | Self::TransientPollingError(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_job_in_progress(&self) -> bool {
        matches!(self, Self::JobInProgressError(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
