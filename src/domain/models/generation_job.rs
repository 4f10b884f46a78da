use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Opaque job identifier issued by the backend (an invocation ARN).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trailing segment of the handle; the backend writes output under it.
    pub fn invocation_id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// File name the video backend writes under a job's prefix.
pub const ARTIFACT_FILE_NAME: &str = "output.mp4";

/// Bucket plus key prefix where a generated artifact is expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLocation {
    bucket: String,
    prefix: String,
}

impl OutputLocation {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    /// Parse `s3://bucket/optional/prefix` (the scheme is optional).
    pub fn parse(uri: &str) -> Result<Self, DomainError> {
        let trimmed = uri.trim();
        let without_scheme = trimmed.strip_prefix("s3://").unwrap_or(trimmed);
        let (bucket, prefix) = without_scheme
            .split_once('/')
            .unwrap_or((without_scheme, ""));

        if bucket.is_empty() {
            return Err(DomainError::configuration(
                "an output location (s3://bucket[/prefix]) is required for video generation",
            ));
        }

        Ok(Self::new(bucket, prefix))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn uri(&self) -> String {
        if self.prefix.is_empty() {
            format!("s3://{}", self.bucket)
        } else {
            format!("s3://{}/{}", self.bucket, self.prefix)
        }
    }

    /// Key of the finished video under this location.
    pub fn artifact_key(&self) -> String {
        if self.prefix.is_empty() {
            ARTIFACT_FILE_NAME.to_string()
        } else {
            format!("{}/{}", self.prefix, ARTIFACT_FILE_NAME)
        }
    }

    /// The location the backend will write to for a given job.
    pub fn for_job(&self, handle: &JobHandle) -> Self {
        let prefix = if self.prefix.is_empty() {
            handle.invocation_id().to_string()
        } else {
            format!("{}/{}", self.prefix, handle.invocation_id())
        };
        Self::new(self.bucket.clone(), prefix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Submitted,
    Polling,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Submitted => "submitted",
            JobStatus::Polling => "polling",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// State of the single in-flight video request of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    handle: JobHandle,
    output: OutputLocation,
    status: JobStatus,
    last_error: Option<String>,
    prompt: String,
    /// Set once the backend reported success; from then on only storage is polled.
    #[serde(default)]
    backend_succeeded: bool,
    submitted_at: i64,
}

impl GenerationJob {
    pub fn new(handle: JobHandle, output: OutputLocation, prompt: impl Into<String>) -> Self {
        Self {
            handle,
            output,
            status: JobStatus::Submitted,
            last_error: None,
            prompt: prompt.into(),
            backend_succeeded: false,
            submitted_at: current_timestamp(),
        }
    }

    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    pub fn output(&self) -> &OutputLocation {
        &self.output
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn backend_succeeded(&self) -> bool {
        self.backend_succeeded
    }

    pub fn submitted_at(&self) -> i64 {
        self.submitted_at
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn begin_polling(&mut self) {
        if self.status == JobStatus::Submitted {
            self.status = JobStatus::Polling;
        }
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    pub fn mark_backend_succeeded(&mut self) {
        self.backend_succeeded = true;
    }

    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.last_error = Some(message.into());
    }
}

/// Job state as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteJobState {
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteJobStatus {
    pub state: RemoteJobState,
    /// Status string exactly as the backend reported it.
    pub raw_status: String,
    pub failure_message: Option<String>,
}

impl RemoteJobStatus {
    pub fn from_backend(status: &str, failure_message: Option<String>) -> Self {
        let state = match status {
            "Completed" => RemoteJobState::Completed,
            "Failed" => RemoteJobState::Failed,
            _ => RemoteJobState::InProgress,
        };
        Self {
            state,
            raw_status: status.to_string(),
            failure_message,
        }
    }

    pub fn in_progress() -> Self {
        Self::from_backend("InProgress", None)
    }

    pub fn completed() -> Self {
        Self::from_backend("Completed", None)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::from_backend("Failed", Some(message.into()))
    }
}

/// Intermediate state reported between polls.
#[derive(Debug, Clone, PartialEq)]
pub enum JobProgress {
    InProgress { status: String },
    AwaitingArtifact,
    TransientError(String),
}

impl JobProgress {
    pub fn describe(&self) -> String {
        match self {
            JobProgress::InProgress { status } => {
                format!("Generating video... this can take up to 5 minutes. Status: {status}")
            }
            JobProgress::AwaitingArtifact => {
                "Video processing... waiting for the upload to complete".to_string()
            }
            JobProgress::TransientError(err) => {
                format!("Status check failed ({err}); retrying")
            }
        }
    }
}

/// The single terminal report of a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed { uri: String },
    Failed { message: String },
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }

    /// Text of the assistant turn reporting this outcome.
    pub fn message(&self) -> String {
        match self {
            JobOutcome::Completed { uri } => {
                format!("Video generation completed! Video available at: {uri}")
            }
            JobOutcome::Failed { message } => format!("Video generation failed: {message}"),
        }
    }
}

fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
