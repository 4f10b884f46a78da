use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::use_cases::request_builder::video_request_body;
use crate::application::{ArtifactStore, InferenceEndpoint, InvocationRequest, Sleeper};
use crate::domain::{
    Attachment, DomainError, GenerationJob, JobOutcome, JobProgress, OutputLocation,
    PollingConfig, Protocol, ProtocolSelection, RemoteJobState,
};

/// How often and how long to poll a job.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` keeps polling until a terminal state.
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: config.interval(),
            max_attempts: config.max_attempts,
        }
    }
}

/// Result of one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep {
    Pending(JobProgress),
    Terminal(JobOutcome),
}

/// Owns the session's single asynchronous video job and drives it from
/// submission to its one terminal report.
pub struct AsyncJobManager {
    endpoint: Arc<dyn InferenceEndpoint>,
    store: Arc<dyn ArtifactStore>,
    sleeper: Arc<dyn Sleeper>,
    policy: PollPolicy,
    active: Option<GenerationJob>,
}

impl AsyncJobManager {
    pub fn new(
        endpoint: Arc<dyn InferenceEndpoint>,
        store: Arc<dyn ArtifactStore>,
        sleeper: Arc<dyn Sleeper>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            endpoint,
            store,
            sleeper,
            policy,
            active: None,
        }
    }

    pub fn active(&self) -> Option<&GenerationJob> {
        self.active.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Fails with `JobInProgressError` while a job occupies the slot.
    pub fn ensure_idle(&self) -> Result<(), DomainError> {
        match &self.active {
            Some(job) => Err(DomainError::JobInProgressError(job.handle().to_string())),
            None => Ok(()),
        }
    }

    /// Start a video job. Fails without contacting the backend when a job is
    /// already active or no output location is given.
    pub async fn submit(
        &mut self,
        model_id: &str,
        selection: &ProtocolSelection,
        prompt: &str,
        reference: Option<&Attachment>,
        output: Option<&OutputLocation>,
    ) -> Result<&GenerationJob, DomainError> {
        self.ensure_idle()?;

        let output = output.filter(|o| !o.bucket().is_empty()).ok_or_else(|| {
            DomainError::configuration("an output location is required for video generation")
        })?;

        if selection.protocol != Protocol::Video {
            return Err(DomainError::invalid_input(format!(
                "model family '{}' does not generate video",
                selection.family
            )));
        }

        let body = video_request_body(prompt, reference, &selection.params);
        let request = InvocationRequest::new(model_id, Protocol::Video, body);
        let handle = self.endpoint.submit_async_job(&request, output).await?;

        info!("Submitted video job {} writing to {}", handle, output.uri());
        let job = GenerationJob::new(handle.clone(), output.for_job(&handle), prompt);
        Ok(&*self.active.insert(job))
    }

    /// Adopt a job persisted by an earlier session.
    pub fn restore(&mut self, job: GenerationJob) -> Result<(), DomainError> {
        self.ensure_idle()?;
        if !job.is_active() {
            return Err(DomainError::invalid_input(format!(
                "job {} already reached a terminal state",
                job.handle()
            )));
        }
        info!("Restored video job {}", job.handle());
        self.active = Some(job);
        Ok(())
    }

    /// Forget the active job without reporting it.
    pub fn reset(&mut self) {
        if let Some(job) = self.active.take() {
            info!("Dropping video job {}", job.handle());
        }
    }

    /// Query the backend (or, once it reported success, the artifact store)
    /// one time. Transient errors are reported as progress; any other error
    /// fails the job. A terminal step clears the active job.
    pub async fn poll_once(&mut self) -> Result<PollStep, DomainError> {
        let Some(job) = self.active.as_mut() else {
            return Err(DomainError::NoActiveJob);
        };
        job.begin_polling();

        if !job.backend_succeeded() {
            let status = match self.endpoint.get_job_status(job.handle()).await {
                Ok(status) => status,
                Err(e) if e.is_transient() => {
                    warn!("Polling {} failed: {}", job.handle(), e);
                    job.record_error(e.to_string());
                    return Ok(PollStep::Pending(JobProgress::TransientError(e.detail())));
                }
                Err(e) => return Ok(self.fail_active(e.detail())),
            };

            match status.state {
                RemoteJobState::InProgress => {
                    debug!("Job {} status: {}", job.handle(), status.raw_status);
                    return Ok(PollStep::Pending(JobProgress::InProgress {
                        status: status.raw_status,
                    }));
                }
                RemoteJobState::Failed => {
                    let message = status
                        .failure_message
                        .unwrap_or_else(|| "the backend did not report a reason".to_string());
                    return Ok(self.fail_active(message));
                }
                RemoteJobState::Completed => {
                    info!(
                        "Video job {} reported complete, checking {}",
                        job.handle(),
                        job.output().uri()
                    );
                    job.mark_backend_succeeded();
                }
            }
        }

        match self.store.exists(job.output()).await {
            Ok(Some(key)) => {
                job.complete();
                let uri = format!("s3://{}/{}", job.output().bucket(), key);
                info!("Video job {} materialized at {}", job.handle(), uri);
                self.active = None;
                Ok(PollStep::Terminal(JobOutcome::Completed { uri }))
            }
            Ok(None) => Ok(PollStep::Pending(JobProgress::AwaitingArtifact)),
            Err(e) if e.is_transient() => {
                warn!("Artifact check for {} failed: {}", job.handle(), e);
                job.record_error(e.to_string());
                Ok(PollStep::Pending(JobProgress::TransientError(e.detail())))
            }
            Err(e) => Ok(self.fail_active(e.detail())),
        }
    }

    /// End the active job as failed and clear the slot.
    fn fail_active(&mut self, message: String) -> PollStep {
        if let Some(mut job) = self.active.take() {
            job.fail(message.clone());
            info!("Video job {} failed: {}", job.handle(), message);
        }
        PollStep::Terminal(JobOutcome::Failed { message })
    }

    /// Poll on the configured interval until the job reaches a terminal
    /// state. Cancellation and the attempt cap leave the job in place.
    pub async fn run_to_completion<F>(
        &mut self,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<JobOutcome, DomainError>
    where
        F: FnMut(&JobProgress) + Send,
    {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled()),
                step = self.poll_once() => step?,
            };

            match step {
                PollStep::Terminal(outcome) => return Ok(outcome),
                PollStep::Pending(progress) => on_progress(&progress),
            }

            if let Some(max) = self.policy.max_attempts {
                if attempts >= max {
                    warn!("Giving up on video job after {} polls", attempts);
                    return Err(DomainError::PollLimitExceeded(attempts));
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled()),
                _ = self.sleeper.sleep(self.policy.interval) => {}
            }
        }
    }

    fn cancelled(&self) -> DomainError {
        if let Some(job) = &self.active {
            info!("Stopped polling {}; the job can be resumed", job.handle());
        }
        DomainError::Cancelled
    }
}
