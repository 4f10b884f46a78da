#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::{json, Value};

use bedrock_chat::application::{DeltaEvent, DeltaStream, InvocationRequest};
use bedrock_chat::{
    ArtifactStore, AsyncJobManager, DomainError, InferenceEndpoint, JobHandle, OutputLocation,
    PollPolicy, Sleeper,
};
use bedrock_chat::domain::RemoteJobStatus;

/// Backend whose answers are scripted up front.
pub struct ScriptedEndpoint {
    reply: Result<String, String>,
    fragments: Vec<String>,
    statuses: Mutex<VecDeque<Result<RemoteJobStatus, DomainError>>>,
    submit_error: Option<String>,
    reject_if: Option<(String, String)>,
    calls: AtomicUsize,
    status_calls: AtomicUsize,
    requests: Mutex<Vec<InvocationRequest>>,
}

impl ScriptedEndpoint {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            fragments: text.split_inclusive(' ').map(str::to_string).collect(),
            statuses: Mutex::new(VecDeque::new()),
            submit_error: None,
            reject_if: None,
            calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            ..Self::replying("")
        }
    }

    pub fn with_statuses(self, statuses: Vec<Result<RemoteJobStatus, DomainError>>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    /// Fail any request whose body mentions `needle`; answer the rest.
    pub fn rejecting(mut self, needle: &str, message: &str) -> Self {
        self.reject_if = Some((needle.to_string(), message.to_string()));
        self
    }

    pub fn with_submit_error(mut self, message: &str) -> Self {
        self.submit_error = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<InvocationRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, request: &InvocationRequest) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
    }

    fn outcome_for(&self, request: &InvocationRequest) -> Result<String, String> {
        if let Some((needle, message)) = &self.reject_if {
            if request.body.to_string().contains(needle.as_str()) {
                return Err(message.clone());
            }
        }
        self.reply.clone()
    }
}

#[async_trait]
impl InferenceEndpoint for ScriptedEndpoint {
    async fn invoke(&self, request: &InvocationRequest) -> Result<Value, DomainError> {
        self.record(request);
        match self.outcome_for(request) {
            Ok(text) => Ok(json!({
                "output": { "message": { "role": "assistant", "content": [{ "text": text }] } }
            })),
            Err(message) => Err(DomainError::backend(message)),
        }
    }

    async fn invoke_streaming(&self, request: &InvocationRequest) -> Result<DeltaStream, DomainError> {
        self.record(request);
        if let Err(message) = self.outcome_for(request) {
            return Err(DomainError::backend(message));
        }
        let events: Vec<Result<DeltaEvent, DomainError>> = std::iter::once(DeltaEvent::MessageStart)
            .chain(self.fragments.iter().cloned().map(DeltaEvent::TextDelta))
            .chain(std::iter::once(DeltaEvent::MessageStop { stop_reason: None }))
            .map(Ok)
            .collect();
        Ok(stream::iter(events).boxed())
    }

    async fn submit_async_job(
        &self,
        request: &InvocationRequest,
        _output: &OutputLocation,
    ) -> Result<JobHandle, DomainError> {
        self.record(request);
        match &self.submit_error {
            Some(message) => Err(DomainError::backend(message.clone())),
            None => Ok(JobHandle::new(format!(
                "arn:test:async-invoke/job{}",
                self.calls()
            ))),
        }
    }

    async fn get_job_status(&self, _handle: &JobHandle) -> Result<RemoteJobStatus, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RemoteJobStatus::in_progress()))
    }
}

/// Artifact store answering from a script; `None` once the script runs out.
/// Scripted errors are returned before any answer.
pub struct ScriptedStore {
    answers: Mutex<VecDeque<Option<String>>>,
    errors: Mutex<VecDeque<DomainError>>,
}

impl ScriptedStore {
    pub fn new(answers: Vec<Option<&str>>) -> Self {
        Self {
            answers: Mutex::new(
                answers
                    .into_iter()
                    .map(|a| a.map(str::to_string))
                    .collect(),
            ),
            errors: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_errors(self, errors: Vec<DomainError>) -> Self {
        *self.errors.lock().unwrap() = errors.into();
        self
    }
}

#[async_trait]
impl ArtifactStore for ScriptedStore {
    async fn exists(&self, _location: &OutputLocation) -> Result<Option<String>, DomainError> {
        if let Some(err) = self.errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self.answers.lock().unwrap().pop_front().flatten())
    }
}

/// Sleeper that returns immediately and counts calls.
#[derive(Default)]
pub struct InstantSleeper {
    pub sleeps: AtomicUsize,
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, _duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
    }
}

pub const REEL: &str = "amazon.nova-reel-v1:1";

pub fn job_manager(
    endpoint: Arc<ScriptedEndpoint>,
    store: Arc<ScriptedStore>,
    sleeper: Arc<InstantSleeper>,
    max_attempts: Option<u32>,
) -> AsyncJobManager {
    AsyncJobManager::new(
        endpoint,
        store,
        sleeper,
        PollPolicy {
            interval: Duration::from_secs(10),
            max_attempts,
        },
    )
}
