use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::stream::{self, StreamExt};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::application::{DeltaEvent, DeltaStream, InferenceEndpoint, InvocationRequest};
use crate::connector::adapter::InMemoryArtifactStore;
use crate::domain::{DomainError, JobHandle, OutputLocation, Protocol, RemoteJobStatus};

/// A 1x1 transparent PNG.
const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

struct MockJob {
    output: OutputLocation,
    polls: u32,
}

/// Offline stand-in for the inference backend.
///
/// Text requests are answered with `Echo: <last user text>`; streaming splits
/// the same reply on word boundaries. Video jobs complete after a fixed
/// number of status polls and, when a store is attached, write their artifact
/// at that point.
pub struct MockInferenceEndpoint {
    jobs: Mutex<HashMap<JobHandle, MockJob>>,
    job_duration: u32,
    job_failure: Option<String>,
    store: Option<Arc<InMemoryArtifactStore>>,
    calls: AtomicUsize,
}

impl MockInferenceEndpoint {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            job_duration: 1,
            job_failure: None,
            store: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of status polls before a job reports completion.
    pub fn with_job_duration(mut self, polls: u32) -> Self {
        self.job_duration = polls.max(1);
        self
    }

    /// Make every job fail with `message` instead of completing.
    pub fn with_job_failure(mut self, message: impl Into<String>) -> Self {
        self.job_failure = Some(message.into());
        self
    }

    pub fn with_artifact_store(mut self, store: Arc<InMemoryArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Backend calls made so far, of any kind.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn reply_for(body: &Value) -> String {
        let last_user_text = body["messages"]
            .as_array()
            .and_then(|messages| messages.iter().rev().find(|m| m["role"] == "user"))
            .and_then(|m| m.pointer("/content/0/text"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        format!("Echo: {last_user_text}")
    }
}

impl Default for MockInferenceEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceEndpoint for MockInferenceEndpoint {
    async fn invoke(&self, request: &InvocationRequest) -> Result<Value, DomainError> {
        self.record_call();
        match request.protocol {
            Protocol::Text => Ok(json!({
                "output": { "message": {
                    "role": "assistant",
                    "content": [{ "text": Self::reply_for(&request.body) }]
                }},
                "stopReason": "end_turn"
            })),
            Protocol::Image => Ok(json!({ "images": [BASE64.encode(PLACEHOLDER_PNG)] })),
            Protocol::Video => Err(DomainError::invalid_input(
                "video models are invoked asynchronously",
            )),
        }
    }

    async fn invoke_streaming(&self, request: &InvocationRequest) -> Result<DeltaStream, DomainError> {
        self.record_call();
        let reply = Self::reply_for(&request.body);

        let mut events = vec![Ok(DeltaEvent::MessageStart)];
        events.extend(
            reply
                .split_inclusive(' ')
                .map(|word| Ok(DeltaEvent::TextDelta(word.to_string()))),
        );
        events.push(Ok(DeltaEvent::ContentBlockStop));
        events.push(Ok(DeltaEvent::MessageStop {
            stop_reason: Some("end_turn".to_string()),
        }));
        events.push(Ok(DeltaEvent::Metadata(json!({ "usage": { "outputTokens": 0 } }))));

        Ok(stream::iter(events).boxed())
    }

    async fn submit_async_job(
        &self,
        request: &InvocationRequest,
        output: &OutputLocation,
    ) -> Result<JobHandle, DomainError> {
        self.record_call();
        if request.body.pointer("/textToVideoParams/text").is_none() {
            return Err(DomainError::backend("ValidationException: missing video prompt"));
        }

        let handle = JobHandle::new(format!("arn:mock:async-invoke/{}", Uuid::new_v4()));
        let job = MockJob {
            output: output.for_job(&handle),
            polls: 0,
        };
        self.jobs.lock().await.insert(handle.clone(), job);
        Ok(handle)
    }

    async fn get_job_status(&self, handle: &JobHandle) -> Result<RemoteJobStatus, DomainError> {
        self.record_call();
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(handle)
            .ok_or_else(|| DomainError::backend(format!("unknown invocation {handle}")))?;

        job.polls += 1;
        debug!("Mock job {} poll {}/{}", handle, job.polls, self.job_duration);
        if job.polls < self.job_duration {
            return Ok(RemoteJobStatus::in_progress());
        }

        if let Some(message) = &self.job_failure {
            return Ok(RemoteJobStatus::failed(message.clone()));
        }
        if let Some(store) = &self.store {
            store
                .put(job.output.bucket(), job.output.artifact_key())
                .await;
        }
        Ok(RemoteJobStatus::completed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_matches_blocking_reply() {
        let endpoint = MockInferenceEndpoint::new();
        let request = InvocationRequest::new(
            "m",
            Protocol::Text,
            json!({ "messages": [{ "role": "user", "content": [{ "text": "hello there" }] }] }),
        );

        let blocking = endpoint.invoke(&request).await.unwrap();
        let expected = blocking["output"]["message"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();

        let streamed: String = endpoint
            .invoke_streaming(&request)
            .await
            .unwrap()
            .filter_map(|e| async move {
                match e {
                    Ok(DeltaEvent::TextDelta(t)) => Some(t),
                    _ => None,
                }
            })
            .collect()
            .await;

        assert_eq!(streamed, expected);
        assert_eq!(expected, "Echo: hello there");
        assert_eq!(endpoint.call_count(), 2);
    }

    #[tokio::test]
    async fn job_completes_after_configured_polls() {
        let store = Arc::new(InMemoryArtifactStore::new());
        let endpoint = MockInferenceEndpoint::new()
            .with_job_duration(2)
            .with_artifact_store(store.clone());
        let request = InvocationRequest::new(
            "reel",
            Protocol::Video,
            json!({ "textToVideoParams": { "text": "waves" } }),
        );
        let handle = endpoint
            .submit_async_job(&request, &OutputLocation::new("videos", ""))
            .await
            .unwrap();

        let first = endpoint.get_job_status(&handle).await.unwrap();
        assert_eq!(first, RemoteJobStatus::in_progress());
        assert_eq!(store.len().await, 0);

        let second = endpoint.get_job_status(&handle).await.unwrap();
        assert_eq!(second, RemoteJobStatus::completed());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_handle_is_a_backend_error() {
        let endpoint = MockInferenceEndpoint::new();
        let err = endpoint
            .get_job_status(&JobHandle::new("arn:mock:async-invoke/nope"))
            .await
            .unwrap_err();
        assert!(err.is_backend_error());
    }
}
