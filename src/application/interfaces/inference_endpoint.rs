use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;

use crate::domain::{DomainError, JobHandle, OutputLocation, Protocol, RemoteJobStatus};

/// One call to the inference backend: the target model, the protocol it is
/// invoked with, and the protocol-shaped request body.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub model_id: String,
    pub protocol: Protocol,
    pub body: Value,
}

impl InvocationRequest {
    pub fn new(model_id: impl Into<String>, protocol: Protocol, body: Value) -> Self {
        Self {
            model_id: model_id.into(),
            protocol,
            body,
        }
    }
}

/// Incremental events of a streamed text response.
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaEvent {
    MessageStart,
    TextDelta(String),
    ContentBlockStop,
    MessageStop { stop_reason: Option<String> },
    Metadata(Value),
}

pub type DeltaStream = BoxStream<'static, Result<DeltaEvent, DomainError>>;

/// The managed inference backend.
#[async_trait]
pub trait InferenceEndpoint: Send + Sync {
    /// Blocking call returning the raw response envelope.
    async fn invoke(&self, request: &InvocationRequest) -> Result<Value, DomainError>;

    /// Streaming text call. The returned stream ends after the last event.
    async fn invoke_streaming(&self, request: &InvocationRequest)
        -> Result<DeltaStream, DomainError>;

    /// Start an asynchronous job writing its artifact under `output`.
    async fn submit_async_job(
        &self,
        request: &InvocationRequest,
        output: &OutputLocation,
    ) -> Result<JobHandle, DomainError>;

    async fn get_job_status(&self, handle: &JobHandle) -> Result<RemoteJobStatus, DomainError>;
}
