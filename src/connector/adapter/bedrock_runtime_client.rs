use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::application::{DeltaStream, InferenceEndpoint, InvocationRequest};
use crate::connector::adapter::event_stream::EventStreamDecoder;
use crate::connector::adapter::http_support::{
    authorize, bearer_token_from_env, build_client, endpoint_url, json_body, parse_base_url, send,
};
use crate::domain::{DomainError, JobHandle, OutputLocation, Protocol, RemoteJobStatus};

pub const RUNTIME_URL_ENV: &str = "BEDROCK_RUNTIME_URL";
const EVENT_STREAM_CONTENT_TYPE: &str = "application/vnd.amazon.eventstream";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    invocation_arn: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: String,
    failure_message: Option<String>,
}

/// HTTP client for the managed inference runtime.
///
/// Text turns go to the conversational `converse` and `converse-stream`
/// endpoints, image generation to the raw `invoke` endpoint and video jobs to
/// the `async-invoke` collection. Requests carry a bearer token when one is
/// configured.
///
/// | Variable                   | Default                                         |
/// |----------------------------|-------------------------------------------------|
/// | `BEDROCK_RUNTIME_URL`      | `https://bedrock-runtime.{region}.amazonaws.com` |
/// | `AWS_BEARER_TOKEN_BEDROCK` | none                                            |
pub struct BedrockRuntimeClient {
    client: reqwest::Client,
    /// Streaming responses can run far longer than a blocking call.
    stream_client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl BedrockRuntimeClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, DomainError> {
        Ok(Self {
            client: build_client(Duration::from_secs(120)),
            stream_client: build_client(Duration::from_secs(600)),
            base_url: parse_base_url(base_url)?,
            token,
        })
    }

    pub fn from_env(region: &str) -> Result<Self, DomainError> {
        let base = std::env::var(RUNTIME_URL_ENV)
            .unwrap_or_else(|_| format!("https://bedrock-runtime.{region}.amazonaws.com"));
        Self::new(&base, bearer_token_from_env())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn model_url(&self, model_id: &str, action: &str) -> Result<Url, DomainError> {
        endpoint_url(&self.base_url, ["model", model_id, action])
    }
}

#[async_trait]
impl InferenceEndpoint for BedrockRuntimeClient {
    async fn invoke(&self, request: &InvocationRequest) -> Result<Value, DomainError> {
        let action = match request.protocol {
            Protocol::Text => "converse",
            Protocol::Image => "invoke",
            Protocol::Video => {
                return Err(DomainError::invalid_input(
                    "video models must be invoked asynchronously",
                ))
            }
        };
        let url = self.model_url(&request.model_id, action)?;
        debug!("POST {}", url);

        let response = send(
            authorize(self.client.post(url), self.token.as_deref()).json(&request.body),
            action,
        )
        .await?;
        json_body(response, action).await
    }

    async fn invoke_streaming(&self, request: &InvocationRequest) -> Result<DeltaStream, DomainError> {
        let url = self.model_url(&request.model_id, "converse-stream")?;
        debug!("POST {}", url);

        let response = send(
            authorize(self.stream_client.post(url), self.token.as_deref())
                .header(ACCEPT, EVENT_STREAM_CONTENT_TYPE)
                .json(&request.body),
            "converse-stream",
        )
        .await?;

        let chunks = Box::pin(response.bytes_stream());
        let events = stream::unfold(
            (chunks, EventStreamDecoder::new(), false),
            |(mut chunks, mut decoder, finished)| async move {
                if finished {
                    return None;
                }
                loop {
                    match decoder.next_frame() {
                        Ok(Some(frame)) => match frame.into_delta_event() {
                            Ok(Some(event)) => return Some((Ok(event), (chunks, decoder, false))),
                            Ok(None) => continue,
                            Err(e) => return Some((Err(e), (chunks, decoder, true))),
                        },
                        Ok(None) => {}
                        Err(e) => return Some((Err(e), (chunks, decoder, true))),
                    }

                    match chunks.next().await {
                        Some(Ok(bytes)) => decoder.push(&bytes),
                        Some(Err(e)) => {
                            let err = DomainError::transient(format!("stream interrupted: {e}"));
                            return Some((Err(err), (chunks, decoder, true)));
                        }
                        None if decoder.pending() > 0 => {
                            let err = DomainError::backend("stream ended inside a frame");
                            return Some((Err(err), (chunks, decoder, true)));
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(events.boxed())
    }

    async fn submit_async_job(
        &self,
        request: &InvocationRequest,
        output: &OutputLocation,
    ) -> Result<JobHandle, DomainError> {
        let url = endpoint_url(&self.base_url, ["async-invoke"])?;
        let body = json!({
            "modelId": request.model_id,
            "modelInput": request.body,
            "outputDataConfig": { "s3OutputDataConfig": { "s3Uri": output.uri() } }
        });

        let response = send(
            authorize(self.client.post(url), self.token.as_deref()).json(&body),
            "async-invoke",
        )
        .await?;
        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| DomainError::backend(format!("async-invoke: failed to parse response: {e}")))?;

        info!("Backend accepted job {}", submitted.invocation_arn);
        Ok(JobHandle::new(submitted.invocation_arn))
    }

    async fn get_job_status(&self, handle: &JobHandle) -> Result<RemoteJobStatus, DomainError> {
        let url = endpoint_url(&self.base_url, ["async-invoke", handle.as_str()])?;
        let response = send(
            authorize(self.client.get(url), self.token.as_deref()),
            "get-async-invoke",
        )
        .await?;
        let status: StatusResponse = response.json().await.map_err(|e| {
            DomainError::backend(format!("get-async-invoke: failed to parse response: {e}"))
        })?;

        Ok(RemoteJobStatus::from_backend(
            &status.status,
            status.failure_message,
        ))
    }
}
