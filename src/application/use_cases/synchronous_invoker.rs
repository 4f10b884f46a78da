use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::future;
use futures_util::stream::{BoxStream, StreamExt};
use serde_json::Value;
use tracing::{debug, info};

use crate::application::use_cases::request_builder::{
    image_request_body, ConverseRequestBuilder, InlineSystemPrompt, SeparateSystemPrompt,
};
use crate::application::{DeltaEvent, InferenceEndpoint, InvocationRequest};
use crate::domain::{DomainError, Protocol, ProtocolSelection, WireMessage};

/// Text fragments of a streamed reply, in arrival order.
pub type FragmentStream = BoxStream<'static, Result<String, DomainError>>;

/// Runs the request/response protocols (text and image) and reduces their
/// response envelopes to plain text or raw image bytes.
pub struct SynchronousInvoker {
    endpoint: Arc<dyn InferenceEndpoint>,
    system_prompt: Option<String>,
}

impl SynchronousInvoker {
    pub fn new(endpoint: Arc<dyn InferenceEndpoint>, system_prompt: Option<String>) -> Self {
        Self {
            endpoint,
            system_prompt: system_prompt.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    fn ensure_protocol(selection: &ProtocolSelection, expected: Protocol) -> Result<(), DomainError> {
        if selection.protocol != expected {
            return Err(DomainError::invalid_input(format!(
                "model family '{}' uses the {} protocol, not {}",
                selection.family, selection.protocol, expected
            )));
        }
        Ok(())
    }

    /// Blocking text completion over the whole history.
    pub async fn complete_text(
        &self,
        model_id: &str,
        selection: &ProtocolSelection,
        history: &[WireMessage],
    ) -> Result<String, DomainError> {
        Self::ensure_protocol(selection, Protocol::Text)?;

        let system = self.system_prompt.as_deref();
        let body = if selection.accepts_system_role {
            SeparateSystemPrompt::new(system).build(history, &selection.params)
        } else {
            InlineSystemPrompt::new(system).build(history, &selection.params)
        };

        info!("Invoking {} ({} messages)", model_id, history.len());
        let envelope = self
            .endpoint
            .invoke(&InvocationRequest::new(model_id, Protocol::Text, body))
            .await?;
        Self::extract_text(&envelope)
    }

    /// Streamed text completion. The system prompt is always inlined because
    /// the streaming transport has no separate system role.
    pub async fn stream_text(
        &self,
        model_id: &str,
        selection: &ProtocolSelection,
        history: &[WireMessage],
    ) -> Result<FragmentStream, DomainError> {
        Self::ensure_protocol(selection, Protocol::Text)?;

        let body = InlineSystemPrompt::new(self.system_prompt.as_deref())
            .build(history, &selection.params);

        info!("Streaming {} ({} messages)", model_id, history.len());
        let events = self
            .endpoint
            .invoke_streaming(&InvocationRequest::new(model_id, Protocol::Text, body))
            .await?;

        Ok(events
            .filter_map(|event| {
                future::ready(match event {
                    Ok(DeltaEvent::TextDelta(text)) => Some(Ok(text)),
                    Ok(DeltaEvent::MessageStop { stop_reason }) => {
                        debug!("Stream stopped: {:?}", stop_reason);
                        None
                    }
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                })
            })
            .boxed())
    }

    pub async fn generate_image(
        &self,
        model_id: &str,
        selection: &ProtocolSelection,
        prompt: &str,
    ) -> Result<Vec<u8>, DomainError> {
        Self::ensure_protocol(selection, Protocol::Image)?;

        info!("Generating image with {}", model_id);
        let body = image_request_body(prompt, &selection.params);
        let envelope = self
            .endpoint
            .invoke(&InvocationRequest::new(model_id, Protocol::Image, body))
            .await?;
        Self::extract_image(&envelope)
    }

    /// Concatenated text blocks of `output.message.content`.
    pub fn extract_text(envelope: &Value) -> Result<String, DomainError> {
        let content = envelope
            .pointer("/output/message/content")
            .and_then(Value::as_array)
            .ok_or_else(|| DomainError::backend("response envelope has no output message"))?;

        Ok(content
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect())
    }

    /// First image of an image-generation envelope, decoded.
    pub fn extract_image(envelope: &Value) -> Result<Vec<u8>, DomainError> {
        if let Some(error) = envelope.get("error").and_then(Value::as_str) {
            return Err(DomainError::backend(format!("image generation failed: {error}")));
        }

        let encoded = envelope
            .pointer("/images/0")
            .and_then(Value::as_str)
            .ok_or_else(|| DomainError::backend("response envelope contains no image"))?;

        BASE64
            .decode(encoded)
            .map_err(|e| DomainError::backend(format!("image payload is not valid base64: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ProtocolSelector;
    use crate::connector::MockInferenceEndpoint;
    use serde_json::json;

    fn invoker() -> SynchronousInvoker {
        SynchronousInvoker::new(
            Arc::new(MockInferenceEndpoint::new()),
            Some("Be brief.".to_string()),
        )
    }

    #[test]
    fn extract_text_joins_text_blocks() {
        let envelope = json!({
            "output": { "message": { "role": "assistant", "content": [
                { "text": "Hello" }, { "reasoningContent": {} }, { "text": ", world" }
            ]}}
        });
        assert_eq!(
            SynchronousInvoker::extract_text(&envelope).unwrap(),
            "Hello, world"
        );
    }

    #[test]
    fn extract_text_requires_output_message() {
        let err = SynchronousInvoker::extract_text(&json!({ "stopReason": "x" })).unwrap_err();
        assert!(err.is_backend_error());
    }

    #[test]
    fn extract_image_decodes_first_image() {
        let envelope = json!({ "images": ["AQID", "BAUG"] });
        assert_eq!(
            SynchronousInvoker::extract_image(&envelope).unwrap(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn extract_image_surfaces_backend_error() {
        let envelope = json!({ "images": [], "error": "content filtered" });
        let err = SynchronousInvoker::extract_image(&envelope).unwrap_err();
        assert!(err.to_string().contains("content filtered"));
    }

    #[tokio::test]
    async fn streamed_fragments_concatenate_to_blocking_text() {
        let invoker = invoker();
        let selection = ProtocolSelector::default().select("amazon.nova-pro-v1:0");
        let history = vec![WireMessage::user("tell me about streams")];

        let blocking = invoker
            .complete_text("amazon.nova-pro-v1:0", &selection, &history)
            .await
            .unwrap();

        let mut stream = invoker
            .stream_text("amazon.nova-pro-v1:0", &selection, &history)
            .await
            .unwrap();
        let mut streamed = String::new();
        let mut fragments = 0;
        while let Some(fragment) = stream.next().await {
            streamed.push_str(&fragment.unwrap());
            fragments += 1;
        }

        assert!(fragments > 1);
        assert_eq!(streamed, blocking);
    }

    #[tokio::test]
    async fn text_call_rejects_image_family() {
        let invoker = invoker();
        let selection = ProtocolSelector::default().select("amazon.nova-canvas-v1:0");
        let err = invoker
            .complete_text("amazon.nova-canvas-v1:0", &selection, &[WireMessage::user("x")])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn image_generation_returns_bytes() {
        let invoker = invoker();
        let selection = ProtocolSelector::default().select("amazon.nova-canvas-v1:0");
        let bytes = invoker
            .generate_image("amazon.nova-canvas-v1:0", &selection, "a lighthouse")
            .await
            .unwrap();
        assert!(!bytes.is_empty());
    }
}
