use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The three invocation shapes the inference backend exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Conversational text completion, blocking or token-streamed.
    Text,
    /// Single-shot image generation returning a binary payload.
    Image,
    /// Asynchronous video generation observed through a job handle.
    Video,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Text => "text",
            Protocol::Image => "image",
            Protocol::Video => "video",
        }
    }

    pub fn supports_streaming(&self) -> bool {
        matches!(self, Protocol::Text)
    }

    /// Only text requests are grounded with retrieved documents.
    pub fn uses_retrieval(&self) -> bool {
        matches!(self, Protocol::Text)
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model family recognised by a substring of the model identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolFamily {
    pub name: String,
    pub pattern: String,
    pub protocol: Protocol,
    #[serde(default)]
    pub params: Value,
    /// Whether non-streaming calls may carry the system prompt as its own element.
    #[serde(default)]
    pub accepts_system_role: bool,
}

impl ProtocolFamily {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            protocol,
            params: Value::Object(Default::default()),
            accepts_system_role: false,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_system_role(mut self, accepts: bool) -> Self {
        self.accepts_system_role = accepts;
        self
    }

    pub fn matches(&self, model_id: &str) -> bool {
        !self.pattern.is_empty() && model_id.contains(&self.pattern)
    }

    pub fn selection(&self) -> ProtocolSelection {
        ProtocolSelection {
            protocol: self.protocol,
            family: self.name.clone(),
            params: self.params.clone(),
            accepts_system_role: self.accepts_system_role,
        }
    }

    /// Built-in families in match order: image, video, vendor text, generic text.
    pub fn defaults() -> Vec<ProtocolFamily> {
        vec![
            ProtocolFamily::new("nova-canvas", "nova-canvas", Protocol::Image).with_params(json!({
                "numberOfImages": 1,
                "height": 1024,
                "width": 1024,
                "cfgScale": 8.0,
                "quality": "standard"
            })),
            ProtocolFamily::new("nova-reel", "nova-reel", Protocol::Video).with_params(json!({
                "durationSeconds": 6,
                "fps": 24,
                "dimension": "1280x720",
                "seed": 0
            })),
            ProtocolFamily::new("anthropic", "anthropic", Protocol::Text)
                .with_params(json!({
                    "inferenceConfig": { "temperature": 0.0, "maxTokens": 2048 },
                    "additionalModelRequestFields": { "top_k": 100 }
                }))
                .with_system_role(true),
            Self::generic_text(),
        ]
    }

    /// Parameter set used when no family matches.
    pub fn generic_text() -> ProtocolFamily {
        ProtocolFamily::new("nova", "nova", Protocol::Text).with_params(json!({
            "inferenceConfig": { "temperature": 0.0, "maxTokens": 2048 }
        }))
    }
}

/// Outcome of protocol selection for one model identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolSelection {
    pub protocol: Protocol,
    pub family: String,
    pub params: Value,
    pub accepts_system_role: bool,
}
