use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Map, Value};

use crate::domain::{Attachment, ContentBlock, Role, WireMessage};

/// Placed between an inlined system prompt and the user's text.
pub const SYSTEM_PROMPT_SEPARATOR: &str = "\n\n";

/// Request parameters copied verbatim from the family parameter bundle.
const PASSTHROUGH_PARAMS: &[&str] = &["inferenceConfig", "additionalModelRequestFields"];

/// Converts one wire message into the backend's JSON message shape. Binary
/// blocks are base64-encoded here and nowhere else.
pub fn message_json(message: &WireMessage) -> Value {
    let content: Vec<Value> = message.content().iter().map(block_json).collect();
    json!({ "role": message.role().as_str(), "content": content })
}

fn block_json(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text(text) => json!({ "text": text }),
        ContentBlock::Image { format, bytes } => json!({
            "image": { "format": format, "source": { "bytes": BASE64.encode(bytes) } }
        }),
        ContentBlock::Document {
            format,
            name,
            bytes,
        } => json!({
            "document": {
                "format": format,
                "name": name,
                "source": { "bytes": BASE64.encode(bytes) }
            }
        }),
    }
}

fn conversation_body(messages: Vec<Value>, params: &Value) -> Value {
    let mut body = Map::new();
    body.insert("messages".to_string(), Value::Array(messages));
    for key in PASSTHROUGH_PARAMS {
        if let Some(value) = params.get(*key) {
            body.insert((*key).to_string(), value.clone());
        }
    }
    Value::Object(body)
}

/// Builds the body of a conversational text request.
pub trait ConverseRequestBuilder: Send + Sync {
    fn build(&self, history: &[WireMessage], params: &Value) -> Value;
}

/// Merges the system prompt into the first user message. Used for streaming
/// and for models that take no separate system role.
pub struct InlineSystemPrompt<'a> {
    system_prompt: Option<&'a str>,
}

impl<'a> InlineSystemPrompt<'a> {
    pub fn new(system_prompt: Option<&'a str>) -> Self {
        Self { system_prompt }
    }
}

impl ConverseRequestBuilder for InlineSystemPrompt<'_> {
    fn build(&self, history: &[WireMessage], params: &Value) -> Value {
        let first_user = history.iter().position(|m| m.role() == Role::User);
        let messages = history
            .iter()
            .enumerate()
            .map(|(i, message)| match self.system_prompt {
                Some(system) if Some(i) == first_user && !system.is_empty() => {
                    let mut merged = message.clone();
                    merged.prepend_text(&format!("{system}{SYSTEM_PROMPT_SEPARATOR}"));
                    message_json(&merged)
                }
                _ => message_json(message),
            })
            .collect();
        conversation_body(messages, params)
    }
}

/// Sends the system prompt as its own leading element.
pub struct SeparateSystemPrompt<'a> {
    system_prompt: Option<&'a str>,
}

impl<'a> SeparateSystemPrompt<'a> {
    pub fn new(system_prompt: Option<&'a str>) -> Self {
        Self { system_prompt }
    }
}

impl ConverseRequestBuilder for SeparateSystemPrompt<'_> {
    fn build(&self, history: &[WireMessage], params: &Value) -> Value {
        let messages = history.iter().map(message_json).collect();
        let mut body = conversation_body(messages, params);
        if let Some(system) = self.system_prompt.filter(|s| !s.is_empty()) {
            body["system"] = json!([{ "text": system }]);
        }
        body
    }
}

pub fn image_request_body(prompt: &str, params: &Value) -> Value {
    json!({
        "taskType": "TEXT_IMAGE",
        "textToImageParams": { "text": prompt },
        "imageGenerationConfig": params
    })
}

/// Video request, optionally conditioned on a reference frame.
pub fn video_request_body(prompt: &str, reference: Option<&Attachment>, params: &Value) -> Value {
    let mut text_params = json!({ "text": prompt });
    if let Some(image) = reference.filter(|a| a.is_image()) {
        text_params["images"] = json!([{
            "format": image.format(),
            "source": { "bytes": BASE64.encode(image.bytes()) }
        }]);
    }
    json!({
        "taskType": "TEXT_VIDEO",
        "textToVideoParams": text_params,
        "videoGenerationConfig": params
    })
}
