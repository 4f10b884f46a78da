use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::{Role, WireMessage};
use crate::domain::DomainError;

/// Sent in place of an empty assistant reply; the backend rejects blank text.
pub const EMPTY_REPLY_PLACEHOLDER: &str = "(no response)";

/// Base64-encoded reference to a binary payload shown in the display history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHandle(String);

impl ImageHandle {
    pub fn encode(bytes: &[u8]) -> Self {
        Self(BASE64.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn decode(&self) -> Result<Vec<u8>, DomainError> {
        BASE64
            .decode(&self.0)
            .map_err(|e| DomainError::serialization(format!("invalid image handle: {e}")))
    }
}

/// What the user sees for a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DisplayContent {
    Text(String),
    Bundle {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<ImageHandle>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attachments: Vec<String>,
    },
}

impl DisplayContent {
    pub fn text(&self) -> &str {
        match self {
            DisplayContent::Text(text) => text,
            DisplayContent::Bundle { text, .. } => text,
        }
    }

    pub fn image(&self) -> Option<&ImageHandle> {
        match self {
            DisplayContent::Bundle { image, .. } => image.as_ref(),
            DisplayContent::Text(_) => None,
        }
    }

    pub fn attachments(&self) -> &[String] {
        match self {
            DisplayContent::Bundle { attachments, .. } => attachments,
            DisplayContent::Text(_) => &[],
        }
    }
}

/// One entry of the conversation, kept in both display and wire projections.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    role: Role,
    display: DisplayContent,
    wire: WireMessage,
    in_context: bool,
}

impl Turn {
    /// A user turn. The literal prompt is what gets displayed; `wire` may carry
    /// retrieved context and attachment bytes on top of it.
    pub fn user(
        prompt: impl Into<String>,
        attachment_names: Vec<String>,
        wire: WireMessage,
    ) -> Result<Self, DomainError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(DomainError::invalid_input("message cannot be empty"));
        }
        if wire.role() != Role::User {
            return Err(DomainError::internal("user turn built from a non-user message"));
        }

        let display = if attachment_names.is_empty() {
            DisplayContent::Text(prompt)
        } else {
            DisplayContent::Bundle {
                text: prompt,
                image: None,
                attachments: attachment_names,
            }
        };

        Ok(Self {
            role: Role::User,
            display,
            wire,
            in_context: true,
        })
    }

    /// An assistant text turn. An empty reply is displayed as empty but sent
    /// back to the model as a placeholder.
    pub fn assistant(text: impl Into<String>) -> Self {
        let text = text.into();
        let wire_text = if text.trim().is_empty() {
            EMPTY_REPLY_PLACEHOLDER.to_string()
        } else {
            text.clone()
        };
        Self {
            role: Role::Assistant,
            wire: WireMessage::assistant(wire_text),
            display: DisplayContent::Text(text),
            in_context: true,
        }
    }

    /// An assistant turn carrying a generated image. The image lives only in
    /// the display form; the backend sees the caption.
    pub fn assistant_image(text: impl Into<String>, image: &[u8]) -> Self {
        let text = text.into();
        Self {
            role: Role::Assistant,
            wire: WireMessage::assistant(text.clone()),
            display: DisplayContent::Bundle {
                text,
                image: Some(ImageHandle::encode(image)),
                attachments: Vec::new(),
            },
            in_context: true,
        }
    }

    /// Keep the turn in the displayed history but out of later requests.
    pub fn without_context(mut self) -> Self {
        self.in_context = false;
        self
    }

    /// Whether the turn is resent to the model on later requests.
    pub fn in_context(&self) -> bool {
        self.in_context
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn display(&self) -> &DisplayContent {
        &self.display
    }

    pub fn wire(&self) -> &WireMessage {
        &self.wire
    }

    pub fn text(&self) -> &str {
        self.display.text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_turn_rejects_blank_prompt() {
        let err = Turn::user("   ", vec![], WireMessage::user("   ")).unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[test]
    fn user_turn_displays_literal_prompt_not_context() {
        let wire = WireMessage::user("context...\n\nquestion: hi");
        let turn = Turn::user("hi", vec![], wire).unwrap();
        assert_eq!(turn.text(), "hi");
        assert_eq!(turn.wire().first_text(), Some("context...\n\nquestion: hi"));
    }

    #[test]
    fn image_turn_keeps_bytes_out_of_wire_form() {
        let turn = Turn::assistant_image("here it is", &[0x89, 0x50, 0x4e, 0x47]);
        assert_eq!(turn.wire().content().len(), 1);
        assert_eq!(turn.wire().first_text(), Some("here it is"));
        let handle = turn.display().image().unwrap();
        assert_eq!(handle.decode().unwrap(), vec![0x89, 0x50, 0x4e, 0x47]);
    }

    #[test]
    fn attachment_names_make_a_bundle() {
        let turn = Turn::user("see file", vec!["a.pdf".into()], WireMessage::user("see file")).unwrap();
        assert_eq!(turn.display().attachments(), &["a.pdf".to_string()]);
        assert!(turn.display().image().is_none());
    }

    #[test]
    fn empty_reply_is_sent_back_as_placeholder() {
        let turn = Turn::assistant("");
        assert_eq!(turn.text(), "");
        assert_eq!(turn.wire().first_text(), Some(EMPTY_REPLY_PLACEHOLDER));
        assert_eq!(Turn::assistant("ok").wire().first_text(), Some("ok"));
    }

    #[test]
    fn turns_start_in_context() {
        let turn = Turn::assistant("hello");
        assert!(turn.in_context());
        assert!(!turn.without_context().in_context());
    }

    #[test]
    fn corrupt_handle_fails_to_decode() {
        let handle = ImageHandle("not base64!!".to_string());
        assert!(handle.decode().is_err());
    }
}
