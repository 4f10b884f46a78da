use serde::{Deserialize, Serialize};
use tracing::warn;

use super::OutputLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

const IMAGE_FORMATS: &[&str] = &["png", "jpeg", "gif", "webp"];
const DOCUMENT_FORMATS: &[&str] = &[
    "pdf", "csv", "doc", "docx", "xls", "xlsx", "html", "txt", "md",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    Document,
}

/// A file the user attached to a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    name: String,
    format: String,
    kind: AttachmentKind,
    bytes: Vec<u8>,
}

impl Attachment {
    /// Classify a file by its extension. Unsupported formats yield `None`.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Option<Self> {
        let name = name.into();
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        let format = if extension == "jpg" {
            "jpeg".to_string()
        } else {
            extension
        };

        let kind = if IMAGE_FORMATS.contains(&format.as_str()) {
            AttachmentKind::Image
        } else if DOCUMENT_FORMATS.contains(&format.as_str()) {
            AttachmentKind::Document
        } else {
            warn!("Ignoring attachment '{}' with unsupported format '{}'", name, format);
            return None;
        };

        Some(Self {
            name,
            format,
            kind,
            bytes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn kind(&self) -> AttachmentKind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_image(&self) -> bool {
        self.kind == AttachmentKind::Image
    }

    /// Document names may only contain alphanumerics, single spaces, hyphens,
    /// parentheses and square brackets.
    fn document_name(&self) -> String {
        let stem = self
            .name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.name);
        let mut out = String::with_capacity(stem.len());
        for c in stem.chars() {
            let mapped = if c.is_ascii_alphanumeric() || "-()[]".contains(c) {
                c
            } else if c == ' ' && !out.ends_with(' ') {
                ' '
            } else {
                '-'
            };
            out.push(mapped);
        }
        let trimmed = out.trim().to_string();
        if trimmed.is_empty() {
            "document".to_string()
        } else {
            trimmed
        }
    }

    pub fn into_block(self) -> ContentBlock {
        match self.kind {
            AttachmentKind::Image => ContentBlock::Image {
                format: self.format,
                bytes: self.bytes,
            },
            AttachmentKind::Document => ContentBlock::Document {
                name: self.document_name(),
                format: self.format,
                bytes: self.bytes,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text(String),
    Image { format: String, bytes: Vec<u8> },
    Document {
        format: String,
        name: String,
        bytes: Vec<u8>,
    },
}

impl ContentBlock {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// The backend-shaped projection of a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct WireMessage {
    role: Role,
    content: Vec<ContentBlock>,
    output_location: Option<OutputLocation>,
}

impl WireMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text(text.into())],
            output_location: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text(text.into())],
            output_location: None,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.content
            .extend(attachments.into_iter().map(Attachment::into_block));
        self
    }

    pub fn with_output_location(mut self, location: OutputLocation) -> Self {
        self.output_location = Some(location);
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &[ContentBlock] {
        &self.content
    }

    pub fn output_location(&self) -> Option<&OutputLocation> {
        self.output_location.as_ref()
    }

    /// Text of the first text block, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(ContentBlock::as_text)
    }

    /// Prepend `prefix` to the first text block, inserting one if none exists.
    pub fn prepend_text(&mut self, prefix: &str) {
        for block in &mut self.content {
            if let ContentBlock::Text(text) = block {
                text.insert_str(0, prefix);
                return;
            }
        }
        self.content.insert(0, ContentBlock::Text(prefix.to_string()));
    }
}
