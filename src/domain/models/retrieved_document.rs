use serde::{Deserialize, Serialize};

const PREVIEW_CHARS: usize = 500;

/// A document returned by a knowledge base query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    score: f32,
    text: String,
    source: String,
}

impl RetrievedDocument {
    pub fn new(score: f32, text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            score,
            text: text.into(),
            source: source.into(),
        }
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// First 500 characters of the text, with an ellipsis when truncated.
    pub fn preview(&self) -> String {
        if self.text.chars().count() > PREVIEW_CHARS {
            let head: String = self.text.chars().take(PREVIEW_CHARS).collect();
            format!("{head}...")
        } else {
            self.text.clone()
        }
    }

    pub fn display_line(&self) -> String {
        format!("{} (score: {:.2})", self.source, self.score)
    }
}

/// A knowledge base as listed by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBaseSummary {
    pub id: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_long_text_on_char_boundary() {
        let doc = RetrievedDocument::new(0.9, "é".repeat(600), "s3://kb/doc.pdf");
        let preview = doc.preview();
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 503);
    }

    #[test]
    fn preview_keeps_short_text() {
        let doc = RetrievedDocument::new(0.5, "short", "src");
        assert_eq!(doc.preview(), "short");
        assert_eq!(doc.display_line(), "src (score: 0.50)");
    }
}
