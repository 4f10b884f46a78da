use std::sync::Arc;

use tracing::{debug, info};

use crate::application::DocumentIndex;
use crate::domain::{DomainError, RetrievedDocument};

const CONTEXT_PREAMBLE: &str =
    "You are a helpful assistant, answer the following question based on the provided context:";

/// Grounds text prompts with documents from a knowledge base.
pub struct RetrievalAugmenter {
    index: Option<Arc<dyn DocumentIndex>>,
    knowledge_base_id: Option<String>,
    limit: usize,
}

impl RetrievalAugmenter {
    pub fn new(index: Option<Arc<dyn DocumentIndex>>, limit: usize) -> Self {
        Self {
            index,
            knowledge_base_id: None,
            limit: limit.max(1),
        }
    }

    /// An augmenter that never retrieves anything.
    pub fn disabled() -> Self {
        Self::new(None, 1)
    }

    pub fn with_knowledge_base(mut self, knowledge_base_id: impl Into<String>) -> Self {
        let id = knowledge_base_id.into();
        self.knowledge_base_id = (!id.trim().is_empty()).then_some(id);
        self
    }

    pub fn knowledge_base_id(&self) -> Option<&str> {
        self.knowledge_base_id.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.index.is_some() && self.knowledge_base_id.is_some()
    }

    /// Documents for `prompt` in the order the index returned them. Empty when
    /// no knowledge base is configured.
    pub async fn query(&self, prompt: &str) -> Result<Vec<RetrievedDocument>, DomainError> {
        let (Some(index), Some(kb_id)) = (&self.index, &self.knowledge_base_id) else {
            return Ok(Vec::new());
        };

        let docs = index.query(prompt, kb_id, self.limit).await?;
        info!("Retrieved {} documents from knowledge base {}", docs.len(), kb_id);
        for doc in &docs {
            debug!("  {}", doc.display_line());
        }
        Ok(docs)
    }

    /// Render documents into one context block, or `None` when there are none.
    pub fn render(docs: &[RetrievedDocument]) -> Option<String> {
        if docs.is_empty() {
            return None;
        }
        Some(
            docs.iter()
                .enumerate()
                .map(|(i, doc)| format!("Document {} [{}]: {}", i + 1, doc.source(), doc.text()))
                .collect::<Vec<_>>()
                .join("\n\n"),
        )
    }

    /// Place the context block ahead of the user's literal text.
    pub fn augment(prompt: &str, context: Option<&str>) -> String {
        match context {
            Some(context) => {
                format!("{CONTEXT_PREAMBLE}\n\n{context}\n\nquestion: {prompt}")
            }
            None => prompt.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::InMemoryDocumentIndex;

    fn docs() -> Vec<RetrievedDocument> {
        vec![
            RetrievedDocument::new(0.4, "low", "s3://kb/low.md"),
            RetrievedDocument::new(0.9, "high", "s3://kb/high.md"),
        ]
    }

    #[test]
    fn render_keeps_backend_order() {
        let rendered = RetrievalAugmenter::render(&docs()).unwrap();
        assert_eq!(
            rendered,
            "Document 1 [s3://kb/low.md]: low\n\nDocument 2 [s3://kb/high.md]: high"
        );
    }

    #[test]
    fn render_is_idempotent() {
        let docs = docs();
        assert_eq!(
            RetrievalAugmenter::render(&docs),
            RetrievalAugmenter::render(&docs)
        );
        assert!(RetrievalAugmenter::render(&[]).is_none());
    }

    #[test]
    fn augment_puts_context_before_question() {
        let text = RetrievalAugmenter::augment("why?", Some("Document 1 [a]: b"));
        assert!(text.starts_with(CONTEXT_PREAMBLE));
        assert!(text.ends_with("question: why?"));
        assert_eq!(text.matches("Document 1").count(), 1);
        assert_eq!(RetrievalAugmenter::augment("why?", None), "why?");
    }

    #[tokio::test]
    async fn without_knowledge_base_query_is_empty() {
        let index = Arc::new(InMemoryDocumentIndex::new());
        index.add("kb-1", "rust ownership rules", "s3://kb/own.md").await;

        let augmenter = RetrievalAugmenter::new(Some(index), 5);
        assert!(!augmenter.is_enabled());
        assert!(augmenter.query("rust").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_knowledge_base_id_disables_retrieval() {
        let index = Arc::new(InMemoryDocumentIndex::new());
        let augmenter = RetrievalAugmenter::new(Some(index), 5).with_knowledge_base("  ");
        assert!(!augmenter.is_enabled());
    }

    #[tokio::test]
    async fn query_returns_index_results() {
        let index = Arc::new(InMemoryDocumentIndex::new());
        index.add("kb-1", "rust ownership rules", "s3://kb/own.md").await;
        index.add("kb-1", "python gil", "s3://kb/gil.md").await;

        let augmenter = RetrievalAugmenter::new(Some(index), 5).with_knowledge_base("kb-1");
        let found = augmenter.query("ownership in rust").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source(), "s3://kb/own.md");
    }
}
