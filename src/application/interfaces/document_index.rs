use async_trait::async_trait;

use crate::domain::{DomainError, KnowledgeBaseSummary, RetrievedDocument};

/// A searchable knowledge base.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Return up to `limit` documents, most relevant first. An empty result
    /// is not an error.
    async fn query(
        &self,
        text: &str,
        knowledge_base_id: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedDocument>, DomainError>;

    async fn list_knowledge_bases(
        &self,
        limit: usize,
    ) -> Result<Vec<KnowledgeBaseSummary>, DomainError>;
}
