use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::application::DocumentIndex;
use crate::domain::{DomainError, KnowledgeBaseSummary, RetrievedDocument};

struct StoredDocument {
    text: String,
    source: String,
    terms: HashSet<String>,
}

/// Keyword-overlap index used with the mock backend and in tests.
///
/// A document scores the fraction of query terms it contains; documents
/// sharing no term with the query are not returned.
pub struct InMemoryDocumentIndex {
    knowledge_bases: Arc<Mutex<BTreeMap<String, Vec<StoredDocument>>>>,
}

impl InMemoryDocumentIndex {
    pub fn new() -> Self {
        Self {
            knowledge_bases: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub async fn add(
        &self,
        knowledge_base_id: impl Into<String>,
        text: impl Into<String>,
        source: impl Into<String>,
    ) {
        let text = text.into();
        let document = StoredDocument {
            terms: terms(&text),
            text,
            source: source.into(),
        };
        self.knowledge_bases
            .lock()
            .await
            .entry(knowledge_base_id.into())
            .or_default()
            .push(document);
    }
}

impl Default for InMemoryDocumentIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl DocumentIndex for InMemoryDocumentIndex {
    async fn query(
        &self,
        text: &str,
        knowledge_base_id: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedDocument>, DomainError> {
        let query = terms(text);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let knowledge_bases = self.knowledge_bases.lock().await;
        let Some(documents) = knowledge_bases.get(knowledge_base_id) else {
            return Err(DomainError::backend(format!(
                "knowledge base {knowledge_base_id} does not exist"
            )));
        };

        let mut scored: Vec<RetrievedDocument> = documents
            .iter()
            .filter_map(|doc| {
                let hits = query.intersection(&doc.terms).count();
                (hits > 0).then(|| {
                    RetrievedDocument::new(
                        hits as f32 / query.len() as f32,
                        doc.text.clone(),
                        doc.source.clone(),
                    )
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score().total_cmp(&a.score()));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn list_knowledge_bases(
        &self,
        limit: usize,
    ) -> Result<Vec<KnowledgeBaseSummary>, DomainError> {
        Ok(self
            .knowledge_bases
            .lock()
            .await
            .keys()
            .take(limit)
            .map(|id| KnowledgeBaseSummary {
                id: id.clone(),
                name: id.clone(),
            })
            .collect())
    }
}
