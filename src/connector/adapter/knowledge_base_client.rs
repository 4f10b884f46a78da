use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::application::DocumentIndex;
use crate::connector::adapter::http_support::{
    authorize, bearer_token_from_env, build_client, endpoint_url, parse_base_url, send,
};
use crate::domain::{DomainError, KnowledgeBaseSummary, RetrievedDocument};

pub const AGENT_RUNTIME_URL_ENV: &str = "BEDROCK_AGENT_RUNTIME_URL";
pub const AGENT_URL_ENV: &str = "BEDROCK_AGENT_URL";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveResponse {
    #[serde(default)]
    retrieval_results: Vec<RetrievalResult>,
}

#[derive(Deserialize)]
struct RetrievalResult {
    content: ResultContent,
    #[serde(default)]
    location: Option<ResultLocation>,
    #[serde(default)]
    score: Option<f32>,
}

#[derive(Deserialize)]
struct ResultContent {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultLocation {
    #[serde(rename = "type")]
    kind: Option<String>,
    s3_location: Option<UriLocation>,
    web_location: Option<UrlLocation>,
    confluence_location: Option<UrlLocation>,
    share_point_location: Option<UrlLocation>,
}

#[derive(Deserialize)]
struct UriLocation {
    uri: Option<String>,
}

#[derive(Deserialize)]
struct UrlLocation {
    url: Option<String>,
}

impl ResultLocation {
    fn source(self) -> String {
        let url = |l: Option<UrlLocation>| l.and_then(|l| l.url);
        self.s3_location
            .and_then(|l| l.uri)
            .or_else(|| url(self.web_location))
            .or_else(|| url(self.confluence_location))
            .or_else(|| url(self.share_point_location))
            .or(self.kind)
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    knowledge_base_summaries: Vec<SummaryEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryEntry {
    knowledge_base_id: String,
    name: String,
}

/// Retrieval against managed knowledge bases.
///
/// Queries go to the agent runtime; listing goes to the agent control plane.
pub struct KnowledgeBaseClient {
    client: reqwest::Client,
    runtime_url: Url,
    control_url: Url,
    token: Option<String>,
}

impl KnowledgeBaseClient {
    pub fn new(runtime_url: &str, control_url: &str, token: Option<String>) -> Result<Self, DomainError> {
        Ok(Self {
            client: build_client(Duration::from_secs(30)),
            runtime_url: parse_base_url(runtime_url)?,
            control_url: parse_base_url(control_url)?,
            token,
        })
    }

    pub fn from_env(region: &str) -> Result<Self, DomainError> {
        let runtime = std::env::var(AGENT_RUNTIME_URL_ENV)
            .unwrap_or_else(|_| format!("https://bedrock-agent-runtime.{region}.amazonaws.com"));
        let control = std::env::var(AGENT_URL_ENV)
            .unwrap_or_else(|_| format!("https://bedrock-agent.{region}.amazonaws.com"));
        Self::new(&runtime, &control, bearer_token_from_env())
    }
}

#[async_trait]
impl DocumentIndex for KnowledgeBaseClient {
    async fn query(
        &self,
        text: &str,
        knowledge_base_id: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedDocument>, DomainError> {
        let url = endpoint_url(&self.runtime_url, ["knowledgebases", knowledge_base_id, "retrieve"])?;
        let body = json!({
            "retrievalQuery": { "text": text },
            "retrievalConfiguration": {
                "vectorSearchConfiguration": { "numberOfResults": limit }
            }
        });

        let response = send(
            authorize(self.client.post(url), self.token.as_deref()).json(&body),
            "retrieve",
        )
        .await?;
        let parsed: RetrieveResponse = response
            .json()
            .await
            .map_err(|e| DomainError::backend(format!("retrieve: failed to parse response: {e}")))?;

        debug!("Knowledge base returned {} results", parsed.retrieval_results.len());
        Ok(parsed
            .retrieval_results
            .into_iter()
            .map(|r| {
                let source = r
                    .location
                    .map(ResultLocation::source)
                    .unwrap_or_else(|| "unknown".to_string());
                RetrievedDocument::new(r.score.unwrap_or(0.0), r.content.text, source)
            })
            .collect())
    }

    async fn list_knowledge_bases(
        &self,
        limit: usize,
    ) -> Result<Vec<KnowledgeBaseSummary>, DomainError> {
        let url = endpoint_url(&self.control_url, ["knowledgebases", ""])?;
        let response = send(
            authorize(self.client.post(url), self.token.as_deref())
                .json(&json!({ "maxResults": limit })),
            "list-knowledge-bases",
        )
        .await?;
        let parsed: ListResponse = response.json().await.map_err(|e| {
            DomainError::backend(format!("list-knowledge-bases: failed to parse response: {e}"))
        })?;

        Ok(parsed
            .knowledge_base_summaries
            .into_iter()
            .map(|s| KnowledgeBaseSummary {
                id: s.knowledge_base_id,
                name: s.name,
            })
            .collect())
    }
}
