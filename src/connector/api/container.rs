use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::application::{
    ArtifactStore, AsyncJobManager, ChatOrchestrator, DocumentIndex, InferenceEndpoint,
    PollPolicy, ProtocolSelector, RetrievalAugmenter, Sleeper, SynchronousInvoker, TokioSleeper,
};
use crate::connector::adapter::{
    BedrockRuntimeClient, HttpArtifactStore, InMemoryArtifactStore, InMemoryDocumentIndex,
    JsonJobFile, KnowledgeBaseClient, LocalArtifactStore, MockInferenceEndpoint,
    ARTIFACT_STORE_DIR_ENV,
};
use crate::domain::{ChatConfig, KnowledgeBaseSummary, ModelEntry, OutputLocation};

pub const VIDEO_OUTPUT_URI_ENV: &str = "VIDEO_OUTPUT_URI";
const KNOWLEDGE_BASE_LIST_LIMIT: usize = 100;
const MOCK_KNOWLEDGE_BASE: &str = "demo";

pub struct ContainerConfig {
    pub data_dir: String,
    pub config_path: Option<String>,
    /// Region display name or code.
    pub region: Option<String>,
    /// Model display name or identifier.
    pub model: Option<String>,
    /// Knowledge base name or identifier.
    pub knowledge_base: Option<String>,
    pub streaming: bool,
    pub output_uri: Option<String>,
    pub mock_backend: bool,
}

pub struct Container {
    config: ContainerConfig,
    chat_config: ChatConfig,
    region: String,
    endpoint: Arc<dyn InferenceEndpoint>,
    index: Arc<dyn DocumentIndex>,
    store: Arc<dyn ArtifactStore>,
    sleeper: Arc<dyn Sleeper>,
}

impl Container {
    pub async fn new(config: ContainerConfig) -> Result<Self> {
        let chat_config = match &config.config_path {
            Some(path) => ChatConfig::load(path)
                .with_context(|| format!("Failed to load configuration from {path}"))?,
            None => ChatConfig::default(),
        };

        let requested_region = config
            .region
            .as_deref()
            .unwrap_or(&chat_config.default_region);
        let region = match chat_config.region_code(requested_region) {
            Some(code) => code.to_string(),
            None => {
                warn!("Region {} is not in the catalog; using it as a code", requested_region);
                requested_region.to_string()
            }
        };

        let (endpoint, index, store): (
            Arc<dyn InferenceEndpoint>,
            Arc<dyn DocumentIndex>,
            Arc<dyn ArtifactStore>,
        ) = if config.mock_backend {
            debug!("Using mock backend");
            let store = Arc::new(InMemoryArtifactStore::new());
            let endpoint = MockInferenceEndpoint::new()
                .with_job_duration(3)
                .with_artifact_store(store.clone());
            (Arc::new(endpoint), Arc::new(mock_index().await), store)
        } else {
            debug!("Connecting to the managed runtime in {}", region);
            let store: Arc<dyn ArtifactStore> = match std::env::var(ARTIFACT_STORE_DIR_ENV) {
                Ok(dir) => {
                    info!("Checking artifacts under {}", dir);
                    Arc::new(LocalArtifactStore::new(dir))
                }
                Err(_) => Arc::new(HttpArtifactStore::from_env(&region)?),
            };
            (
                Arc::new(BedrockRuntimeClient::from_env(&region)?),
                Arc::new(KnowledgeBaseClient::from_env(&region)?),
                store,
            )
        };

        Ok(Self {
            config,
            chat_config,
            region,
            endpoint,
            index,
            store,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    pub fn chat_config(&self) -> &ChatConfig {
        &self.chat_config
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn data_dir(&self) -> &Path {
        Path::new(&self.config.data_dir)
    }

    pub fn image_dir(&self) -> PathBuf {
        self.data_dir().join("images")
    }

    pub fn job_file(&self) -> JsonJobFile {
        JsonJobFile::in_dir(self.data_dir())
    }

    pub fn model(&self) -> Result<ModelEntry> {
        Ok(self
            .chat_config
            .resolve_model(&self.region, self.config.model.as_deref())?)
    }

    pub fn models(&self) -> &[ModelEntry] {
        self.chat_config.models_for(&self.region)
    }

    pub async fn knowledge_bases(&self) -> Result<Vec<KnowledgeBaseSummary>> {
        Ok(self.index.list_knowledge_bases(KNOWLEDGE_BASE_LIST_LIMIT).await?)
    }

    /// Knowledge base id for retrieval, matched by id or name against the
    /// listed knowledge bases. Unlisted values are used as ids.
    pub async fn knowledge_base_id(&self) -> Option<String> {
        let wanted = self
            .config
            .knowledge_base
            .clone()
            .or_else(|| self.chat_config.knowledge_base_id.clone())
            .filter(|kb| !kb.trim().is_empty())?;

        match self.knowledge_bases().await {
            Ok(bases) => {
                let found = bases
                    .into_iter()
                    .find(|kb| kb.id == wanted || kb.name.eq_ignore_ascii_case(&wanted));
                match found {
                    Some(kb) => {
                        info!("Using knowledge base {} ({})", kb.name, kb.id);
                        Some(kb.id)
                    }
                    None => {
                        warn!("Knowledge base {} not listed; using it as an id", wanted);
                        Some(wanted)
                    }
                }
            }
            Err(e) => {
                warn!("Failed to list knowledge bases: {}. Using {} as an id", e, wanted);
                Some(wanted)
            }
        }
    }

    /// Where video jobs write: the flag, then `VIDEO_OUTPUT_URI`, then the
    /// config file.
    pub fn output_location(&self) -> Result<Option<OutputLocation>> {
        let uri = self
            .config
            .output_uri
            .clone()
            .or_else(|| std::env::var(VIDEO_OUTPUT_URI_ENV).ok())
            .or_else(|| self.chat_config.video_output_uri.clone())
            .filter(|uri| !uri.trim().is_empty());

        match uri {
            Some(uri) => Ok(Some(OutputLocation::parse(&uri)?)),
            None if self.config.mock_backend => Ok(Some(OutputLocation::new("mock-videos", ""))),
            None => Ok(None),
        }
    }

    pub async fn orchestrator(&self) -> Result<ChatOrchestrator> {
        let model = self.model()?;
        let selector = ProtocolSelector::new(
            self.chat_config.families.clone(),
            self.chat_config.fallback.clone(),
        );

        let mut augmenter = RetrievalAugmenter::new(
            Some(self.index.clone()),
            self.chat_config.retrieval.number_of_results,
        );
        if let Some(kb) = self.knowledge_base_id().await {
            augmenter = augmenter.with_knowledge_base(kb);
        }

        let invoker =
            SynchronousInvoker::new(self.endpoint.clone(), self.chat_config.system_prompt.clone());
        let jobs = AsyncJobManager::new(
            self.endpoint.clone(),
            self.store.clone(),
            self.sleeper.clone(),
            PollPolicy::from(&self.chat_config.polling),
        );

        info!("Chatting with {} ({}) in {}", model.name, model.id, self.region);
        Ok(ChatOrchestrator::new(selector, augmenter, invoker, jobs, model.id)
            .with_streaming(self.config.streaming)
            .with_output_location(self.output_location()?))
    }
}

async fn mock_index() -> InMemoryDocumentIndex {
    let index = InMemoryDocumentIndex::new();
    index
        .add(
            MOCK_KNOWLEDGE_BASE,
            "Text models answer in conversation. Canvas models return one image per prompt.",
            "s3://demo-kb/models.md",
        )
        .await;
    index
        .add(
            MOCK_KNOWLEDGE_BASE,
            "Reel models generate video asynchronously and write output.mp4 to the output bucket.",
            "s3://demo-kb/video.md",
        )
        .await;
    index
}
