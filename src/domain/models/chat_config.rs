use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ProtocolFamily;
use crate::domain::DomainError;

const DEFAULT_START_MESSAGE: &str =
    "Hello! I can answer questions, generate images and produce short videos. How can I help?";
const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Answer concisely and say so when you do not know.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionEntry {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub number_of_results: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            number_of_results: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    /// `None` polls until the job reaches a terminal state.
    pub max_attempts: Option<u32>,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            max_attempts: Some(180),
        }
    }
}

/// Application configuration, usually loaded from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub start_message: String,
    pub system_prompt: Option<String>,
    pub regions: Vec<RegionEntry>,
    pub default_region: String,
    /// Region code to the models offered there, in display order.
    pub models: BTreeMap<String, Vec<ModelEntry>>,
    pub default_model: Option<String>,
    pub families: Vec<ProtocolFamily>,
    pub fallback: ProtocolFamily,
    pub retrieval: RetrievalConfig,
    pub polling: PollingConfig,
    pub video_output_uri: Option<String>,
    pub knowledge_base_id: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        let mut models = BTreeMap::new();
        models.insert(
            "us-east-1".to_string(),
            vec![
                model("Claude 3.5 Sonnet", "us.anthropic.claude-3-5-sonnet-20241022-v2:0"),
                model("Nova Pro", "us.amazon.nova-pro-v1:0"),
                model("Nova Lite", "us.amazon.nova-lite-v1:0"),
                model("Nova Canvas", "amazon.nova-canvas-v1:0"),
                model("Nova Reel", "amazon.nova-reel-v1:1"),
            ],
        );
        models.insert(
            "eu-central-1".to_string(),
            vec![
                model("Claude 3.5 Sonnet", "eu.anthropic.claude-3-5-sonnet-20240620-v1:0"),
                model("Nova Pro", "eu.amazon.nova-pro-v1:0"),
                model("Nova Lite", "eu.amazon.nova-lite-v1:0"),
            ],
        );

        Self {
            start_message: DEFAULT_START_MESSAGE.to_string(),
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            regions: vec![
                RegionEntry {
                    name: "N. Virginia".to_string(),
                    code: "us-east-1".to_string(),
                },
                RegionEntry {
                    name: "Frankfurt".to_string(),
                    code: "eu-central-1".to_string(),
                },
            ],
            default_region: "us-east-1".to_string(),
            models,
            default_model: Some("Nova Pro".to_string()),
            families: ProtocolFamily::defaults(),
            fallback: ProtocolFamily::generic_text(),
            retrieval: RetrievalConfig::default(),
            polling: PollingConfig::default(),
            video_output_uri: None,
            knowledge_base_id: None,
        }
    }
}

fn model(name: &str, id: &str) -> ModelEntry {
    ModelEntry {
        name: name.to_string(),
        id: id.to_string(),
    }
}

impl ChatConfig {
    /// Load a JSON configuration file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            DomainError::configuration(format!("invalid config file {}: {e}", path.display()))
        })
    }

    /// Resolve a region given either its display name or its code.
    pub fn region_code(&self, name_or_code: &str) -> Option<&str> {
        self.regions
            .iter()
            .find(|r| r.code == name_or_code || r.name.eq_ignore_ascii_case(name_or_code))
            .map(|r| r.code.as_str())
    }

    pub fn models_for(&self, region_code: &str) -> &[ModelEntry] {
        self.models
            .get(region_code)
            .map(|m| m.as_slice())
            .unwrap_or(&[])
    }

    /// Pick a model of the region by display name or identifier. Identifiers
    /// not in the catalog are accepted as-is so new models work without a
    /// config change.
    pub fn resolve_model(
        &self,
        region_code: &str,
        requested: Option<&str>,
    ) -> Result<ModelEntry, DomainError> {
        let catalog = self.models_for(region_code);
        let wanted = requested.or(self.default_model.as_deref());

        match wanted {
            Some(wanted) => Ok(catalog
                .iter()
                .find(|m| m.id == wanted || m.name.eq_ignore_ascii_case(wanted))
                .cloned()
                .unwrap_or_else(|| model(wanted, wanted))),
            None => catalog.first().cloned().ok_or_else(|| {
                DomainError::configuration(format!("no models configured for {region_code}"))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn region_resolves_by_name_or_code() {
        let config = ChatConfig::default();
        assert_eq!(config.region_code("Frankfurt"), Some("eu-central-1"));
        assert_eq!(config.region_code("us-east-1"), Some("us-east-1"));
        assert_eq!(config.region_code("Mars"), None);
    }

    #[test]
    fn model_resolves_by_display_name() {
        let config = ChatConfig::default();
        let entry = config.resolve_model("us-east-1", Some("nova canvas")).unwrap();
        assert_eq!(entry.id, "amazon.nova-canvas-v1:0");
    }

    #[test]
    fn unknown_model_id_is_passed_through() {
        let config = ChatConfig::default();
        let entry = config
            .resolve_model("us-east-1", Some("mistral.large-v2"))
            .unwrap();
        assert_eq!(entry.id, "mistral.large-v2");
    }

    #[test]
    fn empty_region_without_default_is_an_error() {
        let config = ChatConfig {
            default_model: None,
            ..ChatConfig::default()
        };
        assert!(config.resolve_model("ap-south-1", None).is_err());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "system_prompt": "Be brief.", "polling": {{ "interval_secs": 2 }} }}"#
        )
        .unwrap();

        let config = ChatConfig::load(file.path()).unwrap();
        assert_eq!(config.system_prompt.as_deref(), Some("Be brief."));
        assert_eq!(config.polling.interval_secs, 2);
        assert_eq!(config.polling.max_attempts, Some(180));
        assert_eq!(config.families.len(), 4);
    }

    #[test]
    fn malformed_file_is_a_configuration_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = ChatConfig::load(file.path()).unwrap_err();
        assert!(err.is_configuration_error());
    }
}
