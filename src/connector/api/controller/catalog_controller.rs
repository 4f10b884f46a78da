use anyhow::Result;

use crate::domain::{KnowledgeBaseSummary, ModelEntry};

use super::super::Container;

/// Lists what can be chatted with in the current region.
pub struct CatalogController<'a> {
    container: &'a Container,
}

impl<'a> CatalogController<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self { container }
    }

    pub fn models(&self) -> Result<String> {
        let selected = self.container.model()?;
        Ok(format_models(
            self.container.region(),
            self.container.models(),
            &selected.id,
        ))
    }

    pub async fn knowledge_bases(&self) -> Result<String> {
        let bases = self.container.knowledge_bases().await?;
        Ok(format_knowledge_bases(&bases))
    }
}

fn format_models(region: &str, models: &[ModelEntry], selected_id: &str) -> String {
    if models.is_empty() {
        return format!("No models configured for {region}.");
    }

    let mut output = format!("Models in {region}:\n");
    for model in models {
        let marker = if model.id == selected_id { "*" } else { " " };
        output.push_str(&format!("{marker} {:<20} {}\n", model.name, model.id));
    }
    output
}

fn format_knowledge_bases(bases: &[KnowledgeBaseSummary]) -> String {
    if bases.is_empty() {
        return "No knowledge bases found.".to_string();
    }

    let mut output = format!("Found {} knowledge bases:\n", bases.len());
    for kb in bases {
        output.push_str(&format!("  {:<20} {}\n", kb.id, kb.name));
    }
    output
}
