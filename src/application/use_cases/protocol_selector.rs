use crate::domain::{ProtocolFamily, ProtocolSelection};

/// Maps a model identifier to the protocol it is invoked with.
///
/// Families are tried in order and the first whose pattern occurs in the
/// identifier wins, so more specific patterns (`nova-canvas`) must precede
/// broader ones (`nova`). Identifiers matching nothing get the fallback
/// (generic text) parameter set.
#[derive(Debug, Clone)]
pub struct ProtocolSelector {
    families: Vec<ProtocolFamily>,
    fallback: ProtocolFamily,
}

impl ProtocolSelector {
    pub fn new(families: Vec<ProtocolFamily>, fallback: ProtocolFamily) -> Self {
        Self { families, fallback }
    }

    pub fn select(&self, model_id: &str) -> ProtocolSelection {
        self.families
            .iter()
            .find(|family| family.matches(model_id))
            .unwrap_or(&self.fallback)
            .selection()
    }

    pub fn families(&self) -> &[ProtocolFamily] {
        &self.families
    }
}

impl Default for ProtocolSelector {
    fn default() -> Self {
        Self::new(ProtocolFamily::defaults(), ProtocolFamily::generic_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Protocol;
    use proptest::prelude::*;

    #[test]
    fn canvas_is_image_even_though_it_contains_nova() {
        let selector = ProtocolSelector::default();
        let selection = selector.select("amazon.nova-canvas-v1:0");
        assert_eq!(selection.protocol, Protocol::Image);
        assert_eq!(selection.family, "nova-canvas");
    }

    #[test]
    fn reel_is_video() {
        let selector = ProtocolSelector::default();
        assert_eq!(
            selector.select("amazon.nova-reel-v1:1").protocol,
            Protocol::Video
        );
    }

    #[test]
    fn anthropic_models_use_vendor_text_params() {
        let selector = ProtocolSelector::default();
        let selection = selector.select("anthropic.claude-x");
        assert_eq!(selection.protocol, Protocol::Text);
        assert_eq!(selection.family, "anthropic");
        assert!(selection.accepts_system_role);
        assert_eq!(
            selection.params["additionalModelRequestFields"]["top_k"],
            100
        );
    }

    #[test]
    fn unknown_model_falls_back_to_generic_text() {
        let selector = ProtocolSelector::default();
        let selection = selector.select("mistral.mistral-large-2407-v1:0");
        assert_eq!(selection.protocol, Protocol::Text);
        assert_eq!(selection.family, "nova");
        assert!(!selection.accepts_system_role);
    }

    #[test]
    fn configured_order_decides_overlaps() {
        let selector = ProtocolSelector::new(
            vec![
                ProtocolFamily::new("broad", "nova", Protocol::Text),
                ProtocolFamily::new("canvas", "nova-canvas", Protocol::Image),
            ],
            ProtocolFamily::generic_text(),
        );
        assert_eq!(selector.select("amazon.nova-canvas-v1:0").family, "broad");
    }

    proptest! {
        #[test]
        fn selection_is_deterministic(model_id in ".{0,40}") {
            let selector = ProtocolSelector::default();
            prop_assert_eq!(selector.select(&model_id), selector.select(&model_id));
        }

        #[test]
        fn identifiers_without_known_patterns_get_generic_text(model_id in "[a-m0-9.:_]{0,30}") {
            // The alphabet excludes letters needed to spell any default pattern.
            let selector = ProtocolSelector::default();
            let selection = selector.select(&model_id);
            prop_assert_eq!(selection.protocol, Protocol::Text);
            prop_assert_eq!(selection.family, "nova");
        }
    }
}
