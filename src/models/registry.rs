//! Model Registry - cached snapshot of discoverable models

use crate::backend::Model;

/// The last model list the backend reported.
///
/// Always replaced wholesale; entries are never merged across discoveries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelRegistry {
    models: Vec<Model>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole snapshot with a fresh backend listing
    pub fn replace(&mut self, models: Vec<Model>) {
        self.models = models;
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn get(&self, name: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Model to auto-load at startup: the first preferred name that was
    /// discovered, else the first discovered model.
    pub fn startup_candidate(&self, preferred: &[String]) -> Option<&Model> {
        preferred
            .iter()
            .find_map(|name| self.get(name))
            .or_else(|| self.models.first())
    }
}

/// First entry the backend marked as loaded.
///
/// The backend is trusted to mark at most one; if it marks more, the first wins.
pub fn first_loaded(models: &[Model]) -> Option<&Model> {
    models.iter().find(|m| m.loaded)
}

/// The entry called `name`, only if it is marked loaded
pub fn loaded_named<'a>(models: &'a [Model], name: &str) -> Option<&'a Model> {
    models.iter().find(|m| m.name == name && m.loaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(models: &[(&str, bool)]) -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry.replace(
            models
                .iter()
                .map(|(name, loaded)| Model::named(*name).with_loaded(*loaded))
                .collect(),
        );
        registry
    }

    #[test]
    fn test_replace_drops_previous_entries() {
        let mut reg = registry(&[("llama-7b", false), ("phi-2", false)]);
        reg.replace(vec![Model::named("mistral")]);

        assert_eq!(reg.models().len(), 1);
        assert!(reg.get("phi-2").is_none());
    }

    #[test]
    fn test_first_loaded_picks_first_when_several_marked() {
        let reg = registry(&[("a", false), ("b", true), ("c", true)]);
        assert_eq!(first_loaded(reg.models()).map(|m| m.name.as_str()), Some("b"));
    }

    #[test]
    fn test_loaded_named_requires_loaded_flag() {
        let reg = registry(&[("llama-7b", false), ("phi-2", true)]);
        assert!(loaded_named(reg.models(), "llama-7b").is_none());
        assert!(loaded_named(reg.models(), "phi-2").is_some());
        assert!(loaded_named(reg.models(), "mistral").is_none());
    }

    #[test]
    fn test_startup_candidate_prefers_listed_order() {
        let reg = registry(&[("llama-7b", false), ("phi-2", false), ("mistral", false)]);

        let preferred = vec!["gpt-x".to_string(), "mistral".to_string(), "phi-2".to_string()];
        assert_eq!(
            reg.startup_candidate(&preferred).map(|m| m.name.as_str()),
            Some("mistral")
        );
    }

    #[test]
    fn test_startup_candidate_falls_back_to_first() {
        let reg = registry(&[("llama-7b", false), ("phi-2", false)]);
        assert_eq!(
            reg.startup_candidate(&["nope".to_string()]).map(|m| m.name.as_str()),
            Some("llama-7b")
        );
        assert!(ModelRegistry::new().startup_candidate(&[]).is_none());
    }
}
