//! Provider Registry (spec §4.2): the static catalog of known providers plus
//! runtime resolution against user-configured overrides.

use std::collections::HashMap;

use serde::Serialize;

use crate::store::ProviderSetting;

/// A model known to a provider's built-in catalog.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub supports_vision: bool,
    pub supports_tools: bool,
    pub context_window: u32,
    /// Set when this entry was produced by resolving a user-configured alias.
    pub alias_of: Option<String>,
}

impl ModelInfo {
    fn builtin(id: &str, supports_vision: bool, supports_tools: bool, context_window: u32) -> Self {
        Self {
            id: id.to_string(),
            supports_vision,
            supports_tools,
            context_window,
            alias_of: None,
        }
    }
}

/// The one adapter kind this runner speaks. Reserved for future providers that
/// need a different wire schema; every entry in the built-in catalog is this kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterKind {
    OpenAiCompatible,
}

/// A built-in provider catalog entry: default base URL + known models.
#[derive(Clone, Debug)]
pub struct ProviderCatalogEntry {
    pub adapter_kind: AdapterKind,
    pub default_base_url: String,
    pub models: Vec<ModelInfo>,
}

fn builtin_catalog() -> HashMap<&'static str, ProviderCatalogEntry> {
    let mut catalog = HashMap::new();
    catalog.insert(
        "openai",
        ProviderCatalogEntry {
            adapter_kind: AdapterKind::OpenAiCompatible,
            default_base_url: "https://api.openai.com/v1".to_string(),
            models: vec![
                ModelInfo::builtin("gpt-4o-mini", true, true, 128_000),
                ModelInfo::builtin("gpt-4.1-mini", true, true, 1_047_576),
            ],
        },
    );
    catalog
}

/// Resolves provider IDs to adapter kind, default base URL, and model catalog.
///
/// Unknown provider IDs resolve as *openai-compatible* with an empty model
/// list, so any model string passes through unexamined.
pub struct ProviderRegistry {
    catalog: HashMap<&'static str, ProviderCatalogEntry>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self {
            catalog: builtin_catalog(),
        }
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, provider_id: &str) -> Option<&ProviderCatalogEntry> {
        self.catalog.get(provider_id)
    }

    pub fn adapter_kind(&self, _provider_id: &str) -> AdapterKind {
        // Every provider known today, built-in or not, speaks the same wire schema.
        AdapterKind::OpenAiCompatible
    }

    pub fn default_base_url(&self, provider_id: &str) -> Option<String> {
        self.entry(provider_id).map(|e| e.default_base_url.clone())
    }

    /// Built-in models plus alias entries. An alias whose target matches a known
    /// model inherits that model's capabilities and records `alias_of`; when the
    /// provider has no built-in catalog, alias targets are accepted as bare models.
    pub fn resolve_models(&self, provider_id: &str, aliases: &HashMap<String, String>) -> Vec<ModelInfo> {
        let builtins = self.entry(provider_id).map(|e| e.models.clone()).unwrap_or_default();
        let mut models = builtins.clone();
        for (alias, target) in aliases {
            if let Some(known) = builtins.iter().find(|m| &m.id == target) {
                models.push(ModelInfo {
                    id: alias.clone(),
                    supports_vision: known.supports_vision,
                    supports_tools: known.supports_tools,
                    context_window: known.context_window,
                    alias_of: Some(target.clone()),
                });
            } else if builtins.is_empty() {
                models.push(ModelInfo {
                    id: alias.clone(),
                    supports_vision: false,
                    supports_tools: true,
                    context_window: 0,
                    alias_of: Some(target.clone()),
                });
            }
        }
        models
    }

    /// Canonical model ID for `requested`: direct match, then alias rewrite,
    /// then (empty-catalog providers only) pass-through. `None` means `not_found`.
    pub fn resolve_model_id(
        &self,
        provider_id: &str,
        requested: &str,
        aliases: &HashMap<String, String>,
    ) -> Option<String> {
        let builtins = self.entry(provider_id).map(|e| e.models.clone()).unwrap_or_default();
        if builtins.iter().any(|m| m.id == requested) {
            return Some(requested.to_string());
        }
        if let Some(target) = aliases.get(requested) {
            return Some(target.clone());
        }
        if builtins.is_empty() {
            return Some(requested.to_string());
        }
        None
    }

    /// The first built-in model, or empty string if the provider has no catalog.
    pub fn default_model_id(&self, provider_id: &str) -> String {
        self.entry(provider_id)
            .and_then(|e| e.models.first())
            .map(|m| m.id.clone())
            .unwrap_or_default()
    }

    /// `<PREFIX>_API_KEY` / `<PREFIX>_BASE_URL` fallback env lookup prefix: upper-case,
    /// with `-`, `.`, and space replaced by `_`.
    pub fn env_prefix(&self, provider_id: &str) -> String {
        provider_id
            .chars()
            .map(|c| match c {
                '-' | '.' | ' ' => '_',
                c => c,
            })
            .collect::<String>()
            .to_uppercase()
    }

    /// Resolves the base URL actually used for a provider: its `ProviderSetting`
    /// override if present, else the built-in default, else empty.
    pub fn effective_base_url(&self, provider_id: &str, setting: Option<&ProviderSetting>) -> String {
        if let Some(setting) = setting {
            if let Some(url) = &setting.base_url {
                return url.clone();
            }
        }
        self.default_base_url(provider_id).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_resolves_openai_compatible_with_empty_catalog() {
        let registry = ProviderRegistry::new();
        assert_eq!(registry.adapter_kind("mystery"), AdapterKind::OpenAiCompatible);
        assert!(registry.resolve_models("mystery", &HashMap::new()).is_empty());
        assert!(registry.default_base_url("mystery").is_none());
    }

    #[test]
    fn resolve_model_id_direct_match_then_alias_then_passthrough() {
        let registry = ProviderRegistry::new();
        assert_eq!(
            registry.resolve_model_id("openai", "gpt-4o-mini", &HashMap::new()),
            Some("gpt-4o-mini".to_string())
        );

        let mut aliases = HashMap::new();
        aliases.insert("fast".to_string(), "gpt-4o-mini".to_string());
        assert_eq!(
            registry.resolve_model_id("openai", "fast", &aliases),
            Some("gpt-4o-mini".to_string())
        );

        assert_eq!(registry.resolve_model_id("openai", "no-such-model", &HashMap::new()), None);

        // Empty-catalog provider: any requested model passes through.
        assert_eq!(
            registry.resolve_model_id("custom-llm", "whatever-model", &HashMap::new()),
            Some("whatever-model".to_string())
        );
    }

    #[test]
    fn resolve_model_id_is_idempotent() {
        let registry = ProviderRegistry::new();
        let mut aliases = HashMap::new();
        aliases.insert("fast".to_string(), "gpt-4o-mini".to_string());
        let once = registry.resolve_model_id("openai", "fast", &aliases).unwrap();
        let twice = registry.resolve_model_id("openai", &once, &aliases).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn resolve_models_inherits_capabilities_from_alias_target() {
        let registry = ProviderRegistry::new();
        let mut aliases = HashMap::new();
        aliases.insert("fast".to_string(), "gpt-4o-mini".to_string());
        let models = registry.resolve_models("openai", &aliases);
        let alias_entry = models.iter().find(|m| m.id == "fast").unwrap();
        assert_eq!(alias_entry.alias_of.as_deref(), Some("gpt-4o-mini"));
        assert!(alias_entry.supports_tools);
    }

    #[test]
    fn default_model_id_is_first_builtin_or_empty() {
        let registry = ProviderRegistry::new();
        assert_eq!(registry.default_model_id("openai"), "gpt-4o-mini");
        assert_eq!(registry.default_model_id("custom-llm"), "");
    }

    #[test]
    fn env_prefix_normalizes_separators() {
        let registry = ProviderRegistry::new();
        assert_eq!(registry.env_prefix("openai"), "OPENAI");
        assert_eq!(registry.env_prefix("azure-openai"), "AZURE_OPENAI");
        assert_eq!(registry.env_prefix("my.provider name"), "MY_PROVIDER_NAME");
    }
}
