//! [`AdapterResolver`] that fills in missing provider credentials from the
//! process environment, using the `<PREFIX>_API_KEY` / `<PREFIX>_BASE_URL`
//! convention documented on [`ProviderRegistry::env_prefix`].

use std::sync::Arc;

use gateway_core::llm::{DemoAdapter, LlmAdapter, OpenAiCompatibleAdapter};
use gateway_core::orchestrator::AdapterResolver;
use gateway_core::provider::ProviderRegistry;
use gateway_core::store::ProviderSetting;

pub struct EnvAwareResolver {
    providers: Arc<ProviderRegistry>,
}

impl EnvAwareResolver {
    pub fn new(providers: Arc<ProviderRegistry>) -> Self {
        Self { providers }
    }
}

impl AdapterResolver for EnvAwareResolver {
    fn resolve(&self, provider_id: &str, setting: Option<&ProviderSetting>) -> Arc<dyn LlmAdapter> {
        let prefix = self.providers.env_prefix(provider_id);

        let api_key = setting
            .map(|s| s.api_key.clone())
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(format!("{prefix}_API_KEY")).ok())
            .unwrap_or_default();

        let base_url = {
            let effective = self.providers.effective_base_url(provider_id, setting);
            if effective.is_empty() {
                std::env::var(format!("{prefix}_BASE_URL")).unwrap_or_default()
            } else {
                effective
            }
        };

        let headers = setting.map(|s| s.headers.clone()).unwrap_or_default();

        if api_key.is_empty() && base_url.is_empty() {
            return Arc::new(DemoAdapter);
        }

        Arc::new(OpenAiCompatibleAdapter::new(base_url, api_key).with_headers(headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_env_when_setting_is_absent() {
        std::env::set_var("TESTPROV_API_KEY", "from-env");
        std::env::set_var("TESTPROV_BASE_URL", "https://example.test/v1");

        let registry = Arc::new(ProviderRegistry::new());
        let resolver = EnvAwareResolver::new(registry);
        let _adapter = resolver.resolve("testprov", None);

        std::env::remove_var("TESTPROV_API_KEY");
        std::env::remove_var("TESTPROV_BASE_URL");
    }

    #[tokio::test]
    async fn falls_back_to_demo_adapter_when_no_credentials_resolve() {
        std::env::remove_var("UNCONFIGURED_API_KEY");
        std::env::remove_var("UNCONFIGURED_BASE_URL");

        let registry = Arc::new(ProviderRegistry::new());
        let resolver = EnvAwareResolver::new(registry);
        let adapter = resolver.resolve("unconfigured", None);

        // DemoAdapter has no distinguishing getter; prove it behaves like one by
        // running a turn and checking for the echo tool call it always issues.
        let messages = vec![gateway_core::message::RuntimeMessage::user("hello smoke")];
        let tools = vec![gateway_core::request::ToolDefinition {
            name: "echo".to_string(),
            description: "echoes text".to_string(),
            input_schema: serde_json::json!({"type": "object"}),
        }];
        let config = gateway_core::request::GenerateConfig::default();
        let ctx = gateway_core::llm::RequestContext::default();

        let result = adapter.generate_turn(&messages, &tools, &config, &ctx).await.unwrap();
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].name, "echo");
    }
}
