//! Shared application state and the top-level router (spec §6).

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;

use gateway_config::AppConfig;
use gateway_core::cron::CronScheduler;
use gateway_core::provider::ProviderRegistry;
use gateway_core::store::StateStore;
use gateway_core::tools::ToolRegistry;
use gateway_core::Orchestrator;

use crate::middleware;
use crate::routes::{agent, channels, chats, cron, envs, health, models};

/// Everything a route handler needs, shared behind an `Arc` across connections.
pub struct AppState {
    pub store: Arc<StateStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub tools: Arc<ToolRegistry>,
    pub providers: Arc<ProviderRegistry>,
    pub scheduler: Arc<CronScheduler>,
    pub config: Arc<AppConfig>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/version", get(health::version))
        .route("/chats", get(chats::list_chats).post(chats::create_chat))
        .route("/chats/batch-delete", post(chats::batch_delete_chats))
        .route("/chats/:id", get(chats::get_chat).delete(chats::delete_chat))
        .route("/agent/process", post(agent::process))
        .route("/cron/jobs", get(cron::list_jobs).post(cron::create_job))
        .route("/cron/jobs/:id", get(cron::get_job).put(cron::update_job).delete(cron::delete_job))
        .route("/cron/jobs/:id/pause", post(cron::pause_job))
        .route("/cron/jobs/:id/resume", post(cron::resume_job))
        .route("/cron/jobs/:id/run", post(cron::run_job))
        .route("/cron/jobs/:id/state", get(cron::job_state))
        .route("/models", get(models::list_providers))
        .route("/models/catalog", get(models::catalog))
        .route("/models/active", get(models::get_active_model).put(models::set_active_model))
        .route("/models/:provider_id/config", put(models::upsert_provider))
        .route("/models/:provider_id", delete(models::delete_provider))
        .route("/envs", get(envs::list_envs).put(envs::set_envs))
        .route("/envs/:key", delete(envs::delete_env))
        .route("/channels/qq/inbound", post(channels::qq_inbound))
        .route_layer(axum::middleware::from_fn_with_state(Arc::clone(&state), middleware::api_key_gate))
        .layer(axum::middleware::from_fn(middleware::request_id))
        .with_state(state)
}

#[cfg(test)]
pub(crate) struct StubAdapter;

#[cfg(test)]
#[async_trait::async_trait]
impl gateway_core::llm::LlmAdapter for StubAdapter {
    async fn generate_turn(
        &self,
        _messages: &[gateway_core::message::RuntimeMessage],
        _tools: &[gateway_core::request::ToolDefinition],
        _config: &gateway_core::request::GenerateConfig,
        _ctx: &gateway_core::llm::RequestContext,
    ) -> Result<gateway_core::request::TurnResult, gateway_core::llm::RunnerError> {
        Ok(gateway_core::request::TurnResult { text: "stub reply".to_string(), tool_calls: vec![] })
    }

    async fn generate_turn_stream(
        &self,
        messages: &[gateway_core::message::RuntimeMessage],
        tools: &[gateway_core::request::ToolDefinition],
        config: &gateway_core::request::GenerateConfig,
        ctx: &gateway_core::llm::RequestContext,
        _on_delta: tokio::sync::mpsc::Sender<gateway_core::llm::Delta>,
    ) -> Result<gateway_core::request::TurnResult, gateway_core::llm::RunnerError> {
        self.generate_turn(messages, tools, config, ctx).await
    }
}

/// Counts calls and always returns at least one `echo` tool call on the first
/// invocation, then a final reply — lets route tests drive the orchestrator's
/// full tool-execution loop end-to-end, and lets them prove the runner was (or
/// wasn't) invoked at all.
#[cfg(test)]
pub(crate) struct CountingToolCallAdapter {
    pub calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
impl CountingToolCallAdapter {
    pub(crate) fn new() -> (std::sync::Arc<Self>, std::sync::Arc<std::sync::atomic::AtomicUsize>) {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        (std::sync::Arc::new(Self { calls: std::sync::Arc::clone(&calls) }), calls)
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl gateway_core::llm::LlmAdapter for CountingToolCallAdapter {
    async fn generate_turn(
        &self,
        messages: &[gateway_core::message::RuntimeMessage],
        _tools: &[gateway_core::request::ToolDefinition],
        _config: &gateway_core::request::GenerateConfig,
        _ctx: &gateway_core::llm::RequestContext,
    ) -> Result<gateway_core::request::TurnResult, gateway_core::llm::RunnerError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if messages.iter().any(|m| m.role == gateway_core::message::Role::Tool) {
            return Ok(gateway_core::request::TurnResult { text: "all done".to_string(), tool_calls: vec![] });
        }
        let mut arguments = serde_json::Map::new();
        arguments.insert("text".to_string(), serde_json::Value::String("hi".to_string()));
        Ok(gateway_core::request::TurnResult {
            text: String::new(),
            tool_calls: vec![gateway_core::request::RunnerToolCall {
                id: "call-1".to_string(),
                name: "echo".to_string(),
                arguments,
            }],
        })
    }

    async fn generate_turn_stream(
        &self,
        messages: &[gateway_core::message::RuntimeMessage],
        tools: &[gateway_core::request::ToolDefinition],
        config: &gateway_core::request::GenerateConfig,
        ctx: &gateway_core::llm::RequestContext,
        _on_delta: tokio::sync::mpsc::Sender<gateway_core::llm::Delta>,
    ) -> Result<gateway_core::request::TurnResult, gateway_core::llm::RunnerError> {
        self.generate_turn(messages, tools, config, ctx).await
    }
}

#[cfg(test)]
struct FixedResolver(Arc<dyn gateway_core::llm::LlmAdapter>);

#[cfg(test)]
impl gateway_core::orchestrator::AdapterResolver for FixedResolver {
    fn resolve(&self, _provider_id: &str, _setting: Option<&gateway_core::store::ProviderSetting>) -> Arc<dyn gateway_core::llm::LlmAdapter> {
        Arc::clone(&self.0)
    }
}

#[cfg(test)]
pub(crate) fn test_state_in(data_dir: &std::path::Path) -> Arc<AppState> {
    test_state_with_adapter_in(data_dir, Arc::new(StubAdapter))
}

#[cfg(test)]
pub(crate) fn test_state_with_adapter_in(data_dir: &std::path::Path, adapter: Arc<dyn gateway_core::llm::LlmAdapter>) -> Arc<AppState> {
    let store = Arc::new(StateStore::load(data_dir.join("state.json")).unwrap());
    let tools = Arc::new(ToolRegistry::with_builtins());
    let providers = Arc::new(ProviderRegistry::new());
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        Arc::clone(&tools),
        Arc::clone(&providers),
        Arc::new(FixedResolver(adapter)),
        None,
    ));
    let scheduler = CronScheduler::new(Arc::clone(&store), Arc::clone(&orchestrator), data_dir.join("cron-leases"), "test");

    Arc::new(AppState {
        store,
        orchestrator,
        tools,
        providers,
        scheduler,
        config: Arc::new(AppConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            data_dir: data_dir.to_path_buf(),
            api_key: None,
            search_tool_enabled: false,
            browser_tool_enabled: false,
        }),
    })
}
