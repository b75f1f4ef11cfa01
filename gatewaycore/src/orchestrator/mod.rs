//! Agent Orchestrator (spec §4.4): the multi-step tool-call loop that turns a
//! user request into a final reply while fielding tool calls, emitting the
//! typed event stream clients depend on.

mod event;

pub use event::{chunk_text, truncate_summary, AgentEvent, ErrorMeta, ToolCallPayload, ToolResultPayload};

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::ErrorCode;
use crate::llm::{Delta, LlmAdapter, RequestContext, RunnerError};
use crate::message::{MessageMetadata, Role, RuntimeMessage, ToolCallMeta};
use crate::provider::ProviderRegistry;
use crate::request::AgentProcessRequest;
use crate::store::{Chat, ChatKey, Document, StateStore};
use crate::tools::{ConfirmationCollaborator, ToolError, ToolRegistry};

/// Runes per synthesized delta chunk when the runner did not stream, or for the
/// explicit tool-directive short-circuit (spec §4.4 step 2 default).
const DEFAULT_CHUNK_RUNE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
    #[error("{0}")]
    Other(String),
}

impl OrchestratorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            OrchestratorError::Runner(e) => e.code(),
            OrchestratorError::Tool(e) => e.code(),
            OrchestratorError::Store(e) => e.code(),
            OrchestratorError::Other(_) => ErrorCode::AgentServiceUnavailable,
        }
    }
}

/// Resolves a provider id + its stored settings to a concrete [`LlmAdapter`].
pub trait AdapterResolver: Send + Sync {
    fn resolve(&self, provider_id: &str, setting: Option<&crate::store::ProviderSetting>) -> Arc<dyn LlmAdapter>;
}

/// The outcome of a non-streaming `process` call: `{reply, events[]}` (spec §4.4).
#[derive(Debug, Default)]
pub struct ProcessOutcome {
    pub reply: String,
    pub events: Vec<AgentEvent>,
}

/// Where emitted events go: collected in memory (non-streaming) or forwarded as
/// SSE lines over a channel (streaming).
enum Sink {
    Collect(Vec<AgentEvent>),
    Sse(mpsc::Sender<String>),
}

impl Sink {
    async fn emit(&mut self, event: AgentEvent) {
        match self {
            Sink::Collect(events) => events.push(event),
            Sink::Sse(tx) => {
                let _ = tx.send(event.to_sse_line()).await;
            }
        }
    }

    async fn finish_streaming(&mut self) {
        if let Sink::Sse(tx) = self {
            let _ = tx.send(AgentEvent::DONE_LINE.to_string()).await;
        }
    }
}

pub struct Orchestrator {
    store: Arc<StateStore>,
    tools: Arc<ToolRegistry>,
    providers: Arc<ProviderRegistry>,
    adapters: Arc<dyn AdapterResolver>,
    confirmation: Option<Arc<dyn ConfirmationCollaborator>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<StateStore>,
        tools: Arc<ToolRegistry>,
        providers: Arc<ProviderRegistry>,
        adapters: Arc<dyn AdapterResolver>,
        confirmation: Option<Arc<dyn ConfirmationCollaborator>>,
    ) -> Self {
        Self {
            store,
            tools,
            providers,
            adapters,
            confirmation,
        }
    }

    /// Non-streaming entry point: runs the full loop and returns `{reply, events[]}`.
    pub async fn process(&self, request: AgentProcessRequest) -> Result<ProcessOutcome, OrchestratorError> {
        let mut sink = Sink::Collect(Vec::new());
        let reply = self.run(request, &mut sink, None).await?;
        let Sink::Collect(events) = sink else { unreachable!() };
        Ok(ProcessOutcome { reply, events })
    }

    /// Streaming entry point: forwards every event as an SSE line on `tx`, then a
    /// final `data: [DONE]\n\n`.
    pub async fn process_stream(
        &self,
        request: AgentProcessRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<String, OrchestratorError> {
        let mut sink = Sink::Sse(tx);
        let result = self.run(request, &mut sink, Some(())).await;
        sink.finish_streaming().await;
        result
    }

    async fn run(
        &self,
        request: AgentProcessRequest,
        sink: &mut Sink,
        streaming: Option<()>,
    ) -> Result<String, OrchestratorError> {
        let key = ChatKey::new(request.session_id.clone(), request.user_id.clone(), request.channel.clone());

        // Step 1: `/new` reset.
        if request.text.trim() == "/new" {
            self.reset_history(&key)?;
            let reply = "Conversation reset.".to_string();
            sink.emit(AgentEvent::StepStarted { step: 1 }).await;
            sink.emit(AgentEvent::Completed { step: 1, reply: reply.clone() }).await;
            return Ok(reply);
        }

        let chat_id = self.get_or_create_chat(&key)?;
        let mut transcript = self.store.read(|doc| doc.histories.get(&chat_id).cloned().unwrap_or_default());
        let user_message = RuntimeMessage::user(request.text.clone());
        transcript.push(user_message.clone());

        // Step 2: explicit tool directive short-circuit.
        if let Some(directive) = &request.tool {
            let reply = match self
                .run_tool_directive(directive, sink)
                .await
            {
                Ok(reply) => reply,
                Err(err) => {
                    self.emit_error(sink, &err).await;
                    return Err(err);
                }
            };
            self.persist_turn(&chat_id, &user_message, &reply)?;
            return Ok(reply);
        }

        // Step 3: the tool-call loop.
        let tool_defs = self.tools.definitions();
        let provider_setting = self
            .store
            .read(|doc| doc.providers.get(&request.generate.provider_id).cloned());
        let adapter = self.adapters.resolve(&request.generate.provider_id, provider_setting.as_ref());
        let ctx = RequestContext {
            request_id: uuid::Uuid::new_v4().to_string(),
            extra_headers: provider_setting.as_ref().map(|s| s.headers.clone()).unwrap_or_default(),
            biz_params: request.biz_params.clone(),
        };

        let mut generate = request.generate.clone();
        let aliases = provider_setting.map(|s| s.model_aliases).unwrap_or_default();
        if generate.model.is_empty() {
            generate.model = self.providers.default_model_id(&generate.provider_id);
        } else if let Some(resolved) = self.providers.resolve_model_id(&generate.provider_id, &generate.model, &aliases) {
            generate.model = resolved;
        }

        let mut step: u32 = 1;
        loop {
            sink.emit(AgentEvent::StepStarted { step }).await;

            let turn_result = if streaming.is_some() {
                let (delta_tx, mut delta_rx) = mpsc::channel::<Delta>(64);
                let call_fut = adapter.generate_turn_stream(&transcript, &tool_defs, &generate, &ctx, delta_tx);
                let forward_fut = async {
                    while let Some(delta) = delta_rx.recv().await {
                        sink.emit(AgentEvent::AssistantDelta { step, delta: delta.content }).await;
                    }
                };
                let (result, _) = tokio::join!(call_fut, forward_fut);
                result
            } else {
                adapter.generate_turn(&transcript, &tool_defs, &generate, &ctx).await
            };

            let turn_result = match turn_result {
                Ok(result) => result,
                Err(err) if err.is_recoverable_tool_error() => {
                    // Step 3b: synthesize a failed tool_call/tool_result pair and retry.
                    let call_id = uuid::Uuid::new_v4().to_string();
                    let message = err.to_string();
                    sink.emit(AgentEvent::ToolCall {
                        step,
                        tool_call: ToolCallPayload {
                            name: "unknown".to_string(),
                            input: serde_json::Value::Null,
                        },
                    })
                    .await;
                    sink.emit(AgentEvent::ToolResult {
                        step,
                        tool_result: ToolResultPayload {
                            name: "unknown".to_string(),
                            ok: false,
                            summary: truncate_summary(&message),
                        },
                    })
                    .await;
                    transcript.push(RuntimeMessage {
                        role: Role::Assistant,
                        content: vec![],
                        metadata: MessageMetadata {
                            tool_calls: vec![ToolCallMeta {
                                id: call_id.clone(),
                                name: "unknown".to_string(),
                                arguments: "{}".to_string(),
                            }],
                            ..Default::default()
                        },
                    });
                    transcript.push(RuntimeMessage::tool(message, call_id, "unknown"));
                    step += 1;
                    continue;
                }
                Err(err) => {
                    let orch_err = OrchestratorError::from(err);
                    self.emit_error(sink, &orch_err).await;
                    return Err(orch_err);
                }
            };

            if turn_result.tool_calls.is_empty() {
                // Step 3c: final turn.
                let mut text = turn_result.text.trim().to_string();
                if text.is_empty() {
                    text = "(empty reply)".to_string();
                }
                if streaming.is_none() {
                    for chunk in chunk_text(&text, DEFAULT_CHUNK_RUNE_LEN) {
                        sink.emit(AgentEvent::AssistantDelta { step, delta: chunk }).await;
                    }
                }
                sink.emit(AgentEvent::Completed { step, reply: text.clone() }).await;
                self.persist_turn(&chat_id, &user_message, &text)?;
                return Ok(text);
            }

            // Step 3d: execute each tool call in order.
            let tool_call_metas: Vec<ToolCallMeta> = turn_result
                .tool_calls
                .iter()
                .map(|tc| ToolCallMeta {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments: serde_json::to_string(&tc.arguments).unwrap_or_else(|_| "{}".to_string()),
                })
                .collect();
            transcript.push(RuntimeMessage::assistant_with_tool_calls(turn_result.text.clone(), tool_call_metas));

            for call in &turn_result.tool_calls {
                sink.emit(AgentEvent::ToolCall {
                    step,
                    tool_call: ToolCallPayload {
                        name: call.name.clone(),
                        input: serde_json::Value::Object(call.arguments.clone()),
                    },
                })
                .await;

                match self
                    .tools
                    .call(&call.name, &call.arguments, self.confirmation.as_deref())
                    .await
                {
                    Ok(result) => {
                        sink.emit(AgentEvent::ToolResult {
                            step,
                            tool_result: ToolResultPayload {
                                name: call.name.clone(),
                                ok: true,
                                summary: truncate_summary(&result.text),
                            },
                        })
                        .await;
                        transcript.push(RuntimeMessage::tool(result.text, call.id.clone(), call.name.clone()));
                    }
                    Err(err) => {
                        let feedback = format!("tool '{}' failed: {err}", call.name);
                        sink.emit(AgentEvent::ToolResult {
                            step,
                            tool_result: ToolResultPayload {
                                name: call.name.clone(),
                                ok: false,
                                summary: truncate_summary(&feedback),
                            },
                        })
                        .await;
                        transcript.push(RuntimeMessage::tool(feedback, call.id.clone(), call.name.clone()));
                    }
                }
            }

            step += 1;
        }
    }

    async fn run_tool_directive(&self, directive: &crate::request::RequestedToolCall, sink: &mut Sink) -> Result<String, OrchestratorError> {
        sink.emit(AgentEvent::StepStarted { step: 1 }).await;
        sink.emit(AgentEvent::ToolCall {
            step: 1,
            tool_call: ToolCallPayload {
                name: directive.name.clone(),
                input: directive.input.clone(),
            },
        })
        .await;

        let args = directive.input.as_object().cloned().unwrap_or_default();
        let result = self
            .tools
            .call(&directive.name, &args, self.confirmation.as_deref())
            .await?;

        sink.emit(AgentEvent::ToolResult {
            step: 1,
            tool_result: ToolResultPayload {
                name: directive.name.clone(),
                ok: true,
                summary: truncate_summary(&result.text),
            },
        })
        .await;

        for chunk in chunk_text(&result.text, DEFAULT_CHUNK_RUNE_LEN) {
            sink.emit(AgentEvent::AssistantDelta { step: 1, delta: chunk }).await;
        }
        sink.emit(AgentEvent::Completed { step: 1, reply: result.text.clone() }).await;
        Ok(result.text)
    }

    async fn emit_error(&self, sink: &mut Sink, err: &OrchestratorError) {
        sink.emit(AgentEvent::Error {
            meta: ErrorMeta {
                code: err.code(),
                message: err.to_string(),
            },
        })
        .await;
    }

    fn reset_history(&self, key: &ChatKey) -> Result<(), OrchestratorError> {
        self.store.write(|doc: &mut Document| -> Result<(), crate::store::StoreError> {
            if let Some(chat_id) = doc.find_chat_id(key) {
                doc.histories.insert(chat_id, Vec::new());
            }
            Ok(())
        })?;
        Ok(())
    }

    fn get_or_create_chat(&self, key: &ChatKey) -> Result<String, OrchestratorError> {
        self.store
            .write(|doc: &mut Document| -> Result<String, crate::store::StoreError> {
                if let Some(id) = doc.find_chat_id(key) {
                    return Ok(id);
                }
                let id = uuid::Uuid::new_v4().to_string();
                let now = chrono::Utc::now();
                doc.chats.insert(
                    id.clone(),
                    Chat {
                        id: id.clone(),
                        session_id: key.session_id.clone(),
                        user_id: key.user_id.clone(),
                        channel: key.channel.clone(),
                        name: None,
                        created_at: now,
                        updated_at: now,
                    },
                );
                Ok(id)
            })
            .map_err(OrchestratorError::from)
    }

    fn persist_turn(&self, chat_id: &str, user_message: &RuntimeMessage, reply: &str) -> Result<(), OrchestratorError> {
        let chat_id = chat_id.to_string();
        let user_message = user_message.clone();
        let reply = reply.to_string();
        self.store
            .write(|doc: &mut Document| -> Result<(), crate::store::StoreError> {
                let history = doc.histories.entry(chat_id.clone()).or_default();
                history.push(user_message.clone());
                history.push(RuntimeMessage::assistant(reply.clone()));
                Ok(())
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tempfile::tempdir;

    use crate::request::{GenerateConfig, RequestedToolCall, RunnerToolCall};
    use crate::store::ProviderSetting;
    use crate::tools::ToolRegistry;

    /// Replays a fixed, ordered script of turn results/errors; panics if called
    /// more times than the script provides, so an unexpected extra call fails loudly.
    struct ScriptedAdapter {
        calls: Arc<AtomicUsize>,
        responses: std::sync::Mutex<Vec<Result<TurnResult, RunnerError>>>,
    }

    impl ScriptedAdapter {
        fn new(responses: Vec<Result<TurnResult, RunnerError>>) -> (Arc<Self>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let mut responses = responses;
            responses.reverse();
            let adapter = Arc::new(Self {
                calls: Arc::clone(&calls),
                responses: std::sync::Mutex::new(responses),
            });
            (adapter, calls)
        }
    }

    #[async_trait]
    impl LlmAdapter for ScriptedAdapter {
        async fn generate_turn(
            &self,
            _messages: &[RuntimeMessage],
            _tools: &[crate::request::ToolDefinition],
            _config: &GenerateConfig,
            _ctx: &RequestContext,
        ) -> Result<TurnResult, RunnerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().unwrap().pop().expect("scripted adapter called more times than scripted")
        }

        async fn generate_turn_stream(
            &self,
            messages: &[RuntimeMessage],
            tools: &[crate::request::ToolDefinition],
            config: &GenerateConfig,
            ctx: &RequestContext,
            _on_delta: mpsc::Sender<Delta>,
        ) -> Result<TurnResult, RunnerError> {
            self.generate_turn(messages, tools, config, ctx).await
        }
    }

    struct FixedResolver(Arc<dyn LlmAdapter>);
    impl AdapterResolver for FixedResolver {
        fn resolve(&self, _provider_id: &str, _setting: Option<&ProviderSetting>) -> Arc<dyn LlmAdapter> {
            Arc::clone(&self.0)
        }
    }

    fn build_orchestrator(adapter: Arc<dyn LlmAdapter>, data_dir: &std::path::Path) -> Orchestrator {
        let store = Arc::new(StateStore::load(data_dir.join("state.json")).unwrap());
        let tools = Arc::new(ToolRegistry::with_builtins());
        let providers = Arc::new(ProviderRegistry::new());
        Orchestrator::new(store, tools, providers, Arc::new(FixedResolver(adapter)), None)
    }

    fn base_request(text: &str) -> AgentProcessRequest {
        AgentProcessRequest {
            session_id: "s1".into(),
            user_id: "u1".into(),
            channel: "console".into(),
            text: text.to_string(),
            tool: None,
            generate: GenerateConfig::default(),
            biz_params: None,
        }
    }

    #[tokio::test]
    async fn new_resets_history_preserves_chat_and_never_calls_the_runner() {
        let dir = tempdir().unwrap();
        let (adapter, calls) = ScriptedAdapter::new(vec![Ok(TurnResult {
            text: "first reply".into(),
            tool_calls: vec![],
        })]);
        let orchestrator = build_orchestrator(adapter, dir.path());

        orchestrator.process(base_request("hi there")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let key = ChatKey::new("s1", "u1", "console");
        let chat_id = orchestrator.store.read(|doc| doc.find_chat_id(&key)).unwrap();
        orchestrator
            .store
            .read(|doc| assert_eq!(doc.histories.get(&chat_id).unwrap().len(), 2));

        let outcome = orchestrator.process(base_request("/new")).await.unwrap();
        assert_eq!(outcome.reply, "Conversation reset.");
        assert_eq!(calls.load(Ordering::SeqCst), 1, "runner must not be called for /new");

        orchestrator.store.read(|doc| {
            assert!(doc.chats.contains_key(&chat_id), "chat record must survive a reset");
            assert_eq!(doc.histories.get(&chat_id).unwrap().len(), 0);
        });
    }

    #[tokio::test]
    async fn explicit_tool_directive_short_circuits_the_runner() {
        let dir = tempdir().unwrap();
        let (adapter, calls) = ScriptedAdapter::new(vec![]);
        let orchestrator = build_orchestrator(adapter, dir.path());

        let mut request = base_request("ignored, a tool directive is present");
        request.tool = Some(RequestedToolCall {
            name: "echo".to_string(),
            input: serde_json::json!({"text": "hi"}),
        });

        let outcome = orchestrator.process(request).await.unwrap();
        assert_eq!(outcome.reply, "Echo: hi");
        assert_eq!(calls.load(Ordering::SeqCst), 0, "explicit tool directive must bypass the runner");

        assert!(matches!(outcome.events[0], AgentEvent::StepStarted { step: 1 }));
        assert!(matches!(outcome.events[1], AgentEvent::ToolCall { step: 1, .. }));
        assert!(matches!(outcome.events[2], AgentEvent::ToolResult { step: 1, .. }));
        assert!(matches!(outcome.events.last().unwrap(), AgentEvent::Completed { step: 1, .. }));
    }

    #[tokio::test]
    async fn recoverable_tool_argument_error_retries_then_succeeds() {
        let dir = tempdir().unwrap();
        let (adapter, calls) = ScriptedAdapter::new(vec![
            Err(RunnerError::ProviderInvalidToolArguments("bad json".into())),
            Ok(TurnResult { text: "recovered".into(), tool_calls: vec![] }),
        ]);
        let orchestrator = build_orchestrator(adapter, dir.path());

        let outcome = orchestrator.process(base_request("do something")).await.unwrap();
        assert_eq!(outcome.reply, "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 2, "must retry once after a recoverable error");

        let tool_call_events = outcome.events.iter().filter(|e| matches!(e, AgentEvent::ToolCall { .. })).count();
        assert_eq!(tool_call_events, 1);
        let tool_result_outcomes: Vec<bool> = outcome
            .events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::ToolResult { tool_result, .. } => Some(tool_result.ok),
                _ => None,
            })
            .collect();
        assert_eq!(tool_result_outcomes, vec![false], "synthesized tool_result for the bad call must be marked failed");
    }

    #[tokio::test]
    async fn tool_call_is_executed_then_the_loop_continues_to_a_final_reply() {
        let dir = tempdir().unwrap();
        let mut args = serde_json::Map::new();
        args.insert("text".to_string(), serde_json::json!("hi"));
        let (adapter, calls) = ScriptedAdapter::new(vec![
            Ok(TurnResult {
                text: String::new(),
                tool_calls: vec![RunnerToolCall {
                    id: "call-1".into(),
                    name: "echo".into(),
                    arguments: args,
                }],
            }),
            Ok(TurnResult { text: "all done".into(), tool_calls: vec![] }),
        ]);
        let orchestrator = build_orchestrator(adapter, dir.path());

        let outcome = orchestrator.process(base_request("please echo hi")).await.unwrap();
        assert_eq!(outcome.reply, "all done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(matches!(outcome.events[0], AgentEvent::StepStarted { step: 1 }));
        assert!(matches!(&outcome.events[1], AgentEvent::ToolCall { step: 1, tool_call } if tool_call.name == "echo"));
        assert!(
            matches!(&outcome.events[2], AgentEvent::ToolResult { step: 1, tool_result } if tool_result.ok && tool_result.name == "echo")
        );
        assert!(matches!(outcome.events[3], AgentEvent::StepStarted { step: 2 }));
        assert!(matches!(outcome.events.last().unwrap(), AgentEvent::Completed { step: 2, reply } if reply == "all done"));
    }
}
