//! Core library for the assistant gateway: the state store, provider registry,
//! LLM runner, tool runtime, channel dispatch, agent orchestrator, and cron
//! scheduler. `gatewayserve` and `gatewaycli` depend on this crate for
//! everything except HTTP wiring.

pub mod channels;
pub mod cron;
pub mod error;
pub mod llm;
pub mod message;
pub mod orchestrator;
pub mod provider;
pub mod request;
pub mod store;
pub mod tools;

pub use error::ErrorCode;
pub use message::{Part, Role, RuntimeMessage, ToolCallMeta};
pub use orchestrator::{Orchestrator, OrchestratorError, ProcessOutcome};
pub use provider::ProviderRegistry;
pub use request::{AgentProcessRequest, GenerateConfig, RequestedToolCall, TurnResult};
pub use store::{StateStore, StoreError};
pub use tools::{Tool, ToolRegistry};
