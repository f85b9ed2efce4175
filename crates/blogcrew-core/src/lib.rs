//! BlogCrew core abstractions.
//!
//! This crate provides the agent, task and crew primitives plus the concrete
//! Researcher/Writer crew that turns a topic into a markdown blog post. Model
//! and search access sit behind the [`ChatModel`] and [`Tool`] traits so the
//! hosted collaborators can be swapped out.

mod agent;
mod blog;
mod config;
mod crew;
mod error;
mod llm;
mod search;
mod security;
mod task;
mod telemetry;
mod template;

pub use agent::{AgentAnswer, AgentExecutor, AgentSpec, DEFAULT_MAX_ITER};
pub use blog::{BlogCrew, research_task, researcher, write_task, writer};
pub use config::{CrewConfig, LlmConfig, SearchConfig};
pub use crew::{Crew, CrewOutput};
pub use error::CrewError;
pub use llm::{
    ChatModel, ChatMessage, ChatRequest, ChatResponse, FunctionCall, OpenAiChat, Role, TokenUsage,
    ToolCall, ToolSpec,
};
pub use search::{SearchHit, SerperSearch, Tool};
pub use security::SecretValue;
pub use task::{TaskOutput, TaskSpec, output_path};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use template::{Inputs, interpolate};
