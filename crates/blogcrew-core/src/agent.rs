//! Agent definitions and the loop that drives one agent through one task.

use std::{fmt, sync::Arc};

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::{
    ChatMessage, ChatModel, ChatRequest, CrewError, Inputs, TokenUsage, Tool, ToolCall, ToolSpec,
    interpolate,
};

/// Iteration limit for agents that do not set one.
pub const DEFAULT_MAX_ITER: usize = 25;

const FORCE_FINAL_ANSWER: &str = "You have used all of your allowed steps. Do not call any more \
tools. Using everything you have gathered so far, give your best and complete final answer now.";

/// Declarative description of an agent.
///
/// `goal` and `backstory` are templates rendered with the kickoff inputs.
#[derive(Clone)]
pub struct AgentSpec {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub tools: Vec<Arc<dyn Tool>>,
    /// Carried for completeness; agents never delegate to each other.
    pub allow_delegation: bool,
    pub max_iter: usize,
    pub verbose: bool,
}

impl AgentSpec {
    pub fn new(
        role: impl Into<String>,
        goal: impl Into<String>,
        backstory: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            goal: goal.into(),
            backstory: backstory.into(),
            tools: Vec::new(),
            allow_delegation: false,
            max_iter: DEFAULT_MAX_ITER,
            verbose: false,
        }
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn allow_delegation(mut self, allow: bool) -> Self {
        self.allow_delegation = allow;
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Copy of this agent with its templates filled in.
    pub fn render(&self, inputs: &Inputs) -> Result<Self, CrewError> {
        Ok(Self {
            role: interpolate(&self.role, inputs)?,
            goal: interpolate(&self.goal, inputs)?,
            backstory: interpolate(&self.backstory, inputs)?,
            ..self.clone()
        })
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "You are {}. {}\nYour personal goal is: {}",
            self.role, self.backstory, self.goal
        )
    }
}

impl fmt::Debug for AgentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSpec")
            .field("role", &self.role)
            .field("goal", &self.goal)
            .field(
                "tools",
                &self.tools.iter().map(|tool| tool.name()).collect::<Vec<_>>(),
            )
            .field("allow_delegation", &self.allow_delegation)
            .field("max_iter", &self.max_iter)
            .field("verbose", &self.verbose)
            .finish()
    }
}

/// Final answer produced by an agent for one task.
#[derive(Debug, Clone)]
pub struct AgentAnswer {
    pub text: String,
    pub usage: TokenUsage,
    pub iterations: usize,
}

/// Runs the model/tool loop for a single agent and task prompt.
pub struct AgentExecutor<'a> {
    agent: &'a AgentSpec,
    model: &'a dyn ChatModel,
    tools: &'a [Arc<dyn Tool>],
}

impl<'a> AgentExecutor<'a> {
    pub fn new(agent: &'a AgentSpec, model: &'a dyn ChatModel) -> Self {
        Self {
            agent,
            model,
            tools: &agent.tools,
        }
    }

    /// Replace the agent's own tools for this run.
    pub fn with_tools(mut self, tools: &'a [Arc<dyn Tool>]) -> Self {
        self.tools = tools;
        self
    }

    #[instrument(
        name = "agent.execute",
        skip(self, task_prompt),
        fields(role = %self.agent.role, max_iter = self.agent.max_iter)
    )]
    pub async fn execute(&self, task_prompt: &str) -> Result<AgentAnswer, CrewError> {
        let specs: Vec<ToolSpec> = self.tools.iter().map(|tool| tool.spec()).collect();
        let mut messages = vec![
            ChatMessage::system(self.agent.system_prompt()),
            ChatMessage::user(task_prompt),
        ];
        let mut usage = TokenUsage::default();

        for iteration in 1..=self.agent.max_iter {
            let response = self
                .model
                .complete(ChatRequest {
                    messages: messages.clone(),
                    tools: specs.clone(),
                    temperature: None,
                })
                .await?;
            if let Some(step_usage) = response.usage {
                usage.add(step_usage);
            }

            let message = response.message;
            if message.tool_calls.is_empty() {
                return self.finish(message.content, usage, iteration);
            }

            if let Some(thought) = message.content.as_deref() {
                self.log_step(iteration, thought);
            }

            let calls = message.tool_calls;
            messages.push(ChatMessage::assistant_tool_calls(
                message.content,
                calls.clone(),
            ));
            for call in &calls {
                let observation = self.invoke(call).await?;
                self.log_step(iteration, &observation);
                messages.push(ChatMessage::tool_result(call.id.clone(), observation));
            }
        }

        warn!(
            role = %self.agent.role,
            max_iter = self.agent.max_iter,
            "iteration limit reached; requesting final answer"
        );
        messages.push(ChatMessage::user(FORCE_FINAL_ANSWER));
        let response = self
            .model
            .complete(ChatRequest {
                messages,
                tools: Vec::new(),
                temperature: None,
            })
            .await?;
        if let Some(step_usage) = response.usage {
            usage.add(step_usage);
        }

        self.finish(response.message.content, usage, self.agent.max_iter + 1)
    }

    async fn invoke(&self, call: &ToolCall) -> Result<String, CrewError> {
        let name = call.function.name.as_str();
        let Some(tool) = self.tools.iter().find(|tool| tool.name() == name) else {
            let available = self
                .tools
                .iter()
                .map(|tool| tool.name())
                .collect::<Vec<_>>();
            warn!(role = %self.agent.role, tool = name, "model requested unknown tool");
            return Ok(format!(
                "Error: tool `{name}` is not available. Available tools: {}.",
                if available.is_empty() {
                    "none".to_string()
                } else {
                    available.join(", ")
                }
            ));
        };

        let raw = call.function.arguments.trim();
        let arguments = if raw.is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str::<Value>(raw) {
                Ok(arguments) => arguments,
                Err(err) => {
                    return Ok(format!(
                        "Error: arguments for `{name}` are not valid JSON ({err}). Retry with a JSON object."
                    ));
                }
            }
        };

        debug!(role = %self.agent.role, tool = name, %arguments, "invoking tool");
        tool.call(arguments).await
    }

    fn finish(
        &self,
        content: Option<String>,
        usage: TokenUsage,
        iterations: usize,
    ) -> Result<AgentAnswer, CrewError> {
        let text = content.unwrap_or_default().trim().to_string();
        if text.is_empty() {
            return Err(CrewError::EmptyAnswer {
                role: self.agent.role.clone(),
            });
        }

        self.log_step(iterations, &text);
        Ok(AgentAnswer {
            text,
            usage,
            iterations,
        })
    }

    fn log_step(&self, iteration: usize, text: &str) {
        if self.agent.verbose {
            info!(role = %self.agent.role, iteration, "{text}");
        } else {
            debug!(role = %self.agent.role, iteration, "{text}");
        }
    }
}
