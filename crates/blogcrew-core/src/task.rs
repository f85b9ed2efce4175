//! Task definitions and single-task execution.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Serialize;
use tracing::{info, instrument};

use crate::{
    AgentExecutor, AgentSpec, ChatModel, CrewError, Inputs, TokenUsage, Tool, interpolate,
};

/// Declarative unit of work bound to one agent.
///
/// `description`, `expected_output` and `output_file` are templates rendered
/// with the kickoff inputs.
#[derive(Clone)]
pub struct TaskSpec {
    pub name: String,
    pub description: String,
    pub expected_output: String,
    pub agent: Arc<AgentSpec>,
    /// Overrides the agent's tools when set.
    pub tools: Option<Vec<Arc<dyn Tool>>>,
    pub output_file: Option<String>,
    pub async_execution: bool,
}

impl TaskSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        expected_output: impl Into<String>,
        agent: Arc<AgentSpec>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            expected_output: expected_output.into(),
            agent,
            tools: None,
            output_file: None,
            async_execution: false,
        }
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_output_file(mut self, template: impl Into<String>) -> Self {
        self.output_file = Some(template.into());
        self
    }

    pub fn async_execution(mut self, enabled: bool) -> Self {
        self.async_execution = enabled;
        self
    }

    pub(crate) fn render(
        &self,
        inputs: &Inputs,
        output_dir: &Path,
    ) -> Result<RenderedTask, CrewError> {
        let agent = self.agent.render(inputs)?;
        let tools = self
            .tools
            .clone()
            .unwrap_or_else(|| agent.tools.clone());
        let output_path = self
            .output_file
            .as_deref()
            .map(|template| output_path(output_dir, template, inputs))
            .transpose()?;

        Ok(RenderedTask {
            name: self.name.clone(),
            description: interpolate(&self.description, inputs)?,
            expected_output: interpolate(&self.expected_output, inputs)?,
            agent,
            tools,
            output_path,
            async_execution: self.async_execution,
        })
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name)
            .field("agent", &self.agent.role)
            .field("output_file", &self.output_file)
            .field("async_execution", &self.async_execution)
            .finish()
    }
}

/// Resolve an output-file template under `output_dir`.
///
/// Input values are sanitised before substitution so they cannot introduce
/// path components; the template itself is trusted.
pub fn output_path(
    output_dir: &Path,
    template: &str,
    inputs: &Inputs,
) -> Result<PathBuf, CrewError> {
    let sanitized: Inputs = inputs
        .iter()
        .map(|(key, value)| (key.clone(), sanitize_component(value)))
        .collect();
    let relative = interpolate(template, &sanitized)?;
    Ok(output_dir.join(relative))
}

fn sanitize_component(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|ch| match ch {
            '/' | '\\' => '-',
            ch if ch.is_control() => '-',
            ch => ch,
        })
        .collect();

    if !cleaned.is_empty() && cleaned.chars().all(|ch| ch == '.') {
        "-".repeat(cleaned.len())
    } else {
        cleaned
    }
}

/// A task with every template filled in for one kickoff.
pub(crate) struct RenderedTask {
    pub name: String,
    pub description: String,
    pub expected_output: String,
    pub agent: AgentSpec,
    pub tools: Vec<Arc<dyn Tool>>,
    pub output_path: Option<PathBuf>,
    pub async_execution: bool,
}

impl RenderedTask {
    pub(crate) fn prompt(&self, context: &str) -> String {
        let mut prompt = format!(
            "{}\n\nThis is the expected criteria for your final answer: {}\n\
             You MUST return the actual complete content as the final answer, not a summary.",
            self.description, self.expected_output
        );
        if !context.trim().is_empty() {
            prompt.push_str("\n\nThis is the context you're working with:\n");
            prompt.push_str(context);
        }
        prompt
    }

    #[instrument(name = "task.execute", skip_all, fields(task = %self.name, agent = %self.agent.role))]
    pub(crate) async fn execute(
        &self,
        model: &dyn ChatModel,
        context: &str,
    ) -> Result<TaskOutput, CrewError> {
        info!("task started");

        let answer = AgentExecutor::new(&self.agent, model)
            .with_tools(&self.tools)
            .execute(&self.prompt(context))
            .await?;

        if let Some(path) = &self.output_path {
            write_output(path, &answer.text).await?;
            info!(path = %path.display(), "task output written");
        }

        info!(
            iterations = answer.iterations,
            total_tokens = answer.usage.total(),
            "task completed"
        );

        Ok(TaskOutput {
            name: self.name.clone(),
            agent: self.agent.role.clone(),
            description: self.description.clone(),
            expected_output: self.expected_output.clone(),
            raw: answer.text,
            output_path: self.output_path.clone(),
            usage: answer.usage,
        })
    }
}

async fn write_output(path: &Path, contents: &str) -> Result<(), CrewError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| CrewError::output(path.to_path_buf(), err))?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|err| CrewError::output(path.to_path_buf(), err))
}

/// Result of one executed task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutput {
    pub name: String,
    pub agent: String,
    pub description: String,
    pub expected_output: String,
    pub raw: String,
    pub output_path: Option<PathBuf>,
    pub usage: TokenUsage,
}
