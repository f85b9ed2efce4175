//! Sequential crew orchestration.

use std::{fmt, path::PathBuf, sync::Arc};

use futures::future::try_join_all;
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    AgentSpec, ChatModel, CrewError, Inputs, TaskOutput, TaskSpec, TokenUsage,
    task::RenderedTask,
};

const CONTEXT_SEPARATOR: &str = "\n\n----------\n\n";

/// Result of a full kickoff.
#[derive(Debug, Clone, Serialize)]
pub struct CrewOutput {
    /// Output of the last task.
    pub raw: String,
    pub tasks_output: Vec<TaskOutput>,
    pub token_usage: TokenUsage,
}

impl fmt::Display for CrewOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// An ordered list of tasks run one after another, each seeing the outputs of
/// the tasks before it.
pub struct Crew {
    agents: Vec<Arc<AgentSpec>>,
    tasks: Vec<TaskSpec>,
    model: Arc<dyn ChatModel>,
    output_dir: PathBuf,
}

impl Crew {
    pub fn new(
        agents: Vec<Arc<AgentSpec>>,
        tasks: Vec<TaskSpec>,
        model: Arc<dyn ChatModel>,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, CrewError> {
        if tasks.is_empty() {
            return Err(CrewError::InvalidConfiguration(
                "a crew needs at least one task".into(),
            ));
        }

        if let Some(orphan) = tasks
            .iter()
            .find(|task| !agents.iter().any(|agent| agent.role == task.agent.role))
        {
            return Err(CrewError::InvalidConfiguration(format!(
                "task `{}` is bound to agent `{}` which is not part of the crew",
                orphan.name, orphan.agent.role
            )));
        }

        Ok(Self {
            agents,
            tasks,
            model,
            output_dir: output_dir.into(),
        })
    }

    pub fn agents(&self) -> &[Arc<AgentSpec>] {
        &self.agents
    }

    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    pub fn model(&self) -> &dyn ChatModel {
        self.model.as_ref()
    }

    /// Run every task in declared order with the given inputs.
    ///
    /// All templates are rendered before the first task starts. The first
    /// error stops the run and is returned as-is.
    #[instrument(
        name = "crew.kickoff",
        skip(self, inputs),
        fields(run_id = %Uuid::new_v4(), tasks = self.tasks.len())
    )]
    pub async fn kickoff(&self, inputs: &Inputs) -> Result<CrewOutput, CrewError> {
        let rendered = self
            .tasks
            .iter()
            .map(|task| task.render(inputs, &self.output_dir))
            .collect::<Result<Vec<_>, _>>()?;

        info!(inputs = ?inputs, "crew kickoff");

        let mut outputs: Vec<TaskOutput> = Vec::with_capacity(rendered.len());
        let mut pending: Vec<&RenderedTask> = Vec::new();

        for task in &rendered {
            if task.async_execution {
                pending.push(task);
                continue;
            }

            self.run_batch(&mut pending, &mut outputs).await?;
            let context = aggregate_context(&outputs);
            outputs.push(task.execute(self.model.as_ref(), &context).await?);
        }
        self.run_batch(&mut pending, &mut outputs).await?;

        let mut token_usage = TokenUsage::default();
        for output in &outputs {
            token_usage.add(output.usage);
        }
        let raw = outputs
            .last()
            .map(|output| output.raw.clone())
            .unwrap_or_default();

        info!(
            total_tokens = token_usage.total(),
            tasks = outputs.len(),
            "crew finished"
        );

        Ok(CrewOutput {
            raw,
            tasks_output: outputs,
            token_usage,
        })
    }

    /// Run queued async tasks concurrently; they share the context available
    /// when the batch started.
    async fn run_batch(
        &self,
        pending: &mut Vec<&RenderedTask>,
        outputs: &mut Vec<TaskOutput>,
    ) -> Result<(), CrewError> {
        if pending.is_empty() {
            return Ok(());
        }

        let context = aggregate_context(outputs);
        let batch = pending
            .drain(..)
            .map(|task| task.execute(self.model.as_ref(), &context))
            .collect::<Vec<_>>();
        outputs.extend(try_join_all(batch).await?);
        Ok(())
    }
}

fn aggregate_context(outputs: &[TaskOutput]) -> String {
    outputs
        .iter()
        .map(|output| output.raw.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChatMessage, ChatRequest, ChatResponse};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers each request with the role found in its system prompt, and
    /// records the user prompt it was given.
    #[derive(Default)]
    struct RoleEcho {
        prompts: Mutex<Vec<String>>,
        fail_for: Option<&'static str>,
    }

    #[async_trait]
    impl ChatModel for RoleEcho {
        async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, CrewError> {
            let system = request.messages[0].content.clone().unwrap_or_default();
            let user = request.messages[1].content.clone().unwrap_or_default();
            self.prompts.lock().unwrap().push(user);

            if let Some(role) = self.fail_for {
                if system.contains(role) {
                    return Err(CrewError::Model(format!("{role} timed out")));
                }
            }

            let role = system
                .trim_start_matches("You are ")
                .split('.')
                .next()
                .unwrap_or_default()
                .to_string();
            Ok(ChatResponse {
                message: ChatMessage::assistant(format!("output of {role}")),
                finish_reason: Some("stop".into()),
                usage: Some(TokenUsage {
                    prompt_tokens: 1,
                    completion_tokens: 1,
                }),
            })
        }

        fn model_name(&self) -> &str {
            "role-echo"
        }
    }

    fn agent(role: &str) -> Arc<AgentSpec> {
        Arc::new(AgentSpec::new(role, "goal for {topic}", "story"))
    }

    fn inputs() -> Inputs {
        Inputs::from([("topic".to_string(), "AI".to_string())])
    }

    #[test]
    fn tasks_must_use_crew_agents() {
        let outsider = agent("Outsider");
        let err = Crew::new(
            vec![agent("Member")],
            vec![TaskSpec::new("t", "d", "e", outsider)],
            Arc::new(RoleEcho::default()),
            ".",
        )
        .err()
        .expect("orphan task should be rejected");
        assert!(err.to_string().contains("Outsider"));

        let err = Crew::new(vec![], vec![], Arc::new(RoleEcho::default()), ".")
            .err()
            .expect("empty crew should be rejected");
        assert!(matches!(err, CrewError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn outputs_flow_forward_in_order() {
        let model = Arc::new(RoleEcho::default());
        let (first, second, third) = (agent("First"), agent("Second"), agent("Third"));
        let crew = Crew::new(
            vec![first.clone(), second.clone(), third.clone()],
            vec![
                TaskSpec::new("a", "Step one on {topic}", "x", first),
                TaskSpec::new("b", "Step two on {topic}", "x", second),
                TaskSpec::new("c", "Step three on {topic}", "x", third),
            ],
            model.clone(),
            ".",
        )
        .unwrap();

        let output = crew.kickoff(&inputs()).await.unwrap();
        assert_eq!(output.raw, "output of Third");
        assert_eq!(output.tasks_output.len(), 3);
        assert_eq!(output.token_usage.total(), 6);

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].starts_with("Step one on AI"));
        assert!(!prompts[0].contains("context you're working with"));
        assert!(prompts[1].ends_with("output of First"));
        assert!(prompts[2].ends_with("output of First\n\n----------\n\noutput of Second"));
    }

    #[tokio::test]
    async fn first_failure_stops_the_pipeline() {
        let model = Arc::new(RoleEcho {
            fail_for: Some("First"),
            ..RoleEcho::default()
        });
        let (first, second) = (agent("First"), agent("Second"));
        let crew = Crew::new(
            vec![first.clone(), second.clone()],
            vec![
                TaskSpec::new("a", "one", "x", first),
                TaskSpec::new("b", "two", "x", second),
            ],
            model.clone(),
            ".",
        )
        .unwrap();

        let err = crew.kickoff(&inputs()).await.unwrap_err();
        assert_eq!(err.to_string(), "language model request failed: First timed out");
        assert_eq!(model.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn template_errors_surface_before_any_model_call() {
        let model = Arc::new(RoleEcho::default());
        let (first, second) = (agent("First"), agent("Second"));
        let crew = Crew::new(
            vec![first.clone(), second.clone()],
            vec![
                TaskSpec::new("a", "one {topic}", "x", first),
                TaskSpec::new("b", "two {audience}", "x", second),
            ],
            model.clone(),
            ".",
        )
        .unwrap();

        let err = crew.kickoff(&inputs()).await.unwrap_err();
        assert!(matches!(err, CrewError::MissingInput(_)));
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn async_tasks_share_the_context_before_them() {
        let model = Arc::new(RoleEcho::default());
        let (first, second, third) = (agent("First"), agent("Second"), agent("Third"));
        let crew = Crew::new(
            vec![first.clone(), second.clone(), third.clone()],
            vec![
                TaskSpec::new("a", "one", "x", first).async_execution(true),
                TaskSpec::new("b", "two", "x", second).async_execution(true),
                TaskSpec::new("c", "three", "x", third),
            ],
            model.clone(),
            ".",
        )
        .unwrap();

        let output = crew.kickoff(&inputs()).await.unwrap();
        let names: Vec<_> = output.tasks_output.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);

        let prompts = model.prompts.lock().unwrap();
        let last = prompts.last().unwrap();
        assert!(last.ends_with("output of First\n\n----------\n\noutput of Second"));
        assert!(
            prompts[..2]
                .iter()
                .all(|prompt| !prompt.contains("context you're working with"))
        );
    }
}
