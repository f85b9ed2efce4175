//! The research-then-write blog crew.

use std::{path::PathBuf, sync::Arc};

use tracing::info;

use crate::{
    AgentSpec, ChatModel, Crew, CrewConfig, CrewError, CrewOutput, Inputs, OpenAiChat,
    SerperSearch, TaskSpec, Tool,
};

pub fn researcher(search: Arc<dyn Tool>) -> AgentSpec {
    AgentSpec::new(
        "Senior Researcher",
        "Uncover groundbreaking technologies in {topic}",
        "Driven by curiosity, you're at the forefront of innovation, eager to explore and \
         share knowledge that could change the world.",
    )
    .with_tool(search)
    .max_iter(5)
    .verbose(true)
}

pub fn writer() -> AgentSpec {
    AgentSpec::new(
        "Writer",
        "Narrate compelling tech stories about {topic}",
        "With a flair for simplifying complex topics, you craft engaging narratives that \
         captivate and educate, bringing new discoveries to light in an accessible manner.",
    )
    .allow_delegation(false)
    .verbose(true)
}

pub fn research_task(agent: Arc<AgentSpec>, search: Arc<dyn Tool>) -> TaskSpec {
    TaskSpec::new(
        "research",
        "Identify the next big trend in {topic}. Focus on identifying pros and cons and the \
         overall narrative. Your final report should clearly articulate the key points, its \
         market opportunities, and potential risks.",
        "A comprehensive 3-paragraph report on the latest trends in {topic}.",
        agent,
    )
    .with_tools(vec![search])
}

pub fn write_task(agent: Arc<AgentSpec>) -> TaskSpec {
    TaskSpec::new(
        "write",
        "Compose an insightful article on {topic}. Focus on the latest trends and how they're \
         impacting the industry. This article should be easy to understand, engaging, and \
         positive.",
        "A 4-paragraph article on {topic} advancements formatted as markdown.",
        agent,
    )
    .async_execution(false)
    .with_output_file("new-blog-post-about-{topic}.md")
}

/// Researcher + Writer crew, built once and shared across requests.
pub struct BlogCrew {
    crew: Crew,
}

impl BlogCrew {
    pub fn new(
        model: Arc<dyn ChatModel>,
        search: Arc<dyn Tool>,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, CrewError> {
        let researcher = Arc::new(researcher(search.clone()));
        let writer = Arc::new(writer());

        let crew = Crew::new(
            vec![researcher.clone(), writer.clone()],
            vec![research_task(researcher, search), write_task(writer)],
            model,
            output_dir,
        )?;

        Ok(Self { crew })
    }

    /// Build the crew against the hosted model and search APIs.
    pub fn from_config(config: &CrewConfig) -> Result<Self, CrewError> {
        let model = Arc::new(OpenAiChat::from_config(&config.llm)?);
        let search = Arc::new(SerperSearch::from_config(&config.search)?);
        info!(
            model = %config.llm.model,
            output_dir = %config.output_dir.display(),
            "blog crew configured"
        );
        Self::new(model, search, config.output_dir.clone())
    }

    pub fn crew(&self) -> &Crew {
        &self.crew
    }

    pub fn model_name(&self) -> &str {
        self.crew.model().model_name()
    }

    /// Research `topic`, then write the article about it.
    pub async fn run(&self, topic: &str) -> Result<CrewOutput, CrewError> {
        let inputs = Inputs::from([("topic".to_string(), topic.to_string())]);
        self.crew.kickoff(&inputs).await
    }
}
