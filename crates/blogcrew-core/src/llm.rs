//! Chat-completion client abstraction.
//!
//! [`ChatModel`] is the seam between the agent loop and a hosted language
//! model. [`OpenAiChat`] speaks the OpenAI chat-completions dialect, which is
//! what Groq and most hosted providers expose.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{CrewError, LlmConfig, SecretValue, error::error_chain};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object, exactly as the model produced it.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Function description advertised to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// A hosted chat-completion model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, CrewError>;

    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: Role,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: FunctionCall,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

fn function_kind() -> String {
    "function".to_string()
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        let tool_calls = if message.tool_calls.is_empty() {
            None
        } else {
            Some(
                message
                    .tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        kind: function_kind(),
                        function: call.function.clone(),
                    })
                    .collect(),
            )
        };

        Self {
            role: message.role,
            content: message.content.clone(),
            tool_calls,
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

impl From<WireMessage> for ChatMessage {
    fn from(message: WireMessage) -> Self {
        Self {
            role: message.role,
            content: message.content,
            tool_calls: message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| ToolCall {
                    id: call.id,
                    function: call.function,
                })
                .collect(),
            tool_call_id: message.tool_call_id,
        }
    }
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChat {
    base_url: String,
    model: String,
    api_key: Option<SecretValue>,
    api_key_env: String,
    temperature: Option<f32>,
    http_client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            api_key_env: "GROQ_API_KEY".to_string(),
            temperature: None,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, CrewError> {
        let mut client = Self::new(config.base_url.clone(), config.model.clone());
        client.api_key = config.api_key.clone();
        client.api_key_env = config.api_key_env.clone();
        client.temperature = config.temperature;
        if let Some(timeout) = config.request_timeout {
            client = client.with_timeout(timeout)?;
        }
        Ok(client)
    }

    pub fn with_api_key(mut self, api_key: SecretValue) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, CrewError> {
        self.http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CrewError::InvalidConfiguration(format!("http client: {err}")))?;
        Ok(self)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_body<'a>(&'a self, request: &'a ChatRequest) -> WireRequest<'a> {
        WireRequest {
            model: &self.model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            tools: request
                .tools
                .iter()
                .map(|tool| WireTool {
                    kind: "function",
                    function: WireFunction {
                        name: &tool.name,
                        description: &tool.description,
                        parameters: &tool.parameters,
                    },
                })
                .collect(),
            temperature: request.temperature.or(self.temperature),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, CrewError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| CrewError::MissingSecret(self.api_key_env.clone()))?;

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending chat completion request"
        );

        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(api_key.expose())
            .json(&self.build_body(&request))
            .send()
            .await
            .map_err(|err| CrewError::Model(error_chain(err)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CrewError::Model(format!("HTTP {status}: {body}")));
        }

        let payload: WireResponse = response
            .json()
            .await
            .map_err(|err| {
                CrewError::Model(format!("undecodable response: {}", error_chain(err)))
            })?;

        let choice = payload
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CrewError::Model("response contained no choices".to_string()))?;

        Ok(ChatResponse {
            message: choice.message.into(),
            finish_reason: choice.finish_reason,
            usage: payload.usage,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> OpenAiChat {
        OpenAiChat::new("https://api.groq.com/openai/v1/", "llama3-70b-8192")
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        assert_eq!(
            client().endpoint(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn request_body_matches_openai_format() {
        let client = client();
        let request = ChatRequest {
            messages: vec![
                ChatMessage::system("You are a Writer."),
                ChatMessage::user("Write about AI"),
            ],
            tools: vec![ToolSpec {
                name: "search_the_internet".into(),
                description: "Search".into(),
                parameters: json!({"type": "object"}),
            }],
            temperature: Some(0.3),
        };

        let body = serde_json::to_value(client.build_body(&request)).unwrap();
        assert_eq!(body["model"], "llama3-70b-8192");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Write about AI");
        assert!(body["messages"][1].get("tool_calls").is_none());
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "search_the_internet");
        assert!((body["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn tool_round_trip_messages_serialize() {
        let client = client();
        let call = ToolCall {
            id: "call_1".into(),
            function: FunctionCall {
                name: "search_the_internet".into(),
                arguments: r#"{"search_query":"AI"}"#.into(),
            },
        };
        let request = ChatRequest {
            messages: vec![
                ChatMessage::assistant_tool_calls(None, vec![call]),
                ChatMessage::tool_result("call_1", "results"),
            ],
            ..ChatRequest::default()
        };

        let body = serde_json::to_value(client.build_body(&request)).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("temperature").is_none());
        assert_eq!(body["messages"][0]["tool_calls"][0]["type"], "function");
        assert_eq!(
            body["messages"][0]["tool_calls"][0]["function"]["arguments"],
            r#"{"search_query":"AI"}"#
        );
        assert_eq!(body["messages"][1]["role"], "tool");
        assert_eq!(body["messages"][1]["tool_call_id"], "call_1");
    }

    #[test]
    fn response_with_null_tool_calls_decodes() {
        let payload: WireResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "Final", "tool_calls": null},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }))
        .unwrap();

        let choice = payload.choices.into_iter().next().unwrap();
        let message: ChatMessage = choice.message.into();
        assert_eq!(message.content.as_deref(), Some("Final"));
        assert!(message.tool_calls.is_empty());
        assert_eq!(payload.usage.map(|u| u.total()), Some(15));
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let err = client()
            .complete(ChatRequest::default())
            .await
            .expect_err("missing key must fail");
        assert!(matches!(err, CrewError::MissingSecret(var) if var == "GROQ_API_KEY"));
    }
}
