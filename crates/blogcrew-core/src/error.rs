use std::path::PathBuf;

use thiserror::Error;

/// Core error type for BlogCrew.
///
/// Errors raised while running a crew propagate unchanged to the caller; the
/// HTTP layer renders `to_string()` of whatever reaches it.
#[derive(Debug, Error)]
pub enum CrewError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("template references unknown input `{0}`")]
    MissingInput(String),
    #[error("language model request failed: {0}")]
    Model(String),
    #[error("tool `{tool}` failed: {reason}")]
    Tool { tool: String, reason: String },
    #[error("agent `{role}` returned an empty answer")]
    EmptyAnswer { role: String },
    #[error("failed to write task output to {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CrewError {
    pub fn tool(tool: impl Into<String>, reason: impl ToString) -> Self {
        Self::Tool {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }

    pub fn output(path: PathBuf, source: std::io::Error) -> Self {
        Self::Output { path, source }
    }
}

/// Render an error followed by each of its `source()` causes, `outer: inner`.
///
/// Transport errors put the useful part (timeouts, refused connections) in
/// the causes, not the top-level message.
pub(crate) fn error_chain(err: impl std::error::Error + Send + Sync + 'static) -> String {
    format!("{:#}", anyhow::Error::from(err))
}
