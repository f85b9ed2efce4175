use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::{CrewError, SecretValue};

const MODEL_KEY_ENV: &str = "GROQ_API_KEY";
const SEARCH_KEY_ENV: &str = "SERPER_API_KEY";

/// Configuration for the crew's external collaborators.
///
/// Credentials are optional at load time: a missing key only fails the first
/// call that needs it, so the service can start without them.
#[derive(Debug, Clone)]
pub struct CrewConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<SecretValue>,
    pub api_key_env: String,
    pub temperature: Option<f32>,
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub base_url: String,
    pub api_key: Option<SecretValue>,
    pub api_key_env: String,
    pub results: usize,
    pub request_timeout: Option<Duration>,
}

impl CrewConfig {
    const DEFAULT_MODEL: &'static str = "llama3-70b-8192";
    const DEFAULT_LLM_BASE_URL: &'static str = "https://api.groq.com/openai/v1";
    const DEFAULT_SEARCH_BASE_URL: &'static str = "https://google.serper.dev";
    const DEFAULT_SEARCH_RESULTS: usize = 10;
    const DEFAULT_OUTPUT_DIR: &'static str = ".";

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, CrewError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CrewError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let request_timeout =
            parse_var::<u64>(&get, "BLOGCREW_HTTP_TIMEOUT_SECS")?.map(Duration::from_secs);

        let llm = LlmConfig {
            base_url: get("GROQ_BASE_URL")
                .unwrap_or_else(|| Self::DEFAULT_LLM_BASE_URL.to_string()),
            model: get("GROQ_MODEL").unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
            api_key: get(MODEL_KEY_ENV).and_then(SecretValue::new),
            api_key_env: MODEL_KEY_ENV.to_string(),
            temperature: parse_var::<f32>(&get, "GROQ_TEMPERATURE")?,
            request_timeout,
        };

        let results = parse_var::<usize>(&get, "SERPER_RESULTS")?
            .unwrap_or(Self::DEFAULT_SEARCH_RESULTS);
        if results == 0 {
            return Err(CrewError::InvalidConfiguration(
                "SERPER_RESULTS must be greater than zero".into(),
            ));
        }

        let search = SearchConfig {
            base_url: get("SERPER_BASE_URL")
                .unwrap_or_else(|| Self::DEFAULT_SEARCH_BASE_URL.to_string()),
            api_key: get(SEARCH_KEY_ENV).and_then(SecretValue::new),
            api_key_env: SEARCH_KEY_ENV.to_string(),
            results,
            request_timeout,
        };

        let output_dir = get("BLOGCREW_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_OUTPUT_DIR));

        Ok(Self {
            llm,
            search,
            output_dir,
        })
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, CrewError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|err| {
                CrewError::InvalidConfiguration(format!("{key}={raw:?} is invalid: {err}"))
            })
        })
        .transpose()
}
