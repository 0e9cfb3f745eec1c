use anyhow::{Result, bail};
use secrecy::SecretString;
use std::env;

pub const API_KEY_VAR: &str = "GROQ_API_KEY";

const DEFAULT_MODEL_PROVIDER: &str = "groq";
const DEFAULT_MODEL: &str = "mixtral-8x7b-32768";
const DEFAULT_MODEL_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_MODEL_TEMPERATURE: f32 = 0.0;
const DEFAULT_MODEL_MAX_RETRIES: u32 = 2;
const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;
const DEFAULT_WIKI_API_URL: &str = "https://en.wikipedia.org/w/api.php";
const DEFAULT_WIKI_TOP_K_RESULTS: usize = 1;
const DEFAULT_WIKI_DOC_CHARS_MAX: usize = 200;
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8501";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiConfig {
    pub api_url: String,
    pub top_k_results: usize,
    pub doc_chars_max: usize,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_WIKI_API_URL.to_string(),
            top_k_results: DEFAULT_WIKI_TOP_K_RESULTS,
            doc_chars_max: DEFAULT_WIKI_DOC_CHARS_MAX,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: SecretString,
    pub model_provider: String,
    pub model: String,
    pub model_base_url: String,
    pub model_temperature: f32,
    pub model_max_retries: u32,
    /// `None` leaves model calls without a client-side timeout.
    pub model_timeout_secs: Option<u64>,
    pub system_prompt: String,
    pub max_tool_rounds: usize,
    pub wiki: WikiConfig,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Result<Self> {
        let Some(api_key) = get_var(API_KEY_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
        else {
            bail!(
                "{} is not set. Export it or add it to a .env file in the working directory.",
                API_KEY_VAR
            );
        };

        let wiki = WikiConfig {
            api_url: get_var("WIKI_API_URL").unwrap_or_else(|| DEFAULT_WIKI_API_URL.to_string()),
            top_k_results: parse_positive_usize(
                get_var("WIKI_TOP_K_RESULTS").as_deref(),
                DEFAULT_WIKI_TOP_K_RESULTS,
            ),
            doc_chars_max: parse_positive_usize(
                get_var("WIKI_DOC_CHARS_MAX").as_deref(),
                DEFAULT_WIKI_DOC_CHARS_MAX,
            ),
        };

        Ok(Self {
            api_key: SecretString::new(api_key),
            model_provider: get_var("MODEL_PROVIDER")
                .unwrap_or_else(|| DEFAULT_MODEL_PROVIDER.to_string()),
            model: get_var("MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            model_base_url: get_var("MODEL_BASE_URL")
                .unwrap_or_else(|| DEFAULT_MODEL_BASE_URL.to_string()),
            model_temperature: parse_temperature(get_var("MODEL_TEMPERATURE").as_deref()),
            model_max_retries: parse_max_retries(get_var("MODEL_MAX_RETRIES").as_deref()),
            model_timeout_secs: parse_optional_timeout_secs(
                get_var("MODEL_TIMEOUT_SECS").as_deref(),
            ),
            system_prompt: get_var("SYSTEM_PROMPT").unwrap_or_default(),
            max_tool_rounds: parse_positive_usize(
                get_var("MAX_TOOL_ROUNDS").as_deref(),
                DEFAULT_MAX_TOOL_ROUNDS,
            ),
            wiki,
            bind_addr: get_var("BIND_ADDR")
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
    }
}

fn parse_positive_usize(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn parse_optional_timeout_secs(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
}

fn parse_max_retries(raw: Option<&str>) -> u32 {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(DEFAULT_MODEL_MAX_RETRIES)
}

fn parse_temperature(raw: Option<&str>) -> f32 {
    raw.and_then(|value| value.trim().parse::<f32>().ok())
        .filter(|value| value.is_finite() && *value >= 0.0)
        .unwrap_or(DEFAULT_MODEL_TEMPERATURE)
}
