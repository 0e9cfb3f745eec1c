use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

use crate::config::WikiConfig;
use crate::model::{ToolCall, ToolDefinition};
use crate::wikipedia::WikipediaClient;

pub const WIKIPEDIA_TOOL: &str = "wikipedia";

const WIKIPEDIA_DESCRIPTION: &str = "A wrapper around Wikipedia. Useful for when you need to \
answer general questions about people, places, companies, facts, historical events, or other \
subjects. Input should be a search query.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
}

impl ToolOutput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolExecutionError {
    message: String,
}

impl ToolExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ToolExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ToolExecutionError {}

pub type ToolExecutionResult = std::result::Result<ToolOutput, ToolExecutionError>;
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = ToolExecutionResult> + Send + 'a>>;

pub trait ToolRunner: Send + Sync {
    fn definitions(&self) -> Vec<ToolDefinition>;
    fn execute<'a>(&'a self, call: &'a ToolCall) -> ToolFuture<'a>;
}

#[derive(Debug, Deserialize)]
struct WikipediaArgs {
    query: String,
}

pub fn wikipedia_definition() -> ToolDefinition {
    ToolDefinition {
        name: WIKIPEDIA_TOOL.to_string(),
        description: WIKIPEDIA_DESCRIPTION.to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "query to look up on wikipedia"
                }
            },
            "required": ["query"]
        }),
    }
}

/// Accepts `{"query": "..."}`. Some models send the bare search term instead
/// of a JSON object, which is taken as the query verbatim.
fn parse_query(arguments: &str) -> Result<String, ToolExecutionError> {
    // Some models encode the arguments object as a JSON string.
    let decoded = arguments
        .trim()
        .starts_with('"')
        .then(|| serde_json::from_str::<String>(arguments.trim()).ok())
        .flatten();
    let trimmed = decoded.as_deref().unwrap_or(arguments).trim();
    if !trimmed.starts_with('{') {
        if trimmed.is_empty() {
            return Err(ToolExecutionError::new("wikipedia: missing query argument"));
        }
        return Ok(trimmed.trim_matches('"').to_string());
    }

    let args: WikipediaArgs = serde_json::from_str(trimmed)
        .map_err(|err| ToolExecutionError::new(format!("wikipedia: invalid arguments: {err}")))?;
    Ok(args.query)
}

pub struct WikipediaRunner<'a> {
    client: &'a Client,
    cfg: &'a WikiConfig,
}

impl<'a> WikipediaRunner<'a> {
    pub fn new(client: &'a Client, cfg: &'a WikiConfig) -> Self {
        Self { client, cfg }
    }
}

impl ToolRunner for WikipediaRunner<'_> {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![wikipedia_definition()]
    }

    fn execute<'a>(&'a self, call: &'a ToolCall) -> ToolFuture<'a> {
        Box::pin(async move {
            debug!(tool_name = %call.name, tool_call_id = %call.id, "running tool");

            if call.name != WIKIPEDIA_TOOL {
                warn!(tool_name = %call.name, "unknown tool requested");
                return Err(ToolExecutionError::new(format!(
                    "unknown tool '{}'",
                    call.name
                )));
            }

            let query = parse_query(&call.arguments)?;
            let content = WikipediaClient::new(self.client, self.cfg)
                .run(&query)
                .await
                .map_err(|err| ToolExecutionError::new(format!("{err:#}")))?;
            Ok(ToolOutput::new(content))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ToolCall, ToolRunner, WIKIPEDIA_TOOL, WikipediaRunner, parse_query, wikipedia_definition,
    };
    use crate::config::WikiConfig;

    #[test]
    fn parse_query_reads_json_object() {
        assert_eq!(
            parse_query(r#"{"query":"Alan Turing"}"#).expect("query"),
            "Alan Turing"
        );
    }

    #[test]
    fn parse_query_accepts_bare_search_term() {
        assert_eq!(parse_query(" \"Alan Turing\" ").expect("query"), "Alan Turing");
    }

    #[test]
    fn parse_query_unwraps_string_encoded_arguments() {
        assert_eq!(
            parse_query(r#""{\"query\":\"Alan Turing\"}""#).expect("query"),
            "Alan Turing"
        );
        assert!(parse_query(r#""""#).is_err());
    }

    #[test]
    fn parse_query_rejects_missing_field() {
        assert!(parse_query(r#"{"q":"Alan Turing"}"#).is_err());
    }

    #[test]
    fn parse_query_rejects_invalid_json() {
        assert!(parse_query(r#"{"query":}"#).is_err());
    }

    #[test]
    fn parse_query_rejects_empty_arguments() {
        assert!(parse_query("   ").is_err());
    }

    #[test]
    fn definition_requires_query() {
        let def = wikipedia_definition();
        assert_eq!(def.name, WIKIPEDIA_TOOL);
        assert_eq!(def.parameters["required"][0], "query");
        assert_eq!(def.parameters["properties"]["query"]["type"], "string");
    }

    #[tokio::test]
    async fn execute_unknown_tool_returns_error() {
        let client = reqwest::Client::new();
        let cfg = WikiConfig::default();
        let result = WikipediaRunner::new(&client, &cfg)
            .execute(&ToolCall {
                id: "call_1".to_string(),
                name: "calculator".to_string(),
                arguments: "{}".to_string(),
            })
            .await;

        let err = result.expect_err("unknown tool should fail");
        assert_eq!(err.to_string(), "unknown tool 'calculator'");
    }
}
