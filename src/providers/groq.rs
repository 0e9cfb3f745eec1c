use anyhow::{Context, Result};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::model::{Message, ToolCall, ToolDefinition};
use crate::providers::http_errors::{
    is_transient_request_error, is_transient_status, model_api_request_error,
    model_api_status_error,
};
use crate::providers::retry::{RetryPolicy, transient};

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

fn function_type() -> String {
    "function".to_string()
}

fn chat_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

fn to_wire_message(msg: &Message) -> WireMessage {
    let tool_calls = (!msg.tool_calls.is_empty()).then(|| {
        msg.tool_calls
            .iter()
            .map(|call| WireToolCall {
                id: call.id.clone(),
                kind: function_type(),
                function: WireFunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            })
            .collect()
    });

    // Assistant turns that only carry tool calls are sent with a null content.
    let content = if tool_calls.is_some() && msg.content.is_empty() {
        None
    } else {
        Some(msg.content.clone())
    };

    WireMessage {
        role: msg.role.as_str().to_string(),
        content,
        tool_calls,
        tool_call_id: msg.tool_call_id.clone(),
    }
}

fn to_wire_tools(tools: &[ToolDefinition]) -> Vec<WireTool<'_>> {
    tools
        .iter()
        .map(|tool| WireTool {
            kind: "function",
            function: WireFunction {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.parameters,
            },
        })
        .collect()
}

fn from_wire_message(wire: WireMessage) -> Message {
    let content = wire.content.unwrap_or_default();
    let tool_calls: Vec<ToolCall> = wire
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect();

    if tool_calls.is_empty() {
        Message::assistant(content)
    } else {
        Message::assistant_tool_calls(content, tool_calls)
    }
}

fn build_request<'a>(
    cfg: &'a Config,
    messages: &[Message],
    tools: &'a [ToolDefinition],
) -> ChatCompletionRequest<'a> {
    ChatCompletionRequest {
        model: &cfg.model,
        temperature: cfg.model_temperature,
        messages: messages.iter().map(to_wire_message).collect(),
        tools: to_wire_tools(tools),
        tool_choice: (!tools.is_empty()).then_some("auto"),
    }
}

async fn send_once(
    client: &Client,
    cfg: &Config,
    api_url: &str,
    body: &ChatCompletionRequest<'_>,
) -> Result<Message> {
    let mut request = client
        .post(api_url)
        .bearer_auth(cfg.api_key.expose_secret())
        .json(body);
    if let Some(secs) = cfg.model_timeout_secs {
        request = request.timeout(Duration::from_secs(secs));
    }

    let response = request.send().await.map_err(|err| {
        warn!(
            api_url = %api_url,
            model = %cfg.model,
            error = %err,
            "groq request failed"
        );
        let retry = is_transient_request_error(&err);
        let mapped = model_api_request_error(err, api_url, cfg.model_timeout_secs);
        if retry {
            transient(mapped)
        } else {
            mapped
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let response_body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());
        warn!(
            api_url = %api_url,
            model = %cfg.model,
            status = %status,
            response_body_len = response_body.len(),
            "groq returned non-success status"
        );
        let err = model_api_status_error(status, &response_body);
        return Err(if is_transient_status(status) {
            transient(err)
        } else {
            err
        });
    }

    let parsed: ChatCompletionResponse = response
        .json()
        .await
        .context("Failed to parse model chat response")?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .context("Model response had no choices")?;

    Ok(from_wire_message(choice.message))
}

pub async fn chat(
    client: &Client,
    cfg: &Config,
    messages: &[Message],
    tools: &[ToolDefinition],
) -> Result<Message> {
    let api_url = chat_url(&cfg.model_base_url);
    let body = build_request(cfg, messages, tools);
    debug!(
        api_url = %api_url,
        model = %cfg.model,
        message_count = messages.len(),
        tool_count = tools.len(),
        "sending groq chat request"
    );

    let (api_url, body) = (api_url.as_str(), &body);
    let reply = RetryPolicy::new(cfg.model_max_retries)
        .run(|| send_once(client, cfg, api_url, body))
        .await?;

    debug!(
        model = %cfg.model,
        response_len = reply.content.len(),
        tool_calls = reply.tool_calls.len(),
        "received groq chat response"
    );
    Ok(reply)
}
