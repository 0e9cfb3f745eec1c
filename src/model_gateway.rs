use anyhow::Result;
use reqwest::Client;
use std::future::Future;
use std::pin::Pin;

use crate::config::Config;
use crate::model::{self, Message, ToolDefinition};

pub struct ModelGatewayRequest<'a> {
    pub messages: &'a [Message],
    pub tools: &'a [ToolDefinition],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelGatewayResponse {
    pub message: Message,
}

pub type ModelGatewayFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ModelGatewayResponse>> + Send + 'a>>;

/// Produces the next assistant message for a conversation. The conversation
/// cycle only talks to the model through this trait.
pub trait ModelGateway: Send + Sync {
    fn chat<'a>(&'a self, request: ModelGatewayRequest<'a>) -> ModelGatewayFuture<'a>;
}

type ModelChatFuture<'a> = Pin<Box<dyn Future<Output = Result<Message>> + Send + 'a>>;

trait ChatBackend: Send + Sync {
    fn chat<'a>(
        &'a self,
        client: &'a Client,
        cfg: &'a Config,
        messages: &'a [Message],
        tools: &'a [ToolDefinition],
    ) -> ModelChatFuture<'a>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderChatBackend;

impl ChatBackend for ProviderChatBackend {
    fn chat<'a>(
        &'a self,
        client: &'a Client,
        cfg: &'a Config,
        messages: &'a [Message],
        tools: &'a [ToolDefinition],
    ) -> ModelChatFuture<'a> {
        Box::pin(async move { model::chat(client, cfg, messages, tools).await })
    }
}

pub struct HostModelGateway<'a, B = ProviderChatBackend> {
    client: &'a Client,
    cfg: &'a Config,
    backend: B,
}

impl<'a> HostModelGateway<'a, ProviderChatBackend> {
    pub fn new(client: &'a Client, cfg: &'a Config) -> Self {
        Self {
            client,
            cfg,
            backend: ProviderChatBackend,
        }
    }
}

impl<'a, B> HostModelGateway<'a, B> {
    #[cfg(test)]
    fn with_backend(client: &'a Client, cfg: &'a Config, backend: B) -> Self {
        Self {
            client,
            cfg,
            backend,
        }
    }
}

impl<'a, B> ModelGateway for HostModelGateway<'a, B>
where
    B: ChatBackend,
{
    fn chat<'b>(&'b self, request: ModelGatewayRequest<'b>) -> ModelGatewayFuture<'b> {
        Box::pin(async move {
            let message = self
                .backend
                .chat(self.client, self.cfg, request.messages, request.tools)
                .await?;
            Ok(ModelGatewayResponse { message })
        })
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::{
        ChatBackend, HostModelGateway, ModelChatFuture, ModelGateway, ModelGatewayRequest,
    };
    use crate::config::Config;
    use crate::model::{Message, ToolDefinition};

    #[derive(Debug)]
    enum StubOutcome {
        Ok(Message),
        Err(String),
    }

    #[derive(Debug)]
    struct StubBackend {
        calls: Mutex<Vec<(Vec<Message>, usize)>>,
        outcome: StubOutcome,
    }

    impl StubBackend {
        fn ok(message: Message) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                outcome: StubOutcome::Ok(message),
            }
        }

        fn err(message: impl Into<String>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                outcome: StubOutcome::Err(message.into()),
            }
        }
    }

    impl ChatBackend for StubBackend {
        fn chat<'a>(
            &'a self,
            _client: &'a reqwest::Client,
            _cfg: &'a Config,
            messages: &'a [Message],
            tools: &'a [ToolDefinition],
        ) -> ModelChatFuture<'a> {
            self.calls
                .lock()
                .expect("calls lock")
                .push((messages.to_vec(), tools.len()));
            let result = match &self.outcome {
                StubOutcome::Ok(message) => Ok(message.clone()),
                StubOutcome::Err(message) => Err(anyhow!(message.clone())),
            };
            Box::pin(async move { result })
        }
    }

    fn test_config() -> Config {
        let vars = HashMap::from([("GROQ_API_KEY", "gsk-test")]);
        Config::from_env_with(|key| vars.get(key).map(|value| value.to_string()))
            .expect("config should load")
    }

    #[tokio::test]
    async fn host_gateway_forwards_messages_and_tools() {
        let client = reqwest::Client::new();
        let cfg = test_config();
        let gateway =
            HostModelGateway::with_backend(&client, &cfg, StubBackend::ok(Message::assistant("hello")));
        let messages = vec![
            Message::system("sys"),
            Message::user("hi"),
            Message::tool("call_1", "result"),
        ];
        let tools = vec![ToolDefinition {
            name: "wikipedia".to_string(),
            description: "lookup".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        }];

        let response = gateway
            .chat(ModelGatewayRequest {
                messages: &messages,
                tools: &tools,
            })
            .await
            .expect("gateway chat should succeed");

        assert_eq!(response.message, Message::assistant("hello"));
        let calls = gateway.backend.calls.lock().expect("calls lock");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, messages);
        assert_eq!(calls[0].1, 1);
    }

    #[tokio::test]
    async fn host_gateway_preserves_backend_errors() {
        let client = reqwest::Client::new();
        let cfg = test_config();
        let gateway =
            HostModelGateway::with_backend(&client, &cfg, StubBackend::err("backend failure"));

        let err = gateway
            .chat(ModelGatewayRequest {
                messages: &[Message::user("ping")],
                tools: &[],
            })
            .await
            .expect_err("gateway chat should fail");

        let msg = format!("{err:#}");
        assert!(
            msg.contains("backend failure"),
            "unexpected error message: {msg}"
        );
        assert_eq!(gateway.backend.calls.lock().expect("calls lock").len(), 1);
    }
}
