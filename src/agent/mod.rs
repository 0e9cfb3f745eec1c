pub mod tools;

use anyhow::{Result, bail};
use reqwest::Client;
use tracing::{debug, info};

use crate::config::Config;
use crate::model::Message;
use crate::model_gateway::{HostModelGateway, ModelGateway, ModelGatewayRequest};
use tools::{ToolRunner, WikipediaRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Generate,
    InvokeTool,
    Done,
}

impl CycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::InvokeTool => "invoke_tool",
            Self::Done => "done",
        }
    }
}

/// Messages exchanged for one question. Append-only: nothing is removed,
/// reordered or truncated, and the whole sequence is sent on every
/// generation step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Text of the terminal message, which is what the user is shown.
    pub fn answer(&self) -> &str {
        self.last().map(|msg| msg.content.as_str()).unwrap_or_default()
    }
}

/// Routes `Generate` to `InvokeTool` when the latest reply asks for a tool.
pub fn tools_condition(message: &Message) -> bool {
    message.is_tool_request()
}

pub struct Agent<'a> {
    gateway: &'a dyn ModelGateway,
    tools: &'a dyn ToolRunner,
    system_prompt: &'a str,
    max_tool_rounds: usize,
}

impl<'a> Agent<'a> {
    pub fn new(gateway: &'a dyn ModelGateway, tools: &'a dyn ToolRunner, cfg: &'a Config) -> Self {
        Self {
            gateway,
            tools,
            system_prompt: &cfg.system_prompt,
            max_tool_rounds: cfg.max_tool_rounds,
        }
    }

    /// Runs the cycle to completion and returns the finished conversation.
    pub async fn ask(&self, question: &str) -> Result<Conversation> {
        self.run(question, |_| {}).await
    }

    /// Like [`Agent::ask`], but hands every message to `on_message` as it is
    /// appended, in order.
    pub async fn run<F>(&self, question: &str, mut on_message: F) -> Result<Conversation>
    where
        F: FnMut(&Message),
    {
        let question = question.trim();
        if question.is_empty() {
            bail!("Question must not be empty");
        }

        let mut conversation = Conversation::default();
        if !self.system_prompt.trim().is_empty() {
            append(
                &mut conversation,
                Message::system(self.system_prompt),
                &mut on_message,
            );
        }
        append(&mut conversation, Message::user(question), &mut on_message);

        let definitions = self.tools.definitions();
        let mut tool_rounds = 0;
        let mut state = CycleState::Generate;

        loop {
            debug!(
                state = state.as_str(),
                message_count = conversation.len(),
                "conversation step"
            );

            let next = match state {
                CycleState::Generate => {
                    let response = self
                        .gateway
                        .chat(ModelGatewayRequest {
                            messages: conversation.messages(),
                            tools: &definitions,
                        })
                        .await?;
                    let next = if tools_condition(&response.message) {
                        CycleState::InvokeTool
                    } else {
                        CycleState::Done
                    };
                    append(&mut conversation, response.message, &mut on_message);
                    next
                }
                CycleState::InvokeTool => {
                    tool_rounds += 1;
                    if tool_rounds > self.max_tool_rounds {
                        bail!(
                            "Model kept requesting tools after {} rounds (MAX_TOOL_ROUNDS={}).",
                            self.max_tool_rounds,
                            self.max_tool_rounds
                        );
                    }
                    self.invoke_tools(&mut conversation, &mut on_message).await;
                    CycleState::Generate
                }
                CycleState::Done => return Ok(conversation),
            };

            info!(
                from = state.as_str(),
                to = next.as_str(),
                message_count = conversation.len(),
                "conversation transition"
            );
            state = next;
        }
    }

    async fn invoke_tools<F>(&self, conversation: &mut Conversation, on_message: &mut F)
    where
        F: FnMut(&Message),
    {
        let calls = conversation
            .last()
            .map(|msg| msg.tool_calls.clone())
            .unwrap_or_default();

        for call in &calls {
            let content = match self.tools.execute(call).await {
                Ok(output) => output.content,
                Err(err) => format!("ERROR: {err}"),
            };
            append(conversation, Message::tool(call.id.clone(), content), on_message);
        }
    }
}

fn append<F>(conversation: &mut Conversation, message: Message, on_message: &mut F)
where
    F: FnMut(&Message),
{
    on_message(&message);
    conversation.push(message);
}

/// Answers one question with the configured provider and the Wikipedia tool.
pub async fn answer(client: &Client, cfg: &Config, question: &str) -> Result<Conversation> {
    answer_with(client, cfg, question, |_| {}).await
}

pub async fn answer_with<F>(
    client: &Client,
    cfg: &Config,
    question: &str,
    on_message: F,
) -> Result<Conversation>
where
    F: FnMut(&Message),
{
    let gateway = HostModelGateway::new(client, cfg);
    let runner = WikipediaRunner::new(client, &cfg.wiki);
    Agent::new(&gateway, &runner, cfg)
        .run(question, on_message)
        .await
}
