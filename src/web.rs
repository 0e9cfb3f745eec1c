use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Router};
use handlebars::Handlebars;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::agent::{self, Conversation};
use crate::config::Config;
use crate::model::{Message, MessageRole};

const PAGE_TEMPLATE: &str = include_str!("../templates/page.hbs");
const PAGE: &str = "page";
const TITLE: &str = "LANG-GRAPH-CHATBOT🤖📚";
const SUBTITLE: &str = "Welcome! Ask me anything about Artificial Intelligence, and I'll find the best answer for you. 🚀";

pub struct AppState {
    client: Client,
    cfg: Config,
    templates: Handlebars<'static>,
}

impl AppState {
    pub fn new(client: Client, cfg: Config) -> Result<Self> {
        let mut templates = Handlebars::new();
        templates
            .register_template_string(PAGE, PAGE_TEMPLATE)
            .context("Failed to compile page template")?;
        Ok(Self {
            client,
            cfg,
            templates,
        })
    }

    fn render(&self, status: StatusCode, view: &PageView<'_>) -> Response {
        match self.templates.render(PAGE, view) {
            Ok(body) => (status, Html(body)).into_response(),
            Err(err) => {
                warn!(error = %err, "failed to render page");
                (StatusCode::INTERNAL_SERVER_ERROR, "failed to render page").into_response()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct AskForm {
    #[serde(default)]
    question: String,
}

#[derive(Debug, Serialize)]
struct TranscriptEntry {
    role: &'static str,
    text: String,
}

#[derive(Debug, Serialize)]
struct PageView<'a> {
    title: &'static str,
    subtitle: &'static str,
    question: &'a str,
    transcript: Vec<TranscriptEntry>,
    answer: Option<&'a str>,
    error: Option<String>,
}

impl<'a> PageView<'a> {
    fn empty() -> Self {
        Self {
            title: TITLE,
            subtitle: SUBTITLE,
            question: "",
            transcript: Vec::new(),
            answer: None,
            error: None,
        }
    }

    fn answered(question: &'a str, conversation: &'a Conversation) -> Self {
        let answer = conversation.answer();
        Self {
            question,
            transcript: transcript(conversation.messages()),
            answer: (!answer.trim().is_empty()).then_some(answer),
            ..Self::empty()
        }
    }

    fn failed(question: &'a str, error: String) -> Self {
        Self {
            question,
            error: Some(error),
            ..Self::empty()
        }
    }
}

/// One entry per message, in the order they were appended. System prompts are
/// not shown; tool requests are described since they carry no text.
fn transcript(messages: &[Message]) -> Vec<TranscriptEntry> {
    messages
        .iter()
        .filter(|msg| msg.role != MessageRole::System)
        .map(|msg| {
            let text = if msg.is_tool_request() && msg.content.trim().is_empty() {
                msg.tool_calls
                    .iter()
                    .map(|call| format!("{}({})", call.name, call.arguments))
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                msg.content.clone()
            };
            TranscriptEntry {
                role: msg.role.as_str(),
                text,
            }
        })
        .collect()
}

async fn index(State(state): State<Arc<AppState>>) -> Response {
    state.render(StatusCode::OK, &PageView::empty())
}

async fn ask(State(state): State<Arc<AppState>>, Form(form): Form<AskForm>) -> Response {
    let question = form.question.trim();
    if question.is_empty() {
        return state.render(StatusCode::OK, &PageView::empty());
    }

    info!(question_len = question.len(), "received question");
    match agent::answer(&state.client, &state.cfg, question).await {
        Ok(conversation) => {
            state.render(StatusCode::OK, &PageView::answered(question, &conversation))
        }
        Err(err) => {
            let detail = format!("{err:#}");
            warn!(error = %detail, "conversation failed");
            state.render(
                StatusCode::BAD_GATEWAY,
                &PageView::failed(question, format!("Something went wrong: {detail}")),
            )
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index).post(ask))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

pub async fn serve(client: Client, cfg: Config) -> Result<()> {
    let bind_addr = cfg.bind_addr.clone();
    let state = Arc::new(AppState::new(client, cfg)?);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind UI server to '{bind_addr}'. Check BIND_ADDR."))?;
    info!(addr = %listener.local_addr()?, "serving chat UI");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("UI server failed")
}
