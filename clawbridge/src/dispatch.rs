use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::config::{ConfigError, ConfigSource, GatewayConfig};
use crate::context::{ContextAssembler, ContextSources};
use crate::{DisplaySender, post};

/// Model id the gateway routes to its main agent.
pub const MODEL: &str = "clawdbot:main";
/// Value of the `x-clawdbot-agent-id` header.
pub const AGENT_ID: &str = "main";

/// Instructions placed before every prompt.
pub const PREAMBLE: &str = "You are an assistant connected to a developer's editor through a client-side bridge. \
The bridge runs on the developer's machine; you run on a remote gateway and have no access to the developer's filesystem. \
Reason only from the workspace context supplied in this message and never assume you can read or modify files on the server.";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing gatewayUrl or gatewayToken")]
    MissingCredentials,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{status} {body}")]
    Status { status: u16, body: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// What a dispatch ended with. The same text has already been posted to
/// the display surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Text extracted from the gateway reply (or its raw JSON).
    Reply(String),
    /// Settings were missing or unreadable; nothing was sent.
    ConfigError(String),
    /// The request went out but failed.
    Failed(String),
}

impl DispatchOutcome {
    pub fn message(&self) -> &str {
        match self {
            DispatchOutcome::Reply(m)
            | DispatchOutcome::ConfigError(m)
            | DispatchOutcome::Failed(m) => m,
        }
    }
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// Sends prompts to the gateway's `/v1/responses` endpoint.
#[derive(Clone)]
pub struct PromptDispatcher {
    client: reqwest::Client,
    config: Arc<dyn ConfigSource>,
    display: DisplaySender,
}

impl PromptDispatcher {
    pub fn new(config: Arc<dyn ConfigSource>, display: DisplaySender) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            config,
            display,
        }
    }

    /// Dispatch one prompt. Every outcome is reported on the display
    /// surface; nothing is returned as an error.
    pub async fn send(&self, prompt: &str, sources: Option<ContextSources>) -> DispatchOutcome {
        post(&self.display, format!("You: {prompt}"));

        let config = match self.config.load() {
            Ok(c) => c,
            Err(e) => return self.config_error(GatewayError::Config(e)),
        };
        if !config.has_credentials() {
            return self.config_error(GatewayError::MissingCredentials);
        }

        let context = match sources {
            Some(sources) if config.include_workspace_context => Some(
                ContextAssembler::new(config.truncation_policy())
                    .assemble_async(sources)
                    .await,
            ),
            _ => None,
        };
        let input = build_input(prompt, context.as_deref());

        match self.request(&config, &input).await {
            Ok(text) => {
                post(&self.display, text.clone());
                DispatchOutcome::Reply(text)
            }
            Err(e) => {
                let message = match &e {
                    GatewayError::Status { .. } => format!("Gateway error: {e}"),
                    _ => format!("Request failed: {e}"),
                };
                tracing::warn!("{message}");
                post(&self.display, message.clone());
                DispatchOutcome::Failed(message)
            }
        }
    }

    /// Run [`send`](Self::send) as an independent task. Concurrent
    /// dispatches are not ordered against each other.
    pub fn spawn_send(
        &self,
        prompt: String,
        sources: Option<ContextSources>,
    ) -> tokio::task::JoinHandle<DispatchOutcome> {
        let this = self.clone();
        tokio::spawn(async move { this.send(&prompt, sources).await })
    }

    fn config_error(&self, e: GatewayError) -> DispatchOutcome {
        let message = match e {
            GatewayError::MissingCredentials => {
                "Missing gatewayUrl or gatewayToken in settings.".to_string()
            }
            other => format!("Invalid settings: {other}"),
        };
        tracing::warn!("{message}");
        post(&self.display, message.clone());
        DispatchOutcome::ConfigError(message)
    }

    async fn request(&self, config: &GatewayConfig, input: &str) -> Result<String, GatewayError> {
        let url = config.responses_url();
        tracing::info!(url = %url, input_chars = input.len(), "dispatching prompt");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&config.gateway_token)
            .header("x-clawdbot-agent-id", AGENT_ID)
            .json(&ResponsesRequest {
                model: MODEL,
                input,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let data: Value = resp.json().await?;
        let text = extract_output_text(&data);
        Ok(if text.is_empty() {
            data.to_string()
        } else {
            text
        })
    }
}

/// Preamble, optional workspace context, then the user's prompt.
pub fn build_input(prompt: &str, context: Option<&str>) -> String {
    match context {
        Some(ctx) => format!("{PREAMBLE}\n\nWorkspaceContext:\n{ctx}\n\nUserPrompt:\n{prompt}"),
        None => format!("{PREAMBLE}\n\nUserPrompt:\n{prompt}"),
    }
}

/// Display text of a `/v1/responses` reply.
///
/// `output_text` wins when it is a string; otherwise every `output_text`
/// fragment under `output[].content[]` is concatenated in order. Anything
/// else yields an empty string.
pub fn extract_output_text(data: &Value) -> String {
    if let Some(text) = data.get("output_text").and_then(Value::as_str) {
        return text.to_string();
    }
    let Some(items) = data.get("output").and_then(Value::as_array) else {
        return String::new();
    };
    items
        .iter()
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .filter(|c| c.get("type").and_then(Value::as_str) == Some("output_text"))
        .filter_map(|c| c.get("text").and_then(Value::as_str))
        .collect()
}
