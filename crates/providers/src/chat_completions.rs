//! Client for `/chat/completions` endpoints with function calling.
//!
//! Groq is the default; OpenAI, OpenRouter and Ollama speak the same dialect.

use async_trait::async_trait;
use falcon_core::error::ProviderError;
use falcon_core::message::{Message, MessageToolCall};
use falcon_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolChoice, Usage};
use falcon_core::tool::ToolDefinition;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;
/// Longest slice of an error body carried into user-facing text.
const ERROR_EXCERPT_CHARS: usize = 160;

pub struct ChatCompletionsProvider {
    name: String,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl ChatCompletionsProvider {
    /// `base_url` is the API root, e.g. `https://api.groq.com/openai/v1`.
    pub fn new(name: impl Into<String>, base_url: &str, api_key: impl Into<String>) -> Self {
        Self::with_timeout(name, base_url, api_key, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        name: impl Into<String>,
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
            warn!(error = %e, "Could not build HTTP client with timeout, using defaults");
            reqwest::Client::new()
        });

        Self {
            name: name.into(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            client,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Provider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Requesting completion"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&WireRequest::from(&request))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status = status.as_u16(), "Reasoning API rejected request");
            debug!(provider = %self.name, body = %body, "Rejected request body");
            return Err(status_error(status, retry_after, body));
        }

        let completion: WireCompletion = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("cannot decode completion: {e}")))?;
        completion.into_response()
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let models = self.endpoint.replace("/chat/completions", "/models");
        let response = self
            .client
            .get(models)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_error)?;
        Ok(response.status().is_success())
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

fn status_error(status: StatusCode, retry_after: Option<u64>, body: String) -> ProviderError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::AuthenticationFailed("API key rejected".into())
        }
        _ => ProviderError::ApiError {
            status_code: status.as_u16(),
            message: excerpt(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("no details").to_string()),
        },
    }
}

/// First non-blank line of an error body, shortened for display.
fn excerpt(body: &str) -> Option<String> {
    let line = body.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut chars = line.chars();
    let short: String = chars.by_ref().take(ERROR_EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        Some(format!("{short}…"))
    } else {
        Some(short)
    }
}

// Wire format. Requests borrow from the domain types.

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    // Endpoints reject tool_choice without tools
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

impl<'a> From<&'a ProviderRequest> for WireRequest<'a> {
    fn from(request: &'a ProviderRequest) -> Self {
        Self {
            model: &request.model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: request.tools.iter().map(WireTool::from).collect(),
            tool_choice: (!request.tools.is_empty()).then_some(request.tool_choice),
        }
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(message: &'a Message) -> Self {
        Self {
            role: message.role.as_str(),
            content: &message.content,
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: &call.id,
                    kind: "function",
                    function: WireFunctionCall {
                        name: &call.name,
                        arguments: &call.arguments,
                    },
                })
                .collect(),
            tool_call_id: message.tool_call_id.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall<'a>,
}

#[derive(Serialize)]
struct WireFunctionCall<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

impl<'a> From<&'a ToolDefinition> for WireTool<'a> {
    fn from(definition: &'a ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: definition,
        }
    }
}

#[derive(Deserialize)]
struct WireCompletion {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireReply,
}

#[derive(Deserialize)]
struct WireReply {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireReplyCall>>,
}

#[derive(Deserialize)]
struct WireReplyCall {
    id: String,
    function: WireReplyFunction,
}

#[derive(Deserialize)]
struct WireReplyFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl WireCompletion {
    /// Only the first choice is used.
    fn into_response(self) -> Result<ProviderResponse, ProviderError> {
        let reply = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("completion has no choices".into()))?
            .message;

        let mut message = Message::assistant(reply.content.unwrap_or_default());
        message.tool_calls = reply
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| MessageToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        Ok(ProviderResponse {
            message,
            usage: self.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            model: self.model,
        })
    }
}
