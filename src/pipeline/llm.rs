use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::PipelineError;

/// Chat-completion client used by the planning agents.
pub trait LlmClient: Send + Sync {
    /// Send one system + user exchange. `Ok(None)` means the service
    /// answered without usable content.
    fn complete(
        &self,
        system: &str,
        user: &str,
        json_mode: bool,
    ) -> Result<Option<String>, PipelineError>;
}

/// Append `/v1` to a base URL unless it already ends with it.
pub fn ensure_v1_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiCompatClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OpenAiCompatClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout_secs: u64,
    ) -> Result<Self, PipelineError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PipelineError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: ensure_v1_url(base_url),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
        })
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl LlmClient for OpenAiCompatClient {
    fn complete(
        &self,
        system: &str,
        user: &str,
        json_mode: bool,
    ) -> Result<Option<String>, PipelineError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            response_format: json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    PipelineError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    PipelineError::HttpClient(format!(
                        "Request timed out after {}s",
                        self.timeout_secs
                    ))
                } else {
                    PipelineError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(PipelineError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| PipelineError::ResponseParsing(e.to_string()))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()))
    }
}

// ═══════════════════════════════════════════════════════════
// Mock client
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
enum MockReply {
    Text(String),
    Empty,
    Fail,
}

/// One recorded call to [`MockLlmClient`].
#[derive(Debug, Clone)]
pub struct MockLlmCall {
    pub system: String,
    pub user: String,
    pub json_mode: bool,
}

/// Scripted LLM: the first rule whose marker appears in the system or
/// user prompt decides the reply. Unmatched calls get the default.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    rules: Vec<(String, MockReply)>,
    default: Option<String>,
    calls: Arc<Mutex<Vec<MockLlmCall>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(mut self, reply: &str) -> Self {
        self.default = Some(reply.to_string());
        self
    }

    pub fn with_reply(mut self, marker: &str, reply: &str) -> Self {
        self.rules
            .push((marker.to_string(), MockReply::Text(reply.to_string())));
        self
    }

    pub fn with_empty_reply(mut self, marker: &str) -> Self {
        self.rules.push((marker.to_string(), MockReply::Empty));
        self
    }

    pub fn with_failure(mut self, marker: &str) -> Self {
        self.rules.push((marker.to_string(), MockReply::Fail));
        self
    }

    pub fn calls(&self) -> Vec<MockLlmCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl LlmClient for MockLlmClient {
    fn complete(
        &self,
        system: &str,
        user: &str,
        json_mode: bool,
    ) -> Result<Option<String>, PipelineError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(MockLlmCall {
                system: system.to_string(),
                user: user.to_string(),
                json_mode,
            });
        }

        let rule = self
            .rules
            .iter()
            .find(|(marker, _)| system.contains(marker.as_str()) || user.contains(marker.as_str()));

        match rule {
            Some((_, MockReply::Text(text))) => Ok(Some(text.clone())),
            Some((_, MockReply::Empty)) => Ok(None),
            Some((_, MockReply::Fail)) => {
                Err(PipelineError::Connection("mock://llm".to_string()))
            }
            None => Ok(self.default.clone()),
        }
    }
}
