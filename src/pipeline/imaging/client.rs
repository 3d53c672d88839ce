use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use regex::Regex;
use serde_json::{json, Value};

use crate::pipeline::PipelineError;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_PAUSE: Duration = Duration::from_secs(2);

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s"'<>()\[\]]+"#).expect("URL pattern is a valid regex")
});

/// Image generation backend. Returns a `data:` URL or an http URL.
pub trait ImageClient: Send + Sync {
    fn generate(&self, prompt: &str, image: Option<&str>) -> Result<Option<String>, PipelineError>;
}

/// Split an input image into (mime type, base64 payload). Bare base64 is
/// assumed to be PNG.
fn inline_image(image: &str) -> (String, String) {
    if let Some(rest) = image.strip_prefix("data:") {
        if let Some((header, encoded)) = rest.split_once(',') {
            let mime = header.split(';').next().unwrap_or("image/png");
            return (mime.to_string(), encoded.to_string());
        }
    }
    ("image/png".to_string(), image.to_string())
}

/// Pull the first image out of a `generateContent` response.
pub fn image_from_response(body: &Value) -> Option<String> {
    let parts = body
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    for part in parts {
        let inline = part
            .get("inline_data")
            .map(|d| (d, "mime_type"))
            .or_else(|| part.get("inlineData").map(|d| (d, "mimeType")));
        if let Some((data, mime_key)) = inline {
            if let Some(payload) = data.get("data").and_then(Value::as_str).filter(|s| !s.is_empty()) {
                let mime = data.get(mime_key).and_then(Value::as_str).unwrap_or("image/png");
                return Some(format!("data:{mime};base64,{payload}"));
            }
        }
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            if let Some(found) = URL_PATTERN.find(text) {
                return Some(found.as_str().to_string());
            }
        }
    }
    None
}

/// Gemini-style `generateContent` image client with fixed retries.
pub struct GeminiImageClient {
    endpoint: String,
    api_key: String,
    client: reqwest::blocking::Client,
    retry_pause: Duration,
}

impl GeminiImageClient {
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
            endpoint: format!(
                "{}/v1beta/models/{model}:generateContent",
                base_url.trim_end_matches('/')
            ),
            api_key: api_key.to_string(),
            client,
            retry_pause: RETRY_PAUSE,
        })
    }

    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    fn attempt(&self, payload: &Value) -> Result<Option<String>, PipelineError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    PipelineError::Connection(self.endpoint.clone())
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

        let body: Value = response
            .json()
            .map_err(|e| PipelineError::ResponseParsing(e.to_string()))?;
        Ok(image_from_response(&body))
    }
}

impl ImageClient for GeminiImageClient {
    /// Never errors on upstream trouble: after the last failed attempt the
    /// result is `Ok(None)`.
    fn generate(&self, prompt: &str, image: Option<&str>) -> Result<Option<String>, PipelineError> {
        let mut parts = vec![json!({ "text": prompt })];
        if let Some(image) = image {
            let (mime_type, data) = inline_image(image);
            parts.push(json!({ "inline_data": { "mime_type": mime_type, "data": data } }));
        }
        let payload = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "thinkingConfig": { "thinkingBudget": 128, "includeThoughts": false }
            }
        });

        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(&payload) {
                Ok(Some(url)) => return Ok(Some(url)),
                Ok(None) => {
                    tracing::warn!(attempt, "No image found in response");
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Image request failed");
                }
            }
            if attempt < MAX_ATTEMPTS {
                std::thread::sleep(self.retry_pause);
            }
        }

        tracing::error!(attempts = MAX_ATTEMPTS, "Image generation gave up");
        Ok(None)
    }
}

// ═══════════════════════════════════════════════════════════
// Mock client
// ═══════════════════════════════════════════════════════════

/// 1x1 transparent PNG.
pub const MOCK_PNG_DATA_URL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// One recorded call to [`MockImageClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockImageCall {
    pub prompt: String,
    pub image: Option<String>,
}

/// Image client returning a fixed reply and recording prompts.
#[derive(Debug, Clone)]
pub struct MockImageClient {
    reply: Option<String>,
    calls: Arc<Mutex<Vec<MockImageCall>>>,
}

impl Default for MockImageClient {
    fn default() -> Self {
        Self::returning(MOCK_PNG_DATA_URL)
    }
}

impl MockImageClient {
    pub fn returning(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: Arc::default(),
        }
    }

    /// Every call yields no image.
    pub fn empty() -> Self {
        Self {
            reply: None,
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<MockImageCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl ImageClient for MockImageClient {
    fn generate(&self, prompt: &str, image: Option<&str>) -> Result<Option<String>, PipelineError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(MockImageCall {
                prompt: prompt.to_string(),
                image: image.map(str::to_string),
            });
        }
        Ok(self.reply.clone())
    }
}
