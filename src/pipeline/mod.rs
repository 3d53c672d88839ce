pub mod imaging;
pub mod llm;
pub mod planning;
pub mod rendering;

pub use imaging::*;
pub use llm::*;
pub use planning::*;
pub use rendering::*;

use thiserror::Error;

use crate::config::AppConfig;
use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("AI service is not reachable at {0}")]
    Connection(String),

    #[error("AI service returned error (status {status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("{0}")]
    EmptyResponse(String),

    #[error("Invalid JSON response: {0}")]
    InvalidJson(String),

    #[error("Slide count mismatch: expected {expected} slides, got {actual}")]
    SlideCountMismatch { expected: usize, actual: usize },

    #[error("Failed to save image: {0}")]
    ImageSave(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

// ═══════════════════════════════════════════════════════════
// AI provider seam
// ═══════════════════════════════════════════════════════════

/// Hands out AI clients to planners and generation jobs.
///
/// Clients are blocking, so callers obtain them inside
/// `spawn_blocking` and drop them there.
pub trait AiProvider: Send + Sync {
    fn llm(&self) -> Result<Box<dyn LlmClient>, PipelineError>;
    fn images(&self) -> Result<Box<dyn ImageClient>, PipelineError>;
}

/// Production provider backed by the configured HTTP endpoints.
pub struct HttpAiProvider {
    base_url: String,
    api_key: String,
    model_logic: String,
    model_image: String,
    llm_timeout_secs: u64,
    image_timeout_secs: u64,
}

impl HttpAiProvider {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model_logic: config.model_logic.clone(),
            model_image: config.model_image.clone(),
            llm_timeout_secs: config.llm_timeout_secs,
            image_timeout_secs: config.image_timeout_secs,
        }
    }
}

impl AiProvider for HttpAiProvider {
    fn llm(&self) -> Result<Box<dyn LlmClient>, PipelineError> {
        let client = OpenAiCompatClient::new(
            &self.base_url,
            &self.api_key,
            &self.model_logic,
            self.llm_timeout_secs,
        )?;
        Ok(Box::new(client))
    }

    fn images(&self) -> Result<Box<dyn ImageClient>, PipelineError> {
        let client = GeminiImageClient::new(
            &self.base_url,
            &self.api_key,
            &self.model_image,
            self.image_timeout_secs,
        )?;
        Ok(Box::new(client))
    }
}

/// Provider serving scripted clients, for tests and offline runs.
#[derive(Clone, Default)]
pub struct MockAiProvider {
    pub llm: MockLlmClient,
    pub images: MockImageClient,
}

impl MockAiProvider {
    pub fn new(llm: MockLlmClient, images: MockImageClient) -> Self {
        Self { llm, images }
    }
}

impl AiProvider for MockAiProvider {
    fn llm(&self) -> Result<Box<dyn LlmClient>, PipelineError> {
        Ok(Box::new(self.llm.clone()))
    }

    fn images(&self) -> Result<Box<dyn ImageClient>, PipelineError> {
        Ok(Box::new(self.images.clone()))
    }
}
