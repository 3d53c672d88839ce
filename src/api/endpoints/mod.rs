//! API endpoint handlers, one module per resource.
//!
//! Handlers open a connection per request for quick repository calls.
//! Anything that talks to the AI service or hashes passwords runs on the
//! blocking pool through [`blocking`].

pub mod admin;
pub mod auth;
pub mod gallery;
pub mod generation;
pub mod health;
pub mod planning;
pub mod presentations;
pub mod slides;
pub mod upload;
pub mod user;
pub mod versions;

use std::sync::Arc;

use rusqlite::Connection;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::core_state::CoreState;
use crate::db::repository::{find_presentation, get_user_scores};
use crate::models::Presentation;
use crate::pipeline::{PipelineError, SlideImager};

/// `skip`/`limit` query parameters.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub skip: i64,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn limit_or(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default)
    }
}

/// Run `work` on the blocking pool.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {e}")))?
}

/// The caller's presentation, soft-deleted or not. Anything else is 404.
pub(crate) fn owned_presentation(
    conn: &Connection,
    presentation_id: &str,
    user_id: &str,
) -> Result<Presentation, ApiError> {
    find_presentation(conn, presentation_id, Some(user_id))?
        .ok_or_else(ApiError::presentation_not_found)
}

/// Fail with 402 unless the user holds at least `need` scores.
pub(crate) fn ensure_scores(conn: &Connection, user_id: &str, need: i64) -> Result<(), ApiError> {
    let have = get_user_scores(conn, user_id)?;
    if have < need {
        return Err(ApiError::InsufficientScores(format!(
            "Insufficient scores: need {need}, have {have}"
        )));
    }
    Ok(())
}

/// Produce one slide image with `render` and store it under the
/// presentation. Returns the public `/images/...` path.
pub(crate) async fn render_and_store<F>(
    core: Arc<CoreState>,
    presentation_id: String,
    render: F,
) -> Result<String, ApiError>
where
    F: FnOnce(&SlideImager<'_>) -> Result<Option<String>, PipelineError> + Send + 'static,
{
    blocking(move || {
        let client = core.ai().images()?;
        let image = render(&SlideImager::new(client.as_ref()))?
            .ok_or_else(|| ApiError::Upstream("Image generation failed".into()))?;
        core.images()
            .save(&image, &presentation_id)?
            .ok_or_else(|| ApiError::Internal("Failed to save image".into()))
    })
    .await
}
