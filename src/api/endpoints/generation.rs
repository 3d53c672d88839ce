//! Batch slide rendering.
//!
//! The three start endpoints validate the outline and the caller's
//! balance, record `generating` progress and hand the outline to a
//! background job. Clients poll `generation-progress` afterwards.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::planning::{or_default, DEFAULT_LANGUAGE};
use super::{blocking, ensure_scores, owned_presentation};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::core_state::CoreState;
use crate::db::repository::{
    get_generation_progress, get_scores_per_slide, update_generation_progress, update_presentation,
};
use crate::models::{GenerationProgress, GenerationStatus, PresentationMode, PresentationPatch};
use crate::pipeline::{count_generated, count_renderable, run_generation, EnrichRequest, Planner};

const UNTITLED: &str = "Untitled PPT";

#[derive(Deserialize)]
pub struct GenerateRequest {
    pub slides: Vec<Value>,
}

#[derive(Deserialize)]
pub struct FromOutlineRequest {
    pub presentation_mode: Option<String>,
    pub language: Option<String>,
    pub topic: Option<String>,
    pub global_style_prompt: String,
    pub style_preset_id: Option<String>,
    pub slides: Vec<Value>,
}

#[derive(Serialize)]
pub struct Accepted {
    pub status: &'static str,
}

fn accepted() -> (StatusCode, Json<Accepted>) {
    (StatusCode::ACCEPTED, Json(Accepted { status: "accepted" }))
}

/// Check the balance for `pending` slides, record the starting progress
/// and launch the job.
fn start_job(
    core: &Arc<CoreState>,
    presentation_id: &str,
    user_id: &str,
    slides: Vec<Value>,
) -> Result<(), ApiError> {
    let total = count_renderable(&slides);
    let done = count_generated(&slides);
    let pending = total - done;

    let conn = core.open_db()?;
    if pending > 0 {
        ensure_scores(&conn, user_id, pending * get_scores_per_slide(&conn)?)?;
    }
    update_generation_progress(&conn, presentation_id, GenerationStatus::Generating, done, total, None)?;
    drop(conn);

    tracing::info!(presentation_id, total, pending, "Generation job queued");
    let (core, pid, uid) = (core.clone(), presentation_id.to_string(), user_id.to_string());
    tokio::task::spawn_blocking(move || run_generation(&core, &pid, slides, Some(&uid)));
    Ok(())
}

/// `POST /presentations/:id/generate`
pub async fn generate(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
    Json(req): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<Accepted>), ApiError> {
    owned_presentation(&ctx.core.open_db()?, &id, &caller.user.id)?;
    if count_renderable(&req.slides) > 0 {
        start_job(&ctx.core, &id, &caller.user.id, req.slides)?;
    }
    Ok(accepted())
}

/// `POST /presentations/:id/generate-from-outline`
///
/// Expands a user-edited outline into render-ready slides first, then
/// renders them like `generate`.
pub async fn generate_from_outline(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
    Json(req): Json<FromOutlineRequest>,
) -> Result<(StatusCode, Json<Accepted>), ApiError> {
    let presentation = owned_presentation(&ctx.core.open_db()?, &id, &caller.user.id)?;

    let topic = req
        .topic
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| presentation.display_topic());
    let topic = if topic.is_empty() { UNTITLED.to_string() } else { topic };
    let mode = PresentationMode::from_param(req.presentation_mode.as_deref().unwrap_or_default());
    let language = or_default(req.language, DEFAULT_LANGUAGE);
    let style_preset_id = req.style_preset_id.filter(|p| !p.is_empty());
    let global_style = req.global_style_prompt;

    let core = ctx.core.clone();
    let (lang, style, preset) = (language.clone(), global_style.clone(), style_preset_id.clone());
    let enriched = blocking(move || {
        let llm = core.ai().llm()?;
        let request = EnrichRequest {
            topic: &topic,
            slides: &req.slides,
            language: &lang,
            presentation_mode: mode,
            global_style_prompt: &style,
            style_preset_id: preset.as_deref(),
            previous_context: "",
            next_context: "",
        };
        Planner::new(llm.as_ref())
            .enrich_outline(&request)
            .map_err(|e| ApiError::Planning(e.to_string()))
    })
    .await?;

    let slides: Vec<Value> = enriched
        .into_iter()
        .enumerate()
        .map(|(index, mut slide)| {
            if let Some(fields) = slide.as_object_mut() {
                fields.insert("index".into(), json!(index));
                fields.insert("global_style_prompt".into(), json!(global_style));
                fields.insert("presentation_mode".into(), json!(mode.as_str()));
            }
            slide
        })
        .collect();

    let patch = PresentationPatch {
        global_style: Some(global_style.clone()).filter(|s| !s.is_empty()),
        params: Some(json!({
            "language": language,
            "presentation_mode": mode.as_str(),
            "style_preset_id": style_preset_id.unwrap_or_default(),
            "page_count": slides.len(),
            "global_style_prompt": global_style,
            "outline": slides,
        })),
        ..Default::default()
    };
    update_presentation(&ctx.core.open_db()?, &id, &patch)?;

    if count_renderable(&slides) > 0 {
        start_job(&ctx.core, &id, &caller.user.id, slides)?;
    }
    Ok(accepted())
}

/// `POST /presentations/:id/resume-generate`
///
/// Re-runs the stored outline; slides rendered earlier are skipped and
/// not charged again.
pub async fn resume(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Accepted>), ApiError> {
    let presentation = owned_presentation(&ctx.core.open_db()?, &id, &caller.user.id)?;
    let slides = presentation
        .outline()
        .filter(|outline| !outline.is_empty())
        .ok_or_else(|| ApiError::BadRequest("No outline to resume".into()))?;

    if count_renderable(&slides) > 0 {
        start_job(&ctx.core, &id, &caller.user.id, slides)?;
    }
    Ok(accepted())
}

/// `GET /presentations/:id/generation-progress`
pub async fn progress(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
) -> Result<Json<GenerationProgress>, ApiError> {
    let conn = ctx.core.open_db()?;
    owned_presentation(&conn, &id, &caller.user.id)?;
    get_generation_progress(&conn, &id)?
        .map(Json)
        .ok_or_else(ApiError::presentation_not_found)
}
