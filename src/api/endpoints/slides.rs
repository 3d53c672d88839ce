//! Single-slide operations: view, soft delete, restore and insertion.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::planning::{or_default, DEFAULT_LANGUAGE};
use super::user::StatusResponse;
use super::{blocking, ensure_scores, owned_presentation, render_and_store};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::db::repository::{
    charge_slide, get_scores_per_slide, get_slide_by_id, get_slide_by_position, insert_slide_at_index,
    latest_version_prompt, list_deleted_slides, previous_slide_prompt, restore_slide, slide_view,
    soft_delete_slide, SlideAnchor,
};
use crate::models::{PresentationMode, SlideView};
use crate::pipeline::{EnrichRequest, Planner};

const NEW_SLIDE_PROMPT: &str = "New Slide";

fn slide_not_found() -> ApiError {
    ApiError::NotFound("Slide not found".into())
}

#[derive(Deserialize)]
pub struct InsertRequest {
    pub position: i64,
    pub prompt: String,
}

#[derive(Deserialize)]
pub struct InsertFromOutlineRequest {
    pub position: i64,
    pub title: String,
    pub content_summary: String,
    pub presentation_mode: Option<String>,
    pub language: Option<String>,
}

#[derive(Serialize)]
pub struct InsertResponse {
    pub status: &'static str,
    pub slide_id: String,
    pub version_id: String,
    pub image_url: String,
}

#[derive(Serialize)]
pub struct DeletedSlidesResponse {
    pub slides: Vec<SlideView>,
}

/// `GET /presentations/:id/slides/:slide_id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path((id, slide_id)): Path<(String, String)>,
) -> Result<Json<SlideView>, ApiError> {
    let conn = ctx.core.open_db()?;
    owned_presentation(&conn, &id, &caller.user.id)?;
    let slide = get_slide_by_id(&conn, &id, &slide_id, false)?.ok_or_else(slide_not_found)?;
    Ok(Json(slide_view(&conn, &slide)?))
}

/// `DELETE /presentations/:id/slides/:slide_id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path((id, slide_id)): Path<(String, String)>,
) -> Result<Json<StatusResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    owned_presentation(&conn, &id, &caller.user.id)?;
    if !soft_delete_slide(&conn, &id, &slide_id)? {
        return Err(slide_not_found());
    }
    Ok(StatusResponse::success())
}

/// `POST /presentations/:id/slides/:slide_id/restore`
pub async fn restore(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path((id, slide_id)): Path<(String, String)>,
) -> Result<Json<StatusResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    owned_presentation(&conn, &id, &caller.user.id)?;
    if !restore_slide(&conn, &id, &slide_id)? {
        return Err(slide_not_found());
    }
    Ok(StatusResponse::success())
}

/// `GET /presentations/:id/slides/deleted`
pub async fn list_deleted(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
) -> Result<Json<DeletedSlidesResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    owned_presentation(&conn, &id, &caller.user.id)?;
    Ok(Json(DeletedSlidesResponse {
        slides: list_deleted_slides(&conn, &id)?,
    }))
}

/// Store the new slide at `position` and charge the caller for it.
fn insert_and_charge(
    ctx: &ApiContext,
    presentation_id: &str,
    user_id: &str,
    position: i64,
    image_url: String,
    prompt: &str,
) -> Result<InsertResponse, ApiError> {
    let conn = ctx.core.open_db()?;
    let inserted = insert_slide_at_index(&conn, presentation_id, position, &image_url, prompt)?;
    let price = get_scores_per_slide(&conn)?;
    if !charge_slide(&conn, user_id, price, prompt, &image_url)? {
        tracing::warn!(user_id, presentation_id, "Slide inserted without charge");
    }
    Ok(InsertResponse {
        status: "success",
        slide_id: inserted.slide_id,
        version_id: inserted.version_id,
        image_url,
    })
}

/// `POST /presentations/:id/slides`: free-form prompt, styled after the
/// slide before the insertion point.
pub async fn insert(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
    Json(req): Json<InsertRequest>,
) -> Result<Json<InsertResponse>, ApiError> {
    let previous = {
        let conn = ctx.core.open_db()?;
        owned_presentation(&conn, &id, &caller.user.id)?;
        ensure_scores(&conn, &caller.user.id, get_scores_per_slide(&conn)?)?;
        previous_slide_prompt(&conn, &id, SlideAnchor::Position(req.position))?
    };

    let prompt = req.prompt.clone();
    let image_url = render_and_store(ctx.core.clone(), id.clone(), move |imager| {
        imager.generate_slide_image(&prompt, previous.as_deref())
    })
    .await?;

    let response = insert_and_charge(&ctx, &id, &caller.user.id, req.position, image_url, &req.prompt)?;
    Ok(Json(response))
}

/// `POST /presentations/:id/slides/insert`: a new outline entry, expanded
/// against its neighbours and rendered in the deck's style.
pub async fn insert_from_outline(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
    Json(req): Json<InsertFromOutlineRequest>,
) -> Result<Json<InsertResponse>, ApiError> {
    let (presentation, previous, next) = {
        let conn = ctx.core.open_db()?;
        let presentation = owned_presentation(&conn, &id, &caller.user.id)?;
        ensure_scores(&conn, &caller.user.id, get_scores_per_slide(&conn)?)?;
        let previous = previous_slide_prompt(&conn, &id, SlideAnchor::Position(req.position))?;
        let next = match get_slide_by_position(&conn, &id, req.position)? {
            Some(slide) => latest_version_prompt(&conn, &slide.id)?,
            None => None,
        };
        (presentation, previous, next)
    };

    let mode = PresentationMode::from_param(req.presentation_mode.as_deref().unwrap_or_default());
    let language = or_default(req.language.clone(), DEFAULT_LANGUAGE);
    let global_style = presentation.global_style.clone().unwrap_or_default();
    let topic = Some(presentation.display_topic())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled PPT".to_string());
    let entry = json!({
        "index": 0,
        "title": req.title,
        "content_summary": req.content_summary,
    });

    let core = ctx.core.clone();
    let style = global_style.clone();
    let enriched = blocking(move || {
        let llm = core.ai().llm()?;
        let request = EnrichRequest {
            topic: &topic,
            slides: std::slice::from_ref(&entry),
            language: &language,
            presentation_mode: mode,
            global_style_prompt: &style,
            style_preset_id: None,
            previous_context: previous.as_deref().unwrap_or_default(),
            next_context: next.as_deref().unwrap_or_default(),
        };
        Planner::new(llm.as_ref())
            .enrich_outline(&request)
            .map_err(|e| ApiError::Planning(e.to_string()))
    })
    .await?;

    let mut slide = enriched.into_iter().next().unwrap_or_else(|| json!({}));
    if let Some(fields) = slide.as_object_mut() {
        fields.insert("global_style_prompt".into(), Value::String(global_style.clone()));
        fields.insert("presentation_mode".into(), json!(mode.as_str()));
    }

    let image_url = render_and_store(ctx.core.clone(), id.clone(), move |imager| {
        imager.generate_slide_image_from_plan(&slide, &global_style, mode)
    })
    .await?;

    let prompt = [req.title.as_str(), req.content_summary.as_str()]
        .into_iter()
        .find(|text| !text.is_empty())
        .unwrap_or(NEW_SLIDE_PROMPT);
    let response = insert_and_charge(&ctx, &id, &caller.user.id, req.position, image_url, prompt)?;
    Ok(Json(response))
}
