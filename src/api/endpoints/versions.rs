//! Slide version history: regenerate, edit, list, activate and delete.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::user::StatusResponse;
use super::{ensure_scores, owned_presentation, render_and_store};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::db::repository::{
    add_slide_version_by_slide_id, charge_slide, delete_version, get_scores_per_slide,
    get_slide_by_id, list_versions, previous_slide_prompt, set_active_version,
    slide_context_messages, SlideAnchor,
};
use crate::models::VersionView;

#[derive(Deserialize)]
pub struct CreateVersionRequest {
    pub prompt: String,
    #[serde(default)]
    pub is_modification: bool,
    pub base_image_url: Option<String>,
}

#[derive(Serialize)]
pub struct CreateVersionResponse {
    pub status: &'static str,
    pub version_id: String,
    pub image_url: String,
}

#[derive(Serialize)]
pub struct VersionsResponse {
    pub versions: Vec<VersionView>,
}

#[derive(Deserialize)]
pub struct SetActiveRequest {
    pub version_id: String,
}

#[derive(Serialize)]
pub struct SetActiveResponse {
    pub status: &'static str,
    pub current_version_id: String,
}

fn slide_not_found() -> ApiError {
    ApiError::NotFound("Slide not found".into())
}

/// `POST /presentations/:id/slides/:slide_id/versions`
///
/// With `is_modification` the stored base image is edited in place using
/// the slide's prompt history; otherwise a fresh image is generated in the
/// style of the previous slide.
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path((id, slide_id)): Path<(String, String)>,
    Json(req): Json<CreateVersionRequest>,
) -> Result<Json<CreateVersionResponse>, ApiError> {
    let (previous, history) = {
        let conn = ctx.core.open_db()?;
        owned_presentation(&conn, &id, &caller.user.id)?;
        let slide = get_slide_by_id(&conn, &id, &slide_id, false)?.ok_or_else(slide_not_found)?;
        ensure_scores(&conn, &caller.user.id, get_scores_per_slide(&conn)?)?;
        if req.is_modification {
            (None, slide_context_messages(&conn, &id, &slide.id)?)
        } else {
            let previous = previous_slide_prompt(&conn, &id, SlideAnchor::SlideId(&slide.id))?;
            (previous, Vec::new())
        }
    };

    let base_image_url = if req.is_modification {
        let url = req
            .base_image_url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ApiError::BadRequest("Modification requires base_image_url".into()))?;
        Some(url)
    } else {
        None
    };

    let prompt = req.prompt.clone();
    let image_url = match &base_image_url {
        Some(url) => {
            let base = ctx
                .core
                .images()
                .encode_local(url)
                .ok_or_else(|| ApiError::NotFound("Base image file not found".into()))?;
            render_and_store(ctx.core.clone(), id.clone(), move |imager| {
                imager.modify_slide_image(&prompt, &base, &history)
            })
            .await?
        }
        None => {
            render_and_store(ctx.core.clone(), id.clone(), move |imager| {
                imager.generate_slide_image(&prompt, previous.as_deref())
            })
            .await?
        }
    };

    let conn = ctx.core.open_db()?;
    let version_id = add_slide_version_by_slide_id(
        &conn,
        &id,
        &slide_id,
        &image_url,
        &req.prompt,
        base_image_url.as_deref(),
    )?
    .ok_or_else(|| ApiError::Internal("Failed to add version".into()))?;

    let price = get_scores_per_slide(&conn)?;
    if !charge_slide(&conn, &caller.user.id, price, &req.prompt, &image_url)? {
        tracing::warn!(user_id = %caller.user.id, slide_id = %slide_id, "Version added without charge");
    }

    Ok(Json(CreateVersionResponse {
        status: "success",
        version_id,
        image_url,
    }))
}

/// `GET /presentations/:id/slides/:slide_id/versions`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path((id, slide_id)): Path<(String, String)>,
) -> Result<Json<VersionsResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    owned_presentation(&conn, &id, &caller.user.id)?;
    let slide = get_slide_by_id(&conn, &id, &slide_id, false)?.ok_or_else(slide_not_found)?;
    let versions = list_versions(&conn, &slide.id)?;
    Ok(Json(VersionsResponse {
        versions: versions.iter().map(VersionView::from).collect(),
    }))
}

/// `PATCH /presentations/:id/slides/:slide_id/active-version`
pub async fn set_active(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path((id, slide_id)): Path<(String, String)>,
    Json(req): Json<SetActiveRequest>,
) -> Result<Json<SetActiveResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    owned_presentation(&conn, &id, &caller.user.id)?;
    if !set_active_version(&conn, &id, &slide_id, &req.version_id)? {
        return Err(ApiError::NotFound("Slide or version not found".into()));
    }
    Ok(Json(SetActiveResponse {
        status: "success",
        current_version_id: req.version_id,
    }))
}

/// `DELETE /presentations/:id/slides/:slide_id/versions/:version_id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path((id, slide_id, version_id)): Path<(String, String, String)>,
) -> Result<Json<StatusResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    owned_presentation(&conn, &id, &caller.user.id)?;
    if !delete_version(&conn, &id, &slide_id, &version_id)? {
        return Err(ApiError::BadRequest(
            "Version not found or cannot delete the only version".into(),
        ));
    }
    Ok(StatusResponse::success())
}
