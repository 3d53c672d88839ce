//! Presentation CRUD, recycle bin and publishing.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::owned_presentation;
use super::user::StatusResponse;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::db::repository::{
    clear_recycle_bin, create_presentation, get_presentation, list_deleted_presentations,
    list_presentations, permanently_delete_presentation, presentation_is_published,
    restore_presentation, set_published, soft_delete_presentation, update_presentation,
};
use crate::models::{DeletedPresentation, PresentationDetail, PresentationPatch, PresentationSummary};

const DEFAULT_TOPIC: &str = "Untitled PPT";

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

#[derive(Deserialize)]
pub struct CreateRequest {
    #[serde(default = "default_topic")]
    pub topic: String,
}

#[derive(Serialize)]
pub struct CreateResponse {
    pub id: String,
    pub presentation_id: String,
    pub message: &'static str,
}

#[derive(Deserialize)]
pub struct UpdateRequest {
    pub title: Option<String>,
    pub global_style: Option<String>,
}

#[derive(Serialize)]
pub struct DeletedListResponse {
    pub presentations: Vec<DeletedPresentation>,
}

#[derive(Serialize)]
pub struct ClearedResponse {
    pub status: &'static str,
    pub deleted_count: usize,
}

#[derive(Serialize)]
pub struct PublishResponse {
    pub status: &'static str,
    pub is_published: i64,
}

/// `GET /presentations`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
) -> Result<Json<Vec<PresentationSummary>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(list_presentations(&conn, &caller.user.id)?))
}

/// `POST /presentations`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Json(req): Json<CreateRequest>,
) -> Result<Json<CreateResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let id = create_presentation(&conn, &req.topic, Some(&req.topic), Some(&caller.user.id))?;
    tracing::info!(presentation_id = %id, user_id = %caller.user.id, "Presentation created");
    Ok(Json(CreateResponse {
        presentation_id: id.clone(),
        id,
        message: "Presentation created",
    }))
}

/// `GET /presentations/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
) -> Result<Json<PresentationDetail>, ApiError> {
    let conn = ctx.core.open_db()?;
    get_presentation(&conn, &id, Some(&caller.user.id))?
        .map(Json)
        .ok_or_else(ApiError::presentation_not_found)
}

/// `PATCH /presentations/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    owned_presentation(&conn, &id, &caller.user.id)?;
    let patch = PresentationPatch {
        title: req.title,
        global_style: req.global_style,
        params: None,
    };
    if !update_presentation(&conn, &id, &patch)? {
        return Err(ApiError::presentation_not_found());
    }
    Ok(StatusResponse::success())
}

/// `DELETE /presentations/:id`: moves to the recycle bin.
pub async fn remove(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    owned_presentation(&conn, &id, &caller.user.id)?;
    if !soft_delete_presentation(&conn, &id)? {
        return Err(ApiError::presentation_not_found());
    }
    Ok(StatusResponse::success())
}

/// `POST /presentations/:id/restore`
pub async fn restore(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    owned_presentation(&conn, &id, &caller.user.id)?;
    if !restore_presentation(&conn, &id)? {
        return Err(ApiError::presentation_not_found());
    }
    Ok(StatusResponse::success())
}

/// `DELETE /presentations/:id/permanent`: only for recycled presentations.
pub async fn remove_permanently(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    owned_presentation(&conn, &id, &caller.user.id)?;
    if !permanently_delete_presentation(&conn, &id)? {
        return Err(ApiError::NotFound(
            "Presentation not found or not in recycle bin".into(),
        ));
    }
    if let Err(e) = ctx.core.images().remove_presentation_dir(&id) {
        tracing::warn!(presentation_id = %id, error = %e, "Image cleanup failed");
    }
    Ok(StatusResponse::success())
}

/// `GET /presentations/deleted`
pub async fn list_deleted(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
) -> Result<Json<DeletedListResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(DeletedListResponse {
        presentations: list_deleted_presentations(&conn, &caller.user.id)?,
    }))
}

/// `DELETE /presentations/deleted`: empties the caller's recycle bin.
pub async fn clear_deleted(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
) -> Result<Json<ClearedResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let removed = clear_recycle_bin(&conn, &caller.user.id)?;
    for id in &removed {
        if let Err(e) = ctx.core.images().remove_presentation_dir(id) {
            tracing::warn!(presentation_id = %id, error = %e, "Image cleanup failed");
        }
    }
    Ok(Json(ClearedResponse {
        status: "success",
        deleted_count: removed.len(),
    }))
}

/// `POST /presentations/:id/publish`: toggles gallery visibility.
pub async fn toggle_publish(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
) -> Result<Json<PublishResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    owned_presentation(&conn, &id, &caller.user.id)?;
    let published = presentation_is_published(&conn, &id)?
        .ok_or_else(ApiError::presentation_not_found)?;
    if !set_published(&conn, &id, !published)? {
        return Err(ApiError::presentation_not_found());
    }
    Ok(Json(PublishResponse {
        status: "success",
        is_published: i64::from(!published),
    }))
}
