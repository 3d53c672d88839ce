//! Public gallery of published presentations. No authentication.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;

use super::PageQuery;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::repository::{get_presentation_public, list_published};
use crate::models::{GalleryDetail, GalleryItem};

#[derive(Serialize)]
pub struct GalleryResponse {
    pub presentations: Vec<GalleryItem>,
}

/// `GET /gallery`
pub async fn list(
    State(ctx): State<ApiContext>,
    Query(page): Query<PageQuery>,
) -> Result<Json<GalleryResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(GalleryResponse {
        presentations: list_published(&conn, page.skip, page.limit_or(20))?,
    }))
}

/// `GET /gallery/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<GalleryDetail>, ApiError> {
    let conn = ctx.core.open_db()?;
    get_presentation_public(&conn, &id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Presentation not found or not published".into()))
}
