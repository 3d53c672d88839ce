//! Administration: accounts, presentations, pricing, codes and the score
//! ledger. Every route here sits behind `require_admin`.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::auth::AdminProfile;
use super::user::{PasswordChangeRequest, ScoreLogsResponse, StatusResponse};
use super::{blocking, PageQuery};
use crate::api::error::ApiError;
use crate::api::types::{AdminContext, ApiContext};
use crate::auth::{hash_password, verify_password};
use crate::db::repository::{
    create_invite_codes_by_admin, create_redemption_codes, create_user, delete_invite_code_admin,
    delete_redemption_code_admin, get_presentation, get_register_bonus_scores,
    get_scores_per_slide, get_user_by_username, list_all_presentations_admin,
    list_invite_codes_admin, list_redemption_codes_admin, list_score_logs_admin, list_users_admin,
    set_config, update_admin_password, REGISTER_BONUS_KEY, SCORES_PER_SLIDE_KEY,
};
use crate::models::{
    AdminPresentationItem, CodeDeletion, InviteCodeItem, PresentationDetail, RedemptionCodeItem,
    UserItem,
};

const DEFAULT_ADMIN_PAGE: i64 = 100;

#[derive(Deserialize)]
pub struct UserFilterQuery {
    pub user_id: Option<String>,
    #[serde(default)]
    pub skip: i64,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct UsedFilterQuery {
    pub used: Option<bool>,
    #[serde(default)]
    pub skip: i64,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct UsersResponse {
    pub users: Vec<UserItem>,
    pub total: i64,
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub initial_scores: Option<i64>,
}

#[derive(Serialize)]
pub struct CreatedUser {
    pub id: String,
    pub username: String,
    pub scores: i64,
}

#[derive(Serialize)]
pub struct PresentationsResponse {
    pub presentations: Vec<AdminPresentationItem>,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct PricingConfig {
    pub scores_per_slide: i64,
    pub register_bonus_scores: i64,
}

#[derive(Deserialize)]
pub struct PricingUpdate {
    pub scores_per_slide: Option<i64>,
    pub register_bonus_scores: Option<i64>,
}

#[derive(Deserialize)]
pub struct RedemptionCodesRequest {
    pub scores: i64,
    pub count: usize,
}

#[derive(Serialize)]
pub struct RedemptionCodesCreated {
    pub codes: Vec<String>,
    pub scores: i64,
}

#[derive(Serialize)]
pub struct RedemptionCodesResponse {
    pub redemption_codes: Vec<RedemptionCodeItem>,
    pub total: i64,
}

#[derive(Deserialize)]
pub struct InviteCodesRequest {
    pub count: usize,
}

#[derive(Serialize)]
pub struct InviteCodesCreated {
    pub codes: Vec<String>,
}

#[derive(Serialize)]
pub struct InviteCodesResponse {
    pub invite_codes: Vec<InviteCodeItem>,
    pub total: i64,
}

/// `GET /admin/me`
pub async fn me(Extension(caller): Extension<AdminContext>) -> Json<AdminProfile> {
    Json(AdminProfile {
        id: caller.admin.id,
        username: caller.admin.username,
    })
}

/// `PATCH /admin/me/password`
pub async fn change_password(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AdminContext>,
    Json(req): Json<PasswordChangeRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let iterations = ctx.core.config.password_iterations;
    let stored = caller.admin.password_hash.clone();
    let new_hash = blocking(move || {
        if !verify_password(&req.old_password, &stored) {
            return Err(ApiError::BadRequest("Wrong current password".into()));
        }
        Ok(hash_password(&req.new_password, iterations))
    })
    .await?;

    let conn = ctx.core.open_db()?;
    if !update_admin_password(&conn, &caller.admin.id, &new_hash)? {
        return Err(ApiError::NotFound("Admin not found".into()));
    }
    tracing::info!(admin_id = %caller.admin.id, "Admin password changed");
    Ok(StatusResponse::success())
}

/// `GET /admin/users`
pub async fn list_users(
    State(ctx): State<ApiContext>,
    Query(page): Query<PageQuery>,
) -> Result<Json<UsersResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let (users, total) = list_users_admin(&conn, page.skip, page.limit_or(DEFAULT_ADMIN_PAGE))?;
    Ok(Json(UsersResponse { users, total }))
}

/// `POST /admin/users`: creates a member without an invite code.
pub async fn create_member(
    State(ctx): State<ApiContext>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<CreatedUser>, ApiError> {
    let taken = {
        let conn = ctx.core.open_db()?;
        get_user_by_username(&conn, &req.username)?.is_some()
    };
    if taken {
        return Err(ApiError::BadRequest("Username already exists".into()));
    }

    let iterations = ctx.core.config.password_iterations;
    let password = req.password;
    let hash = blocking(move || Ok(hash_password(&password, iterations))).await?;

    let conn = ctx.core.open_db()?;
    let user = create_user(&conn, &req.username, &hash, req.initial_scores.unwrap_or(0))?
        .ok_or_else(|| ApiError::BadRequest("Failed to create user".into()))?;
    Ok(Json(CreatedUser {
        id: user.id,
        username: user.username,
        scores: user.scores,
    }))
}

/// `GET /admin/presentations`
pub async fn list_presentations(
    State(ctx): State<ApiContext>,
    Query(query): Query<UserFilterQuery>,
) -> Result<Json<PresentationsResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let (presentations, total) = list_all_presentations_admin(
        &conn,
        query.user_id.as_deref().filter(|u| !u.is_empty()),
        query.skip,
        query.limit.unwrap_or(DEFAULT_ADMIN_PAGE),
    )?;
    Ok(Json(PresentationsResponse {
        presentations,
        total,
    }))
}

/// `GET /admin/presentations/:id`: any owner.
pub async fn presentation_detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<PresentationDetail>, ApiError> {
    let conn = ctx.core.open_db()?;
    get_presentation(&conn, &id, None)?
        .map(Json)
        .ok_or_else(ApiError::presentation_not_found)
}

/// `GET /admin/config`
pub async fn get_pricing(State(ctx): State<ApiContext>) -> Result<Json<PricingConfig>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(PricingConfig {
        scores_per_slide: get_scores_per_slide(&conn)?,
        register_bonus_scores: get_register_bonus_scores(&conn)?,
    }))
}

/// `PATCH /admin/config`: slides cost at least 1, bonuses are never negative.
pub async fn update_pricing(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AdminContext>,
    Json(req): Json<PricingUpdate>,
) -> Result<Json<StatusResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    if let Some(price) = req.scores_per_slide {
        set_config(&conn, SCORES_PER_SLIDE_KEY, &price.max(1).to_string())?;
    }
    if let Some(bonus) = req.register_bonus_scores {
        set_config(&conn, REGISTER_BONUS_KEY, &bonus.max(0).to_string())?;
    }
    tracing::info!(admin_id = %caller.admin.id, "Pricing updated");
    Ok(StatusResponse::success())
}

/// `POST /admin/redemption-codes`
pub async fn create_redemption(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AdminContext>,
    Json(req): Json<RedemptionCodesRequest>,
) -> Result<Json<RedemptionCodesCreated>, ApiError> {
    let conn = ctx.core.open_db()?;
    let codes = create_redemption_codes(&conn, req.scores, req.count, &caller.admin.id)?;
    tracing::info!(admin_id = %caller.admin.id, count = codes.len(), scores = req.scores, "Redemption codes created");
    Ok(Json(RedemptionCodesCreated {
        codes,
        scores: req.scores,
    }))
}

/// `GET /admin/redemption-codes`
pub async fn list_redemption(
    State(ctx): State<ApiContext>,
    Query(query): Query<UsedFilterQuery>,
) -> Result<Json<RedemptionCodesResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let (redemption_codes, total) = list_redemption_codes_admin(
        &conn,
        query.used,
        query.skip,
        query.limit.unwrap_or(DEFAULT_ADMIN_PAGE),
    )?;
    Ok(Json(RedemptionCodesResponse {
        redemption_codes,
        total,
    }))
}

/// `DELETE /admin/redemption-codes/:id`: unused codes only.
pub async fn delete_redemption(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    match delete_redemption_code_admin(&conn, &id)? {
        CodeDeletion::Deleted => Ok(StatusResponse::success()),
        CodeDeletion::NotFound => Err(ApiError::NotFound("Redemption code not found".into())),
        CodeDeletion::AlreadyUsed => Err(ApiError::BadRequest(
            "Redemption code already used and cannot be deleted".into(),
        )),
    }
}

/// `POST /admin/invite-codes`
pub async fn create_invites(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AdminContext>,
    Json(req): Json<InviteCodesRequest>,
) -> Result<Json<InviteCodesCreated>, ApiError> {
    let conn = ctx.core.open_db()?;
    let codes = create_invite_codes_by_admin(&conn, req.count, &caller.admin.id)?;
    Ok(Json(InviteCodesCreated { codes }))
}

/// `GET /admin/invite-codes`
pub async fn list_invites(
    State(ctx): State<ApiContext>,
    Query(query): Query<UsedFilterQuery>,
) -> Result<Json<InviteCodesResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let (invite_codes, total) = list_invite_codes_admin(
        &conn,
        query.used,
        query.skip,
        query.limit.unwrap_or(DEFAULT_ADMIN_PAGE),
    )?;
    Ok(Json(InviteCodesResponse {
        invite_codes,
        total,
    }))
}

/// `DELETE /admin/invite-codes/:id`: unused codes only.
pub async fn delete_invite(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    match delete_invite_code_admin(&conn, &id)? {
        CodeDeletion::Deleted => Ok(StatusResponse::success()),
        CodeDeletion::NotFound => Err(ApiError::NotFound("Invite code not found".into())),
        CodeDeletion::AlreadyUsed => Err(ApiError::BadRequest(
            "Invite code already used and cannot be deleted".into(),
        )),
    }
}

/// `GET /admin/score-logs`
pub async fn score_logs(
    State(ctx): State<ApiContext>,
    Query(query): Query<UserFilterQuery>,
) -> Result<Json<ScoreLogsResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let (score_logs, total) = list_score_logs_admin(
        &conn,
        query.user_id.as_deref().filter(|u| !u.is_empty()),
        query.skip,
        query.limit.unwrap_or(20),
    )?;
    Ok(Json(ScoreLogsResponse { score_logs, total }))
}
