//! Member center: redemption, invite codes, password and score history.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::{blocking, PageQuery};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::auth::{hash_password, verify_password};
use crate::db::repository::{
    count_invite_codes_by_user, create_invite_code_by_user, list_invite_codes_by_user,
    list_score_logs_by_user, record_score_log, update_user_password, use_redemption_code,
    MAX_INVITE_CODES_PER_USER,
};
use crate::models::{NewScoreLog, RedeemOutcome, ScoreLogItem, ScoreLogType, UserInviteCode};

const REDEEM_LOG_PROMPT: &str = "Redemption code recharge";

#[derive(Deserialize)]
pub struct RedeemRequest {
    pub code: String,
}

#[derive(Serialize)]
pub struct RedeemResponse {
    pub scores: i64,
    pub added: i64,
}

#[derive(Serialize)]
pub struct InviteCodeResponse {
    pub code: String,
}

#[derive(Serialize)]
pub struct InviteCodesResponse {
    pub invite_codes: Vec<UserInviteCode>,
}

#[derive(Deserialize)]
pub struct PasswordChangeRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

impl StatusResponse {
    pub fn success() -> Json<Self> {
        Json(Self { status: "success" })
    }
}

#[derive(Serialize)]
pub struct ScoreLogsResponse {
    pub score_logs: Vec<ScoreLogItem>,
    pub total: i64,
}

/// `POST /user/redeem`
pub async fn redeem(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Json(req): Json<RedeemRequest>,
) -> Result<Json<RedeemResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    match use_redemption_code(&conn, req.code.trim(), &caller.user.id)? {
        RedeemOutcome::Redeemed { added, balance } => {
            record_score_log(
                &conn,
                &NewScoreLog {
                    user_id: &caller.user.id,
                    amount: added,
                    balance: Some(balance),
                    prompt: Some(REDEEM_LOG_PROMPT),
                    image_path: None,
                    log_type: ScoreLogType::Recharge,
                },
            )?;
            tracing::info!(user_id = %caller.user.id, added, "Redemption code used");
            Ok(Json(RedeemResponse {
                scores: balance,
                added,
            }))
        }
        RedeemOutcome::AlreadyUsed => {
            Err(ApiError::BadRequest("Redemption code already used".into()))
        }
        RedeemOutcome::Invalid => Err(ApiError::BadRequest("Invalid redemption code".into())),
    }
}

/// `POST /user/invite-codes`
pub async fn create_invite_code(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
) -> Result<Json<InviteCodeResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    if count_invite_codes_by_user(&conn, &caller.user.id)? >= MAX_INVITE_CODES_PER_USER {
        return Err(ApiError::BadRequest(format!(
            "Maximum {MAX_INVITE_CODES_PER_USER} invite codes per user"
        )));
    }
    let code = create_invite_code_by_user(&conn, &caller.user.id)?
        .ok_or_else(|| ApiError::BadRequest("Cannot create more invite codes".into()))?;
    Ok(Json(InviteCodeResponse { code }))
}

/// `GET /user/invite-codes`
pub async fn list_invite_codes(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
) -> Result<Json<InviteCodesResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(InviteCodesResponse {
        invite_codes: list_invite_codes_by_user(&conn, &caller.user.id)?,
    }))
}

/// `PATCH /user/me/password`
pub async fn change_password(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Json(req): Json<PasswordChangeRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let iterations = ctx.core.config.password_iterations;
    let stored = caller.user.password_hash.clone();
    let new_hash = blocking(move || {
        if !verify_password(&req.old_password, &stored) {
            return Err(ApiError::BadRequest("Current password is incorrect".into()));
        }
        Ok(hash_password(&req.new_password, iterations))
    })
    .await?;

    let conn = ctx.core.open_db()?;
    if !update_user_password(&conn, &caller.user.id, &new_hash)? {
        return Err(ApiError::NotFound("User not found".into()));
    }
    Ok(StatusResponse::success())
}

/// `GET /user/score-logs`
pub async fn score_logs(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ScoreLogsResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let (score_logs, total) =
        list_score_logs_by_user(&conn, &caller.user.id, page.skip, page.limit_or(20))?;
    Ok(Json(ScoreLogsResponse { score_logs, total }))
}
