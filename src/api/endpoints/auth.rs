//! Sign-up and sign-in for members and administrators.
//!
//! - `POST /auth/register`: invite-only registration
//! - `POST /auth/login`: member login
//! - `GET /auth/me`: current member with balance
//! - `POST /admin/auth/login`: administrator login

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::blocking;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::auth::{hash_password, issue_token, verify_password, TokenRole};
use crate::db::repository::{
    get_admin_by_username, get_register_bonus_scores, get_scores_per_slide, get_user_by_username,
    get_user_scores, register_user, RegisterOutcome,
};
use crate::models::User;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub invite_code: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub scores: i64,
    pub scores_per_slide: i64,
}

#[derive(Serialize)]
pub struct UserTokenResponse {
    pub access_token: String,
    pub user: UserProfile,
}

#[derive(Serialize)]
pub struct AdminProfile {
    pub id: String,
    pub username: String,
}

#[derive(Serialize)]
pub struct AdminTokenResponse {
    pub access_token: String,
    pub admin: AdminProfile,
}

fn bad_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid username or password".into())
}

fn user_token_response(ctx: &ApiContext, user: User, scores_per_slide: i64) -> Result<Json<UserTokenResponse>, ApiError> {
    let access_token = issue_token(&ctx.core.config.jwt_secret, &user.id, TokenRole::User)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(UserTokenResponse {
        access_token,
        user: UserProfile {
            id: user.id,
            username: user.username,
            scores: user.scores,
            scores_per_slide,
        },
    }))
}

/// Check a password against its stored hash off the async runtime.
async fn password_matches(password: String, stored: String) -> Result<bool, ApiError> {
    blocking(move || Ok(verify_password(&password, &stored))).await
}

/// `POST /auth/register`
pub async fn register(
    State(ctx): State<ApiContext>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<UserTokenResponse>, ApiError> {
    let iterations = ctx.core.config.password_iterations;
    let password = req.password;
    let hash = blocking(move || Ok(hash_password(&password, iterations))).await?;

    let conn = ctx.core.open_db()?;
    let bonus = get_register_bonus_scores(&conn)?;
    let user = match register_user(&conn, &req.invite_code, &req.username, &hash, bonus)? {
        RegisterOutcome::Registered(user) => user,
        RegisterOutcome::InvalidInvite => {
            return Err(ApiError::BadRequest("Invalid or already used invite code".into()))
        }
        RegisterOutcome::UsernameTaken => {
            return Err(ApiError::BadRequest("Username already exists".into()))
        }
    };

    tracing::info!(user_id = %user.id, bonus, "User registered");
    let scores_per_slide = get_scores_per_slide(&conn)?;
    user_token_response(&ctx, user, scores_per_slide)
}

/// `POST /auth/login`
pub async fn login(
    State(ctx): State<ApiContext>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<UserTokenResponse>, ApiError> {
    let (user, scores_per_slide) = {
        let conn = ctx.core.open_db()?;
        let user = get_user_by_username(&conn, &req.username)?.ok_or_else(bad_credentials)?;
        (user, get_scores_per_slide(&conn)?)
    };

    if !password_matches(req.password, user.password_hash.clone()).await? {
        return Err(bad_credentials());
    }
    user_token_response(&ctx, user, scores_per_slide)
}

/// `GET /auth/me`
pub async fn me(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
) -> Result<Json<UserProfile>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(UserProfile {
        scores: get_user_scores(&conn, &caller.user.id)?,
        scores_per_slide: get_scores_per_slide(&conn)?,
        id: caller.user.id,
        username: caller.user.username,
    }))
}

/// `POST /admin/auth/login`
pub async fn admin_login(
    State(ctx): State<ApiContext>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AdminTokenResponse>, ApiError> {
    let admin = {
        let conn = ctx.core.open_db()?;
        get_admin_by_username(&conn, &req.username)?.ok_or_else(bad_credentials)?
    };

    if !password_matches(req.password, admin.password_hash.clone()).await? {
        return Err(bad_credentials());
    }

    let access_token = issue_token(&ctx.core.config.jwt_secret, &admin.id, TokenRole::Admin)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    tracing::info!(admin_id = %admin.id, "Admin signed in");
    Ok(Json(AdminTokenResponse {
        access_token,
        admin: AdminProfile {
            id: admin.id,
            username: admin.username,
        },
    }))
}
