//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, verifies the JWT for the
//! route's role, loads the account row and injects `UserContext` or
//! `AdminContext` into request extensions for downstream handlers.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{AdminContext, ApiContext, UserContext};
use crate::auth::{decode_token, Claims, TokenRole};
use crate::db::repository::{get_admin_by_id, get_user_by_id};

fn api_context(req: &Request<axum::body::Body>) -> Result<ApiContext, ApiError> {
    req.extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))
}

fn bearer_claims(
    req: &Request<axum::body::Body>,
    ctx: &ApiContext,
    role: TokenRole,
) -> Result<Claims, ApiError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(ApiError::unauthorized)?;

    decode_token(&ctx.core.config.jwt_secret, token, role).map_err(|e| {
        tracing::debug!(error = %e, role = role.as_str(), "Token rejected");
        ApiError::unauthorized()
    })
}

/// Require a valid member token.
pub async fn require_user(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_user_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_user_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = api_context(&req)?;
    let claims = bearer_claims(&req, &ctx, TokenRole::User)?;

    let user = {
        let conn = ctx.core.open_db()?;
        get_user_by_id(&conn, &claims.sub)?.ok_or_else(ApiError::unauthorized)?
    };

    req.extensions_mut().insert(UserContext { user });
    Ok(next.run(req).await)
}

/// Require a valid admin token.
pub async fn require_admin(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_admin_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_admin_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = api_context(&req)?;
    let claims = bearer_claims(&req, &ctx, TokenRole::Admin)?;

    let admin = {
        let conn = ctx.core.open_db()?;
        get_admin_by_id(&conn, &claims.sub)?.ok_or_else(ApiError::unauthorized)?
    };

    req.extensions_mut().insert(AdminContext { admin });
    Ok(next.run(req).await)
}
