use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::middleware::rbac::{self, RequestContext, TOKEN_CREATE, TOKEN_DELETE, TOKEN_INTROSPECT};
use crate::models::token::Token;
use crate::store::{bounded, TokenQuery};
use crate::tokens::CreateTokenRequest;
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub token_id: Option<String>,
}

#[derive(Deserialize)]
pub struct IntrospectRequest {
    pub token: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
}

// ── Handlers ─────────────────────────────────────────────────

/// GET /api/v1/tokens: list live tokens (admin only)
pub async fn list_tokens(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Token>>, AppError> {
    rbac::require_admin(&ctx.caller)?;

    let query = TokenQuery {
        token: params.token_id,
        account_id: None,
    };
    let tokens = bounded(state.config.store_timeout(), state.tokens.find(&query)).await?;
    Ok(Json(tokens))
}

/// POST /api/v1/tokens: create a token, or reuse the live one for the
/// same fingerprint unless `new` is set
pub async fn create_token(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<CreateTokenRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    rbac::can(&ctx.caller, &[TOKEN_CREATE])?;
    let Json(payload) = payload?;

    let token = state.issuer.issue(&ctx, payload).await?;
    Ok(Json(TokenResponse { token: token.token }))
}

/// POST /api/v1/tokens/introspect: resolve a token to its account's claims
pub async fn introspect_token(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<IntrospectRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    rbac::can(&ctx.caller, &[TOKEN_INTROSPECT])?;
    let Json(payload) = payload?;

    match state.introspection.introspect(&ctx, &payload.token).await? {
        Some(claims) => Ok(Json(claims).into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

/// GET /api/v1/tokens/refresh: prolong the caller's own token
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<TokenResponse>, AppError> {
    let current = ctx.caller.token.clone().ok_or(AppError::SessionExpired)?;
    let token = state.refresher.refresh(&ctx, &current).await?;
    Ok(Json(TokenResponse { token: token.token }))
}

/// GET /api/v1/tokens/:id: fetch one token record (admin only)
pub async fn get_token(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<Json<Token>, AppError> {
    rbac::require_admin(&ctx.caller)?;

    let id = Uuid::parse_str(&id).map_err(|_| AppError::NotFound)?;
    let token = bounded(state.config.store_timeout(), state.tokens.find_by_id(id))
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(token))
}

/// DELETE /api/v1/tokens/:id: revoke a token; unknown ids succeed
pub async fn delete_token(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    rbac::can(&ctx.caller, &[TOKEN_DELETE])?;

    match Uuid::parse_str(&id) {
        Ok(id) => state.revocation.revoke(&ctx, id).await?,
        Err(_) => tracing::debug!(id = %id, "delete: id is not a token id, nothing to revoke"),
    }
    Ok(StatusCode::OK)
}
