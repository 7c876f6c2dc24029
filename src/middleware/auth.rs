use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::errors::AppError;
use crate::middleware::rbac::{Caller, RequestContext};
use crate::store::bounded;
use crate::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

fn bearer(req: &Request) -> Option<&str> {
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve a bearer value to the calling identity. Expired, revoked and
/// unknown tokens, and tokens whose account is disabled, all yield `None`.
pub async fn resolve_caller(state: &AppState, value: &str) -> Result<Option<Caller>, AppError> {
    let timeout = state.config.store_timeout();
    let Some(token) = bounded(timeout, state.tokens.find_by_value(value)).await? else {
        return Ok(None);
    };
    let account = match bounded(timeout, state.accounts.find_account(&token.account_id)).await? {
        Some(a) if a.is_active() => a,
        _ => return Ok(None),
    };
    Ok(Some(Caller {
        account_id: account.id,
        role: account.role,
        permissions: token.permissions,
        token: Some(value.to_string()),
    }))
}

/// Middleware: authenticates `Authorization: Bearer <token>` and stores a
/// [`RequestContext`] in the request extensions. Returns 401 otherwise.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let Some(value) = bearer(&req).map(String::from) else {
        tracing::warn!("token API: missing bearer token");
        return Err(AppError::Unauthorized);
    };

    let caller = resolve_caller(&state, &value).await?.ok_or_else(|| {
        tracing::warn!(token = %crate::middleware::redact::mask_token(&value), "token API: invalid bearer token");
        AppError::Unauthorized
    })?;

    req.extensions_mut().insert(RequestContext::new(caller, request_id));
    Ok(next.run(req).await)
}

/// Middleware: guarantees every request and response carries an
/// `x-request-id`, reusing the caller's value when present.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let req_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if let Ok(val) = axum::http::HeaderValue::from_str(&req_id) {
        req.headers_mut().insert(REQUEST_ID_HEADER, val.clone());
        let mut resp = next.run(req).await;
        resp.headers_mut().insert(REQUEST_ID_HEADER, val);
        return resp;
    }
    next.run(req).await
}
