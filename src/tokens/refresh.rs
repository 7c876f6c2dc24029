use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::errors::AppError;
use crate::middleware::audit::{self, AuditSink};
use crate::middleware::rbac::RequestContext;
use crate::models::token::Token;
use crate::store::{bounded, TokenStore};

/// Renews a live token to `now + lifespan`. The store applies the
/// extension in one atomic step, so concurrent refreshes never move the
/// expiry backwards.
pub struct RefreshService {
    store: Arc<dyn TokenStore>,
    audit: Arc<dyn AuditSink>,
    timeout: Duration,
}

impl RefreshService {
    pub fn new(store: Arc<dyn TokenStore>, audit: Arc<dyn AuditSink>, timeout: Duration) -> Self {
        Self { store, audit, timeout }
    }

    pub async fn refresh(&self, ctx: &RequestContext, value: &str) -> Result<Token, AppError> {
        let token = bounded(self.timeout, self.store.extend_expiry(value, Utc::now()))
            .await?
            .ok_or(AppError::SessionExpired)?;

        self.audit.record(audit::token_refreshed(ctx, &token));
        tracing::debug!(token_id = %token.id, expires_at = ?token.expires_at, "token refreshed");
        Ok(token)
    }
}
