use std::sync::Mutex;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::middleware::rbac::RequestContext;
use crate::middleware::redact::mask_token;
use crate::models::audit::{AuditAction, AuditEntry};
use crate::models::token::Token;

/// Append-only audit trail. Implementations must not block the caller.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

fn entry(
    action: AuditAction,
    token: String,
    ctx: &RequestContext,
    data: Option<serde_json::Value>,
) -> AuditEntry {
    AuditEntry {
        id: Uuid::new_v4(),
        action,
        token,
        account_id: ctx.caller.account_id.clone(),
        request_id: ctx.request_id.clone(),
        data,
        timestamp: Utc::now(),
    }
}

pub fn token_created(ctx: &RequestContext, token: &Token, data: serde_json::Value) -> AuditEntry {
    entry(AuditAction::TokenCreate, mask_token(&token.token), ctx, Some(data))
}

pub fn token_introspected(ctx: &RequestContext, value: &str) -> AuditEntry {
    entry(AuditAction::TokenIntrospect, mask_token(value), ctx, None)
}

pub fn token_refreshed(ctx: &RequestContext, token: &Token) -> AuditEntry {
    entry(AuditAction::TokenRefresh, mask_token(&token.token), ctx, None)
}

/// Record ids are not secret and are logged verbatim.
pub fn token_deleted(ctx: &RequestContext, id: &str) -> AuditEntry {
    entry(AuditAction::TokenDelete, id.to_string(), ctx, None)
}

pub fn account_tokens_deleted(ctx: &RequestContext, account_id: &str, removed: u64) -> AuditEntry {
    entry(
        AuditAction::AccountTokensDelete,
        account_id.to_string(),
        ctx,
        Some(serde_json::json!({ "removed": removed })),
    )
}

/// Writes audit entries as structured events on the `audit` tracing target.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) {
        tracing::info!(
            target: "audit",
            audit_id = %entry.id,
            action = entry.action.as_str(),
            token = %entry.token,
            account_id = %entry.account_id,
            request_id = entry.request_id.as_deref().unwrap_or("-"),
            data = %entry.data.as_ref().map(|d| d.to_string()).unwrap_or_default(),
            "audit"
        );
    }
}

/// Async audit log writer. Fires off a Tokio task to insert
/// the entry into PG without blocking the response path.
#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl AuditSink for PgAuditSink {
    fn record(&self, entry: AuditEntry) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if let Err(e) = insert_audit_log(&pool, &entry).await {
                tracing::error!(audit_id = %entry.id, action = entry.action.as_str(), "failed to write audit log: {}", e);
            } else {
                tracing::debug!(audit_id = %entry.id, "audit log recorded");
            }
        });
    }
}

async fn insert_audit_log(pool: &PgPool, entry: &AuditEntry) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, created_at, action, token, account_id, request_id, data)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.id)
    .bind(entry.timestamp)
    .bind(entry.action.as_str())
    .bind(&entry.token)
    .bind(&entry.account_id)
    .bind(&entry.request_id)
    .bind(&entry.data)
    .execute(pool)
    .await?;

    Ok(())
}

/// Keeps entries in memory; used by tests and the memory store backend.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count(&self, action: AuditAction) -> usize {
        self.entries().iter().filter(|e| e.action == action).count()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: AuditEntry) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::rbac::Caller;

    fn ctx() -> RequestContext {
        RequestContext::new(Caller::system(), Some("req-42".into()))
    }

    #[test]
    fn test_introspect_entry_masks_value() {
        let e = token_introspected(&ctx(), "0123456789");
        assert_eq!(e.action, AuditAction::TokenIntrospect);
        assert_eq!(e.token, "******6789");
        assert_eq!(e.account_id, "system");
        assert_eq!(e.request_id.as_deref(), Some("req-42"));
    }

    #[test]
    fn test_delete_entry_keeps_id_verbatim() {
        let id = Uuid::new_v4().to_string();
        let e = token_deleted(&ctx(), &id);
        assert_eq!(e.token, id);
    }

    #[test]
    fn test_memory_sink_counts_by_action() {
        let sink = MemoryAuditSink::new();
        sink.record(token_deleted(&ctx(), "a"));
        sink.record(token_deleted(&ctx(), "b"));
        sink.record(token_introspected(&ctx(), "abc"));
        assert_eq!(sink.count(AuditAction::TokenDelete), 2);
        assert_eq!(sink.count(AuditAction::TokenIntrospect), 1);
        assert_eq!(sink.entries().len(), 3);
    }

    #[test]
    fn test_action_wire_names() {
        assert_eq!(
            serde_json::to_value(AuditAction::TokenCreate).unwrap(),
            serde_json::json!("token.create")
        );
        assert_eq!(AuditAction::TokenIntrospect.as_str(), "iam.token.introspect");
    }
}
