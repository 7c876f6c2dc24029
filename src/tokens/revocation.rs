use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::errors::AppError;
use crate::middleware::audit::{self, AuditSink};
use crate::middleware::rbac::RequestContext;
use crate::store::{bounded, TokenStore};

pub struct RevocationService {
    store: Arc<dyn TokenStore>,
    audit: Arc<dyn AuditSink>,
    timeout: Duration,
}

impl RevocationService {
    pub fn new(store: Arc<dyn TokenStore>, audit: Arc<dyn AuditSink>, timeout: Duration) -> Self {
        Self { store, audit, timeout }
    }

    /// Delete by record id. Revoking an absent token succeeds.
    pub async fn revoke(&self, ctx: &RequestContext, id: Uuid) -> Result<(), AppError> {
        let removed = bounded(self.timeout, self.store.delete(id)).await?;
        self.audit.record(audit::token_deleted(ctx, &id.to_string()));
        tracing::info!(token_id = %id, removed, "token revoked");
        Ok(())
    }

    /// Drop every token owned by an account, e.g. after the account was deleted.
    pub async fn revoke_account(&self, ctx: &RequestContext, account_id: &str) -> Result<u64, AppError> {
        let removed = bounded(self.timeout, self.store.delete_by_account(account_id)).await?;
        self.audit.record(audit::account_tokens_deleted(ctx, account_id, removed));
        tracing::info!(account_id, removed, "account tokens revoked");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::audit::MemoryAuditSink;
    use crate::middleware::rbac::Caller;
    use crate::models::audit::AuditAction;

    #[tokio::test]
    async fn test_revoke_unknown_id_is_ok_and_audited() {
        let store = Arc::new(crate::store::memory::InMemoryTokenStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let svc = RevocationService::new(store, audit.clone(), Duration::from_secs(1));
        let id = Uuid::new_v4();
        let ctx = RequestContext::new(Caller::system(), Some("r-9".into()));

        svc.revoke(&ctx, id).await.unwrap();
        svc.revoke(&ctx, id).await.unwrap();

        let entries = audit.entries();
        assert_eq!(audit.count(AuditAction::TokenDelete), 2);
        assert_eq!(entries[0].token, id.to_string());
        assert_eq!(entries[0].request_id.as_deref(), Some("r-9"));
    }
}
