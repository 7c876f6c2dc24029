use std::sync::Arc;
use std::time::Duration;

use crate::errors::AppError;
use crate::middleware::audit::{self, AuditSink};
use crate::middleware::rbac::RequestContext;
use crate::models::account::AccountClaims;
use crate::store::{bounded, AccountView, TokenStore};

/// Resolves a bearer value to the claims of the account it was issued for.
pub struct IntrospectionService {
    store: Arc<dyn TokenStore>,
    accounts: Arc<dyn AccountView>,
    audit: Arc<dyn AuditSink>,
    timeout: Duration,
}

impl IntrospectionService {
    pub fn new(
        store: Arc<dyn TokenStore>,
        accounts: Arc<dyn AccountView>,
        audit: Arc<dyn AuditSink>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            accounts,
            audit,
            timeout,
        }
    }

    /// `Ok(None)` when the value is unknown, expired, revoked, or its account
    /// is gone or disabled. Callers cannot tell these cases apart.
    pub async fn introspect(
        &self,
        ctx: &RequestContext,
        value: &str,
    ) -> Result<Option<AccountClaims>, AppError> {
        let Some(token) = bounded(self.timeout, self.store.find_by_value(value)).await? else {
            return Ok(None);
        };

        let account = match bounded(self.timeout, self.accounts.find_account(&token.account_id)).await? {
            Some(a) if a.is_active() => a,
            _ => {
                tracing::debug!(token_id = %token.id, "introspect: owning account unavailable");
                return Ok(None);
            }
        };

        self.audit.record(audit::token_introspected(ctx, value));
        Ok(Some(AccountClaims::from_token(&account, &token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::audit::MemoryAuditSink;
    use crate::middleware::rbac::Caller;
    use crate::models::account::{Account, AccountStatus, Role};
    use crate::models::audit::AuditAction;
    use crate::models::capability::CapabilitySet;
    use crate::models::token::{generate_token_value, Lifespan, Token, TokenType};
    use crate::store::memory::{InMemoryAccounts, InMemoryTokenStore};
    use chrono::{Duration as ChronoDuration, Utc};
    use uuid::Uuid;

    fn token(account_id: &str, expires_in: i64) -> Token {
        let now = Utc::now();
        Token {
            id: Uuid::new_v4(),
            token: generate_token_value(),
            account_id: account_id.into(),
            token_type: TokenType::EphemeralServiceAccount,
            purpose: "accountToken".into(),
            initiator: "admin".into(),
            inquirer: "svc".into(),
            description: String::new(),
            permissions: ["x", "y"].into_iter().collect::<CapabilitySet>(),
            lifespan: Lifespan::Seconds(60),
            issued_at: now,
            expires_at: Some(now + ChronoDuration::seconds(expires_in)),
        }
    }

    fn setup() -> (IntrospectionService, Arc<InMemoryTokenStore>, Arc<InMemoryAccounts>, Arc<MemoryAuditSink>) {
        let store = Arc::new(InMemoryTokenStore::new());
        let accounts = Arc::new(InMemoryAccounts::new());
        let audit = Arc::new(MemoryAuditSink::new());
        accounts.upsert(Account {
            id: "acc-1".into(),
            username: "jane@example.com".into(),
            firstname: Some("Jane".into()),
            lastname: None,
            role: Role::User,
            status: AccountStatus::Active,
            tenant: Some("tenant-a".into()),
            permissions: CapabilitySet::new(),
        });
        let svc = IntrospectionService::new(store.clone(), accounts.clone(), audit.clone(), Duration::from_secs(1));
        (svc, store, accounts, audit)
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Caller::system(), None)
    }

    #[tokio::test]
    async fn test_live_token_resolves_to_claims() {
        let (svc, store, _, audit) = setup();
        let t = token("acc-1", 60);
        store.insert(&t).await.unwrap();
        let claims = svc.introspect(&ctx(), &t.token).await.unwrap().unwrap();
        assert_eq!(claims.sub, "acc-1");
        assert_eq!(claims.username, "jane@example.com");
        assert_eq!(claims.tenant.as_deref(), Some("tenant-a"));
        assert_eq!(claims.permissions.to_vec(), vec!["x", "y"]);
        assert_eq!(audit.count(AuditAction::TokenIntrospect), 1);
        assert!(!audit.entries()[0].token.contains(&t.token[..10]));
    }

    #[tokio::test]
    async fn test_unknown_and_expired_are_absent_and_unaudited() {
        let (svc, store, _, audit) = setup();
        assert!(svc.introspect(&ctx(), "nope").await.unwrap().is_none());
        let t = token("acc-1", -1);
        store.insert(&t).await.unwrap();
        assert!(svc.introspect(&ctx(), &t.token).await.unwrap().is_none());
        assert!(audit.entries().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_owner_is_absent() {
        let (svc, store, accounts, _) = setup();
        let t = token("acc-1", 60);
        store.insert(&t).await.unwrap();
        let mut acc = accounts.find_account("acc-1").await.unwrap().unwrap();
        acc.status = AccountStatus::Disabled;
        accounts.upsert(acc);
        assert!(svc.introspect(&ctx(), &t.token).await.unwrap().is_none());
    }
}
