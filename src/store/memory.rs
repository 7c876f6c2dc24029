use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::account::Account;
use crate::models::token::{Fingerprint, Token};
use crate::store::{AccountView, FindOrCreate, TokenQuery, TokenStore};

/// DashMap-backed token store.
///
/// `tokens` is the source of truth, `by_value` indexes bearer values.
/// `issuance` counts stored records per fingerprint; its shard write guard
/// serializes idempotent issuance for that fingerprint. An entry is dropped
/// once its count reaches zero, so the map never outgrows `tokens`.
#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: DashMap<Uuid, Token>,
    by_value: DashMap<String, Uuid>,
    issuance: DashMap<Fingerprint, usize>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired ones included.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Fingerprints with at least one stored record.
    pub fn tracked_fingerprints(&self) -> usize {
        self.issuance.len()
    }

    fn put(&self, token: &Token) {
        self.by_value.insert(token.token.clone(), token.id);
        self.tokens.insert(token.id, token.clone());
    }

    fn remove(&self, id: Uuid) -> bool {
        match self.tokens.remove(&id) {
            Some((_, t)) => {
                self.by_value.remove(&t.token);
                let fp = t.fingerprint();
                if let Some(mut count) = self.issuance.get_mut(&fp) {
                    *count = count.saturating_sub(1);
                }
                self.issuance.remove_if(&fp, |_, count| *count == 0);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn find(&self, query: &TokenQuery) -> anyhow::Result<Vec<Token>> {
        let now = Utc::now();
        let mut out: Vec<Token> = self
            .tokens
            .iter()
            .filter(|t| t.is_live(now) && query.matches(t))
            .map(|t| t.clone())
            .collect();
        out.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(out)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Token>> {
        let now = Utc::now();
        Ok(self
            .tokens
            .get(&id)
            .filter(|t| t.is_live(now))
            .map(|t| t.clone()))
    }

    async fn find_by_value(&self, value: &str) -> anyhow::Result<Option<Token>> {
        let id = match self.by_value.get(value) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.find_by_id(id).await
    }

    async fn insert(&self, token: &Token) -> anyhow::Result<()> {
        if self.by_value.contains_key(&token.token) {
            anyhow::bail!("duplicate token value");
        }
        self.put(token);
        *self.issuance.entry(token.fingerprint()).or_insert(0) += 1;
        Ok(())
    }

    async fn find_or_create(&self, candidate: Token) -> anyhow::Result<FindOrCreate> {
        let fp = candidate.fingerprint();
        // Held until the end of this block; no await inside.
        let mut slot = self.issuance.entry(fp.clone()).or_insert(0);

        let now = Utc::now();
        let existing = self
            .tokens
            .iter()
            .filter(|t| t.matches(&fp) && t.is_live(now))
            .max_by_key(|t| t.issued_at)
            .map(|t| t.clone());

        if let Some(t) = existing {
            return Ok(FindOrCreate::Existing(t));
        }

        self.put(&candidate);
        *slot += 1;
        Ok(FindOrCreate::Created(candidate))
    }

    async fn extend_expiry(&self, value: &str, now: DateTime<Utc>) -> anyhow::Result<Option<Token>> {
        let id = match self.by_value.get(value) {
            Some(id) => *id,
            None => return Ok(None),
        };
        // The write guard makes read-extend-write one step per token.
        let Some(mut entry) = self.tokens.get_mut(&id) else {
            return Ok(None);
        };
        if !entry.is_live(now) {
            return Ok(None);
        }
        if let (Some(current), Some(renewed)) = (entry.expires_at, entry.lifespan.expires_at(now)) {
            entry.expires_at = Some(current.max(renewed));
        }
        Ok(Some(entry.clone()))
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.remove(id))
    }

    async fn delete_by_account(&self, account_id: &str) -> anyhow::Result<u64> {
        let ids: Vec<Uuid> = self
            .tokens
            .iter()
            .filter(|t| t.account_id == account_id)
            .map(|t| t.id)
            .collect();
        Ok(ids.into_iter().filter(|id| self.remove(*id)).count() as u64)
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let ids: Vec<Uuid> = self
            .tokens
            .iter()
            .filter(|t| t.expires_at.map_or(false, |exp| exp < cutoff))
            .map(|t| t.id)
            .collect();
        Ok(ids.into_iter().filter(|id| self.remove(*id)).count() as u64)
    }
}

/// Account view over a DashMap; seeded by tests or dev bootstrap.
#[derive(Default)]
pub struct InMemoryAccounts {
    accounts: DashMap<String, Account>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, account: Account) {
        self.accounts.insert(account.id.clone(), account);
    }
}

#[async_trait]
impl AccountView for InMemoryAccounts {
    async fn find_account(&self, id: &str) -> anyhow::Result<Option<Account>> {
        Ok(self.accounts.get(id).map(|a| a.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::capability::CapabilitySet;
    use crate::models::token::{generate_token_value, Lifespan, DEFAULT_PURPOSE};
    use chrono::Duration;

    fn token(account: &str, inquirer: &str, lifespan: Lifespan, expires_at: Option<DateTime<Utc>>) -> Token {
        Token {
            id: Uuid::new_v4(),
            token: generate_token_value(),
            account_id: account.into(),
            token_type: lifespan.token_type(),
            purpose: DEFAULT_PURPOSE.into(),
            initiator: "admin".into(),
            inquirer: inquirer.into(),
            description: String::new(),
            permissions: CapabilitySet::new(),
            lifespan,
            issued_at: Utc::now(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_expired_tokens_read_as_absent() {
        let store = InMemoryTokenStore::new();
        let t = token("a", "svc", Lifespan::Seconds(60), Some(Utc::now() - Duration::seconds(1)));
        store.insert(&t).await.unwrap();
        assert!(store.find_by_id(t.id).await.unwrap().is_none());
        assert!(store.find_by_value(&t.token).await.unwrap().is_none());
        assert!(store.find(&TokenQuery::default()).await.unwrap().is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_find_or_create_reuses_live_token() {
        let store = InMemoryTokenStore::new();
        let first = store
            .find_or_create(token("a", "svc", Lifespan::Seconds(60), Some(Utc::now() + Duration::seconds(60))))
            .await
            .unwrap();
        assert!(first.was_created());
        let second = store
            .find_or_create(token("a", "svc", Lifespan::Seconds(60), Some(Utc::now() + Duration::seconds(60))))
            .await
            .unwrap();
        assert!(!second.was_created());
        assert_eq!(first.into_token().id, second.into_token().id);
    }

    #[tokio::test]
    async fn test_find_or_create_ignores_expired_match() {
        let store = InMemoryTokenStore::new();
        let stale = token("a", "svc", Lifespan::Seconds(60), Some(Utc::now() - Duration::seconds(1)));
        store.insert(&stale).await.unwrap();
        let res = store
            .find_or_create(token("a", "svc", Lifespan::Seconds(60), Some(Utc::now() + Duration::seconds(60))))
            .await
            .unwrap();
        assert!(res.was_created());
        assert_ne!(res.into_token().id, stale.id);
    }

    #[tokio::test]
    async fn test_extend_expiry_is_monotonic() {
        let store = InMemoryTokenStore::new();
        let far = Utc::now() + Duration::days(30);
        let t = token("a", "svc", Lifespan::Seconds(60), Some(far));
        store.insert(&t).await.unwrap();
        let refreshed = store.extend_expiry(&t.token, Utc::now()).await.unwrap().unwrap();
        assert_eq!(refreshed.expires_at, Some(far));
    }

    #[tokio::test]
    async fn test_extend_expiry_leaves_persistent_tokens() {
        let store = InMemoryTokenStore::new();
        let t = token("a", "svc", Lifespan::Infinite, None);
        store.insert(&t).await.unwrap();
        let refreshed = store.extend_expiry(&t.token, Utc::now()).await.unwrap().unwrap();
        assert!(refreshed.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemoryTokenStore::new();
        let t = token("a", "svc", Lifespan::Infinite, None);
        store.insert(&t).await.unwrap();
        assert!(store.delete(t.id).await.unwrap());
        assert!(!store.delete(t.id).await.unwrap());
        assert!(store.find_by_value(&t.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_by_account() {
        let store = InMemoryTokenStore::new();
        store.insert(&token("a", "x", Lifespan::Infinite, None)).await.unwrap();
        store.insert(&token("a", "y", Lifespan::Infinite, None)).await.unwrap();
        store.insert(&token("b", "x", Lifespan::Infinite, None)).await.unwrap();
        assert_eq!(store.delete_by_account("a").await.unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.tracked_fingerprints(), 1);
    }

    #[tokio::test]
    async fn test_issuance_slots_follow_stored_records() {
        let store = InMemoryTokenStore::new();
        let now = Utc::now();
        let live = Some(now + Duration::seconds(60));

        let a = store.find_or_create(token("a", "x", Lifespan::Seconds(60), live)).await.unwrap().into_token();
        let b = token("a", "x", Lifespan::Seconds(60), live);
        store.insert(&b).await.unwrap();
        let c = store.find_or_create(token("a", "y", Lifespan::Seconds(60), live)).await.unwrap().into_token();
        assert_eq!(store.tracked_fingerprints(), 2);

        // One of two records for ("a", "x") gone: slot stays.
        store.delete(a.id).await.unwrap();
        assert_eq!(store.tracked_fingerprints(), 2);

        store.delete(b.id).await.unwrap();
        store.delete(c.id).await.unwrap();
        assert_eq!(store.tracked_fingerprints(), 0);

        let stale = token("a", "z", Lifespan::Seconds(1), Some(now - Duration::days(2)));
        store.insert(&stale).await.unwrap();
        store.purge_expired(now - Duration::days(1)).await.unwrap();
        assert_eq!(store.tracked_fingerprints(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_purge_expired_respects_cutoff() {
        let store = InMemoryTokenStore::new();
        let now = Utc::now();
        store.insert(&token("a", "old", Lifespan::Seconds(1), Some(now - Duration::days(2)))).await.unwrap();
        store.insert(&token("a", "recent", Lifespan::Seconds(1), Some(now - Duration::minutes(5)))).await.unwrap();
        store.insert(&token("a", "forever", Lifespan::Infinite, None)).await.unwrap();
        let removed = store.purge_expired(now - Duration::days(1)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_query_filters_by_value() {
        let store = InMemoryTokenStore::new();
        let a = token("a", "x", Lifespan::Infinite, None);
        store.insert(&a).await.unwrap();
        store.insert(&token("a", "y", Lifespan::Infinite, None)).await.unwrap();
        let q = TokenQuery { token: Some(a.token.clone()), account_id: None };
        let found = store.find(&q).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);
    }
}
