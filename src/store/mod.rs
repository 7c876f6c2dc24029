//! Persistence seams: the token store and the read-only account view.
//!
//! Every mutation here is a single atomic operation on one record (or one
//! fingerprint); callers never hold locks across calls.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::account::Account;
use crate::models::token::Token;

pub mod memory;
pub mod postgres;

/// Filter for listing tokens. Empty query = all live tokens.
#[derive(Debug, Clone, Default)]
pub struct TokenQuery {
    /// Exact bearer value.
    pub token: Option<String>,
    pub account_id: Option<String>,
}

impl TokenQuery {
    pub fn matches(&self, t: &Token) -> bool {
        self.token.as_deref().map_or(true, |v| v == t.token)
            && self.account_id.as_deref().map_or(true, |a| a == t.account_id)
    }
}

/// Result of an idempotent issuance attempt.
#[derive(Debug, Clone)]
pub enum FindOrCreate {
    Created(Token),
    Existing(Token),
}

impl FindOrCreate {
    pub fn into_token(self) -> Token {
        match self {
            FindOrCreate::Created(t) | FindOrCreate::Existing(t) => t,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, FindOrCreate::Created(_))
    }
}

/// All reads treat tokens whose `expires_at <= now` as absent.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn find(&self, query: &TokenQuery) -> anyhow::Result<Vec<Token>>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Token>>;

    async fn find_by_value(&self, value: &str) -> anyhow::Result<Option<Token>>;

    /// Unconditional insert (explicit-new issuance).
    async fn insert(&self, token: &Token) -> anyhow::Result<()>;

    /// Atomically return the live token matching `candidate`'s fingerprint,
    /// or insert `candidate` if none exists.
    async fn find_or_create(&self, candidate: Token) -> anyhow::Result<FindOrCreate>;

    /// Atomically set `expires_at = max(expires_at, now + lifespan)` on a
    /// live token. Persistent tokens come back unchanged.
    async fn extend_expiry(&self, value: &str, now: DateTime<Utc>) -> anyhow::Result<Option<Token>>;

    /// Idempotent: returns whether a record was removed.
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn delete_by_account(&self, account_id: &str) -> anyhow::Result<u64>;

    /// Physically remove tokens that expired before `cutoff`.
    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;
}

#[async_trait]
pub trait AccountView: Send + Sync {
    async fn find_account(&self, id: &str) -> anyhow::Result<Option<Account>>;
}

/// Run a store call under `limit`; elapsed time becomes a retryable
/// [`AppError::StoreTimeout`], store failures become [`AppError::Internal`].
pub async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, AppError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res.map_err(AppError::Internal),
        Err(_) => Err(AppError::StoreTimeout(limit)),
    }
}
