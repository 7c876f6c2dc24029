//! Background job: purge tokens that expired longer ago than the retention
//! window.
//!
//! Expired tokens are already invisible to every read; this only reclaims
//! storage, so a failed sweep is logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time;

use crate::store::TokenStore;

/// Spawn the background cleanup task. Call this once at startup.
pub fn spawn(store: Arc<dyn TokenStore>, every: Duration, retention: chrono::Duration) {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = run_once(store.as_ref(), retention).await {
                tracing::error!("token cleanup job failed: {}", e);
            }
        }
    });
}

/// One sweep. Returns the number of purged records.
pub async fn run_once(store: &dyn TokenStore, retention: chrono::Duration) -> anyhow::Result<u64> {
    let cutoff = Utc::now() - retention;
    let purged = store.purge_expired(cutoff).await?;

    if purged > 0 {
        tracing::info!(rows = purged, cutoff = %cutoff, "purged expired tokens");
    }

    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::capability::CapabilitySet;
    use crate::models::token::{generate_token_value, Lifespan, Token, TokenType, DEFAULT_PURPOSE};
    use crate::store::memory::InMemoryTokenStore;
    use uuid::Uuid;

    fn token_expiring(offset: chrono::Duration) -> Token {
        let now = Utc::now();
        Token {
            id: Uuid::new_v4(),
            token: generate_token_value(),
            account_id: "acct-1".into(),
            token_type: TokenType::EphemeralServiceAccount,
            purpose: DEFAULT_PURPOSE.into(),
            initiator: "acct-1".into(),
            inquirer: "cli".into(),
            description: String::new(),
            permissions: CapabilitySet::default(),
            lifespan: Lifespan::Seconds(60),
            issued_at: now - chrono::Duration::days(3),
            expires_at: Some(now + offset),
        }
    }

    #[tokio::test]
    async fn test_run_once_respects_retention() {
        let store = InMemoryTokenStore::new();
        let stale = token_expiring(-chrono::Duration::days(2));
        let recent = token_expiring(-chrono::Duration::minutes(5));
        let live = token_expiring(chrono::Duration::hours(1));
        for t in [&stale, &recent, &live] {
            store.insert(t).await.unwrap();
        }

        let purged = run_once(&store, chrono::Duration::days(1)).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.len(), 2);

        // Nothing left past the window.
        assert_eq!(run_once(&store, chrono::Duration::days(1)).await.unwrap(), 0);
    }
}
