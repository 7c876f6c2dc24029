//! IAM token service library.
//!
//! Exposes the token lifecycle services and the HTTP router so the binary
//! and the integration tests in `tests/` share one composition path.

use std::sync::Arc;

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod store;
pub mod tokens;

use middleware::audit::AuditSink;
use models::token::Lifespan;
use store::{AccountView, TokenStore};
use tokens::{IntrospectionService, RefreshService, RevocationService, TokenIssuer};

/// Shared application state passed to handlers and middleware.
///
/// The audit sink is constructed once by the composing application and
/// handed to every service.
pub struct AppState {
    pub config: config::Config,
    pub tokens: Arc<dyn TokenStore>,
    pub accounts: Arc<dyn AccountView>,
    pub audit: Arc<dyn AuditSink>,
    pub issuer: TokenIssuer,
    pub introspection: IntrospectionService,
    pub refresher: RefreshService,
    pub revocation: RevocationService,
}

impl AppState {
    pub fn new(
        config: config::Config,
        tokens: Arc<dyn TokenStore>,
        accounts: Arc<dyn AccountView>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let timeout = config.store_timeout();
        let default_lifespan = Lifespan::Seconds(config.default_token_lifespan_secs);

        Self {
            issuer: TokenIssuer::new(
                tokens.clone(),
                accounts.clone(),
                audit.clone(),
                timeout,
                default_lifespan,
            ),
            introspection: IntrospectionService::new(
                tokens.clone(),
                accounts.clone(),
                audit.clone(),
                timeout,
            ),
            refresher: RefreshService::new(tokens.clone(), audit.clone(), timeout),
            revocation: RevocationService::new(tokens.clone(), audit.clone(), timeout),
            config,
            tokens,
            accounts,
            audit,
        }
    }
}
