//! Token issuance.
//!
//! Two modes:
//! - idempotent (`new == false`): reuse the live token for the fingerprint
//!   `(accountId, purpose, inquirer)` if one exists, otherwise create it.
//!   Find-or-create is a single atomic store operation.
//! - explicit (`new == true`): always mint a fresh token.
//!
//! Only freshly written tokens are audited.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::errors::AppError;
use crate::middleware::audit::{self, AuditSink};
use crate::middleware::rbac::{self, RequestContext};
use crate::middleware::redact::mask_token;
use crate::models::account::Account;
use crate::models::capability::CapabilitySet;
use crate::models::token::{generate_token_value, Lifespan, Token, DEFAULT_PURPOSE};
use crate::store::{bounded, AccountView, FindOrCreate, TokenStore};

/// Body of `POST /tokens`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenRequest {
    pub account_id: String,
    /// Seconds, or -1 for a persistent token. Omitted = configured default.
    pub expires_in: Option<i64>,
    pub purpose: Option<String>,
    pub inquirer: Option<String>,
    pub description: Option<String>,
    pub custom_permissions: Option<Vec<String>>,
    #[serde(default)]
    pub new: bool,
}

#[derive(Debug, Clone)]
pub struct SignOptions {
    pub purpose: Option<String>,
    pub inquirer: Option<String>,
    pub description: Option<String>,
    pub custom_permissions: CapabilitySet,
    pub lifespan: Lifespan,
    pub is_new: bool,
}

pub struct TokenIssuer {
    store: Arc<dyn TokenStore>,
    accounts: Arc<dyn AccountView>,
    audit: Arc<dyn AuditSink>,
    timeout: Duration,
    default_lifespan: Lifespan,
}

impl TokenIssuer {
    pub fn new(
        store: Arc<dyn TokenStore>,
        accounts: Arc<dyn AccountView>,
        audit: Arc<dyn AuditSink>,
        timeout: Duration,
        default_lifespan: Lifespan,
    ) -> Self {
        Self {
            store,
            accounts,
            audit,
            timeout,
            default_lifespan,
        }
    }

    /// Resolve the target account and sign a token for it.
    pub async fn issue(&self, ctx: &RequestContext, req: CreateTokenRequest) -> Result<Token, AppError> {
        let account = bounded(self.timeout, self.accounts.find_account(&req.account_id))
            .await?
            .ok_or_else(|| {
                tracing::info!(account_id = %req.account_id, "token create: account does not exist");
                AppError::Forbidden
            })?;

        let lifespan = match req.expires_in {
            None => self.default_lifespan,
            Some(v) => Lifespan::try_from(v).map_err(AppError::BadRequest)?,
        };

        let options = SignOptions {
            purpose: req.purpose,
            inquirer: req.inquirer,
            description: req.description,
            custom_permissions: req.custom_permissions.unwrap_or_default().into(),
            lifespan,
            is_new: req.new,
        };

        self.sign(ctx, &account, options).await
    }

    pub async fn sign(
        &self,
        ctx: &RequestContext,
        account: &Account,
        options: SignOptions,
    ) -> Result<Token, AppError> {
        if !account.is_active() {
            tracing::info!(account_id = %account.id, "token create: account is disabled");
            return Err(AppError::Forbidden);
        }

        if !options.custom_permissions.is_empty() && !rbac::is_elevated(&ctx.caller) {
            tracing::warn!(
                account_id = %account.id,
                initiator = %ctx.caller.account_id,
                "token create: permission escalation attempt blocked"
            );
            return Err(AppError::Forbidden);
        }

        let inquirer = match options.inquirer.as_deref().map(str::trim) {
            Some(i) if !i.is_empty() => i.to_string(),
            _ => return Err(AppError::BadRequest("Missing inquirer".into())),
        };

        let purpose = options
            .purpose
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PURPOSE.to_string());

        let now = Utc::now();
        let candidate = Token {
            id: Uuid::new_v4(),
            token: generate_token_value(),
            account_id: account.id.clone(),
            token_type: options.lifespan.token_type(),
            purpose,
            initiator: ctx.caller.account_id.clone(),
            inquirer,
            description: options.description.unwrap_or_default(),
            permissions: account.permissions.union(&options.custom_permissions),
            lifespan: options.lifespan,
            issued_at: now,
            expires_at: options.lifespan.expires_at(now),
        };

        let outcome = if options.is_new {
            bounded(self.timeout, self.store.insert(&candidate)).await?;
            FindOrCreate::Created(candidate)
        } else {
            bounded(self.timeout, self.store.find_or_create(candidate)).await?
        };

        let token = match outcome {
            FindOrCreate::Existing(token) => {
                tracing::debug!(token_id = %token.id, "token create: reusing live token");
                return Ok(token);
            }
            FindOrCreate::Created(token) => token,
        };

        self.audit.record(audit::token_created(
            ctx,
            &token,
            json!({
                "accountId": token.account_id,
                "purpose": token.purpose,
                "inquirer": token.inquirer,
                "description": token.description,
                "customPermissions": options.custom_permissions,
                "expiresIn": token.lifespan,
                "new": options.is_new,
                "token": mask_token(&token.token),
            }),
        ));

        tracing::info!(
            token_id = %token.id,
            account_id = %token.account_id,
            token_type = token.token_type.as_str(),
            "token issued"
        );

        Ok(token)
    }
}
