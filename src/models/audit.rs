use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "token.create")]
    TokenCreate,
    #[serde(rename = "iam.token.introspect")]
    TokenIntrospect,
    #[serde(rename = "token.refresh")]
    TokenRefresh,
    #[serde(rename = "iam.token.delete")]
    TokenDelete,
    #[serde(rename = "iam.token.delete-account")]
    AccountTokensDelete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::TokenCreate => "token.create",
            AuditAction::TokenIntrospect => "iam.token.introspect",
            AuditAction::TokenRefresh => "token.refresh",
            AuditAction::TokenDelete => "iam.token.delete",
            AuditAction::AccountTokensDelete => "iam.token.delete-account",
        }
    }
}

/// One append-only audit record. `token` is already redacted when it
/// carries a bearer value; record ids are stored verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: AuditAction,
    pub token: String,
    pub account_id: String,
    pub request_id: Option<String>,
    pub data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}
