use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::capability::CapabilitySet;
use crate::models::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Disabled,
}

impl AccountStatus {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "active" => AccountStatus::Active,
            _ => AccountStatus::Disabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Admin,
    User,
    ServiceAccount,
}

impl Role {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "admin" => Role::Admin,
            "service-account" | "service_account" => Role::ServiceAccount,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::ServiceAccount => "service-account",
        }
    }
}

/// Read-only account snapshot, owned by the account service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub username: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
    pub tenant: Option<String>,
    pub permissions: CapabilitySet,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Public claims returned by introspection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountClaims {
    pub sub: String,
    pub username: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub role: Role,
    pub tenant: Option<String>,
    pub permissions: CapabilitySet,
    pub purpose: String,
    pub inquirer: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccountClaims {
    pub fn from_token(account: &Account, token: &Token) -> Self {
        Self {
            sub: account.id.clone(),
            username: account.username.clone(),
            firstname: account.firstname.clone(),
            lastname: account.lastname.clone(),
            role: account.role.clone(),
            tenant: account.tenant.clone(),
            permissions: token.permissions.clone(),
            purpose: token.purpose.clone(),
            inquirer: token.inquirer.clone(),
            expires_at: token.expires_at,
        }
    }
}
