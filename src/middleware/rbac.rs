use crate::errors::AppError;
use crate::models::account::Role;
use crate::models::capability::CapabilitySet;
use crate::middleware::redact::mask_token;

pub const TOKEN_CREATE: &str = "iam.token.create";
/// Elevation capability: needed to add permissions beyond the account's own.
pub const TOKEN_UPDATE: &str = "iam.token.update";
pub const TOKEN_INTROSPECT: &str = "iam.token.introspect";
pub const TOKEN_DELETE: &str = "iam.token.delete";

/// Identity of whoever is calling, resolved from their bearer token.
#[derive(Clone)]
pub struct Caller {
    pub account_id: String,
    pub role: Role,
    pub permissions: CapabilitySet,
    /// The bearer value the caller authenticated with, if any.
    pub token: Option<String>,
}

impl Caller {
    /// Operator identity used by the CLI.
    pub fn system() -> Self {
        Self {
            account_id: "system".into(),
            role: Role::Admin,
            permissions: CapabilitySet::new(),
            token: None,
        }
    }
}

impl std::fmt::Debug for Caller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Caller")
            .field("account_id", &self.account_id)
            .field("role", &self.role)
            .field("permissions", &self.permissions)
            .field("token", &self.token.as_deref().map(mask_token))
            .finish()
    }
}

/// Caller plus the correlation id carried into the audit trail.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub caller: Caller,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn new(caller: Caller, request_id: Option<String>) -> Self {
        Self { caller, request_id }
    }
}

pub fn required(perms: &[&str]) -> CapabilitySet {
    perms.iter().copied().collect()
}

/// Pure subset check; no admin bypass.
pub fn has_permissions(caller: &Caller, required: &CapabilitySet) -> bool {
    caller.permissions.has_all(required)
}

pub fn is_admin(caller: &Caller) -> bool {
    caller.role == Role::Admin
}

/// Gate: admins pass, everyone else must hold all of `perms`.
pub fn can(caller: &Caller, perms: &[&str]) -> Result<(), AppError> {
    if is_admin(caller) || has_permissions(caller, &required(perms)) {
        return Ok(());
    }
    tracing::warn!(
        account_id = %caller.account_id,
        role = ?caller.role,
        required = ?perms,
        "RBAC access denied: missing capability"
    );
    Err(AppError::Forbidden)
}

pub fn require_admin(caller: &Caller) -> Result<(), AppError> {
    if is_admin(caller) {
        return Ok(());
    }
    tracing::warn!(account_id = %caller.account_id, "RBAC access denied: admin required");
    Err(AppError::Forbidden)
}

/// May this caller attach permissions the target account does not hold?
pub fn is_elevated(caller: &Caller) -> bool {
    can(caller, &[TOKEN_UPDATE]).is_ok()
}

// ── Tests ───────────────────────────────────────────────────────
