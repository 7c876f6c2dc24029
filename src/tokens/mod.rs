//! Token lifecycle: issue, introspect, refresh, revoke.

pub mod introspection;
pub mod issuer;
pub mod refresh;
pub mod revocation;

pub use introspection::IntrospectionService;
pub use issuer::{CreateTokenRequest, SignOptions, TokenIssuer};
pub use refresh::RefreshService;
pub use revocation::RevocationService;
