pub mod audit;
pub mod auth;
pub mod rbac;
pub mod redact;
