mod auth;
mod tenant;

pub use auth::{CurrentUser, require_api_key};
pub use tenant::{TENANT_HEADER, TenantContext, resolve_tenant};
