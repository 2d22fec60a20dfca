//! Tenant resolution middleware.
//!
//! Reads the organization id from the `X-ORGANIZATION-ID` header (query
//! parameter fallback) and attaches the resolved organization to request
//! extensions. Absence is not an error - downstream authorization decides
//! whether a tenant is required. A present-but-invalid id aborts the
//! request before any handler runs.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::db::{AppState, queries};
use crate::error::AppError;
use crate::models::Organization;

pub const TENANT_HEADER: &str = "X-ORGANIZATION-ID";

/// Query parameters accepted as a fallback when the header is absent.
const TENANT_QUERY_PARAMS: &[&str] = &["organization_id", "org_id", "tenant"];

#[derive(Clone)]
pub struct TenantContext {
    pub organization: Option<Organization>,
}

pub async fn resolve_tenant(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let org_id = request
        .headers()
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .or_else(|| tenant_from_query(request.uri().query()));

    let context = match org_id {
        None => TenantContext { organization: None },
        Some(id) => {
            let organization = lookup_active_org(&state, &id)?;
            TenantContext {
                organization: Some(organization),
            }
        }
    };

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Resolve an org id to an active organization, failing closed: a lookup
/// error is reported as the same permission error as an unknown id.
fn lookup_active_org(state: &AppState, id: &str) -> Result<Organization, AppError> {
    let conn = state.db.get().map_err(|e| {
        tracing::warn!("tenant resolution pool error, denying: {}", e);
        AppError::Forbidden("Invalid organization".into())
    })?;

    match queries::get_active_organization_by_id(&conn, id) {
        Ok(Some(org)) => Ok(org),
        Ok(None) => Err(AppError::Forbidden("Invalid organization".into())),
        Err(e) => {
            tracing::warn!("tenant resolution lookup error for {}, denying: {}", id, e);
            Err(AppError::Forbidden("Invalid organization".into()))
        }
    }
}

fn tenant_from_query(query: Option<&str>) -> Option<String> {
    let query = query?;
    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        if TENANT_QUERY_PARAMS.contains(&key) && !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_from_query() {
        assert_eq!(
            tenant_from_query(Some("org_id=abc123&x=1")),
            Some("abc123".to_string())
        );
        assert_eq!(
            tenant_from_query(Some("tenant=t1")),
            Some("t1".to_string())
        );
        assert_eq!(tenant_from_query(Some("other=1")), None);
        assert_eq!(tenant_from_query(None), None);
    }
}
