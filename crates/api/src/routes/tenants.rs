//! Host-to-tenant resolution endpoint used by the edge router.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::{ApiError, ApiResult, AppJson},
    routing::HostResolveError,
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostQuery {
    pub host: String,
}

/// GET /api/v1/get-tenant-by-domain?host=...
pub async fn get_tenant_by_domain(
    State(state): State<AppState>,
    Query(query): Query<HostQuery>,
) -> ApiResult<Json<Value>> {
    resolve(&state, &query.host).await
}

/// POST /api/v1/get-tenant-by-domain with `{"host": "..."}`
pub async fn get_tenant_by_domain_post(
    State(state): State<AppState>,
    AppJson(query): AppJson<HostQuery>,
) -> ApiResult<Json<Value>> {
    resolve(&state, &query.host).await
}

async fn resolve(state: &AppState, host: &str) -> ApiResult<Json<Value>> {
    let host = host.trim();
    if host.is_empty() {
        return Err(ApiError::InputInvalid("host is required".into()));
    }

    match state.host_resolver.resolve(host).await {
        Ok(slug) => Ok(Json(json!({ "slug": slug }))),
        Err(HostResolveError::NotFound(_) | HostResolveError::ReservedSubdomain(_)) => {
            Err(ApiError::NotFound(format!("no tenant for host {host}")))
        }
        Err(HostResolveError::Database(err)) => {
            tracing::error!(error = %err, %host, "tenant resolution query failed");
            Err(ApiError::InternalFailure)
        }
    }
}
