//! Expired-trial cleanup endpoints.

use axum::{extract::State, Extension, Json};
use serde_json::{json, Value};

use crate::{auth::AuthUser, error::ApiResult, state::AppState};

/// POST /api/v1/remove-expired-trial-data (service role)
///
/// Sweeps every free-plan tenant past its grace window. Also run on a
/// schedule by the worker; this endpoint exists for manual operation.
pub async fn remove_expired_trial_data(
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let outcome = state.trials.sweep_expired().await?;
    tracing::info!(removed = outcome.removed(), "expired trial sweep finished");

    Ok(Json(json!({
        "removed": outcome.removed(),
        "tenantIds": outcome.tenant_ids,
    })))
}

/// POST /api/v1/remove-my-expired-trial
///
/// Lets a signed-in owner delete their own expired trial tenant without
/// waiting for the sweep. Uses the shorter self-service grace window.
pub async fn remove_my_expired_trial(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Value>> {
    let removed = state.trials.remove_for_owner(user.user_id).await?;
    if removed {
        tracing::info!(user_id = %user.user_id, "owner removed own expired trial");
    }

    Ok(Json(json!({ "removed": removed })))
}
