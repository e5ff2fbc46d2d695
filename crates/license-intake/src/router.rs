use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::access::{account_router, auth_router, require_admin, AccessService, AdminStats};
use crate::intake::{
    review_router, submission_router, SubmissionService, SubmissionStats, SubmissionSummary,
};

const DASHBOARD_RECENT: u32 = 5;

/// Services shared by every API route.
#[derive(Clone)]
pub struct ServiceState {
    pub submissions: Arc<SubmissionService>,
    pub access: Arc<AccessService>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedStats {
    pub submissions: SubmissionStats,
    pub admins: AdminStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub stats: CombinedStats,
    pub recent_submissions: Vec<SubmissionSummary>,
}

/// The full `/api` surface: public intake and auth, plus session-gated review and admin routes.
pub fn api_router(state: ServiceState, body_limit: usize) -> Router {
    let public = submission_router(state.submissions.clone()).merge(auth_router(state.access.clone()));

    let protected = Router::new()
        .route("/api/admin/dashboard", get(dashboard_handler))
        .route("/api/admin/stats", get(stats_handler))
        .with_state(state.clone())
        .merge(review_router(state.submissions.clone()))
        .merge(account_router(state.access.clone()))
        .route_layer(from_fn_with_state(state.access.clone(), require_admin));

    public
        .merge(protected)
        .layer(DefaultBodyLimit::max(body_limit))
}

async fn combined_stats(state: &ServiceState) -> Result<CombinedStats, Response> {
    let submissions = state
        .submissions
        .stats()
        .await
        .map_err(IntoResponse::into_response)?;
    let admins = state
        .access
        .stats()
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(CombinedStats {
        submissions,
        admins,
    })
}

async fn stats_handler(State(state): State<ServiceState>) -> Response {
    match combined_stats(&state).await {
        Ok(stats) => Json(stats).into_response(),
        Err(response) => response,
    }
}

async fn dashboard_handler(State(state): State<ServiceState>) -> Response {
    let stats = match combined_stats(&state).await {
        Ok(stats) => stats,
        Err(response) => return response,
    };
    match state.submissions.recent(DASHBOARD_RECENT).await {
        Ok(page) => Json(DashboardView {
            stats,
            recent_submissions: page.submissions,
        })
        .into_response(),
        Err(error) => error.into_response(),
    }
}
