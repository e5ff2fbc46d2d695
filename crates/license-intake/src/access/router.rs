use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use serde_json::json;

use crate::intake::ValidationErrors;

use super::domain::{Admin, AdminId, AdminSession};
use super::service::{
    AccessError, AccessService, AdminUpdate, ForgotPassword, LoginRequest, NewAdmin,
    PasswordChange, PasswordReset,
};

/// Routes reachable without a session.
pub fn auth_router(access: Arc<AccessService>) -> Router {
    Router::new()
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/forgot-password", post(forgot_password_handler))
        .route("/api/auth/reset-password", post(reset_password_handler))
        .with_state(access)
}

/// Routes that expect an [`AdminSession`] extension from `require_admin`.
pub fn account_router(access: Arc<AccessService>) -> Router {
    Router::new()
        .route("/api/auth/me", get(me_handler))
        .route("/api/auth/change-password", put(change_password_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route(
            "/api/admin/admins",
            get(list_admins_handler).post(create_admin_handler),
        )
        .route(
            "/api/admin/admins/:id",
            put(update_admin_handler).delete(deactivate_admin_handler),
        )
        .with_state(access)
}

fn parse_admin_id(raw: &str) -> Result<AdminId, AccessError> {
    raw.parse::<AdminId>().map_err(|_| AccessError::NotFound)
}

/// Unwrap a JSON body, reporting malformed input in the usual error envelope.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AccessError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        AccessError::Validation(ValidationErrors::single("body", rejection.body_text()))
    })
}

pub(crate) async fn login_handler(
    State(access): State<Arc<AccessService>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let request = match json_body(body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    match access.login(request).await {
        Ok(login) => {
            let cookie = access.session_cookie(&login.token);
            (StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(login)).into_response()
        }
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn register_handler(
    State(access): State<Arc<AccessService>>,
    body: Result<Json<NewAdmin>, JsonRejection>,
) -> Response {
    let request = match json_body(body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    match access.register_first(request).await {
        Ok(admin) => (StatusCode::CREATED, Json(admin)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn forgot_password_handler(
    State(access): State<Arc<AccessService>>,
    body: Result<Json<ForgotPassword>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AccessError> {
    access.forgot_password(json_body(body)?).await?;
    Ok(Json(json!({
        "message": "If that address belongs to an active admin, a reset link has been sent"
    })))
}

async fn reset_password_handler(
    State(access): State<Arc<AccessService>>,
    body: Result<Json<PasswordReset>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AccessError> {
    access.reset_password(json_body(body)?).await?;
    Ok(Json(json!({ "message": "Password reset successfully" })))
}

async fn logout_handler(
    State(access): State<Arc<AccessService>>,
    Extension(session): Extension<AdminSession>,
) -> Response {
    let cookie = access.logout(&session);
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "message": "Logged out successfully" })),
    )
        .into_response()
}

async fn me_handler(
    State(access): State<Arc<AccessService>>,
    Extension(session): Extension<AdminSession>,
) -> Result<Json<Admin>, AccessError> {
    access.me(&session).await.map(Json)
}

async fn change_password_handler(
    State(access): State<Arc<AccessService>>,
    Extension(session): Extension<AdminSession>,
    body: Result<Json<PasswordChange>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AccessError> {
    access.change_password(&session, json_body(body)?).await?;
    Ok(Json(json!({ "message": "Password changed successfully" })))
}

async fn list_admins_handler(
    State(access): State<Arc<AccessService>>,
    Extension(session): Extension<AdminSession>,
) -> Result<Json<serde_json::Value>, AccessError> {
    let admins = access.list_admins(&session).await?;
    Ok(Json(json!({ "admins": admins })))
}

async fn create_admin_handler(
    State(access): State<Arc<AccessService>>,
    Extension(session): Extension<AdminSession>,
    body: Result<Json<NewAdmin>, JsonRejection>,
) -> Response {
    let request = match json_body(body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    match access.create_admin(&session, request).await {
        Ok(admin) => (StatusCode::CREATED, Json(admin)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn update_admin_handler(
    State(access): State<Arc<AccessService>>,
    Extension(session): Extension<AdminSession>,
    Path(id): Path<String>,
    body: Result<Json<AdminUpdate>, JsonRejection>,
) -> Result<Json<Admin>, AccessError> {
    let id = parse_admin_id(&id)?;
    let update = json_body(body)?;
    access.update_admin(&session, id, update).await.map(Json)
}

async fn deactivate_admin_handler(
    State(access): State<Arc<AccessService>>,
    Extension(session): Extension<AdminSession>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AccessError> {
    let id = parse_admin_id(&id)?;
    access.deactivate_admin(&session, id).await?;
    Ok(Json(json!({ "message": "Admin deactivated successfully" })))
}
