use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::access::AdminSession;

use super::documents::{DocumentUpload, DocumentUploads};
use super::domain::{DocumentSlot, RecordId};
use super::query::{SubmissionQuery, SubmissionQueryParams};
use super::service::{IntakeError, SubmissionService};
use super::validation::{SubmissionForm, ValidationErrors};

/// Public applicant endpoints.
pub fn submission_router(service: Arc<SubmissionService>) -> Router {
    Router::new()
        .route("/api/submissions", post(submit_handler))
        .route(
            "/api/submissions/check/:submission_id",
            get(status_check_handler),
        )
        .with_state(service)
}

/// Review endpoints; expects an [`AdminSession`] extension from `require_admin`.
pub fn review_router(service: Arc<SubmissionService>) -> Router {
    Router::new()
        .route("/api/admin/submissions", get(list_handler))
        .route(
            "/api/admin/submissions/:id",
            get(detail_handler).delete(delete_handler),
        )
        .route("/api/admin/submissions/:id/status", put(status_update_handler))
        .with_state(service)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub status: String,
    #[serde(default)]
    pub internal_notes: Option<String>,
}

fn malformed_form(error: impl std::fmt::Display) -> ValidationErrors {
    ValidationErrors::single("form", format!("Malformed multipart body: {error}"))
}

/// Split a multipart body into text fields and file slots.
pub(crate) async fn read_submission(
    multipart: &mut Multipart,
) -> Result<(SubmissionForm, DocumentUploads), ValidationErrors> {
    let mut form = SubmissionForm::default();
    let mut uploads = DocumentUploads::default();

    while let Some(field) = multipart.next_field().await.map_err(malformed_form)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if let Some(slot) = DocumentSlot::from_field_name(&name) {
            let original_name = field
                .file_name()
                .unwrap_or(slot.field_name())
                .to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(malformed_form)?;
            uploads.insert(slot, DocumentUpload::new(original_name, content_type, bytes));
        } else {
            let value = field.text().await.map_err(malformed_form)?;
            if !form.set(&name, value) {
                debug!(field = %name, "ignoring unknown form field");
            }
        }
    }

    Ok((form, uploads))
}

pub(crate) async fn submit_handler(
    State(service): State<Arc<SubmissionService>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            return IntakeError::Validation(malformed_form(rejection.body_text())).into_response()
        }
    };
    let (form, uploads) = match read_submission(&mut multipart).await {
        Ok(parts) => parts,
        Err(errors) => return IntakeError::Validation(errors).into_response(),
    };

    match service.create(form, uploads).await {
        Ok(submission) => (StatusCode::CREATED, Json(submission.receipt())).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn status_check_handler(
    State(service): State<Arc<SubmissionService>>,
    Path(submission_id): Path<String>,
) -> Response {
    match service.status_check(&submission_id).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn list_handler(
    State(service): State<Arc<SubmissionService>>,
    params: Result<Query<SubmissionQueryParams>, QueryRejection>,
) -> Response {
    let params = match params {
        Ok(Query(params)) => params,
        Err(rejection) => {
            return IntakeError::Validation(ValidationErrors::single(
                "query",
                rejection.body_text(),
            ))
            .into_response()
        }
    };
    let query = match SubmissionQuery::from_params(&params) {
        Ok(query) => query,
        Err(errors) => return IntakeError::Validation(errors).into_response(),
    };
    match service.query(&query).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(error) => error.into_response(),
    }
}

fn parse_record_id(raw: &str) -> Result<RecordId, IntakeError> {
    raw.parse::<RecordId>().map_err(|_| IntakeError::NotFound)
}

async fn detail_handler(
    State(service): State<Arc<SubmissionService>>,
    Path(id): Path<String>,
) -> Response {
    let result = match parse_record_id(&id) {
        Ok(id) => service.get(id).await,
        Err(error) => Err(error),
    };
    match result {
        Ok(submission) => (StatusCode::OK, Json(submission)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn status_update_handler(
    State(service): State<Arc<SubmissionService>>,
    Extension(session): Extension<AdminSession>,
    Path(id): Path<String>,
    body: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return IntakeError::Validation(ValidationErrors::single(
                "body",
                rejection.body_text(),
            ))
            .into_response()
        }
    };
    match service
        .transition_status(&id, &request.status, &session.username, request.internal_notes)
        .await
    {
        Ok(submission) => (StatusCode::OK, Json(submission)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn delete_handler(
    State(service): State<Arc<SubmissionService>>,
    Extension(session): Extension<AdminSession>,
    Path(id): Path<String>,
) -> Response {
    let result = match parse_record_id(&id) {
        Ok(id) => service.delete(id, &session).await,
        Err(error) => Err(error),
    };
    match result {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "message": "Submission deleted successfully" })),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}
