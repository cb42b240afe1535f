// src/handlers/weak_area.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        user::Role,
        weak_area::{WeakAreaListParams, WeakAreaUpdate},
    },
    store::Store,
    utils::jwt::Claims,
};

/// Lists a student's weak areas, weakest first, optionally for one subject.
pub async fn list_weak_areas(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<WeakAreaListParams>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.resolve_student(params.student_id)?;
    let areas = store
        .list_weak_areas(student_id, params.subject.as_deref())
        .await?;
    Ok(Json(areas))
}

/// Applies one topic update outside of quiz submission.
pub async fn record_weak_area(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<WeakAreaUpdate>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    claims.resolve_student(Some(payload.student_id))?;

    let student = store
        .find_user(payload.student_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Student {} not found", payload.student_id)))?;
    match student.role {
        Role::Student => {}
        Role::Professor | Role::Admin => {
            return Err(AppError::BadRequest(format!(
                "User {} is not a student",
                student.id
            )));
        }
    }

    // History may only reference the student's own attempts.
    if let Some(attempt_id) = payload.attempt_id {
        let attempt = store
            .find_attempt(attempt_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Attempt {} not found", attempt_id)))?;
        if attempt.student_id != student.id {
            return Err(AppError::BadRequest(format!(
                "Attempt {} does not belong to student {}",
                attempt_id, student.id
            )));
        }
    }

    let area = store.record_weak_area(&payload).await?;

    tracing::debug!(
        student_id = area.student_id,
        topic = %area.topic,
        score = area.improvement_score,
        status = %area.status,
        "weak area updated"
    );
    Ok(Json(area))
}
