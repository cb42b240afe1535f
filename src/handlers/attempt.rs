// src/handlers/attempt.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        attempt::{AttemptListParams, SubmitAttemptRequest, SubmitAttemptResponse},
        user::Role,
    },
    services::grading::grade_submission,
    store::Store,
    utils::jwt::Claims,
};

const DEFAULT_ATTEMPT_LIMIT: i64 = 20;
const MAX_ATTEMPT_LIMIT: i64 = 100;

/// Grades a submission, stores the attempt and updates the student's weak
/// areas for every topic the quiz covered.
/// Students only.
pub async fn submit_attempt(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    match claims.role {
        Role::Student => {}
        Role::Professor | Role::Admin => {
            return Err(AppError::Forbidden(
                "Only students can submit quiz attempts".to_string(),
            ));
        }
    }

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let quiz = store
        .find_quiz(payload.quiz_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", payload.quiz_id)))?;

    let student_id = claims.user_id()?;
    let graded = grade_submission(&quiz, student_id, &payload.answers);
    let (attempt, weak_areas) = store.record_attempt(graded).await?;

    tracing::info!(
        student_id,
        quiz_id = quiz.id,
        attempt_id = attempt.id,
        percentage = attempt.percentage,
        status = %attempt.status,
        "quiz attempt recorded"
    );

    Ok((
        StatusCode::CREATED,
        Json(SubmitAttemptResponse {
            attempt,
            weak_areas,
        }),
    ))
}

/// Lists attempts, newest first. Students see only their own; staff may
/// filter by student or list everyone's.
pub async fn list_attempts(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<AttemptListParams>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = match claims.role {
        Role::Student => Some(claims.resolve_student(params.student_id)?),
        Role::Professor | Role::Admin => params.student_id,
    };
    let limit = params
        .limit
        .unwrap_or(DEFAULT_ATTEMPT_LIMIT)
        .clamp(1, MAX_ATTEMPT_LIMIT);

    let attempts = store.list_attempts(student_id, limit).await?;
    Ok(Json(attempts))
}
