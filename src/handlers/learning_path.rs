// src/handlers/learning_path.rs

use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::{learning_path::LearningPathParams, user::Role},
    services::learning_path::build_learning_path,
    state::AppState,
    utils::jwt::Claims,
};

/// Composes a learning path for a student. The AI narrative is included
/// unless `narrative=false` is passed or no provider is configured.
pub async fn get_learning_path(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<LearningPathParams>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.resolve_student(params.student_id)?;

    let student = state
        .store
        .find_user(student_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Student {} not found", student_id)))?;
    match student.role {
        Role::Student => {}
        Role::Professor | Role::Admin => {
            return Err(AppError::BadRequest(format!(
                "User {} is not a student",
                student.id
            )));
        }
    }

    let path = build_learning_path(
        state.store.as_ref(),
        state.text_generator.as_deref(),
        &student,
        params.narrative.unwrap_or(true),
    )
    .await?;

    Ok(Json(path))
}
