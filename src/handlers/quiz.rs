// src/handlers/quiz.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use validator::Validate;

use crate::{
    config::PASSING_SCORE_PERCENTAGE,
    error::AppError,
    models::{
        quiz::{CreateQuizRequest, GenerateQuizRequest, NewQuiz, PublicQuiz, Quiz},
        user::Role,
    },
    services::quiz_generation,
    state::AppState,
    store::Store,
    utils::{jwt::Claims, llm::LlmError},
};

/// Students only ever see the public projection; staff see the answer key.
fn quiz_view(quiz: &Quiz, role: Role) -> Response {
    match role {
        Role::Student => Json(PublicQuiz::from(quiz)).into_response(),
        Role::Professor | Role::Admin => Json(quiz).into_response(),
    }
}

/// Creates a quiz authored by hand.
/// Professor / admin only.
pub async fn create_quiz(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if let Some(index) = payload
        .questions
        .iter()
        .position(|q| !q.options.contains(&q.answer))
    {
        return Err(AppError::BadRequest(format!(
            "Question {}: answer must be one of the options",
            index
        )));
    }

    let quiz = store
        .create_quiz(NewQuiz {
            title: payload.title,
            subject: payload.subject,
            topic: payload.topic,
            passing_percentage: payload.passing_percentage.unwrap_or(PASSING_SCORE_PERCENTAGE),
            created_by: claims.user_id()?,
            ai_generated: false,
            questions: payload.questions,
        })
        .await?;

    tracing::info!(quiz_id = quiz.id, subject = %quiz.subject, "quiz created");
    Ok((StatusCode::CREATED, Json(quiz)))
}

/// Asks the AI provider for a quiz on a topic and stores it.
pub async fn generate_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<GenerateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let generator = state
        .text_generator
        .as_deref()
        .ok_or(LlmError::NotConfigured("LLM_API_KEY"))?;

    let new_quiz = quiz_generation::generate_quiz(generator, &payload, claims.user_id()?).await?;
    let quiz = state.store.create_quiz(new_quiz).await?;

    Ok((StatusCode::CREATED, quiz_view(&quiz, claims.role)))
}

/// Fetches a quiz for taking (students) or reviewing (staff).
pub async fn get_quiz(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = store
        .find_quiz(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", id)))?;

    Ok(quiz_view(&quiz, claims.role))
}
