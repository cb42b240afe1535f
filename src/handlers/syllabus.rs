// src/handlers/syllabus.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::syllabus::{SyllabusKey, UpsertSyllabusRequest},
    store::Store,
    utils::jwt::Claims,
};

pub async fn get_syllabus(
    State(store): State<Arc<dyn Store>>,
    Query(key): Query<SyllabusKey>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = key.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let syllabus = store.find_syllabus(&key).await?.ok_or_else(|| {
        AppError::NotFound(format!(
            "No syllabus for year {} semester {} batch {} section {}",
            key.year, key.semester, key.batch, key.section
        ))
    })?;
    Ok(Json(syllabus))
}

/// Creates or replaces the syllabus of one cohort.
/// Professor / admin only.
pub async fn upsert_syllabus(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpsertSyllabusRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let syllabus = store
        .upsert_syllabus(&payload.key, &payload.subjects, claims.user_id()?)
        .await?;

    tracing::info!(
        syllabus_id = syllabus.id,
        batch = %syllabus.batch,
        section = %syllabus.section,
        "syllabus saved"
    );
    Ok(Json(syllabus))
}
