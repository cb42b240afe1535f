// src/handlers/admin.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};

use crate::{error::AppError, models::user::UserListParams, store::Store};

/// Lists users, optionally only those awaiting approval.
/// Admin only.
pub async fn list_users(
    State(store): State<Arc<dyn Store>>,
    Query(params): Query<UserListParams>,
) -> Result<impl IntoResponse, AppError> {
    let users = store.list_users(params.pending).await?;
    Ok(Json(users))
}

/// Approves a registration so the user can log in.
/// Admin only. Approving an already approved user is a no-op.
pub async fn approve_user(
    State(store): State<Arc<dyn Store>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = store
        .approve_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

    tracing::info!(user_id = id, "user approved");
    Ok(Json(user))
}
