// src/handlers/ranking.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::ranking::{RankingListParams, RankingScope},
    services::ranking,
    state::AppState,
    store::{RankingFilter, Store},
    utils::jwt::Claims,
};

const DEFAULT_RANKING_LIMIT: i64 = 50;
const MAX_RANKING_LIMIT: i64 = 500;

/// Rebuilds every student's ranking from their attempts.
/// Admin only.
pub async fn recalculate_rankings(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let summary = ranking::recalculate(state.store.as_ref(), &state.ranking_lock).await?;
    Ok(Json(summary))
}

/// Reads the leaderboard for one scope, best first.
pub async fn list_rankings(
    State(store): State<Arc<dyn Store>>,
    Query(params): Query<RankingListParams>,
) -> Result<impl IntoResponse, AppError> {
    let missing = |name: &str| AppError::BadRequest(format!("{} is required for this scope", name));

    let filter = match params.scope {
        RankingScope::Overall => RankingFilter::Overall,
        RankingScope::Batch => RankingFilter::Batch(params.batch.ok_or_else(|| missing("batch"))?),
        RankingScope::Class => RankingFilter::Class {
            batch: params.batch.ok_or_else(|| missing("batch"))?,
            section: params.section.ok_or_else(|| missing("section"))?,
        },
    };
    let limit = params
        .limit
        .unwrap_or(DEFAULT_RANKING_LIMIT)
        .clamp(1, MAX_RANKING_LIMIT);

    let rankings = store.list_rankings(&filter, limit).await?;
    Ok(Json(rankings))
}

/// Returns the caller's own ranking row.
pub async fn my_ranking(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let ranking = store
        .find_ranking(claims.user_id()?)
        .await?
        .ok_or_else(|| AppError::NotFound("No ranking has been calculated for you yet".to_string()))?;
    Ok(Json(ranking))
}
