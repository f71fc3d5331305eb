// src/handlers/stats.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};

use crate::{engine::QuizService, error::AppError, models::stats::LeaderboardParams};

/// Aggregated statistics of a user.
pub async fn get_user_stats(
    State(service): State<Arc<QuizService>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.user_stats(id).await?))
}

/// Best completed attempts of a quiz (default top 10).
pub async fn get_leaderboard(
    State(service): State<Arc<QuizService>>,
    Path(id): Path<i64>,
    Query(params): Query<LeaderboardParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.leaderboard(id, params.limit).await?))
}
