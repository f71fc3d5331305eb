// src/handlers/user.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    config::DEFAULT_PAGE_LIMIT,
    engine::QuizService,
    error::AppError,
    models::{quiz::PublicQuiz, stats::PageParams, user::CreateUserRequest},
};

/// Registers a user. Usernames (and telegram ids) are unique.
pub async fn create_user(
    State(service): State<Arc<QuizService>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = service.create_user(payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_user(
    State(service): State<Arc<QuizService>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.get_user(id).await?))
}

/// Quizzes authored by the user. Correct answers are never exposed.
pub async fn list_user_quizzes(
    State(service): State<Arc<QuizService>>,
    Path(id): Path<i64>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let quizzes: Vec<PublicQuiz> = service
        .list_user_quizzes(
            id,
            params.skip.unwrap_or(0),
            params.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        )
        .await?
        .into_iter()
        .map(PublicQuiz::from)
        .collect();
    Ok(Json(quizzes))
}
