// src/handlers/quiz.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    config::DEFAULT_PAGE_LIMIT,
    engine::QuizService,
    error::AppError,
    models::{
        quiz::{ActingUser, PublicQuiz, QuizDefinition, QuizSearchParams},
        stats::PageParams,
    },
};

/// Creates a quiz with its questions, authored by the acting user.
/// The whole definition is validated first; nothing is stored if any question is malformed.
pub async fn create_quiz(
    State(service): State<Arc<QuizService>>,
    Query(acting): Query<ActingUser>,
    Json(payload): Json<QuizDefinition>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = service.create_quiz(acting.user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(PublicQuiz::from(quiz))))
}

/// Returns a quiz without its correct answers.
pub async fn get_quiz(
    State(service): State<Arc<QuizService>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = service.get_quiz(id).await?;
    Ok(Json(PublicQuiz::from(quiz)))
}

pub async fn search_quizzes(
    State(service): State<Arc<QuizService>>,
    Query(params): Query<QuizSearchParams>,
) -> Result<impl IntoResponse, AppError> {
    let quizzes: Vec<PublicQuiz> = service
        .search_quizzes(&params.q)
        .await?
        .into_iter()
        .map(PublicQuiz::from)
        .collect();
    Ok(Json(quizzes))
}

/// Replaces a quiz and all of its questions. Author only.
pub async fn update_quiz(
    State(service): State<Arc<QuizService>>,
    Path(id): Path<i64>,
    Query(acting): Query<ActingUser>,
    Json(payload): Json<QuizDefinition>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = service.update_quiz(id, acting.user_id, payload).await?;
    Ok(Json(PublicQuiz::from(quiz)))
}

/// Deletes a quiz with its attempts. Author only.
pub async fn delete_quiz(
    State(service): State<Arc<QuizService>>,
    Path(id): Path<i64>,
    Query(acting): Query<ActingUser>,
) -> Result<impl IntoResponse, AppError> {
    service.delete_quiz(id, acting.user_id).await?;
    Ok(Json(json!({ "message": "Quiz deleted successfully" })))
}

pub async fn list_quiz_attempts(
    State(service): State<Arc<QuizService>>,
    Path(id): Path<i64>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = service
        .list_quiz_attempts(
            id,
            params.skip.unwrap_or(0),
            params.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        )
        .await?;
    Ok(Json(attempts))
}
