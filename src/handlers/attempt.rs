// src/handlers/attempt.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    engine::QuizService,
    error::AppError,
    models::attempt::{StartAttemptRequest, SubmitAnswerRequest},
};

/// Starts an attempt. A user can only be in one attempt per quiz at a time.
pub async fn start_attempt(
    State(service): State<Arc<QuizService>>,
    Json(req): Json<StartAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = service.start_attempt(req.quiz_id, req.user_id).await?;
    Ok((StatusCode::CREATED, Json(attempt)))
}

pub async fn get_attempt(
    State(service): State<Arc<QuizService>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.get_attempt(id).await?))
}

/// The next question to answer, or `null` once all are answered.
pub async fn current_question(
    State(service): State<Arc<QuizService>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.current_question(id).await?))
}

/// Submits an answer for the current question.
///
/// * Rejects answers for any other question with 409.
/// * Reveals the correct answer if the quiz shows results after each question.
pub async fn submit_answer(
    State(service): State<Arc<QuizService>>,
    Path(id): Path<i64>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.submit_answer(id, req).await?))
}

/// Completes and scores the attempt. A second call answers 409.
pub async fn complete_attempt(
    State(service): State<Arc<QuizService>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.complete_attempt(id).await?))
}

/// Abandons an in-progress attempt. The attempt and its answers are discarded.
pub async fn cancel_attempt(
    State(service): State<Arc<QuizService>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    service.cancel_attempt(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
