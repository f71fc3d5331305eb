// src/routes.rs

use axum::{
    Router,
    http::Method,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{self, attempt, quiz, stats, user},
    state::AppState,
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (users, quizzes, attempts).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (quiz service and config).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let user_routes = Router::new()
        .route("/", post(user::create_user))
        .route("/{id}", get(user::get_user))
        .route("/{id}/quizzes", get(user::list_user_quizzes))
        .route("/{id}/stats", get(stats::get_user_stats));

    let quiz_routes = Router::new()
        .route("/", post(quiz::create_quiz))
        .route("/search", get(quiz::search_quizzes))
        .route(
            "/{id}",
            get(quiz::get_quiz)
                .put(quiz::update_quiz)
                .delete(quiz::delete_quiz),
        )
        .route("/{id}/attempts", get(quiz::list_quiz_attempts))
        .route("/{id}/leaderboard", get(stats::get_leaderboard));

    let attempt_routes = Router::new()
        .route("/", post(attempt::start_attempt))
        .route("/{id}", get(attempt::get_attempt))
        .route("/{id}/question", get(attempt::current_question))
        .route("/{id}/answers", post(attempt::submit_answer))
        .route("/{id}/complete", post(attempt::complete_attempt))
        .route("/{id}/cancel", post(attempt::cancel_attempt));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/users", user_routes)
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/attempts", attempt_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
