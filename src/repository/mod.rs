// src/repository/mod.rs

//! Storage seams of the service.
//!
//! The engine only talks to these traits; `PgStore` backs them with PostgreSQL,
//! `MemoryStore` keeps everything in process (tests, runs without `DATABASE_URL`).

use async_trait::async_trait;

use crate::{
    error::AppResult,
    models::{
        attempt::{Answer, Attempt, NewAnswer},
        question::Question,
        quiz::{Quiz, QuizDefinition},
        user::{CreateUserRequest, User},
    },
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Inserts the quiz and all of its questions atomically.
    async fn create_quiz(&self, author: &str, definition: &QuizDefinition) -> AppResult<Quiz>;

    /// Overwrites the quiz fields and replaces every question; the author stays.
    /// `None` if the quiz does not exist. Fails with `InvalidState` while any
    /// attempt of the quiz is in progress, since those attempts reference the
    /// current questions.
    async fn replace_quiz(&self, id: i64, definition: &QuizDefinition) -> AppResult<Option<Quiz>>;

    /// Deletes the quiz together with its questions, attempts and answers.
    async fn delete_quiz(&self, id: i64) -> AppResult<bool>;

    async fn get_quiz(&self, id: i64) -> AppResult<Option<Quiz>>;

    async fn get_question(&self, id: i64) -> AppResult<Option<Question>>;

    /// Case-insensitive substring search on quiz names.
    async fn search_quizzes(&self, fragment: &str) -> AppResult<Vec<Quiz>>;

    async fn list_quizzes_by_author(&self, author: &str, skip: i64, limit: i64) -> AppResult<Vec<Quiz>>;

    async fn count_quizzes_by_author(&self, author: &str) -> AppResult<i64>;
}

#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Fails with `InvalidState` when `question_order` is not a permutation of
    /// the quiz's current questions (the quiz was replaced meanwhile).
    async fn create_attempt(&self, quiz_id: i64, user_id: i64, question_order: &[i64]) -> AppResult<Attempt>;

    /// Attempt with its answers in submission order.
    async fn get_attempt(&self, id: i64) -> AppResult<Option<Attempt>>;

    async fn append_answer(&self, attempt_id: i64, answer: &NewAnswer) -> AppResult<Answer>;

    /// Stores score and completion time. Fails with `AlreadyCompleted` when the
    /// stored attempt is completed already, leaving it untouched.
    async fn save_attempt(&self, attempt: &Attempt) -> AppResult<()>;

    /// Removes an attempt that is still in progress, answers included.
    /// `InvalidState` if it is completed, `NotFound` if it does not exist.
    async fn delete_attempt(&self, id: i64) -> AppResult<()>;

    /// Attempts of a user, without answers.
    async fn list_attempts_by_user(&self, user_id: i64) -> AppResult<Vec<Attempt>>;

    /// Attempts of a quiz in creation order, without answers.
    async fn list_attempts_by_quiz(&self, quiz_id: i64, skip: i64, limit: i64) -> AppResult<Vec<Attempt>>;

    /// Completed attempts of a quiz in completion order, without answers.
    async fn list_completed_attempts(&self, quiz_id: i64) -> AppResult<Vec<Attempt>>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `Conflict` on a taken username or telegram id.
    async fn create_user(&self, request: &CreateUserRequest) -> AppResult<User>;

    async fn get_user(&self, id: i64) -> AppResult<Option<User>>;
}

/// Everything the service needs from a backend.
pub trait Store: QuizRepository + AttemptRepository + UserRepository {}

impl<T> Store for T where T: QuizRepository + AttemptRepository + UserRepository {}
