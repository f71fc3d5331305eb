// src/engine/mod.rs

//! Attempt scoring and progression.
//!
//! `QuizService` is the operation surface used by the HTTP handlers (and any
//! other front end such as a chat bot). It owns the live sessions and talks to
//! storage only through the repository traits.

pub mod matcher;
pub mod scoring;
pub mod session;
pub mod tracker;

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use validator::Validate;

use crate::{
    config::{DEFAULT_LEADERBOARD_LIMIT, MAX_LEADERBOARD_LIMIT},
    error::{AppError, AppResult},
    models::{
        attempt::{AnswerOutcome, Attempt, AttemptResult, CurrentQuestion, SubmitAnswerRequest},
        quiz::{Quiz, QuizDefinition},
        stats::{LeaderboardEntry, UserStats},
        user::{CreateUserRequest, User},
    },
    repository::Store,
};

use session::{SessionKey, SessionStore, SharedTracker};
use tracker::AttemptTracker;

pub struct QuizService {
    store: Arc<dyn Store>,
    sessions: SessionStore,
}

impl QuizService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            sessions: SessionStore::new(),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    // ---------------------------------------------------------------- users

    pub async fn create_user(&self, request: CreateUserRequest) -> AppResult<User> {
        request.validate()?;
        let user = self.store.create_user(&request).await?;
        tracing::info!("User {} created: {}", user.id, user.username);
        Ok(user)
    }

    pub async fn get_user(&self, id: i64) -> AppResult<User> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    /// Quizzes authored by the user.
    pub async fn list_user_quizzes(&self, user_id: i64, skip: i64, limit: i64) -> AppResult<Vec<Quiz>> {
        let user = self.get_user(user_id).await?;
        self.store
            .list_quizzes_by_author(&user.username, skip, limit)
            .await
    }

    // -------------------------------------------------------------- quizzes

    /// Creates a quiz authored by `user_id`.
    /// Validates the whole definition before writing anything.
    pub async fn create_quiz(&self, user_id: i64, definition: QuizDefinition) -> AppResult<Quiz> {
        definition.check()?;
        let author = self.get_user(user_id).await?;
        let quiz = self.store.create_quiz(&author.username, &definition).await?;
        tracing::info!(
            "Quiz {} '{}' created by {} with {} questions",
            quiz.id,
            quiz.name,
            quiz.author,
            quiz.questions.len()
        );
        Ok(quiz)
    }

    pub async fn get_quiz(&self, id: i64) -> AppResult<Quiz> {
        self.store
            .get_quiz(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", id)))
    }

    pub async fn search_quizzes(&self, fragment: &str) -> AppResult<Vec<Quiz>> {
        self.store.search_quizzes(fragment.trim()).await
    }

    /// Replaces quiz fields and every question. Author only; refused while
    /// any stored attempt of the quiz is still in progress.
    pub async fn update_quiz(&self, id: i64, user_id: i64, definition: QuizDefinition) -> AppResult<Quiz> {
        definition.check()?;
        let quiz = self.get_quiz(id).await?;
        self.ensure_author(&quiz, user_id).await?;

        let quiz = self
            .store
            .replace_quiz(id, &definition)
            .await
            .inspect_err(|e| tracing::warn!("Quiz {} not replaced: {}", id, e))?
            .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", id)))?;
        tracing::info!("Quiz {} replaced with {} questions", id, quiz.questions.len());
        Ok(quiz)
    }

    /// Deletes the quiz with its attempts. Author only.
    pub async fn delete_quiz(&self, id: i64, user_id: i64) -> AppResult<()> {
        let quiz = self.get_quiz(id).await?;
        self.ensure_author(&quiz, user_id).await?;

        if !self.store.delete_quiz(id).await? {
            return Err(AppError::NotFound(format!("Quiz {} not found", id)));
        }
        let dropped = self.sessions.close_quiz(id);
        tracing::info!("Quiz {} deleted ({} live sessions dropped)", id, dropped);
        Ok(())
    }

    pub async fn list_quiz_attempts(&self, quiz_id: i64, skip: i64, limit: i64) -> AppResult<Vec<Attempt>> {
        self.get_quiz(quiz_id).await?;
        self.store.list_attempts_by_quiz(quiz_id, skip, limit).await
    }

    async fn ensure_author(&self, quiz: &Quiz, user_id: i64) -> AppResult<()> {
        let user = self.get_user(user_id).await?;
        if user.username != quiz.author {
            return Err(AppError::Forbidden(format!(
                "User {} is not the author of quiz {}",
                user_id, quiz.id
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------- attempts

    /// Starts an attempt and opens its session. The presentation order is
    /// fixed here and stored with the attempt.
    ///
    /// The session key is reserved before anything is stored, so of two
    /// concurrent starts for the same user and quiz only one persists an attempt.
    pub async fn start_attempt(&self, quiz_id: i64, user_id: i64) -> AppResult<Attempt> {
        self.get_user(user_id).await?;
        let quiz = self.get_quiz(quiz_id).await?;

        let reservation = self
            .sessions
            .reserve(SessionKey { user_id, quiz_id })
            .inspect_err(|e| tracing::warn!("Attempt not started: {}", e))?;

        let order = {
            let mut rng = rand::thread_rng();
            tracker::presentation_order(&quiz, &mut rng)
        };

        let attempt = self.store.create_attempt(quiz_id, user_id, &order).await?;
        let tracker = AttemptTracker::new(&quiz, attempt.clone())?;
        reservation.open(tracker)?;

        tracing::info!("Attempt {} started: user {} on quiz {}", attempt.id, user_id, quiz_id);
        Ok(attempt)
    }

    pub async fn get_attempt(&self, id: i64) -> AppResult<Attempt> {
        self.store
            .get_attempt(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Attempt {} not found", id)))
    }

    /// Question at the cursor; `None` once every question has been answered.
    pub async fn current_question(&self, attempt_id: i64) -> AppResult<Option<CurrentQuestion>> {
        let shared = self.tracker_for(attempt_id, AppError::InvalidState).await?;
        let tracker = shared.lock().await;
        tracker.current()
    }

    /// Judges and records an answer for the question at the cursor.
    ///
    /// The tracker stays locked from judging to recording, so two submissions
    /// for the same attempt cannot both advance it.
    pub async fn submit_answer(&self, attempt_id: i64, request: SubmitAnswerRequest) -> AppResult<AnswerOutcome> {
        request.validate()?;
        let shared = self.tracker_for(attempt_id, AppError::InvalidState).await?;
        let mut tracker = shared.lock().await;

        let judged = match tracker.judge(request.question_id, &request.answer_text, Utc::now()) {
            Ok(judged) => judged,
            Err(e) => {
                tracing::warn!("Answer rejected for attempt {}: {}", attempt_id, e);
                if self.store.get_question(request.question_id).await?.is_none() {
                    return Err(AppError::NotFound(format!(
                        "Question {} not found",
                        request.question_id
                    )));
                }
                return Err(e);
            }
        };

        let answer = self.store.append_answer(attempt_id, &judged).await?;
        let correct_answer = tracker.reveal(answer.question_id);
        tracker.record(answer.clone());

        tracing::info!(
            "Attempt {}: question {} answered ({})",
            attempt_id,
            answer.question_id,
            if answer.is_correct { "correct" } else { "wrong" }
        );

        Ok(AnswerOutcome {
            answer,
            correct_answer,
            has_next_question: tracker.has_next_question(),
        })
    }

    /// Scores the attempt and closes its session. Unanswered questions count as wrong.
    pub async fn complete_attempt(&self, attempt_id: i64) -> AppResult<AttemptResult> {
        let shared = self.tracker_for(attempt_id, AppError::AlreadyCompleted).await?;
        let mut tracker = shared.lock().await;

        let completed = tracker
            .completed(Utc::now())
            .inspect_err(|e| tracing::warn!("Completion rejected: {}", e))?;
        self.store.save_attempt(&completed).await?;
        tracker.commit(completed);
        self.sessions.close(attempt_id);

        let attempt = tracker.attempt().clone();
        tracing::info!(
            "Attempt {} completed with score {}",
            attempt_id,
            attempt.score.unwrap_or(0)
        );

        Ok(AttemptResult {
            correct_count: attempt.correct_count(),
            total_questions: tracker.total_questions(),
            review: tracker.review(),
            attempt,
        })
    }

    /// Abandons an in-progress attempt: its session is closed and the record
    /// is discarded with its answers. Completed attempts cannot be cancelled.
    pub async fn cancel_attempt(&self, attempt_id: i64) -> AppResult<()> {
        // Holding the tracker lets a submission in flight finish first.
        let shared = self.sessions.get(attempt_id);
        let _tracker = match &shared {
            Some(shared) => Some(shared.lock().await),
            None => None,
        };

        self.store
            .delete_attempt(attempt_id)
            .await
            .inspect_err(|e| tracing::warn!("Cancel rejected: {}", e))?;
        self.sessions.close(attempt_id);
        tracing::info!("Attempt {} cancelled", attempt_id);
        Ok(())
    }

    /// Live tracker of an in-progress attempt, rebuilt from storage when no
    /// session holds it (for instance after a restart).
    ///
    /// A completed attempt is answered with `on_completed` straight from its
    /// stored record; it never needs the quiz, which may have been replaced since.
    async fn tracker_for(
        &self,
        attempt_id: i64,
        on_completed: fn(String) -> AppError,
    ) -> AppResult<SharedTracker> {
        if let Some(shared) = self.sessions.get(attempt_id) {
            return Ok(shared);
        }

        let attempt = self.get_attempt(attempt_id).await?;
        if attempt.is_completed() {
            return Err(on_completed(format!(
                "Attempt {} is already completed",
                attempt_id
            )));
        }

        let quiz = self.get_quiz(attempt.quiz_id).await?;
        let tracker = AttemptTracker::new(&quiz, attempt)?;
        tracing::debug!("Session for attempt {} restored from storage", attempt_id);
        self.sessions.open(tracker)
    }

    // ---------------------------------------------------------------- stats

    pub async fn user_stats(&self, user_id: i64) -> AppResult<UserStats> {
        let user = self.get_user(user_id).await?;
        let created = self.store.count_quizzes_by_author(&user.username).await?;
        let attempts = self.store.list_attempts_by_user(user_id).await?;
        Ok(scoring::user_stats(created, &attempts))
    }

    /// Completed attempts of a quiz by score, best first.
    pub async fn leaderboard(&self, quiz_id: i64, limit: Option<i64>) -> AppResult<Vec<LeaderboardEntry>> {
        let limit = limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT);
        if !(0..=MAX_LEADERBOARD_LIMIT).contains(&limit) {
            return Err(AppError::Validation(format!(
                "Leaderboard limit must be between 0 and {}",
                MAX_LEADERBOARD_LIMIT
            )));
        }
        let limit = limit as usize;
        self.get_quiz(quiz_id).await?;

        let completed = self.store.list_completed_attempts(quiz_id).await?;
        let mut usernames: HashMap<i64, Option<String>> = HashMap::new();
        let mut entries = Vec::with_capacity(limit);

        for attempt in scoring::rank(&completed, completed.len()) {
            if entries.len() == limit {
                break;
            }
            let username = match usernames.get(&attempt.user_id) {
                Some(cached) => cached.clone(),
                None => {
                    let resolved = self
                        .store
                        .get_user(attempt.user_id)
                        .await?
                        .map(|u| u.username);
                    usernames.insert(attempt.user_id, resolved.clone());
                    resolved
                }
            };
            let (Some(username), Some(score), Some(completed_at)) =
                (username, attempt.score, attempt.completed_at)
            else {
                continue;
            };
            entries.push(LeaderboardEntry {
                username,
                score,
                completed_at,
            });
        }

        Ok(entries)
    }
}
