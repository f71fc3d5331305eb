// src/repository/postgres.rs

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, Transaction, postgres::PgPoolOptions, types::Json};

use crate::{
    error::{AppError, AppResult},
    models::{
        attempt::{Answer, Attempt, NewAnswer},
        question::Question,
        quiz::{Quiz, QuizDefinition},
        user::{CreateUserRequest, User},
    },
    repository::{AttemptRepository, QuizRepository, UserRepository},
};

const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Row of the 'quizzes' table.
#[derive(FromRow)]
struct QuizRow {
    id: i64,
    name: String,
    author: String,
    is_random: bool,
    show_results_after_quiz: bool,
    show_results_after_question: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl QuizRow {
    fn into_quiz(self, questions: Vec<Question>) -> Quiz {
        Quiz {
            id: self.id,
            name: self.name,
            author: self.author,
            is_random: self.is_random,
            show_results_after_quiz: self.show_results_after_quiz,
            show_results_after_question: self.show_results_after_question,
            created_at: self.created_at,
            questions,
        }
    }
}

/// Row of the 'questions' table. Options are stored as a JSON array.
#[derive(FromRow)]
struct QuestionRow {
    id: i64,
    quiz_id: i64,
    position: i32,
    question_type: String,
    question_text: String,
    correct_answer: String,
    possible_answers: Option<Json<Vec<String>>>,
}

impl TryFrom<QuestionRow> for Question {
    type Error = AppError;

    fn try_from(row: QuestionRow) -> AppResult<Self> {
        Ok(Question {
            id: row.id,
            quiz_id: row.quiz_id,
            position: row.position,
            question_type: row.question_type.parse()?,
            question_text: row.question_text,
            correct_answer: row.correct_answer,
            possible_answers: row.possible_answers.map(|Json(options)| options),
        })
    }
}

/// Row of the 'quiz_attempts' table.
#[derive(FromRow)]
struct AttemptRow {
    id: i64,
    quiz_id: i64,
    user_id: i64,
    question_order: Json<Vec<i64>>,
    started_at: chrono::DateTime<chrono::Utc>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    score: Option<i32>,
}

impl AttemptRow {
    fn into_attempt(self, answers: Vec<Answer>) -> Attempt {
        Attempt {
            id: self.id,
            quiz_id: self.quiz_id,
            user_id: self.user_id,
            question_order: self.question_order.0,
            started_at: self.started_at,
            completed_at: self.completed_at,
            score: self.score,
            answers,
        }
    }
}

const QUIZ_COLUMNS: &str =
    "id, name, author, is_random, show_results_after_quiz, show_results_after_question, created_at";

const QUESTION_COLUMNS: &str =
    "id, quiz_id, position, question_type, question_text, correct_answer, possible_answers";

const ATTEMPT_COLUMNS: &str =
    "id, quiz_id, user_id, question_order, started_at, completed_at, score";

/// PostgreSQL backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens the pool and brings the schema up to date. The database may
    /// still be starting when the service boots, so connecting is retried.
    pub async fn connect(url: &str, max_connections: u32) -> AppResult<Self> {
        let mut attempt = 1;
        let pool = loop {
            let result = PgPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Duration::from_secs(3))
                .connect(url)
                .await;
            match result {
                Ok(pool) => break pool,
                Err(e) if attempt < CONNECT_ATTEMPTS => {
                    tracing::warn!("Postgres unavailable ({}), attempt {}/{}", e, attempt, CONNECT_ATTEMPTS);
                    attempt += 1;
                    tokio::time::sleep(CONNECT_BACKOFF).await;
                }
                Err(e) => return Err(e.into()),
            }
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Persistence(format!("Migration failed: {}", e)))?;
        tracing::info!("Postgres ready, schema migrated");

        Ok(Self::new(pool))
    }

    /// Inserts the questions of a definition inside an open transaction.
    async fn insert_questions(
        tx: &mut Transaction<'_, Postgres>,
        quiz_id: i64,
        definition: &QuizDefinition,
    ) -> AppResult<Vec<Question>> {
        let mut questions = Vec::with_capacity(definition.questions.len());
        for (position, q) in definition.questions.iter().enumerate() {
            let row: QuestionRow = sqlx::query_as(&format!(
                r#"
                INSERT INTO questions
                    (quiz_id, position, question_type, question_text, correct_answer, possible_answers)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING {QUESTION_COLUMNS}
                "#
            ))
            .bind(quiz_id)
            .bind(position as i32)
            .bind(q.question_type.as_str())
            .bind(&q.question_text)
            .bind(&q.correct_answer)
            .bind(q.possible_answers.as_ref().map(Json))
            .fetch_one(&mut **tx)
            .await?;
            questions.push(row.try_into()?);
        }
        Ok(questions)
    }

    async fn attempt_exists(&self, id: i64) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM quiz_attempts WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Attaches questions to quiz rows with a single query.
    async fn with_questions(&self, rows: Vec<QuizRow>) -> AppResult<Vec<Quiz>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let question_rows: Vec<QuestionRow> = sqlx::query_as(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE quiz_id = ANY($1) ORDER BY quiz_id, position"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_quiz: HashMap<i64, Vec<Question>> = HashMap::new();
        for row in question_rows {
            let question = Question::try_from(row)?;
            by_quiz.entry(question.quiz_id).or_default().push(question);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let questions = by_quiz.remove(&row.id).unwrap_or_default();
                row.into_quiz(questions)
            })
            .collect())
    }
}

#[async_trait]
impl QuizRepository for PgStore {
    async fn create_quiz(&self, author: &str, definition: &QuizDefinition) -> AppResult<Quiz> {
        let mut tx = self.pool.begin().await?;

        let row: QuizRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO quizzes (name, author, is_random, show_results_after_quiz, show_results_after_question)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {QUIZ_COLUMNS}
            "#
        ))
        .bind(&definition.name)
        .bind(author)
        .bind(definition.is_random)
        .bind(definition.show_results_after_quiz)
        .bind(definition.show_results_after_question)
        .fetch_one(&mut *tx)
        .await?;

        let questions = Self::insert_questions(&mut tx, row.id, definition).await?;
        tx.commit().await?;

        Ok(row.into_quiz(questions))
    }

    async fn replace_quiz(&self, id: i64, definition: &QuizDefinition) -> AppResult<Option<Quiz>> {
        let mut tx = self.pool.begin().await?;

        // The row lock orders this replace against attempts being created (FOR SHARE there).
        let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM quizzes WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Ok(None);
        }

        let in_progress: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM quiz_attempts WHERE quiz_id = $1 AND completed_at IS NULL)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if in_progress {
            return Err(AppError::InvalidState(format!(
                "Quiz {} has attempts in progress",
                id
            )));
        }

        let row: Option<QuizRow> = sqlx::query_as(&format!(
            r#"
            UPDATE quizzes
            SET name = $2, is_random = $3,
                show_results_after_quiz = $4, show_results_after_question = $5
            WHERE id = $1
            RETURNING {QUIZ_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&definition.name)
        .bind(definition.is_random)
        .bind(definition.show_results_after_quiz)
        .bind(definition.show_results_after_question)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM questions WHERE quiz_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let questions = Self::insert_questions(&mut tx, id, definition).await?;
        tx.commit().await?;

        Ok(Some(row.into_quiz(questions)))
    }

    async fn delete_quiz(&self, id: i64) -> AppResult<bool> {
        // Questions, attempts and answers go with it (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM quizzes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_quiz(&self, id: i64) -> AppResult<Option<Quiz>> {
        let row: Option<QuizRow> =
            sqlx::query_as(&format!("SELECT {QUIZ_COLUMNS} FROM quizzes WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(self.with_questions(vec![row]).await?.pop())
    }

    async fn get_question(&self, id: i64) -> AppResult<Option<Question>> {
        let row: Option<QuestionRow> =
            sqlx::query_as(&format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Question::try_from).transpose()
    }

    async fn search_quizzes(&self, fragment: &str) -> AppResult<Vec<Quiz>> {
        let rows: Vec<QuizRow> = sqlx::query_as(&format!(
            "SELECT {QUIZ_COLUMNS} FROM quizzes WHERE name ILIKE '%' || $1 || '%' ORDER BY id"
        ))
        .bind(fragment)
        .fetch_all(&self.pool)
        .await?;
        self.with_questions(rows).await
    }

    async fn list_quizzes_by_author(&self, author: &str, skip: i64, limit: i64) -> AppResult<Vec<Quiz>> {
        let rows: Vec<QuizRow> = sqlx::query_as(&format!(
            "SELECT {QUIZ_COLUMNS} FROM quizzes WHERE author = $1 ORDER BY id OFFSET $2 LIMIT $3"
        ))
        .bind(author)
        .bind(skip.max(0))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        self.with_questions(rows).await
    }

    async fn count_quizzes_by_author(&self, author: &str) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quizzes WHERE author = $1")
            .bind(author)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl AttemptRepository for PgStore {
    async fn create_attempt(&self, quiz_id: i64, user_id: i64, question_order: &[i64]) -> AppResult<Attempt> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM quizzes WHERE id = $1 FOR SHARE")
            .bind(quiz_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(AppError::NotFound(format!("Quiz {} not found", quiz_id)));
        }

        let (total, listed): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE id = ANY($2))
            FROM questions
            WHERE quiz_id = $1
            "#,
        )
        .bind(quiz_id)
        .bind(question_order)
        .fetch_one(&mut *tx)
        .await?;
        let mut distinct = question_order.to_vec();
        distinct.sort_unstable();
        distinct.dedup();
        let expected = question_order.len() as i64;
        if total != expected || listed != expected || distinct.len() != question_order.len() {
            return Err(AppError::InvalidState(format!(
                "Quiz {} changed while the attempt was being started",
                quiz_id
            )));
        }

        let row: AttemptRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO quiz_attempts (quiz_id, user_id, question_order)
            VALUES ($1, $2, $3)
            RETURNING {ATTEMPT_COLUMNS}
            "#
        ))
        .bind(quiz_id)
        .bind(user_id)
        .bind(Json(question_order))
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(row.into_attempt(Vec::new()))
    }

    async fn get_attempt(&self, id: i64) -> AppResult<Option<Attempt>> {
        let row: Option<AttemptRow> =
            sqlx::query_as(&format!("SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let answers: Vec<Answer> = sqlx::query_as(
            r#"
            SELECT id, attempt_id, question_id, answer_text, is_correct, answered_at
            FROM answers
            WHERE attempt_id = $1
            ORDER BY id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(row.into_attempt(answers)))
    }

    async fn append_answer(&self, attempt_id: i64, answer: &NewAnswer) -> AppResult<Answer> {
        let stored: Answer = sqlx::query_as(
            r#"
            INSERT INTO answers (attempt_id, question_id, answer_text, is_correct, answered_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, attempt_id, question_id, answer_text, is_correct, answered_at
            "#,
        )
        .bind(attempt_id)
        .bind(answer.question_id)
        .bind(&answer.answer_text)
        .bind(answer.is_correct)
        .bind(answer.answered_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn save_attempt(&self, attempt: &Attempt) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE quiz_attempts
            SET completed_at = $2, score = $3
            WHERE id = $1 AND completed_at IS NULL
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.completed_at)
        .bind(attempt.score)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(if self.attempt_exists(attempt.id).await? {
                AppError::AlreadyCompleted(format!("Attempt {} is already completed", attempt.id))
            } else {
                AppError::NotFound(format!("Attempt {} not found", attempt.id))
            });
        }
        Ok(())
    }

    async fn delete_attempt(&self, id: i64) -> AppResult<()> {
        // Answers go with it (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM quiz_attempts WHERE id = $1 AND completed_at IS NULL")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(if self.attempt_exists(id).await? {
                AppError::InvalidState(format!("Attempt {} is already completed", id))
            } else {
                AppError::NotFound(format!("Attempt {} not found", id))
            });
        }
        Ok(())
    }

    async fn list_attempts_by_user(&self, user_id: i64) -> AppResult<Vec<Attempt>> {
        let rows: Vec<AttemptRow> = sqlx::query_as(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE user_id = $1 ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.into_attempt(Vec::new())).collect())
    }

    async fn list_attempts_by_quiz(&self, quiz_id: i64, skip: i64, limit: i64) -> AppResult<Vec<Attempt>> {
        let rows: Vec<AttemptRow> = sqlx::query_as(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE quiz_id = $1 ORDER BY id OFFSET $2 LIMIT $3"
        ))
        .bind(quiz_id)
        .bind(skip.max(0))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.into_attempt(Vec::new())).collect())
    }

    async fn list_completed_attempts(&self, quiz_id: i64) -> AppResult<Vec<Attempt>> {
        let rows: Vec<AttemptRow> = sqlx::query_as(&format!(
            r#"
            SELECT {ATTEMPT_COLUMNS}
            FROM quiz_attempts
            WHERE quiz_id = $1 AND completed_at IS NOT NULL
            ORDER BY completed_at, id
            "#
        ))
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.into_attempt(Vec::new())).collect())
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn create_user(&self, request: &CreateUserRequest) -> AppResult<User> {
        let user: User = sqlx::query_as(
            r#"
            INSERT INTO users (username, telegram_id)
            VALUES ($1, $2)
            RETURNING id, username, telegram_id, created_at
            "#,
        )
        .bind(&request.username)
        .bind(&request.telegram_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict(format!(
                "Username '{}' or telegram id already registered",
                request.username
            )),
            other => other,
        })?;
        Ok(user)
    }

    async fn get_user(&self, id: i64) -> AppResult<Option<User>> {
        let user: Option<User> =
            sqlx::query_as("SELECT id, username, telegram_id, created_at FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}
