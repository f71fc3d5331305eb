// src/models/attempt.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::question::PublicQuestion;

/// One user's run through a quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub quiz_id: i64,
    pub user_id: i64,

    /// Question ids in the order they are presented for this attempt.
    /// Fixed at creation, shuffled when the quiz is random.
    pub question_order: Vec<i64>,

    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,

    /// 0..=100, set on completion.
    pub score: Option<i32>,

    pub answers: Vec<Answer>,
}

impl Attempt {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Index into `question_order` of the next question to answer.
    pub fn cursor(&self) -> usize {
        self.answers.len()
    }

    pub fn correct_count(&self) -> usize {
        self.answers.iter().filter(|a| a.is_correct).count()
    }
}

/// A recorded response to one question of an attempt.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: i64,
    pub answer_text: String,
    pub is_correct: bool,
    pub answered_at: chrono::DateTime<chrono::Utc>,
}

/// Answer judged by the tracker, not yet stored.
#[derive(Debug, Clone)]
pub struct NewAnswer {
    pub question_id: i64,
    pub answer_text: String,
    pub is_correct: bool,
    pub answered_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for starting an attempt.
#[derive(Debug, Deserialize)]
pub struct StartAttemptRequest {
    pub quiz_id: i64,
    pub user_id: i64,
}

/// DTO for submitting an answer to the current question.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    pub question_id: i64,
    #[validate(length(max = 500))]
    pub answer_text: String,
}

/// The question at the cursor of an attempt.
#[derive(Debug, Serialize, Deserialize)]
pub struct CurrentQuestion {
    pub attempt_id: i64,
    /// 1-based.
    pub position: usize,
    pub total: usize,
    pub question: PublicQuestion,
}

/// Result of a submission.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerOutcome {
    pub answer: Answer,

    /// Revealed only when the quiz shows results after each question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,

    pub has_next_question: bool,
}

/// Per-question line of the review shown after a quiz.
#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionReview {
    pub question_id: i64,
    pub question_text: String,
    pub submitted: Option<String>,
    pub is_correct: bool,
    pub correct_answer: String,
}

/// Result of completing an attempt.
#[derive(Debug, Serialize, Deserialize)]
pub struct AttemptResult {
    pub attempt: Attempt,
    pub correct_count: usize,
    pub total_questions: usize,

    /// Present only when the quiz shows results after the quiz.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<Vec<QuestionReview>>,
}
