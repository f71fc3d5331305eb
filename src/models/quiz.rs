// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::AppResult,
    models::question::{PublicQuestion, Question, QuestionInput},
};

/// An authored quiz with its questions in stored order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub name: String,

    /// Username of the author.
    pub author: String,

    /// Present the questions in a per-attempt shuffled order.
    pub is_random: bool,
    pub show_results_after_quiz: bool,
    pub show_results_after_question: bool,

    pub created_at: chrono::DateTime<chrono::Utc>,

    pub questions: Vec<Question>,
}

impl Quiz {
    pub fn question(&self, id: i64) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }
}

/// Quiz as returned to clients: questions without their correct answers.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicQuiz {
    pub id: i64,
    pub name: String,
    pub author: String,
    pub is_random: bool,
    pub show_results_after_quiz: bool,
    pub show_results_after_question: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub questions: Vec<PublicQuestion>,
}

impl From<Quiz> for PublicQuiz {
    fn from(quiz: Quiz) -> Self {
        Self {
            questions: quiz.questions.iter().map(PublicQuestion::from).collect(),
            id: quiz.id,
            name: quiz.name,
            author: quiz.author,
            is_random: quiz.is_random,
            show_results_after_quiz: quiz.show_results_after_quiz,
            show_results_after_question: quiz.show_results_after_question,
            created_at: quiz.created_at,
        }
    }
}

fn default_true() -> bool {
    true
}

/// DTO for creating a quiz or replacing an existing one.
/// The author is the acting user, never taken from the body.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QuizDefinition {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub is_random: bool,
    #[serde(default = "default_true")]
    pub show_results_after_quiz: bool,
    #[serde(default = "default_true")]
    pub show_results_after_question: bool,
    #[serde(default)]
    #[validate(nested)]
    pub questions: Vec<QuestionInput>,
}

impl QuizDefinition {
    /// Runs field validation and the per-question consistency rules.
    /// Nothing is persisted before this passes.
    pub fn check(&self) -> AppResult<()> {
        self.validate()?;
        for (index, question) in self.questions.iter().enumerate() {
            question.check_consistency(index)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct QuizSearchParams {
    pub q: String,
}

/// Acting user: the creator of a new quiz, or the author for author-only operations.
#[derive(Debug, Deserialize)]
pub struct ActingUser {
    pub user_id: i64,
}
