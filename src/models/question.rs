// src/models/question.rs

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Kind of a question. Decides how submitted answers are judged.
///
/// Serialized as snake_case tags; the class names used by the older bot
/// exports (`QuestionString`, `QuestionChoice`, ...) are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    #[serde(alias = "QuestionString")]
    String,
    #[serde(alias = "QuestionNumber")]
    Number,
    #[serde(alias = "QuestionBool")]
    Bool,
    #[serde(alias = "QuestionChoiceSingle")]
    ChoiceSingle,
    #[serde(alias = "QuestionChoice")]
    ChoiceMulti,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::String => "string",
            QuestionType::Number => "number",
            QuestionType::Bool => "bool",
            QuestionType::ChoiceSingle => "choice_single",
            QuestionType::ChoiceMulti => "choice_multi",
        }
    }

    /// Choice questions must carry a list of options.
    pub fn is_choice(&self) -> bool {
        matches!(self, QuestionType::ChoiceSingle | QuestionType::ChoiceMulti)
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" | "QuestionString" => Ok(QuestionType::String),
            "number" | "QuestionNumber" => Ok(QuestionType::Number),
            "bool" | "QuestionBool" => Ok(QuestionType::Bool),
            "choice_single" | "QuestionChoiceSingle" => Ok(QuestionType::ChoiceSingle),
            "choice_multi" | "QuestionChoice" => Ok(QuestionType::ChoiceMulti),
            other => Err(AppError::Validation(format!(
                "Unknown question type '{}'",
                other
            ))),
        }
    }
}

/// A stored question of a quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub quiz_id: i64,

    /// Index of the question inside the authored quiz (0-based).
    pub position: i32,

    pub question_type: QuestionType,

    pub question_text: String,

    /// Accepted answer. For `choice_multi` a comma-separated set of option labels.
    pub correct_answer: String,

    /// Ordered options offered to the user. Present for choice questions.
    pub possible_answers: Option<Vec<String>>,
}

/// Question as shown to someone taking the quiz (no correct answer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: i64,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub question_text: String,
    pub possible_answers: Option<Vec<String>>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            question_type: q.question_type,
            question_text: q.question_text.clone(),
            possible_answers: q.possible_answers.clone(),
        }
    }
}

/// DTO for one question of a quiz definition.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QuestionInput {
    pub question_type: QuestionType,
    #[validate(length(min = 1, max = 1000))]
    pub question_text: String,
    #[validate(length(max = 500))]
    pub correct_answer: String,
    #[validate(custom(function = validate_options))]
    pub possible_answers: Option<Vec<String>>,
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    for opt in options {
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

/// Splits a comma-separated answer into trimmed tokens.
pub fn split_labels(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim)
}

impl QuestionInput {
    /// Checks the type-dependent rules: choice questions need options and their
    /// correct answer must be made of those options.
    pub fn check_consistency(&self, index: usize) -> AppResult<()> {
        if !self.question_type.is_choice() {
            return Ok(());
        }

        let options = match &self.possible_answers {
            Some(options) if !options.is_empty() => options,
            _ => {
                return Err(AppError::Validation(format!(
                    "Question {}: choice questions need at least one possible answer",
                    index + 1
                )));
            }
        };

        let is_option = |label: &str| options.iter().any(|o| o.trim() == label);

        let valid = match self.question_type {
            QuestionType::ChoiceMulti => split_labels(&self.correct_answer).all(is_option),
            _ => is_option(self.correct_answer.trim()),
        };

        if !valid {
            return Err(AppError::Validation(format!(
                "Question {}: correct answer '{}' is not among the possible answers",
                index + 1,
                self.correct_answer
            )));
        }
        Ok(())
    }
}
