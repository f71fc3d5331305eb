// src/engine/matcher.rs

use std::collections::HashSet;

use crate::models::question::{Question, QuestionType, split_labels};

/// Judges a submitted answer against the question's correct answer.
///
/// * `choice_multi`: both sides are comma-separated label sets; order and duplicates are ignored.
/// * every other type: trimmed, case-sensitive string equality.
pub fn is_correct(question: &Question, submitted: &str) -> bool {
    match question.question_type {
        QuestionType::ChoiceMulti => {
            let expected: HashSet<&str> = split_labels(&question.correct_answer).collect();
            let given: HashSet<&str> = split_labels(submitted).collect();
            expected == given
        }
        QuestionType::String
        | QuestionType::Number
        | QuestionType::Bool
        | QuestionType::ChoiceSingle => submitted.trim() == question.correct_answer.trim(),
    }
}
