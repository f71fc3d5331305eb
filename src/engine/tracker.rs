// src/engine/tracker.rs

use chrono::{DateTime, Utc};
use rand::{Rng, seq::SliceRandom};

use crate::{
    engine::{matcher, scoring},
    error::{AppError, AppResult},
    models::{
        attempt::{Answer, Attempt, CurrentQuestion, NewAnswer, QuestionReview},
        question::{PublicQuestion, Question},
        quiz::Quiz,
    },
};

/// Picks the presentation order for a new attempt.
/// Stored order unless the quiz is random, in which case a shuffled permutation.
pub fn presentation_order<R: Rng + ?Sized>(quiz: &Quiz, rng: &mut R) -> Vec<i64> {
    let mut order: Vec<i64> = quiz.questions.iter().map(|q| q.id).collect();
    if quiz.is_random {
        order.shuffle(rng);
    }
    order
}

/// Drives one attempt through its questions.
///
/// The tracker never writes anywhere itself: `judge` and `completed` return the
/// change to persist, `record` and `commit` apply it once the store accepted it.
#[derive(Debug, Clone)]
pub struct AttemptTracker {
    attempt: Attempt,
    /// Questions in presentation order (parallel to `attempt.question_order`).
    questions: Vec<Question>,
    show_results_after_question: bool,
    show_results_after_quiz: bool,
}

impl AttemptTracker {
    /// Binds a stored attempt to the questions of its quiz.
    pub fn new(quiz: &Quiz, attempt: Attempt) -> AppResult<Self> {
        if attempt.quiz_id != quiz.id {
            return Err(AppError::InvalidState(format!(
                "Attempt {} does not belong to quiz {}",
                attempt.id, quiz.id
            )));
        }

        let questions = attempt
            .question_order
            .iter()
            .map(|id| {
                quiz.question(*id).cloned().ok_or_else(|| {
                    AppError::NotFound(format!("Question {} of attempt {} not found", id, attempt.id))
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self {
            attempt,
            questions,
            show_results_after_question: quiz.show_results_after_question,
            show_results_after_quiz: quiz.show_results_after_quiz,
        })
    }

    pub fn attempt(&self) -> &Attempt {
        &self.attempt
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    pub fn current_question(&self) -> Option<&Question> {
        if self.attempt.is_completed() {
            return None;
        }
        self.questions.get(self.attempt.cursor())
    }

    /// Public view of the question at the cursor, `None` once everything is answered.
    pub fn current(&self) -> AppResult<Option<CurrentQuestion>> {
        self.ensure_in_progress()?;
        Ok(self.current_question().map(|q| CurrentQuestion {
            attempt_id: self.attempt.id,
            position: self.attempt.cursor() + 1,
            total: self.total_questions(),
            question: PublicQuestion::from(q),
        }))
    }

    pub fn has_next_question(&self) -> bool {
        self.current_question().is_some()
    }

    /// Judges a submission for the question at the cursor.
    ///
    /// Fails with `InvalidState` after completion, past the last question, or when
    /// `question_id` is not the question at the cursor.
    pub fn judge(&self, question_id: i64, text: &str, now: DateTime<Utc>) -> AppResult<NewAnswer> {
        self.ensure_in_progress()?;

        let question = self.current_question().ok_or_else(|| {
            AppError::InvalidState(format!(
                "Attempt {} has no unanswered questions left",
                self.attempt.id
            ))
        })?;

        if question.id != question_id {
            return Err(AppError::InvalidState(format!(
                "Attempt {} expects an answer for question {}, got {}",
                self.attempt.id, question.id, question_id
            )));
        }

        Ok(NewAnswer {
            question_id,
            answer_text: text.to_string(),
            is_correct: matcher::is_correct(question, text),
            answered_at: now,
        })
    }

    /// Appends a stored answer and advances the cursor.
    pub fn record(&mut self, answer: Answer) {
        self.attempt.answers.push(answer);
    }

    /// Correct answer to reveal for a question, if the quiz shows results per question.
    pub fn reveal(&self, question_id: i64) -> Option<String> {
        if !self.show_results_after_question {
            return None;
        }
        self.questions
            .iter()
            .find(|q| q.id == question_id)
            .map(|q| q.correct_answer.clone())
    }

    /// Completed copy of the attempt. Unanswered questions count as incorrect.
    pub fn completed(&self, now: DateTime<Utc>) -> AppResult<Attempt> {
        if self.attempt.is_completed() {
            return Err(AppError::AlreadyCompleted(format!(
                "Attempt {} is already completed",
                self.attempt.id
            )));
        }

        let mut attempt = self.attempt.clone();
        attempt.score = Some(scoring::score(attempt.correct_count(), self.total_questions()));
        attempt.completed_at = Some(now);
        Ok(attempt)
    }

    pub fn commit(&mut self, attempt: Attempt) {
        self.attempt = attempt;
    }

    /// Per-question summary, if the quiz shows results after the quiz.
    pub fn review(&self) -> Option<Vec<QuestionReview>> {
        if !self.show_results_after_quiz {
            return None;
        }
        let review = self
            .questions
            .iter()
            .map(|q| {
                let answer = self.attempt.answers.iter().find(|a| a.question_id == q.id);
                QuestionReview {
                    question_id: q.id,
                    question_text: q.question_text.clone(),
                    submitted: answer.map(|a| a.answer_text.clone()),
                    is_correct: answer.is_some_and(|a| a.is_correct),
                    correct_answer: q.correct_answer.clone(),
                }
            })
            .collect();
        Some(review)
    }

    fn ensure_in_progress(&self) -> AppResult<()> {
        if self.attempt.is_completed() {
            return Err(AppError::InvalidState(format!(
                "Attempt {} is already completed",
                self.attempt.id
            )));
        }
        Ok(())
    }
}
