// src/repository/memory.rs

use std::{
    collections::BTreeMap,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chrono::Utc;

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

#[derive(Default)]
struct Data {
    next_id: i64,
    users: BTreeMap<i64, User>,
    quizzes: BTreeMap<i64, Quiz>,
    attempts: BTreeMap<i64, Attempt>,
}

impl Data {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn build_questions(&mut self, quiz_id: i64, definition: &QuizDefinition) -> Vec<Question> {
        definition
            .questions
            .iter()
            .enumerate()
            .map(|(position, q)| Question {
                id: self.next_id(),
                quiz_id,
                position: position as i32,
                question_type: q.question_type,
                question_text: q.question_text.clone(),
                correct_answer: q.correct_answer.clone(),
                possible_answers: q.possible_answers.clone(),
            })
            .collect()
    }
}

/// Whether `order` lists every question of the quiz exactly once.
fn is_permutation(quiz: &Quiz, order: &[i64]) -> bool {
    let mut expected: Vec<i64> = quiz.questions.iter().map(|q| q.id).collect();
    let mut given = order.to_vec();
    expected.sort_unstable();
    given.sort_unstable();
    expected == given
}

fn without_answers(attempt: &Attempt) -> Attempt {
    Attempt {
        answers: Vec::new(),
        ..attempt.clone()
    }
}

fn page<T>(items: impl Iterator<Item = T>, skip: i64, limit: i64) -> Vec<T> {
    items
        .skip(skip.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

/// In-process store. Ids come from one shared counter.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<Data>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: every call fails with `Persistence` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Data>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Persistence("memory store unavailable".to_string()));
        }
        self.data
            .lock()
            .map_err(|e| AppError::Persistence(e.to_string()))
    }
}

#[async_trait]
impl QuizRepository for MemoryStore {
    async fn create_quiz(&self, author: &str, definition: &QuizDefinition) -> AppResult<Quiz> {
        let mut data = self.lock()?;
        let id = data.next_id();
        let questions = data.build_questions(id, definition);
        let quiz = Quiz {
            id,
            name: definition.name.clone(),
            author: author.to_string(),
            is_random: definition.is_random,
            show_results_after_quiz: definition.show_results_after_quiz,
            show_results_after_question: definition.show_results_after_question,
            created_at: Utc::now(),
            questions,
        };
        data.quizzes.insert(id, quiz.clone());
        Ok(quiz)
    }

    async fn replace_quiz(&self, id: i64, definition: &QuizDefinition) -> AppResult<Option<Quiz>> {
        let mut data = self.lock()?;
        if !data.quizzes.contains_key(&id) {
            return Ok(None);
        }
        if data
            .attempts
            .values()
            .any(|a| a.quiz_id == id && !a.is_completed())
        {
            return Err(AppError::InvalidState(format!(
                "Quiz {} has attempts in progress",
                id
            )));
        }
        let questions = data.build_questions(id, definition);
        let Some(quiz) = data.quizzes.get_mut(&id) else {
            return Ok(None);
        };
        quiz.name = definition.name.clone();
        quiz.is_random = definition.is_random;
        quiz.show_results_after_quiz = definition.show_results_after_quiz;
        quiz.show_results_after_question = definition.show_results_after_question;
        quiz.questions = questions;
        Ok(Some(quiz.clone()))
    }

    async fn delete_quiz(&self, id: i64) -> AppResult<bool> {
        let mut data = self.lock()?;
        if data.quizzes.remove(&id).is_none() {
            return Ok(false);
        }
        data.attempts.retain(|_, a| a.quiz_id != id);
        Ok(true)
    }

    async fn get_quiz(&self, id: i64) -> AppResult<Option<Quiz>> {
        Ok(self.lock()?.quizzes.get(&id).cloned())
    }

    async fn get_question(&self, id: i64) -> AppResult<Option<Question>> {
        let data = self.lock()?;
        Ok(data
            .quizzes
            .values()
            .flat_map(|quiz| quiz.questions.iter())
            .find(|q| q.id == id)
            .cloned())
    }

    async fn search_quizzes(&self, fragment: &str) -> AppResult<Vec<Quiz>> {
        let needle = fragment.to_lowercase();
        let data = self.lock()?;
        Ok(data
            .quizzes
            .values()
            .filter(|quiz| quiz.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn list_quizzes_by_author(&self, author: &str, skip: i64, limit: i64) -> AppResult<Vec<Quiz>> {
        let data = self.lock()?;
        Ok(page(
            data.quizzes.values().filter(|quiz| quiz.author == author).cloned(),
            skip,
            limit,
        ))
    }

    async fn count_quizzes_by_author(&self, author: &str) -> AppResult<i64> {
        let data = self.lock()?;
        Ok(data.quizzes.values().filter(|quiz| quiz.author == author).count() as i64)
    }
}

#[async_trait]
impl AttemptRepository for MemoryStore {
    async fn create_attempt(&self, quiz_id: i64, user_id: i64, question_order: &[i64]) -> AppResult<Attempt> {
        let mut data = self.lock()?;
        let quiz = data
            .quizzes
            .get(&quiz_id)
            .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", quiz_id)))?;
        if !is_permutation(quiz, question_order) {
            return Err(AppError::InvalidState(format!(
                "Quiz {} changed while the attempt was being started",
                quiz_id
            )));
        }
        let id = data.next_id();
        let attempt = Attempt {
            id,
            quiz_id,
            user_id,
            question_order: question_order.to_vec(),
            started_at: Utc::now(),
            completed_at: None,
            score: None,
            answers: Vec::new(),
        };
        data.attempts.insert(id, attempt.clone());
        Ok(attempt)
    }

    async fn get_attempt(&self, id: i64) -> AppResult<Option<Attempt>> {
        Ok(self.lock()?.attempts.get(&id).cloned())
    }

    async fn append_answer(&self, attempt_id: i64, answer: &NewAnswer) -> AppResult<Answer> {
        let mut data = self.lock()?;
        let id = data.next_id();
        let attempt = data
            .attempts
            .get_mut(&attempt_id)
            .ok_or_else(|| AppError::NotFound(format!("Attempt {} not found", attempt_id)))?;
        let stored = Answer {
            id,
            attempt_id,
            question_id: answer.question_id,
            answer_text: answer.answer_text.clone(),
            is_correct: answer.is_correct,
            answered_at: answer.answered_at,
        };
        attempt.answers.push(stored.clone());
        Ok(stored)
    }

    async fn save_attempt(&self, attempt: &Attempt) -> AppResult<()> {
        let mut data = self.lock()?;
        let stored = data
            .attempts
            .get_mut(&attempt.id)
            .ok_or_else(|| AppError::NotFound(format!("Attempt {} not found", attempt.id)))?;
        if stored.is_completed() {
            return Err(AppError::AlreadyCompleted(format!(
                "Attempt {} is already completed",
                attempt.id
            )));
        }
        stored.completed_at = attempt.completed_at;
        stored.score = attempt.score;
        Ok(())
    }

    async fn delete_attempt(&self, id: i64) -> AppResult<()> {
        let mut data = self.lock()?;
        let stored = data
            .attempts
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Attempt {} not found", id)))?;
        if stored.is_completed() {
            return Err(AppError::InvalidState(format!(
                "Attempt {} is already completed",
                id
            )));
        }
        data.attempts.remove(&id);
        Ok(())
    }

    async fn list_attempts_by_user(&self, user_id: i64) -> AppResult<Vec<Attempt>> {
        let data = self.lock()?;
        Ok(data
            .attempts
            .values()
            .filter(|a| a.user_id == user_id)
            .map(without_answers)
            .collect())
    }

    async fn list_attempts_by_quiz(&self, quiz_id: i64, skip: i64, limit: i64) -> AppResult<Vec<Attempt>> {
        let data = self.lock()?;
        Ok(page(
            data.attempts
                .values()
                .filter(|a| a.quiz_id == quiz_id)
                .map(without_answers),
            skip,
            limit,
        ))
    }

    async fn list_completed_attempts(&self, quiz_id: i64) -> AppResult<Vec<Attempt>> {
        let data = self.lock()?;
        let mut completed: Vec<Attempt> = data
            .attempts
            .values()
            .filter(|a| a.quiz_id == quiz_id && a.is_completed())
            .map(without_answers)
            .collect();
        completed.sort_by_key(|a| (a.completed_at, a.id));
        Ok(completed)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, request: &CreateUserRequest) -> AppResult<User> {
        let mut data = self.lock()?;
        if data.users.values().any(|u| u.username == request.username) {
            return Err(AppError::Conflict(format!(
                "Username '{}' already registered",
                request.username
            )));
        }
        if let Some(telegram_id) = &request.telegram_id {
            if data
                .users
                .values()
                .any(|u| u.telegram_id.as_ref() == Some(telegram_id))
            {
                return Err(AppError::Conflict(format!(
                    "Telegram id '{}' already registered",
                    telegram_id
                )));
            }
        }
        let id = data.next_id();
        let user = User {
            id,
            username: request.username.clone(),
            telegram_id: request.telegram_id.clone(),
            created_at: Utc::now(),
        };
        data.users.insert(id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: i64) -> AppResult<Option<User>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }
}
