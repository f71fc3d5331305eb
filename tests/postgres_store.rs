// tests/postgres_store.rs

//! `PgStore` against a real database. Skipped unless `DATABASE_URL` is set.

use std::sync::Arc;

use chrono::Utc;
use quizbot::{
    engine::QuizService,
    error::AppError,
    models::{
        attempt::{NewAnswer, SubmitAnswerRequest},
        question::{QuestionInput, QuestionType},
        quiz::QuizDefinition,
        user::{CreateUserRequest, User},
    },
    repository::{AttemptRepository, PgStore, QuizRepository, UserRepository},
};
use sqlx::postgres::PgPoolOptions;

/// Connects and migrates, or returns `None` when no database is configured.
async fn store() -> Option<PgStore> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping Postgres store test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing. Make sure DATABASE_URL is set.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    Some(PgStore::new(pool))
}

async fn user(store: &PgStore) -> User {
    store
        .create_user(&CreateUserRequest {
            username: format!("pg_{}", &uuid::Uuid::new_v4().to_string()[..12]),
            telegram_id: None,
        })
        .await
        .unwrap()
}

fn capitals() -> QuizDefinition {
    QuizDefinition {
        name: "Capitals".to_string(),
        is_random: false,
        show_results_after_quiz: true,
        show_results_after_question: true,
        questions: vec![
            QuestionInput {
                question_type: QuestionType::String,
                question_text: "What is the capital of France?".to_string(),
                correct_answer: "Paris".to_string(),
                possible_answers: None,
            },
            QuestionInput {
                question_type: QuestionType::ChoiceMulti,
                question_text: "Which of these are capitals?".to_string(),
                correct_answer: "Paris,Rome".to_string(),
                possible_answers: Some(vec![
                    "Paris".to_string(),
                    "Rome".to_string(),
                    "Berlin".to_string(),
                ]),
            },
        ],
    }
}

fn single(text: &str) -> QuizDefinition {
    QuizDefinition {
        name: "Replaced".to_string(),
        is_random: true,
        show_results_after_quiz: false,
        show_results_after_question: false,
        questions: vec![QuestionInput {
            question_type: QuestionType::ChoiceSingle,
            question_text: text.to_string(),
            correct_answer: "B".to_string(),
            possible_answers: Some(vec!["A".to_string(), "B".to_string()]),
        }],
    }
}

fn order(quiz: &quizbot::models::quiz::Quiz) -> Vec<i64> {
    quiz.questions.iter().map(|q| q.id).collect()
}

fn judged(question_id: i64, text: &str, is_correct: bool) -> NewAnswer {
    NewAnswer {
        question_id,
        answer_text: text.to_string(),
        is_correct,
        answered_at: Utc::now(),
    }
}

#[tokio::test]
async fn json_columns_survive_a_reload() {
    let Some(store) = store().await else { return };
    let author = user(&store).await;
    let quiz = store.create_quiz(&author.username, &capitals()).await.unwrap();

    let loaded = store.get_quiz(quiz.id).await.unwrap().unwrap();
    assert_eq!(loaded.author, author.username);
    assert_eq!(loaded.questions, quiz.questions);
    assert_eq!(loaded.questions[0].possible_answers, None);
    assert_eq!(
        loaded.questions[1].possible_answers.as_deref(),
        Some(&["Paris".to_string(), "Rome".to_string(), "Berlin".to_string()][..])
    );
    assert_eq!(loaded.questions[1].question_type, QuestionType::ChoiceMulti);

    let question = store.get_question(quiz.questions[1].id).await.unwrap().unwrap();
    assert_eq!(question, quiz.questions[1]);

    let mut reversed = order(&quiz);
    reversed.reverse();
    let attempt = store.create_attempt(quiz.id, author.id, &reversed).await.unwrap();
    let loaded = store.get_attempt(attempt.id).await.unwrap().unwrap();
    assert_eq!(loaded.question_order, reversed);
}

#[tokio::test]
async fn answers_come_back_in_submission_order() {
    let Some(store) = store().await else { return };
    let player = user(&store).await;
    let quiz = store.create_quiz(&player.username, &capitals()).await.unwrap();
    let attempt = store.create_attempt(quiz.id, player.id, &order(&quiz)).await.unwrap();

    let first = store
        .append_answer(attempt.id, &judged(quiz.questions[0].id, "paris", false))
        .await
        .unwrap();
    let second = store
        .append_answer(attempt.id, &judged(quiz.questions[1].id, "Rome, Paris", true))
        .await
        .unwrap();

    let loaded = store.get_attempt(attempt.id).await.unwrap().unwrap();
    assert_eq!(loaded.answers.len(), 2);
    assert_eq!(loaded.answers[0].id, first.id);
    assert_eq!(loaded.answers[1].id, second.id);
    assert!(!loaded.answers[0].is_correct);
    assert_eq!(loaded.answers[1].answer_text, "Rome, Paris");
    assert_eq!(loaded.cursor(), 2);
}

#[tokio::test]
async fn save_attempt_is_conditional() {
    let Some(store) = store().await else { return };
    let player = user(&store).await;
    let quiz = store.create_quiz(&player.username, &capitals()).await.unwrap();
    let mut attempt = store.create_attempt(quiz.id, player.id, &order(&quiz)).await.unwrap();

    attempt.completed_at = Some(Utc::now());
    attempt.score = Some(50);
    store.save_attempt(&attempt).await.unwrap();

    attempt.score = Some(100);
    assert!(matches!(
        store.save_attempt(&attempt).await,
        Err(AppError::AlreadyCompleted(_))
    ));
    let stored = store.get_attempt(attempt.id).await.unwrap().unwrap();
    assert_eq!(stored.score, Some(50));

    attempt.id = i64::MAX;
    assert!(matches!(
        store.save_attempt(&attempt).await,
        Err(AppError::NotFound(_))
    ));

    let completed = store.list_completed_attempts(quiz.id).await.unwrap();
    assert_eq!(completed.len(), 1);
    assert!(completed[0].answers.is_empty());
}

#[tokio::test]
async fn replace_swaps_questions_and_keeps_the_author() {
    let Some(store) = store().await else { return };
    let author = user(&store).await;
    let quiz = store.create_quiz(&author.username, &capitals()).await.unwrap();

    let replaced = store
        .replace_quiz(quiz.id, &single("Pick B"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(replaced.author, author.username);
    assert_eq!(replaced.name, "Replaced");
    assert!(replaced.is_random);
    assert_eq!(replaced.questions.len(), 1);
    assert_eq!(replaced.questions[0].position, 0);

    for old in &quiz.questions {
        assert!(store.get_question(old.id).await.unwrap().is_none());
    }
    assert_eq!(store.get_quiz(quiz.id).await.unwrap().unwrap().questions, replaced.questions);
    assert!(store.replace_quiz(i64::MAX, &single("x")).await.unwrap().is_none());

    // An order built before the replace no longer matches.
    assert!(matches!(
        store.create_attempt(quiz.id, author.id, &order(&quiz)).await,
        Err(AppError::InvalidState(_))
    ));
}

#[tokio::test]
async fn replace_refused_while_an_attempt_is_in_progress() {
    let Some(store) = store().await else { return };
    let author = user(&store).await;
    let quiz = store.create_quiz(&author.username, &capitals()).await.unwrap();
    let attempt = store.create_attempt(quiz.id, author.id, &order(&quiz)).await.unwrap();

    assert!(matches!(
        store.replace_quiz(quiz.id, &single("Pick B")).await,
        Err(AppError::InvalidState(_))
    ));
    // The rolled back transaction left the quiz as it was.
    let loaded = store.get_quiz(quiz.id).await.unwrap().unwrap();
    assert_eq!(loaded.name, "Capitals");
    assert_eq!(loaded.questions, quiz.questions);

    store.delete_attempt(attempt.id).await.unwrap();
    store.replace_quiz(quiz.id, &single("Pick B")).await.unwrap().unwrap();
}

#[tokio::test]
async fn delete_attempt_only_while_in_progress() {
    let Some(store) = store().await else { return };
    let player = user(&store).await;
    let quiz = store.create_quiz(&player.username, &capitals()).await.unwrap();

    let open = store.create_attempt(quiz.id, player.id, &order(&quiz)).await.unwrap();
    store
        .append_answer(open.id, &judged(quiz.questions[0].id, "Paris", true))
        .await
        .unwrap();
    store.delete_attempt(open.id).await.unwrap();
    assert!(store.get_attempt(open.id).await.unwrap().is_none());
    assert!(matches!(
        store.delete_attempt(open.id).await,
        Err(AppError::NotFound(_))
    ));

    let mut done = store.create_attempt(quiz.id, player.id, &order(&quiz)).await.unwrap();
    done.completed_at = Some(Utc::now());
    done.score = Some(0);
    store.save_attempt(&done).await.unwrap();
    assert!(matches!(
        store.delete_attempt(done.id).await,
        Err(AppError::InvalidState(_))
    ));
    assert_eq!(store.list_attempts_by_user(player.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn capitals_flow_over_postgres() {
    let Some(store) = store().await else { return };
    let author = user(&store).await;
    let service = QuizService::new(Arc::new(store));

    let quiz = service.create_quiz(author.id, capitals()).await.unwrap();
    let attempt = service.start_attempt(quiz.id, author.id).await.unwrap();
    let outcome = service
        .submit_answer(
            attempt.id,
            SubmitAnswerRequest {
                question_id: attempt.question_order[0],
                answer_text: "Paris".to_string(),
            },
        )
        .await
        .unwrap();
    assert!(outcome.answer.is_correct);

    let result = service.complete_attempt(attempt.id).await.unwrap();
    assert_eq!(result.attempt.score, Some(50));
    assert!(matches!(
        service.complete_attempt(attempt.id).await,
        Err(AppError::AlreadyCompleted(_))
    ));

    let board = service.leaderboard(quiz.id, None).await.unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].username, author.username);
}
