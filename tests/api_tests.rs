// tests/api_tests.rs

use std::sync::Arc;

use quizbot::{
    config::Config, engine::QuizService, repository::MemoryStore, routes, state::AppState,
};
use serde_json::{Value, json};

/// Helper function to spawn the app on a random port for testing.
/// Returns the base URL (e.g., "http://127.0.0.1:12345").
async fn spawn_app() -> String {
    // 1. In-memory store, no database needed
    let store = Arc::new(MemoryStore::new());

    // 2. Create test configuration and state
    let config = Config {
        database_url: None,
        db_max_connections: 1,
        bind_addr: "127.0.0.1:0".to_string(),
        rust_log: "error".to_string(),
    };

    let state = AppState {
        service: Arc::new(QuizService::new(store)),
        config,
    };

    // 3. Create the router with the app state
    let app = routes::create_router(state);

    // 4. Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    // 5. Spawn the server in the background
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().to_string()[..8])
}

async fn create_user(client: &reqwest::Client, address: &str, username: &str) -> i64 {
    let response = client
        .post(format!("{}/api/users", address))
        .json(&json!({ "username": username }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 201);
    response.json::<Value>().await.unwrap()["id"].as_i64().unwrap()
}

fn capitals() -> Value {
    json!({
        "name": "Capitals",
        "questions": [
            {
                "question_type": "string",
                "question_text": "What is the capital of France?",
                "correct_answer": "Paris"
            },
            {
                "question_type": "choice_multi",
                "question_text": "Which of these are capitals?",
                "correct_answer": "Paris,Rome",
                "possible_answers": ["Paris", "Rome", "Berlin"]
            }
        ]
    })
}

/// Creates the "Capitals" quiz (one text question, one multi-choice question)
/// as the given user.
async fn create_capitals(client: &reqwest::Client, address: &str, author_id: i64) -> Value {
    let response = client
        .post(format!("{}/api/quizzes?user_id={}", address, author_id))
        .json(&capitals())
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 201);
    response.json::<Value>().await.unwrap()
}

fn has_answers(quiz: &Value) -> bool {
    quiz["questions"]
        .as_array()
        .unwrap()
        .iter()
        .any(|q| q.get("correct_answer").is_some())
}

#[tokio::test]
async fn health_check_works() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(format!("{}/health", address))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert!(response.status().is_success());
    let body = response.json::<Value>().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn unknown_path_is_404() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn duplicate_username_is_conflict() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let name = unique_name("u");
    create_user(&client, &address, &name).await;

    let response = client
        .post(format!("{}/api/users", address))
        .json(&json!({ "username": name }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn invalid_quiz_is_rejected() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let author_id = create_user(&client, &address, &unique_name("a")).await;

    // Correct answer is not one of the options.
    let response = client
        .post(format!("{}/api/quizzes?user_id={}", address, author_id))
        .json(&json!({
            "name": "Broken",
            "questions": [{
                "question_type": "choice_single",
                "question_text": "Capital of Italy?",
                "correct_answer": "Rome",
                "possible_answers": ["Paris", "Berlin"]
            }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 422);

    let found = client
        .get(format!("{}/api/quizzes/search?q=Broken", address))
        .send()
        .await
        .unwrap()
        .json::<Vec<Value>>()
        .await
        .unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn public_quiz_hides_answers() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let author = unique_name("a");
    let author_id = create_user(&client, &address, &author).await;
    let quiz = create_capitals(&client, &address, author_id).await;
    assert_eq!(quiz["author"], author.as_str());
    assert!(!has_answers(&quiz));

    let body = client
        .get(format!("{}/api/quizzes/{}", address, quiz["id"]))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(body["questions"].as_array().unwrap().len(), 2);
    assert!(!has_answers(&body));
    assert_eq!(body["questions"][1]["type"], "choice_multi");
}

#[tokio::test]
async fn quiz_author_must_exist() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/quizzes?user_id=999999", address))
        .json(&capitals())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    // Without an acting user the request is malformed.
    let response = client
        .post(format!("{}/api/quizzes", address))
        .json(&capitals())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let found = client
        .get(format!("{}/api/quizzes/search?q=Capitals", address))
        .send()
        .await
        .unwrap()
        .json::<Vec<Value>>()
        .await
        .unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn attempt_flow() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let author = unique_name("a");
    let player = unique_name("p");
    let author_id = create_user(&client, &address, &author).await;
    let player_id = create_user(&client, &address, &player).await;
    let quiz = create_capitals(&client, &address, author_id).await;
    let q1 = quiz["questions"][0]["id"].as_i64().unwrap();
    let q2 = quiz["questions"][1]["id"].as_i64().unwrap();

    // 1. Start
    let response = client
        .post(format!("{}/api/attempts", address))
        .json(&json!({ "quiz_id": quiz["id"], "user_id": player_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let attempt = response.json::<Value>().await.unwrap();
    let attempt_id = attempt["id"].as_i64().unwrap();
    assert!(attempt["score"].is_null());
    assert!(attempt["completed_at"].is_null());

    // 2. Current question is the first one
    let current = client
        .get(format!("{}/api/attempts/{}/question", address, attempt_id))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(current["question"]["id"].as_i64().unwrap(), q1);
    assert_eq!(current["position"], 1);
    assert_eq!(current["total"], 2);

    // 3. Answering the second question first is refused
    let response = client
        .post(format!("{}/api/attempts/{}/answers", address, attempt_id))
        .json(&json!({ "question_id": q2, "answer_text": "Paris, Rome" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);

    // 4. Lowercase answer is wrong, correct answer is revealed
    let outcome = client
        .post(format!("{}/api/attempts/{}/answers", address, attempt_id))
        .json(&json!({ "question_id": q1, "answer_text": "paris" }))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(outcome["answer"]["is_correct"], false);
    assert_eq!(outcome["correct_answer"], "Paris");
    assert_eq!(outcome["has_next_question"], true);

    // 5. Multi-choice in another order is right
    let outcome = client
        .post(format!("{}/api/attempts/{}/answers", address, attempt_id))
        .json(&json!({ "question_id": q2, "answer_text": "Rome, Paris" }))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(outcome["answer"]["is_correct"], true);
    assert_eq!(outcome["has_next_question"], false);

    let current = client
        .get(format!("{}/api/attempts/{}/question", address, attempt_id))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert!(current.is_null());

    // 6. Complete
    let result = client
        .post(format!("{}/api/attempts/{}/complete", address, attempt_id))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(result["attempt"]["score"], 50);
    assert_eq!(result["correct_count"], 1);
    assert_eq!(result["review"].as_array().unwrap().len(), 2);

    // 7. Completing again is a conflict
    let response = client
        .post(format!("{}/api/attempts/{}/complete", address, attempt_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);

    // 8. Leaderboard and stats
    let board = client
        .get(format!("{}/api/quizzes/{}/leaderboard", address, quiz["id"]))
        .send()
        .await
        .unwrap()
        .json::<Vec<Value>>()
        .await
        .unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0]["username"], player.as_str());
    assert_eq!(board[0]["score"], 50);

    let response = client
        .get(format!("{}/api/quizzes/{}/leaderboard?limit=0", address, quiz["id"]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert!(response.json::<Vec<Value>>().await.unwrap().is_empty());

    let response = client
        .get(format!("{}/api/quizzes/{}/leaderboard?limit=101", address, quiz["id"]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 422);

    let stats = client
        .get(format!("{}/api/users/{}/stats", address, player_id))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(stats["total_attempts"], 1);
    assert_eq!(stats["completed_attempts"], 1);
    assert_eq!(stats["average_score"], 50.0);
    assert_eq!(stats["total_quizzes_created"], 0);
}

#[tokio::test]
async fn cancel_frees_the_session() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let author = unique_name("a");
    let user_id = create_user(&client, &address, &author).await;
    let quiz = create_capitals(&client, &address, user_id).await;

    let start = || {
        client
            .post(format!("{}/api/attempts", address))
            .json(&json!({ "quiz_id": quiz["id"], "user_id": user_id }))
            .send()
    };

    let first = start().await.unwrap().json::<Value>().await.unwrap();
    assert_eq!(start().await.unwrap().status().as_u16(), 409);

    let response = client
        .post(format!("{}/api/attempts/{}/cancel", address, first["id"]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    // The cancelled attempt is gone.
    let response = client
        .get(format!("{}/api/attempts/{}", address, first["id"]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    assert_eq!(start().await.unwrap().status().as_u16(), 201);
}

#[tokio::test]
async fn only_author_can_delete() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let author = unique_name("a");
    let other = unique_name("o");
    let author_id = create_user(&client, &address, &author).await;
    let other_id = create_user(&client, &address, &other).await;
    let quiz = create_capitals(&client, &address, author_id).await;

    let response = client
        .delete(format!("{}/api/quizzes/{}?user_id={}", address, quiz["id"], other_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = client
        .delete(format!("{}/api/quizzes/{}?user_id={}", address, quiz["id"], author_id))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let response = client
        .get(format!("{}/api/quizzes/{}", address, quiz["id"]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn user_quizzes_are_listed_by_author() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let author = unique_name("a");
    let author_id = create_user(&client, &address, &author).await;
    let other_id = create_user(&client, &address, &unique_name("o")).await;
    create_capitals(&client, &address, author_id).await;
    create_capitals(&client, &address, author_id).await;
    create_capitals(&client, &address, other_id).await;

    let quizzes = client
        .get(format!("{}/api/users/{}/quizzes", address, author_id))
        .send()
        .await
        .unwrap()
        .json::<Vec<Value>>()
        .await
        .unwrap();
    assert_eq!(quizzes.len(), 2);
    assert!(quizzes.iter().all(|quiz| quiz["author"] == author.as_str()));
    assert!(!quizzes.iter().any(has_answers));

    let stats = client
        .get(format!("{}/api/users/{}/stats", address, author_id))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(stats["total_quizzes_created"], 2);
    assert_eq!(stats["average_score"], 0.0);
}
