// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique username. Quizzes reference their author by it.
    pub username: String,

    /// Chat identity, when the user came in through the bot.
    pub telegram_id: Option<String>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for creating a new user.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Username length must be between 1 and 255 characters."
    ))]
    pub username: String,
    #[validate(length(max = 255))]
    pub telegram_id: Option<String>,
}
