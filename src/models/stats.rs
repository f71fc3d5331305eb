// src/models/stats.rs

use serde::{Deserialize, Serialize};

/// Aggregated statistics of one user, recomputed on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub total_quizzes_created: i64,
    pub total_attempts: i64,
    pub completed_attempts: i64,
    pub average_score: f64,
}

/// One row of a quiz leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub username: String,
    pub score: i32,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}
