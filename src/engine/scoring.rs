// src/engine/scoring.rs

use crate::models::{attempt::Attempt, stats::UserStats};

/// Percentage of correct answers, rounded half up. 0 for an empty quiz.
pub fn score(correct: usize, total: usize) -> i32 {
    if total == 0 {
        return 0;
    }
    let correct = correct.min(total) as u64;
    let total = total as u64;
    ((200 * correct + total) / (2 * total)) as i32
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Folds a user's attempts into their statistics.
pub fn user_stats(quizzes_created: i64, attempts: &[Attempt]) -> UserStats {
    let scores: Vec<i32> = attempts
        .iter()
        .filter(|a| a.is_completed())
        .map(|a| a.score.unwrap_or(0))
        .collect();

    let average_score = if scores.is_empty() {
        0.0
    } else {
        round2(scores.iter().map(|s| *s as f64).sum::<f64>() / scores.len() as f64)
    };

    UserStats {
        total_quizzes_created: quizzes_created,
        total_attempts: attempts.len() as i64,
        completed_attempts: scores.len() as i64,
        average_score,
    }
}

/// Completed, scored attempts ranked by score descending.
///
/// Equal scores keep completion order: earlier completion first, then lower id.
pub fn rank(attempts: &[Attempt], limit: usize) -> Vec<&Attempt> {
    let mut ranked: Vec<&Attempt> = attempts
        .iter()
        .filter(|a| a.completed_at.is_some() && a.score.is_some())
        .collect();
    ranked.sort_by_key(|a| (a.completed_at, a.id));
    // Stable sort keeps the completion order among equal scores.
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked.truncate(limit);
    ranked
}
