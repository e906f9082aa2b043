// src/models/result.rs

use serde::Serialize;
use sqlx::FromRow;

/// Per-question breakdown inside a detailed result.
#[derive(Debug, Serialize, FromRow)]
pub struct AnswerResult {
    pub question_id: i64,
    pub question_text: String,
    pub user_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
    pub marks_obtained: f64,
    pub explanation: Option<String>,
}

/// Detailed result of one completed attempt.
#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub attempt_id: i64,
    pub user_id: i64,
    pub test_id: i64,
    pub test_title: String,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub total_questions: i64,
    pub correct_answers: i64,
    pub score: f64,
    pub percentage: f64,
    pub passed: bool,
    pub answers: Vec<AnswerResult>,
}

/// One row in a user's result history.
#[derive(Debug, Serialize, FromRow)]
pub struct ResultSummary {
    pub attempt_id: i64,
    pub test_id: i64,
    pub test_title: String,
    pub score: f64,
    pub percentage: f64,
    pub passed: bool,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

/// Aggregates over all completed attempts of one test.
#[derive(Debug, Serialize)]
pub struct TestAnalytics {
    pub test_id: i64,
    pub test_title: String,
    pub total_attempts: i64,
    pub passed_attempts: i64,
    pub pass_rate: f64,
    pub average_score: f64,
    pub average_percentage: f64,
    pub highest_score: f64,
    pub lowest_score: f64,
}
