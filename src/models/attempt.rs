// src/models/attempt.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'attempts' table: one sitting of a test by one user.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub user_id: i64,
    pub test_id: i64,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    /// 'in_progress' or 'completed'.
    pub status: String,
    pub score: f64,
    pub percentage: f64,
    pub passed: Option<bool>,
}

/// Represents the 'answers' table: one graded answer within an attempt.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: i64,
    pub answer_text: String,
    pub is_correct: bool,
    pub marks_obtained: f64,
    pub time_spent: Option<i64>,
}

/// DTO for starting an attempt. The user comes from the caller's token.
#[derive(Debug, Deserialize, Validate)]
pub struct StartAttemptRequest {
    pub test_id: i64,
}

/// One submitted answer.
#[derive(Debug, Deserialize, Validate)]
pub struct AnswerSubmission {
    pub question_id: i64,
    #[validate(length(max = 5000))]
    pub answer_text: String,
    pub time_spent: Option<i64>,
}

/// DTO for submitting a whole attempt for grading.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAttemptRequest {
    #[validate(nested)]
    pub answers: Vec<AnswerSubmission>,
}
