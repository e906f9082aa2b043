// src/handlers/results.rs

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::{FromRow, SqlitePool};

use crate::{
    error::AppError,
    models::{
        attempt::Attempt,
        result::{AnswerResult, ResultResponse, ResultSummary, TestAnalytics},
        test::Test,
    },
    utils::jwt::Claims,
};

#[derive(Debug, Deserialize)]
pub struct ListResultsQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "super::default_limit")]
    pub limit: i64,
}

/// The detailed result of one completed attempt. Owner or admin.
pub async fn get_attempt_result(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = sqlx::query_as::<_, Attempt>("SELECT * FROM attempts WHERE id = ?")
        .bind(attempt_id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;

    if attempt.user_id != claims.user_id()? && !claims.is_admin() {
        return Err(AppError::Forbidden(
            "Result belongs to another user".to_string(),
        ));
    }
    if attempt.status != "completed" {
        return Err(AppError::BadRequest(
            "Attempt has not been completed yet".to_string(),
        ));
    }

    let test = sqlx::query_as::<_, Test>("SELECT * FROM tests WHERE id = ?")
        .bind(attempt.test_id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Test not found".to_string()))?;

    let answers = sqlx::query_as::<_, AnswerResult>(
        r#"
        SELECT
            a.question_id,
            q.question_text,
            a.answer_text AS user_answer,
            q.correct_answer,
            a.is_correct,
            a.marks_obtained,
            q.explanation
        FROM answers a
        JOIN questions q ON q.id = a.question_id
        WHERE a.attempt_id = ?
        ORDER BY a.id
        "#,
    )
    .bind(attempt.id)
    .fetch_all(&pool)
    .await?;

    let correct_answers = answers.iter().filter(|a| a.is_correct).count() as i64;

    Ok(Json(ResultResponse {
        attempt_id: attempt.id,
        user_id: attempt.user_id,
        test_id: test.id,
        test_title: test.title,
        start_time: attempt.start_time,
        end_time: attempt.end_time,
        total_questions: answers.len() as i64,
        correct_answers,
        score: attempt.score,
        percentage: attempt.percentage,
        passed: attempt.passed.unwrap_or(false),
        answers,
    }))
}

/// A user's completed-attempt history, newest first. Owner or admin.
pub async fn get_user_results(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<i64>,
    Query(params): Query<ListResultsQuery>,
) -> Result<impl IntoResponse, AppError> {
    if user_id != claims.user_id()? && !claims.is_admin() {
        return Err(AppError::Forbidden(
            "Results belong to another user".to_string(),
        ));
    }

    let results = sqlx::query_as::<_, ResultSummary>(
        r#"
        SELECT
            a.id AS attempt_id,
            a.test_id,
            t.title AS test_title,
            a.score,
            a.percentage,
            a.passed,
            a.end_time AS completed_at
        FROM attempts a
        JOIN tests t ON t.id = a.test_id
        WHERE a.user_id = ? AND a.status = 'completed'
        ORDER BY a.end_time DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(user_id)
    .bind(params.limit)
    .bind(params.skip)
    .fetch_all(&pool)
    .await?;

    Ok(Json(results))
}

/// SUM/AVG/MAX/MIN come back NULL when no attempt has completed yet.
#[derive(Debug, FromRow)]
struct AnalyticsRow {
    total_attempts: i64,
    passed_attempts: Option<i64>,
    average_score: Option<f64>,
    average_percentage: Option<f64>,
    highest_score: Option<f64>,
    lowest_score: Option<f64>,
}

/// Aggregates over all completed attempts of one test.
/// Admin only.
pub async fn get_test_analytics(
    State(pool): State<SqlitePool>,
    Path(test_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let test = sqlx::query_as::<_, Test>("SELECT * FROM tests WHERE id = ?")
        .bind(test_id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Test not found".to_string()))?;

    let row = sqlx::query_as::<_, AnalyticsRow>(
        r#"
        SELECT
            COUNT(*) AS total_attempts,
            SUM(CASE WHEN passed = 1 THEN 1 ELSE 0 END) AS passed_attempts,
            AVG(score) AS average_score,
            AVG(percentage) AS average_percentage,
            MAX(score) AS highest_score,
            MIN(score) AS lowest_score
        FROM attempts
        WHERE test_id = ? AND status = 'completed'
        "#,
    )
    .bind(test.id)
    .fetch_one(&pool)
    .await?;

    let passed_attempts = row.passed_attempts.unwrap_or(0);
    let pass_rate = if row.total_attempts > 0 {
        passed_attempts as f64 / row.total_attempts as f64 * 100.0
    } else {
        0.0
    };

    Ok(Json(TestAnalytics {
        test_id: test.id,
        test_title: test.title,
        total_attempts: row.total_attempts,
        passed_attempts,
        pass_rate,
        average_score: row.average_score.unwrap_or(0.0),
        average_percentage: row.average_percentage.unwrap_or(0.0),
        highest_score: row.highest_score.unwrap_or(0.0),
        lowest_score: row.lowest_score.unwrap_or(0.0),
    }))
}
