// src/handlers/attempts.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, StartAttemptRequest, SubmitAttemptRequest},
        question::Question,
        result::{AnswerResult, ResultResponse},
        test::Test,
    },
    utils::jwt::Claims,
};

/// Answers match when they agree after trimming and lowercasing.
/// Keys ("A") and written answers ("Paris ") both grade predictably.
fn grade_answer(submitted: &str, correct: &str) -> bool {
    submitted.trim().to_lowercase() == correct.trim().to_lowercase()
}

fn percentage_of(score: f64, total_marks: i64) -> f64 {
    if total_marks > 0 {
        score / total_marks as f64 * 100.0
    } else {
        0.0
    }
}

#[derive(Debug, Deserialize)]
pub struct ListAttemptsQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "super::default_limit")]
    pub limit: i64,
}

/// Starts an attempt at a test for the calling user.
pub async fn start_attempt(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<StartAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let test = sqlx::query_as::<_, Test>("SELECT * FROM tests WHERE id = ?")
        .bind(payload.test_id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Test not found".to_string()))?;

    if !test.is_active {
        return Err(AppError::BadRequest("Test is not active".to_string()));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO attempts (user_id, test_id, start_time, status, score, percentage)
        VALUES (?, ?, ?, 'in_progress', 0, 0)
        "#,
    )
    .bind(user_id)
    .bind(test.id)
    .bind(chrono::Utc::now())
    .execute(&pool)
    .await?;

    let attempt = sqlx::query_as::<_, Attempt>("SELECT * FROM attempts WHERE id = ?")
        .bind(result.last_insert_rowid())
        .fetch_one(&pool)
        .await?;

    Ok((StatusCode::CREATED, Json(attempt)))
}

/// Submits an attempt for grading and closes it.
///
/// Each answer is compared case-insensitively against the stored correct
/// answer and is worth one mark. Answers naming unknown questions are
/// skipped. The attempt must belong to the caller and still be in
/// progress.
pub async fn submit_attempt(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let attempt = sqlx::query_as::<_, Attempt>("SELECT * FROM attempts WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;

    if attempt.user_id != claims.user_id()? && !claims.is_admin() {
        return Err(AppError::Forbidden(
            "Attempt belongs to another user".to_string(),
        ));
    }
    if attempt.status != "in_progress" {
        return Err(AppError::BadRequest(
            "Attempt has already been completed".to_string(),
        ));
    }

    let test = sqlx::query_as::<_, Test>("SELECT * FROM tests WHERE id = ?")
        .bind(attempt.test_id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Test not found".to_string()))?;

    // Answer keys for every referenced question, in one query.
    let questions: HashMap<i64, Question> = if payload.answers.is_empty() {
        HashMap::new()
    } else {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM questions WHERE id IN (");
        let mut separated = builder.separated(", ");
        for answer in &payload.answers {
            separated.push_bind(answer.question_id);
        }
        separated.push_unseparated(")");

        builder
            .build_query_as::<Question>()
            .fetch_all(&pool)
            .await?
            .into_iter()
            .map(|q| (q.id, q))
            .collect()
    };

    let end_time = chrono::Utc::now();
    let mut score = 0.0;
    let mut answer_results = Vec::new();

    let mut tx = pool.begin().await?;

    for submission in &payload.answers {
        let Some(question) = questions.get(&submission.question_id) else {
            continue;
        };

        let is_correct = grade_answer(&submission.answer_text, &question.correct_answer);
        let marks_obtained = if is_correct { 1.0 } else { 0.0 };
        score += marks_obtained;

        sqlx::query(
            r#"
            INSERT INTO answers (attempt_id, question_id, answer_text, is_correct, marks_obtained, time_spent)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(attempt.id)
        .bind(question.id)
        .bind(&submission.answer_text)
        .bind(is_correct)
        .bind(marks_obtained)
        .bind(submission.time_spent)
        .execute(&mut *tx)
        .await?;

        answer_results.push(AnswerResult {
            question_id: question.id,
            question_text: question.question_text.clone(),
            user_answer: submission.answer_text.clone(),
            correct_answer: question.correct_answer.clone(),
            is_correct,
            marks_obtained,
            explanation: question.explanation.clone(),
        });
    }

    let percentage = percentage_of(score, test.total_marks);
    let passed = score >= test.passing_marks as f64;

    sqlx::query(
        r#"
        UPDATE attempts
        SET end_time = ?, status = 'completed', score = ?, percentage = ?, passed = ?
        WHERE id = ?
        "#,
    )
    .bind(end_time)
    .bind(score)
    .bind(percentage)
    .bind(passed)
    .bind(attempt.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let correct_answers = answer_results.iter().filter(|a| a.is_correct).count() as i64;
    let total_questions = answer_results.len() as i64;

    Ok(Json(ResultResponse {
        attempt_id: attempt.id,
        user_id: attempt.user_id,
        test_id: test.id,
        test_title: test.title,
        start_time: attempt.start_time,
        end_time: Some(end_time),
        total_questions,
        correct_answers,
        score,
        percentage,
        passed,
        answers: answer_results,
    }))
}

/// Fetches a single attempt. Owner or admin.
pub async fn get_attempt(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = sqlx::query_as::<_, Attempt>("SELECT * FROM attempts WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;

    if attempt.user_id != claims.user_id()? && !claims.is_admin() {
        return Err(AppError::Forbidden(
            "Attempt belongs to another user".to_string(),
        ));
    }

    Ok(Json(attempt))
}

/// Lists a user's attempts, newest first. Owner or admin.
pub async fn list_user_attempts(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<i64>,
    Query(params): Query<ListAttemptsQuery>,
) -> Result<impl IntoResponse, AppError> {
    if user_id != claims.user_id()? && !claims.is_admin() {
        return Err(AppError::Forbidden(
            "Attempts belong to another user".to_string(),
        ));
    }

    let attempts = sqlx::query_as::<_, Attempt>(
        "SELECT * FROM attempts WHERE user_id = ? ORDER BY id DESC LIMIT ? OFFSET ?",
    )
    .bind(user_id)
    .bind(params.limit)
    .bind(params.skip)
    .fetch_all(&pool)
    .await?;

    Ok(Json(attempts))
}
