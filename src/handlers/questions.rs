// src/handlers/questions.rs

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    images::{ImageManager, ImageSlot},
    models::question::{
        BulkCreateQuestionsRequest, CreateQuestionRequest, Question, UpdateQuestionRequest,
    },
    state::AppState,
    utils::html::clean_html,
};

#[derive(Debug, Deserialize)]
pub struct ListQuestionsQuery {
    pub exam_type_id: Option<i64>,
    pub subject_id: Option<i64>,
    pub question_type: Option<String>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "super::default_limit")]
    pub limit: i64,
}

/// Authored text goes through the sanitizer before it reaches the
/// database; question banks are routinely imported from untrusted dumps.
fn sanitize(mut payload: CreateQuestionRequest) -> CreateQuestionRequest {
    payload.question_text = clean_html(&payload.question_text);
    payload.explanation = payload.explanation.map(|e| clean_html(&e));
    payload.options = payload.options.map(|opts| {
        opts.into_iter()
            .map(|(key, text)| (key, clean_html(&text)))
            .collect()
    });
    payload
}

async fn ensure_references(
    conn: &mut sqlx::SqliteConnection,
    exam_type_id: i64,
    subject_id: i64,
) -> Result<(), AppError> {
    sqlx::query("SELECT id FROM exam_types WHERE id = ?")
        .bind(exam_type_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Exam type not found".to_string()))?;

    sqlx::query("SELECT id FROM subjects WHERE id = ?")
        .bind(subject_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Subject not found".to_string()))?;

    Ok(())
}

async fn insert_question(
    conn: &mut sqlx::SqliteConnection,
    payload: &CreateQuestionRequest,
) -> Result<i64, AppError> {
    let result = sqlx::query(
        r#"
        INSERT INTO questions
        (exam_type_id, subject_id, question_text, question_type, options, correct_answer, explanation, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.exam_type_id)
    .bind(payload.subject_id)
    .bind(&payload.question_text)
    .bind(&payload.question_type)
    .bind(payload.options.as_ref().map(SqlJson))
    .bind(&payload.correct_answer)
    .bind(&payload.explanation)
    .bind(chrono::Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Creates a new question.
/// Admin only.
pub async fn create_question(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    let payload = sanitize(payload);

    let mut conn = pool.acquire().await?;
    ensure_references(&mut conn, payload.exam_type_id, payload.subject_id).await?;
    let id = insert_question(&mut conn, &payload).await?;
    drop(conn);

    let question = sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE id = ?")
        .bind(id)
        .fetch_one(&pool)
        .await?;

    Ok((StatusCode::CREATED, Json(question)))
}

/// Creates a batch of questions in one transaction. All-or-nothing.
/// Admin only.
pub async fn bulk_create_questions(
    State(pool): State<SqlitePool>,
    Json(payload): Json<BulkCreateQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let mut tx = pool.begin().await?;
    let mut created = Vec::with_capacity(payload.questions.len());

    for question in payload.questions {
        let question = sanitize(question);
        ensure_references(&mut tx, question.exam_type_id, question.subject_id).await?;
        let id = insert_question(&mut tx, &question).await?;
        let row = sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        created.push(row);
    }

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// Lists questions with optional filters, paginated.
pub async fn list_questions(
    State(pool): State<SqlitePool>,
    Query(params): Query<ListQuestionsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM questions WHERE 1 = 1");

    if let Some(exam_type_id) = params.exam_type_id {
        builder.push(" AND exam_type_id = ");
        builder.push_bind(exam_type_id);
    }

    if let Some(subject_id) = params.subject_id {
        builder.push(" AND subject_id = ");
        builder.push_bind(subject_id);
    }

    if let Some(question_type) = params.question_type {
        builder.push(" AND question_type = ");
        builder.push_bind(question_type);
    }

    builder.push(" ORDER BY id LIMIT ");
    builder.push_bind(params.limit);
    builder.push(" OFFSET ");
    builder.push_bind(params.skip);

    let questions = builder
        .build_query_as::<Question>()
        .fetch_all(&pool)
        .await?;

    Ok(Json(questions))
}

/// Fetches a single question by ID.
pub async fn get_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let question = sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    Ok(Json(question))
}

/// Updates a question's content fields. The image slots are managed
/// exclusively by the upload/delete image endpoints.
/// Admin only.
pub async fn update_question(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let has_changes = payload.question_text.is_some()
        || payload.question_type.is_some()
        || payload.options.is_some()
        || payload.correct_answer.is_some()
        || payload.explanation.is_some();

    if has_changes {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE questions SET ");
        let mut separated = builder.separated(", ");

        if let Some(question_text) = payload.question_text {
            separated.push("question_text = ");
            separated.push_bind_unseparated(clean_html(&question_text));
        }

        if let Some(question_type) = payload.question_type {
            separated.push("question_type = ");
            separated.push_bind_unseparated(question_type);
        }

        if let Some(options) = payload.options {
            let cleaned: std::collections::HashMap<String, String> = options
                .into_iter()
                .map(|(key, text)| (key, clean_html(&text)))
                .collect();
            separated.push("options = ");
            separated.push_bind_unseparated(SqlJson(cleaned));
        }

        if let Some(correct_answer) = payload.correct_answer {
            separated.push("correct_answer = ");
            separated.push_bind_unseparated(correct_answer);
        }

        if let Some(explanation) = payload.explanation {
            separated.push("explanation = ");
            separated.push_bind_unseparated(clean_html(&explanation));
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);

        let result = builder.build().execute(&pool).await.map_err(|e| {
            tracing::error!("Failed to update question: {:?}", e);
            AppError::from(e)
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Question not found".to_string()));
        }
    }

    let question = sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    Ok(Json(question))
}

/// Deletes a question and releases the files behind both image slots.
/// The row goes first; file removal is best-effort and never fails the
/// delete.
/// Admin only.
pub async fn delete_question(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let question = sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete question: {:?}", e);
            AppError::from(e)
        })?;

    state.images.discard_attachments(&question).await;

    Ok(StatusCode::NO_CONTENT)
}

/// Pulls the `file` field out of a multipart form and stores it into the
/// given slot.
async fn store_image(
    images: &ImageManager,
    question_id: i64,
    slot: ImageSlot,
    mut multipart: Multipart,
) -> Result<Question, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("Uploaded file has no filename".to_string()))?;
        let data = field.bytes().await?;

        return images.attach(question_id, slot, &filename, &data).await;
    }

    Err(AppError::BadRequest(
        "Multipart form must contain a 'file' field".to_string(),
    ))
}

/// Uploads (or replaces) the question image.
/// Admin only.
pub async fn upload_question_image(
    State(images): State<ImageManager>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let question = store_image(&images, id, ImageSlot::Question, multipart).await?;
    Ok(Json(question))
}

/// Uploads (or replaces) the explanation image.
/// Admin only.
pub async fn upload_explanation_image(
    State(images): State<ImageManager>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let question = store_image(&images, id, ImageSlot::Explanation, multipart).await?;
    Ok(Json(question))
}

/// Clears the question image slot and deletes the stored file.
/// Admin only.
pub async fn delete_question_image(
    State(images): State<ImageManager>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    images.detach(id, ImageSlot::Question).await?;
    Ok(Json(json!({"message": "Question image deleted successfully"})))
}

/// Clears the explanation image slot and deletes the stored file.
/// Admin only.
pub async fn delete_explanation_image(
    State(images): State<ImageManager>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    images.detach(id, ImageSlot::Explanation).await?;
    Ok(Json(
        json!({"message": "Explanation image deleted successfully"}),
    ))
}
