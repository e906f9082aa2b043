// src/handlers/exam_types.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::{
    error::AppError,
    models::exam_type::{CreateExamTypeRequest, ExamType, UpdateExamTypeRequest},
};

#[derive(Debug, Deserialize)]
pub struct ListExamTypesQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "super::default_limit")]
    pub limit: i64,
}

/// Creates an exam type (NECO, WAEC, ...).
/// Admin only.
pub async fn create_exam_type(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateExamTypeRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let result = sqlx::query(
        "INSERT INTO exam_types (name, description, created_at) VALUES (?, ?, ?)",
    )
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(chrono::Utc::now())
    .execute(&pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(format!("Exam type '{}' already exists", payload.name))
        }
        e => {
            tracing::error!("Failed to create exam type: {:?}", e);
            AppError::from(e)
        }
    })?;

    let exam_type = sqlx::query_as::<_, ExamType>("SELECT * FROM exam_types WHERE id = ?")
        .bind(result.last_insert_rowid())
        .fetch_one(&pool)
        .await?;

    Ok((StatusCode::CREATED, Json(exam_type)))
}

/// Lists exam types, paginated.
pub async fn list_exam_types(
    State(pool): State<SqlitePool>,
    Query(params): Query<ListExamTypesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let exam_types =
        sqlx::query_as::<_, ExamType>("SELECT * FROM exam_types ORDER BY id LIMIT ? OFFSET ?")
            .bind(params.limit)
            .bind(params.skip)
            .fetch_all(&pool)
            .await?;

    Ok(Json(exam_types))
}

/// Fetches a single exam type by ID.
pub async fn get_exam_type(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam_type = sqlx::query_as::<_, ExamType>("SELECT * FROM exam_types WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Exam type not found".to_string()))?;

    Ok(Json(exam_type))
}

/// Updates an exam type.
/// Admin only.
pub async fn update_exam_type(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateExamTypeRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if payload.name.is_some() || payload.description.is_some() {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE exam_types SET ");
        let mut separated = builder.separated(", ");

        if let Some(name) = payload.name {
            separated.push("name = ");
            separated.push_bind_unseparated(name);
        }

        if let Some(description) = payload.description {
            separated.push("description = ");
            separated.push_bind_unseparated(description);
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);

        let result = builder.build().execute(&pool).await.map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict("An exam type with that name already exists".to_string())
            }
            e => {
                tracing::error!("Failed to update exam type: {:?}", e);
                AppError::from(e)
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Exam type not found".to_string()));
        }
    }

    let exam_type = sqlx::query_as::<_, ExamType>("SELECT * FROM exam_types WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Exam type not found".to_string()))?;

    Ok(Json(exam_type))
}

/// Deletes an exam type.
/// Admin only. Refused while questions or tests still reference it.
pub async fn delete_exam_type(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM exam_types WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => AppError::Conflict(
                "Exam type is referenced by existing questions or tests".to_string(),
            ),
            e => {
                tracing::error!("Failed to delete exam type: {:?}", e);
                AppError::from(e)
            }
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Exam type not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
