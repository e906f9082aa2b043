// src/handlers/subjects.rs

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
    models::subject::{CreateSubjectRequest, Subject, UpdateSubjectRequest},
};

#[derive(Debug, Deserialize)]
pub struct ListSubjectsQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "super::default_limit")]
    pub limit: i64,
}

/// Creates a subject (Mathematics, English, ...).
/// Admin only.
pub async fn create_subject(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateSubjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let result =
        sqlx::query("INSERT INTO subjects (name, description, created_at) VALUES (?, ?, ?)")
            .bind(&payload.name)
            .bind(&payload.description)
            .bind(chrono::Utc::now())
            .execute(&pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    AppError::Conflict(format!("Subject '{}' already exists", payload.name))
                }
                e => {
                    tracing::error!("Failed to create subject: {:?}", e);
                    AppError::from(e)
                }
            })?;

    let subject = sqlx::query_as::<_, Subject>("SELECT * FROM subjects WHERE id = ?")
        .bind(result.last_insert_rowid())
        .fetch_one(&pool)
        .await?;

    Ok((StatusCode::CREATED, Json(subject)))
}

/// Lists subjects, paginated.
pub async fn list_subjects(
    State(pool): State<SqlitePool>,
    Query(params): Query<ListSubjectsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let subjects =
        sqlx::query_as::<_, Subject>("SELECT * FROM subjects ORDER BY id LIMIT ? OFFSET ?")
            .bind(params.limit)
            .bind(params.skip)
            .fetch_all(&pool)
            .await?;

    Ok(Json(subjects))
}

/// Fetches a single subject by ID.
pub async fn get_subject(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let subject = sqlx::query_as::<_, Subject>("SELECT * FROM subjects WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Subject not found".to_string()))?;

    Ok(Json(subject))
}

/// Updates a subject.
/// Admin only.
pub async fn update_subject(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateSubjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if payload.name.is_some() || payload.description.is_some() {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE subjects SET ");
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
                AppError::Conflict("A subject with that name already exists".to_string())
            }
            e => {
                tracing::error!("Failed to update subject: {:?}", e);
                AppError::from(e)
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Subject not found".to_string()));
        }
    }

    let subject = sqlx::query_as::<_, Subject>("SELECT * FROM subjects WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Subject not found".to_string()))?;

    Ok(Json(subject))
}

/// Deletes a subject.
/// Admin only. Refused while questions or tests still reference it.
pub async fn delete_subject(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM subjects WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => AppError::Conflict(
                "Subject is referenced by existing questions or tests".to_string(),
            ),
            e => {
                tracing::error!("Failed to delete subject: {:?}", e);
                AppError::from(e)
            }
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Subject not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
