// src/handlers/users.rs

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
    models::user::{UpdateUserRequest, User},
    utils::{hash::hash_password, jwt::Claims},
};

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "super::default_limit")]
    pub limit: i64,
}

/// Lists users, paginated.
pub async fn list_users(
    State(pool): State<SqlitePool>,
    Query(params): Query<ListUsersQuery>,
) -> Result<impl IntoResponse, AppError> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id LIMIT ? OFFSET ?")
        .bind(params.limit)
        .bind(params.skip)
        .fetch_all(&pool)
        .await?;

    Ok(Json(users))
}

/// Fetches a single user by ID.
pub async fn get_user(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Updates a user. Admins may update anyone; everyone else only themselves.
/// Role changes are admin-only.
pub async fn update_user(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let caller_id = claims.user_id()?;
    if caller_id != id && !claims.is_admin() {
        return Err(AppError::Forbidden(
            "Not allowed to modify this user".to_string(),
        ));
    }
    if payload.role.is_some() && !claims.is_admin() {
        return Err(AppError::Forbidden(
            "Only admins can change roles".to_string(),
        ));
    }

    sqlx::query("SELECT id FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let has_changes = payload.username.is_some()
        || payload.email.is_some()
        || payload.full_name.is_some()
        || payload.password.is_some()
        || payload.role.is_some()
        || payload.is_active.is_some();

    if has_changes {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE users SET ");
        let mut separated = builder.separated(", ");

        if let Some(username) = payload.username {
            separated.push("username = ");
            separated.push_bind_unseparated(username);
        }

        if let Some(email) = payload.email {
            separated.push("email = ");
            separated.push_bind_unseparated(email);
        }

        if let Some(full_name) = payload.full_name {
            separated.push("full_name = ");
            separated.push_bind_unseparated(full_name);
        }

        if let Some(password) = payload.password {
            let hashed = hash_password(&password)?;
            separated.push("hashed_password = ");
            separated.push_bind_unseparated(hashed);
        }

        if let Some(role) = payload.role {
            separated.push("role = ");
            separated.push_bind_unseparated(role);
        }

        if let Some(is_active) = payload.is_active {
            separated.push("is_active = ");
            separated.push_bind_unseparated(is_active);
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);

        builder.build().execute(&pool).await.map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict("Username or email already taken".to_string())
            }
            e => {
                tracing::error!("Failed to update user: {:?}", e);
                AppError::from(e)
            }
        })?;
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_one(&pool)
        .await?;

    Ok(Json(user))
}

/// Deletes a user by ID.
/// Admin only. Prevents deleting self.
pub async fn delete_user(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if id == claims.user_id()? {
        return Err(AppError::BadRequest("Cannot delete yourself".to_string()));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete user: {:?}", e);
            AppError::from(e)
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
