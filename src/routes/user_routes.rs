// src/routes/user_routes.rs

use axum::{
    Json, Router,
    extract::State,
    routing::get,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    db,
    error::ApiError,
    extract::{ApiJson, ApiPath},
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, Role, UserPublic},
    routes::auth_routes::{validate_email, validate_name},
};

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/{user_id}", get(get_user).put(update_user).delete(delete_user))
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<UserPublic>>>, ApiError> {
    auth.require(Role::Admin)?;

    let users: Vec<UserPublic> = sqlx::query_as::<_, UserPublic>(
        r#"
        SELECT id, first_name, last_name, email, role, created_at, updated_at
        FROM users
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(users)))
}

pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(user_id): ApiPath<Uuid>,
) -> Result<Json<ApiOk<UserPublic>>, ApiError> {
    auth.require_admin_or_self(user_id)?;

    let user: UserPublic = sqlx::query_as::<_, UserPublic>(
        r#"
        SELECT id, first_name, last_name, email, role, created_at, updated_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("User"))?;

    Ok(Json(ApiOk::new(user)))
}

pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> Result<Json<ApiOk<UserPublic>>, ApiError> {
    auth.require_admin_or_self(user_id)?;

    if req.first_name.is_none() && req.last_name.is_none() && req.email.is_none() {
        return Err(ApiError::validation("at least one field must be provided"));
    }
    if let Some(v) = &req.first_name {
        validate_name("first_name", v)?;
    }
    if let Some(v) = &req.last_name {
        validate_name("last_name", v)?;
    }
    let email = req.email.as_deref().map(validate_email).transpose()?;

    let user: UserPublic = sqlx::query_as::<_, UserPublic>(
        r#"
        UPDATE users
        SET
          first_name = COALESCE($2, first_name),
          last_name  = COALESCE($3, last_name),
          email      = COALESCE($4, email),
          updated_at = now()
        WHERE id = $1
        RETURNING id, first_name, last_name, email, role, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(req.first_name.as_deref().map(str::trim))
    .bind(req.last_name.as_deref().map(str::trim))
    .bind(email)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| {
        if db::is_unique_violation(&e, "users_email_key") {
            ApiError::Conflict("EMAIL_TAKEN", "Email already in use".into())
        } else {
            ApiError::db(e)
        }
    })?
    .ok_or_else(|| ApiError::not_found("User"))?;

    Ok(Json(ApiOk::new(user)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(user_id): ApiPath<Uuid>,
) -> Result<Json<ApiOk<()>>, ApiError> {
    auth.require(Role::Admin)?;
    if user_id == auth.user_id {
        return Err(ApiError::validation("You cannot delete your own account"));
    }

    let res = sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
        .bind(user_id)
        .execute(&state.db)
        .await
        .map_err(ApiError::db)?;

    if res.rows_affected() == 0 {
        return Err(ApiError::not_found("User"));
    }

    tracing::info!(user_id = %user_id, by = %auth.user_id, "user deleted");
    Ok(Json(ApiOk::new(())))
}
