use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{
        MIN_PASSWORD_LEN, generate_access_token, hash_access_token, hash_password,
        looks_like_email, normalize_email, verify_password,
    },
    db,
    error::ApiError,
    extract::ApiJson,
    middleware::auth_context::AuthContext,
    models::*,
};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct MeData {
    pub user: UserPublic,
    pub session_token_id: uuid::Uuid,
    pub expires_at: chrono::DateTime<Utc>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/me", get(me))
        .route("/logout", post(logout))
}

pub(crate) fn validate_name(field: &str, value: &str) -> Result<(), ApiError> {
    let len = value.trim().chars().count();
    if !(2..=100).contains(&len) {
        return Err(ApiError::validation(format!(
            "{field} must be between 2 and 100 characters"
        )));
    }
    Ok(())
}

pub(crate) fn validate_email(email: &str) -> Result<String, ApiError> {
    let email = normalize_email(email);
    if !looks_like_email(&email) {
        return Err(ApiError::validation("email must be a valid email address"));
    }
    Ok(email)
}

pub(crate) fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    Ok(())
}

/// Issues a new session for `user` and builds the login payload.
async fn open_session(state: &AppState, user: &UserRow) -> Result<LoginData, ApiError> {
    let token = generate_access_token();
    let token_hash = hash_access_token(&token);
    let expires_at = Utc::now() + Duration::hours(state.session_ttl_hours);

    let session: SessionTokenRow = sqlx::query_as::<_, SessionTokenRow>(
        r#"
        INSERT INTO session_token (user_id, session_token_hash, expires_at)
        VALUES ($1, $2, $3)
        RETURNING session_token_id, expires_at
        "#,
    )
    .bind(user.id)
    .bind(&token_hash)
    .bind(expires_at)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    tracing::info!(user_id = %user.id, session = %session.session_token_id, "session opened");

    Ok(LoginData {
        token,
        expires_at: session.expires_at,
        user: SessionUser {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        },
    })
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<ApiOk<LoginData>>, ApiError> {
    let email = normalize_email(&req.email);
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("email and password are required"));
    }

    let user: UserRow = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, first_name, last_name, email, password_hash, role
        FROM users
        WHERE email = $1
        "#,
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(ApiError::invalid_credentials)?;

    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::invalid_credentials());
    }

    Ok(Json(ApiOk::new(open_session(&state, &user).await?)))
}

/// Public sign-up always creates a patient.
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiOk<LoginData>>), ApiError> {
    validate_name("first_name", &req.first_name)?;
    validate_name("last_name", &req.last_name)?;
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;

    let password_hash = hash_password(&req.password).map_err(ApiError::Internal)?;

    let user: UserRow = sqlx::query_as::<_, UserRow>(
        r#"
        INSERT INTO users (first_name, last_name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, first_name, last_name, email, password_hash, role
        "#,
    )
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .bind(&email)
    .bind(&password_hash)
    .bind(Role::Patient)
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        if db::is_unique_violation(&e, "users_email_key") {
            ApiError::Conflict("EMAIL_TAKEN", "Email already in use".into())
        } else {
            ApiError::db(e)
        }
    })?;

    tracing::info!(user_id = %user.id, "patient registered");

    let data = open_session(&state, &user).await?;
    Ok((StatusCode::CREATED, Json(ApiOk::new(data))))
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<MeData>>, ApiError> {
    let user: UserPublic = sqlx::query_as::<_, UserPublic>(
        r#"
        SELECT id, first_name, last_name, email, role, created_at, updated_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(ApiError::session_expired)?;

    let expires_at: chrono::DateTime<Utc> = sqlx::query_scalar(
        r#"
        SELECT expires_at
        FROM session_token
        WHERE session_token_id = $1
          AND revoked_at IS NULL
          AND expires_at > now()
        "#,
    )
    .bind(auth.session_token_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(ApiError::session_expired)?;

    Ok(Json(ApiOk::new(MeData {
        user,
        session_token_id: auth.session_token_id,
        expires_at,
    })))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<()>>, ApiError> {
    let rows = sqlx::query(
        r#"
        UPDATE session_token
        SET revoked_at = now()
        WHERE session_token_id = $1
          AND user_id = $2
          AND revoked_at IS NULL
        "#,
    )
    .bind(auth.session_token_id)
    .bind(auth.user_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if rows.rows_affected() == 0 {
        return Err(ApiError::session_expired());
    }

    Ok(Json(ApiOk::new(())))
}
