// src/routes/doctor_routes.rs

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::hash_password,
    db,
    error::ApiError,
    extract::{ApiJson, ApiPath},
    middleware::auth_context::{AuthContext, resolve_doctor_id_by_user_id},
    models::{ApiOk, AppState, DoctorDetails, Role},
    routes::auth_routes::{validate_email, validate_name, validate_password},
};

const DOCTOR_SELECT: &str = r#"
    SELECT d.id, d.user_id, d.category_id, d.specialization, d.experience,
           d.bio, d.avatar,
           u.first_name, u.last_name, u.email,
           c.name AS category_name,
           d.created_at, d.updated_at
    FROM doctors d
    JOIN users u ON u.id = d.user_id
    JOIN categories c ON c.id = d.category_id
"#;

#[derive(Debug, Deserialize)]
pub struct CreateDoctorRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub category_id: Uuid,
    pub specialization: String,
    #[serde(default)]
    pub experience: i32,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDoctorRequest {
    pub category_id: Option<Uuid>,
    pub specialization: Option<String>,
    pub experience: Option<i32>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_doctors).post(create_doctor))
        .route("/category/{category_id}", get(list_doctors_by_category))
        .route(
            "/{doctor_id}",
            get(get_doctor).put(update_doctor).delete(delete_doctor),
        )
}

fn validate_profile(specialization: Option<&str>, experience: Option<i32>) -> Result<(), ApiError> {
    if let Some(s) = specialization {
        let len = s.trim().chars().count();
        if !(2..=100).contains(&len) {
            return Err(ApiError::validation(
                "specialization must be between 2 and 100 characters",
            ));
        }
    }
    if experience.is_some_and(|y| !(0..=80).contains(&y)) {
        return Err(ApiError::validation("experience must be between 0 and 80 years"));
    }
    Ok(())
}

/// Maps a write against `doctors` to the caller-facing error.
fn map_doctor_write(e: sqlx::Error) -> ApiError {
    if db::is_unique_violation(&e, "users_email_key") {
        ApiError::Conflict("EMAIL_TAKEN", "Email already in use".into())
    } else if db::is_foreign_key_violation(&e) {
        ApiError::not_found("Category")
    } else {
        ApiError::db(e)
    }
}

async fn fetch_doctor(state: &AppState, doctor_id: Uuid) -> Result<DoctorDetails, ApiError> {
    let sql = format!("{DOCTOR_SELECT} WHERE d.id = $1");
    sqlx::query_as::<_, DoctorDetails>(&sql)
        .bind(doctor_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?
        .ok_or_else(|| ApiError::not_found("Doctor"))
}

pub async fn list_doctors(
    State(state): State<AppState>,
) -> Result<Json<ApiOk<Vec<DoctorDetails>>>, ApiError> {
    let sql = format!("{DOCTOR_SELECT} ORDER BY u.last_name, u.first_name");
    let rows = sqlx::query_as::<_, DoctorDetails>(&sql)
        .fetch_all(&state.db)
        .await
        .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(rows)))
}

pub async fn list_doctors_by_category(
    State(state): State<AppState>,
    ApiPath(category_id): ApiPath<Uuid>,
) -> Result<Json<ApiOk<Vec<DoctorDetails>>>, ApiError> {
    let sql = format!("{DOCTOR_SELECT} WHERE d.category_id = $1 ORDER BY u.last_name, u.first_name");
    let rows = sqlx::query_as::<_, DoctorDetails>(&sql)
        .bind(category_id)
        .fetch_all(&state.db)
        .await
        .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(rows)))
}

pub async fn get_doctor(
    State(state): State<AppState>,
    ApiPath(doctor_id): ApiPath<Uuid>,
) -> Result<Json<ApiOk<DoctorDetails>>, ApiError> {
    Ok(Json(ApiOk::new(fetch_doctor(&state, doctor_id).await?)))
}

/// Creates the login and the profile together; neither exists if either fails.
pub async fn create_doctor(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateDoctorRequest>,
) -> Result<(StatusCode, Json<ApiOk<DoctorDetails>>), ApiError> {
    auth.require(Role::Admin)?;

    validate_name("first_name", &req.first_name)?;
    validate_name("last_name", &req.last_name)?;
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;
    validate_profile(Some(req.specialization.as_str()), Some(req.experience))?;

    let password_hash = hash_password(&req.password).map_err(ApiError::Internal)?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    let user_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO users (first_name, last_name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .bind(&email)
    .bind(&password_hash)
    .bind(Role::Doctor)
    .fetch_one(&mut *tx)
    .await
    .map_err(map_doctor_write)?;

    let doctor_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO doctors (user_id, category_id, specialization, experience, bio, avatar)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(req.category_id)
    .bind(req.specialization.trim())
    .bind(req.experience)
    .bind(req.bio.as_deref())
    .bind(req.avatar.as_deref())
    .fetch_one(&mut *tx)
    .await
    .map_err(map_doctor_write)?;

    tx.commit().await.map_err(ApiError::db)?;

    tracing::info!(doctor_id = %doctor_id, user_id = %user_id, "doctor created");

    let doctor = fetch_doctor(&state, doctor_id).await?;
    Ok((StatusCode::CREATED, Json(ApiOk::new(doctor))))
}

pub async fn update_doctor(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(doctor_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateDoctorRequest>,
) -> Result<Json<ApiOk<DoctorDetails>>, ApiError> {
    if !auth.is_admin() {
        auth.require(Role::Doctor)?;
        let own = resolve_doctor_id_by_user_id(&state, auth.user_id).await?;
        if own != doctor_id {
            return Err(ApiError::forbidden(
                "Access denied. You can only update your own profile.",
            ));
        }
        // Doctors cannot move themselves to another department.
        if req.category_id.is_some() {
            return Err(ApiError::forbidden("Only an admin can change a doctor's category"));
        }
    }

    validate_profile(req.specialization.as_deref(), req.experience)?;

    let res = sqlx::query(
        r#"
        UPDATE doctors
        SET
          category_id    = COALESCE($2, category_id),
          specialization = COALESCE($3, specialization),
          experience     = COALESCE($4, experience),
          bio            = COALESCE($5, bio),
          avatar         = COALESCE($6, avatar),
          updated_at     = now()
        WHERE id = $1
        "#,
    )
    .bind(doctor_id)
    .bind(req.category_id)
    .bind(req.specialization.as_deref().map(str::trim))
    .bind(req.experience)
    .bind(req.bio.as_deref())
    .bind(req.avatar.as_deref())
    .execute(&state.db)
    .await
    .map_err(map_doctor_write)?;

    if res.rows_affected() == 0 {
        return Err(ApiError::not_found("Doctor"));
    }

    Ok(Json(ApiOk::new(fetch_doctor(&state, doctor_id).await?)))
}

/// Removes the profile and its login account.
pub async fn delete_doctor(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(doctor_id): ApiPath<Uuid>,
) -> Result<Json<ApiOk<()>>, ApiError> {
    auth.require(Role::Admin)?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    let user_id: Uuid = sqlx::query_scalar(r#"DELETE FROM doctors WHERE id = $1 RETURNING user_id"#)
        .bind(doctor_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(ApiError::db)?
        .ok_or_else(|| ApiError::not_found("Doctor"))?;

    sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    tracing::info!(doctor_id = %doctor_id, user_id = %user_id, "doctor deleted");
    Ok(Json(ApiOk::new(())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_bounds() {
        assert!(validate_profile(Some("Cardiology"), Some(12)).is_ok());
        assert!(validate_profile(None, None).is_ok());
        assert!(validate_profile(Some("C"), None).is_err());
        assert!(validate_profile(None, Some(-1)).is_err());
        assert!(validate_profile(None, Some(81)).is_err());
    }
}
