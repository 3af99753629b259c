// src/routes/admin_routes.rs
//
// Dashboard counters for each role.

use axum::{Json, Router, extract::State, routing::get};

use crate::{
    error::ApiError,
    middleware::auth_context::{AuthContext, resolve_doctor_id_by_user_id},
    models::{AdminStats, ApiOk, AppState, DoctorStats, PatientStats, Role},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/stats", get(admin_stats))
        .route("/doctor/stats", get(doctor_stats))
        .route("/patient/stats", get(patient_stats))
}

pub async fn admin_stats(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<AdminStats>>, ApiError> {
    auth.require(Role::Admin)?;

    let stats = sqlx::query_as::<_, AdminStats>(
        r#"
        SELECT
          (SELECT COUNT(*) FROM users WHERE role = 'patient') AS total_patients,
          (SELECT COUNT(*) FROM doctors)                      AS total_doctors,
          COUNT(*)                                            AS total_appointments,
          COUNT(*) FILTER (WHERE status = 'pending')          AS pending_appointments,
          COUNT(*) FILTER (WHERE status = 'completed')        AS completed_appointments,
          COUNT(*) FILTER (
            WHERE date = CURRENT_DATE AND status IN ('pending', 'confirmed')
          )                                                   AS today_appointments
        FROM appointments
        "#,
    )
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(stats)))
}

pub async fn doctor_stats(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<DoctorStats>>, ApiError> {
    auth.require(Role::Doctor)?;
    let doctor_id = resolve_doctor_id_by_user_id(&state, auth.user_id).await?;

    let stats = sqlx::query_as::<_, DoctorStats>(
        r#"
        SELECT
          COUNT(*)                                     AS total_appointments,
          COUNT(*) FILTER (WHERE status = 'pending')   AS pending_appointments,
          COUNT(*) FILTER (WHERE status = 'completed') AS completed_appointments,
          COUNT(*) FILTER (
            WHERE date = CURRENT_DATE AND status IN ('pending', 'confirmed')
          )                                            AS today_appointments
        FROM appointments
        WHERE doctor_id = $1
        "#,
    )
    .bind(doctor_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(stats)))
}

pub async fn patient_stats(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<PatientStats>>, ApiError> {
    let stats = sqlx::query_as::<_, PatientStats>(
        r#"
        SELECT
          COUNT(*)                                     AS total_appointments,
          COUNT(*) FILTER (WHERE status = 'pending')   AS pending_appointments,
          COUNT(*) FILTER (WHERE status = 'completed') AS completed_appointments,
          COUNT(*) FILTER (
            WHERE date >= CURRENT_DATE AND status = 'confirmed'
          )                                            AS upcoming_appointments
        FROM appointments
        WHERE patient_id = $1
        "#,
    )
    .bind(auth.user_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(stats)))
}
