// src/routes/schedule_routes.rs

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, put},
};
use chrono::{Days, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    availability::{
        BookedSlot, DEFAULT_RANGE_DAYS, DaySchedule, MAX_RANGE_DAYS, ScheduleWindow,
        compute_day_schedules,
    },
    db,
    error::ApiError,
    extract::{ApiJson, ApiPath, ApiQuery},
    middleware::auth_context::{AuthContext, resolve_doctor_id_by_user_id},
    models::{ApiOk, AppState, Role, ScheduleRow, ScheduleWithDoctor},
    timefmt::{hhmm, hhmm_option},
};

const SCHEDULE_COLUMNS: &str =
    "id, doctor_id, day, start_time, end_time, is_available, created_at, updated_at";

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub doctor_id: Uuid,
    pub day: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(default = "default_true")]
    pub is_available: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateScheduleRequest {
    pub is_available: Option<bool>,
    #[serde(default, with = "hhmm_option")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "hhmm_option")]
    pub end_time: Option<NaiveTime>,
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub start: Option<NaiveDate>,
    pub days: Option<u32>,
}

fn default_true() -> bool {
    true
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_schedules).post(create_schedule))
        .route("/doctor/{doctor_id}", get(list_doctor_schedules))
        .route("/doctor/{doctor_id}/available", get(list_available_schedules))
        .route("/doctor/{doctor_id}/slots", get(doctor_slots))
        .route("/{schedule_id}", put(update_schedule).delete(delete_schedule))
}

/// Resolved `[start, end)` date range for the slot grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotRange {
    pub start: NaiveDate,
    pub days: u32,
    pub end: NaiveDate,
}

/// `days` must be in `1..=MAX_RANGE_DAYS`; defaults apply when omitted. The
/// exclusive end must still be a representable date.
pub(crate) fn resolve_range(q: &SlotsQuery, today: NaiveDate) -> Result<SlotRange, ApiError> {
    let days = q.days.unwrap_or(DEFAULT_RANGE_DAYS);
    if days == 0 || days > MAX_RANGE_DAYS {
        return Err(ApiError::validation(format!(
            "days must be between 1 and {MAX_RANGE_DAYS}"
        )));
    }
    let start = q.start.unwrap_or(today);
    let end = start
        .checked_add_days(Days::new(u64::from(days)))
        .ok_or_else(|| ApiError::validation("start is out of range"))?;
    Ok(SlotRange { start, days, end })
}

/// Admins may manage any doctor's windows; a doctor only their own.
async fn ensure_can_manage(state: &AppState, auth: &AuthContext, doctor_id: Uuid) -> Result<(), ApiError> {
    auth.require_admin_or_doctor()?;
    if auth.is_admin() {
        return Ok(());
    }
    let own = resolve_doctor_id_by_user_id(state, auth.user_id).await?;
    if own != doctor_id {
        return Err(ApiError::forbidden(
            "Access denied. You can only manage your own schedule.",
        ));
    }
    Ok(())
}

async fn ensure_doctor_exists(state: &AppState, doctor_id: Uuid) -> Result<(), ApiError> {
    let exists: bool = sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM doctors WHERE id = $1)"#)
        .bind(doctor_id)
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::db)?;
    if exists {
        Ok(())
    } else {
        Err(ApiError::not_found("Doctor"))
    }
}

async fn fetch_schedule(state: &AppState, schedule_id: Uuid) -> Result<ScheduleRow, ApiError> {
    let sql = format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = $1");
    sqlx::query_as::<_, ScheduleRow>(&sql)
        .bind(schedule_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::db)?
        .ok_or_else(|| ApiError::not_found("Schedule"))
}

async fn doctor_windows(state: &AppState, doctor_id: Uuid, only_available: bool) -> Result<Vec<ScheduleRow>, ApiError> {
    let sql = format!(
        r#"
        SELECT {SCHEDULE_COLUMNS}
        FROM schedules
        WHERE doctor_id = $1
          AND (NOT $2 OR is_available)
        ORDER BY day, start_time
        "#
    );
    sqlx::query_as::<_, ScheduleRow>(&sql)
        .bind(doctor_id)
        .bind(only_available)
        .fetch_all(&state.db)
        .await
        .map_err(ApiError::db)
}

fn map_schedule_write(e: sqlx::Error) -> ApiError {
    if db::is_unique_violation(&e, "schedules_doctor_day_start_key") {
        ApiError::Conflict(
            "SCHEDULE_EXISTS",
            "Schedule already exists for this time slot".into(),
        )
    } else if db::is_foreign_key_violation(&e) {
        ApiError::not_found("Doctor")
    } else {
        ApiError::db(e)
    }
}

fn validate_window(start: NaiveTime, end: NaiveTime) -> Result<(), ApiError> {
    if start >= end {
        return Err(ApiError::validation("start_time must be before end_time"));
    }
    Ok(())
}

pub async fn list_schedules(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<ScheduleWithDoctor>>>, ApiError> {
    auth.require(Role::Admin)?;

    let rows = sqlx::query_as::<_, ScheduleWithDoctor>(
        r#"
        SELECT s.id, s.doctor_id, s.day, s.start_time, s.end_time, s.is_available,
               s.created_at, s.updated_at,
               u.first_name || ' ' || u.last_name AS doctor_name
        FROM schedules s
        JOIN doctors d ON d.id = s.doctor_id
        JOIN users u ON u.id = d.user_id
        ORDER BY s.day, s.start_time
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(rows)))
}

pub async fn list_doctor_schedules(
    State(state): State<AppState>,
    ApiPath(doctor_id): ApiPath<Uuid>,
) -> Result<Json<ApiOk<Vec<ScheduleRow>>>, ApiError> {
    ensure_doctor_exists(&state, doctor_id).await?;
    Ok(Json(ApiOk::new(doctor_windows(&state, doctor_id, false).await?)))
}

pub async fn list_available_schedules(
    State(state): State<AppState>,
    ApiPath(doctor_id): ApiPath<Uuid>,
) -> Result<Json<ApiOk<Vec<ScheduleRow>>>, ApiError> {
    ensure_doctor_exists(&state, doctor_id).await?;
    Ok(Json(ApiOk::new(doctor_windows(&state, doctor_id, true).await?)))
}

/// Server-side slot grid: windows plus live bookings run through the calculator.
pub async fn doctor_slots(
    State(state): State<AppState>,
    ApiPath(doctor_id): ApiPath<Uuid>,
    ApiQuery(q): ApiQuery<SlotsQuery>,
) -> Result<Json<ApiOk<Vec<DaySchedule>>>, ApiError> {
    let range = resolve_range(&q, Utc::now().date_naive())?;
    ensure_doctor_exists(&state, doctor_id).await?;

    let windows: Vec<ScheduleWindow> = doctor_windows(&state, doctor_id, true)
        .await?
        .iter()
        .map(ScheduleWindow::from)
        .collect();

    let booked = sqlx::query_as::<_, BookedSlot>(
        r#"
        SELECT doctor_id, date, start_time, end_time, status
        FROM appointments
        WHERE doctor_id = $1
          AND date >= $2
          AND date < $3
          AND status <> 'cancelled'
        "#,
    )
    .bind(doctor_id)
    .bind(range.start)
    .bind(range.end)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    let schedules = compute_day_schedules(doctor_id, &windows, &booked, range.start, range.days);
    Ok(Json(ApiOk::new(schedules)))
}

pub async fn create_schedule(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<ApiOk<ScheduleRow>>), ApiError> {
    validate_window(req.start_time, req.end_time)?;
    ensure_can_manage(&state, &auth, req.doctor_id).await?;

    let sql = format!(
        r#"
        INSERT INTO schedules (doctor_id, day, start_time, end_time, is_available)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {SCHEDULE_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, ScheduleRow>(&sql)
        .bind(req.doctor_id)
        .bind(req.day)
        .bind(req.start_time)
        .bind(req.end_time)
        .bind(req.is_available)
        .fetch_one(&state.db)
        .await
        .map_err(map_schedule_write)?;

    tracing::info!(schedule_id = %row.id, doctor_id = %row.doctor_id, day = %row.day, "schedule created");
    Ok((StatusCode::CREATED, Json(ApiOk::new(row))))
}

pub async fn update_schedule(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(schedule_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateScheduleRequest>,
) -> Result<Json<ApiOk<ScheduleRow>>, ApiError> {
    if req.is_available.is_none() && req.start_time.is_none() && req.end_time.is_none() {
        return Err(ApiError::validation("at least one field must be provided"));
    }

    let current = fetch_schedule(&state, schedule_id).await?;
    ensure_can_manage(&state, &auth, current.doctor_id).await?;

    let start = req.start_time.unwrap_or(current.start_time);
    let end = req.end_time.unwrap_or(current.end_time);
    validate_window(start, end)?;

    let sql = format!(
        r#"
        UPDATE schedules
        SET
          is_available = COALESCE($2, is_available),
          start_time   = $3,
          end_time     = $4,
          updated_at   = now()
        WHERE id = $1
        RETURNING {SCHEDULE_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, ScheduleRow>(&sql)
        .bind(schedule_id)
        .bind(req.is_available)
        .bind(start)
        .bind(end)
        .fetch_optional(&state.db)
        .await
        .map_err(map_schedule_write)?
        .ok_or_else(|| ApiError::not_found("Schedule"))?;

    Ok(Json(ApiOk::new(row)))
}

pub async fn delete_schedule(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(schedule_id): ApiPath<Uuid>,
) -> Result<Json<ApiOk<()>>, ApiError> {
    let current = fetch_schedule(&state, schedule_id).await?;
    ensure_can_manage(&state, &auth, current.doctor_id).await?;

    sqlx::query(r#"DELETE FROM schedules WHERE id = $1"#)
        .bind(schedule_id)
        .execute(&state.db)
        .await
        .map_err(ApiError::db)?;

    tracing::info!(schedule_id = %schedule_id, by = %auth.user_id, "schedule deleted");
    Ok(Json(ApiOk::new(())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn range_defaults_to_a_week_from_today() {
        let q = SlotsQuery { start: None, days: None };
        let range = resolve_range(&q, day(10)).unwrap();
        assert_eq!((range.start, range.days), (day(10), DEFAULT_RANGE_DAYS));
        assert_eq!(range.end, day(17));
    }

    #[test]
    fn range_bounds_are_enforced() {
        let zero = SlotsQuery { start: Some(day(1)), days: Some(0) };
        assert!(resolve_range(&zero, day(10)).is_err());

        let too_long = SlotsQuery { start: None, days: Some(MAX_RANGE_DAYS + 1) };
        assert!(resolve_range(&too_long, day(10)).is_err());

        let max = SlotsQuery { start: Some(day(1)), days: Some(MAX_RANGE_DAYS) };
        let range = resolve_range(&max, day(10)).unwrap();
        assert_eq!((range.start, range.days), (day(1), MAX_RANGE_DAYS));
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 7, 2).unwrap());
    }

    #[test]
    fn range_past_the_last_date_is_rejected() {
        let q = SlotsQuery { start: Some(NaiveDate::MAX), days: Some(7) };
        let err = resolve_range(&q, day(10)).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_, ref m) if m == "start is out of range"));

        let last_full_week = NaiveDate::MAX - Days::new(7);
        let q = SlotsQuery { start: Some(last_full_week), days: Some(7) };
        assert_eq!(resolve_range(&q, day(10)).unwrap().end, NaiveDate::MAX);
    }

    #[test]
    fn window_must_be_ordered() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let ten = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        assert!(validate_window(nine, ten).is_ok());
        assert!(validate_window(ten, nine).is_err());
        assert!(validate_window(nine, nine).is_err());
    }

    #[test]
    fn update_request_accepts_partial_bodies() {
        let req: UpdateScheduleRequest = serde_json::from_str(r#"{"is_available": false}"#).unwrap();
        assert_eq!(req.is_available, Some(false));
        assert!(req.start_time.is_none() && req.end_time.is_none());

        let req: UpdateScheduleRequest = serde_json::from_str(r#"{"end_time": "17:30:00"}"#).unwrap();
        assert_eq!(req.end_time, NaiveTime::from_hms_opt(17, 30, 0));
    }
}
