// src/routes/appointment_routes.rs

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, put},
};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    availability::BookedSlot,
    booking::{
        AppointmentStore, NewAppointment, cancel_appointment, create_appointment, update_appointment_notes,
        update_appointment_status,
    },
    error::ApiError,
    extract::{ApiJson, ApiPath},
    middleware::auth_context::{AuthContext, resolve_doctor_id_by_user_id},
    models::{ApiOk, AppState, AppointmentDetails, AppointmentRow, Role},
    status::AppointmentStatus,
    timefmt::{hhmm, hhmm_option},
};

const DETAILS_SELECT: &str = r#"
    SELECT a.id, a.doctor_id, a.patient_id, a.date, a.start_time, a.end_time,
           a.status, a.notes, a.created_at, a.updated_at,
           du.first_name || ' ' || du.last_name AS doctor_name,
           p.first_name || ' ' || p.last_name AS patient_name
    FROM appointments a
    JOIN doctors d ON d.id = a.doctor_id
    JOIN users du ON du.id = d.user_id
    JOIN users p ON p.id = a.patient_id
"#;

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(default, with = "hhmm_option")]
    pub end_time: Option<NaiveTime>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_appointments).post(book_appointment))
        .route("/doctor", get(my_doctor_appointments))
        .route("/doctor/{doctor_id}", get(doctor_booked_slots))
        .route("/patient", get(my_patient_appointments))
        .route("/{appointment_id}", put(update_appointment).delete(delete_appointment))
}

impl CreateAppointmentRequest {
    fn into_new(self, patient_id: Uuid) -> NewAppointment {
        NewAppointment {
            doctor_id: self.doctor_id,
            patient_id,
            date: self.date,
            start_time: self.start_time,
            end_time: self
                .end_time
                .unwrap_or_else(|| NewAppointment::default_end(self.start_time)),
            notes: self.notes.filter(|n| !n.trim().is_empty()),
        }
    }
}

async fn list_details(state: &AppState, filter: &str, id: Option<Uuid>) -> Result<Vec<AppointmentDetails>, ApiError> {
    let sql = format!("{DETAILS_SELECT} {filter} ORDER BY a.date DESC, a.start_time DESC");
    let mut q = sqlx::query_as::<_, AppointmentDetails>(&sql);
    if let Some(id) = id {
        q = q.bind(id);
    }
    q.fetch_all(&state.db).await.map_err(ApiError::db)
}

/// Who may touch an existing appointment.
enum Actor {
    Admin,
    Doctor(Uuid),
    Patient(Uuid),
}

async fn actor_for(state: &AppState, auth: &AuthContext) -> Result<Actor, ApiError> {
    Ok(match auth.role {
        Role::Admin => Actor::Admin,
        Role::Doctor => Actor::Doctor(resolve_doctor_id_by_user_id(state, auth.user_id).await?),
        Role::Patient => Actor::Patient(auth.user_id),
    })
}

fn owns(actor: &Actor, row: &AppointmentRow) -> bool {
    match actor {
        Actor::Admin => true,
        Actor::Doctor(id) => row.doctor_id == *id,
        Actor::Patient(id) => row.patient_id == *id,
    }
}

pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<AppointmentDetails>>>, ApiError> {
    auth.require(Role::Admin)?;
    Ok(Json(ApiOk::new(list_details(&state, "", None).await?)))
}

pub async fn my_doctor_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<AppointmentDetails>>>, ApiError> {
    auth.require(Role::Doctor)?;
    let doctor_id = resolve_doctor_id_by_user_id(&state, auth.user_id).await?;
    let rows = list_details(&state, "WHERE a.doctor_id = $1", Some(doctor_id)).await?;
    Ok(Json(ApiOk::new(rows)))
}

/// Any signed-in role may call this; it lists rows where the caller is the
/// patient, so doctor and admin tokens get an empty list rather than a 403.
pub async fn my_patient_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<AppointmentDetails>>>, ApiError> {
    let rows = list_details(&state, "WHERE a.patient_id = $1", Some(auth.user_id)).await?;
    Ok(Json(ApiOk::new(rows)))
}

/// Public: only the occupancy fields, never patient data.
pub async fn doctor_booked_slots(
    State(state): State<AppState>,
    ApiPath(doctor_id): ApiPath<Uuid>,
) -> Result<Json<ApiOk<Vec<BookedSlot>>>, ApiError> {
    let rows = sqlx::query_as::<_, BookedSlot>(
        r#"
        SELECT doctor_id, date, start_time, end_time, status
        FROM appointments
        WHERE doctor_id = $1
          AND status <> 'cancelled'
        ORDER BY date, start_time
        "#,
    )
    .bind(doctor_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk::new(rows)))
}

pub async fn book_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<ApiOk<AppointmentRow>>), ApiError> {
    auth.require(Role::Patient)?;

    let row = create_appointment(&state.appointments(), req.into_new(auth.user_id)).await?;
    Ok((StatusCode::CREATED, Json(ApiOk::new(row))))
}

/// Status transition and/or notes. Admins and the appointment's doctor only.
pub async fn update_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(appointment_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateAppointmentRequest>,
) -> Result<Json<ApiOk<AppointmentRow>>, ApiError> {
    auth.require_admin_or_doctor()?;
    if req.status.is_none() && req.notes.is_none() {
        return Err(ApiError::validation("status or notes must be provided"));
    }

    let store = state.appointments();
    let actor = actor_for(&state, &auth).await?;
    let current = store
        .fetch(appointment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Appointment"))?;
    if !owns(&actor, &current) {
        return Err(ApiError::forbidden(
            "Access denied. You can only manage your own appointments.",
        ));
    }

    let row = match req.status {
        Some(to) => update_appointment_status(&store, appointment_id, to, req.notes.as_deref()).await?,
        None => update_appointment_notes(&store, appointment_id, req.notes.as_deref().unwrap_or_default()).await?,
    };
    Ok(Json(ApiOk::new(row)))
}

/// Cancels; the row is kept with status `cancelled`.
pub async fn delete_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(appointment_id): ApiPath<Uuid>,
) -> Result<Json<ApiOk<AppointmentRow>>, ApiError> {
    let store = state.appointments();
    let actor = actor_for(&state, &auth).await?;
    let current = store
        .fetch(appointment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Appointment"))?;
    if !owns(&actor, &current) {
        return Err(ApiError::forbidden(
            "Access denied. You can only cancel your own appointments.",
        ));
    }

    let row = cancel_appointment(&store, appointment_id).await?;
    tracing::info!(appointment_id = %appointment_id, by = %auth.user_id, "appointment cancelled");
    Ok(Json(ApiOk::new(row)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn end_time_defaults_to_one_slot() {
        let req: CreateAppointmentRequest = serde_json::from_value(serde_json::json!({
            "doctor_id": Uuid::nil(),
            "date": "2024-06-10",
            "start_time": "09:30",
        }))
        .unwrap();
        let new = req.into_new(Uuid::nil());
        assert_eq!(new.start_time, t(9, 30));
        assert_eq!(new.end_time, t(10, 0));
        assert!(new.notes.is_none());
    }

    #[test]
    fn late_start_without_end_time_ends_before_midnight() {
        let req: CreateAppointmentRequest = serde_json::from_value(serde_json::json!({
            "doctor_id": Uuid::nil(),
            "date": "2024-06-10",
            "start_time": "23:30",
        }))
        .unwrap();
        let new = req.into_new(Uuid::nil());
        assert_eq!(new.end_time, NaiveTime::from_hms_opt(23, 59, 59).unwrap());
        assert!(new.end_time > new.start_time);
    }

    #[test]
    fn explicit_end_time_and_seconds_are_accepted() {
        let req: CreateAppointmentRequest = serde_json::from_value(serde_json::json!({
            "doctor_id": Uuid::nil(),
            "date": "2024-06-10",
            "start_time": "09:30:00",
            "end_time": "10:15",
            "notes": "first visit",
        }))
        .unwrap();
        let new = req.into_new(Uuid::nil());
        assert_eq!(new.end_time, t(10, 15));
        assert_eq!(new.notes.as_deref(), Some("first visit"));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let res = serde_json::from_str::<UpdateAppointmentRequest>(r#"{"status": "rescheduled"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn ownership_by_role() {
        let doctor = Uuid::new_v4();
        let patient = Uuid::new_v4();
        let now = chrono::Utc::now();
        let row = AppointmentRow {
            id: Uuid::new_v4(),
            doctor_id: doctor,
            patient_id: patient,
            date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            start_time: t(9, 0),
            end_time: t(9, 30),
            status: AppointmentStatus::Pending,
            notes: None,
            created_at: now,
            updated_at: now,
        };

        assert!(owns(&Actor::Admin, &row));
        assert!(owns(&Actor::Doctor(doctor), &row));
        assert!(owns(&Actor::Patient(patient), &row));
        assert!(!owns(&Actor::Doctor(Uuid::new_v4()), &row));
        assert!(!owns(&Actor::Patient(doctor), &row));
    }
}
