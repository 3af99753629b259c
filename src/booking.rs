//! Appointment creation and status changes.
//!
//! Double-booking is prevented at the storage layer: the partial unique index
//! `appointments_active_slot_key` covers (doctor_id, date, start_time) for
//! every non-cancelled row. The existence check in [`create_appointment`] only
//! gives the common case a clean error without a failed insert; the index is
//! what holds under concurrency.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime};
use uuid::Uuid;

use crate::availability::SLOT_MINUTES;
use crate::db;
use crate::error::ApiError;
use crate::models::AppointmentRow;
use crate::status::AppointmentStatus;

pub const ACTIVE_SLOT_CONSTRAINT: &str = "appointments_active_slot_key";

const APPOINTMENT_COLUMNS: &str =
    "id, doctor_id, patient_id, date, start_time, end_time, status, notes, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub notes: Option<String>,
}

impl NewAppointment {
    /// End defaults to one slot after the start, clamped to the last second
    /// of the day for the final slot before midnight.
    pub fn default_end(start_time: NaiveTime) -> NaiveTime {
        let (end, wrapped) = start_time.overflowing_add_signed(Duration::minutes(SLOT_MINUTES));
        if wrapped != 0 {
            return NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(start_time);
        }
        end
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Time slot is not available")]
    SlotTaken,
    #[error("end_time must be after start_time")]
    InvalidRange,
    #[error("Doctor not found")]
    DoctorNotFound,
    #[error("Appointment not found")]
    NotFound,
    #[error("Cannot change appointment status from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    #[error("database error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl From<BookingError> for ApiError {
    fn from(e: BookingError) -> Self {
        match e {
            BookingError::SlotTaken => ApiError::Conflict("SLOT_TAKEN", e.to_string()),
            BookingError::InvalidRange => ApiError::validation(e.to_string()),
            BookingError::DoctorNotFound | BookingError::NotFound => {
                ApiError::NotFound("NOT_FOUND", e.to_string())
            }
            BookingError::InvalidTransition { .. } => ApiError::InvalidTransition(e.to_string()),
            BookingError::Storage(inner) => ApiError::db(inner),
        }
    }
}

/// Persistence needed by the booking gate.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Id of a non-cancelled appointment holding this slot, if any.
    async fn find_active_slot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> Result<Option<Uuid>, BookingError>;

    /// Inserts a `pending` row. Must fail with [`BookingError::SlotTaken`] if
    /// another non-cancelled row already holds the slot.
    async fn insert_pending(&self, new: &NewAppointment) -> Result<AppointmentRow, BookingError>;

    async fn fetch(&self, id: Uuid) -> Result<Option<AppointmentRow>, BookingError>;

    /// Sets `to` only if the row is still in `from`. `None` when no row matched.
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        notes: Option<&str>,
    ) -> Result<Option<AppointmentRow>, BookingError>;

    async fn update_notes(&self, id: Uuid, notes: &str) -> Result<Option<AppointmentRow>, BookingError>;
}

pub async fn create_appointment<S>(store: &S, new: NewAppointment) -> Result<AppointmentRow, BookingError>
where
    S: AppointmentStore + ?Sized,
{
    if new.end_time <= new.start_time {
        return Err(BookingError::InvalidRange);
    }

    if let Some(existing) = store
        .find_active_slot(new.doctor_id, new.date, new.start_time)
        .await?
    {
        tracing::warn!(
            doctor_id = %new.doctor_id,
            date = %new.date,
            start_time = %new.start_time,
            existing = %existing,
            "slot already booked"
        );
        return Err(BookingError::SlotTaken);
    }

    let row = store.insert_pending(&new).await.inspect_err(|e| {
        if matches!(e, BookingError::SlotTaken) {
            tracing::warn!(doctor_id = %new.doctor_id, date = %new.date, "lost booking race");
        }
    })?;

    tracing::info!(
        appointment_id = %row.id,
        doctor_id = %row.doctor_id,
        patient_id = %row.patient_id,
        "appointment booked"
    );
    Ok(row)
}

/// Moves an appointment along the status table. Notes are written with it.
pub async fn update_appointment_status<S>(
    store: &S,
    id: Uuid,
    to: AppointmentStatus,
    notes: Option<&str>,
) -> Result<AppointmentRow, BookingError>
where
    S: AppointmentStore + ?Sized,
{
    let current = store.fetch(id).await?.ok_or(BookingError::NotFound)?;
    if !current.status.can_transition_to(to) {
        return Err(BookingError::InvalidTransition {
            from: current.status,
            to,
        });
    }

    match store.compare_and_set_status(id, current.status, to, notes).await? {
        Some(row) => {
            tracing::info!(appointment_id = %id, from = %current.status, to = %to, "appointment status changed");
            Ok(row)
        }
        // Someone else moved it between our read and write.
        None => match store.fetch(id).await? {
            None => Err(BookingError::NotFound),
            Some(now) => Err(BookingError::InvalidTransition { from: now.status, to }),
        },
    }
}

/// Cancellation keeps the row; only the status changes.
pub async fn cancel_appointment<S>(store: &S, id: Uuid) -> Result<AppointmentRow, BookingError>
where
    S: AppointmentStore + ?Sized,
{
    update_appointment_status(store, id, AppointmentStatus::Cancelled, None).await
}

pub async fn update_appointment_notes<S>(store: &S, id: Uuid, notes: &str) -> Result<AppointmentRow, BookingError>
where
    S: AppointmentStore + ?Sized,
{
    store.update_notes(id, notes).await?.ok_or(BookingError::NotFound)
}

/* ============================================================
   Postgres
   ============================================================ */

#[derive(Clone)]
pub struct PgAppointmentStore {
    db: sqlx::PgPool,
}

impl PgAppointmentStore {
    pub fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }
}

fn map_insert_error(e: sqlx::Error) -> BookingError {
    if db::is_unique_violation(&e, ACTIVE_SLOT_CONSTRAINT) {
        BookingError::SlotTaken
    } else if db::is_foreign_key_violation(&e) {
        BookingError::DoctorNotFound
    } else {
        BookingError::Storage(e)
    }
}

#[async_trait]
impl AppointmentStore for PgAppointmentStore {
    async fn find_active_slot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> Result<Option<Uuid>, BookingError> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id
            FROM appointments
            WHERE doctor_id = $1
              AND date = $2
              AND start_time = $3
              AND status <> 'cancelled'
            LIMIT 1
            "#,
        )
        .bind(doctor_id)
        .bind(date)
        .bind(start_time)
        .fetch_optional(&self.db)
        .await?;
        Ok(id)
    }

    async fn insert_pending(&self, new: &NewAppointment) -> Result<AppointmentRow, BookingError> {
        let sql = format!(
            r#"
            INSERT INTO appointments (doctor_id, patient_id, date, start_time, end_time, status, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        );
        sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(new.doctor_id)
            .bind(new.patient_id)
            .bind(new.date)
            .bind(new.start_time)
            .bind(new.end_time)
            .bind(AppointmentStatus::Pending)
            .bind(new.notes.as_deref())
            .fetch_one(&self.db)
            .await
            .map_err(map_insert_error)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<AppointmentRow>, BookingError> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = $1");
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        notes: Option<&str>,
    ) -> Result<Option<AppointmentRow>, BookingError> {
        let sql = format!(
            r#"
            UPDATE appointments
            SET status = $3,
                notes = COALESCE($4, notes),
                updated_at = now()
            WHERE id = $1
              AND status = $2
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        );
        // Un-cancelling is not in the transition table, so this update can
        // never make a second row occupy a slot.
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .bind(from)
            .bind(to)
            .bind(notes)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn update_notes(&self, id: Uuid, notes: &str) -> Result<Option<AppointmentRow>, BookingError> {
        let sql = format!(
            r#"
            UPDATE appointments
            SET notes = $2,
                updated_at = now()
            WHERE id = $1
            RETURNING {APPOINTMENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .bind(notes)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }
}
