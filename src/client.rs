//! Typed HTTP client for the booking API.
//!
//! Authenticated calls take an explicit [`Session`]. An expired session is
//! rejected locally with [`ClientError::SessionExpired`] before any request
//! is sent.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use reqwest::{
    Client, Method, StatusCode,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, InvalidHeaderValue},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, error};
use uuid::Uuid;

use crate::availability::{BookedSlot, DaySchedule, ScheduleWindow, compute_day_schedules};
use crate::models::{
    AdminStats, ApiOk, AppointmentDetails, AppointmentRow, CategoryRow, DoctorDetails,
    DoctorStats, LoginData, PatientStats, Role, ScheduleRow, SessionUser,
};
use crate::status::AppointmentStatus;
use crate::timefmt::{hhmm, hhmm_option};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Session expired")]
    SessionExpired,
    #[error("{0}")]
    Unauthorized(String),
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// A logged-in identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: SessionUser,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl From<LoginData> for Session {
    fn from(d: LoginData) -> Self {
        Self {
            token: d.token,
            user: d.user,
            expires_at: d.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingRequest {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm_option", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusChange<'a> {
    status: AppointmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:3003`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(session: Option<&Session>) -> ClientResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(s) = session {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", s.token))?;
            headers.insert(AUTHORIZATION, bearer);
        }
        Ok(headers)
    }

    async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        session: Option<&Session>,
        body: Option<&B>,
    ) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        if session.is_some_and(Session::is_expired) {
            return Err(ClientError::SessionExpired);
        }

        let url = format!("{}/api{}", self.base_url, path);
        debug!(%method, %url, "api request");

        let mut req = self
            .http
            .request(method, &url)
            .headers(Self::headers(session)?);
        if let Some(b) = body {
            req = req.json(b);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.error)
                .unwrap_or(text);
            error!(status = status.as_u16(), %message, "api error");
            return Err(match status {
                StatusCode::UNAUTHORIZED => ClientError::Unauthorized(message),
                _ => ClientError::Api {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let envelope = response.json::<ApiOk<T>>().await?;
        Ok(envelope.data)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, session: Option<&Session>) -> ClientResult<T> {
        self.request::<T, ()>(Method::GET, path, session, None).await
    }

    /* -------- auth -------- */

    pub async fn login(&self, email: &str, password: &str) -> ClientResult<Session> {
        let data: LoginData = self
            .request(Method::POST, "/auth/login", None, Some(&Credentials { email, password }))
            .await?;
        Ok(data.into())
    }

    pub async fn register(&self, registration: &Registration) -> ClientResult<Session> {
        let data: LoginData = self
            .request(Method::POST, "/auth/register", None, Some(registration))
            .await?;
        Ok(data.into())
    }

    /* -------- catalogue -------- */

    pub async fn doctors(&self) -> ClientResult<Vec<DoctorDetails>> {
        self.get("/doctors", None).await
    }

    pub async fn categories(&self) -> ClientResult<Vec<CategoryRow>> {
        self.get("/categories", None).await
    }

    pub async fn available_windows(&self, doctor_id: Uuid) -> ClientResult<Vec<ScheduleRow>> {
        self.get(&format!("/schedules/doctor/{doctor_id}/available"), None)
            .await
    }

    pub async fn booked_slots(&self, doctor_id: Uuid) -> ClientResult<Vec<BookedSlot>> {
        self.get(&format!("/appointments/doctor/{doctor_id}"), None)
            .await
    }

    /// Slot grid computed locally from the two public endpoints.
    pub async fn day_schedules(
        &self,
        doctor_id: Uuid,
        range_start: NaiveDate,
        num_days: u32,
    ) -> ClientResult<Vec<DaySchedule>> {
        let (windows, booked) = tokio::try_join!(
            self.available_windows(doctor_id),
            self.booked_slots(doctor_id)
        )?;
        let windows: Vec<ScheduleWindow> = windows.iter().map(ScheduleWindow::from).collect();
        Ok(compute_day_schedules(doctor_id, &windows, &booked, range_start, num_days))
    }

    /* -------- appointments -------- */

    pub async fn book(&self, session: &Session, booking: &BookingRequest) -> ClientResult<AppointmentRow> {
        self.request(Method::POST, "/appointments", Some(session), Some(booking))
            .await
    }

    pub async fn update_status(
        &self,
        session: &Session,
        appointment_id: Uuid,
        status: AppointmentStatus,
        notes: Option<&str>,
    ) -> ClientResult<AppointmentRow> {
        self.request(
            Method::PUT,
            &format!("/appointments/{appointment_id}"),
            Some(session),
            Some(&StatusChange { status, notes }),
        )
        .await
    }

    pub async fn cancel(&self, session: &Session, appointment_id: Uuid) -> ClientResult<AppointmentRow> {
        self.request::<_, ()>(
            Method::DELETE,
            &format!("/appointments/{appointment_id}"),
            Some(session),
            None,
        )
        .await
    }

    /// The caller's own appointments: as doctor for doctors, as patient otherwise.
    pub async fn my_appointments(&self, session: &Session) -> ClientResult<Vec<AppointmentDetails>> {
        let path = match session.user.role {
            Role::Doctor => "/appointments/doctor",
            _ => "/appointments/patient",
        };
        self.get(path, Some(session)).await
    }

    /* -------- dashboards -------- */

    pub async fn patient_stats(&self, session: &Session) -> ClientResult<PatientStats> {
        self.get("/patient/stats", Some(session)).await
    }

    pub async fn doctor_stats(&self, session: &Session) -> ClientResult<DoctorStats> {
        self.get("/doctor/stats", Some(session)).await
    }

    pub async fn admin_stats(&self, session: &Session) -> ClientResult<AdminStats> {
        self.get("/admin/stats", Some(session)).await
    }
}
