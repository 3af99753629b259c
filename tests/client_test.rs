use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hospital_booking::client::{ApiClient, BookingRequest, ClientError, Session};
use hospital_booking::models::{Role, SessionUser};
use hospital_booking::status::AppointmentStatus;

fn patient_session(expires_in: Duration) -> Session {
    Session {
        token: "patient-token".into(),
        user: SessionUser {
            id: Uuid::new_v4(),
            email: "pat@clinic.org".into(),
            role: Role::Patient,
            first_name: "Pat".into(),
            last_name: "Lee".into(),
        },
        expires_at: Utc::now() + expires_in,
    }
}

fn june_10() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn appointment_json(doctor_id: Uuid, patient_id: Uuid, status: &str) -> serde_json::Value {
    json!({
        "id": Uuid::new_v4(),
        "doctor_id": doctor_id,
        "patient_id": patient_id,
        "date": "2024-06-10",
        "start_time": "09:30",
        "end_time": "10:00",
        "status": status,
        "notes": null,
        "created_at": "2024-06-01T08:00:00Z",
        "updated_at": "2024-06-01T08:00:00Z",
    })
}

#[tokio::test]
async fn login_returns_a_session() {
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({ "email": "pat@clinic.org", "password": "hunter22" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "token": "abc",
                "expires_at": "2099-01-01T00:00:00Z",
                "user": {
                    "id": user_id,
                    "email": "pat@clinic.org",
                    "role": "patient",
                    "first_name": "Pat",
                    "last_name": "Lee",
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri());
    let session = client.login("pat@clinic.org", "hunter22").await.unwrap();

    assert_eq!(session.token, "abc");
    assert_eq!(session.user.id, user_id);
    assert_eq!(session.user.role, Role::Patient);
    assert!(!session.is_expired());
}

#[tokio::test]
async fn bad_credentials_map_to_unauthorized() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "error": "Email or password is incorrect",
            "code": "INVALID_CREDENTIALS",
        })))
        .mount(&server)
        .await;

    let err = ApiClient::new(server.uri())
        .login("pat@clinic.org", "wrong")
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Unauthorized(ref m) if m == "Email or password is incorrect"));
}

#[tokio::test]
async fn booking_sends_bearer_token_and_hhmm_times() {
    let server = MockServer::start().await;
    let session = patient_session(Duration::hours(1));
    let doctor_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/api/appointments"))
        .and(header("authorization", "Bearer patient-token"))
        .and(body_json(json!({
            "doctor_id": doctor_id,
            "date": "2024-06-10",
            "start_time": "09:30",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "success": true,
            "data": appointment_json(doctor_id, session.user.id, "pending"),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let booking = BookingRequest {
        doctor_id,
        date: june_10(),
        start_time: t(9, 30),
        end_time: None,
        notes: None,
    };
    let row = ApiClient::new(server.uri())
        .book(&session, &booking)
        .await
        .unwrap();

    assert_eq!(row.status, AppointmentStatus::Pending);
    assert_eq!(row.end_time, t(10, 0));
}

#[tokio::test]
async fn taken_slot_surfaces_the_server_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/appointments"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "success": false,
            "error": "Time slot is not available",
            "code": "SLOT_TAKEN",
        })))
        .mount(&server)
        .await;

    let booking = BookingRequest {
        doctor_id: Uuid::new_v4(),
        date: june_10(),
        start_time: t(9, 30),
        end_time: None,
        notes: None,
    };
    let err = ApiClient::new(server.uri())
        .book(&patient_session(Duration::hours(1)), &booking)
        .await
        .unwrap_err();

    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Time slot is not available");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn expired_session_never_reaches_the_server() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/appointments/patient"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": [] })))
        .expect(0)
        .mount(&server)
        .await;

    let client = ApiClient::new(server.uri());
    let session = patient_session(Duration::seconds(-5));

    let err = client.my_appointments(&session).await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired));

    let err = client.cancel(&session, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired));
}

#[tokio::test]
async fn malformed_token_is_never_sent_unauthenticated() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/appointments/patient"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": [] })))
        .expect(0)
        .mount(&server)
        .await;

    let mut session = patient_session(Duration::hours(1));
    session.token = "bad\r\ntoken".into();

    let err = ApiClient::new(server.uri())
        .my_appointments(&session)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::InvalidHeader(_)));
}

#[tokio::test]
async fn day_schedules_combine_windows_and_bookings() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path(format!("/api/schedules/doctor/{doctor_id}/available")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [{
                "id": Uuid::new_v4(),
                "doctor_id": doctor_id,
                "day": "2024-06-10",
                "start_time": "09:00",
                "end_time": "10:00",
                "is_available": true,
                "created_at": "2024-06-01T08:00:00Z",
                "updated_at": "2024-06-01T08:00:00Z",
            }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/api/appointments/doctor/{doctor_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [{
                "doctor_id": doctor_id,
                "date": "2024-06-10",
                "start_time": "09:30",
                "end_time": "10:00",
                "status": "confirmed",
            }]
        })))
        .mount(&server)
        .await;

    let days = ApiClient::new(server.uri())
        .day_schedules(doctor_id, june_10(), 2)
        .await
        .unwrap();

    assert_eq!(days.len(), 2);
    let slots: Vec<(NaiveTime, bool)> = days[0].slots.iter().map(|s| (s.time, s.available)).collect();
    assert_eq!(slots, vec![(t(9, 0), true), (t(9, 30), false)]);
    assert!(days[1].slots.is_empty());
}

#[tokio::test]
async fn status_update_sends_the_new_state() {
    let server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let mut session = patient_session(Duration::hours(1));
    session.user.role = Role::Doctor;

    Mock::given(method("PUT"))
        .and(path(format!("/api/appointments/{appointment_id}")))
        .and(body_json(json!({ "status": "confirmed", "notes": "room 4" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": appointment_json(Uuid::new_v4(), Uuid::new_v4(), "confirmed"),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let row = ApiClient::new(server.uri())
        .update_status(&session, appointment_id, AppointmentStatus::Confirmed, Some("room 4"))
        .await
        .unwrap();

    assert_eq!(row.status, AppointmentStatus::Confirmed);
}
