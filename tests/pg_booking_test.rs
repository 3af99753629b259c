// Booking against a real PostgreSQL. Run with:
//   DATABASE_URL=postgres://... cargo test --test pg_booking_test -- --ignored

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use sqlx::PgPool;
use tokio::task::JoinSet;
use uuid::Uuid;

use hospital_booking::booking::{
    BookingError, NewAppointment, PgAppointmentStore, cancel_appointment, create_appointment,
    update_appointment_status,
};
use hospital_booking::db;
use hospital_booking::models::Role;
use hospital_booking::status::AppointmentStatus;

struct Fixture {
    pool: PgPool,
    doctor_id: Uuid,
    patient_ids: Vec<Uuid>,
}

async fn insert_user(pool: &PgPool, role: Role) -> Uuid {
    sqlx::query_scalar(
        r#"
        INSERT INTO users (first_name, last_name, email, password_hash, role)
        VALUES ('Test', 'User', $1, 'not-a-hash', $2)
        RETURNING id
        "#,
    )
    .bind(format!("{}@booking.test", Uuid::new_v4()))
    .bind(role)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn fixture(patients: usize) -> Fixture {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = db::connect_pg(&url, 20).await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let category_id: Uuid = sqlx::query_scalar(
        r#"INSERT INTO categories (name) VALUES ($1) RETURNING id"#,
    )
    .bind(format!("Cardiology {}", Uuid::new_v4()))
    .fetch_one(&pool)
    .await
    .unwrap();

    let doctor_user = insert_user(&pool, Role::Doctor).await;
    let doctor_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO doctors (user_id, category_id, specialization)
        VALUES ($1, $2, 'Cardiology')
        RETURNING id
        "#,
    )
    .bind(doctor_user)
    .bind(category_id)
    .fetch_one(&pool)
    .await
    .unwrap();

    let mut patient_ids = Vec::with_capacity(patients);
    for _ in 0..patients {
        patient_ids.push(insert_user(&pool, Role::Patient).await);
    }

    Fixture {
        pool,
        doctor_id,
        patient_ids,
    }
}

fn request(doctor_id: Uuid, patient_id: Uuid) -> NewAppointment {
    let start = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
    NewAppointment {
        doctor_id,
        patient_id,
        date: NaiveDate::from_ymd_opt(2030, 6, 10).unwrap(),
        start_time: start,
        end_time: NewAppointment::default_end(start),
        notes: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "needs DATABASE_URL"]
async fn concurrent_bookings_leave_one_pending_row() {
    const N: usize = 12;
    let fx = fixture(N).await;
    let store = Arc::new(PgAppointmentStore::new(fx.pool.clone()));

    let mut set = JoinSet::new();
    for patient_id in fx.patient_ids.iter().copied() {
        let store = Arc::clone(&store);
        let doctor_id = fx.doctor_id;
        set.spawn(async move { create_appointment(store.as_ref(), request(doctor_id, patient_id)).await });
    }

    let mut booked = 0;
    let mut conflicts = 0;
    while let Some(res) = set.join_next().await {
        match res.unwrap() {
            Ok(_) => booked += 1,
            Err(BookingError::SlotTaken) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(booked, 1);
    assert_eq!(conflicts, N - 1);

    let rows: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM appointments WHERE doctor_id = $1 AND status = 'pending'"#,
    )
    .bind(fx.doctor_id)
    .fetch_one(&fx.pool)
    .await
    .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn cancelled_slot_can_be_rebooked() {
    let fx = fixture(2).await;
    let store = PgAppointmentStore::new(fx.pool.clone());

    let first = create_appointment(&store, request(fx.doctor_id, fx.patient_ids[0]))
        .await
        .unwrap();
    update_appointment_status(&store, first.id, AppointmentStatus::Confirmed, None)
        .await
        .unwrap();

    let err = create_appointment(&store, request(fx.doctor_id, fx.patient_ids[1]))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::SlotTaken));

    cancel_appointment(&store, first.id).await.unwrap();
    let second = create_appointment(&store, request(fx.doctor_id, fx.patient_ids[1]))
        .await
        .unwrap();
    assert_eq!(second.status, AppointmentStatus::Pending);
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn unknown_doctor_is_reported() {
    let fx = fixture(1).await;
    let store = PgAppointmentStore::new(fx.pool.clone());

    let err = create_appointment(&store, request(Uuid::new_v4(), fx.patient_ids[0]))
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::DoctorNotFound));
}
