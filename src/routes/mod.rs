use crate::models::AppState;
use axum::Router;

pub mod admin_routes;
pub mod appointment_routes;
pub mod auth_routes;
pub mod category_routes;
pub mod doctor_routes;
pub mod health_routes;
pub mod schedule_routes;
pub mod user_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/auth", auth_routes::router())
        .nest("/api/users", user_routes::router())
        .nest("/api/categories", category_routes::router())
        .nest("/api/doctors", doctor_routes::router())
        .nest("/api/schedules", schedule_routes::router())
        .nest("/api/appointments", appointment_routes::router())
        .nest("/api", admin_routes::router())
        .merge(health_routes::router())
        .with_state(state)
}
