//! Creates (or resets) an admin account. Public sign-up only makes patients.
//!
//! Usage: create_admin <email> <password> [first_name] [last_name]

use anyhow::{Context, bail};
use hospital_booking::{
    auth::{MIN_PASSWORD_LEN, hash_password, looks_like_email, normalize_email},
    db,
    models::Role,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter("info").init();

    let mut args = std::env::args().skip(1);
    let (Some(email), Some(password)) = (args.next(), args.next()) else {
        bail!("Usage: create_admin <email> <password> [first_name] [last_name]");
    };
    let first_name = args.next().unwrap_or_else(|| "System".to_string());
    let last_name = args.next().unwrap_or_else(|| "Admin".to_string());

    let email = normalize_email(&email);
    if !looks_like_email(&email) {
        bail!("{email:?} is not a valid email address");
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        bail!("password must be at least {MIN_PASSWORD_LEN} characters long");
    }

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    let pool = db::connect_pg(&database_url, 1).await?;
    db::run_migrations(&pool).await?;

    let password_hash = hash_password(&password).map_err(anyhow::Error::msg)?;

    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO users (first_name, last_name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE
          SET password_hash = EXCLUDED.password_hash,
              role          = EXCLUDED.role,
              updated_at    = now()
        RETURNING id
        "#,
    )
    .bind(&first_name)
    .bind(&last_name)
    .bind(&email)
    .bind(&password_hash)
    .bind(Role::Admin)
    .fetch_one(&pool)
    .await?;

    tracing::info!(user_id = %id, email = %email, "admin account ready");
    println!("{id}");
    Ok(())
}
