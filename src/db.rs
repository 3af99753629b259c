use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

pub async fn connect_pg(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("database migrations applied");
    Ok(())
}

/// Postgres SQLSTATE codes we translate into API errors.
pub const UNIQUE_VIOLATION: &str = "23505";
pub const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Returns the SQLSTATE and constraint name of a database error, if any.
pub fn violation(e: &sqlx::Error) -> Option<(String, Option<String>)> {
    let db = e.as_database_error()?;
    let code = db.code()?.into_owned();
    Some((code, db.constraint().map(str::to_string)))
}

pub fn is_unique_violation(e: &sqlx::Error, constraint: &str) -> bool {
    matches!(
        violation(e),
        Some((code, Some(c))) if code == UNIQUE_VIOLATION && c == constraint
    )
}

pub fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(violation(e), Some((code, _)) if code == FOREIGN_KEY_VIOLATION)
}
