//! Common test utilities

use std::str::FromStr;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Open an isolated in-memory database with the schema applied.
pub async fn setup_test_db() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("invalid connection string")
        .foreign_keys(true);

    // A single long-lived connection keeps the in-memory database alive for
    // the whole test.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("Failed to connect to DB");

    erp_ledger::db::migrate(&pool).await.expect("migration failed");
    pool
}

/// Seed a user and an active session; returns (user_id, session token).
pub async fn seed_session(pool: &SqlitePool) -> (Uuid, String) {
    let user_id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, name, email, created_at) VALUES (?1, ?2, ?3, ?4)")
        .bind(user_id)
        .bind("Test Admin")
        .bind(format!("{user_id}@example.test"))
        .bind(Utc::now())
        .execute(pool)
        .await
        .expect("Failed to seed user");

    let token = erp_ledger::auth::issue_session(pool, user_id)
        .await
        .expect("Failed to issue session");

    (user_id, token)
}
