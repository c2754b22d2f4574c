//! Database module
//!
//! Connection pool setup and schema bootstrap for the SQLite store.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::Config;

/// Open the connection pool described by the configuration.
pub async fn connect(config: &Config) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect_with(options)
        .await
}

/// Simple connectivity check.
pub async fn verify_connection(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Create the schema if it does not exist yet.
///
/// IDs are bound as UUID blobs; timestamps as RFC 3339 text. `version` on
/// companies backs the optimistic compare-and-swap in the ledger service.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id BLOB PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            token_hash TEXT PRIMARY KEY,
            user_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS companies (
            id BLOB PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            balance_minor INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id BLOB PRIMARY KEY,
            company_id BLOB NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
            amount_minor INTEGER NOT NULL CHECK (amount_minor > 0),
            entry_type TEXT NOT NULL CHECK (entry_type IN ('credit', 'debit')),
            description TEXT,
            order_number TEXT,
            created_by BLOB NOT NULL REFERENCES users(id),
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_transactions_company
            ON transactions(company_id, created_at)
        "#,
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
