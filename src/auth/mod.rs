//! Session handling
//!
//! The ledger treats authentication as an external contract: a request either
//! resolves to an [`ActorContext`](crate::domain::ActorContext) or fails with
//! 401. This module owns the token half of that contract; validation lives in
//! the auth middleware. Tokens are random and only their SHA-256 hash is
//! stored.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Session lifetime (7 days, matching the original dashboard cookie).
const SESSION_TTL_DAYS: i64 = 7;

/// Hex digest of a session token, as stored in the sessions table.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Generate a fresh opaque session token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Issue a session for a user and return the raw token.
pub async fn issue_session(pool: &SqlitePool, user_id: Uuid) -> Result<String, sqlx::Error> {
    let token = generate_token();
    let now = Utc::now();
    let expires_at = now + Duration::days(SESSION_TTL_DAYS);

    sqlx::query(
        r#"
        INSERT INTO sessions (token_hash, user_id, expires_at, created_at)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(hash_token(&token))
    .bind(user_id)
    .bind(expires_at)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(token)
}

/// A session row resolved from a token hash.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    pub user_name: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Look up a session by raw token. Returns None for unknown tokens.
pub async fn find_session(pool: &SqlitePool, token: &str) -> Result<Option<Session>, sqlx::Error> {
    let row: Option<(Uuid, String, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT s.user_id, u.name, s.expires_at
        FROM sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.token_hash = ?1
        "#,
    )
    .bind(hash_token(token))
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(user_id, user_name, expires_at)| Session {
        user_id,
        user_name,
        expires_at,
    }))
}
