// ABOUTME: Session and code persistence, one session row per profile with last-writer-wins
// ABOUTME: Codes live on the session row and redeeming one deletes the row in the same statement
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

use super::Database;
use crate::models::{Code, ResponseType, Session};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// Session data for database operations
pub struct NewSession<'a> {
    /// Profile URL
    pub me: &'a str,
    /// Requested response type
    pub response_type: ResponseType,
    /// Relying party identifier
    pub client_id: &'a str,
    /// Delivery address for the code
    pub redirect_uri: &'a str,
    /// Requested scopes
    pub scope: &'a str,
    /// Relying party state
    pub state: &'a str,
    /// PKCE challenge
    pub code_challenge: &'a str,
    /// PKCE method
    pub code_challenge_method: &'a str,
}

impl Database {
    /// Create `session` table
    pub(super) async fn migrate_sessions(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS session (
                me TEXT PRIMARY KEY,
                response_type TEXT NOT NULL,
                client_id TEXT NOT NULL,
                redirect_uri TEXT NOT NULL,
                scope TEXT NOT NULL DEFAULT '',
                state TEXT NOT NULL DEFAULT '',
                provider TEXT NOT NULL DEFAULT '',
                profile_uri TEXT NOT NULL DEFAULT '',
                code TEXT,
                created_at DATETIME NOT NULL,
                expires_at DATETIME NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_session_code ON session(code)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Store a session, replacing any previous session for the same profile
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn create_session(&self, session: &NewSession<'_>, ttl: Duration) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r"
            INSERT OR REPLACE INTO session (
                me, response_type, client_id, redirect_uri, scope, state,
                code_challenge, code_challenge_method, provider, profile_uri,
                code, created_at, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, '', '', NULL, ?, ?)
            ",
        )
        .bind(session.me)
        .bind(session.response_type.as_str())
        .bind(session.client_id)
        .bind(session.redirect_uri)
        .bind(session.scope)
        .bind(session.state)
        .bind(session.code_challenge)
        .bind(session.code_challenge_method)
        .bind(now)
        .bind(now + ttl)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the session for a profile
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn get_session(&self, me: &str) -> Result<Option<Session>> {
        let row = sqlx::query("SELECT * FROM session WHERE me = ?")
            .bind(me)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_session).transpose()
    }

    /// Record the provider chosen for a session
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn set_session_provider(&self, me: &str, provider: &str, profile_uri: &str) -> Result<()> {
        sqlx::query("UPDATE session SET provider = ?, profile_uri = ? WHERE me = ?")
            .bind(provider)
            .bind(profile_uri)
            .bind(me)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Attach a freshly minted code; the code window starts now
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or no session exists for `me`
    pub async fn create_code(&self, me: &str, code: &str, ttl: Duration) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE session SET code = ?, created_at = ?, expires_at = ? WHERE me = ?",
        )
        .bind(code)
        .bind(now)
        .bind(now + ttl)
        .bind(me)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("no session to attach a code to"));
        }
        Ok(())
    }

    /// Redeem a code: returns it and deletes the owning session atomically
    ///
    /// A code minted for another response type is left in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn take_code(
        &self,
        code: &str,
        response_type: ResponseType,
    ) -> Result<Option<Code>> {
        let row =
            sqlx::query("DELETE FROM session WHERE code = ? AND response_type = ? RETURNING *")
                .bind(code)
                .bind(response_type.as_str())
                .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .as_ref()
            .map(row_to_session)
            .transpose()?
            .and_then(Session::into_code))
    }
}

fn row_to_session(row: &SqliteRow) -> Result<Session> {
    let response_type: String = row.try_get("response_type")?;
    Ok(Session {
        me: row.try_get("me")?,
        response_type: response_type.parse().map_err(|e: String| anyhow!(e))?,
        client_id: row.try_get("client_id")?,
        redirect_uri: row.try_get("redirect_uri")?,
        scope: row.try_get("scope")?,
        state: row.try_get("state")?,
        code_challenge: row.try_get("code_challenge")?,
        code_challenge_method: row.try_get("code_challenge_method")?,
        provider: row.try_get("provider")?,
        profile_uri: row.try_get("profile_uri")?,
        code: row.try_get("code")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        expires_at: row.try_get::<DateTime<Utc>, _>("expires_at")?,
    })
}
