// ABOUTME: Login markers remembering which profile recently authenticated from a browser
// ABOUTME: Keyed by the opaque id carried in the login cookie, at most one per profile
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

use super::Database;
use crate::models::Login;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::Row;

impl Database {
    /// Create `login` table
    pub(super) async fn migrate_logins(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS login (
                id TEXT PRIMARY KEY,
                me TEXT NOT NULL UNIQUE,
                created_at DATETIME NOT NULL,
                expires_at DATETIME NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a login, replacing any earlier marker for the same profile
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn save_login(&self, id: &str, me: &str, ttl: Duration) -> Result<Login> {
        let now = Utc::now();
        let login = Login {
            id: id.to_owned(),
            me: me.to_owned(),
            created_at: now,
            expires_at: now + ttl,
        };

        sqlx::query("INSERT OR REPLACE INTO login (id, me, created_at, expires_at) VALUES (?, ?, ?, ?)")
            .bind(&login.id)
            .bind(&login.me)
            .bind(login.created_at)
            .bind(login.expires_at)
            .execute(&self.pool)
            .await?;

        Ok(login)
    }

    /// Find a login marker by cookie id
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn get_login(&self, id: &str) -> Result<Option<Login>> {
        let Some(row) = sqlx::query("SELECT * FROM login WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        Ok(Some(Login {
            id: row.try_get("id")?,
            me: row.try_get("me")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            expires_at: row.try_get::<DateTime<Utc>, _>("expires_at")?,
        }))
    }
}
