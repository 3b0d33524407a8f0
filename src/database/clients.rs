// ABOUTME: Client trust cache, one row per (client_id, redirect_uri) pair
// ABOUTME: Only successful resolutions are written; callers check expiry on read
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

use super::Database;
use crate::models::Client;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::Row;

impl Database {
    /// Create `client` table
    pub(super) async fn migrate_clients(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS client (
                id TEXT NOT NULL,
                redirect_uri TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                updated_at DATETIME NOT NULL,
                expires_at DATETIME NOT NULL,
                PRIMARY KEY (id, redirect_uri)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Cache a trusted client
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn upsert_client(&self, client: &Client) -> Result<()> {
        sqlx::query(
            r"
            INSERT OR REPLACE INTO client (id, redirect_uri, name, updated_at, expires_at)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(&client.id)
        .bind(&client.redirect_uri)
        .bind(&client.name)
        .bind(client.updated_at)
        .bind(client.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the cached trust decision for a pair
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn get_client(&self, id: &str, redirect_uri: &str) -> Result<Option<Client>> {
        let row = sqlx::query("SELECT * FROM client WHERE id = ? AND redirect_uri = ?")
            .bind(id)
            .bind(redirect_uri)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Client {
            id: row.try_get("id")?,
            redirect_uri: row.try_get("redirect_uri")?,
            name: row.try_get("name")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            expires_at: row.try_get::<DateTime<Utc>, _>("expires_at")?,
        }))
    }
}
