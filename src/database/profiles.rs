// ABOUTME: Cached rel=me discovery results: a profile row plus its usable methods
// ABOUTME: Caching replaces the previous result for the profile in a single transaction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

use super::Database;
use crate::models::{Method, Profile};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::Row;

impl Database {
    /// Create `profile` and `method` tables
    pub(super) async fn migrate_profiles(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS profile (
                me TEXT PRIMARY KEY,
                updated_at DATETIME NOT NULL,
                expires_at DATETIME NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS method (
                me TEXT NOT NULL,
                provider TEXT NOT NULL,
                profile TEXT NOT NULL,
                PRIMARY KEY (me, provider)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replace the cached discovery result for a profile
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails; the previous result is kept in that case
    pub async fn cache_profile(&self, profile: &Profile) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM method WHERE me = ?")
            .bind(&profile.me)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM profile WHERE me = ?")
            .bind(&profile.me)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO profile (me, updated_at, expires_at) VALUES (?, ?, ?)")
            .bind(&profile.me)
            .bind(profile.updated_at)
            .bind(profile.expires_at)
            .execute(&mut *tx)
            .await?;

        for method in &profile.methods {
            sqlx::query("INSERT OR REPLACE INTO method (me, provider, profile) VALUES (?, ?, ?)")
                .bind(&profile.me)
                .bind(&method.provider)
                .bind(&method.profile)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Get the cached discovery result for a profile, methods ordered by provider
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn get_profile(&self, me: &str) -> Result<Option<Profile>> {
        let Some(row) = sqlx::query("SELECT * FROM profile WHERE me = ?")
            .bind(me)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let methods = sqlx::query("SELECT provider, profile FROM method WHERE me = ? ORDER BY provider")
            .bind(me)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|m| -> Result<Method> {
                Ok(Method {
                    provider: m.try_get("provider")?,
                    profile: m.try_get("profile")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Profile {
            me: row.try_get("me")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            expires_at: row.try_get::<DateTime<Utc>, _>("expires_at")?,
            methods,
        }))
    }
}
