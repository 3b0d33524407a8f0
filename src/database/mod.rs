// ABOUTME: SQLite trust store holding sessions, codes, tokens, clients, profiles and logins
// ABOUTME: Creates tables, applies versioned additive migrations, and sweeps data for a profile
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

//! # Trust Store
//!
//! Each table lives in its own file as an `impl Database` block. The schema
//! version is kept in `PRAGMA user_version`; [`MIGRATIONS`] lists the additive
//! steps applied on top of the base tables, in order.

mod clients;
mod logins;
mod profiles;
mod sessions;
mod tokens;

pub use sessions::NewSession;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite, SqlitePool};
use tracing::info;

/// Additive schema steps; entry `n` moves the database from version `n` to `n + 1`
const MIGRATIONS: &[&[&str]] = &[&[
    "ALTER TABLE session ADD COLUMN code_challenge TEXT NOT NULL DEFAULT ''",
    "ALTER TABLE session ADD COLUMN code_challenge_method TEXT NOT NULL DEFAULT ''",
]];

/// Database manager for every persisted entity
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection and bring the schema up to date
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or a migration fails
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = if database_url.contains(":memory:") {
            // Every in-memory connection is a separate database
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect(database_url)
                .await?
        } else if database_url.starts_with("sqlite:") && !database_url.contains('?') {
            SqlitePool::connect(&format!("{database_url}?mode=rwc")).await?
        } else {
            SqlitePool::connect(database_url).await?
        };

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// Get a reference to the database pool for advanced operations
    #[must_use]
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run database migrations
    ///
    /// # Errors
    ///
    /// Returns an error if table creation or a versioned step fails
    pub async fn migrate(&self) -> Result<()> {
        self.migrate_profiles().await?;
        self.migrate_clients().await?;
        self.migrate_sessions().await?;
        self.migrate_tokens().await?;
        self.migrate_logins().await?;

        let applied = self.schema_version().await?;
        for (version, statements) in MIGRATIONS.iter().enumerate().skip(applied) {
            let mut tx = self.pool.begin().await?;
            for statement in *statements {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            // PRAGMA does not accept bound parameters
            sqlx::query(&format!("PRAGMA user_version = {}", version + 1))
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            info!(version = version + 1, "applied schema migration");
        }

        Ok(())
    }

    /// Number of versioned migrations applied to this database
    ///
    /// # Errors
    ///
    /// Returns an error if the pragma cannot be read
    pub async fn schema_version(&self) -> Result<usize> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(version).unwrap_or(0))
    }

    /// Latest schema version this build knows about
    #[must_use]
    pub const fn latest_schema_version() -> usize {
        MIGRATIONS.len()
    }

    /// Delete everything stored for a profile in one transaction
    ///
    /// # Errors
    ///
    /// Returns an error if any delete fails; nothing is removed in that case
    pub async fn forget(&self, me: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in [
            "DELETE FROM method WHERE me = ?",
            "DELETE FROM profile WHERE me = ?",
            "DELETE FROM session WHERE me = ?",
            "DELETE FROM token WHERE me = ?",
            "DELETE FROM login WHERE me = ?",
        ] {
            sqlx::query(statement).bind(me).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        info!(me = %me, "forgot stored data for profile");
        Ok(())
    }
}
