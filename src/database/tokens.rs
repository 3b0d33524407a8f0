// ABOUTME: Access token persistence keyed by the short lookup half with a hash of the secret half
// ABOUTME: Supports lookup, listing per profile, and revocation by token or by client
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

use super::Database;
use crate::models::Token;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

impl Database {
    /// Create `token` table
    pub(super) async fn migrate_tokens(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS token (
                short_token TEXT PRIMARY KEY,
                long_token_hash TEXT NOT NULL,
                me TEXT NOT NULL,
                client_id TEXT NOT NULL,
                scope TEXT NOT NULL,
                created_at DATETIME NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_token_me ON token(me)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Persist a newly minted token
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn create_token(&self, token: &Token) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO token (short_token, long_token_hash, me, client_id, scope, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&token.short_token)
        .bind(&token.long_token_hash)
        .bind(&token.me)
        .bind(&token.client_id)
        .bind(&token.scope)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Find a token by its short half
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn get_token(&self, short_token: &str) -> Result<Option<Token>> {
        let row = sqlx::query("SELECT * FROM token WHERE short_token = ?")
            .bind(short_token)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_token).transpose()
    }

    /// List the tokens issued for a profile, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn list_tokens(&self, me: &str) -> Result<Vec<Token>> {
        let rows = sqlx::query("SELECT * FROM token WHERE me = ? ORDER BY created_at DESC")
            .bind(me)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_token).collect()
    }

    /// Revoke a single token by its short half, returning whether it existed
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn revoke_token(&self, short_token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM token WHERE short_token = ?")
            .bind(short_token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Revoke every token a profile issued to one client, returning how many were removed
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn revoke_client_tokens(&self, me: &str, client_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM token WHERE me = ? AND client_id = ?")
            .bind(me)
            .bind(client_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn row_to_token(row: &SqliteRow) -> Result<Token> {
    Ok(Token {
        short_token: row.try_get("short_token")?,
        long_token_hash: row.try_get("long_token_hash")?,
        me: row.try_get("me")?,
        client_id: row.try_get("client_id")?,
        scope: row.try_get("scope")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}
