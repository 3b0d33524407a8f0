// ABOUTME: Ephemeral correlation store linking a strategy's redirect leg to its callback leg
// ABOUTME: Entries expire after a fixed window and can be claimed exactly once
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

use crate::constants::secrets::STATE_LEN;
use crate::errors::AppResult;
use crate::utils::random::random_string;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

struct Entry<V> {
    value: V,
    created_at: DateTime<Utc>,
}

/// TTL-keyed single-claim map owned by one strategy
pub struct StrategyStore<V> {
    entries: DashMap<String, Entry<V>>,
    ttl: Duration,
}

impl<V> StrategyStore<V> {
    /// Create an empty store whose entries live for `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Store `value` under a fresh random key and return the key
    ///
    /// # Errors
    ///
    /// Returns an error if the system RNG fails
    pub fn insert(&self, value: V) -> AppResult<String> {
        let key = random_string(STATE_LEN)?;
        self.set(key.clone(), value);
        Ok(key)
    }

    /// Store `value` under a caller-chosen key, replacing any earlier entry
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.sweep();
        self.entries.insert(
            key.into(),
            Entry {
                value,
                created_at: Utc::now(),
            },
        );
    }

    /// Remove and return the value for `key`
    ///
    /// Removal is atomic, so concurrent callbacks presenting the same key see
    /// at most one success. Expired entries are removed and reported as absent.
    pub fn claim(&self, key: &str) -> Option<V> {
        let (_, entry) = self.entries.remove(key)?;
        if Utc::now() - entry.created_at > self.ttl {
            return None;
        }
        Some(entry.value)
    }

    /// Number of live entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Abandoned flows never call claim; drop their entries on the next write.
    fn sweep(&self) {
        let now = Utc::now();
        self.entries.retain(|_, entry| now - entry.created_at <= self.ttl);
    }
}
