// ABOUTME: Development strategy that vouches for every profile without contacting anyone
// ABOUTME: Redirects straight back to its own callback carrying the expected identity
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

use super::{CallbackForm, StrategyError};

pub(super) const NAME: &str = "true";

/// Trust-everyone strategy; only registered when explicitly enabled
pub struct AlwaysTrue {
    callback_url: String,
}

impl AlwaysTrue {
    /// Create the strategy; `base_url` is where this server is reachable
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            callback_url: format!("{}/callback/{NAME}", base_url.trim_end_matches('/')),
        }
    }

    pub(super) fn redirect(&self, me: &str) -> String {
        format!(
            "{}?expected={}",
            self.callback_url,
            urlencoding::encode(me)
        )
    }

    pub(super) fn callback(form: &CallbackForm) -> Result<String, StrategyError> {
        form.get("expected")
            .filter(|expected| !expected.is_empty())
            .cloned()
            .ok_or(StrategyError::Unknown)
    }
}
