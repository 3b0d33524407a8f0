// ABOUTME: PGP strategy: the user clearsigns a random challenge with the key their profile links to
// ABOUTME: Signature checking is delegated to a ClearsignVerifier, by default the gpg command line
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

use super::{CallbackForm, StrategyError, StrategyStore};
use crate::config::HttpClientConfig;
use crate::constants::secrets::PGP_CHALLENGE_LEN;
use crate::utils::http_client::page_client;
use crate::utils::random::random_string;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Duration;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};
use url::Url;

pub(super) const NAME: &str = "pgp";

/// Checks a clearsigned message against an armored public key
#[async_trait]
pub trait ClearsignVerifier: Send + Sync {
    /// Verify `signed` with `armored_key`, returning the signed text
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be read or the signature does not verify
    async fn verify(&self, armored_key: &str, signed: &str) -> Result<String>;
}

/// Verifier shelling out to `gpg` with a throwaway keyring
pub struct GpgVerifier {
    program: PathBuf,
}

impl Default for GpgVerifier {
    fn default() -> Self {
        Self {
            program: PathBuf::from("gpg"),
        }
    }
}

impl GpgVerifier {
    /// Use a specific gpg binary
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl ClearsignVerifier for GpgVerifier {
    async fn verify(&self, armored_key: &str, signed: &str) -> Result<String> {
        let home = tempfile::tempdir().context("could not create keyring directory")?;
        let key_path = home.path().join("key.asc");
        let signed_path = home.path().join("signed.asc");
        let output_path = home.path().join("plain.txt");

        tokio::fs::write(&key_path, armored_key).await?;
        tokio::fs::write(&signed_path, signed).await?;

        let import = Command::new(&self.program)
            .arg("--homedir")
            .arg(home.path())
            .args(["--batch", "--quiet", "--import"])
            .arg(&key_path)
            .output()
            .await
            .context("could not run gpg")?;
        if !import.status.success() {
            bail!("could not read key: {}", String::from_utf8_lossy(&import.stderr));
        }

        let check = Command::new(&self.program)
            .arg("--homedir")
            .arg(home.path())
            .args(["--batch", "--status-fd", "1", "--output"])
            .arg(&output_path)
            .arg("--decrypt")
            .arg(&signed_path)
            .output()
            .await
            .context("could not run gpg")?;

        let status = String::from_utf8_lossy(&check.stdout);
        if !check.status.success() || !status.contains("[GNUPG:] GOODSIG") {
            bail!("signature did not verify");
        }

        Ok(tokio::fs::read_to_string(&output_path).await?)
    }
}

struct PendingChallenge {
    me: String,
    key_url: String,
    challenge: String,
}

/// PGP clearsign challenge strategy
pub struct Pgp {
    authorize_url: String,
    client_id: String,
    store: StrategyStore<PendingChallenge>,
    verifier: Arc<dyn ClearsignVerifier>,
    http: reqwest::Client,
}

impl Pgp {
    /// Create the strategy; `base_url` is where this server is reachable
    #[must_use]
    pub fn new(
        base_url: &str,
        http_config: &HttpClientConfig,
        verifier: Arc<dyn ClearsignVerifier>,
        state_ttl: Duration,
    ) -> Self {
        Self {
            authorize_url: format!("{base_url}/pgp/authorize"),
            client_id: format!("{base_url}/"),
            store: StrategyStore::new(state_ttl),
            verifier,
            http: page_client(http_config),
        }
    }

    pub(super) fn redirect(&self, me: &str, key_url: &str) -> Result<String, StrategyError> {
        let challenge = random_string(PGP_CHALLENGE_LEN)?;
        let state = self.store.insert(PendingChallenge {
            me: me.to_owned(),
            key_url: key_url.to_owned(),
            challenge: challenge.clone(),
        })?;

        let mut url = Url::parse(&self.authorize_url)
            .map_err(|e| StrategyError::Provider(format!("invalid authorize url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("state", &state)
            .append_pair("challenge", &challenge);

        Ok(url.into())
    }

    pub(super) async fn callback(&self, form: &CallbackForm) -> Result<String, StrategyError> {
        let pending = form
            .get("state")
            .and_then(|state| self.store.claim(state))
            .ok_or(StrategyError::Unknown)?;
        let signed = form.get("signed").ok_or(StrategyError::Unauthorized)?;

        let key = self
            .http
            .get(&pending.key_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| StrategyError::Provider(format!("could not get key: {e}")))?
            .text()
            .await
            .map_err(|e| StrategyError::Provider(format!("could not read key: {e}")))?;

        match self.verifier.verify(&key, signed).await {
            Ok(text) if text.trim() == pending.challenge => {
                debug!(me = %pending.me, "pgp challenge verified");
                Ok(pending.me)
            }
            Ok(_) => {
                warn!(me = %pending.me, "pgp signature covers the wrong challenge");
                Err(StrategyError::Unauthorized)
            }
            Err(e) => {
                warn!(me = %pending.me, error = %e, "pgp signature rejected");
                Err(StrategyError::Unauthorized)
            }
        }
    }
}
