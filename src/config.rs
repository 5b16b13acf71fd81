// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::schedule::{DEFAULT_RETRY_INTERVAL_SECS, DEFAULT_SYNC_TIMEOUT_SECS};
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;
use url::Url;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Base address of the Vault server
    pub vault_address: Url,
    pub vault_skip_verify: bool,
    /// Only watch VaultSecrets in this namespace when set
    pub watch_namespace: Option<String>,
    /// Deadline shared by all reads and the output commit of one sync attempt
    pub sync_timeout: Duration,
    /// Fixed delay before retrying a failed sync attempt
    pub retry_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let address = lookup("VAULT_ADDR").context("VAULT_ADDR environment variable not set")?;
        let vault_address = Url::parse(&address)
            .with_context(|| format!("VAULT_ADDR is not a valid URL: {}", address))?;

        let vault_skip_verify: bool = lookup("VAULT_SKIP_VERIFY")
            .unwrap_or("false".to_string())
            .parse()
            .unwrap_or(false);

        let watch_namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty());

        let sync_timeout = seconds(&lookup, "SYNC_TIMEOUT_SECS", DEFAULT_SYNC_TIMEOUT_SECS)?;
        let retry_interval = seconds(&lookup, "RETRY_INTERVAL_SECS", DEFAULT_RETRY_INTERVAL_SECS)?;

        Ok(Config {
            vault_address,
            vault_skip_verify,
            watch_namespace,
            sync_timeout,
            retry_interval,
        })
    }
}

fn seconds<F>(lookup: &F, key: &str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = match lookup(key) {
        Some(value) => value
            .parse::<u64>()
            .with_context(|| format!("{} must be a whole number of seconds", key))?,
        None => default,
    };
    Ok(Duration::from_secs(secs))
}
