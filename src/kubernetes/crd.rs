// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD availability checking utilities

use crate::constants::crd::{GROUP, POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::error::Result;
use crate::types::VaultSecret;
use kube::{discovery::Discovery, Client, Resource};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Wait for the VaultSecret CRD to become available in the cluster.
/// This uses exponential backoff starting at POLL_INTERVAL_SECS seconds.
pub async fn wait_for_vault_secret_crd(client: &Client) -> Result<()> {
    let mut interval = POLL_INTERVAL_SECS;
    let version = VaultSecret::version(&());

    loop {
        match check_vault_secret_crd_exists(client).await {
            Ok(true) => {
                info!("VaultSecret CRD ({}/{}) is available", GROUP, version);
                return Ok(());
            }
            Ok(false) => {
                info!(
                    "VaultSecret CRD ({}/{}) not yet available, waiting {} seconds...",
                    GROUP, version, interval
                );
            }
            Err(e) => {
                warn!(
                    "Error checking for VaultSecret CRD: {}, retrying in {} seconds...",
                    e, interval
                );
            }
        }

        sleep(Duration::from_secs(interval)).await;

        // Exponential backoff with max cap
        interval = (interval * 2).min(POLL_MAX_INTERVAL_SECS);
    }
}

async fn check_vault_secret_crd_exists(client: &Client) -> Result<bool> {
    let discovery = Discovery::new(client.clone())
        .filter(&[GROUP])
        .run()
        .await?;

    let kind = VaultSecret::kind(&());
    let version = VaultSecret::version(&());
    for group in discovery.groups() {
        if group.name() != GROUP {
            continue;
        }
        for (ar, _caps) in group.recommended_resources() {
            if ar.kind == kind && ar.version == version {
                return Ok(true);
            }
        }
    }
    Ok(false)
}
