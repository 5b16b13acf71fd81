// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vault_secret_sync::config::Config;
use vault_secret_sync::kubernetes::wait_for_vault_secret_crd;
use vault_secret_sync::reconcilers::VaultSecretReconciler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting vault-secret-sync operator");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: vault_address={}, sync_timeout={:?}, retry_interval={:?}",
        config.vault_address, config.sync_timeout, config.retry_interval
    );
    if config.vault_skip_verify {
        warn!("TLS verification of the Vault server is disabled");
    }

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Wait for the VaultSecret CRD before starting the reconciler
    info!("Waiting for VaultSecret CRD to become available...");
    wait_for_vault_secret_crd(&client).await?;

    let reconciler = VaultSecretReconciler::new(client, &config)?;

    info!("Starting reconciler...");
    reconciler.run().await?;

    info!("Reconciler stopped");
    Ok(())
}
