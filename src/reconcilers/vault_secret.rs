// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! VaultSecret reconciler - dispatches watch events and timers to the sync engine.

use crate::config::Config;
use crate::constants::{labels, OPERATOR_NAME};
use crate::error::{Result, SyncError};
use crate::reconcilers::predicates::{classify, Decision};
use crate::sync::{
    EngineSettings, KubeOutputStore, OutputStore, Requeue, SecretSource, SyncEngine,
};
use crate::types::{VaultSecret, VaultSecretStatus};
use crate::vault::{VaultClient, VaultSource};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{Patch, PatchParams},
    runtime::{controller::Action, Controller},
    Api, Client, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

pub struct VaultSecretReconciler {
    client: Client,
    watch_namespace: Option<String>,
    retry_interval: Duration,
    outputs: KubeOutputStore,
    engine: SyncEngine<VaultSource, KubeOutputStore>,
}

impl VaultSecretReconciler {
    pub fn new(client: Client, config: &Config) -> Result<Self> {
        let vault = VaultClient::new(config.vault_address.clone(), config.vault_skip_verify)?;
        let engine = SyncEngine::new(
            VaultSource::new(vault, client.clone()),
            KubeOutputStore::new(client.clone()),
            EngineSettings {
                sync_timeout: config.sync_timeout,
                retry_interval: config.retry_interval,
            },
        );

        Ok(Self {
            outputs: KubeOutputStore::new(client.clone()),
            client,
            watch_namespace: config.watch_namespace.clone(),
            retry_interval: config.retry_interval,
            engine,
        })
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        match &self.watch_namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let vault_secrets: Api<VaultSecret> = self.api();
        let secrets: Api<Secret> = self.api();
        let selector = format!("{}={}", labels::MANAGED_BY, OPERATOR_NAME);
        let owned = WatcherConfig::default().labels(&selector);

        info!(
            "Watching VaultSecrets in {}",
            self.watch_namespace.as_deref().unwrap_or("all namespaces")
        );
        let context = Arc::new(self);

        Controller::new(vault_secrets, WatcherConfig::default())
            .owns(secrets, owned)
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled VaultSecret: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

async fn reconcile(unit: Arc<VaultSecret>, ctx: Arc<VaultSecretReconciler>) -> Result<Action> {
    let namespace = unit.namespace().unwrap_or_default();
    let existing = ctx.outputs.get(&namespace, &unit.spec.output.name).await?;

    dispatch(
        &ctx.engine,
        &ctx.client,
        &unit,
        existing.as_ref(),
        ctx.retry_interval,
        Utc::now(),
    )
    .await
}

/// Classify the event, run the engine when needed and persist the resulting status.
/// The watch cache can lag behind our own status patch, so classification works on
/// the live VaultSecret rather than the snapshot the event carried.
#[instrument(skip_all, fields(vault_secret = %format!("{}/{}", unit.namespace().unwrap_or_default(), unit.name_any())))]
async fn dispatch<S, O>(
    engine: &SyncEngine<S, O>,
    client: &Client,
    unit: &VaultSecret,
    existing: Option<&Secret>,
    retry_interval: Duration,
    now: DateTime<Utc>,
) -> Result<Action>
where
    S: SecretSource,
    O: OutputStore,
{
    let Some(unit) = fetch_live(client, unit).await? else {
        debug!("VaultSecret is gone, nothing to do");
        return Ok(Action::await_change());
    };

    let trigger = match classify(&unit, existing, now, retry_interval) {
        Decision::Wait(remaining) => {
            debug!("Previous attempt failed, retrying in {:?}", remaining);
            return Ok(Action::requeue(remaining));
        }
        Decision::Sync(trigger) => trigger,
    };

    let outcome = engine.reconcile(&unit, trigger, now).await;
    if let Some(status) = &outcome.status {
        persist_status(client, &unit, status).await?;
    }

    Ok(match outcome.requeue {
        Requeue::After(delay) => Action::requeue(delay),
        Requeue::AwaitChange => Action::await_change(),
    })
}

async fn fetch_live(client: &Client, unit: &VaultSecret) -> Result<Option<VaultSecret>> {
    let namespace = unit.namespace().ok_or_else(|| {
        SyncError::InvalidSpec("VaultSecret has no namespace".to_string())
    })?;
    let api: Api<VaultSecret> = Api::namespaced(client.clone(), &namespace);
    Ok(api.get_opt(&unit.name_any()).await?)
}

/// Write the status subresource with a merge patch
async fn persist_status(
    client: &Client,
    unit: &VaultSecret,
    status: &VaultSecretStatus,
) -> Result<()> {
    let namespace = unit.namespace().ok_or_else(|| {
        SyncError::InvalidSpec("VaultSecret has no namespace".to_string())
    })?;
    let api: Api<VaultSecret> = Api::namespaced(client.clone(), &namespace);
    let patch = json!({ "status": status });

    api.patch_status(&unit.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

fn error_policy(
    unit: Arc<VaultSecret>,
    error: &SyncError,
    ctx: Arc<VaultSecretReconciler>,
) -> Action {
    error!(
        "Reconciliation error for VaultSecret {}/{}: {}",
        unit.namespace().unwrap_or_default(),
        unit.name_any(),
        error
    );
    Action::requeue(ctx.retry_interval)
}
