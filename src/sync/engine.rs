// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Sync controller: decides whether a VaultSecret is due, runs aggregate, render and
//! commit, and computes the status and wake-up that follow.

use crate::constants::conditions::{
    RECONCILE_FAILED, RECONCILE_SUCCESSFUL, RECONCILE_SUCCESSFUL_REASON,
};
use crate::error::{Result, SyncError};
use crate::sync::aggregate::aggregate;
use crate::sync::output::{commit, OutputStore};
use crate::sync::render::render;
use crate::sync::schedule::{
    compute_interval, is_due, next_sync, parse_duration, requeue_after, validate_threshold,
};
use crate::sync::source::SecretSource;
use crate::types::{LeaseStatus, VaultSecret, VaultSecretSpec, VaultSecretStatus};
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::ResourceExt;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Deadline shared by all reads and the commit of one attempt
    pub sync_timeout: Duration,
    /// Fixed delay before a failed attempt is retried
    pub retry_interval: Duration,
}

/// Why a sync is forced regardless of the schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceReason {
    SpecChanged,
    OutputDrift,
    RetryAfterFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Sync now
    Forced(ForceReason),
    /// Timer wake-up or unrelated change; the lease clock decides
    Scheduled,
}

/// When the dispatcher should invoke the engine again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    After(Duration),
    /// Only on an external trigger
    AwaitChange,
}

#[derive(Debug)]
pub enum SyncState {
    NotDue,
    /// `written` is false when the output Secret already had the rendered content
    Synced { written: bool },
    Failed(SyncError),
}

#[derive(Debug)]
pub struct SyncOutcome {
    pub state: SyncState,
    /// Status to persist, `None` when nothing changed
    pub status: Option<VaultSecretStatus>,
    pub requeue: Requeue,
}

pub struct SyncEngine<S, O> {
    source: S,
    output: O,
    settings: EngineSettings,
}

impl<S, O> SyncEngine<S, O>
where
    S: SecretSource,
    O: OutputStore,
{
    pub fn new(source: S, output: O, settings: EngineSettings) -> Self {
        Self {
            source,
            output,
            settings,
        }
    }

    /// Evaluate one trigger for `unit` at time `now`
    #[instrument(skip(self, unit, now), fields(vault_secret = %format!("{}/{}", unit.namespace().unwrap_or_default(), unit.name_any())))]
    pub async fn reconcile(
        &self,
        unit: &VaultSecret,
        trigger: Trigger,
        now: DateTime<Utc>,
    ) -> SyncOutcome {
        let due = match trigger {
            Trigger::Forced(reason) => {
                debug!("Sync forced: {:?}", reason);
                true
            }
            // An invalid spec is reported by the sync attempt itself
            Trigger::Scheduled => compute_interval(&unit.spec, unit.lease_statuses())
                .map(|interval| is_due(interval, unit.last_sync(), now))
                .unwrap_or(true),
        };

        if !due {
            let requeue = self.rearm(unit, now);
            debug!("Not due, requeue {:?}", requeue);
            return SyncOutcome {
                state: SyncState::NotDue,
                status: None,
                requeue,
            };
        }

        match self.sync(unit).await {
            Ok((leases, written)) => self.succeeded(unit, leases, written, now),
            Err(error) => self.failed(unit, error, now),
        }
    }

    /// Aggregate, render and commit. Nothing is written unless every step before the
    /// commit succeeded.
    async fn sync(&self, unit: &VaultSecret) -> Result<(Vec<LeaseStatus>, bool)> {
        let deadline = Instant::now() + self.settings.sync_timeout;
        let namespace = unit.namespace().unwrap_or_default();

        validate_spec(&unit.spec)?;

        let aggregate = timeout_at(
            deadline,
            aggregate(&self.source, &unit.spec.vault_secret_definitions, &namespace),
        )
        .await
        .map_err(|_| deadline_exceeded(self.settings.sync_timeout, "reading Vault secrets"))??;

        let rendered = render(&unit.spec.output, &aggregate.merged)?;

        let written = timeout_at(deadline, commit(&self.output, unit, &rendered))
            .await
            .map_err(|_| deadline_exceeded(self.settings.sync_timeout, "writing output Secret"))??;

        Ok((aggregate.leases, written))
    }

    fn succeeded(
        &self,
        unit: &VaultSecret,
        leases: Vec<LeaseStatus>,
        written: bool,
        now: DateTime<Utc>,
    ) -> SyncOutcome {
        // The spec was validated before the sync, so the interval can be computed
        let interval = compute_interval(&unit.spec, &leases).unwrap_or(None);
        let next = next_sync(interval, Some(now));

        let status = VaultSecretStatus {
            conditions: vec![condition(
                unit,
                RECONCILE_SUCCESSFUL,
                "True",
                RECONCILE_SUCCESSFUL_REASON,
                "",
                now,
            )],
            last_vault_secret_update: Some(Time(now)),
            next_vault_secret_update: next.map(Time),
            vault_secret_definitions_status: leases,
        };

        let requeue = match next {
            Some(next) => Requeue::After(requeue_after(next, now)),
            None => Requeue::AwaitChange,
        };
        info!(
            "Sync succeeded (output written: {}), next sync {}",
            written,
            next.map(|n| n.to_rfc3339())
                .unwrap_or_else(|| "on change only".to_string())
        );

        SyncOutcome {
            state: SyncState::Synced { written },
            status: Some(status),
            requeue,
        }
    }

    /// Record the failure and keep everything else of the previous status
    fn failed(&self, unit: &VaultSecret, error: SyncError, now: DateTime<Utc>) -> SyncOutcome {
        warn!(
            "Sync failed, retrying in {:?}: {}",
            self.settings.retry_interval, error
        );

        let mut status = unit.status.clone().unwrap_or_default();
        status.conditions = vec![condition(
            unit,
            RECONCILE_FAILED,
            "False",
            error.reason(),
            &error.to_string(),
            now,
        )];

        SyncOutcome {
            state: SyncState::Failed(error),
            status: Some(status),
            requeue: Requeue::After(self.settings.retry_interval),
        }
    }

    /// Wake-up for a unit that is not due: at the recorded or recomputed next sync
    fn rearm(&self, unit: &VaultSecret, now: DateTime<Utc>) -> Requeue {
        let next = unit.next_sync().or_else(|| {
            compute_interval(&unit.spec, unit.lease_statuses())
                .ok()
                .and_then(|interval| next_sync(interval, unit.last_sync()))
        });
        match next {
            Some(next) => Requeue::After(requeue_after(next, now)),
            None => Requeue::AwaitChange,
        }
    }
}

#[cfg(test)]
impl<S, O> SyncEngine<S, O> {
    pub(crate) fn source(&self) -> &S {
        &self.source
    }

    pub(crate) fn output(&self) -> &O {
        &self.output
    }
}

/// Reject spec values that would make the sync or its schedule meaningless
pub fn validate_spec(spec: &VaultSecretSpec) -> Result<()> {
    validate_threshold(spec.refresh_threshold)?;
    if let Some(period) = spec.refresh_period.as_deref() {
        if parse_duration(period)?.is_zero() {
            return Err(SyncError::InvalidSpec(
                "refreshPeriod must be greater than zero".to_string(),
            ));
        }
    }
    for definition in &spec.vault_secret_definitions {
        definition.authentication.mechanism().map_err(|e| {
            SyncError::InvalidSpec(format!("definition '{}': {}", definition.name, e))
        })?;
    }
    Ok(())
}

fn deadline_exceeded(timeout: Duration, stage: &str) -> SyncError {
    SyncError::Timeout(format!("sync did not finish within {:?} while {}", timeout, stage))
}

/// Build the single condition recorded for an attempt. The transition time is the attempt time.
fn condition(
    unit: &VaultSecret,
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
) -> Condition {
    Condition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        observed_generation: unit.metadata.generation,
        last_transition_time: Time(now),
    }
}
