// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Trigger predicates deciding whether a watch event forces a sync.

use crate::constants::annotations::DATA_HASH;
use crate::constants::conditions::RECONCILE_FAILED;
use crate::sync::output::data_hash;
use crate::sync::{ForceReason, Trigger};
use crate::types::VaultSecret;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Secret;
use std::time::Duration;

/// What the dispatcher does with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Sync(Trigger),
    /// A failed attempt is still backing off
    Wait(Duration),
}

/// The spec generation differs from the one the last attempt saw.
/// A VaultSecret without any recorded attempt counts as changed.
pub fn spec_changed(unit: &VaultSecret) -> bool {
    unit.last_condition()
        .map_or(true, |c| c.observed_generation != unit.metadata.generation)
}

pub fn last_attempt_failed(unit: &VaultSecret) -> bool {
    unit.last_condition()
        .is_some_and(|c| c.type_ == RECONCILE_FAILED)
}

/// The output Secret is gone or its content no longer matches what was written
pub fn output_drifted(unit: &VaultSecret, existing: Option<&Secret>) -> bool {
    if unit.last_sync().is_none() {
        return false;
    }
    let Some(existing) = existing else {
        return true;
    };

    let recorded = existing
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(DATA_HASH));
    let current = data_hash(&existing.data.clone().unwrap_or_default());
    recorded != Some(&current)
}

/// Time left before a failed attempt may be retried
fn retry_backoff(
    unit: &VaultSecret,
    now: DateTime<Utc>,
    retry_interval: Duration,
) -> Option<Duration> {
    let failed_at = unit
        .last_condition()
        .filter(|c| c.type_ == RECONCILE_FAILED)?
        .last_transition_time
        .0;
    let elapsed = (now - failed_at).to_std().unwrap_or_default();
    retry_interval.checked_sub(elapsed).filter(|d| !d.is_zero())
}

/// Decide how to handle an event for `unit` given the observed output Secret
pub fn classify(
    unit: &VaultSecret,
    existing: Option<&Secret>,
    now: DateTime<Utc>,
    retry_interval: Duration,
) -> Decision {
    if spec_changed(unit) {
        return Decision::Sync(Trigger::Forced(ForceReason::SpecChanged));
    }
    if last_attempt_failed(unit) {
        return match retry_backoff(unit, now, retry_interval) {
            Some(remaining) => Decision::Wait(remaining),
            None => Decision::Sync(Trigger::Forced(ForceReason::RetryAfterFailure)),
        };
    }
    if output_drifted(unit, existing) {
        return Decision::Sync(Trigger::Forced(ForceReason::OutputDrift));
    }
    Decision::Sync(Trigger::Scheduled)
}
