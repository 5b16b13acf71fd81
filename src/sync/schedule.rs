// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Lease clock: decides when a VaultSecret has to be synchronized again.
//!
//! The interval between syncs is, in priority order:
//! 1. the explicit `refreshPeriod` of the spec,
//! 2. `refreshThreshold` percent of the shortest non-static lease seen on the last sync,
//! 3. nothing, in which case the VaultSecret only syncs on external triggers.

use crate::constants::schedule::MIN_REQUEUE_SECS;
use crate::error::{Result, SyncError};
use crate::types::{LeaseStatus, VaultSecretSpec};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// Compute the interval between two syncs, or `None` when no periodic schedule can be determined.
///
/// Static secrets (lease duration 0) do not take part in the minimum. When every recorded
/// lease is static the result is `None`: there is nothing that expires.
pub fn compute_interval(
    spec: &VaultSecretSpec,
    leases: &[LeaseStatus],
) -> Result<Option<Duration>> {
    if let Some(period) = spec.refresh_period.as_deref() {
        return parse_duration(period).map(Some);
    }

    let Some(shortest) = leases
        .iter()
        .map(|l| l.lease_duration)
        .filter(|d| *d > 0)
        .min()
    else {
        return Ok(None);
    };

    let threshold = validate_threshold(spec.refresh_threshold)?;
    // seconds * threshold / 100, expressed in milliseconds to stay exact
    Ok(Some(Duration::from_millis(
        shortest.saturating_mul(u64::from(threshold)).saturating_mul(10),
    )))
}

pub fn validate_threshold(threshold: u32) -> Result<u32> {
    if (1..=100).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(SyncError::InvalidSpec(format!(
            "refreshThreshold must be between 1 and 100, got {}",
            threshold
        )))
    }
}

/// A VaultSecret that never synced is always due. Without a schedule it is never due again.
pub fn is_due(
    interval: Option<Duration>,
    last_sync: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    match (last_sync, next_sync(interval, last_sync)) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(_), Some(next)) => now >= next,
    }
}

/// Planned time of the next sync relative to the last one
pub fn next_sync(
    interval: Option<Duration>,
    last_sync: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    let last = last_sync?;
    let interval = chrono::Duration::from_std(interval?).ok()?;
    last.checked_add_signed(interval)
}

/// Delay until `next`, never shorter than the minimum requeue interval
pub fn requeue_after(next: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let min = Duration::from_secs(MIN_REQUEUE_SECS);
    (next - now).to_std().map(|d| d.max(min)).unwrap_or(min)
}

fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?P<number>\d+(?:\.\d+)?)(?P<unit>ns|us|µs|ms|s|m|h)")
            .expect("duration regex is valid")
    })
}

/// Parse a Go-style duration such as `"90s"`, `"1h30m"` or `"1.5h"`
pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    let invalid = || {
        SyncError::InvalidSpec(format!(
            "invalid duration '{}': expected e.g. '30s', '5m', '1h30m'",
            input
        ))
    };

    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let mut consumed = 0;
    let mut total_nanos = 0f64;
    for captures in duration_regex().captures_iter(trimmed) {
        let whole = captures.get(0).ok_or_else(invalid)?;
        if whole.start() != consumed {
            return Err(invalid());
        }
        consumed = whole.end();

        let number: f64 = captures["number"].parse().map_err(|_| invalid())?;
        let unit_nanos = match &captures["unit"] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        total_nanos += (number * unit_nanos).round();
    }

    if consumed != trimmed.len() {
        return Err(invalid());
    }

    if !total_nanos.is_finite() || total_nanos >= u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(total_nanos as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TemplatizedK8sSecret;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn make_spec(refresh_period: Option<&str>, refresh_threshold: u32) -> VaultSecretSpec {
        VaultSecretSpec {
            refresh_period: refresh_period.map(str::to_string),
            refresh_threshold,
            vault_secret_definitions: vec![],
            output: TemplatizedK8sSecret {
                name: "out".to_string(),
                type_: "Opaque".to_string(),
                string_data: BTreeMap::new(),
                labels: BTreeMap::new(),
                annotations: BTreeMap::new(),
            },
        }
    }

    fn lease(name: &str, duration: u64) -> LeaseStatus {
        LeaseStatus {
            name: name.to_string(),
            lease_id: if duration > 0 {
                format!("database/creds/{}/abc", name)
            } else {
                String::new()
            },
            lease_duration: duration,
            renewable: duration > 0,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_refresh_period_wins_over_leases() {
        let spec = make_spec(Some("2m"), 80);
        let interval = compute_interval(&spec, &[lease("a", 10)]).unwrap();
        assert_eq!(interval, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_shortest_lease_scaled_by_threshold() {
        let spec = make_spec(None, 80);
        let interval = compute_interval(&spec, &[lease("a", 3600), lease("b", 100)]).unwrap();
        assert_eq!(interval, Some(Duration::from_secs(80)));
    }

    #[test]
    fn test_static_leases_are_excluded_from_minimum() {
        let spec = make_spec(None, 50);
        let interval = compute_interval(&spec, &[lease("static", 0), lease("db", 60)]).unwrap();
        assert_eq!(interval, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_all_static_leases_have_no_schedule() {
        let spec = make_spec(None, 90);
        assert_eq!(
            compute_interval(&spec, &[lease("a", 0), lease("b", 0)]).unwrap(),
            None
        );
    }

    #[test]
    fn test_no_leases_have_no_schedule() {
        let spec = make_spec(None, 90);
        assert_eq!(compute_interval(&spec, &[]).unwrap(), None);
    }

    #[test]
    fn test_fractional_scaling_is_exact() {
        let spec = make_spec(None, 33);
        let interval = compute_interval(&spec, &[lease("a", 10)]).unwrap();
        assert_eq!(interval, Some(Duration::from_millis(3300)));
    }

    #[test]
    fn test_threshold_out_of_range() {
        let spec = make_spec(None, 0);
        assert!(matches!(
            compute_interval(&spec, &[lease("a", 10)]),
            Err(SyncError::InvalidSpec(_))
        ));
        let spec = make_spec(None, 101);
        assert!(compute_interval(&spec, &[lease("a", 10)]).is_err());
    }

    #[test]
    fn test_never_synced_is_due() {
        assert!(is_due(None, None, at(0)));
        assert!(is_due(Some(Duration::from_secs(60)), None, at(0)));
    }

    #[test]
    fn test_without_schedule_synced_unit_is_not_due() {
        assert!(!is_due(None, Some(at(0)), at(1_000_000)));
    }

    #[test]
    fn test_due_boundary() {
        let interval = Some(Duration::from_secs(80));
        assert!(!is_due(interval, Some(at(0)), at(79)));
        assert!(is_due(interval, Some(at(0)), at(80)));
        assert!(is_due(interval, Some(at(0)), at(500)));
    }

    #[test]
    fn test_next_sync() {
        assert_eq!(next_sync(Some(Duration::from_secs(80)), Some(at(0))), Some(at(80)));
        assert_eq!(next_sync(None, Some(at(0))), None);
        assert_eq!(next_sync(Some(Duration::from_secs(80)), None), None);
    }

    #[test]
    fn test_requeue_after_has_floor() {
        assert_eq!(requeue_after(at(80), at(0)), Duration::from_secs(80));
        assert_eq!(requeue_after(at(0), at(80)), Duration::from_secs(1));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        for input in ["", "10", "5d", "1h 30m", "-5s", "abc", "5sx"] {
            assert!(parse_duration(input).is_err(), "accepted {:?}", input);
        }
    }
}
