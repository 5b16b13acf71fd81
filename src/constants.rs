// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Kubernetes annotation keys written on output Secrets
pub mod annotations {
    /// SHA-256 of the rendered data, used to detect drift of the output Secret
    pub const DATA_HASH: &str = "vaultsecret.redhatcop.redhat.io/data-hash";
}

/// Kubernetes label keys written on output Secrets
pub mod labels {
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
}

/// The operator name used as field manager and managed-by label value
pub const OPERATOR_NAME: &str = "vault-secret-sync";

/// Status condition types and reasons
pub mod conditions {
    pub const RECONCILE_SUCCESSFUL: &str = "ReconcileSuccessful";
    pub const RECONCILE_SUCCESSFUL_REASON: &str = "LastReconcileCycleSucceeded";
    pub const RECONCILE_FAILED: &str = "ReconcileFailed";
}

/// Scheduling defaults
pub mod schedule {
    /// Refresh threshold percentage used when the spec does not set one
    pub const DEFAULT_REFRESH_THRESHOLD: u32 = 90;
    /// Shortest timed re-trigger, used when the next sync is already overdue
    pub const MIN_REQUEUE_SECS: u64 = 1;
    /// Default deadline for a whole sync attempt
    pub const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 30;
    /// Default fixed retry interval after a failed attempt
    pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 30;
}

/// CRD polling configuration
pub mod crd {
    /// API group of the VaultSecret CRD
    pub const GROUP: &str = "redhatcop.redhat.io";
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}
