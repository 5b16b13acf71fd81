// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resource types consumed and produced by the operator.

pub mod vault_secret;

pub use vault_secret::{
    AuthMechanism, Authentication, KubernetesAuth, LeaseStatus, TemplatizedK8sSecret, TokenAuth,
    VaultSecret, VaultSecretDefinition, VaultSecretSpec, VaultSecretStatus,
};
