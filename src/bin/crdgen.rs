// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Prints the VaultSecret CustomResourceDefinition as YAML.

use kube::CustomResourceExt;
use vault_secret_sync::types::VaultSecret;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&VaultSecret::crd())?);
    Ok(())
}
