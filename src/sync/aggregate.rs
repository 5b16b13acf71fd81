// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Fan-out over all definitions of a VaultSecret and merge the results.

use crate::error::{Result, SyncError};
use crate::sync::source::{read_definition, SecretSource};
use crate::types::{LeaseStatus, VaultSecretDefinition};
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{info, instrument};

/// Merged secret payloads keyed by definition name, plus lease data in declaration order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Aggregate {
    pub merged: Map<String, Value>,
    pub leases: Vec<LeaseStatus>,
}

/// Read every definition and merge the payloads.
///
/// Reads run concurrently. The first failure aborts the whole aggregation and no
/// partial result is returned.
#[instrument(skip(source, definitions), fields(definitions = definitions.len()))]
pub async fn aggregate<S>(
    source: &S,
    definitions: &[VaultSecretDefinition],
    namespace: &str,
) -> Result<Aggregate>
where
    S: SecretSource + ?Sized,
{
    ensure_unique_names(definitions)?;

    let reads = try_join_all(
        definitions
            .iter()
            .map(|definition| read_definition(source, definition, namespace)),
    )
    .await?;

    let mut result = Aggregate::default();
    for (definition, (value, lease)) in definitions.iter().zip(reads) {
        result
            .merged
            .insert(definition.name.clone(), Value::Object(value));
        result.leases.push(lease);
    }

    info!("Read {} Vault secrets", result.leases.len());
    Ok(result)
}

fn ensure_unique_names(definitions: &[VaultSecretDefinition]) -> Result<()> {
    let mut seen = HashSet::new();
    for definition in definitions {
        if !seen.insert(definition.name.as_str()) {
            return Err(SyncError::InvalidSpec(format!(
                "duplicate vaultSecretDefinition name '{}'",
                definition.name
            )));
        }
    }
    Ok(())
}
