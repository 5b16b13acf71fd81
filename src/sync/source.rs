// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Secret source capability and the per-definition source reader.

use crate::error::{Result, SyncError};
use crate::types::{Authentication, LeaseStatus, VaultSecretDefinition};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

/// Result of reading one path from the secret source
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SecretRead {
    pub value: Map<String, Value>,
    /// Empty for static secrets
    pub lease_id: String,
    /// Seconds, 0 for static secrets
    pub lease_duration: u64,
    pub renewable: bool,
}

/// A secret store that can be authenticated against and read from.
///
/// Implementations must fail with [`SyncError::Authentication`] when no session can be
/// established, [`SyncError::SourceNotFound`] when nothing exists at a path and
/// [`SyncError::SourceUnavailable`] for transport or server failures.
#[async_trait]
pub trait SecretSource: Send + Sync {
    type Session: Send + Sync;

    /// Establish a session for one definition. `namespace` is the namespace of the
    /// VaultSecret, used to resolve service accounts and secret references.
    async fn authenticate(&self, auth: &Authentication, namespace: &str) -> Result<Self::Session>;

    async fn read_path(&self, session: &Self::Session, path: &str) -> Result<SecretRead>;
}

/// Authenticate and read a single definition.
///
/// The session lives only for this read and is dropped afterwards.
#[instrument(skip(source, definition), fields(definition = %definition.name, path = %definition.path))]
pub async fn read_definition<S>(
    source: &S,
    definition: &VaultSecretDefinition,
    namespace: &str,
) -> Result<(Map<String, Value>, LeaseStatus)>
where
    S: SecretSource + ?Sized,
{
    let session = source
        .authenticate(&definition.authentication, namespace)
        .await
        .map_err(|e| with_definition(e, &definition.name))?;

    let read = source
        .read_path(&session, &definition.path)
        .await
        .map_err(|e| with_definition(e, &definition.name))?;

    debug!(
        "Read secret, lease_duration={}s renewable={}",
        read.lease_duration, read.renewable
    );

    let status = LeaseStatus {
        name: definition.name.clone(),
        lease_id: read.lease_id,
        lease_duration: read.lease_duration,
        renewable: read.renewable,
    };
    Ok((read.value, status))
}

/// Prefix the message of a source error with the definition it belongs to
fn with_definition(error: SyncError, definition: &str) -> SyncError {
    match error {
        SyncError::Authentication(m) => {
            SyncError::Authentication(format!("definition '{}': {}", definition, m))
        }
        SyncError::SourceNotFound(m) => {
            SyncError::SourceNotFound(format!("definition '{}': {}", definition, m))
        }
        SyncError::SourceUnavailable(m) => {
            SyncError::SourceUnavailable(format!("definition '{}': {}", definition, m))
        }
        SyncError::InvalidSpec(m) => {
            SyncError::InvalidSpec(format!("definition '{}': {}", definition, m))
        }
        other => other,
    }
}
