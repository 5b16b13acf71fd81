// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Output store capability and the writer that commits rendered Secrets.

use crate::constants::{annotations, labels, OPERATOR_NAME};
use crate::error::{Result, SyncError};
use crate::sync::render::RenderedSecret;
use crate::types::VaultSecret;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::{
    api::{ObjectMeta, PostParams},
    Api, Client, Resource, ResourceExt,
};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Where rendered Secrets are stored
#[async_trait]
pub trait OutputStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    /// Create the Secret when it has no resourceVersion, otherwise replace it as a whole
    async fn create_or_replace(&self, secret: &Secret) -> Result<()>;
}

/// Kubernetes API backed output store
#[derive(Clone)]
pub struct KubeOutputStore {
    client: Client,
}

impl KubeOutputStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OutputStore for KubeOutputStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        secrets.get_opt(name).await.map_err(|e| {
            SyncError::OutputWriteError(format!(
                "failed to get Secret {}/{}: {}",
                namespace, name, e
            ))
        })
    }

    async fn create_or_replace(&self, secret: &Secret) -> Result<()> {
        let namespace = secret.namespace().unwrap_or_default();
        let name = secret.name_any();
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        let pp = PostParams {
            field_manager: Some(OPERATOR_NAME.to_string()),
            ..Default::default()
        };

        let result = if secret.metadata.resource_version.is_some() {
            secrets.replace(&name, &pp, secret).await
        } else {
            secrets.create(&pp, secret).await
        };

        result.map(|_| ()).map_err(|e| {
            SyncError::OutputWriteError(format!(
                "failed to write Secret {}/{}: {}",
                namespace, name, e
            ))
        })
    }
}

/// SHA-256 over the sorted keys and values of Secret data
pub fn data_hash(data: &BTreeMap<String, ByteString>) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in data {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(&value.0);
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Build the Secret owned by `owner` for the rendered output
pub fn build_output_secret(owner: &VaultSecret, rendered: &RenderedSecret) -> Result<Secret> {
    let owner_ref = owner.controller_owner_ref(&()).ok_or_else(|| {
        SyncError::OutputWriteError(format!(
            "VaultSecret {} has no uid, cannot own its output",
            owner.name_any()
        ))
    })?;

    let data: BTreeMap<String, ByteString> = rendered
        .data
        .iter()
        .map(|(k, v)| (k.clone(), ByteString(v.as_bytes().to_vec())))
        .collect();

    let mut secret_labels = rendered.labels.clone();
    secret_labels.insert(labels::MANAGED_BY.to_string(), OPERATOR_NAME.to_string());

    let mut secret_annotations = rendered.annotations.clone();
    secret_annotations.insert(annotations::DATA_HASH.to_string(), data_hash(&data));

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(rendered.name.clone()),
            namespace: owner.namespace(),
            labels: Some(secret_labels),
            annotations: Some(secret_annotations),
            owner_references: Some(vec![owner_ref]),
            ..Default::default()
        },
        data: Some(data),
        type_: Some(rendered.type_.clone()),
        ..Default::default()
    })
}

/// Whether `existing` already carries everything `desired` would write
pub fn is_up_to_date(existing: &Secret, desired: &Secret) -> bool {
    let empty = BTreeMap::new();
    existing.type_ == desired.type_
        && existing.metadata.labels.as_ref().unwrap_or(&empty)
            == desired.metadata.labels.as_ref().unwrap_or(&empty)
        && existing.metadata.annotations.as_ref().unwrap_or(&empty)
            == desired.metadata.annotations.as_ref().unwrap_or(&empty)
        && existing.metadata.owner_references == desired.metadata.owner_references
        && existing.data.as_ref().filter(|d| !d.is_empty())
            == desired.data.as_ref().filter(|d| !d.is_empty())
        && existing.string_data.as_ref().map_or(true, |d| d.is_empty())
}

/// Create or replace the output Secret of `owner`.
///
/// Returns `false` when the existing Secret was already up to date and nothing was written.
#[instrument(skip(store, owner, rendered), fields(output = %rendered.name))]
pub async fn commit<O>(store: &O, owner: &VaultSecret, rendered: &RenderedSecret) -> Result<bool>
where
    O: OutputStore + ?Sized,
{
    let mut desired = build_output_secret(owner, rendered)?;
    let namespace = owner.namespace().unwrap_or_default();

    match store.get(&namespace, &rendered.name).await? {
        Some(existing) if is_up_to_date(&existing, &desired) => {
            debug!("Output Secret already up to date");
            Ok(false)
        }
        Some(existing) => {
            desired.metadata.resource_version = existing.metadata.resource_version.clone();
            store.create_or_replace(&desired).await?;
            info!("Replaced output Secret {}/{}", namespace, rendered.name);
            Ok(true)
        }
        None => {
            store.create_or_replace(&desired).await?;
            info!("Created output Secret {}/{}", namespace, rendered.name);
            Ok(true)
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory output store for engine tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeOutputStore {
        pub secrets: Mutex<BTreeMap<(String, String), Secret>>,
        pub writes: AtomicUsize,
        pub fail_writes: bool,
    }

    impl FakeOutputStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                fail_writes: true,
                ..Default::default()
            }
        }

        pub fn stored(&self, namespace: &str, name: &str) -> Option<Secret> {
            self.secrets
                .lock()
                .unwrap()
                .get(&(namespace.to_string(), name.to_string()))
                .cloned()
        }

        pub fn write_count(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OutputStore for FakeOutputStore {
        async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
            Ok(self.stored(namespace, name))
        }

        async fn create_or_replace(&self, secret: &Secret) -> Result<()> {
            if self.fail_writes {
                return Err(SyncError::OutputWriteError("injected failure".to_string()));
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            let mut stored = secret.clone();
            let version = self.write_count().to_string();
            stored.metadata.resource_version = Some(version);
            self.secrets.lock().unwrap().insert(
                (secret.namespace().unwrap_or_default(), secret.name_any()),
                stored,
            );
            Ok(())
        }
    }
}
