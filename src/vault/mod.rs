// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! HashiCorp Vault as secret source.

pub mod client;
pub mod credentials;

pub use client::VaultClient;

use crate::error::Result;
use crate::sync::{SecretRead, SecretSource};
use crate::types::{AuthMechanism, Authentication};
use async_trait::async_trait;
use kube::Client;
use std::fmt;

/// Authenticated Vault session for a single definition read
pub struct VaultSession {
    token: String,
    namespace: Option<String>,
}

impl fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultSession")
            .field("token", &"<redacted>")
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// Reads secrets from Vault, resolving credentials through the Kubernetes API
pub struct VaultSource {
    vault: VaultClient,
    kube: Client,
}

impl VaultSource {
    pub fn new(vault: VaultClient, kube: Client) -> Self {
        Self { vault, kube }
    }
}

#[async_trait]
impl SecretSource for VaultSource {
    type Session = VaultSession;

    async fn authenticate(&self, auth: &Authentication, namespace: &str) -> Result<VaultSession> {
        let vault_namespace = auth.namespace.as_deref();
        let token = match auth.mechanism()? {
            AuthMechanism::Kubernetes(kubernetes) => {
                let jwt = credentials::service_account_token(
                    &self.kube,
                    namespace,
                    &kubernetes.service_account.name,
                )
                .await?;
                self.vault
                    .login_kubernetes(&kubernetes.path, &kubernetes.role, &jwt, vault_namespace)
                    .await?
            }
            AuthMechanism::Token(token) => {
                credentials::token_from_secret(&self.kube, namespace, &token.secret_ref).await?
            }
        };

        Ok(VaultSession {
            token,
            namespace: auth.namespace.clone(),
        })
    }

    async fn read_path(&self, session: &VaultSession, path: &str) -> Result<SecretRead> {
        self.vault
            .read(&session.token, session.namespace.as_deref(), path)
            .await
    }
}
