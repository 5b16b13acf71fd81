// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::schedule::DEFAULT_REFRESH_THRESHOLD;
use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Keeps one Kubernetes Secret rendered from one or more Vault secrets.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[kube(group = "redhatcop.redhat.io", version = "v1alpha1", kind = "VaultSecret")]
#[kube(namespaced)]
#[kube(status = "VaultSecretStatus")]
#[kube(shortname = "vsec")]
#[kube(printcolumn = r#"{"name":"Last Sync","type":"date","jsonPath":".status.lastVaultSecretUpdate"}"#)]
#[kube(printcolumn = r#"{"name":"Next Sync","type":"date","jsonPath":".status.nextVaultSecretUpdate"}"#)]
#[serde(rename_all = "camelCase")]
pub struct VaultSecretSpec {
    /// Fixed refresh period (Go duration, e.g. "90s", "1h30m"); overrides lease-based scheduling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_period: Option<String>,
    /// Percentage of the shortest lease after which the secret is refreshed
    #[serde(default = "default_refresh_threshold")]
    pub refresh_threshold: u32,
    #[serde(default)]
    pub vault_secret_definitions: Vec<VaultSecretDefinition>,
    pub output: TemplatizedK8sSecret,
}

fn default_refresh_threshold() -> u32 {
    DEFAULT_REFRESH_THRESHOLD
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultSecretDefinition {
    /// Unique name within the VaultSecret, used as the top-level key when templating
    pub name: String,
    pub authentication: Authentication,
    /// Vault API path of the secret, without the `/v1/` prefix
    pub path: String,
}

/// How to obtain a Vault token for one definition. Exactly one mechanism must be set.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Authentication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<KubernetesAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenAuth>,
    /// Vault Enterprise namespace used for login and reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesAuth {
    /// Mount path of the kubernetes auth method
    #[serde(default = "default_kubernetes_auth_path")]
    pub path: String,
    pub role: String,
    #[serde(default)]
    pub service_account: ServiceAccountRef,
}

fn default_kubernetes_auth_path() -> String {
    "kubernetes".to_string()
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
pub struct ServiceAccountRef {
    pub name: String,
}

impl Default for ServiceAccountRef {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenAuth {
    pub secret_ref: SecretKeyRef,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
pub struct SecretKeyRef {
    pub name: String,
    #[serde(default = "default_token_key")]
    pub key: String,
}

fn default_token_key() -> String {
    "token".to_string()
}

/// The authentication mechanism selected by an [`Authentication`] descriptor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuthMechanism<'a> {
    Kubernetes(&'a KubernetesAuth),
    Token(&'a TokenAuth),
}

impl Authentication {
    pub fn mechanism(&self) -> Result<AuthMechanism<'_>> {
        match (&self.kubernetes, &self.token) {
            (Some(kubernetes), None) => Ok(AuthMechanism::Kubernetes(kubernetes)),
            (None, Some(token)) => Ok(AuthMechanism::Token(token)),
            (None, None) => Err(SyncError::InvalidSpec(
                "authentication must configure one of kubernetes or token".to_string(),
            )),
            (Some(_), Some(_)) => Err(SyncError::InvalidSpec(
                "authentication must configure only one of kubernetes or token".to_string(),
            )),
        }
    }
}

/// Describes the Kubernetes Secret produced from the Vault data.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplatizedK8sSecret {
    pub name: String,
    #[serde(rename = "type", default = "default_secret_type")]
    pub type_: String,
    /// Output keys mapped to templates evaluated against the merged Vault data
    #[serde(default)]
    pub string_data: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

fn default_secret_type() -> String {
    "Opaque".to_string()
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultSecretStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_vault_secret_update: Option<Time>,
    /// Null when no periodic schedule could be determined
    #[serde(default)]
    pub next_vault_secret_update: Option<Time>,
    #[serde(default)]
    pub vault_secret_definitions_status: Vec<LeaseStatus>,
}

/// Lease metadata observed for one definition on the last successful sync
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaseStatus {
    pub name: String,
    /// Empty for static secrets
    #[serde(default)]
    pub lease_id: String,
    /// Lease length in seconds, 0 for static secrets
    #[serde(default)]
    pub lease_duration: u64,
    #[serde(default)]
    pub renewable: bool,
}

impl VaultSecret {
    /// Time of the last successful sync, if any
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.status
            .as_ref()
            .and_then(|s| s.last_vault_secret_update.as_ref())
            .map(|t| t.0)
    }

    /// Planned time of the next sync, if one was scheduled
    pub fn next_sync(&self) -> Option<DateTime<Utc>> {
        self.status
            .as_ref()
            .and_then(|s| s.next_vault_secret_update.as_ref())
            .map(|t| t.0)
    }

    pub fn lease_statuses(&self) -> &[LeaseStatus] {
        self.status
            .as_ref()
            .map(|s| s.vault_secret_definitions_status.as_slice())
            .unwrap_or_default()
    }

    /// Most recently recorded reconcile condition
    pub fn last_condition(&self) -> Option<&Condition> {
        self.status.as_ref().and_then(|s| s.conditions.last())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    fn make_auth(kubernetes: bool, token: bool) -> Authentication {
        Authentication {
            kubernetes: kubernetes.then(|| KubernetesAuth {
                path: "kubernetes".to_string(),
                role: "reader".to_string(),
                service_account: ServiceAccountRef::default(),
            }),
            token: token.then(|| TokenAuth {
                secret_ref: SecretKeyRef {
                    name: "vault-token".to_string(),
                    key: "token".to_string(),
                },
            }),
            namespace: None,
        }
    }

    #[test]
    fn test_mechanism_kubernetes() {
        let auth = make_auth(true, false);
        assert!(matches!(auth.mechanism(), Ok(AuthMechanism::Kubernetes(k)) if k.role == "reader"));
    }

    #[test]
    fn test_mechanism_token() {
        let auth = make_auth(false, true);
        assert!(matches!(auth.mechanism(), Ok(AuthMechanism::Token(_))));
    }

    #[test]
    fn test_mechanism_requires_exactly_one() {
        assert!(matches!(
            make_auth(false, false).mechanism(),
            Err(SyncError::InvalidSpec(_))
        ));
        assert!(matches!(
            make_auth(true, true).mechanism(),
            Err(SyncError::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_spec_defaults_from_json() {
        let spec: VaultSecretSpec = serde_json::from_value(serde_json::json!({
            "vaultSecretDefinitions": [{
                "name": "db",
                "path": "database/creds/app",
                "authentication": { "kubernetes": { "role": "app" } }
            }],
            "output": {
                "name": "db-creds",
                "stringData": { "password": "{{ .db.password }}" }
            }
        }))
        .unwrap();

        assert_eq!(spec.refresh_threshold, 90);
        assert_eq!(spec.refresh_period, None);
        assert_eq!(spec.output.type_, "Opaque");
        let kubernetes = spec.vault_secret_definitions[0]
            .authentication
            .kubernetes
            .as_ref()
            .unwrap();
        assert_eq!(kubernetes.path, "kubernetes");
        assert_eq!(kubernetes.service_account.name, "default");
    }

    #[test]
    fn test_status_accessors_without_status() {
        let vs = VaultSecret {
            metadata: ObjectMeta {
                name: Some("example".to_string()),
                ..Default::default()
            },
            spec: VaultSecretSpec {
                refresh_period: None,
                refresh_threshold: 90,
                vault_secret_definitions: vec![],
                output: TemplatizedK8sSecret {
                    name: "out".to_string(),
                    type_: "Opaque".to_string(),
                    string_data: BTreeMap::new(),
                    labels: BTreeMap::new(),
                    annotations: BTreeMap::new(),
                },
            },
            status: None,
        };

        assert_eq!(vs.last_sync(), None);
        assert_eq!(vs.next_sync(), None);
        assert!(vs.lease_statuses().is_empty());
        assert!(vs.last_condition().is_none());
    }

    #[test]
    fn test_status_serializes_null_next_sync() {
        let status = VaultSecretStatus::default();
        let json = serde_json::to_value(&status).unwrap();
        assert!(json.get("nextVaultSecretUpdate").unwrap().is_null());
    }

    #[test]
    fn test_crd_manifest() {
        use kube::CustomResourceExt;

        let crd = VaultSecret::crd();
        assert_eq!(crd.spec.group, "redhatcop.redhat.io");
        assert_eq!(crd.spec.names.kind, "VaultSecret");
        assert_eq!(crd.spec.names.plural, "vaultsecrets");
        assert_eq!(crd.spec.names.short_names, Some(vec!["vsec".to_string()]));
        assert_eq!(crd.spec.scope, "Namespaced");

        let version = &crd.spec.versions[0];
        assert_eq!(version.name, "v1alpha1");
        assert!(version
            .subresources
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .is_some());

        let schema = serde_json::to_value(&version.schema).unwrap();
        let status = &schema["openAPIV3Schema"]["properties"]["status"]["properties"];
        assert!(status["conditions"]["items"]["properties"]["lastTransitionTime"].is_object());
        assert!(status["lastVaultSecretUpdate"].is_object());
        assert!(status["nextVaultSecretUpdate"].is_object());
    }
}
