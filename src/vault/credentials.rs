// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes-side credentials used to obtain a Vault token.

use crate::error::{Result, SyncError};
use crate::types::vault_secret::SecretKeyRef;
use k8s_openapi::api::authentication::v1::{TokenRequest, TokenRequestSpec};
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use kube::api::PostParams;
use kube::{Api, Client};
use tracing::{debug, instrument};

/// Lifetime of the service account token handed to Vault. It is only used for the login.
const TOKEN_EXPIRATION_SECS: i64 = 600;

/// Request a short-lived token for `service_account` through the TokenRequest API
#[instrument(skip(client))]
pub async fn service_account_token(
    client: &Client,
    namespace: &str,
    service_account: &str,
) -> Result<String> {
    let api: Api<ServiceAccount> = Api::namespaced(client.clone(), namespace);
    let request = TokenRequest {
        spec: TokenRequestSpec {
            expiration_seconds: Some(TOKEN_EXPIRATION_SECS),
            ..Default::default()
        },
        ..Default::default()
    };
    let body = serde_json::to_vec(&request)
        .map_err(|e| SyncError::Authentication(format!("failed to encode TokenRequest: {}", e)))?;

    let response: TokenRequest = api
        .create_subresource("token", service_account, &PostParams::default(), body)
        .await
        .map_err(|e| {
            SyncError::Authentication(format!(
                "token request for service account {}/{} failed: {}",
                namespace, service_account, e
            ))
        })?;

    debug!("Obtained service account token");
    response
        .status
        .map(|status| status.token)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            SyncError::Authentication(format!(
                "token request for service account {}/{} returned no token",
                namespace, service_account
            ))
        })
}

/// Read a Vault token stored in a Kubernetes Secret
#[instrument(skip(client), fields(secret = %secret_ref.name, key = %secret_ref.key))]
pub async fn token_from_secret(
    client: &Client,
    namespace: &str,
    secret_ref: &SecretKeyRef,
) -> Result<String> {
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = api
        .get_opt(&secret_ref.name)
        .await
        .map_err(|e| {
            SyncError::Authentication(format!(
                "failed to read token secret {}/{}: {}",
                namespace, secret_ref.name, e
            ))
        })?
        .ok_or_else(|| {
            SyncError::Authentication(format!(
                "token secret {}/{} not found",
                namespace, secret_ref.name
            ))
        })?;

    let bytes = secret
        .data
        .as_ref()
        .and_then(|data| data.get(&secret_ref.key))
        .map(|value| value.0.clone())
        .or_else(|| {
            secret
                .string_data
                .as_ref()
                .and_then(|data| data.get(&secret_ref.key))
                .map(|value| value.clone().into_bytes())
        })
        .ok_or_else(|| {
            SyncError::Authentication(format!(
                "token secret {}/{} has no key '{}'",
                namespace, secret_ref.name, secret_ref.key
            ))
        })?;

    let token = String::from_utf8(bytes)
        .map_err(|_| SyncError::Authentication("token is not valid UTF-8".to_string()))?;
    let token = token.trim();
    if token.is_empty() {
        return Err(SyncError::Authentication(format!(
            "token secret {}/{} key '{}' is empty",
            namespace, secret_ref.name, secret_ref.key
        )));
    }
    Ok(token.to_string())
}
