// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Minimal Vault HTTP API client: kubernetes login and logical reads.

use crate::error::{Result, SyncError};
use crate::sync::SecretRead;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};
use url::Url;

const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    auth: Option<LoginAuth>,
}

#[derive(Debug, Deserialize)]
struct LoginAuth {
    client_token: String,
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    data: Option<Map<String, Value>>,
    #[serde(default)]
    lease_id: String,
    #[serde(default)]
    lease_duration: u64,
    #[serde(default)]
    renewable: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Clone)]
pub struct VaultClient {
    http: Client,
    address: Url,
}

impl VaultClient {
    pub fn new(address: Url, skip_verify: bool) -> Result<Self> {
        let http = Client::builder()
            .danger_accept_invalid_certs(skip_verify)
            .build()
            .map_err(|e| {
                SyncError::SourceUnavailable(format!("failed to create HTTP client: {}", e))
            })?;

        // Url::join replaces the last segment unless the base ends with a slash
        let mut address = address;
        if !address.path().ends_with('/') {
            let path = format!("{}/", address.path());
            address.set_path(&path);
        }

        Ok(Self { http, address })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.address
            .join(&format!("v1/{}", path.trim_start_matches('/')))
            .map_err(|e| SyncError::InvalidSpec(format!("invalid Vault path '{}': {}", path, e)))
    }

    /// Exchange a service account JWT for a Vault token through the kubernetes auth method
    #[instrument(skip(self, jwt))]
    pub async fn login_kubernetes(
        &self,
        mount: &str,
        role: &str,
        jwt: &str,
        namespace: Option<&str>,
    ) -> Result<String> {
        let url = self
            .endpoint(&format!("auth/{}/login", mount.trim_matches('/')))
            .map_err(|e| SyncError::Authentication(e.to_string()))?;

        let mut request = self.http.post(url).json(&json!({ "role": role, "jwt": jwt }));
        if let Some(namespace) = namespace {
            request = request.header(NAMESPACE_HEADER, namespace);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Authentication(format!("login request failed: {}", e)))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| {
                SyncError::Authentication(format!("failed to read login response: {}", e))
            })?;

        debug!("Vault login returned {}", status);
        parse_login_response(status, &body)
    }

    /// Read a logical path with a session token
    #[instrument(skip(self, token))]
    pub async fn read(
        &self,
        token: &str,
        namespace: Option<&str>,
        path: &str,
    ) -> Result<SecretRead> {
        let url = self.endpoint(path)?;

        let mut request = self.http.get(url).header(TOKEN_HEADER, token);
        if let Some(namespace) = namespace {
            request = request.header(NAMESPACE_HEADER, namespace);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::SourceUnavailable(format!("{}: {}", path, e)))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::SourceUnavailable(format!("{}: {}", path, e)))?;

        debug!("Vault read returned {}", status);
        parse_read_response(status, &body, path)
    }
}

fn vault_errors(body: &str) -> String {
    let errors = serde_json::from_str::<ErrorResponse>(body)
        .unwrap_or_default()
        .errors;
    if errors.is_empty() {
        "no error details".to_string()
    } else {
        errors.join("; ")
    }
}

/// Any unsuccessful login is an authentication failure
fn parse_login_response(status: u16, body: &str) -> Result<String> {
    if !(200..300).contains(&status) {
        return Err(SyncError::Authentication(format!(
            "login rejected with status {}: {}",
            status,
            vault_errors(body)
        )));
    }

    serde_json::from_str::<LoginResponse>(body)
        .ok()
        .and_then(|r| r.auth)
        .map(|auth| auth.client_token)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| SyncError::Authentication("login response has no client token".to_string()))
}

fn parse_read_response(status: u16, body: &str, path: &str) -> Result<SecretRead> {
    match status {
        200..=299 => {
            let response: ReadResponse = serde_json::from_str(body).map_err(|e| {
                SyncError::SourceUnavailable(format!("{}: malformed response: {}", path, e))
            })?;
            let value = response.data.ok_or_else(|| {
                SyncError::SourceNotFound(format!("{}: response has no data", path))
            })?;
            Ok(SecretRead {
                value,
                lease_id: response.lease_id,
                lease_duration: response.lease_duration,
                renewable: response.renewable,
            })
        }
        404 => Err(SyncError::SourceNotFound(path.to_string())),
        401 | 403 => Err(SyncError::Authentication(format!(
            "{}: status {}: {}",
            path,
            status,
            vault_errors(body)
        ))),
        _ => Err(SyncError::SourceUnavailable(format!(
            "{}: status {}: {}",
            path,
            status,
            vault_errors(body)
        ))),
    }
}
