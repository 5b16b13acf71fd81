// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Secret not found: {0}")]
    SourceNotFound(String),

    #[error("Secret source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("Output write failed: {0}")]
    OutputWriteError(String),

    #[error("Invalid spec: {0}")]
    InvalidSpec(String),

    #[error("Deadline exceeded: {0}")]
    Timeout(String),
}

impl SyncError {
    /// Condition reason recorded on the VaultSecret status for this error
    pub fn reason(&self) -> &'static str {
        match self {
            SyncError::KubeError(_) => "KubernetesApiError",
            SyncError::Authentication(_) => "AuthenticationFailed",
            SyncError::SourceNotFound(_) => "SecretNotFound",
            SyncError::SourceUnavailable(_) => "SourceUnavailable",
            SyncError::TemplateError(_) => "TemplateFailed",
            SyncError::OutputWriteError(_) => "OutputWriteFailed",
            SyncError::InvalidSpec(_) => "InvalidSpec",
            SyncError::Timeout(_) => "DeadlineExceeded",
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
