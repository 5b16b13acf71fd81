// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Project merged Vault data through the output templates.

use crate::error::{Result, SyncError};
use crate::sync::template::Template;
use crate::types::TemplatizedK8sSecret;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Output document produced by the renderer, before it is written to the cluster
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderedSecret {
    pub name: String,
    pub type_: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub data: BTreeMap<String, String>,
}

/// Evaluate every `stringData` template against the merged map.
///
/// Metadata is copied from the spec as-is. A single failing field fails the whole render.
pub fn render(
    output: &TemplatizedK8sSecret,
    merged: &Map<String, Value>,
) -> Result<RenderedSecret> {
    let root = Value::Object(merged.clone());

    let data = output
        .string_data
        .iter()
        .map(|(key, source)| {
            Template::parse(source)
                .and_then(|template| template.execute(&root))
                .map(|value| (key.clone(), value))
                .map_err(|e| match e {
                    SyncError::TemplateError(m) => {
                        SyncError::TemplateError(format!("stringData '{}': {}", key, m))
                    }
                    other => other,
                })
        })
        .collect::<Result<BTreeMap<_, _>>>()?;

    Ok(RenderedSecret {
        name: output.name.clone(),
        type_: output.type_.clone(),
        labels: output.labels.clone(),
        annotations: output.annotations.clone(),
        data,
    })
}
