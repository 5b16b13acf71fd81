// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Vault secret synchronization: schedule, read, render and write.

pub mod aggregate;
pub mod engine;
pub mod output;
pub mod render;
pub mod schedule;
pub mod source;
pub mod template;

pub use aggregate::{aggregate, Aggregate};
pub use engine::{
    EngineSettings, ForceReason, Requeue, SyncEngine, SyncOutcome, SyncState, Trigger,
};
pub use output::{commit, KubeOutputStore, OutputStore};
pub use render::{render, RenderedSecret};
pub use source::{read_definition, SecretRead, SecretSource};
pub use template::Template;
