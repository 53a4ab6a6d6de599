//! listbatch CLI - run batch plans against the in-memory list store
//!
//! The binary is a thin wrapper over this library:
//! - `plan` parses plan files, seeds a `MemoryListStore` and checks drafts
//! - `report` renders summaries for terminals
//! - `resolve_config` and `run` tie plan, config file and flags together

#![warn(unreachable_pub)]

pub mod plan;
pub mod report;

use anyhow::Result;
use listbatch_core::{BatchOrchestrator, BatchSummary, EngineConfig};
use std::path::Path;
use std::sync::Arc;

pub use plan::{check, CheckReport, Plan};

/// Exit code when the batch ran but some operation failed
pub const EXIT_OPERATIONS_FAILED: u8 = 2;

/// Overrides collected from command-line flags
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// `--chunk-size`
    pub chunk_size: Option<usize>,
    /// `--concurrent`
    pub concurrent: bool,
}

/// Merge engine settings
///
/// Precedence, lowest first: defaults, the plan's `engine` block, the
/// `--config` TOML file, then flags.
pub fn resolve_config(
    plan: &Plan,
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<EngineConfig> {
    let mut config = plan.engine.clone().unwrap_or_default();
    if let Some(path) = config_path {
        config = config.overlay_file(path)?;
    }
    if let Some(chunk_size) = overrides.chunk_size {
        config = config.with_max_operations_per_chunk(chunk_size);
    }
    if overrides.concurrent {
        config = config.with_concurrent_chunks(true);
    }
    Ok(config)
}

/// Execute `plan` against a freshly seeded store
pub async fn run(plan: &Plan, config: EngineConfig) -> Result<BatchSummary> {
    let store = plan.build_store()?;
    let mut orchestrator = BatchOrchestrator::with_config(Arc::new(store), config);
    plan.queue(&orchestrator);
    tracing::info!(operations = orchestrator.len(), "running plan");
    Ok(orchestrator.execute().await?)
}
