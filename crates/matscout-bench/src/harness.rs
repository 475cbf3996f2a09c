//! Wiring a complete agent from configuration.

use std::sync::Arc;

use tracing::info;

use matscout_config::HarnessConfig;
use matscout_contracts::error::HarnessResult;
use matscout_core::{
    traits::{ChatBackend, TraceSink},
    AgentLoop,
};
use matscout_store::MaterialStore;
use matscout_tools::{shared, standard_registry, SharedStore};

use crate::{
    sample_data::{sample_store, TableShape},
    scripted::CannedSearch,
};

/// An agent together with a handle to the store its tools share.
pub struct Harness {
    pub agent: AgentLoop,
    pub store: SharedStore,
}

/// The configured store file, or the built-in scalar table when none is set.
pub fn load_store(config: &HarnessConfig) -> HarnessResult<MaterialStore> {
    let settings = config.store_settings();
    match &config.store.path {
        Some(path) => MaterialStore::load(path, settings),
        None => sample_store(TableShape::Scalar, settings),
    }
}

/// Build an agent over `backend` with the standard tools, the configured
/// store, and canned search services, tracing into `sink`.
pub fn build_harness(
    config: &HarnessConfig,
    backend: Arc<dyn ChatBackend>,
    sink: Arc<dyn TraceSink>,
) -> HarnessResult<Harness> {
    let store = shared(load_store(config)?);
    let registry = standard_registry(
        Arc::clone(&store),
        Arc::new(CannedSearch::encyclopedia()),
        Arc::new(CannedSearch::archive()),
        Arc::clone(&sink),
    )?;

    info!(
        tools = registry.len(),
        store = ?config.store.path,
        max_steps = config.agent.max_steps,
        "harness assembled"
    );

    let agent = AgentLoop::new(
        backend,
        Arc::new(registry),
        sink,
        config.generation_options(),
        config.agent_settings(),
    );
    Ok(Harness { agent, store })
}
