//! Application state.

use std::sync::Arc;

use vidgen_queue::{transport_from_env, QueueTransport};
use vidgen_store::{store_from_env, TaskStore};

use crate::config::ApiConfig;
use crate::services::TaskOrchestrator;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn TaskStore>,
    pub transport: Arc<dyn QueueTransport>,
    pub orchestrator: TaskOrchestrator,
}

impl AppState {
    /// Create new application state with backends chosen from the
    /// environment.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store = store_from_env()?;
        let transport = transport_from_env()?;
        transport.init().await?;

        let orchestrator = TaskOrchestrator::new(Arc::clone(&store), Arc::clone(&transport));

        Ok(Self {
            config,
            store,
            transport,
            orchestrator,
        })
    }

    /// State backed by explicit components (tests).
    pub fn with_components(
        config: ApiConfig,
        store: Arc<dyn TaskStore>,
        transport: Arc<dyn QueueTransport>,
    ) -> Self {
        let orchestrator = TaskOrchestrator::new(Arc::clone(&store), Arc::clone(&transport));
        Self {
            config,
            store,
            transport,
            orchestrator,
        }
    }
}
