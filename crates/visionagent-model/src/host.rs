//! Process-wide model host
//!
//! The loaded engine is read-only and shared by every pipeline call. It is
//! installed once with `load()` and dropped with `release()` on shutdown.

use crate::engine::DualStreamEngine;
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;
use tracing::info;
use visionagent_core::{Error, Result};

pub type EngineHandle = Arc<RwLock<Option<Arc<DualStreamEngine>>>>;

#[derive(Clone, Default)]
pub struct ModelHost {
    handle: EngineHandle,
}

static GLOBAL: OnceLock<ModelHost> = OnceLock::new();

impl ModelHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// The host shared by the whole process.
    pub fn global() -> &'static ModelHost {
        GLOBAL.get_or_init(ModelHost::new)
    }

    /// Install an engine. Replaces a previously loaded one.
    pub async fn load(&self, engine: DualStreamEngine) -> Arc<DualStreamEngine> {
        let engine = Arc::new(engine);
        info!(
            "model loaded: {} v{}",
            engine.architecture(),
            engine.model_version()
        );
        *self.handle.write().await = Some(engine.clone());
        engine
    }

    pub async fn engine(&self) -> Result<Arc<DualStreamEngine>> {
        self.handle
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::inference("model", "no model loaded"))
    }

    pub async fn is_loaded(&self) -> bool {
        self.handle.read().await.is_some()
    }

    /// Drop the host's reference. Calls already holding the engine finish
    /// normally; new calls fail until the next `load()`.
    pub async fn release(&self) -> bool {
        let released = self.handle.write().await.take().is_some();
        if released {
            info!("model released");
        }
        released
    }
}
