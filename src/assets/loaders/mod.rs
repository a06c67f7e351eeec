//! Asset loaders
//!
//! Each loader turns an [`AssetLocation`] into a
//! [`Renderable`](crate::resources::renderable::Renderable) through a staged
//! pipeline. Reading and parsing run on the loader pool; everything that
//! creates native objects runs on the render thread.

pub mod bundle;
#[cfg(feature = "gltf")]
pub mod gltf;

use std::cell::Cell;
use std::sync::Arc;

use crate::engine::EngineContext;
use crate::errors::{Error, LoadStage, Result};
use crate::resources::renderable::AssetLocation;

/// Stage bookkeeping for one load.
///
/// Errors passed through [`LoadRequest::fail`] are tagged with the stage the
/// request was in.
pub struct LoadRequest {
    name: String,
    stage: Cell<LoadStage>,
}

impl LoadRequest {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        log::debug!("{name}: {}", LoadStage::Requested);
        Self {
            name,
            stage: Cell::new(LoadStage::Requested),
        }
    }

    pub fn enter(&self, stage: LoadStage) {
        log::debug!("{}: {} -> {stage}", self.name, self.stage.get());
        self.stage.set(stage);
    }

    #[must_use]
    pub fn stage(&self) -> LoadStage {
        self.stage.get()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tags `error` with the current stage.
    #[must_use]
    pub fn fail(&self, error: Error) -> Error {
        let stage = self.stage.get();
        log::debug!("{}: failed during {stage}: {error}", self.name);
        error.in_stage(stage)
    }
}

/// Reads the bytes behind `location`.
pub async fn fetch(ctx: &EngineContext, location: &AssetLocation) -> Result<Arc<[u8]>> {
    match location {
        AssetLocation::Uri(uri) => Ok(ctx.read_bytes(uri).await?.into()),
        AssetLocation::Bytes { bytes, .. } => Ok(Arc::clone(bytes)),
    }
}
