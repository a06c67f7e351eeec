//! Renderer Settings
//!
//! Configuration of the per-frame loop driven by
//! [`Renderer::render`](crate::renderer::Renderer::render).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sceneweave::renderer::settings::RendererSettings;
//!
//! let settings = RendererSettings {
//!     clear_color: glam::Vec4::new(0.1, 0.1, 0.1, 1.0),
//!     ..Default::default()
//! };
//! ```

use glam::Vec4;
use serde::{Deserialize, Serialize};

/// Frame loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Clear color of the main view and of the empty view rendered while the
    /// camera is inactive.
    ///
    /// Default: transparent black, so the camera feed behind the surface shows.
    pub clear_color: Vec4,

    /// Whether mirror targets are cleared before receiving a letterboxed frame.
    ///
    /// Default: `true`
    pub mirror_clear: bool,

    /// Whether the cleanup registry is polled at the end of every frame.
    /// When disabled the host must call
    /// [`ResourceManager::reclaim_released_resources`](crate::assets::holder::ResourceManager::reclaim_released_resources)
    /// itself.
    ///
    /// Default: `true`
    pub reclaim_every_frame: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            clear_color: Vec4::ZERO,
            mirror_clear: true,
            reclaim_every_frame: true,
        }
    }
}
