#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod assets;
pub mod backend;
pub mod engine;
pub mod errors;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod tracking;
pub mod view;

pub use assets::{ResourceHolder, ResourceManager, ResourceRegistry};
pub use engine::{EngineContext, EngineSettings, RenderDispatcher};
pub use errors::{Error, LoadStage, Result};
pub use renderer::{FrameOutcome, FrameStats, Renderer, SkipReason, letterbox_viewport};
pub use resources::{Material, Renderable, RenderableDefinition, Texture, material_factory, primitives};
pub use scene::{Camera, Light, Node, NodeHandle, Scene};
pub use tracking::{Pose, TrackingFrame, TrackingState};
pub use view::SceneView;
