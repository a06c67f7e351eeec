//! Scene graph
//!
//! - Scene: node storage, hierarchy, traversal and touch dispatch
//! - Node: name, transform, activity and attachments
//! - Transform / TransformSystem: local and world matrices
//! - Camera: driven by tracking frames
//! - Light: light parameters mirrored to native lights
//! - AnchorBinding: nodes following tracked anchors
//! - RenderableInstance / LightInstance: native entities of attachments

pub mod anchor;
pub mod camera;
pub mod collision;
pub mod instance;
pub mod light;
pub mod node;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod touch;
pub mod transform;
pub mod transform_system;

pub use anchor::AnchorBinding;
pub use camera::Camera;
pub use collision::{CollisionShape, HitTestResult, Ray};
pub use instance::{LightInstance, RenderableInstance};
pub use light::Light;
pub use node::{Node, NodeKind, NodeTouchListener};
pub use scene::Scene;
pub use touch::{
    MotionAction, MotionEvent, NodeTouchEvent, Pointer, PointerIds, SceneTouchListener, TouchTarget,
};
pub use transform::Transform;

use slotmap::new_key_type;

new_key_type! {
    pub struct NodeHandle;
}
