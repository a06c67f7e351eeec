//! Render resources
//!
//! Textures, materials and renderables, the immutable native data they share
//! and the builders that load them.

pub mod definition;
pub mod internal_data;
pub mod material;
pub mod material_factory;
pub mod parameters;
pub mod primitives;
pub mod renderable;
pub mod texture;
pub mod version_tracker;

pub use definition::{RenderableDefinition, Submesh, Vertex};
pub use internal_data::{GeometryHandles, IndexData, MeshData, RenderableInternalData};
pub use material::{Material, MaterialBuilder, MaterialInternalData};
pub use parameters::{MaterialParameter, MaterialParameters};
pub use renderable::{
    AssetLocation, HorizontalAlignment, Renderable, RenderableBuilder, RenderableKind,
    RenderableSource, VerticalAlignment, ViewConfig, ViewSize,
};
pub use texture::{DecodedImage, Texture, TextureBuilder, TextureUsage};
pub use version_tracker::{AppliedVersion, ChangeTracker};
