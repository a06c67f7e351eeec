//! Native Rendering Engine Abstraction
//!
//! Everything above this module talks to the GPU exclusively through the
//! [`Engine`] trait. An implementation wraps a concrete native renderer; the
//! crate ships [`headless::HeadlessEngine`], an in-process implementation that
//! allocates handles and journals every call.
//!
//! # Threading
//!
//! An `Engine` is owned by the render thread. Implementations are not required
//! to be `Send`, and callers reach them only through
//! [`EngineContext`](crate::engine::EngineContext).
//!
//! # Handles
//!
//! All native objects are identified by `slotmap` keys. A handle is only valid
//! between its `create_*` and `destroy_*` calls; using it afterwards is a
//! programmer error.

pub mod headless;

use std::ops::Range;
use std::sync::Arc;

use bitflags::bitflags;
use glam::{Mat4, Vec3, Vec4};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::errors::Result;

new_key_type! {
    pub struct SwapChainHandle;
    pub struct RendererHandle;
    pub struct NativeSceneHandle;
    pub struct ViewHandle;
    pub struct CameraHandle;
    pub struct VertexBufferHandle;
    pub struct IndexBufferHandle;
    pub struct TextureHandle;
    pub struct MaterialHandle;
    pub struct MaterialInstanceHandle;
    pub struct EntityHandle;
    pub struct GltfAssetHandle;
}

/// Host-provided identity of a presentable surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

/// Host-provided identity of an external (streamed) texture, e.g. a camera
/// feed or a rasterized 2D view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExternalTextureHandle(pub u64);

/// Pixel rectangle with a bottom-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub left: i32,
    pub bottom: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    #[must_use]
    pub const fn new(left: i32, bottom: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            bottom,
            width,
            height,
        }
    }

    #[inline]
    #[must_use]
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f32 / self.height as f32
    }
}

// ============================================================================
// Geometry descriptors
// ============================================================================

bitflags! {
    /// Per-vertex attributes present in a vertex buffer.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct VertexAttributes: u32 {
        const POSITION     = 1 << 0;
        /// Tangent frame encoded as a unit quaternion.
        const TANGENTS     = 1 << 1;
        const UV0          = 1 << 2;
        const COLOR        = 1 << 3;
        const BONE_INDICES = 1 << 4;
        const BONE_WEIGHTS = 1 << 5;
    }
}

impl VertexAttributes {
    /// Byte stride of one interleaved vertex with these attributes.
    #[must_use]
    pub fn stride(self) -> usize {
        let mut stride = 0;
        if self.contains(Self::POSITION) {
            stride += 12;
        }
        if self.contains(Self::TANGENTS) {
            stride += 16;
        }
        if self.contains(Self::UV0) {
            stride += 8;
        }
        if self.contains(Self::COLOR) {
            stride += 16;
        }
        if self.contains(Self::BONE_INDICES) {
            stride += 8;
        }
        if self.contains(Self::BONE_WEIGHTS) {
            stride += 16;
        }
        stride
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    /// Picks the narrowest format able to address `vertex_count` vertices.
    #[must_use]
    pub fn for_vertex_count(vertex_count: usize) -> Self {
        if vertex_count <= usize::from(u16::MAX) {
            Self::U16
        } else {
            Self::U32
        }
    }

    #[must_use]
    pub fn byte_size(self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// Axis-aligned box as center and half extents.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aabb {
    pub center: Vec3,
    pub half_extents: Vec3,
}

impl Aabb {
    #[must_use]
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self {
            center: (min + max) * 0.5,
            half_extents: (max - min) * 0.5,
        }
    }

    #[must_use]
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self::from_min_max(min, max))
    }

    #[inline]
    #[must_use]
    pub fn min(&self) -> Vec3 {
        self.center - self.half_extents
    }

    #[inline]
    #[must_use]
    pub fn max(&self) -> Vec3 {
        self.center + self.half_extents
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> Vec3 {
        self.half_extents * 2.0
    }
}

/// One draw range of a renderable entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    pub indices: Range<u32>,
    pub material_instance: MaterialInstanceHandle,
    /// Blend order override within the entity, `None` keeps submesh order.
    pub blend_order: Option<u16>,
}

/// Everything the native renderable manager needs for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderableDescriptor {
    pub vertex_buffer: VertexBufferHandle,
    pub index_buffer: IndexBufferHandle,
    pub primitives: Vec<Primitive>,
    pub bounding_box: Aabb,
    pub priority: u8,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
    pub bone_count: u32,
}

// ============================================================================
// Texture descriptors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterMode {
    Nearest,
    Linear,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapLinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WrapMode {
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

/// Sampler state bound alongside a texture parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sampler {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub wrap_r: WrapMode,
}

impl Default for Sampler {
    fn default() -> Self {
        Self {
            min_filter: FilterMode::LinearMipmapLinear,
            mag_filter: FilterMode::Linear,
            wrap_s: WrapMode::ClampToEdge,
            wrap_t: WrapMode::ClampToEdge,
            wrap_r: WrapMode::ClampToEdge,
        }
    }
}

/// GPU-side storage format of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGBA, sRGB encoded color.
    Srgb8A8,
    /// 8-bit RGBA, linear.
    Rgba8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub mip_levels: u32,
}

// ============================================================================
// Material descriptors
// ============================================================================

/// Materials the engine provides without a compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinMaterial {
    OpaqueColor,
    OpaqueTexture,
    TransparentColor,
    TransparentTexture,
    /// Unlit quad sampling an external texture, used for view renderables.
    ViewSurface,
}

impl BuiltinMaterial {
    /// Parameter names declared by the built-in program.
    #[must_use]
    pub fn parameter_names(self) -> &'static [&'static str] {
        match self {
            Self::OpaqueColor | Self::TransparentColor => {
                &["color", "metallic", "roughness", "reflectance"]
            }
            Self::OpaqueTexture | Self::TransparentTexture => {
                &["texture", "metallic", "roughness", "reflectance"]
            }
            Self::ViewSurface => &["viewTexture", "offsetUv"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterialSource {
    Builtin(BuiltinMaterial),
    /// Compiled program bytes produced by the engine's material compiler.
    Compiled(Arc<[u8]>),
}

/// A compiled material as reported by the engine.
#[derive(Debug, Clone)]
pub struct NativeMaterial {
    pub handle: MaterialHandle,
    /// Names of every parameter the program declares.
    pub parameters: Vec<String>,
}

/// A value pushed into a native material instance.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Bool(bool),
    Bool2([bool; 2]),
    Bool3([bool; 3]),
    Bool4([bool; 4]),
    Int(i32),
    Int2([i32; 2]),
    Int3([i32; 3]),
    Int4([i32; 4]),
    Float(f32),
    Float2([f32; 2]),
    Float3([f32; 3]),
    Float4([f32; 4]),
    Texture {
        texture: TextureHandle,
        sampler: Sampler,
    },
    ExternalTexture(ExternalTextureHandle),
}

// ============================================================================
// Light descriptors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    Directional,
    Point,
    Spot,
    FocusedSpot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightDescriptor {
    pub light_type: LightType,
    pub color: Vec3,
    pub intensity: f32,
    pub falloff_radius: f32,
    pub inner_cone_angle: f32,
    pub outer_cone_angle: f32,
    pub cast_shadows: bool,
    pub position: Vec3,
    pub direction: Vec3,
}

// ============================================================================
// glTF asset loader
// ============================================================================

/// Result of handing a glTF container to the engine's asset loader.
#[derive(Debug, Clone)]
pub struct GltfAssetInfo {
    pub asset: GltfAssetHandle,
    /// Bounds over all primitives, `None` if the loader could not compute them.
    pub bounding_box: Option<Aabb>,
    pub animation_names: Vec<String>,
}

// ============================================================================
// Engine trait
// ============================================================================

/// The contract the core depends on for every native call.
pub trait Engine {
    // --- presentation ---
    fn create_swap_chain(&mut self, surface: SurfaceHandle) -> Result<SwapChainHandle>;
    fn destroy_swap_chain(&mut self, swap_chain: SwapChainHandle);
    fn create_renderer(&mut self) -> Result<RendererHandle>;
    fn destroy_renderer(&mut self, renderer: RendererHandle);
    fn create_scene(&mut self) -> Result<NativeSceneHandle>;
    fn destroy_scene(&mut self, scene: NativeSceneHandle);
    fn create_camera(&mut self) -> Result<CameraHandle>;
    fn destroy_camera(&mut self, camera: CameraHandle);
    fn set_camera_matrices(&mut self, camera: CameraHandle, view: Mat4, projection: Mat4);
    fn create_view(&mut self, scene: NativeSceneHandle, camera: CameraHandle) -> Result<ViewHandle>;
    fn destroy_view(&mut self, view: ViewHandle);
    fn set_view_viewport(&mut self, view: ViewHandle, viewport: Viewport);
    fn set_view_clear_color(&mut self, view: ViewHandle, color: Vec4);

    // --- geometry ---
    fn create_vertex_buffer(
        &mut self,
        attributes: VertexAttributes,
        vertex_count: usize,
    ) -> Result<VertexBufferHandle>;
    fn update_vertex_buffer(&mut self, buffer: VertexBufferHandle, bytes: &[u8]);
    fn destroy_vertex_buffer(&mut self, buffer: VertexBufferHandle);
    fn create_index_buffer(
        &mut self,
        format: IndexFormat,
        index_count: usize,
    ) -> Result<IndexBufferHandle>;
    fn update_index_buffer(&mut self, buffer: IndexBufferHandle, bytes: &[u8]);
    fn destroy_index_buffer(&mut self, buffer: IndexBufferHandle);

    // --- textures ---
    fn create_texture(&mut self, desc: &TextureDescriptor, pixels: &[u8]) -> Result<TextureHandle>;
    fn destroy_texture(&mut self, texture: TextureHandle);

    // --- materials ---
    fn create_material(&mut self, source: &MaterialSource) -> Result<NativeMaterial>;
    fn destroy_material(&mut self, material: MaterialHandle);
    fn create_material_instance(&mut self, material: MaterialHandle) -> Result<MaterialInstanceHandle>;
    fn destroy_material_instance(&mut self, instance: MaterialInstanceHandle);
    fn set_material_parameter(
        &mut self,
        instance: MaterialInstanceHandle,
        name: &str,
        value: &ParameterValue,
    );

    // --- entities ---
    fn create_entity(&mut self) -> EntityHandle;
    fn destroy_entity(&mut self, entity: EntityHandle);
    fn set_renderable(&mut self, entity: EntityHandle, desc: &RenderableDescriptor) -> Result<()>;
    fn remove_renderable(&mut self, entity: EntityHandle);
    fn set_light(&mut self, entity: EntityHandle, desc: &LightDescriptor) -> Result<()>;
    fn remove_light(&mut self, entity: EntityHandle);
    fn scene_add_entity(&mut self, scene: NativeSceneHandle, entity: EntityHandle);
    fn scene_remove_entity(&mut self, scene: NativeSceneHandle, entity: EntityHandle);

    // --- transforms ---
    fn open_transform_transaction(&mut self);
    fn set_world_transform(&mut self, entity: EntityHandle, world: Mat4);
    fn commit_transform_transaction(&mut self);

    // --- glTF assets ---
    fn create_gltf_asset(
        &mut self,
        container: &[u8],
        resources: &FxHashMap<String, Vec<u8>>,
    ) -> Result<GltfAssetInfo>;
    fn destroy_gltf_asset(&mut self, asset: GltfAssetHandle);
    /// Instantiates the asset's entity tree and returns its root entity.
    fn instantiate_gltf_asset(&mut self, asset: GltfAssetHandle) -> Result<EntityHandle>;
    fn destroy_gltf_instance(&mut self, root: EntityHandle);

    // --- frame ---
    /// Returns `false` when the native renderer wants this frame skipped.
    fn begin_frame(&mut self, renderer: RendererHandle, swap_chain: SwapChainHandle) -> bool;
    fn render(&mut self, renderer: RendererHandle, view: ViewHandle);
    fn mirror_frame(
        &mut self,
        renderer: RendererHandle,
        target: SwapChainHandle,
        destination: Viewport,
        source: Viewport,
        clear: bool,
    );
    fn end_frame(&mut self, renderer: RendererHandle);
}
