//! Renderable Internal Data
//!
//! The geometry payload shared by every copy of a [`Renderable`]: CPU-side
//! interleaved vertices and indices, the native vertex/index buffers built
//! from them (or, for glTF models, the native asset), submesh index ranges,
//! bounds, the model transform and animation metadata.
//!
//! Copies share one `Rc<RenderableInternalData>`. The native objects are
//! released through the cleanup registry once the last copy is gone.
//!
//! Re-uploading geometry ([`RenderableInternalData::update_mesh`]) reuses the
//! existing native buffers when they are large enough and share the layout,
//! and recreates them otherwise.
//!
//! [`Renderable`]: crate::resources::renderable::Renderable

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::ops::Range;
use std::rc::Rc;

use glam::{Mat4, Vec3};

use crate::assets::cleanup::CleanupToken;
use crate::backend::{
    Aabb, Engine, GltfAssetHandle, GltfAssetInfo, IndexBufferHandle, IndexFormat,
    VertexAttributes, VertexBufferHandle,
};
use crate::engine::EngineContext;
use crate::errors::{Error, Result};

/// Index data in the narrowest width able to address the vertices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexData {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexData {
    /// Narrows `indices` to 16 bits when `vertex_count` allows it.
    #[must_use]
    pub fn for_vertex_count(indices: Vec<u32>, vertex_count: usize) -> Self {
        match IndexFormat::for_vertex_count(vertex_count) {
            IndexFormat::U16 => Self::U16(indices.into_iter().map(|i| i as u16).collect()),
            IndexFormat::U32 => Self::U32(indices),
        }
    }

    #[must_use]
    pub fn format(&self) -> IndexFormat {
        match self {
            Self::U16(_) => IndexFormat::U16,
            Self::U32(_) => IndexFormat::U32,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::U16(v) => bytemuck::cast_slice(v),
            Self::U32(v) => bytemuck::cast_slice(v),
        }
    }

    /// Index value at `i`, widened.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<u32> {
        match self {
            Self::U16(v) => v.get(i).map(|&x| u32::from(x)),
            Self::U32(v) => v.get(i).copied(),
        }
    }
}

/// CPU-side geometry ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub attributes: VertexAttributes,
    pub vertex_count: usize,
    /// Interleaved vertices, `vertex_count * attributes.stride()` bytes.
    pub vertices: Vec<u8>,
    pub indices: IndexData,
    /// Index range of every submesh, in submesh order.
    pub submeshes: Vec<Range<u32>>,
}

impl MeshData {
    /// Checks buffer sizes and submesh ranges against each other.
    pub fn validate(&self) -> Result<()> {
        if !self.attributes.contains(VertexAttributes::POSITION) {
            return Err(Error::InvalidBundle("vertex layout lacks positions".into()));
        }
        let expected = self.vertex_count * self.attributes.stride();
        if self.vertices.len() != expected {
            return Err(Error::InvalidBundle(format!(
                "vertex data is {} bytes, layout expects {expected}",
                self.vertices.len()
            )));
        }
        if self.indices.format() != IndexFormat::for_vertex_count(self.vertex_count) {
            return Err(Error::InvalidBundle(format!(
                "{:?} indices for {} vertices",
                self.indices.format(),
                self.vertex_count
            )));
        }
        let index_count = self.indices.len() as u32;
        for (i, range) in self.submeshes.iter().enumerate() {
            if range.start > range.end || range.end > index_count {
                return Err(Error::InvalidBundle(format!(
                    "submesh {i} range {range:?} exceeds {index_count} indices"
                )));
            }
        }
        Ok(())
    }

    /// Positions decoded from the interleaved vertex bytes.
    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        let stride = self.attributes.stride().max(1);
        self.vertices.chunks_exact(stride).map(|vertex| {
            let xyz: [f32; 3] = bytemuck::pod_read_unaligned(&vertex[..12]);
            Vec3::from_array(xyz)
        })
    }
}

/// Native vertex and index buffers with the capacities they were created with.
#[derive(Debug, Clone, Copy)]
struct GpuBuffers {
    attributes: VertexAttributes,
    vertex_capacity: usize,
    vertex_buffer: VertexBufferHandle,
    index_format: IndexFormat,
    index_capacity: usize,
    index_buffer: IndexBufferHandle,
}

impl GpuBuffers {
    /// Uploads `mesh`, reusing `existing` buffers that are large enough.
    ///
    /// Replacement buffers are created before any old buffer is destroyed.
    /// On error nothing created here survives and `existing` stays valid.
    fn upload(engine: &mut dyn Engine, existing: Option<Self>, mesh: &MeshData) -> Result<Self> {
        let reuse_vertices = existing
            .filter(|b| b.attributes == mesh.attributes && b.vertex_capacity >= mesh.vertex_count);
        let (vertex_buffer, vertex_capacity) = match reuse_vertices {
            Some(b) => (b.vertex_buffer, b.vertex_capacity),
            None => {
                let capacity = mesh.vertex_count.max(1);
                (engine.create_vertex_buffer(mesh.attributes, capacity)?, capacity)
            }
        };

        let index_format = mesh.indices.format();
        let index_count = mesh.indices.len();
        let reuse_indices =
            existing.filter(|b| b.index_format == index_format && b.index_capacity >= index_count);
        let (index_buffer, index_capacity) = match reuse_indices {
            Some(b) => (b.index_buffer, b.index_capacity),
            None => {
                let capacity = index_count.max(1);
                match engine.create_index_buffer(index_format, capacity) {
                    Ok(buffer) => (buffer, capacity),
                    Err(e) => {
                        if reuse_vertices.is_none() {
                            engine.destroy_vertex_buffer(vertex_buffer);
                        }
                        return Err(e);
                    }
                }
            }
        };

        if let Some(old) = existing {
            if reuse_vertices.is_none() {
                engine.destroy_vertex_buffer(old.vertex_buffer);
            }
            if reuse_indices.is_none() {
                engine.destroy_index_buffer(old.index_buffer);
            }
        }

        engine.update_vertex_buffer(vertex_buffer, &mesh.vertices);
        engine.update_index_buffer(index_buffer, mesh.indices.as_bytes());

        Ok(Self {
            attributes: mesh.attributes,
            vertex_capacity,
            vertex_buffer,
            index_format,
            index_capacity,
            index_buffer,
        })
    }

    fn destroy(self, engine: &mut dyn Engine) {
        engine.destroy_vertex_buffer(self.vertex_buffer);
        engine.destroy_index_buffer(self.index_buffer);
    }
}

#[derive(Debug, Clone, Copy)]
enum NativePayload {
    Mesh(GpuBuffers),
    Gltf(GltfAssetHandle),
}

/// Native objects shared with the cleanup callback; `None` after teardown.
type SharedPayload = Rc<RefCell<Option<NativePayload>>>;

/// The native geometry of a renderable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryHandles {
    Buffers {
        vertex_buffer: VertexBufferHandle,
        index_buffer: IndexBufferHandle,
    },
    Gltf(GltfAssetHandle),
}

pub struct RenderableInternalData {
    native: SharedPayload,
    mesh: RefCell<Option<MeshData>>,
    bounding_box: Cell<Aabb>,
    transform_scale: Cell<f32>,
    transform_offset: Cell<Vec3>,
    animation_names: RefCell<Vec<String>>,
    bone_count: Cell<u32>,
    version: Cell<u64>,
    _cleanup: CleanupToken,
}

impl fmt::Debug for RenderableInternalData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderableInternalData")
            .field("native", &*self.native.borrow())
            .field("bounding_box", &self.bounding_box.get())
            .field("version", &self.version.get())
            .finish_non_exhaustive()
    }
}

impl RenderableInternalData {
    /// Uploads `mesh` into fresh native buffers. Render thread only.
    pub fn from_mesh(ctx: &EngineContext, mesh: MeshData, bounding_box: Aabb) -> Result<Rc<Self>> {
        mesh.validate()?;
        let buffers = ctx.with_engine(|e| GpuBuffers::upload(e, None, &mesh))?;
        Ok(Self::with_payload(
            ctx,
            NativePayload::Mesh(buffers),
            Some(mesh),
            bounding_box,
        ))
    }

    /// Wraps an asset the engine's glTF loader already created.
    #[must_use]
    pub fn from_gltf(ctx: &EngineContext, info: &GltfAssetInfo, bounding_box: Aabb) -> Rc<Self> {
        let data = Self::with_payload(ctx, NativePayload::Gltf(info.asset), None, bounding_box);
        data.animation_names.replace(info.animation_names.clone());
        data
    }

    fn with_payload(
        ctx: &EngineContext,
        payload: NativePayload,
        mesh: Option<MeshData>,
        bounding_box: Aabb,
    ) -> Rc<Self> {
        let native: SharedPayload = Rc::new(RefCell::new(Some(payload)));
        let released = Rc::clone(&native);
        let cleanup = ctx.cleanup().register(move |e| {
            match released.borrow_mut().take() {
                Some(NativePayload::Mesh(buffers)) => buffers.destroy(e),
                Some(NativePayload::Gltf(asset)) => e.destroy_gltf_asset(asset),
                None => {}
            }
        });
        Rc::new(Self {
            native,
            mesh: RefCell::new(mesh),
            bounding_box: Cell::new(bounding_box),
            transform_scale: Cell::new(1.0),
            transform_offset: Cell::new(Vec3::ZERO),
            animation_names: RefCell::new(Vec::new()),
            bone_count: Cell::new(0),
            version: Cell::new(0),
            _cleanup: cleanup,
        })
    }

    fn payload(&self) -> NativePayload {
        let Some(payload) = *self.native.borrow() else {
            panic!("renderable data used after the engine destroyed its native objects");
        };
        payload
    }

    /// Replaces the geometry, reusing native buffers where possible.
    ///
    /// # Panics
    ///
    /// Panics for glTF-backed data, whose geometry lives in the native asset.
    pub fn update_mesh(&self, ctx: &EngineContext, mesh: MeshData, bounding_box: Aabb) -> Result<()> {
        mesh.validate()?;
        let NativePayload::Mesh(existing) = self.payload() else {
            panic!("glTF renderable geometry cannot be replaced");
        };
        let buffers = ctx.with_engine(|e| GpuBuffers::upload(e, Some(existing), &mesh))?;
        *self.native.borrow_mut() = Some(NativePayload::Mesh(buffers));
        self.mesh.replace(Some(mesh));
        self.bounding_box.set(bounding_box);
        self.version.set(self.version.get() + 1);
        Ok(())
    }

    /// Whether the native objects still exist.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.native.borrow().is_some()
    }

    #[must_use]
    pub fn geometry(&self) -> GeometryHandles {
        match self.payload() {
            NativePayload::Mesh(b) => GeometryHandles::Buffers {
                vertex_buffer: b.vertex_buffer,
                index_buffer: b.index_buffer,
            },
            NativePayload::Gltf(asset) => GeometryHandles::Gltf(asset),
        }
    }

    #[must_use]
    pub fn gltf_asset(&self) -> Option<GltfAssetHandle> {
        match self.payload() {
            NativePayload::Gltf(asset) => Some(asset),
            NativePayload::Mesh(_) => None,
        }
    }

    /// CPU-side geometry; `None` for glTF-backed data.
    #[must_use]
    pub fn mesh(&self) -> Option<Ref<'_, MeshData>> {
        Ref::filter_map(self.mesh.borrow(), Option::as_ref).ok()
    }

    /// Number of submeshes; glTF-backed data has none of its own.
    #[must_use]
    pub fn submesh_count(&self) -> usize {
        self.mesh.borrow().as_ref().map_or(0, |m| m.submeshes.len())
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn submesh_range(&self, index: usize) -> Range<u32> {
        let mesh = self.mesh.borrow();
        let count = mesh.as_ref().map_or(0, |m| m.submeshes.len());
        assert!(index < count, "submesh index {index} out of range ({count} submeshes)");
        mesh.as_ref().map(|m| m.submeshes[index].clone()).unwrap_or_default()
    }

    #[inline]
    #[must_use]
    pub fn bounding_box(&self) -> Aabb {
        self.bounding_box.get()
    }

    #[must_use]
    pub fn transform_scale(&self) -> f32 {
        self.transform_scale.get()
    }

    #[must_use]
    pub fn transform_offset(&self) -> Vec3 {
        self.transform_offset.get()
    }

    pub fn set_transform(&self, scale: f32, offset: Vec3) {
        self.transform_scale.set(scale);
        self.transform_offset.set(offset);
        self.version.set(self.version.get() + 1);
    }

    /// Model matrix applied under the owning node's world matrix.
    #[must_use]
    pub fn transform_matrix(&self) -> Mat4 {
        Mat4::from_scale(Vec3::splat(self.transform_scale.get()))
            * Mat4::from_translation(self.transform_offset.get())
    }

    #[must_use]
    pub fn animation_names(&self) -> Vec<String> {
        self.animation_names.borrow().clone()
    }

    pub fn set_animation_names(&self, names: Vec<String>) {
        self.animation_names.replace(names);
    }

    #[must_use]
    pub fn bone_count(&self) -> u32 {
        self.bone_count.get()
    }

    pub fn set_bone_count(&self, bones: u32) {
        self.bone_count.set(bones);
    }

    /// Bumped whenever geometry or model transform change.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.get()
    }
}
