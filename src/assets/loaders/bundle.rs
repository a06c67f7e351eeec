//! Renderable bundle loader
//!
//! # Format
//!
//! A bundle is a little-endian chunked container:
//!
//! ```text
//! header: "SWBN" | u16 major | u16 minor | u32 chunk_count
//! chunk:  [u8; 4] tag | u32 byte_len | payload
//! ```
//!
//! | tag    | contents                                                        |
//! |--------|-----------------------------------------------------------------|
//! | `MODL` | model scale and offset, vertex count, attribute flags, vertices |
//! | `INDX` | index count, then u16 indices (u32 above 65535 vertices)        |
//! | `SUBM` | per submesh: index range, material index, name                  |
//! | `TEXR` | per texture: name, usage, sampler, encoded image                |
//! | `MATL` | per material: name, compiled program, tagged parameters         |
//! | `COLL` | optional collision box or sphere                                |
//! | `ANIM` | optional animation names and bone count                         |
//!
//! Strings are a u32 byte length followed by UTF-8. Unknown chunks are
//! skipped. Only major version [`SUPPORTED_MAJOR`] is readable.
//!
//! # Pipeline
//!
//! 1. **Downloading**: read the bytes through the asset reader
//! 2. **Parsing**: decode every chunk on the loader pool
//! 3. **TextureLoading**: decode all images in parallel on the loader pool,
//!    then create the native textures
//! 4. **MaterialBinding**: compile programs and bind decoded parameters
//! 5. **GpuUpload**: create vertex and index buffers

use std::ops::Range;
use std::sync::Arc;

use futures::future::{FutureExt, LocalBoxFuture};
use glam::{Vec2, Vec3, Vec4};

use crate::assets::loaders::{LoadRequest, fetch};
use crate::backend::{Aabb, FilterMode, MaterialSource, Sampler, VertexAttributes, WrapMode};
use crate::engine::EngineContext;
use crate::errors::{Error, LoadStage, Result};
use crate::resources::internal_data::{IndexData, MeshData, RenderableInternalData};
use crate::resources::material::{Material, MaterialInternalData};
use crate::resources::parameters::MaterialParameters;
use crate::resources::renderable::{AssetLocation, Renderable, RenderableKind};
use crate::resources::texture::{DecodedImage, Texture, TextureUsage, decode_image};
use crate::scene::collision::CollisionShape;

pub const BUNDLE_MAGIC: [u8; 4] = *b"SWBN";
pub const SUPPORTED_MAJOR: u16 = 1;
pub const LATEST_MINOR: u16 = 2;

// ============================================================================
// Decoded bundle
// ============================================================================

/// Initial value of a material parameter as stored in the bundle.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterInit {
    Float(f32),
    Float2(Vec2),
    Float3(Vec3),
    Float4(Vec4),
    Bool(bool),
    Bool2([bool; 2]),
    Bool3([bool; 3]),
    Bool4([bool; 4]),
    Int(i32),
    Int2([i32; 2]),
    Int3([i32; 3]),
    Int4([i32; 4]),
    /// Index into the bundle's texture table.
    Sampler(u32),
    /// Bound by the caller after loading.
    ExternalSampler,
}

impl ParameterInit {
    pub const TAG_FLOAT: u8 = 0;
    pub const TAG_FLOAT2: u8 = 1;
    pub const TAG_FLOAT3: u8 = 2;
    pub const TAG_FLOAT4: u8 = 3;
    pub const TAG_BOOL: u8 = 4;
    pub const TAG_BOOL2: u8 = 5;
    pub const TAG_BOOL3: u8 = 6;
    pub const TAG_BOOL4: u8 = 7;
    pub const TAG_INT: u8 = 8;
    pub const TAG_INT2: u8 = 9;
    pub const TAG_INT3: u8 = 10;
    pub const TAG_INT4: u8 = 11;
    pub const TAG_SAMPLER: u8 = 12;
    pub const TAG_EXTERNAL_SAMPLER: u8 = 13;

    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            Self::Float(_) => Self::TAG_FLOAT,
            Self::Float2(_) => Self::TAG_FLOAT2,
            Self::Float3(_) => Self::TAG_FLOAT3,
            Self::Float4(_) => Self::TAG_FLOAT4,
            Self::Bool(_) => Self::TAG_BOOL,
            Self::Bool2(_) => Self::TAG_BOOL2,
            Self::Bool3(_) => Self::TAG_BOOL3,
            Self::Bool4(_) => Self::TAG_BOOL4,
            Self::Int(_) => Self::TAG_INT,
            Self::Int2(_) => Self::TAG_INT2,
            Self::Int3(_) => Self::TAG_INT3,
            Self::Int4(_) => Self::TAG_INT4,
            Self::Sampler(_) => Self::TAG_SAMPLER,
            Self::ExternalSampler => Self::TAG_EXTERNAL_SAMPLER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BundleTexture {
    pub name: String,
    pub usage: TextureUsage,
    pub sampler: Sampler,
    pub encoded: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct BundleMaterial {
    pub name: String,
    pub program: Arc<[u8]>,
    pub parameters: Vec<(String, ParameterInit)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BundleSubmesh {
    pub range: Range<u32>,
    pub material_index: u32,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Bundle {
    pub version: (u16, u16),
    pub scale: f32,
    pub offset: Vec3,
    pub mesh: MeshData,
    pub bounding_box: Aabb,
    pub submeshes: Vec<BundleSubmesh>,
    pub textures: Vec<BundleTexture>,
    pub materials: Vec<BundleMaterial>,
    pub collision: Option<CollisionShape>,
    pub animation_names: Vec<String>,
    pub bone_count: u32,
}

// ============================================================================
// Parsing
// ============================================================================

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    context: &'static str,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], context: &'static str) -> Self {
        Self {
            bytes,
            pos: 0,
            context,
        }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::InvalidBundle(format!(
                "{} truncated: wanted {len} bytes at offset {}, {} left",
                self.context,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn bool(&mut self) -> Result<bool> {
        Ok(self.u8()? != 0)
    }

    fn vec3(&mut self) -> Result<Vec3> {
        Ok(Vec3::new(self.f32()?, self.f32()?, self.f32()?))
    }

    fn len(&mut self) -> Result<usize> {
        Ok(self.u32()? as usize)
    }

    fn string(&mut self) -> Result<String> {
        let len = self.len()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::InvalidBundle(format!("{} holds invalid UTF-8: {e}", self.context)))
    }
}

fn filter_mode(tag: u8) -> Result<FilterMode> {
    Ok(match tag {
        0 => FilterMode::Nearest,
        1 => FilterMode::Linear,
        2 => FilterMode::NearestMipmapNearest,
        3 => FilterMode::LinearMipmapNearest,
        4 => FilterMode::NearestMipmapLinear,
        5 => FilterMode::LinearMipmapLinear,
        other => return Err(Error::InvalidBundle(format!("unknown filter mode {other}"))),
    })
}

fn wrap_mode(tag: u8) -> Result<WrapMode> {
    Ok(match tag {
        0 => WrapMode::ClampToEdge,
        1 => WrapMode::Repeat,
        2 => WrapMode::MirroredRepeat,
        other => return Err(Error::InvalidBundle(format!("unknown wrap mode {other}"))),
    })
}

fn parameter(r: &mut Reader<'_>, name: &str) -> Result<ParameterInit> {
    let tag = r.u8()?;
    Ok(match tag {
        ParameterInit::TAG_FLOAT => ParameterInit::Float(r.f32()?),
        ParameterInit::TAG_FLOAT2 => ParameterInit::Float2(Vec2::new(r.f32()?, r.f32()?)),
        ParameterInit::TAG_FLOAT3 => ParameterInit::Float3(r.vec3()?),
        ParameterInit::TAG_FLOAT4 => {
            ParameterInit::Float4(Vec4::new(r.f32()?, r.f32()?, r.f32()?, r.f32()?))
        }
        ParameterInit::TAG_BOOL => ParameterInit::Bool(r.bool()?),
        ParameterInit::TAG_BOOL2 => ParameterInit::Bool2([r.bool()?, r.bool()?]),
        ParameterInit::TAG_BOOL3 => ParameterInit::Bool3([r.bool()?, r.bool()?, r.bool()?]),
        ParameterInit::TAG_BOOL4 => {
            ParameterInit::Bool4([r.bool()?, r.bool()?, r.bool()?, r.bool()?])
        }
        ParameterInit::TAG_INT => ParameterInit::Int(r.i32()?),
        ParameterInit::TAG_INT2 => ParameterInit::Int2([r.i32()?, r.i32()?]),
        ParameterInit::TAG_INT3 => ParameterInit::Int3([r.i32()?, r.i32()?, r.i32()?]),
        ParameterInit::TAG_INT4 => ParameterInit::Int4([r.i32()?, r.i32()?, r.i32()?, r.i32()?]),
        ParameterInit::TAG_SAMPLER => ParameterInit::Sampler(r.u32()?),
        ParameterInit::TAG_EXTERNAL_SAMPLER => ParameterInit::ExternalSampler,
        tag => {
            return Err(Error::UnsupportedParameterType {
                name: name.to_owned(),
                tag,
            });
        }
    })
}

struct ModelChunk {
    scale: f32,
    offset: Vec3,
    attributes: VertexAttributes,
    vertex_count: usize,
    vertices: Vec<u8>,
}

fn model_chunk(r: &mut Reader<'_>) -> Result<ModelChunk> {
    let scale = r.f32()?;
    let offset = r.vec3()?;
    let vertex_count = r.len()?;
    let flags = r.u32()?;
    let attributes = VertexAttributes::from_bits(flags)
        .ok_or_else(|| Error::InvalidBundle(format!("unknown vertex attribute flags {flags:#x}")))?;
    if !attributes.contains(VertexAttributes::POSITION) {
        return Err(Error::InvalidBundle("vertex layout lacks positions".into()));
    }
    let byte_len = vertex_count
        .checked_mul(attributes.stride())
        .ok_or_else(|| Error::InvalidBundle("vertex data size overflows".into()))?;
    let vertices = r.take(byte_len)?.to_vec();
    Ok(ModelChunk {
        scale,
        offset,
        attributes,
        vertex_count,
        vertices,
    })
}

fn index_chunk(r: &mut Reader<'_>, vertex_count: usize) -> Result<IndexData> {
    let count = r.len()?;
    let mut indices = Vec::with_capacity(count.min(r.remaining()));
    let wide = vertex_count > usize::from(u16::MAX);
    for _ in 0..count {
        let index = if wide { r.u32()? } else { u32::from(r.u16()?) };
        if index as usize >= vertex_count {
            return Err(Error::InvalidBundle(format!(
                "index {index} out of range for {vertex_count} vertices"
            )));
        }
        indices.push(index);
    }
    Ok(IndexData::for_vertex_count(indices, vertex_count))
}

fn submesh_chunk(r: &mut Reader<'_>) -> Result<Vec<BundleSubmesh>> {
    let count = r.len()?;
    (0..count)
        .map(|_| {
            let start = r.u32()?;
            let end = r.u32()?;
            let material_index = r.u32()?;
            let name = r.string()?;
            Ok(BundleSubmesh {
                range: start..end,
                material_index,
                name: (!name.is_empty()).then_some(name),
            })
        })
        .collect()
}

fn texture_chunk(r: &mut Reader<'_>) -> Result<Vec<BundleTexture>> {
    let count = r.len()?;
    (0..count)
        .map(|_| {
            let name = r.string()?;
            let usage_tag = r.u8()?;
            let usage = TextureUsage::from_tag(usage_tag)
                .ok_or_else(|| Error::InvalidBundle(format!("texture '{name}' has usage {usage_tag}")))?;
            let sampler = Sampler {
                min_filter: filter_mode(r.u8()?)?,
                mag_filter: filter_mode(r.u8()?)?,
                wrap_s: wrap_mode(r.u8()?)?,
                wrap_t: wrap_mode(r.u8()?)?,
                wrap_r: wrap_mode(r.u8()?)?,
            };
            let len = r.len()?;
            let encoded = r.take(len)?.to_vec();
            Ok(BundleTexture {
                name,
                usage,
                sampler,
                encoded,
            })
        })
        .collect()
}

fn material_chunk(r: &mut Reader<'_>) -> Result<Vec<BundleMaterial>> {
    let count = r.len()?;
    (0..count)
        .map(|_| {
            let name = r.string()?;
            let program_len = r.len()?;
            let program = Arc::from(r.take(program_len)?);
            let param_count = r.len()?;
            let parameters = (0..param_count)
                .map(|_| {
                    let name = r.string()?;
                    let init = parameter(r, &name)?;
                    Ok((name, init))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(BundleMaterial {
                name,
                program,
                parameters,
            })
        })
        .collect()
}

fn collision_chunk(r: &mut Reader<'_>) -> Result<CollisionShape> {
    match r.u8()? {
        0 => Ok(CollisionShape::Box {
            center: r.vec3()?,
            size: r.vec3()?,
        }),
        1 => Ok(CollisionShape::Sphere {
            center: r.vec3()?,
            radius: r.f32()?,
        }),
        other => Err(Error::InvalidBundle(format!("unknown collision shape {other}"))),
    }
}

fn animation_chunk(r: &mut Reader<'_>) -> Result<(Vec<String>, u32)> {
    let count = r.len()?;
    let names = (0..count).map(|_| r.string()).collect::<Result<Vec<_>>>()?;
    let bones = r.u32()?;
    Ok((names, bones))
}

/// Decodes and validates a bundle. Pure CPU work, safe off the render thread.
pub fn parse_bundle(bytes: &[u8]) -> Result<Bundle> {
    let mut r = Reader::new(bytes, "bundle header");
    if r.array::<4>()? != BUNDLE_MAGIC {
        return Err(Error::InvalidBundle("missing SWBN magic".into()));
    }
    let major = r.u16()?;
    let minor = r.u16()?;
    if major != SUPPORTED_MAJOR || minor > LATEST_MINOR {
        return Err(Error::UnsupportedVersion {
            found_major: major,
            found_minor: minor,
            supported_major: SUPPORTED_MAJOR,
        });
    }

    let chunk_count = r.u32()?;
    let mut model = None;
    let mut raw_indices = None;
    let mut submeshes = None;
    let mut textures = Vec::new();
    let mut materials = Vec::new();
    let mut collision = None;
    let mut animation = None;

    for _ in 0..chunk_count {
        let tag = r.array::<4>()?;
        let len = r.len()?;
        let payload = r.take(len)?;
        match &tag {
            b"MODL" => model = Some(model_chunk(&mut Reader::new(payload, "MODL chunk"))?),
            // Indices are decoded once the vertex count is known.
            b"INDX" => raw_indices = Some(payload),
            b"SUBM" => submeshes = Some(submesh_chunk(&mut Reader::new(payload, "SUBM chunk"))?),
            b"TEXR" => textures = texture_chunk(&mut Reader::new(payload, "TEXR chunk"))?,
            b"MATL" => materials = material_chunk(&mut Reader::new(payload, "MATL chunk"))?,
            b"COLL" => collision = Some(collision_chunk(&mut Reader::new(payload, "COLL chunk"))?),
            b"ANIM" => animation = Some(animation_chunk(&mut Reader::new(payload, "ANIM chunk"))?),
            other => log::debug!(
                "skipping unknown bundle chunk '{}'",
                String::from_utf8_lossy(other)
            ),
        }
    }

    let model = model.ok_or_else(|| Error::InvalidBundle("missing MODL chunk".into()))?;
    let raw_indices = raw_indices.ok_or_else(|| Error::InvalidBundle("missing INDX chunk".into()))?;
    let indices = index_chunk(&mut Reader::new(raw_indices, "INDX chunk"), model.vertex_count)?;
    let submeshes = submeshes.ok_or_else(|| Error::InvalidBundle("missing SUBM chunk".into()))?;

    for (i, submesh) in submeshes.iter().enumerate() {
        if submesh.material_index as usize >= materials.len() {
            return Err(Error::InvalidBundle(format!(
                "submesh {i} uses material {} of {}",
                submesh.material_index,
                materials.len()
            )));
        }
    }
    for material in &materials {
        for (name, init) in &material.parameters {
            if let ParameterInit::Sampler(index) = init
                && *index as usize >= textures.len()
            {
                return Err(Error::InvalidBundle(format!(
                    "parameter '{name}' of material '{}' samples texture {index} of {}",
                    material.name,
                    textures.len()
                )));
            }
        }
    }

    let mesh = MeshData {
        attributes: model.attributes,
        vertex_count: model.vertex_count,
        vertices: model.vertices,
        indices,
        submeshes: submeshes.iter().map(|s| s.range.clone()).collect(),
    };
    mesh.validate()?;
    let bounding_box = Aabb::from_points(mesh.positions()).unwrap_or_default();
    let (animation_names, bone_count) = animation.unwrap_or_default();

    Ok(Bundle {
        version: (major, minor),
        scale: model.scale,
        offset: model.offset,
        mesh,
        bounding_box,
        submeshes,
        textures,
        materials,
        collision,
        animation_names,
        bone_count,
    })
}

// ============================================================================
// Writing
// ============================================================================

/// Encodes bundles, for asset tooling and tests.
#[derive(Debug, Default)]
pub struct BundleWriter {
    version: Option<(u16, u16)>,
    chunks: Vec<([u8; 4], Vec<u8>)>,
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_f32s(out: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

fn filter_tag(mode: FilterMode) -> u8 {
    match mode {
        FilterMode::Nearest => 0,
        FilterMode::Linear => 1,
        FilterMode::NearestMipmapNearest => 2,
        FilterMode::LinearMipmapNearest => 3,
        FilterMode::NearestMipmapLinear => 4,
        FilterMode::LinearMipmapLinear => 5,
    }
}

fn wrap_tag(mode: WrapMode) -> u8 {
    match mode {
        WrapMode::ClampToEdge => 0,
        WrapMode::Repeat => 1,
        WrapMode::MirroredRepeat => 2,
    }
}

fn usage_tag(usage: TextureUsage) -> u8 {
    match usage {
        TextureUsage::Color => 0,
        TextureUsage::Normal => 1,
        TextureUsage::Data => 2,
    }
}

impl BundleWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the header version, which defaults to the latest supported.
    #[must_use]
    pub fn version(mut self, major: u16, minor: u16) -> Self {
        self.version = Some((major, minor));
        self
    }

    /// Appends an arbitrary chunk.
    #[must_use]
    pub fn chunk(mut self, tag: [u8; 4], payload: Vec<u8>) -> Self {
        self.chunks.push((tag, payload));
        self
    }

    /// Writes the `MODL` and `INDX` chunks for `mesh`.
    #[must_use]
    pub fn model(self, scale: f32, offset: Vec3, mesh: &MeshData) -> Self {
        let mut modl = Vec::new();
        put_f32s(&mut modl, &[scale, offset.x, offset.y, offset.z]);
        put_u32(&mut modl, mesh.vertex_count as u32);
        put_u32(&mut modl, mesh.attributes.bits());
        modl.extend_from_slice(&mesh.vertices);

        let mut indx = Vec::new();
        put_u32(&mut indx, mesh.indices.len() as u32);
        indx.extend_from_slice(mesh.indices.as_bytes());

        self.chunk(*b"MODL", modl).chunk(*b"INDX", indx)
    }

    #[must_use]
    pub fn submeshes(self, submeshes: &[BundleSubmesh]) -> Self {
        let mut out = Vec::new();
        put_u32(&mut out, submeshes.len() as u32);
        for s in submeshes {
            put_u32(&mut out, s.range.start);
            put_u32(&mut out, s.range.end);
            put_u32(&mut out, s.material_index);
            put_str(&mut out, s.name.as_deref().unwrap_or(""));
        }
        self.chunk(*b"SUBM", out)
    }

    #[must_use]
    pub fn textures(self, textures: &[BundleTexture]) -> Self {
        let mut out = Vec::new();
        put_u32(&mut out, textures.len() as u32);
        for t in textures {
            put_str(&mut out, &t.name);
            out.push(usage_tag(t.usage));
            out.extend_from_slice(&[
                filter_tag(t.sampler.min_filter),
                filter_tag(t.sampler.mag_filter),
                wrap_tag(t.sampler.wrap_s),
                wrap_tag(t.sampler.wrap_t),
                wrap_tag(t.sampler.wrap_r),
            ]);
            put_u32(&mut out, t.encoded.len() as u32);
            out.extend_from_slice(&t.encoded);
        }
        self.chunk(*b"TEXR", out)
    }

    #[must_use]
    pub fn materials(self, materials: &[BundleMaterial]) -> Self {
        let mut out = Vec::new();
        put_u32(&mut out, materials.len() as u32);
        for m in materials {
            put_str(&mut out, &m.name);
            put_u32(&mut out, m.program.len() as u32);
            out.extend_from_slice(&m.program);
            put_u32(&mut out, m.parameters.len() as u32);
            for (name, init) in &m.parameters {
                put_str(&mut out, name);
                out.push(init.tag());
                match init {
                    ParameterInit::Float(v) => put_f32s(&mut out, &[*v]),
                    ParameterInit::Float2(v) => put_f32s(&mut out, &v.to_array()),
                    ParameterInit::Float3(v) => put_f32s(&mut out, &v.to_array()),
                    ParameterInit::Float4(v) => put_f32s(&mut out, &v.to_array()),
                    ParameterInit::Bool(v) => out.push(u8::from(*v)),
                    ParameterInit::Bool2(v) => out.extend(v.iter().map(|&b| u8::from(b))),
                    ParameterInit::Bool3(v) => out.extend(v.iter().map(|&b| u8::from(b))),
                    ParameterInit::Bool4(v) => out.extend(v.iter().map(|&b| u8::from(b))),
                    ParameterInit::Int(v) => out.extend_from_slice(&v.to_le_bytes()),
                    ParameterInit::Int2(v) => v.iter().for_each(|i| out.extend_from_slice(&i.to_le_bytes())),
                    ParameterInit::Int3(v) => v.iter().for_each(|i| out.extend_from_slice(&i.to_le_bytes())),
                    ParameterInit::Int4(v) => v.iter().for_each(|i| out.extend_from_slice(&i.to_le_bytes())),
                    ParameterInit::Sampler(index) => put_u32(&mut out, *index),
                    ParameterInit::ExternalSampler => {}
                }
            }
        }
        self.chunk(*b"MATL", out)
    }

    #[must_use]
    pub fn collision(self, shape: &CollisionShape) -> Self {
        let mut out = Vec::new();
        match *shape {
            CollisionShape::Box { center, size } => {
                out.push(0);
                put_f32s(&mut out, &center.to_array());
                put_f32s(&mut out, &size.to_array());
            }
            CollisionShape::Sphere { center, radius } => {
                out.push(1);
                put_f32s(&mut out, &center.to_array());
                put_f32s(&mut out, &[radius]);
            }
        }
        self.chunk(*b"COLL", out)
    }

    #[must_use]
    pub fn animations(self, names: &[&str], bone_count: u32) -> Self {
        let mut out = Vec::new();
        put_u32(&mut out, names.len() as u32);
        for name in names {
            put_str(&mut out, name);
        }
        put_u32(&mut out, bone_count);
        self.chunk(*b"ANIM", out)
    }

    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        let (major, minor) = self.version.unwrap_or((SUPPORTED_MAJOR, LATEST_MINOR));
        let mut out = Vec::new();
        out.extend_from_slice(&BUNDLE_MAGIC);
        out.extend_from_slice(&major.to_le_bytes());
        out.extend_from_slice(&minor.to_le_bytes());
        put_u32(&mut out, self.chunks.len() as u32);
        for (tag, payload) in self.chunks {
            out.extend_from_slice(&tag);
            put_u32(&mut out, payload.len() as u32);
            out.extend_from_slice(&payload);
        }
        out
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Loads a bundle into a model renderable.
pub fn load(ctx: EngineContext, location: AssetLocation) -> LocalBoxFuture<'static, Result<Renderable>> {
    async move {
        let request = LoadRequest::new(location.name());

        request.enter(LoadStage::Downloading);
        let bytes = fetch(&ctx, &location).await.map_err(|e| request.fail(e))?;

        request.enter(LoadStage::Parsing);
        let mut bundle = ctx
            .spawn_blocking(move || parse_bundle(&bytes))
            .await
            .and_then(|parsed| parsed)
            .map_err(|e| request.fail(e))?;

        request.enter(LoadStage::TextureLoading);
        let textures = load_textures(&ctx, std::mem::take(&mut bundle.textures))
            .await
            .map_err(|e| request.fail(e))?;

        request.enter(LoadStage::MaterialBinding);
        let materials = bundle
            .materials
            .iter()
            .map(|m| bind_material(&ctx, m, &textures))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| request.fail(e))?;

        request.enter(LoadStage::GpuUpload);
        let renderable = assemble(&ctx, bundle, &materials).map_err(|e| request.fail(e))?;

        request.enter(LoadStage::Ready);
        Ok(renderable)
    }
    .boxed_local()
}

async fn load_textures(ctx: &EngineContext, textures: Vec<BundleTexture>) -> Result<Vec<Texture>> {
    let decodes = textures.into_iter().map(|texture| {
        let decode = ctx.spawn_blocking(move || {
            let image = decode_image(&texture.encoded).map_err(|e| {
                Error::ImageDecode(format!("texture '{}': {e}", texture.name))
            })?;
            Ok::<_, Error>((image, texture.usage, texture.sampler))
        });
        async move { decode.await? }
    });
    let decoded: Vec<(DecodedImage, TextureUsage, Sampler)> =
        futures::future::try_join_all(decodes).await?;

    decoded
        .iter()
        .map(|(image, usage, sampler)| Texture::from_image(ctx, image, *usage, *sampler))
        .collect()
}

fn bind_material(ctx: &EngineContext, source: &BundleMaterial, textures: &[Texture]) -> Result<Material> {
    let internal = MaterialInternalData::create(ctx, &MaterialSource::Compiled(Arc::clone(&source.program)))?;
    let mut parameters = MaterialParameters::new();
    for (name, init) in &source.parameters {
        match init {
            ParameterInit::Float(v) => parameters.set_float(name, *v),
            ParameterInit::Float2(v) => parameters.set_float2(name, v.x, v.y),
            ParameterInit::Float3(v) => parameters.set_float3(name, v.x, v.y, v.z),
            ParameterInit::Float4(v) => parameters.set_float4(name, v.x, v.y, v.z, v.w),
            ParameterInit::Bool(v) => parameters.set_bool(name, *v),
            ParameterInit::Bool2([x, y]) => parameters.set_bool2(name, *x, *y),
            ParameterInit::Bool3([x, y, z]) => parameters.set_bool3(name, *x, *y, *z),
            ParameterInit::Bool4([x, y, z, w]) => parameters.set_bool4(name, *x, *y, *z, *w),
            ParameterInit::Int(v) => parameters.set_int(name, *v),
            ParameterInit::Int2([x, y]) => parameters.set_int2(name, *x, *y),
            ParameterInit::Int3([x, y, z]) => parameters.set_int3(name, *x, *y, *z),
            ParameterInit::Int4([x, y, z, w]) => parameters.set_int4(name, *x, *y, *z, *w),
            ParameterInit::Sampler(index) => {
                let texture = textures.get(*index as usize).ok_or_else(|| {
                    Error::InvalidBundle(format!("parameter '{name}' samples missing texture {index}"))
                })?;
                parameters.set_texture(name, texture);
            }
            ParameterInit::ExternalSampler => {
                log::trace!("material '{}': '{name}' is bound by the caller", source.name);
            }
        }
    }
    Material::new(ctx, internal, parameters)
}

fn assemble(ctx: &EngineContext, bundle: Bundle, materials: &[Material]) -> Result<Renderable> {
    let bindings: Vec<Material> = bundle
        .submeshes
        .iter()
        .map(|s| materials[s.material_index as usize].clone())
        .collect();
    let names: Vec<Option<String>> = bundle.submeshes.iter().map(|s| s.name.clone()).collect();

    let data = RenderableInternalData::from_mesh(ctx, bundle.mesh, bundle.bounding_box)?;
    data.set_transform(bundle.scale, bundle.offset);
    data.set_animation_names(bundle.animation_names);
    data.set_bone_count(bundle.bone_count);

    let mut renderable = Renderable::from_parts(ctx, RenderableKind::Model, data, bindings, names);
    if let Some(shape) = bundle.collision {
        renderable.set_collision_shape(Some(shape));
    }
    Ok(renderable)
}
