//! Renderables
//!
//! # Overview
//!
//! A [`Renderable`] is the public drawable resource: shared geometry
//! ([`RenderableInternalData`]), one material and optional name per submesh,
//! shadow flags, a render priority and an optional collision shape.
//!
//! Two kinds exist:
//!
//! - **Model**: geometry loaded from a bundle or glTF file, or built from a
//!   [`RenderableDefinition`]
//! - **View**: a quad showing an externally rasterized 2D view, sized in
//!   meters from the view's pixel size
//!
//! # Copies
//!
//! [`Renderable::make_copy`] shares the geometry but gives the copy its own
//! material instances and collision shape, so per-node customization never
//! leaks into other nodes using the same asset. Loads through the registry
//! always hand out copies of the cached original.
//!
//! # Change tracking
//!
//! Every mutation bumps [`Renderable::change_id`]. A
//! [`RenderableInstance`](crate::scene::instance::RenderableInstance)
//! compares it against the last value it pushed to the native engine.

use std::rc::Rc;
use std::sync::Arc;

use futures::future::{FutureExt, LocalBoxFuture};
use glam::Vec2;

use crate::backend::{Aabb, ExternalTextureHandle, Primitive, RenderableDescriptor};
use crate::engine::EngineContext;
use crate::errors::{Error, Result};
use crate::resources::definition::RenderableDefinition;
use crate::resources::internal_data::{GeometryHandles, RenderableInternalData};
use crate::resources::material::Material;
use crate::resources::material_factory;
use crate::resources::primitives::quad_definition;
use crate::resources::version_tracker::ChangeTracker;
use crate::scene::collision::CollisionShape;

pub const DEFAULT_RENDER_PRIORITY: u8 = 4;
pub const MAX_RENDER_PRIORITY: u8 = 7;

// ============================================================================
// View configuration
// ============================================================================

/// How a view's pixel size maps to meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewSize {
    /// Fixed width in meters, height follows the aspect ratio.
    FixedWidth(f32),
    /// Fixed height in meters, width follows the aspect ratio.
    FixedHeight(f32),
    /// This many pixels make one meter.
    DpToMeters(u32),
}

impl Default for ViewSize {
    fn default() -> Self {
        Self::DpToMeters(250)
    }
}

impl ViewSize {
    #[must_use]
    pub fn size_in_meters(&self, width_px: u32, height_px: u32) -> Vec2 {
        let px = Vec2::new(width_px as f32, height_px as f32);
        if px.x <= 0.0 || px.y <= 0.0 {
            return Vec2::ZERO;
        }
        match *self {
            Self::FixedWidth(width) => Vec2::new(width, width * px.y / px.x),
            Self::FixedHeight(height) => Vec2::new(height * px.x / px.y, height),
            Self::DpToMeters(dp) => px / dp.max(1) as f32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HorizontalAlignment {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VerticalAlignment {
    #[default]
    Bottom,
    Center,
    Top,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewConfig {
    pub texture: ExternalTextureHandle,
    pub width_px: u32,
    pub height_px: u32,
    pub size: ViewSize,
    pub horizontal: HorizontalAlignment,
    pub vertical: VerticalAlignment,
}

impl ViewConfig {
    #[must_use]
    pub fn new(texture: ExternalTextureHandle, width_px: u32, height_px: u32) -> Self {
        Self {
            texture,
            width_px,
            height_px,
            size: ViewSize::default(),
            horizontal: HorizontalAlignment::default(),
            vertical: VerticalAlignment::default(),
        }
    }

    #[must_use]
    pub fn with_size(mut self, size: ViewSize) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn with_alignment(mut self, horizontal: HorizontalAlignment, vertical: VerticalAlignment) -> Self {
        self.horizontal = horizontal;
        self.vertical = vertical;
        self
    }

    /// Quad size in meters and the offset of its center from the node origin.
    #[must_use]
    pub fn quad_extent(&self) -> (Vec2, Vec2) {
        let size = self.size.size_in_meters(self.width_px, self.height_px);
        let x = match self.horizontal {
            HorizontalAlignment::Left => size.x * 0.5,
            HorizontalAlignment::Center => 0.0,
            HorizontalAlignment::Right => -size.x * 0.5,
        };
        let y = match self.vertical {
            VerticalAlignment::Bottom => size.y * 0.5,
            VerticalAlignment::Center => 0.0,
            VerticalAlignment::Top => -size.y * 0.5,
        };
        (size, Vec2::new(x, y))
    }

    fn definition(&self, material: Material) -> RenderableDefinition {
        let (size, offset) = self.quad_extent();
        // Zero-sized views still get valid, if degenerate, geometry.
        quad_definition(size.max(Vec2::splat(f32::EPSILON)), offset, material)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderableKind {
    Model,
    View(ViewConfig),
}

// ============================================================================
// Renderable
// ============================================================================

#[derive(Debug)]
pub struct Renderable {
    ctx: EngineContext,
    kind: RenderableKind,
    data: Rc<RenderableInternalData>,
    materials: Vec<Material>,
    material_names: Vec<Option<String>>,
    cast_shadows: bool,
    receive_shadows: bool,
    priority: u8,
    collision: Option<CollisionShape>,
    changes: ChangeTracker,
    /// Registry original this renderable was copied from. Keeps the cache
    /// entry alive while any copy exists.
    origin: Option<Rc<Renderable>>,
}

impl Renderable {
    #[must_use]
    pub fn builder() -> RenderableBuilder {
        RenderableBuilder::default()
    }

    /// Assembles a renderable from loaded parts.
    ///
    /// # Panics
    ///
    /// Panics if the material and name lists do not both have one entry per
    /// submesh of `data`.
    #[must_use]
    pub fn from_parts(
        ctx: &EngineContext,
        kind: RenderableKind,
        data: Rc<RenderableInternalData>,
        materials: Vec<Material>,
        material_names: Vec<Option<String>>,
    ) -> Self {
        assert_eq!(
            materials.len(),
            material_names.len(),
            "one material name per material binding"
        );
        if data.gltf_asset().is_none() {
            assert_eq!(
                materials.len(),
                data.submesh_count(),
                "one material binding per submesh"
            );
        }
        let view = matches!(kind, RenderableKind::View(_));
        let collision = Some(CollisionShape::from_aabb(&data.bounding_box()));
        Self {
            ctx: ctx.clone(),
            kind,
            data,
            materials,
            material_names,
            cast_shadows: !view,
            receive_shadows: !view,
            priority: DEFAULT_RENDER_PRIORITY,
            collision,
            changes: ChangeTracker::new(),
            origin: None,
        }
    }

    /// Builds a model synchronously from a definition. Render thread only.
    pub fn from_definition(ctx: &EngineContext, definition: &RenderableDefinition) -> Result<Self> {
        let (mesh, bounds) = definition.to_mesh_data()?;
        let data = RenderableInternalData::from_mesh(ctx, mesh, bounds)?;
        let (materials, names) = split_submeshes(definition);
        Ok(Self::from_parts(ctx, RenderableKind::Model, data, materials, names))
    }

    /// Builds a view quad showing `config.texture` with `material`.
    pub fn from_view(ctx: &EngineContext, config: ViewConfig, material: Material) -> Result<Self> {
        let definition = config.definition(material);
        let (mesh, bounds) = definition.to_mesh_data()?;
        let data = RenderableInternalData::from_mesh(ctx, mesh, bounds)?;
        let (materials, names) = split_submeshes(&definition);
        Ok(Self::from_parts(ctx, RenderableKind::View(config), data, materials, names))
    }

    /// Same geometry, fresh material instances, independent flags.
    pub fn make_copy(&self) -> Result<Self> {
        let materials = self
            .materials
            .iter()
            .map(Material::make_copy)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            ctx: self.ctx.clone(),
            kind: self.kind,
            data: Rc::clone(&self.data),
            materials,
            material_names: self.material_names.clone(),
            cast_shadows: self.cast_shadows,
            receive_shadows: self.receive_shadows,
            priority: self.priority,
            collision: self.collision,
            changes: ChangeTracker::new(),
            origin: self.origin.clone(),
        })
    }

    /// Replaces geometry and materials from `definition`.
    ///
    /// The geometry is shared, so every copy of this renderable sees the new
    /// vertices; the material list changes only on `self`.
    pub fn update_from_definition(&mut self, definition: &RenderableDefinition) -> Result<()> {
        let (mesh, bounds) = definition.to_mesh_data()?;
        self.data.update_mesh(&self.ctx, mesh, bounds)?;
        let (materials, names) = split_submeshes(definition);
        self.materials = materials;
        self.material_names = names;
        if matches!(self.collision, Some(CollisionShape::Box { .. })) {
            self.collision = Some(CollisionShape::from_aabb(&bounds));
        }
        self.changes.changed();
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &RenderableKind {
        &self.kind
    }

    #[must_use]
    pub fn is_view(&self) -> bool {
        matches!(self.kind, RenderableKind::View(_))
    }

    #[inline]
    #[must_use]
    pub fn internal_data(&self) -> &Rc<RenderableInternalData> {
        &self.data
    }

    /// Whether both renderables draw the same geometry.
    #[must_use]
    pub fn shares_data_with(&self, other: &Renderable) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    #[must_use]
    pub fn submesh_count(&self) -> usize {
        self.materials.len()
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn material(&self, index: usize) -> &Material {
        self.check_submesh(index);
        &self.materials[index]
    }

    #[must_use]
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn set_material(&mut self, index: usize, material: Material) {
        self.check_submesh(index);
        self.materials[index] = material;
        self.changes.changed();
    }

    /// Binds `material` to every submesh.
    pub fn set_all_materials(&mut self, material: &Material) {
        for slot in &mut self.materials {
            *slot = material.clone();
        }
        self.changes.changed();
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn material_name(&self, index: usize) -> Option<&str> {
        self.check_submesh(index);
        self.material_names[index].as_deref()
    }

    fn check_submesh(&self, index: usize) {
        assert!(
            index < self.materials.len(),
            "submesh index {index} out of range ({} submeshes)",
            self.materials.len()
        );
    }

    #[must_use]
    pub fn is_shadow_caster(&self) -> bool {
        self.cast_shadows
    }

    pub fn set_shadow_caster(&mut self, cast: bool) {
        self.cast_shadows = cast;
        self.changes.changed();
    }

    #[must_use]
    pub fn is_shadow_receiver(&self) -> bool {
        self.receive_shadows
    }

    pub fn set_shadow_receiver(&mut self, receive: bool) {
        self.receive_shadows = receive;
        self.changes.changed();
    }

    #[must_use]
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Lower values draw first.
    ///
    /// # Panics
    ///
    /// Panics if `priority` exceeds [`MAX_RENDER_PRIORITY`].
    pub fn set_priority(&mut self, priority: u8) {
        assert!(
            priority <= MAX_RENDER_PRIORITY,
            "render priority {priority} out of range 0..={MAX_RENDER_PRIORITY}"
        );
        self.priority = priority;
        self.changes.changed();
    }

    #[must_use]
    pub fn collision_shape(&self) -> Option<&CollisionShape> {
        self.collision.as_ref()
    }

    pub fn set_collision_shape(&mut self, shape: Option<CollisionShape>) {
        self.collision = shape;
        self.changes.changed();
    }

    #[must_use]
    pub fn bounding_box(&self) -> Aabb {
        self.data.bounding_box()
    }

    #[must_use]
    pub fn animation_names(&self) -> Vec<String> {
        self.data.animation_names()
    }

    #[inline]
    #[must_use]
    pub fn change_id(&self) -> u64 {
        self.changes.version()
    }

    // ========================================================================
    // View renderables
    // ========================================================================

    /// # Panics
    ///
    /// Panics on model renderables.
    #[must_use]
    pub fn view_config(&self) -> &ViewConfig {
        match &self.kind {
            RenderableKind::View(config) => config,
            RenderableKind::Model => panic!("not a view renderable"),
        }
    }

    /// Resizes the quad after the view was re-laid out.
    pub fn set_view_pixel_size(&mut self, width_px: u32, height_px: u32) -> Result<()> {
        let mut config = *self.view_config();
        config.width_px = width_px;
        config.height_px = height_px;
        self.reshape_view(config)
    }

    pub fn set_view_size(&mut self, size: ViewSize) -> Result<()> {
        let config = self.view_config().with_size(size);
        self.reshape_view(config)
    }

    pub fn set_view_alignment(
        &mut self,
        horizontal: HorizontalAlignment,
        vertical: VerticalAlignment,
    ) -> Result<()> {
        let config = self.view_config().with_alignment(horizontal, vertical);
        self.reshape_view(config)
    }

    fn reshape_view(&mut self, config: ViewConfig) -> Result<()> {
        let Some(material) = self.materials.first().cloned() else {
            return Err(Error::MissingSource("view renderable lost its material".into()));
        };
        let definition = config.definition(material);
        self.update_from_definition(&definition)?;
        self.kind = RenderableKind::View(config);
        Ok(())
    }

    // ========================================================================
    // Native state
    // ========================================================================

    /// What the native renderable manager needs for this renderable; `None`
    /// for glTF models, whose entities the engine's asset loader owns.
    ///
    /// `blend_orders` overrides the draw order of individual submeshes.
    #[must_use]
    pub fn descriptor(&self, blend_orders: &[Option<u16>]) -> Option<RenderableDescriptor> {
        let GeometryHandles::Buffers {
            vertex_buffer,
            index_buffer,
        } = self.data.geometry()
        else {
            return None;
        };
        let primitives = self
            .materials
            .iter()
            .enumerate()
            .map(|(i, material)| Primitive {
                indices: self.data.submesh_range(i),
                material_instance: material.instance(),
                blend_order: blend_orders.get(i).copied().flatten(),
            })
            .collect();
        Some(RenderableDescriptor {
            vertex_buffer,
            index_buffer,
            primitives,
            bounding_box: self.data.bounding_box(),
            priority: self.priority,
            cast_shadows: self.cast_shadows,
            receive_shadows: self.receive_shadows,
            bone_count: self.data.bone_count(),
        })
    }
}

fn split_submeshes(definition: &RenderableDefinition) -> (Vec<Material>, Vec<Option<String>>) {
    definition
        .submeshes()
        .iter()
        .map(|s| (s.material.clone(), s.name.clone()))
        .unzip()
}

// ============================================================================
// Builder
// ============================================================================

/// Where an asset's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetLocation {
    /// Read through the context's asset reader.
    Uri(String),
    /// Already in memory. `name` is used for logging and as the base for
    /// resolving relative companion resources.
    Bytes { name: String, bytes: Arc<[u8]> },
}

impl AssetLocation {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Uri(uri) => uri,
            Self::Bytes { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RenderableSource {
    /// Binary renderable bundle.
    Bundle(AssetLocation),
    /// glTF 2.0, JSON or binary container.
    Gltf(AssetLocation),
    Definition(RenderableDefinition),
    View(ViewConfig),
}

impl RenderableSource {
    fn default_registry_id(&self) -> Option<String> {
        match self {
            Self::Bundle(AssetLocation::Uri(uri)) | Self::Gltf(AssetLocation::Uri(uri)) => {
                Some(uri.clone())
            }
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Bundle(location) => format!("bundle '{}'", location.name()),
            Self::Gltf(location) => format!("glTF '{}'", location.name()),
            Self::Definition(_) => "definition".to_owned(),
            Self::View(_) => "view".to_owned(),
        }
    }
}

/// Fluent description of a renderable load.
///
/// Loads from a URI are deduplicated by that URI unless a
/// [`registry_id`](Self::registry_id) is given. Every build from the
/// registry resolves to a [`Renderable::make_copy`] of the cached original,
/// which stays cached until its last copy is dropped.
#[derive(Debug, Default)]
pub struct RenderableBuilder {
    source: Option<RenderableSource>,
    registry_id: Option<String>,
}

impl RenderableBuilder {
    #[must_use]
    pub fn source(mut self, source: RenderableSource) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn bundle(self, uri: impl Into<String>) -> Self {
        self.source(RenderableSource::Bundle(AssetLocation::Uri(uri.into())))
    }

    #[must_use]
    pub fn gltf(self, uri: impl Into<String>) -> Self {
        self.source(RenderableSource::Gltf(AssetLocation::Uri(uri.into())))
    }

    #[must_use]
    pub fn definition(self, definition: RenderableDefinition) -> Self {
        self.source(RenderableSource::Definition(definition))
    }

    #[must_use]
    pub fn view(self, config: ViewConfig) -> Self {
        self.source(RenderableSource::View(config))
    }

    #[must_use]
    pub fn registry_id(mut self, id: impl Into<String>) -> Self {
        self.registry_id = Some(id.into());
        self
    }

    /// Starts the load. Failures are logged and returned, never replaced by
    /// a placeholder.
    pub fn build(self, ctx: &EngineContext) -> LocalBoxFuture<'static, Result<Renderable>> {
        let Some(source) = self.source else {
            log::error!("renderable build without a source");
            return futures::future::ready(Err(Error::MissingSource(
                "set a bundle, glTF, definition or view source".into(),
            )))
            .boxed_local();
        };

        let description = source.describe();
        let registry_id = self.registry_id.or_else(|| source.default_registry_id());

        let load = match registry_id {
            None => load_source(ctx.clone(), source),
            Some(id) => {
                let registry = Rc::clone(ctx.renderable_registry());
                let shared = registry.get(&id).unwrap_or_else(|| {
                    log::debug!("loading {description} as '{id}'");
                    let load = load_source(ctx.clone(), source);
                    registry.register(id, load.map(|r| r.map(Rc::new)).boxed_local())
                });
                async move {
                    let original = shared.await?;
                    let mut copy = original.make_copy()?;
                    copy.origin = Some(original);
                    Ok(copy)
                }
                .boxed_local()
            }
        };

        load.map(move |result| {
            result.inspect_err(|e| log::error!("unable to load renderable from {description}: {e}"))
        })
        .boxed_local()
    }
}

fn load_source(ctx: EngineContext, source: RenderableSource) -> LocalBoxFuture<'static, Result<Renderable>> {
    match source {
        RenderableSource::Bundle(location) => crate::assets::loaders::bundle::load(ctx, location),
        #[cfg(feature = "gltf")]
        RenderableSource::Gltf(location) => crate::assets::loaders::gltf::load(ctx, location),
        #[cfg(not(feature = "gltf"))]
        RenderableSource::Gltf(_) => futures::future::ready(Err(Error::Gltf(
            "built without the `gltf` feature".into(),
        )))
        .boxed_local(),
        RenderableSource::Definition(definition) => {
            futures::future::ready(Renderable::from_definition(&ctx, &definition)).boxed_local()
        }
        RenderableSource::View(config) => async move {
            let material = material_factory::make_view_surface(&ctx, config.texture).await?;
            Renderable::from_view(&ctx, config, material)
        }
        .boxed_local(),
    }
}
