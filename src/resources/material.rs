//! Materials
//!
//! # Overview
//!
//! A [`Material`] couples three things:
//!
//! - a shared [`MaterialInternalData`]: the compiled native program and the
//!   set of parameter names it declares, reference counted across every copy
//! - a native material instance owned by this material
//! - a [`MaterialParameters`] bag that is re-applied to the instance whenever
//!   it changes
//!
//! Cloning a `Material` shares all of the above. [`Material::make_copy`]
//! creates a new native instance of the same program with an independent
//! copy of the parameter bag.
//!
//! Native objects are freed through the cleanup registry. After a forced
//! teardown the instance is gone: setters keep updating the bag but no
//! longer push to the engine.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use futures::future::{FutureExt, LocalBoxFuture};
use glam::Vec4;
use rustc_hash::FxHashSet;

use crate::assets::cleanup::CleanupToken;
use crate::backend::{
    BuiltinMaterial, ExternalTextureHandle, MaterialHandle, MaterialInstanceHandle,
    MaterialSource,
};
use crate::engine::EngineContext;
use crate::errors::{Error, Result};
use crate::resources::parameters::{MaterialParameter, MaterialParameters};
use crate::resources::texture::Texture;

/// The compiled program shared by every copy of a material.
pub struct MaterialInternalData {
    handle: MaterialHandle,
    parameter_names: FxHashSet<String>,
    _cleanup: CleanupToken,
}

impl MaterialInternalData {
    /// Compiles `source` on the native engine.
    pub fn create(ctx: &EngineContext, source: &MaterialSource) -> Result<Rc<Self>> {
        let native = ctx.with_engine(|e| e.create_material(source))?;
        let handle = native.handle;
        let cleanup = ctx.cleanup().register(move |e| e.destroy_material(handle));
        Ok(Rc::new(Self {
            handle,
            parameter_names: native.parameters.into_iter().collect(),
            _cleanup: cleanup,
        }))
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> MaterialHandle {
        self.handle
    }

    #[must_use]
    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameter_names.contains(name)
    }

    #[must_use]
    pub fn parameter_names(&self) -> &FxHashSet<String> {
        &self.parameter_names
    }
}

// Field order is drop order: the instance must be released before the
// program it was created from.
struct MaterialInner {
    _cleanup: CleanupToken,
    ctx: EngineContext,
    internal: Rc<MaterialInternalData>,
    instance: MaterialInstanceHandle,
    instance_alive: Rc<Cell<bool>>,
    parameters: RefCell<MaterialParameters>,
}

#[derive(Clone)]
pub struct Material {
    inner: Rc<MaterialInner>,
}

impl fmt::Debug for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Material")
            .field("program", &self.inner.internal.handle)
            .field("instance", &self.inner.instance)
            .field("parameters", &self.inner.parameters.borrow().len())
            .finish()
    }
}

impl PartialEq for Material {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Material {
    #[must_use]
    pub fn builder() -> MaterialBuilder {
        MaterialBuilder::default()
    }

    /// Creates a fresh instance of `internal` with `parameters` applied.
    pub fn new(
        ctx: &EngineContext,
        internal: Rc<MaterialInternalData>,
        parameters: MaterialParameters,
    ) -> Result<Self> {
        let program = internal.handle;
        let instance = ctx.with_engine(|e| e.create_material_instance(program))?;
        let instance_alive = Rc::new(Cell::new(true));
        let alive = Rc::clone(&instance_alive);
        let cleanup = ctx.cleanup().register(move |e| {
            alive.set(false);
            e.destroy_material_instance(instance);
        });

        let material = Self {
            inner: Rc::new(MaterialInner {
                ctx: ctx.clone(),
                internal,
                instance,
                instance_alive,
                parameters: RefCell::new(parameters),
                _cleanup: cleanup,
            }),
        };
        material.apply();
        Ok(material)
    }

    /// New native instance of the same program with a copy of the parameters.
    pub fn make_copy(&self) -> Result<Self> {
        let parameters = self.inner.parameters.borrow().clone();
        Self::new(&self.inner.ctx, Rc::clone(&self.inner.internal), parameters)
    }

    #[inline]
    #[must_use]
    pub fn instance(&self) -> MaterialInstanceHandle {
        self.inner.instance
    }

    /// Whether the native instance still exists.
    #[inline]
    #[must_use]
    pub fn is_instance_valid(&self) -> bool {
        self.inner.instance_alive.get()
    }

    #[must_use]
    pub fn internal_data(&self) -> &Rc<MaterialInternalData> {
        &self.inner.internal
    }

    /// Whether both materials share one compiled program.
    #[must_use]
    pub fn shares_program_with(&self, other: &Material) -> bool {
        Rc::ptr_eq(&self.inner.internal, &other.inner.internal)
    }

    /// Snapshot of the current parameter bag.
    #[must_use]
    pub fn parameters(&self) -> MaterialParameters {
        self.inner.parameters.borrow().clone()
    }

    /// Pushes the full parameter bag to the native instance, if it is valid.
    ///
    /// # Panics
    ///
    /// Panics when called from inside [`EngineContext::with_engine`].
    pub fn apply(&self) {
        if !self.is_instance_valid() {
            return;
        }
        let params = self.inner.parameters.borrow();
        let declared = self.inner.internal.parameter_names();
        self.inner
            .ctx
            .with_engine(|e| params.apply_to(e, self.inner.instance, declared));
    }

    fn update(&self, f: impl FnOnce(&mut MaterialParameters)) {
        f(&mut self.inner.parameters.borrow_mut());
        self.apply();
    }

    // ========================================================================
    // Typed setters
    // ========================================================================

    pub fn set_bool(&self, name: &str, x: bool) {
        self.update(|p| p.set_bool(name, x));
    }

    pub fn set_bool2(&self, name: &str, x: bool, y: bool) {
        self.update(|p| p.set_bool2(name, x, y));
    }

    pub fn set_bool3(&self, name: &str, x: bool, y: bool, z: bool) {
        self.update(|p| p.set_bool3(name, x, y, z));
    }

    pub fn set_bool4(&self, name: &str, x: bool, y: bool, z: bool, w: bool) {
        self.update(|p| p.set_bool4(name, x, y, z, w));
    }

    pub fn set_int(&self, name: &str, x: i32) {
        self.update(|p| p.set_int(name, x));
    }

    pub fn set_int2(&self, name: &str, x: i32, y: i32) {
        self.update(|p| p.set_int2(name, x, y));
    }

    pub fn set_int3(&self, name: &str, x: i32, y: i32, z: i32) {
        self.update(|p| p.set_int3(name, x, y, z));
    }

    pub fn set_int4(&self, name: &str, x: i32, y: i32, z: i32, w: i32) {
        self.update(|p| p.set_int4(name, x, y, z, w));
    }

    pub fn set_float(&self, name: &str, x: f32) {
        self.update(|p| p.set_float(name, x));
    }

    pub fn set_float2(&self, name: &str, x: f32, y: f32) {
        self.update(|p| p.set_float2(name, x, y));
    }

    pub fn set_float3(&self, name: &str, x: f32, y: f32, z: f32) {
        self.update(|p| p.set_float3(name, x, y, z));
    }

    pub fn set_float4(&self, name: &str, x: f32, y: f32, z: f32, w: f32) {
        self.update(|p| p.set_float4(name, x, y, z, w));
    }

    pub fn set_color(&self, name: &str, color: Vec4) {
        self.update(|p| p.set(name, MaterialParameter::Float4(color)));
    }

    pub fn set_texture(&self, name: &str, texture: &Texture) {
        self.update(|p| p.set_texture(name, texture));
    }

    pub fn set_external_texture(&self, name: &str, texture: ExternalTextureHandle) {
        self.update(|p| p.set_external_texture(name, texture));
    }

    /// Overlays `other` onto this material's parameters.
    pub fn merge(&self, other: &MaterialParameters) {
        self.update(|p| p.merge(other));
    }

    /// Adds the parameters of `other` this material does not set yet.
    pub fn merge_if_absent(&self, other: &MaterialParameters) {
        self.update(|p| p.merge_if_absent(other));
    }

    /// Replaces the parameter bag with a copy of `other`.
    pub fn copy_parameters_from(&self, other: &MaterialParameters) {
        self.update(|p| p.copy_from(other));
    }
}

/// Fluent description of a material load.
#[derive(Default)]
pub struct MaterialBuilder {
    source: Option<MaterialSource>,
    registry_id: Option<String>,
}

impl MaterialBuilder {
    #[must_use]
    pub fn builtin(mut self, kind: BuiltinMaterial) -> Self {
        self.source = Some(MaterialSource::Builtin(kind));
        self
    }

    #[must_use]
    pub fn program(mut self, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.source = Some(MaterialSource::Compiled(bytes.into()));
        self
    }

    #[must_use]
    pub fn registry_id(mut self, id: impl Into<String>) -> Self {
        self.registry_id = Some(id.into());
        self
    }

    /// Resolves to a material owning a fresh native instance.
    ///
    /// Builds sharing a registry id share one compiled program for as long as
    /// any material using it is alive.
    pub fn build(self, ctx: &EngineContext) -> LocalBoxFuture<'static, Result<Material>> {
        let Some(source) = self.source else {
            return futures::future::ready(Err(Error::MissingSource(
                "material has no program".into(),
            )))
            .boxed_local();
        };
        let ctx = ctx.clone();

        let Some(id) = self.registry_id else {
            return futures::future::ready(
                MaterialInternalData::create(&ctx, &source)
                    .and_then(|internal| Material::new(&ctx, internal, MaterialParameters::new())),
            )
            .boxed_local();
        };

        let registry = Rc::clone(ctx.material_registry());
        let shared = registry.get(&id).unwrap_or_else(|| {
            let program = MaterialInternalData::create(&ctx, &source);
            registry.register(id, futures::future::ready(program).boxed_local())
        });
        async move {
            let internal = shared.await?;
            Material::new(&ctx, internal, MaterialParameters::new())
        }
        .boxed_local()
    }
}
