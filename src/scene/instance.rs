//! Native bindings of scene attachments.
//!
//! A [`RenderableInstance`] ties one [`Renderable`] to a node and a native
//! entity; a [`LightInstance`] does the same for a [`Light`]. Both own a
//! cleanup token, so dropping them (detaching from the node or removing the
//! node) releases the entity at the next reclamation pass.

use std::cell::Cell;
use std::rc::Rc;

use glam::Mat4;

use crate::assets::cleanup::CleanupToken;
use crate::backend::{Engine, EntityHandle, NativeSceneHandle};
use crate::engine::EngineContext;
use crate::errors::Result;
use crate::resources::renderable::Renderable;
use crate::resources::version_tracker::AppliedVersion;
use crate::scene::light::Light;

type Membership = Rc<Cell<Option<NativeSceneHandle>>>;

fn enter_scene(engine: &mut dyn Engine, membership: &Membership, entity: EntityHandle, scene: NativeSceneHandle) {
    match membership.get() {
        Some(current) if current == scene => {}
        Some(current) => {
            engine.scene_remove_entity(current, entity);
            engine.scene_add_entity(scene, entity);
            membership.set(Some(scene));
        }
        None => {
            engine.scene_add_entity(scene, entity);
            membership.set(Some(scene));
        }
    }
}

fn leave_scene(engine: &mut dyn Engine, membership: &Membership, entity: EntityHandle) {
    if let Some(scene) = membership.take() {
        engine.scene_remove_entity(scene, entity);
    }
}

// ============================================================================
// RenderableInstance
// ============================================================================

#[derive(Debug)]
pub struct RenderableInstance {
    renderable: Renderable,
    entity: EntityHandle,
    membership: Membership,
    applied_change: AppliedVersion,
    applied_data: AppliedVersion,
    blend_orders: Vec<Option<u16>>,
    _cleanup: CleanupToken,
}

impl RenderableInstance {
    /// Creates the native entity. glTF renderables instantiate the asset's
    /// entity tree and use its root.
    pub fn new(ctx: &EngineContext, renderable: Renderable) -> Result<Self> {
        let gltf_asset = renderable.internal_data().gltf_asset();
        let entity = ctx.with_engine(|e| match gltf_asset {
            Some(asset) => e.instantiate_gltf_asset(asset),
            None => Ok(e.create_entity()),
        })?;

        let membership: Membership = Rc::new(Cell::new(None));
        let released = Rc::clone(&membership);
        let cleanup = ctx.cleanup().register(move |e| {
            leave_scene(e, &released, entity);
            if gltf_asset.is_some() {
                e.destroy_gltf_instance(entity);
            } else {
                e.remove_renderable(entity);
                e.destroy_entity(entity);
            }
        });

        let blend_orders = vec![None; renderable.submesh_count()];
        Ok(Self {
            renderable,
            entity,
            membership,
            applied_change: AppliedVersion::default(),
            applied_data: AppliedVersion::default(),
            blend_orders,
            _cleanup: cleanup,
        })
    }

    #[inline]
    #[must_use]
    pub fn renderable(&self) -> &Renderable {
        &self.renderable
    }

    /// Mutable access; changes are picked up through the change id.
    #[inline]
    pub fn renderable_mut(&mut self) -> &mut Renderable {
        &mut self.renderable
    }

    #[inline]
    #[must_use]
    pub fn entity(&self) -> EntityHandle {
        self.entity
    }

    #[must_use]
    pub fn blend_order(&self, submesh: usize) -> Option<u16> {
        self.blend_orders.get(submesh).copied().flatten()
    }

    /// Overrides the blend order of one submesh.
    ///
    /// # Panics
    ///
    /// Panics if `submesh` is out of range.
    pub fn set_blend_order(&mut self, submesh: usize, order: Option<u16>) {
        let count = self.renderable.submesh_count();
        assert!(submesh < count, "submesh index {submesh} out of range ({count} submeshes)");
        if self.blend_orders.len() < count {
            self.blend_orders.resize(count, None);
        }
        self.blend_orders[submesh] = order;
        self.applied_change.invalidate();
    }

    /// Whether the native renderable lags behind the resource.
    #[must_use]
    pub fn needs_sync(&self) -> bool {
        self.applied_change.is_stale(self.renderable.change_id())
            || self.applied_data.is_stale(self.renderable.internal_data().version())
    }

    /// Pushes buffers, materials and flags if anything changed since the
    /// last push. Returns whether a push happened.
    pub fn sync(&mut self, engine: &mut dyn Engine) -> Result<bool> {
        if !self.needs_sync() {
            return Ok(false);
        }
        let count = self.renderable.submesh_count();
        if self.blend_orders.len() != count {
            self.blend_orders.resize(count, None);
        }
        if let Some(descriptor) = self.renderable.descriptor(&self.blend_orders) {
            engine.set_renderable(self.entity, &descriptor)?;
        }
        self.applied_change.mark(self.renderable.change_id());
        self.applied_data.mark(self.renderable.internal_data().version());
        Ok(true)
    }

    /// Node world matrix combined with the model's own scale and offset.
    #[must_use]
    pub fn world_transform(&self, node_world: &Mat4) -> Mat4 {
        *node_world * self.renderable.internal_data().transform_matrix()
    }

    #[must_use]
    pub fn attached_scene(&self) -> Option<NativeSceneHandle> {
        self.membership.get()
    }

    pub fn attach(&self, engine: &mut dyn Engine, scene: NativeSceneHandle) {
        enter_scene(engine, &self.membership, self.entity, scene);
    }

    pub fn detach(&self, engine: &mut dyn Engine) {
        leave_scene(engine, &self.membership, self.entity);
    }
}

// ============================================================================
// LightInstance
// ============================================================================

#[derive(Debug)]
pub struct LightInstance {
    light: Light,
    entity: EntityHandle,
    membership: Membership,
    applied_version: AppliedVersion,
    applied_world: Option<Mat4>,
    _cleanup: CleanupToken,
}

impl LightInstance {
    #[must_use]
    pub fn new(ctx: &EngineContext, light: Light) -> Self {
        let entity = ctx.with_engine(|e| e.create_entity());
        let membership: Membership = Rc::new(Cell::new(None));
        let released = Rc::clone(&membership);
        let cleanup = ctx.cleanup().register(move |e| {
            leave_scene(e, &released, entity);
            e.remove_light(entity);
            e.destroy_entity(entity);
        });
        Self {
            light,
            entity,
            membership,
            applied_version: AppliedVersion::default(),
            applied_world: None,
            _cleanup: cleanup,
        }
    }

    #[inline]
    #[must_use]
    pub fn light(&self) -> &Light {
        &self.light
    }

    #[inline]
    pub fn light_mut(&mut self) -> &mut Light {
        &mut self.light
    }

    #[inline]
    #[must_use]
    pub fn entity(&self) -> EntityHandle {
        self.entity
    }

    /// True when the light or the node placing it changed since the last push.
    #[must_use]
    pub fn is_dirty(&self, world: &Mat4) -> bool {
        self.applied_version.is_stale(self.light.version()) || self.applied_world.as_ref() != Some(world)
    }

    /// Pushes the light if dirty. Returns whether a push happened.
    pub fn sync(&mut self, engine: &mut dyn Engine, world: &Mat4) -> Result<bool> {
        if !self.is_dirty(world) {
            return Ok(false);
        }
        engine.set_light(self.entity, &self.light.descriptor(world))?;
        self.applied_version.mark(self.light.version());
        self.applied_world = Some(*world);
        Ok(true)
    }

    #[must_use]
    pub fn attached_scene(&self) -> Option<NativeSceneHandle> {
        self.membership.get()
    }

    pub fn attach(&self, engine: &mut dyn Engine, scene: NativeSceneHandle) {
        enter_scene(engine, &self.membership, self.entity, scene);
    }

    pub fn detach(&self, engine: &mut dyn Engine) {
        leave_scene(engine, &self.membership, self.entity);
    }
}
