//! Headless Engine
//!
//! An [`Engine`] implementation with no GPU behind it. Handles are allocated
//! from slot maps and every call is appended to an [`EngineJournal`] that can
//! be inspected from any thread, which makes call ordering assertable in tests
//! and lets hosts run the full scene pipeline without a display.
//!
//! Compiled materials are plain UTF-8: the program bytes are a comma or
//! newline separated list of the parameter names the program declares.

use std::sync::Arc;

use glam::{Mat4, Vec4};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SlotMap;

use super::{
    CameraHandle, Engine, EntityHandle, GltfAssetHandle, GltfAssetInfo, IndexBufferHandle,
    IndexFormat, LightDescriptor, LightType, MaterialHandle, MaterialInstanceHandle,
    MaterialSource, NativeMaterial, NativeSceneHandle, ParameterValue, RenderableDescriptor,
    RendererHandle, SurfaceHandle, SwapChainHandle, TextureDescriptor, TextureFormat,
    TextureHandle, VertexAttributes, VertexBufferHandle, ViewHandle, Viewport,
};
use crate::errors::{Error, Result};

/// One recorded native call.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    CreateSwapChain(SurfaceHandle),
    DestroySwapChain(SwapChainHandle),
    CreateRenderer,
    DestroyRenderer,
    CreateScene,
    DestroyScene,
    CreateCamera,
    DestroyCamera,
    SetCameraMatrices {
        camera: CameraHandle,
        view: Mat4,
        projection: Mat4,
    },
    CreateView,
    DestroyView(ViewHandle),
    SetViewport(ViewHandle, Viewport),
    SetClearColor(ViewHandle, Vec4),
    CreateVertexBuffer {
        attributes: VertexAttributes,
        vertex_count: usize,
    },
    UpdateVertexBuffer {
        buffer: VertexBufferHandle,
        len: usize,
    },
    DestroyVertexBuffer(VertexBufferHandle),
    CreateIndexBuffer {
        format: IndexFormat,
        index_count: usize,
    },
    UpdateIndexBuffer {
        buffer: IndexBufferHandle,
        len: usize,
    },
    DestroyIndexBuffer(IndexBufferHandle),
    CreateTexture {
        width: u32,
        height: u32,
        format: TextureFormat,
    },
    DestroyTexture(TextureHandle),
    CreateMaterial,
    DestroyMaterial(MaterialHandle),
    CreateMaterialInstance(MaterialHandle),
    DestroyMaterialInstance(MaterialInstanceHandle),
    SetParameter {
        instance: MaterialInstanceHandle,
        name: String,
        value: ParameterValue,
    },
    CreateEntity(EntityHandle),
    DestroyEntity(EntityHandle),
    SetRenderable {
        entity: EntityHandle,
        priority: u8,
        cast_shadows: bool,
        receive_shadows: bool,
        primitives: usize,
    },
    RemoveRenderable(EntityHandle),
    SetLight {
        entity: EntityHandle,
        light_type: LightType,
    },
    RemoveLight(EntityHandle),
    SceneAdd(EntityHandle),
    SceneRemove(EntityHandle),
    OpenTransformTransaction,
    SetWorldTransform {
        entity: EntityHandle,
        world: Mat4,
    },
    CommitTransformTransaction,
    CreateGltfAsset {
        container_len: usize,
        resources: Vec<String>,
    },
    DestroyGltfAsset(GltfAssetHandle),
    InstantiateGltf(GltfAssetHandle),
    DestroyGltfInstance(EntityHandle),
    BeginFrame,
    Render(ViewHandle),
    MirrorFrame {
        target: SwapChainHandle,
        destination: Viewport,
        source: Viewport,
        clear: bool,
    },
    EndFrame,
}

/// Number of native objects of each kind currently alive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveCounts {
    pub swap_chains: usize,
    pub vertex_buffers: usize,
    pub index_buffers: usize,
    pub textures: usize,
    pub materials: usize,
    pub material_instances: usize,
    pub entities: usize,
    pub gltf_assets: usize,
}

#[derive(Debug)]
struct JournalInner {
    calls: Vec<EngineCall>,
    live: LiveCounts,
    frame_ready: bool,
    fail_creation: bool,
    /// Creations still allowed before every further one fails.
    creation_budget: Option<usize>,
}

impl Default for JournalInner {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            live: LiveCounts::default(),
            frame_ready: true,
            fail_creation: false,
            creation_budget: None,
        }
    }
}

/// Shared, thread-safe view of everything a [`HeadlessEngine`] was asked to do.
///
/// The journal also carries the engine's fault switches, so a test can keep
/// steering the engine after handing it to an
/// [`EngineContext`](crate::engine::EngineContext).
#[derive(Debug, Clone, Default)]
pub struct EngineJournal {
    inner: Arc<Mutex<JournalInner>>,
}

impl EngineJournal {
    fn record(&self, call: EngineCall) {
        log::trace!("native call: {call:?}");
        self.inner.lock().calls.push(call);
    }

    fn live_mut(&self, f: impl FnOnce(&mut LiveCounts)) {
        f(&mut self.inner.lock().live);
    }

    /// Snapshot of every call recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        self.inner.lock().calls.clone()
    }

    /// Forgets recorded calls; live counts are kept.
    pub fn clear(&self) {
        self.inner.lock().calls.clear();
    }

    #[must_use]
    pub fn count(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.inner.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Index of the first call matching `predicate`.
    #[must_use]
    pub fn position(&self, predicate: impl Fn(&EngineCall) -> bool) -> Option<usize> {
        self.inner.lock().calls.iter().position(predicate)
    }

    #[must_use]
    pub fn live(&self) -> LiveCounts {
        self.inner.lock().live
    }

    /// Controls the value returned by [`Engine::begin_frame`].
    pub fn set_frame_ready(&self, ready: bool) {
        self.inner.lock().frame_ready = ready;
    }

    /// Makes every subsequent fallible `create_*` call fail.
    pub fn set_fail_creation(&self, fail: bool) {
        let mut inner = self.inner.lock();
        inner.fail_creation = fail;
        inner.creation_budget = None;
    }

    /// Lets the next `count` fallible `create_*` calls succeed and fails
    /// every one after them.
    pub fn fail_creation_after(&self, count: usize) {
        let mut inner = self.inner.lock();
        inner.fail_creation = false;
        inner.creation_budget = Some(count);
    }
}

#[derive(Debug, Default)]
struct EntityState {
    renderable: bool,
    light: bool,
    gltf_instance: Option<GltfAssetHandle>,
}

impl EntityState {
    fn is_bare(&self) -> bool {
        !self.renderable && !self.light && self.gltf_instance.is_none()
    }
}

/// In-process [`Engine`] that allocates handles and journals every call.
pub struct HeadlessEngine {
    journal: EngineJournal,

    swap_chains: SlotMap<SwapChainHandle, SurfaceHandle>,
    renderers: SlotMap<RendererHandle, ()>,
    scenes: SlotMap<NativeSceneHandle, FxHashSet<EntityHandle>>,
    cameras: SlotMap<CameraHandle, ()>,
    views: SlotMap<ViewHandle, ()>,
    vertex_buffers: SlotMap<VertexBufferHandle, usize>,
    index_buffers: SlotMap<IndexBufferHandle, usize>,
    textures: SlotMap<TextureHandle, ()>,
    materials: SlotMap<MaterialHandle, Vec<String>>,
    material_instances: SlotMap<MaterialInstanceHandle, FxHashMap<String, ParameterValue>>,
    entities: SlotMap<EntityHandle, EntityState>,
    gltf_assets: SlotMap<GltfAssetHandle, ()>,

    transaction_open: bool,
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            journal: EngineJournal::default(),
            swap_chains: SlotMap::with_key(),
            renderers: SlotMap::with_key(),
            scenes: SlotMap::with_key(),
            cameras: SlotMap::with_key(),
            views: SlotMap::with_key(),
            vertex_buffers: SlotMap::with_key(),
            index_buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            materials: SlotMap::with_key(),
            material_instances: SlotMap::with_key(),
            entities: SlotMap::with_key(),
            gltf_assets: SlotMap::with_key(),
            transaction_open: false,
        }
    }

    /// Returns a handle to the call journal that outlives the engine.
    #[must_use]
    pub fn journal(&self) -> EngineJournal {
        self.journal.clone()
    }

    fn check_creation(&self, what: &str) -> Result<()> {
        let mut guard = self.journal.inner.lock();
        let inner = &mut *guard;
        let refused = inner.fail_creation
            || match inner.creation_budget.as_mut() {
                Some(0) => true,
                Some(budget) => {
                    *budget -= 1;
                    false
                }
                None => false,
            };
        if refused {
            return Err(Error::Native(format!("headless engine refused to create {what}")));
        }
        Ok(())
    }

    fn parse_program(bytes: &[u8]) -> Result<Vec<String>> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::Native(format!("material program is not UTF-8: {e}")))?;
        Ok(text
            .split([',', '\n'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect())
    }
}

impl Engine for HeadlessEngine {
    fn create_swap_chain(&mut self, surface: SurfaceHandle) -> Result<SwapChainHandle> {
        self.check_creation("swap chain")?;
        let handle = self.swap_chains.insert(surface);
        self.journal.record(EngineCall::CreateSwapChain(surface));
        self.journal.live_mut(|l| l.swap_chains += 1);
        Ok(handle)
    }

    fn destroy_swap_chain(&mut self, swap_chain: SwapChainHandle) {
        if self.swap_chains.remove(swap_chain).is_some() {
            self.journal.live_mut(|l| l.swap_chains -= 1);
        }
        self.journal.record(EngineCall::DestroySwapChain(swap_chain));
    }

    fn create_renderer(&mut self) -> Result<RendererHandle> {
        self.check_creation("renderer")?;
        self.journal.record(EngineCall::CreateRenderer);
        Ok(self.renderers.insert(()))
    }

    fn destroy_renderer(&mut self, renderer: RendererHandle) {
        self.renderers.remove(renderer);
        self.journal.record(EngineCall::DestroyRenderer);
    }

    fn create_scene(&mut self) -> Result<NativeSceneHandle> {
        self.check_creation("scene")?;
        self.journal.record(EngineCall::CreateScene);
        Ok(self.scenes.insert(FxHashSet::default()))
    }

    fn destroy_scene(&mut self, scene: NativeSceneHandle) {
        self.scenes.remove(scene);
        self.journal.record(EngineCall::DestroyScene);
    }

    fn create_camera(&mut self) -> Result<CameraHandle> {
        self.check_creation("camera")?;
        self.journal.record(EngineCall::CreateCamera);
        Ok(self.cameras.insert(()))
    }

    fn destroy_camera(&mut self, camera: CameraHandle) {
        self.cameras.remove(camera);
        self.journal.record(EngineCall::DestroyCamera);
    }

    fn set_camera_matrices(&mut self, camera: CameraHandle, view: Mat4, projection: Mat4) {
        self.journal.record(EngineCall::SetCameraMatrices {
            camera,
            view,
            projection,
        });
    }

    fn create_view(&mut self, _scene: NativeSceneHandle, _camera: CameraHandle) -> Result<ViewHandle> {
        self.check_creation("view")?;
        self.journal.record(EngineCall::CreateView);
        Ok(self.views.insert(()))
    }

    fn destroy_view(&mut self, view: ViewHandle) {
        self.views.remove(view);
        self.journal.record(EngineCall::DestroyView(view));
    }

    fn set_view_viewport(&mut self, view: ViewHandle, viewport: Viewport) {
        self.journal.record(EngineCall::SetViewport(view, viewport));
    }

    fn set_view_clear_color(&mut self, view: ViewHandle, color: Vec4) {
        self.journal.record(EngineCall::SetClearColor(view, color));
    }

    fn create_vertex_buffer(
        &mut self,
        attributes: VertexAttributes,
        vertex_count: usize,
    ) -> Result<VertexBufferHandle> {
        self.check_creation("vertex buffer")?;
        let handle = self
            .vertex_buffers
            .insert(vertex_count * attributes.stride());
        self.journal.record(EngineCall::CreateVertexBuffer {
            attributes,
            vertex_count,
        });
        self.journal.live_mut(|l| l.vertex_buffers += 1);
        Ok(handle)
    }

    fn update_vertex_buffer(&mut self, buffer: VertexBufferHandle, bytes: &[u8]) {
        if let Some(&capacity) = self.vertex_buffers.get(buffer) {
            assert!(
                bytes.len() <= capacity,
                "vertex upload of {} bytes overflows buffer of {capacity}",
                bytes.len()
            );
        }
        self.journal.record(EngineCall::UpdateVertexBuffer {
            buffer,
            len: bytes.len(),
        });
    }

    fn destroy_vertex_buffer(&mut self, buffer: VertexBufferHandle) {
        if self.vertex_buffers.remove(buffer).is_some() {
            self.journal.live_mut(|l| l.vertex_buffers -= 1);
        }
        self.journal.record(EngineCall::DestroyVertexBuffer(buffer));
    }

    fn create_index_buffer(
        &mut self,
        format: IndexFormat,
        index_count: usize,
    ) -> Result<IndexBufferHandle> {
        self.check_creation("index buffer")?;
        let handle = self.index_buffers.insert(index_count * format.byte_size());
        self.journal.record(EngineCall::CreateIndexBuffer {
            format,
            index_count,
        });
        self.journal.live_mut(|l| l.index_buffers += 1);
        Ok(handle)
    }

    fn update_index_buffer(&mut self, buffer: IndexBufferHandle, bytes: &[u8]) {
        if let Some(&capacity) = self.index_buffers.get(buffer) {
            assert!(
                bytes.len() <= capacity,
                "index upload of {} bytes overflows buffer of {capacity}",
                bytes.len()
            );
        }
        self.journal.record(EngineCall::UpdateIndexBuffer {
            buffer,
            len: bytes.len(),
        });
    }

    fn destroy_index_buffer(&mut self, buffer: IndexBufferHandle) {
        if self.index_buffers.remove(buffer).is_some() {
            self.journal.live_mut(|l| l.index_buffers -= 1);
        }
        self.journal.record(EngineCall::DestroyIndexBuffer(buffer));
    }

    fn create_texture(&mut self, desc: &TextureDescriptor, pixels: &[u8]) -> Result<TextureHandle> {
        self.check_creation("texture")?;
        let expected = desc.width as usize * desc.height as usize * 4;
        if pixels.len() != expected {
            return Err(Error::Native(format!(
                "texture {}x{} expects {expected} bytes, got {}",
                desc.width,
                desc.height,
                pixels.len()
            )));
        }
        let handle = self.textures.insert(());
        self.journal.record(EngineCall::CreateTexture {
            width: desc.width,
            height: desc.height,
            format: desc.format,
        });
        self.journal.live_mut(|l| l.textures += 1);
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(texture).is_some() {
            self.journal.live_mut(|l| l.textures -= 1);
        }
        self.journal.record(EngineCall::DestroyTexture(texture));
    }

    fn create_material(&mut self, source: &MaterialSource) -> Result<NativeMaterial> {
        self.check_creation("material")?;
        let parameters = match source {
            MaterialSource::Builtin(kind) => kind
                .parameter_names()
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            MaterialSource::Compiled(bytes) => Self::parse_program(bytes)?,
        };
        let handle = self.materials.insert(parameters.clone());
        self.journal.record(EngineCall::CreateMaterial);
        self.journal.live_mut(|l| l.materials += 1);
        Ok(NativeMaterial { handle, parameters })
    }

    fn destroy_material(&mut self, material: MaterialHandle) {
        if self.materials.remove(material).is_some() {
            self.journal.live_mut(|l| l.materials -= 1);
        }
        self.journal.record(EngineCall::DestroyMaterial(material));
    }

    fn create_material_instance(&mut self, material: MaterialHandle) -> Result<MaterialInstanceHandle> {
        self.check_creation("material instance")?;
        if !self.materials.contains_key(material) {
            return Err(Error::Native("material instance of a destroyed material".into()));
        }
        let handle = self.material_instances.insert(FxHashMap::default());
        self.journal.record(EngineCall::CreateMaterialInstance(material));
        self.journal.live_mut(|l| l.material_instances += 1);
        Ok(handle)
    }

    fn destroy_material_instance(&mut self, instance: MaterialInstanceHandle) {
        if self.material_instances.remove(instance).is_some() {
            self.journal.live_mut(|l| l.material_instances -= 1);
        }
        self.journal
            .record(EngineCall::DestroyMaterialInstance(instance));
    }

    fn set_material_parameter(
        &mut self,
        instance: MaterialInstanceHandle,
        name: &str,
        value: &ParameterValue,
    ) {
        if let Some(params) = self.material_instances.get_mut(instance) {
            params.insert(name.to_owned(), value.clone());
        }
        self.journal.record(EngineCall::SetParameter {
            instance,
            name: name.to_owned(),
            value: value.clone(),
        });
    }

    fn create_entity(&mut self) -> EntityHandle {
        let entity = self.entities.insert(EntityState::default());
        self.journal.record(EngineCall::CreateEntity(entity));
        self.journal.live_mut(|l| l.entities += 1);
        entity
    }

    fn destroy_entity(&mut self, entity: EntityHandle) {
        if let Some(state) = self.entities.remove(entity) {
            if !state.is_bare() {
                log::warn!("entity {entity:?} destroyed while still carrying components");
            }
            self.journal.live_mut(|l| l.entities -= 1);
        }
        for members in self.scenes.values_mut() {
            members.remove(&entity);
        }
        self.journal.record(EngineCall::DestroyEntity(entity));
    }

    fn set_renderable(&mut self, entity: EntityHandle, desc: &RenderableDescriptor) -> Result<()> {
        let state = self
            .entities
            .get_mut(entity)
            .ok_or_else(|| Error::Native("renderable on a destroyed entity".into()))?;
        state.renderable = true;
        self.journal.record(EngineCall::SetRenderable {
            entity,
            priority: desc.priority,
            cast_shadows: desc.cast_shadows,
            receive_shadows: desc.receive_shadows,
            primitives: desc.primitives.len(),
        });
        Ok(())
    }

    fn remove_renderable(&mut self, entity: EntityHandle) {
        if let Some(state) = self.entities.get_mut(entity) {
            state.renderable = false;
        }
        self.journal.record(EngineCall::RemoveRenderable(entity));
    }

    fn set_light(&mut self, entity: EntityHandle, desc: &LightDescriptor) -> Result<()> {
        let state = self
            .entities
            .get_mut(entity)
            .ok_or_else(|| Error::Native("light on a destroyed entity".into()))?;
        state.light = true;
        self.journal.record(EngineCall::SetLight {
            entity,
            light_type: desc.light_type,
        });
        Ok(())
    }

    fn remove_light(&mut self, entity: EntityHandle) {
        if let Some(state) = self.entities.get_mut(entity) {
            state.light = false;
        }
        self.journal.record(EngineCall::RemoveLight(entity));
    }

    fn scene_add_entity(&mut self, scene: NativeSceneHandle, entity: EntityHandle) {
        if let Some(members) = self.scenes.get_mut(scene) {
            members.insert(entity);
        }
        self.journal.record(EngineCall::SceneAdd(entity));
    }

    fn scene_remove_entity(&mut self, scene: NativeSceneHandle, entity: EntityHandle) {
        if let Some(members) = self.scenes.get_mut(scene) {
            members.remove(&entity);
        }
        self.journal.record(EngineCall::SceneRemove(entity));
    }

    fn open_transform_transaction(&mut self) {
        assert!(!self.transaction_open, "transform transaction already open");
        self.transaction_open = true;
        self.journal.record(EngineCall::OpenTransformTransaction);
    }

    fn set_world_transform(&mut self, entity: EntityHandle, world: Mat4) {
        self.journal
            .record(EngineCall::SetWorldTransform { entity, world });
    }

    fn commit_transform_transaction(&mut self) {
        assert!(self.transaction_open, "no transform transaction to commit");
        self.transaction_open = false;
        self.journal.record(EngineCall::CommitTransformTransaction);
    }

    fn create_gltf_asset(
        &mut self,
        container: &[u8],
        resources: &FxHashMap<String, Vec<u8>>,
    ) -> Result<GltfAssetInfo> {
        self.check_creation("glTF asset")?;
        if container.is_empty() {
            return Err(Error::Gltf("empty glTF container".into()));
        }
        let mut names: Vec<String> = resources.keys().cloned().collect();
        names.sort();
        let asset = self.gltf_assets.insert(());
        self.journal.record(EngineCall::CreateGltfAsset {
            container_len: container.len(),
            resources: names,
        });
        self.journal.live_mut(|l| l.gltf_assets += 1);
        Ok(GltfAssetInfo {
            asset,
            bounding_box: None,
            animation_names: Vec::new(),
        })
    }

    fn destroy_gltf_asset(&mut self, asset: GltfAssetHandle) {
        if self.gltf_assets.remove(asset).is_some() {
            self.journal.live_mut(|l| l.gltf_assets -= 1);
        }
        self.journal.record(EngineCall::DestroyGltfAsset(asset));
    }

    fn instantiate_gltf_asset(&mut self, asset: GltfAssetHandle) -> Result<EntityHandle> {
        if !self.gltf_assets.contains_key(asset) {
            return Err(Error::Native("instance of a destroyed glTF asset".into()));
        }
        let root = self.entities.insert(EntityState {
            gltf_instance: Some(asset),
            ..EntityState::default()
        });
        self.journal.record(EngineCall::InstantiateGltf(asset));
        self.journal.live_mut(|l| l.entities += 1);
        Ok(root)
    }

    fn destroy_gltf_instance(&mut self, root: EntityHandle) {
        if let Some(state) = self.entities.remove(root) {
            debug_assert!(state.gltf_instance.is_some());
            self.journal.live_mut(|l| l.entities -= 1);
        }
        self.journal.record(EngineCall::DestroyGltfInstance(root));
    }

    fn begin_frame(&mut self, _renderer: RendererHandle, _swap_chain: SwapChainHandle) -> bool {
        self.journal.record(EngineCall::BeginFrame);
        self.journal.inner.lock().frame_ready
    }

    fn render(&mut self, _renderer: RendererHandle, view: ViewHandle) {
        self.journal.record(EngineCall::Render(view));
    }

    fn mirror_frame(
        &mut self,
        _renderer: RendererHandle,
        target: SwapChainHandle,
        destination: Viewport,
        source: Viewport,
        clear: bool,
    ) {
        self.journal.record(EngineCall::MirrorFrame {
            target,
            destination,
            source,
            clear,
        });
    }

    fn end_frame(&mut self, _renderer: RendererHandle) {
        self.journal.record(EngineCall::EndFrame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BuiltinMaterial;

    #[test]
    fn compiled_program_declares_parameters() {
        let mut engine = HeadlessEngine::new();
        let source = MaterialSource::Compiled(Arc::from(&b"baseColor, roughness\nmetallic"[..]));
        let material = engine.create_material(&source).unwrap();
        assert_eq!(material.parameters, ["baseColor", "roughness", "metallic"]);
    }

    #[test]
    fn live_counts_follow_create_and_destroy() {
        let mut engine = HeadlessEngine::new();
        let journal = engine.journal();
        let vb = engine
            .create_vertex_buffer(VertexAttributes::POSITION, 3)
            .unwrap();
        let material = engine
            .create_material(&MaterialSource::Builtin(BuiltinMaterial::OpaqueColor))
            .unwrap();
        assert_eq!(journal.live().vertex_buffers, 1);
        assert_eq!(journal.live().materials, 1);

        engine.destroy_vertex_buffer(vb);
        engine.destroy_material(material.handle);
        assert_eq!(journal.live(), LiveCounts::default());
    }

    #[test]
    fn creation_failure_is_reported() {
        let mut engine = HeadlessEngine::new();
        engine.journal().set_fail_creation(true);
        assert!(matches!(engine.create_scene(), Err(Error::Native(_))));
    }

    #[test]
    fn creation_budget_runs_out() {
        let mut engine = HeadlessEngine::new();
        let journal = engine.journal();
        journal.fail_creation_after(1);
        assert!(engine.create_vertex_buffer(VertexAttributes::POSITION, 3).is_ok());
        assert!(engine.create_index_buffer(IndexFormat::U16, 3).is_err());

        journal.set_fail_creation(false);
        assert!(engine.create_index_buffer(IndexFormat::U16, 3).is_ok());
    }
}
