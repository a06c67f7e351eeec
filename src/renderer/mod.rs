//! Frame Loop
//!
//! [`Renderer`] owns the native renderer, scene, camera and views plus the
//! swap chains of the main surface and of every mirror surface. Once per
//! frame, [`Renderer::render`] reconciles the scene graph against the native
//! engine in a fixed order:
//!
//! 1. recreate the swap chain if the surface changed
//! 2. create and destroy mirror swap chains
//! 3. skip the frame while paused or without a surface
//! 4. push renderable state and world transforms in one transform transaction
//! 5. push lights whose properties or placement changed
//! 6. push the camera matrices
//! 7. begin the frame, run the pre-render hook, render the main view (or the
//!    empty view while the camera is not tracking)
//! 8. copy the frame to each mirror, letterboxed
//! 9. end the frame
//! 10. reclaim resources released since the previous frame
//!
//! Conditions that only mean "not yet" (paused, no surface, native frame not
//! ready) produce [`FrameOutcome::Skipped`]. Native object creation failures
//! are returned as errors.

pub mod settings;

use crate::assets::holder::ResourceHolder;
use crate::backend::{
    CameraHandle, Engine, NativeSceneHandle, RendererHandle, SurfaceHandle, SwapChainHandle,
    ViewHandle, Viewport,
};
use crate::engine::EngineContext;
use crate::errors::Result;
use crate::scene::Scene;

use self::settings::RendererSettings;

/// Runs right after `begin_frame`, before the main view is rendered.
pub type PreRenderHook = Box<dyn FnMut(&mut dyn Engine)>;

/// Why a frame was not rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Paused,
    NoSurface,
    /// The native renderer declined the frame in `begin_frame`.
    NotReady,
}

/// Counters of one rendered frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Active renderable instances whose transforms were pushed.
    pub renderables: usize,
    /// Renderable instances whose native state was re-pushed.
    pub renderables_synced: usize,
    pub lights: usize,
    pub lights_synced: usize,
    /// World matrices rebuilt by the hierarchy update.
    pub transforms_rebuilt: usize,
    pub mirrors: usize,
    /// Whether the empty view was rendered because the camera is inactive.
    pub empty_view: bool,
    /// Resources still tracked after reclamation, when it ran.
    pub tracked_resources: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Rendered(FrameStats),
    Skipped(SkipReason),
}

impl FrameOutcome {
    #[must_use]
    pub fn is_rendered(&self) -> bool {
        matches!(self, FrameOutcome::Rendered(_))
    }
}

#[derive(Debug, Clone, Copy)]
struct NativeObjects {
    renderer: RendererHandle,
    scene: NativeSceneHandle,
    camera: CameraHandle,
    view: ViewHandle,
    empty_scene: NativeSceneHandle,
    empty_view: ViewHandle,
}

#[derive(Debug)]
struct Mirror {
    surface: SurfaceHandle,
    viewport: Viewport,
    swap_chain: Option<SwapChainHandle>,
    removed: bool,
}

/// Centers a rectangle with the aspect ratio of `src` inside `dst`, as
/// large as fits.
#[must_use]
pub fn letterbox_viewport(src: Viewport, dst: Viewport) -> Viewport {
    if src.width == 0 || src.height == 0 || dst.width == 0 || dst.height == 0 {
        return dst;
    }
    let src_aspect = src.aspect();
    if dst.aspect() > src_aspect {
        // Bars left and right.
        let width = ((dst.height as f32 * src_aspect).round() as u32).min(dst.width);
        let left = dst.left + ((dst.width - width) / 2) as i32;
        Viewport::new(left, dst.bottom, width, dst.height)
    } else {
        // Bars top and bottom.
        let height = ((dst.width as f32 / src_aspect).round() as u32).min(dst.height);
        let bottom = dst.bottom + ((dst.height - height) / 2) as i32;
        Viewport::new(dst.left, bottom, dst.width, height)
    }
}

pub struct Renderer {
    ctx: EngineContext,
    settings: RendererSettings,
    native: NativeObjects,

    surface: Option<SurfaceHandle>,
    viewport: Viewport,
    surface_changed: bool,
    swap_chain: Option<(SurfaceHandle, SwapChainHandle)>,

    mirrors: Vec<Mirror>,
    pre_render: Option<PreRenderHook>,

    paused: bool,
    destroyed: bool,
    frame_count: u64,
}

impl Renderer {
    /// Creates the native renderer, scene, camera and views. No swap chain
    /// exists until a surface is set.
    pub fn new(ctx: &EngineContext) -> Result<Self> {
        let settings = ctx.settings().renderer.clone();
        let native = ctx.with_engine(|e| -> Result<NativeObjects> {
            let renderer = e.create_renderer()?;
            let scene = e.create_scene()?;
            let camera = e.create_camera()?;
            let view = e.create_view(scene, camera)?;
            let empty_scene = e.create_scene()?;
            let empty_view = e.create_view(empty_scene, camera)?;
            e.set_view_clear_color(view, settings.clear_color);
            e.set_view_clear_color(empty_view, settings.clear_color);
            Ok(NativeObjects {
                renderer,
                scene,
                camera,
                view,
                empty_scene,
                empty_view,
            })
        })?;

        Ok(Self {
            ctx: ctx.clone(),
            settings,
            native,
            surface: None,
            viewport: Viewport::default(),
            surface_changed: false,
            swap_chain: None,
            mirrors: Vec::new(),
            pre_render: None,
            paused: false,
            destroyed: false,
            frame_count: 0,
        })
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    /// Native scene renderable and light entities are added to.
    #[inline]
    #[must_use]
    pub fn native_scene(&self) -> NativeSceneHandle {
        self.native.scene
    }

    #[inline]
    #[must_use]
    pub fn main_view(&self) -> ViewHandle {
        self.native.view
    }

    #[inline]
    #[must_use]
    pub fn empty_view(&self) -> ViewHandle {
        self.native.empty_view
    }

    #[inline]
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[inline]
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    // ========================================================================
    // Surfaces
    // ========================================================================

    /// Sets (or with `None`, clears) the main surface and its pixel size.
    /// The swap chain is recreated at the start of the next frame.
    pub fn set_surface(&mut self, surface: Option<SurfaceHandle>, width: u32, height: u32) {
        self.surface = surface;
        self.viewport = Viewport::new(0, 0, width, height);
        self.surface_changed = true;
    }

    /// Copies every rendered frame into `viewport` of `surface`.
    pub fn start_mirroring(&mut self, surface: SurfaceHandle, viewport: Viewport) {
        if let Some(mirror) = self.mirrors.iter_mut().find(|m| m.surface == surface && !m.removed) {
            mirror.viewport = viewport;
            return;
        }
        self.mirrors.push(Mirror {
            surface,
            viewport,
            swap_chain: None,
            removed: false,
        });
    }

    pub fn stop_mirroring(&mut self, surface: SurfaceHandle) {
        match self.mirrors.iter_mut().find(|m| m.surface == surface && !m.removed) {
            Some(mirror) => mirror.removed = true,
            None => log::warn!("stop_mirroring: surface {surface:?} is not being mirrored"),
        }
    }

    /// Mirror surfaces that will receive the next frame.
    #[must_use]
    pub fn mirror_count(&self) -> usize {
        self.mirrors.iter().filter(|m| !m.removed).count()
    }

    pub fn set_pre_render_hook(&mut self, hook: Option<PreRenderHook>) {
        self.pre_render = hook;
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn on_resume(&mut self) {
        if self.paused {
            log::info!("renderer resumed after {} frames", self.frame_count);
        }
        self.paused = false;
    }

    pub fn on_pause(&mut self) {
        if !self.paused {
            log::info!("renderer paused");
        }
        self.paused = true;
    }

    /// Destroys every native object the renderer owns. Safe to call twice.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        let native = self.native;
        let mirrors = std::mem::take(&mut self.mirrors);
        let swap_chain = self.swap_chain.take();
        self.ctx.with_engine(|e| {
            for swap_chain in mirrors.iter().filter_map(|m| m.swap_chain) {
                e.destroy_swap_chain(swap_chain);
            }
            if let Some((_, swap_chain)) = swap_chain {
                e.destroy_swap_chain(swap_chain);
            }
            e.destroy_view(native.empty_view);
            e.destroy_view(native.view);
            e.destroy_scene(native.empty_scene);
            e.destroy_scene(native.scene);
            e.destroy_camera(native.camera);
            e.destroy_renderer(native.renderer);
        });
        log::info!("renderer destroyed");
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Renders one frame of `scene`. `debug` logs the frame's counters.
    ///
    /// # Panics
    ///
    /// Panics if the renderer was destroyed.
    pub fn render(&mut self, scene: &mut Scene, debug: bool) -> Result<FrameOutcome> {
        assert!(!self.destroyed, "render called on a destroyed renderer");
        let ctx = self.ctx.clone();

        // 1-2
        self.update_swap_chain(&ctx)?;
        self.reconcile_mirrors(&ctx);

        // 3
        if self.paused {
            return Ok(FrameOutcome::Skipped(SkipReason::Paused));
        }
        let Some((_, swap_chain)) = self.swap_chain else {
            return Ok(FrameOutcome::Skipped(SkipReason::NoSurface));
        };

        let mut stats = FrameStats {
            transforms_rebuilt: scene.update_world_transforms(),
            ..FrameStats::default()
        };
        let native = self.native;

        // 4-5
        ctx.with_engine(|e| Self::push_renderables(e, native.scene, scene, &mut stats))?;
        ctx.with_engine(|e| Self::push_lights(e, native.scene, scene, &mut stats))?;

        // 6
        let camera = scene.camera();
        let camera_active = camera.is_active();
        let (view_matrix, projection) = (camera.view_matrix(), camera.projection_matrix());

        let pre_render = &mut self.pre_render;
        let mirrors = &self.mirrors;
        let source = self.viewport;
        let mirror_clear = self.settings.mirror_clear;
        let began = ctx.with_engine(|e| {
            e.set_camera_matrices(native.camera, view_matrix, projection);

            // 7
            if !e.begin_frame(native.renderer, swap_chain) {
                return false;
            }
            if let Some(hook) = pre_render.as_mut() {
                hook(e);
            }
            if camera_active {
                e.render(native.renderer, native.view);
            } else {
                e.render(native.renderer, native.empty_view);
                stats.empty_view = true;
            }

            // 8
            for mirror in mirrors.iter().filter(|m| !m.removed) {
                let Some(target) = mirror.swap_chain else {
                    continue;
                };
                let destination = letterbox_viewport(source, mirror.viewport);
                e.mirror_frame(native.renderer, target, destination, source, mirror_clear);
                stats.mirrors += 1;
            }

            // 9
            e.end_frame(native.renderer);
            true
        });

        // 10, also for frames the native renderer declined
        if self.settings.reclaim_every_frame {
            stats.tracked_resources = Some(ctx.resources().reclaim_released_resources());
        }
        if !began {
            log::trace!("native renderer skipped frame {}", self.frame_count);
            return Ok(FrameOutcome::Skipped(SkipReason::NotReady));
        }

        self.frame_count += 1;
        if debug {
            log::debug!("frame {}: {stats:?}", self.frame_count);
        }
        Ok(FrameOutcome::Rendered(stats))
    }

    fn update_swap_chain(&mut self, ctx: &EngineContext) -> Result<()> {
        if !self.surface_changed {
            return Ok(());
        }
        self.surface_changed = false;

        let surface = self.surface;
        let viewport = self.viewport;
        let native = self.native;
        let current = self.swap_chain;
        let swap_chain = ctx.with_engine(|e| -> Result<_> {
            e.set_view_viewport(native.view, viewport);
            e.set_view_viewport(native.empty_view, viewport);
            match (current, surface) {
                (Some((old, handle)), Some(new)) if old == new => Ok(Some((old, handle))),
                (current, surface) => {
                    if let Some((_, handle)) = current {
                        e.destroy_swap_chain(handle);
                    }
                    surface
                        .map(|s| e.create_swap_chain(s).map(|handle| (s, handle)))
                        .transpose()
                }
            }
        });
        // A failed creation has already destroyed the old swap chain; retried next frame.
        self.swap_chain = match swap_chain {
            Ok(swap_chain) => swap_chain,
            Err(e) => {
                self.swap_chain = None;
                self.surface_changed = true;
                return Err(e);
            }
        };

        match self.swap_chain {
            Some((surface, _)) => log::info!(
                "swap chain ready for surface {surface:?} ({}x{})",
                viewport.width,
                viewport.height
            ),
            None => log::info!("surface detached"),
        }
        Ok(())
    }

    fn reconcile_mirrors(&mut self, ctx: &EngineContext) {
        let pending = self
            .mirrors
            .iter()
            .any(|m| m.removed || m.swap_chain.is_none());
        if !pending {
            return;
        }

        let mirrors = &mut self.mirrors;
        ctx.with_engine(|e| {
            mirrors.retain(|m| {
                if !m.removed {
                    return true;
                }
                if let Some(swap_chain) = m.swap_chain {
                    e.destroy_swap_chain(swap_chain);
                }
                false
            });
            for mirror in mirrors.iter_mut().filter(|m| m.swap_chain.is_none()) {
                match e.create_swap_chain(mirror.surface) {
                    Ok(swap_chain) => mirror.swap_chain = Some(swap_chain),
                    // Retried next frame.
                    Err(err) => log::warn!("mirror swap chain for {:?}: {err}", mirror.surface),
                }
            }
        });
    }

    fn push_renderables(
        engine: &mut dyn Engine,
        native_scene: NativeSceneHandle,
        scene: &mut Scene,
        stats: &mut FrameStats,
    ) -> Result<()> {
        engine.open_transform_transaction();
        let mut pushed = Ok(());
        for (_, node) in scene.iter_mut() {
            let active = node.is_active();
            let world = *node.transform.world_matrix();
            let Some(instance) = node.renderable_instance_mut() else {
                continue;
            };
            if !active {
                instance.detach(engine);
                continue;
            }
            match instance.sync(engine) {
                Ok(synced) => stats.renderables_synced += usize::from(synced),
                Err(err) => {
                    pushed = Err(err);
                    break;
                }
            }
            instance.attach(engine, native_scene);
            engine.set_world_transform(instance.entity(), instance.world_transform(&world));
            stats.renderables += 1;
        }
        engine.commit_transform_transaction();
        pushed
    }

    fn push_lights(
        engine: &mut dyn Engine,
        native_scene: NativeSceneHandle,
        scene: &mut Scene,
        stats: &mut FrameStats,
    ) -> Result<()> {
        for (_, node) in scene.iter_mut() {
            let active = node.is_active();
            let world = *node.transform.world_matrix();
            let Some(instance) = node.light_instance_mut() else {
                continue;
            };
            if !active {
                instance.detach(engine);
                continue;
            }
            if instance.sync(engine, &world)? {
                stats.lights_synced += 1;
            }
            instance.attach(engine, native_scene);
            stats.lights += 1;
        }
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("surface", &self.surface)
            .field("viewport", &self.viewport)
            .field("mirrors", &self.mirrors)
            .field("paused", &self.paused)
            .field("destroyed", &self.destroyed)
            .field("frame_count", &self.frame_count)
            .finish_non_exhaustive()
    }
}
