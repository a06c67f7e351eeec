//! Host glue.
//!
//! [`SceneView`] bundles an [`EngineContext`], a [`Scene`] and a [`Renderer`]
//! and exposes the handful of entry points a host view forwards to: frame
//! callbacks, touch events, surface changes and lifecycle transitions.

use std::time::Instant;

use crate::assets::holder::ResourceHolder;
use crate::backend::{SurfaceHandle, Viewport};
use crate::engine::EngineContext;
use crate::errors::Result;
use crate::renderer::{FrameOutcome, Renderer};
use crate::scene::{MotionEvent, Scene};
use crate::tracking::{self, TrackingReceiver, TrackingSender};

/// Called once per frame after tracking was applied, with the seconds since
/// the previous frame.
pub type UpdateFn = Box<dyn FnMut(&mut Scene, f32)>;

pub struct SceneView {
    ctx: EngineContext,
    pub scene: Scene,
    pub renderer: Renderer,

    tracking_tx: TrackingSender,
    tracking_rx: TrackingReceiver,

    update_fn: Option<UpdateFn>,
    last_frame: Option<Instant>,
    destroyed: bool,
}

impl SceneView {
    pub fn new(ctx: &EngineContext) -> Result<Self> {
        let (tracking_tx, tracking_rx) = tracking::channel();
        Ok(Self {
            ctx: ctx.clone(),
            scene: Scene::new(ctx),
            renderer: Renderer::new(ctx)?,
            tracking_tx,
            tracking_rx,
            update_fn: None,
            last_frame: None,
            destroyed: false,
        })
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Sender for the tracking thread. Only the newest frame queued before
    /// a [`do_frame`](Self::do_frame) is applied.
    #[must_use]
    pub fn tracking_sender(&self) -> TrackingSender {
        self.tracking_tx.clone()
    }

    pub fn set_update_fn<F>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(&mut Scene, f32) + 'static,
    {
        self.update_fn = Some(Box::new(f));
        self
    }

    /// Runs pending render-thread work, applies the newest tracking frame,
    /// runs the update callback and renders.
    ///
    /// # Panics
    ///
    /// Panics if the view was destroyed.
    pub fn do_frame(&mut self, debug: bool) -> Result<FrameOutcome> {
        assert!(!self.destroyed, "do_frame called on a destroyed SceneView");
        self.ctx.pump();

        if let Some(frame) = self.tracking_rx.latest() {
            self.scene.apply_tracking_frame(&frame);
        }

        let now = Instant::now();
        let dt = self
            .last_frame
            .map_or(0.0, |last| now.duration_since(last).as_secs_f32());
        self.last_frame = Some(now);
        if let Some(update) = self.update_fn.as_mut() {
            update(&mut self.scene, dt);
        }

        self.renderer.render(&mut self.scene, debug)
    }

    /// Forwards a touch event to the scene. Returns whether it was consumed.
    pub fn on_touch_event(&mut self, event: &MotionEvent) -> bool {
        self.scene.dispatch_touch_event(event)
    }

    pub fn set_surface(&mut self, surface: Option<SurfaceHandle>, width: u32, height: u32) {
        self.renderer.set_surface(surface, width, height);
    }

    pub fn start_mirroring(&mut self, surface: SurfaceHandle, viewport: Viewport) {
        self.renderer.start_mirroring(surface, viewport);
    }

    pub fn stop_mirroring(&mut self, surface: SurfaceHandle) {
        self.renderer.stop_mirroring(surface);
    }

    pub fn on_resume(&mut self) {
        self.last_frame = None;
        self.renderer.on_resume();
    }

    pub fn on_pause(&mut self) {
        self.renderer.on_pause();
    }

    /// Tears down the renderer and force-releases every tracked resource,
    /// including those still referenced by the scene.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.renderer.destroy();
        self.ctx.resources().destroy_all_resources();
    }
}

impl std::fmt::Debug for SceneView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneView")
            .field("scene", &self.scene)
            .field("renderer", &self.renderer)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}
