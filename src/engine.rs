//! Engine Context
//!
//! This module contains [`EngineContext`], the explicitly constructed handle
//! through which every component reaches the native engine, the background
//! loader pool and the shared resource registries.
//!
//! # Architecture
//!
//! - **Engine**: the native [`Engine`](crate::backend::Engine), owned by the
//!   render thread and borrowed for the duration of each native call
//! - **Loader runtime**: a `tokio` multi-thread runtime for file reads and
//!   CPU-bound decoding (`spawn_blocking`)
//! - **Local pool**: a single-threaded executor for continuations that touch
//!   render-thread state (registry completion, GPU upload stages)
//! - **Render dispatcher**: a channel through which other threads post work
//!   to the render thread
//! - **Resources**: the cleanup registry and the renderable, material and
//!   texture registries, aggregated by a [`ResourceManager`]
//!
//! # Example
//!
//! ```rust,ignore
//! use sceneweave::{EngineContext, EngineSettings};
//! use sceneweave::backend::headless::HeadlessEngine;
//!
//! let ctx = EngineContext::new(HeadlessEngine::new(), EngineSettings::default())?;
//!
//! // Each frame on the render thread
//! ctx.pump();
//! ```
//!
//! The context is cheap to clone and intentionally `!Send`: holding one is
//! proof of being on the render thread.

use std::cell::RefCell;
use std::future::Future;
use std::pin::pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::ThreadId;
use std::time::Duration;

use futures::channel::oneshot;
use futures::executor::{LocalPool, LocalSpawner};
use futures::task::{ArcWake, LocalSpawnExt};
use serde::{Deserialize, Serialize};

use crate::assets::cleanup::CleanupRegistry;
use crate::assets::holder::ResourceManager;
use crate::assets::io::{AssetReader, FileAssetReader};
use crate::assets::registry::ResourceRegistry;
use crate::backend::Engine;
use crate::errors::{Error, Result};
use crate::renderer::settings::RendererSettings;
use crate::resources::material::MaterialInternalData;
use crate::resources::renderable::Renderable;
use crate::resources::texture::TextureInternalData;

/// The native engine as shared by the render-thread components.
pub type SharedEngine = Rc<RefCell<dyn Engine>>;

/// A unit of work posted to the render thread.
pub type RenderTask = Box<dyn FnOnce(&EngineContext) + Send>;

/// Top-level configuration of an [`EngineContext`].
///
/// # Example
///
/// ```rust,ignore
/// let settings = EngineSettings::from_json(r#"{ "loader_threads": 4 }"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Worker threads of the background loader pool.
    ///
    /// Default: `2`
    pub loader_threads: usize,

    /// Maximum number of posted render tasks executed by a single
    /// [`EngineContext::pump`]. Remaining tasks run on the next pump.
    ///
    /// Default: `64`
    pub render_task_budget: usize,

    /// Frame loop configuration.
    pub renderer: RendererSettings,
}

impl EngineSettings {
    /// Parses settings from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidSettings(e.to_string()))
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            loader_threads: 2,
            render_task_budget: 64,
            renderer: RendererSettings::default(),
        }
    }
}

/// `Send` handle for posting work to the render thread from any thread.
#[derive(Clone)]
pub struct RenderDispatcher {
    sender: flume::Sender<RenderTask>,
}

impl RenderDispatcher {
    /// Posts `task` and returns a receiver for its result.
    ///
    /// The receiver resolves to `Canceled` if the context is dropped before
    /// the task runs.
    pub fn run<R, F>(&self, task: F) -> oneshot::Receiver<R>
    where
        R: Send + 'static,
        F: FnOnce(&EngineContext) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let boxed: RenderTask = Box::new(move |ctx| {
            let _ = tx.send(task(ctx));
        });
        if self.sender.send(boxed).is_err() {
            log::warn!("render task posted after the engine context was dropped");
        }
        rx
    }
}

struct WakeSignal(flume::Sender<()>);

impl ArcWake for WakeSignal {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        let _ = arc_self.0.try_send(());
    }
}

struct ContextInner {
    engine: SharedEngine,
    settings: EngineSettings,
    render_thread: ThreadId,

    runtime: tokio::runtime::Runtime,
    reader: Arc<dyn AssetReader>,

    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
    tasks_tx: flume::Sender<RenderTask>,
    tasks_rx: flume::Receiver<RenderTask>,

    cleanup: Rc<CleanupRegistry>,
    renderables: Rc<ResourceRegistry<Renderable>>,
    materials: Rc<ResourceRegistry<MaterialInternalData>>,
    textures: Rc<ResourceRegistry<TextureInternalData>>,
    resources: ResourceManager,
}

/// Dependency-injected entry point to the native engine and shared services.
#[derive(Clone)]
pub struct EngineContext {
    inner: Rc<ContextInner>,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("render_thread", &self.inner.render_thread)
            .field("tracked_resources", &self.inner.cleanup.tracked_count())
            .finish_non_exhaustive()
    }
}

impl EngineContext {
    /// Creates a context that reads assets from the current directory.
    ///
    /// The calling thread becomes the render thread.
    pub fn new(engine: impl Engine + 'static, settings: EngineSettings) -> Result<Self> {
        Self::with_reader(engine, settings, Arc::new(FileAssetReader::new(".")))
    }

    /// Creates a context with a custom asset reader.
    pub fn with_reader(
        engine: impl Engine + 'static,
        settings: EngineSettings,
        reader: Arc<dyn AssetReader>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(settings.loader_threads.max(1))
            .max_blocking_threads(settings.loader_threads.max(1) * 4)
            .thread_name("sceneweave-loader")
            .build()?;

        let engine: SharedEngine = Rc::new(RefCell::new(engine));
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        let (tasks_tx, tasks_rx) = flume::unbounded();

        let cleanup = Rc::new(CleanupRegistry::new(engine.clone()));
        let renderables = Rc::new(ResourceRegistry::new("renderable", spawner.clone()));
        let materials = Rc::new(ResourceRegistry::new("material", spawner.clone()));
        let textures = Rc::new(ResourceRegistry::new("texture", spawner.clone()));

        let mut resources = ResourceManager::new();
        resources.add_holder(renderables.clone());
        resources.add_holder(materials.clone());
        resources.add_holder(textures.clone());
        // Registries drop their strong references first so the cleanup pass
        // sees every wrapper they kept alive.
        resources.add_holder(cleanup.clone());

        log::info!(
            "engine context created ({} loader threads)",
            settings.loader_threads.max(1)
        );

        Ok(Self {
            inner: Rc::new(ContextInner {
                engine,
                settings,
                render_thread: std::thread::current().id(),
                runtime,
                reader,
                pool: RefCell::new(pool),
                spawner,
                tasks_tx,
                tasks_rx,
                cleanup,
                renderables,
                materials,
                textures,
                resources,
            }),
        })
    }

    // ========================================================================
    // Native engine access
    // ========================================================================

    /// Runs `f` with exclusive access to the native engine.
    ///
    /// # Panics
    ///
    /// Panics when called off the render thread or re-entrantly from inside
    /// another `with_engine` closure.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut dyn Engine) -> R) -> R {
        self.assert_render_thread();
        let mut engine = self.inner.engine.borrow_mut();
        f(&mut *engine)
    }

    #[must_use]
    pub fn engine(&self) -> &SharedEngine {
        &self.inner.engine
    }

    /// Fails fast when the caller is not on the render thread.
    #[inline]
    pub fn assert_render_thread(&self) {
        let current = std::thread::current().id();
        assert_eq!(
            current, self.inner.render_thread,
            "native engine access from {current:?}, render thread is {:?}",
            self.inner.render_thread
        );
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Returns a `Send` handle for posting work to the render thread.
    #[must_use]
    pub fn dispatcher(&self) -> RenderDispatcher {
        RenderDispatcher {
            sender: self.inner.tasks_tx.clone(),
        }
    }

    /// Runs blocking CPU work on the loader pool.
    pub fn spawn_blocking<R, F>(&self, f: F) -> impl Future<Output = Result<R>> + 'static
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let handle = self.inner.runtime.spawn_blocking(f);
        async move { handle.await.map_err(Error::from) }
    }

    /// Reads `uri` through the configured asset reader on the loader pool.
    pub fn read_bytes(&self, uri: &str) -> impl Future<Output = Result<Vec<u8>>> + 'static {
        let reader = self.inner.reader.clone();
        let uri = uri.to_owned();
        let handle = self
            .inner
            .runtime
            .spawn(async move { reader.read_bytes(&uri).await });
        async move { handle.await.map_err(Error::from)? }
    }

    /// Schedules `fut` on the render-thread local pool.
    pub fn spawn_local(&self, fut: impl Future<Output = ()> + 'static) {
        if let Err(e) = self.inner.spawner.spawn_local(fut) {
            log::error!("failed to spawn render-thread continuation: {e}");
        }
    }

    /// Drains posted render tasks (bounded by the task budget) and advances
    /// render-thread continuations until they stall.
    ///
    /// Returns the number of posted tasks executed.
    pub fn pump(&self) -> usize {
        self.assert_render_thread();

        let budget = self.inner.settings.render_task_budget.max(1);
        let mut ran = 0;
        while ran < budget {
            let Ok(task) = self.inner.tasks_rx.try_recv() else {
                break;
            };
            task(self);
            ran += 1;
        }

        // Re-entrant pumps from inside a continuation are no-ops.
        if let Ok(mut pool) = self.inner.pool.try_borrow_mut() {
            pool.run_until_stalled();
        }

        if ran > 0 {
            log::trace!("pump executed {ran} render tasks");
        }
        ran
    }

    /// Drives `fut` to completion on the render thread, pumping between polls.
    ///
    /// Intended for hosts without an event loop and for tests.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        let (wake_tx, wake_rx) = flume::bounded(1);
        let waker = futures::task::waker(Arc::new(WakeSignal(wake_tx)));
        let mut cx = Context::from_waker(&waker);
        let mut fut = pin!(fut);

        loop {
            if let Poll::Ready(out) = fut.as_mut().poll(&mut cx) {
                return out;
            }
            if self.pump() == 0 {
                let _ = wake_rx.recv_timeout(Duration::from_millis(2));
            }
        }
    }

    // ========================================================================
    // Resources
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn cleanup(&self) -> &Rc<CleanupRegistry> {
        &self.inner.cleanup
    }

    #[inline]
    #[must_use]
    pub fn renderable_registry(&self) -> &Rc<ResourceRegistry<Renderable>> {
        &self.inner.renderables
    }

    #[inline]
    #[must_use]
    pub fn material_registry(&self) -> &Rc<ResourceRegistry<MaterialInternalData>> {
        &self.inner.materials
    }

    #[inline]
    #[must_use]
    pub fn texture_registry(&self) -> &Rc<ResourceRegistry<TextureInternalData>> {
        &self.inner.textures
    }

    /// Aggregated reclaim/teardown entry point for host lifecycle callbacks.
    #[inline]
    #[must_use]
    pub fn resources(&self) -> &ResourceManager {
        &self.inner.resources
    }
}
