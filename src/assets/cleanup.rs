//! Cleanup Registry
//!
//! Native objects must be destroyed on the render thread, but the wrappers
//! owning them can be dropped anywhere a value goes out of scope. Destruction
//! is therefore split in two:
//!
//! 1. The owner holds a [`CleanupToken`]. Dropping the token posts its id to a
//!    release queue and does nothing else.
//! 2. [`CleanupRegistry::reclaim_released_resources`] drains the queue once
//!    per frame on the render thread and runs the callback registered for each
//!    released id.
//!
//! Every callback runs at most once: either when its token is released and
//! reclaimed, or during [`CleanupRegistry::destroy_all_resources`].

use std::cell::{Cell, RefCell};
use std::fmt;

use rustc_hash::FxHashMap;

use crate::assets::holder::ResourceHolder;
use crate::backend::Engine;
use crate::engine::SharedEngine;

/// Frees native objects. Runs on the render thread.
pub type CleanupCallback = Box<dyn FnOnce(&mut dyn Engine)>;

/// Liveness marker of a tracked owner.
///
/// Not `Clone`: sharing an owner means sharing the value holding its token
/// (typically through an `Rc`).
pub struct CleanupToken {
    id: u64,
    released: flume::Sender<u64>,
}

impl CleanupToken {
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for CleanupToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CleanupToken").field(&self.id).finish()
    }
}

impl Drop for CleanupToken {
    fn drop(&mut self) {
        // The registry may already be gone during shutdown.
        let _ = self.released.send(self.id);
    }
}

pub struct CleanupRegistry {
    engine: SharedEngine,
    next_id: Cell<u64>,
    tracked: RefCell<FxHashMap<u64, CleanupCallback>>,
    released_tx: flume::Sender<u64>,
    released_rx: flume::Receiver<u64>,
}

impl CleanupRegistry {
    #[must_use]
    pub fn new(engine: SharedEngine) -> Self {
        let (released_tx, released_rx) = flume::unbounded();
        Self {
            engine,
            next_id: Cell::new(1),
            tracked: RefCell::new(FxHashMap::default()),
            released_tx,
            released_rx,
        }
    }

    /// Tracks `callback` until the returned token is dropped and reclaimed.
    #[must_use = "dropping the token immediately schedules the callback"]
    pub fn register(&self, callback: impl FnOnce(&mut dyn Engine) + 'static) -> CleanupToken {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.tracked.borrow_mut().insert(id, Box::new(callback));
        CleanupToken {
            id,
            released: self.released_tx.clone(),
        }
    }

    /// Number of callbacks whose owners are still alive (or released but not
    /// yet reclaimed).
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.tracked.borrow().len()
    }

    fn run(&self, callback: CleanupCallback) {
        let mut engine = self.engine.borrow_mut();
        callback(&mut *engine);
    }
}

impl ResourceHolder for CleanupRegistry {
    fn reclaim_released_resources(&self) -> usize {
        let mut reclaimed = 0;
        for id in self.released_rx.try_iter() {
            // Ids of callbacks already run by a forced teardown are ignored.
            let callback = self.tracked.borrow_mut().remove(&id);
            if let Some(callback) = callback {
                self.run(callback);
                reclaimed += 1;
            }
        }
        let remaining = self.tracked_count();
        if reclaimed > 0 {
            log::debug!("reclaimed {reclaimed} native resources, {remaining} still tracked");
        }
        remaining
    }

    fn destroy_all_resources(&self) {
        let drained: Vec<(u64, CleanupCallback)> = self.tracked.borrow_mut().drain().collect();
        log::info!("destroying {} tracked native resources", drained.len());
        for (_, callback) in drained {
            self.run(callback);
        }
        // Stale release notices would otherwise linger until the next poll.
        self.released_rx.drain().for_each(drop);
    }
}
