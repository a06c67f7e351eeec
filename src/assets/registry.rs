//! Resource Registry
//!
//! Deduplicates loads by resource id without keeping results alive.
//!
//! # Overview
//!
//! Each id maps to at most one entry:
//!
//! - **In flight**: the shared future of a load that has not completed. Every
//!   caller asking for the id receives a clone of the same future.
//! - **Completed**: a [`Weak`] reference to the loaded value. Lookups upgrade
//!   it and hand out a fresh ready future around the same `Rc`; once the last
//!   strong owner is gone the entry is evicted.
//!
//! When a registered future completes, a continuation on the render-thread
//! local pool swaps the in-flight entry for a weak one, but only if the entry
//! still holds that exact future. A later registration for the same id
//! therefore always wins over an earlier one that completes late. Failed
//! loads are dropped from the registry so the next request retries.
//!
//! [`ResourceHolder::destroy_all_resources`] aborts every in-flight entry.
//! Awaiters observe [`Error::Cancelled`]; background work already running on
//! the loader pool finishes and its result is discarded.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use futures::executor::LocalSpawner;
use futures::future::{AbortHandle, Abortable, FutureExt, LocalBoxFuture, Shared};
use futures::task::LocalSpawnExt;
use rustc_hash::FxHashMap;

use crate::assets::holder::ResourceHolder;
use crate::errors::{Error, Result};

/// Shared future of a registered load.
pub type SharedLoad<T> = Shared<LocalBoxFuture<'static, Result<Rc<T>>>>;

enum Entry<T> {
    InFlight {
        future: SharedLoad<T>,
        abort: AbortHandle,
    },
    Completed(Weak<T>),
}

type EntryMap<T> = Rc<RefCell<FxHashMap<String, Entry<T>>>>;

pub struct ResourceRegistry<T> {
    kind: &'static str,
    entries: EntryMap<T>,
    spawner: LocalSpawner,
}

impl<T: 'static> ResourceRegistry<T> {
    #[must_use]
    pub fn new(kind: &'static str, spawner: LocalSpawner) -> Self {
        Self {
            kind,
            entries: Rc::new(RefCell::new(FxHashMap::default())),
            spawner,
        }
    }

    /// Returns the live or loading resource for `id`, if any.
    ///
    /// `None` means the caller must load the resource and [`register`](Self::register) it.
    pub fn get(&self, id: &str) -> Option<SharedLoad<T>> {
        let mut entries = self.entries.borrow_mut();
        let live = match entries.get(id)? {
            Entry::InFlight { future, .. } => return Some(future.clone()),
            Entry::Completed(weak) => weak.upgrade(),
        };
        if live.is_none() {
            entries.remove(id);
        }
        live.map(ready)
    }

    /// Registers a load for `id` and returns the shared future every caller
    /// should await.
    ///
    /// Supersedes any previous entry for the same id.
    pub fn register(
        &self,
        id: impl Into<String>,
        load: LocalBoxFuture<'static, Result<Rc<T>>>,
    ) -> SharedLoad<T> {
        let id = id.into();
        let (abort, registration) = AbortHandle::new_pair();
        let kind = self.kind;
        let cancelled_id = id.clone();
        let future: SharedLoad<T> = Abortable::new(load, registration)
            .map(move |outcome| {
                outcome.unwrap_or_else(|_| {
                    Err(Error::Cancelled(format!("{kind} '{cancelled_id}'")))
                })
            })
            .boxed_local()
            .shared();

        let previous = self.entries.borrow_mut().insert(
            id.clone(),
            Entry::InFlight {
                future: future.clone(),
                abort,
            },
        );
        if matches!(previous, Some(Entry::InFlight { .. })) {
            log::debug!("{kind} '{id}' re-registered while a load was in flight");
        }

        let entries = Rc::clone(&self.entries);
        let watched = future.clone();
        let completion = async move {
            let result = watched.clone().await;
            let mut entries = entries.borrow_mut();
            let current = matches!(
                entries.get(&id),
                Some(Entry::InFlight { future, .. }) if future.ptr_eq(&watched)
            );
            if !current {
                log::trace!("{kind} '{id}' completed after being superseded");
                return;
            }
            match result {
                Ok(value) => {
                    entries.insert(id, Entry::Completed(Rc::downgrade(&value)));
                }
                Err(e) => {
                    log::debug!("{kind} '{id}' failed and was not cached: {e}");
                    entries.remove(&id);
                }
            }
        };
        if let Err(e) = self.spawner.spawn_local(completion) {
            log::error!("failed to track completion of {kind} load: {e}");
        }

        future
    }

    /// Number of entries, live or loading.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn ready<T: 'static>(value: Rc<T>) -> SharedLoad<T> {
    futures::future::ready(Ok(value)).boxed_local().shared()
}

impl<T: 'static> ResourceHolder for ResourceRegistry<T> {
    fn reclaim_released_resources(&self) -> usize {
        let mut entries = self.entries.borrow_mut();
        entries.retain(|_, entry| match entry {
            Entry::InFlight { .. } => true,
            Entry::Completed(weak) => weak.strong_count() > 0,
        });
        entries.len()
    }

    fn destroy_all_resources(&self) {
        let drained: Vec<Entry<T>> = self.entries.borrow_mut().drain().map(|(_, e)| e).collect();
        let mut cancelled = 0;
        for entry in drained {
            if let Entry::InFlight { abort, .. } = entry {
                abort.abort();
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            log::info!("cancelled {cancelled} pending {} loads", self.kind);
        }
    }
}
