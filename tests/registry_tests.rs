//! Resource Registry Tests
//!
//! Tests for:
//! - Concurrent requests for one id sharing a single future
//! - Completed entries held weakly and evicted once dead
//! - Stale completions never overwriting a newer registration
//! - Failed loads not being cached
//! - Forced teardown cancelling in-flight loads
//! - ResourceManager fan-out over every holder

use std::cell::Cell;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::executor::LocalPool;
use futures::future::{FutureExt, LocalBoxFuture};

use sceneweave::Error;
use sceneweave::assets::{ResourceHolder, ResourceManager, ResourceRegistry};
use sceneweave::errors::Result;

type Load = LocalBoxFuture<'static, Result<Rc<u32>>>;

/// A load that completes when the returned sender fires.
fn pending_load() -> (oneshot::Sender<Result<Rc<u32>>>, Load) {
    let (tx, rx) = oneshot::channel();
    let load = rx.map(|r| r.unwrap_or_else(|_| Err(Error::Cancelled("sender dropped".into()))));
    (tx, load.boxed_local())
}

fn ready_load(value: &Rc<u32>) -> Load {
    futures::future::ready(Ok(Rc::clone(value))).boxed_local()
}

// ============================================================================
// Deduplication
// ============================================================================

#[test]
fn get_returns_none_for_unknown_id() {
    let pool = LocalPool::new();
    let registry = ResourceRegistry::<u32>::new("test", pool.spawner());
    assert!(registry.get("modelA").is_none());
    assert!(registry.is_empty());
}

#[test]
fn concurrent_requests_share_one_future() {
    let mut pool = LocalPool::new();
    let registry = ResourceRegistry::<u32>::new("test", pool.spawner());

    let (tx, load) = pending_load();
    let first = registry.register("modelA", load);
    let second = registry.get("modelA").expect("in-flight entry");
    assert!(first.ptr_eq(&second));

    tx.send(Ok(Rc::new(7))).unwrap();
    let a = pool.run_until(first).unwrap();
    let b = pool.run_until(second).unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(*a, 7);
}

#[test]
fn completed_entry_is_served_while_alive() {
    let mut pool = LocalPool::new();
    let registry = ResourceRegistry::<u32>::new("test", pool.spawner());

    let value = Rc::new(3);
    let _ = registry.register("a", ready_load(&value));
    pool.run_until_stalled();

    let again = registry.get("a").expect("live entry");
    let resolved = pool.run_until(again).unwrap();
    assert!(Rc::ptr_eq(&resolved, &value));
}

#[test]
fn completed_entry_is_weak() {
    let mut pool = LocalPool::new();
    let registry = ResourceRegistry::<u32>::new("test", pool.spawner());

    let value = Rc::new(3);
    let shared = registry.register("a", ready_load(&value));
    pool.run_until_stalled();
    drop(shared);
    drop(value);

    assert!(registry.get("a").is_none());
    assert!(registry.is_empty());
}

// ============================================================================
// Stale completion guard
// ============================================================================

#[test]
fn stale_registration_does_not_overwrite_newer_one() {
    let mut pool = LocalPool::new();
    let registry = ResourceRegistry::<u32>::new("test", pool.spawner());

    let (old_tx, old_load) = pending_load();
    let _old = registry.register("a", old_load);
    let (new_tx, new_load) = pending_load();
    let _new = registry.register("a", new_load);

    let newer = Rc::new(2);
    new_tx.send(Ok(Rc::clone(&newer))).unwrap();
    pool.run_until_stalled();

    let older = Rc::new(1);
    old_tx.send(Ok(Rc::clone(&older))).unwrap();
    pool.run_until_stalled();

    let current = pool.run_until(registry.get("a").unwrap()).unwrap();
    assert!(Rc::ptr_eq(&current, &newer));
}

#[test]
fn late_failure_of_superseded_load_keeps_newer_entry() {
    let mut pool = LocalPool::new();
    let registry = ResourceRegistry::<u32>::new("test", pool.spawner());

    let (old_tx, old_load) = pending_load();
    let _old = registry.register("a", old_load);
    let value = Rc::new(9);
    let _new = registry.register("a", ready_load(&value));
    pool.run_until_stalled();

    old_tx.send(Err(Error::InvalidBundle("corrupt".into()))).unwrap();
    pool.run_until_stalled();

    assert_eq!(registry.len(), 1);
    assert!(registry.get("a").is_some());
}

// ============================================================================
// Failures and teardown
// ============================================================================

#[test]
fn failed_load_is_not_cached() {
    let mut pool = LocalPool::new();
    let registry = ResourceRegistry::<u32>::new("test", pool.spawner());

    let load = futures::future::ready(Err(Error::InvalidBundle("bad magic".into()))).boxed_local();
    let shared = registry.register("a", load);
    assert!(pool.run_until(shared).is_err());
    pool.run_until_stalled();

    assert!(registry.get("a").is_none(), "next request must retry");
}

#[test]
fn destroy_all_cancels_in_flight_loads() {
    let mut pool = LocalPool::new();
    let registry = ResourceRegistry::<u32>::new("test", pool.spawner());

    let (tx, load) = pending_load();
    let shared = registry.register("a", load);
    registry.destroy_all_resources();
    assert!(registry.is_empty());

    // The producer finishing later is discarded.
    let _ = tx.send(Ok(Rc::new(1)));
    let result = pool.run_until(shared);
    assert!(matches!(result, Err(Error::Cancelled(_))));
}

#[test]
fn reclaim_keeps_in_flight_entries() {
    let mut pool = LocalPool::new();
    let registry = ResourceRegistry::<u32>::new("test", pool.spawner());

    let (_tx, load) = pending_load();
    let _pending = registry.register("loading", load);
    let dead = Rc::new(0);
    let _ = registry.register("dead", ready_load(&dead));
    pool.run_until_stalled();
    drop(dead);

    assert_eq!(registry.reclaim_released_resources(), 1);
    assert!(registry.get("loading").is_some());
}

// ============================================================================
// ResourceManager
// ============================================================================

struct CountingHolder {
    reclaims: Cell<usize>,
    destroys: Cell<usize>,
    tracked: usize,
}

impl ResourceHolder for CountingHolder {
    fn reclaim_released_resources(&self) -> usize {
        self.reclaims.set(self.reclaims.get() + 1);
        self.tracked
    }

    fn destroy_all_resources(&self) {
        self.destroys.set(self.destroys.get() + 1);
    }
}

#[test]
fn manager_sums_remaining_counts_and_forwards_teardown() {
    let a = Rc::new(CountingHolder {
        reclaims: Cell::new(0),
        destroys: Cell::new(0),
        tracked: 2,
    });
    let b = Rc::new(CountingHolder {
        reclaims: Cell::new(0),
        destroys: Cell::new(0),
        tracked: 5,
    });

    let mut manager = ResourceManager::new();
    manager.add_holder(a.clone());
    manager.add_holder(b.clone());
    assert_eq!(manager.holder_count(), 2);

    assert_eq!(manager.reclaim_released_resources(), 7);
    manager.destroy_all_resources();
    assert_eq!((a.reclaims.get(), a.destroys.get()), (1, 1));
    assert_eq!((b.reclaims.get(), b.destroys.get()), (1, 1));
}
