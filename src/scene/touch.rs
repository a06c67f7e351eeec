//! Touch dispatch
//!
//! # Events
//!
//! A [`MotionEvent`] carries every pointer currently down. Sets of pointers
//! are [`PointerIds`]; any `u32` is a valid pointer id.
//!
//! # Targets
//!
//! A down event (`Down` or `PointerDown`) hit-tests the new pointer and
//! offers the event to the hit node, then to each ancestor in turn until a
//! listener consumes it. The consuming node becomes the target for that
//! pointer id. Later events are split per target so each target only sees
//! its own pointers, and are routed straight to it without hit testing.
//! `Up` and `Cancel` clear every target.
//!
//! Events no node consumes go to the scene's fallback listener. The peek
//! listener sees every event before dispatch and cannot consume it.

use std::fmt;

use glam::Vec2;
use smallvec::SmallVec;

use crate::scene::NodeHandle;
use crate::scene::collision::HitTestResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionAction {
    /// First pointer went down.
    Down,
    /// An additional pointer went down; the index is into `pointers`.
    PointerDown(usize),
    Move,
    /// A pointer other than the last went up; the index is into `pointers`.
    PointerUp(usize),
    /// Last pointer went up.
    Up,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pointer {
    pub id: u32,
    /// Normalized device coordinates, y up.
    pub position: Vec2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotionEvent {
    pub action: MotionAction,
    pub pointers: SmallVec<[Pointer; 4]>,
}

/// A small set of pointer ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointerIds(SmallVec<[u32; 4]>);

impl PointerIds {
    #[must_use]
    pub fn one(id: u32) -> Self {
        let mut ids = Self::default();
        ids.insert(id);
        ids
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        self.0.contains(&id)
    }

    pub fn insert(&mut self, id: u32) {
        if !self.contains(id) {
            self.0.push(id);
        }
    }

    pub fn insert_all(&mut self, other: &PointerIds) {
        for &id in &other.0 {
            self.insert(id);
        }
    }

    pub fn remove_all(&mut self, other: &PointerIds) {
        self.0.retain(|id| !other.contains(*id));
    }

    #[must_use]
    pub fn intersects(&self, other: &PointerIds) -> bool {
        self.0.iter().any(|&id| other.contains(id))
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<u32> for PointerIds {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut ids = Self::default();
        for id in iter {
            ids.insert(id);
        }
        ids
    }
}

impl MotionEvent {
    #[must_use]
    pub fn new(action: MotionAction, pointers: impl IntoIterator<Item = Pointer>) -> Self {
        Self {
            action,
            pointers: pointers.into_iter().collect(),
        }
    }

    /// Single-pointer event.
    #[must_use]
    pub fn single(action: MotionAction, id: u32, position: Vec2) -> Self {
        Self::new(action, [Pointer { id, position }])
    }

    /// Ids of every pointer in the event.
    #[must_use]
    pub fn ids(&self) -> PointerIds {
        self.pointers.iter().map(|p| p.id).collect()
    }

    /// The pointer that changed state for down and up actions.
    #[must_use]
    pub fn action_pointer(&self) -> Option<&Pointer> {
        match self.action {
            MotionAction::Down | MotionAction::Up => self.pointers.first(),
            MotionAction::PointerDown(i) | MotionAction::PointerUp(i) => self.pointers.get(i),
            MotionAction::Move | MotionAction::Cancel => None,
        }
    }

    /// Sub-event restricted to the pointers in `ids`.
    ///
    /// A `PointerDown`/`PointerUp` whose pointer is kept becomes `Down`/`Up`
    /// when it is the only pointer left, or keeps its kind with the index
    /// remapped. When its pointer is dropped it becomes `Move`. Returns
    /// `None` if no pointer remains.
    #[must_use]
    pub fn split(&self, ids: &PointerIds) -> Option<MotionEvent> {
        let pointers: SmallVec<[Pointer; 4]> = self
            .pointers
            .iter()
            .filter(|p| ids.contains(p.id))
            .copied()
            .collect();
        if pointers.is_empty() {
            return None;
        }

        let remap = |index: usize, single: MotionAction, multi: fn(usize) -> MotionAction| {
            let Some(changed) = self.pointers.get(index) else {
                return MotionAction::Move;
            };
            match pointers.iter().position(|p| p.id == changed.id) {
                Some(_) if pointers.len() == 1 => single,
                Some(new_index) => multi(new_index),
                None => MotionAction::Move,
            }
        };
        let action = match self.action {
            MotionAction::PointerDown(i) => remap(i, MotionAction::Down, MotionAction::PointerDown),
            MotionAction::PointerUp(i) => remap(i, MotionAction::Up, MotionAction::PointerUp),
            other => other,
        };
        Some(MotionEvent { action, pointers })
    }
}

/// What a node listener receives.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTouchEvent {
    /// The node the listener belongs to.
    pub node: NodeHandle,
    /// The hit that started the gesture, when the event is a down event.
    pub hit: Option<HitTestResult>,
    pub event: MotionEvent,
}

/// Scene-level listener; the return value is ignored for peek listeners.
pub type SceneTouchListener = Box<dyn FnMut(Option<&HitTestResult>, &MotionEvent) -> bool>;

/// A node receiving the pointers in `ids`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchTarget {
    pub node: NodeHandle,
    pub ids: PointerIds,
}

/// Per-scene dispatch state.
#[derive(Default)]
pub struct TouchDispatcher {
    pub(crate) targets: Vec<TouchTarget>,
    pub(crate) peek: Option<SceneTouchListener>,
    pub(crate) fallback: Option<SceneTouchListener>,
}

impl TouchDispatcher {
    #[must_use]
    pub fn targets(&self) -> &[TouchTarget] {
        &self.targets
    }

    pub(crate) fn add_target(&mut self, node: NodeHandle, ids: &PointerIds) {
        match self.targets.iter_mut().find(|t| t.node == node) {
            Some(target) => target.ids.insert_all(ids),
            None => self.targets.push(TouchTarget {
                node,
                ids: ids.clone(),
            }),
        }
    }

    pub(crate) fn remove_pointers(&mut self, ids: &PointerIds) {
        for target in &mut self.targets {
            target.ids.remove_all(ids);
        }
        self.targets.retain(|t| !t.ids.is_empty());
    }

    pub(crate) fn forget_node(&mut self, node: NodeHandle) {
        self.targets.retain(|t| t.node != node);
    }
}

impl fmt::Debug for TouchDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TouchDispatcher")
            .field("targets", &self.targets)
            .field("peek", &self.peek.is_some())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_pointer(action: MotionAction) -> MotionEvent {
        MotionEvent::new(
            action,
            [
                Pointer {
                    id: 0,
                    position: Vec2::ZERO,
                },
                Pointer {
                    id: 3,
                    position: Vec2::ONE,
                },
            ],
        )
    }

    #[test]
    fn split_maps_pointer_down_of_kept_pointer_to_down() {
        let event = two_pointer(MotionAction::PointerDown(1));
        let split = event.split(&PointerIds::one(3)).unwrap();
        assert_eq!(split.action, MotionAction::Down);
        assert_eq!(split.pointers.len(), 1);
        assert_eq!(split.pointers[0].id, 3);
    }

    #[test]
    fn split_maps_other_pointer_changes_to_move() {
        let event = two_pointer(MotionAction::PointerUp(1));
        let split = event.split(&PointerIds::one(0)).unwrap();
        assert_eq!(split.action, MotionAction::Move);
        assert!(event.split(&PointerIds::one(5)).is_none());
    }

    #[test]
    fn large_pointer_ids_split_like_small_ones() {
        let event = MotionEvent::new(
            MotionAction::PointerDown(1),
            [
                Pointer {
                    id: 7,
                    position: Vec2::ZERO,
                },
                Pointer {
                    id: 4_000_000,
                    position: Vec2::ONE,
                },
            ],
        );
        let split = event.split(&PointerIds::one(4_000_000)).unwrap();
        assert_eq!(split.action, MotionAction::Down);
        assert_eq!(split.pointers[0].id, 4_000_000);
        assert_eq!(event.ids(), [7, 4_000_000].into_iter().collect::<PointerIds>());
    }

    #[test]
    fn pointer_ids_ignore_duplicates() {
        let mut ids = PointerIds::one(1);
        ids.insert_all(&[1, 2].into_iter().collect());
        assert_eq!(ids.len(), 2);
        ids.remove_all(&PointerIds::one(1));
        assert!(!ids.contains(1));
        assert!(ids.intersects(&PointerIds::one(2)));
    }
}
