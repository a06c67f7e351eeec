//! Touch Dispatch Tests
//!
//! Tests for:
//! - Down events bubbling from the hit node to its ancestors
//! - Gesture targets keeping later events without hit testing
//! - Fallback and peek listeners
//! - Multi-pointer gestures split per target, for any pointer id

use std::cell::RefCell;
use std::rc::Rc;

use glam::{Mat4, Vec2, Vec3, Vec4};

use sceneweave::backend::headless::HeadlessEngine;
use sceneweave::scene::{
    HitTestResult, MotionAction, MotionEvent, NodeTouchEvent, NodeTouchListener, Pointer,
};
use sceneweave::{
    EngineContext, EngineSettings, NodeHandle, Pose, Scene, TrackingFrame, TrackingState,
    material_factory, primitives,
};

const LEFT: Vec2 = Vec2::new(-0.667, 0.0);
const RIGHT: Vec2 = Vec2::new(0.667, 0.0);
const EMPTY: Vec2 = Vec2::new(0.0, 0.9);

type Received = Rc<RefCell<Vec<NodeTouchEvent>>>;

fn context() -> EngineContext {
    let _ = env_logger::builder().is_test(true).try_init();
    EngineContext::new(HeadlessEngine::new(), EngineSettings::default()).unwrap()
}

/// Scene with a tracking camera at the origin looking down -Z.
fn tracked_scene(ctx: &EngineContext) -> Scene {
    let mut scene = Scene::new(ctx);
    scene.apply_tracking_frame(&TrackingFrame {
        timestamp_ns: 1,
        camera_pose: Pose::IDENTITY,
        camera_state: TrackingState::Tracking,
        projection: Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.01, 30.0),
        anchors: Vec::new(),
    });
    scene
}

fn cube_node(ctx: &EngineContext, scene: &mut Scene, name: &str, position: Vec3) -> NodeHandle {
    let material = ctx
        .block_on(material_factory::make_opaque_with_color(ctx, Vec4::ONE))
        .unwrap();
    let cube = primitives::make_cube(ctx, Vec3::ONE, Vec3::ZERO, &material).unwrap();
    let node = scene.create_node(name);
    scene.transform_mut(node).unwrap().position = position;
    scene.set_renderable(node, Some(cube)).unwrap();
    node
}

fn recorder(consume: bool) -> (Received, NodeTouchListener) {
    let received: Received = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&received);
    let listener: NodeTouchListener = Rc::new(RefCell::new(move |event: &NodeTouchEvent| {
        sink.borrow_mut().push(event.clone());
        consume
    }));
    (received, listener)
}

fn pointer(id: u32, position: Vec2) -> Pointer {
    Pointer { id, position }
}

// ============================================================================
// Bubbling
// ============================================================================

#[test]
fn down_bubbles_to_consuming_ancestor() {
    let ctx = context();
    let mut scene = tracked_scene(&ctx);
    let parent = scene.create_node("parent");
    scene.add_to_scene(parent).unwrap();
    let cube = cube_node(&ctx, &mut scene, "cube", Vec3::new(-1.0, 0.0, -3.0));
    scene.add_child(parent, cube).unwrap();
    scene.update_world_transforms();

    let (cube_events, cube_listener) = recorder(false);
    let (parent_events, parent_listener) = recorder(true);
    scene.set_touch_listener(cube, Some(cube_listener));
    scene.set_touch_listener(parent, Some(parent_listener));

    assert!(scene.dispatch_touch_event(&MotionEvent::single(MotionAction::Down, 0, LEFT)));

    assert_eq!(cube_events.borrow().len(), 1, "offered to the hit node first");
    let parent_events = parent_events.borrow();
    assert_eq!(parent_events.len(), 1);
    assert_eq!(parent_events[0].node, parent);
    assert_eq!(parent_events[0].hit.map(|h| h.node), Some(cube));
}

#[test]
fn target_keeps_gesture_until_up() {
    let ctx = context();
    let mut scene = tracked_scene(&ctx);
    let cube = cube_node(&ctx, &mut scene, "cube", Vec3::new(-1.0, 0.0, -3.0));
    scene.add_to_scene(cube).unwrap();
    scene.update_world_transforms();

    let (events, listener) = recorder(true);
    scene.set_touch_listener(cube, Some(listener));

    scene.dispatch_touch_event(&MotionEvent::single(MotionAction::Down, 0, LEFT));
    // The pointer leaves the cube, but the gesture stays with it.
    assert!(scene.dispatch_touch_event(&MotionEvent::single(MotionAction::Move, 0, EMPTY)));
    assert!(scene.dispatch_touch_event(&MotionEvent::single(MotionAction::Up, 0, EMPTY)));
    assert_eq!(events.borrow().len(), 3);
    assert!(events.borrow()[1].hit.is_none());
    assert!(scene.touch_dispatcher().targets().is_empty());

    // A new gesture away from the cube does not reach it.
    scene.dispatch_touch_event(&MotionEvent::single(MotionAction::Down, 0, EMPTY));
    assert_eq!(events.borrow().len(), 3);
}

// ============================================================================
// Scene listeners
// ============================================================================

#[test]
fn unconsumed_events_reach_fallback() {
    let ctx = context();
    let mut scene = tracked_scene(&ctx);
    let cube = cube_node(&ctx, &mut scene, "cube", Vec3::new(-1.0, 0.0, -3.0));
    scene.add_to_scene(cube).unwrap();
    scene.update_world_transforms();

    let (_, listener) = recorder(false);
    scene.set_touch_listener(cube, Some(listener));

    let fallback_hits = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&fallback_hits);
    scene.set_fallback_touch_listener(Some(Box::new(move |hit: Option<&HitTestResult>, _: &MotionEvent| {
        sink.borrow_mut().push(hit.map(|h| h.node));
        true
    })));

    assert!(scene.dispatch_touch_event(&MotionEvent::single(MotionAction::Down, 0, LEFT)));
    assert!(scene.dispatch_touch_event(&MotionEvent::single(MotionAction::Down, 0, EMPTY)));
    assert_eq!(*fallback_hits.borrow(), vec![Some(cube), None]);
}

#[test]
fn peek_sees_everything_and_cannot_consume() {
    let ctx = context();
    let mut scene = tracked_scene(&ctx);
    let cube = cube_node(&ctx, &mut scene, "cube", Vec3::new(-1.0, 0.0, -3.0));
    scene.add_to_scene(cube).unwrap();
    scene.update_world_transforms();

    let (events, listener) = recorder(true);
    scene.set_touch_listener(cube, Some(listener));

    let peeked = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&peeked);
    scene.set_peek_touch_listener(Some(Box::new(move |_: Option<&HitTestResult>, _: &MotionEvent| {
        *counter.borrow_mut() += 1;
        true
    })));

    scene.dispatch_touch_event(&MotionEvent::single(MotionAction::Down, 0, LEFT));
    scene.dispatch_touch_event(&MotionEvent::single(MotionAction::Up, 0, LEFT));
    assert_eq!(*peeked.borrow(), 2);
    assert_eq!(events.borrow().len(), 2);
}

#[test]
fn nothing_handles_without_listeners() {
    let ctx = context();
    let mut scene = tracked_scene(&ctx);
    let cube = cube_node(&ctx, &mut scene, "cube", Vec3::new(-1.0, 0.0, -3.0));
    scene.add_to_scene(cube).unwrap();
    scene.update_world_transforms();

    assert!(!scene.dispatch_touch_event(&MotionEvent::single(MotionAction::Down, 0, LEFT)));
}

// ============================================================================
// Multi-pointer
// ============================================================================

#[test]
fn pointers_are_split_between_targets() {
    let ctx = context();
    let mut scene = tracked_scene(&ctx);
    let left = cube_node(&ctx, &mut scene, "left", Vec3::new(-1.0, 0.0, -3.0));
    let right = cube_node(&ctx, &mut scene, "right", Vec3::new(1.0, 0.0, -3.0));
    scene.add_to_scene(left).unwrap();
    scene.add_to_scene(right).unwrap();
    scene.update_world_transforms();

    let (left_events, left_listener) = recorder(true);
    let (right_events, right_listener) = recorder(true);
    scene.set_touch_listener(left, Some(left_listener));
    scene.set_touch_listener(right, Some(right_listener));

    scene.dispatch_touch_event(&MotionEvent::single(MotionAction::Down, 0, LEFT));
    scene.dispatch_touch_event(&MotionEvent::new(
        MotionAction::PointerDown(1),
        [pointer(0, LEFT), pointer(1, RIGHT)],
    ));
    scene.dispatch_touch_event(&MotionEvent::new(
        MotionAction::Move,
        [pointer(0, LEFT), pointer(1, RIGHT)],
    ));

    let right_events = right_events.borrow();
    assert_eq!(right_events.len(), 2);
    assert_eq!(right_events[0].event.action, MotionAction::Down);
    assert!(right_events.iter().all(|e| e.event.pointers.iter().all(|p| p.id == 1)));

    let left_events = left_events.borrow();
    assert_eq!(left_events.len(), 3);
    assert_eq!(left_events[1].event.action, MotionAction::Move, "other pointer went down");
    assert!(left_events.iter().all(|e| e.event.pointers.iter().all(|p| p.id == 0)));
}

#[test]
fn pointer_up_releases_only_that_pointer() {
    let ctx = context();
    let mut scene = tracked_scene(&ctx);
    let left = cube_node(&ctx, &mut scene, "left", Vec3::new(-1.0, 0.0, -3.0));
    let right = cube_node(&ctx, &mut scene, "right", Vec3::new(1.0, 0.0, -3.0));
    scene.add_to_scene(left).unwrap();
    scene.add_to_scene(right).unwrap();
    scene.update_world_transforms();

    let (_, left_listener) = recorder(true);
    let (right_events, right_listener) = recorder(true);
    scene.set_touch_listener(left, Some(left_listener));
    scene.set_touch_listener(right, Some(right_listener));

    scene.dispatch_touch_event(&MotionEvent::single(MotionAction::Down, 0, LEFT));
    scene.dispatch_touch_event(&MotionEvent::new(
        MotionAction::PointerDown(1),
        [pointer(0, LEFT), pointer(1, RIGHT)],
    ));
    scene.dispatch_touch_event(&MotionEvent::new(
        MotionAction::PointerUp(1),
        [pointer(0, LEFT), pointer(1, RIGHT)],
    ));

    assert_eq!(right_events.borrow().last().unwrap().event.action, MotionAction::Up);
    let targets = scene.touch_dispatcher().targets();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].node, left);
}

#[test]
fn pointer_ids_beyond_thirty_one_are_dispatched() {
    let ctx = context();
    let mut scene = tracked_scene(&ctx);
    let left = cube_node(&ctx, &mut scene, "left", Vec3::new(-1.0, 0.0, -3.0));
    let right = cube_node(&ctx, &mut scene, "right", Vec3::new(1.0, 0.0, -3.0));
    scene.add_to_scene(left).unwrap();
    scene.add_to_scene(right).unwrap();
    scene.update_world_transforms();

    let (left_events, left_listener) = recorder(true);
    let (right_events, right_listener) = recorder(true);
    scene.set_touch_listener(left, Some(left_listener));
    scene.set_touch_listener(right, Some(right_listener));

    scene.dispatch_touch_event(&MotionEvent::single(MotionAction::Down, 64, LEFT));
    scene.dispatch_touch_event(&MotionEvent::new(
        MotionAction::PointerDown(1),
        [pointer(64, LEFT), pointer(1000, RIGHT)],
    ));
    scene.dispatch_touch_event(&MotionEvent::new(
        MotionAction::PointerUp(1),
        [pointer(64, LEFT), pointer(1000, RIGHT)],
    ));

    let right_events = right_events.borrow();
    assert_eq!(right_events.len(), 2);
    assert_eq!(right_events[0].event.action, MotionAction::Down);
    assert_eq!(right_events[1].event.action, MotionAction::Up);
    assert!(left_events.borrow().iter().all(|e| e.event.pointers.iter().all(|p| p.id == 64)));

    let targets = scene.touch_dispatcher().targets();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].node, left);
    assert!(targets[0].ids.contains(64));
}
