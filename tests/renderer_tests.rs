//! Renderer Tests
//!
//! Tests for:
//! - Frame step order and the transform transaction
//! - Skipped frames (paused, no surface, native renderer not ready)
//! - Empty view while the camera is not tracking
//! - Incremental renderable and light pushes
//! - Surface changes, swap chain retry and letterboxed mirroring
//! - Per-frame reclamation and idempotent teardown
//! - SceneView glue: tracking frames, update callback, destroy

use std::cell::Cell;
use std::rc::Rc;

use glam::{Mat4, Vec3, Vec4};

use sceneweave::backend::headless::{EngineCall, EngineJournal, HeadlessEngine};
use sceneweave::backend::{Engine, SurfaceHandle, Viewport};
use sceneweave::{
    EngineContext, EngineSettings, FrameOutcome, Light, NodeHandle, Pose, Renderer, Scene,
    SceneView, SkipReason, TrackingFrame, TrackingState, material_factory, primitives,
};

const MAIN: SurfaceHandle = SurfaceHandle(1);
const MIRROR: SurfaceHandle = SurfaceHandle(2);

struct Fixture {
    ctx: EngineContext,
    journal: EngineJournal,
    renderer: Renderer,
    scene: Scene,
}

fn tracking_frame(state: TrackingState) -> TrackingFrame {
    TrackingFrame {
        timestamp_ns: 1,
        camera_pose: Pose::IDENTITY,
        camera_state: state,
        projection: Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.01, 30.0),
        anchors: Vec::new(),
    }
}

/// Renderer with a 2000x1000 surface and a tracking camera.
fn fixture() -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let engine = HeadlessEngine::new();
    let journal = engine.journal();
    let ctx = EngineContext::new(engine, EngineSettings::default()).unwrap();
    let mut renderer = Renderer::new(&ctx).unwrap();
    renderer.set_surface(Some(MAIN), 2000, 1000);
    let mut scene = Scene::new(&ctx);
    scene.apply_tracking_frame(&tracking_frame(TrackingState::Tracking));
    Fixture {
        ctx,
        journal,
        renderer,
        scene,
    }
}

fn add_cube(f: &mut Fixture, position: Vec3) -> NodeHandle {
    let material = f
        .ctx
        .block_on(material_factory::make_opaque_with_color(&f.ctx, Vec4::ONE))
        .unwrap();
    let cube = primitives::make_cube(&f.ctx, Vec3::ONE, Vec3::ZERO, &material).unwrap();
    let node = f.scene.create_node("cube");
    f.scene.transform_mut(node).unwrap().position = position;
    f.scene.set_renderable(node, Some(cube)).unwrap();
    f.scene.add_to_scene(node).unwrap();
    node
}

fn rendered(outcome: FrameOutcome) -> sceneweave::FrameStats {
    match outcome {
        FrameOutcome::Rendered(stats) => stats,
        FrameOutcome::Skipped(reason) => panic!("frame skipped: {reason:?}"),
    }
}

// ============================================================================
// Frame order
// ============================================================================

#[test]
fn frame_runs_steps_in_order() {
    let mut f = fixture();
    add_cube(&mut f, Vec3::new(0.0, 0.0, -2.0));
    f.journal.clear();

    let stats = rendered(f.renderer.render(&mut f.scene, false).unwrap());
    assert_eq!(stats.renderables, 1);
    assert!(!stats.empty_view);

    let at = |pred: fn(&EngineCall) -> bool| f.journal.position(pred).unwrap();
    let open = at(|c| matches!(c, EngineCall::OpenTransformTransaction));
    let transform = at(|c| matches!(c, EngineCall::SetWorldTransform { .. }));
    let commit = at(|c| matches!(c, EngineCall::CommitTransformTransaction));
    let begin = at(|c| matches!(c, EngineCall::BeginFrame));
    let render = at(|c| matches!(c, EngineCall::Render(_)));
    let end = at(|c| matches!(c, EngineCall::EndFrame));
    assert!(open < transform && transform < commit);
    assert!(commit < begin && begin < render && render < end);

    let main_view = f.renderer.main_view();
    assert!(f.journal.calls().contains(&EngineCall::Render(main_view)));
    assert_eq!(f.renderer.frame_count(), 1);
}

#[test]
fn world_transform_is_pushed_every_frame() {
    let mut f = fixture();
    let node = add_cube(&mut f, Vec3::new(0.0, 0.0, -2.0));
    f.renderer.render(&mut f.scene, false).unwrap();

    f.scene.transform_mut(node).unwrap().position = Vec3::new(1.0, 0.0, -2.0);
    f.journal.clear();
    f.renderer.render(&mut f.scene, false).unwrap();

    let expected = Mat4::from_translation(Vec3::new(1.0, 0.0, -2.0));
    let pushed = f.journal.calls().into_iter().find_map(|c| match c {
        EngineCall::SetWorldTransform { world, .. } => Some(world),
        _ => None,
    });
    assert!(pushed.unwrap().abs_diff_eq(expected, 1e-6));
}

#[test]
fn renderable_state_is_pushed_once_until_changed() {
    let mut f = fixture();
    let node = add_cube(&mut f, Vec3::ZERO);

    assert_eq!(rendered(f.renderer.render(&mut f.scene, false).unwrap()).renderables_synced, 1);
    assert_eq!(rendered(f.renderer.render(&mut f.scene, false).unwrap()).renderables_synced, 0);

    f.scene.renderable_mut(node).unwrap().set_priority(1);
    assert_eq!(rendered(f.renderer.render(&mut f.scene, false).unwrap()).renderables_synced, 1);
}

#[test]
fn inactive_node_leaves_native_scene() {
    let mut f = fixture();
    let node = add_cube(&mut f, Vec3::ZERO);
    f.renderer.render(&mut f.scene, false).unwrap();
    assert_eq!(f.journal.count(|c| matches!(c, EngineCall::SceneAdd(_))), 1);

    f.scene.set_enabled(node, false);
    let stats = rendered(f.renderer.render(&mut f.scene, false).unwrap());
    assert_eq!(stats.renderables, 0);
    assert_eq!(f.journal.count(|c| matches!(c, EngineCall::SceneRemove(_))), 1);

    f.scene.set_enabled(node, true);
    f.renderer.render(&mut f.scene, false).unwrap();
    assert_eq!(f.journal.count(|c| matches!(c, EngineCall::SceneAdd(_))), 2);
}

#[test]
fn light_is_pushed_only_when_dirty() {
    let mut f = fixture();
    let node = f.scene.create_node("sun");
    f.scene.add_to_scene(node).unwrap();
    f.scene
        .set_light(node, Some(Light::directional(Vec3::ONE, 100_000.0)))
        .unwrap();

    let set_light = |j: &EngineJournal| j.count(|c| matches!(c, EngineCall::SetLight { .. }));
    f.renderer.render(&mut f.scene, false).unwrap();
    f.renderer.render(&mut f.scene, false).unwrap();
    assert_eq!(set_light(&f.journal), 1);

    f.scene.light_mut(node).unwrap().set_intensity(50_000.0);
    let stats = rendered(f.renderer.render(&mut f.scene, false).unwrap());
    assert_eq!(stats.lights, 1);
    assert_eq!(stats.lights_synced, 1);
    assert_eq!(set_light(&f.journal), 2);

    f.scene.transform_mut(node).unwrap().position = Vec3::Y;
    f.renderer.render(&mut f.scene, false).unwrap();
    assert_eq!(set_light(&f.journal), 3, "moving the node re-pushes the light");
}

#[test]
fn pre_render_hook_runs_after_begin_frame() {
    let mut f = fixture();
    let calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&calls);
    f.renderer.set_pre_render_hook(Some(Box::new(move |_: &mut dyn Engine| {
        seen.set(seen.get() + 1);
    })));

    f.renderer.render(&mut f.scene, false).unwrap();
    f.journal.set_frame_ready(false);
    f.renderer.render(&mut f.scene, false).unwrap();
    assert_eq!(calls.get(), 1);
}

// ============================================================================
// Skipped frames
// ============================================================================

#[test]
fn no_surface_skips_frame() {
    let mut f = fixture();
    f.renderer.set_surface(None, 0, 0);
    assert_eq!(
        f.renderer.render(&mut f.scene, false).unwrap(),
        FrameOutcome::Skipped(SkipReason::NoSurface)
    );
    assert_eq!(f.journal.live().swap_chains, 0);
}

#[test]
fn paused_renderer_skips_until_resumed() {
    let mut f = fixture();
    f.renderer.on_pause();
    assert!(f.renderer.is_paused());
    assert_eq!(
        f.renderer.render(&mut f.scene, false).unwrap(),
        FrameOutcome::Skipped(SkipReason::Paused)
    );
    assert_eq!(f.journal.count(|c| matches!(c, EngineCall::BeginFrame)), 0);

    f.renderer.on_resume();
    assert!(f.renderer.render(&mut f.scene, false).unwrap().is_rendered());
}

#[test]
fn declined_frame_is_not_counted() {
    let mut f = fixture();
    f.journal.set_frame_ready(false);
    assert_eq!(
        f.renderer.render(&mut f.scene, false).unwrap(),
        FrameOutcome::Skipped(SkipReason::NotReady)
    );
    assert_eq!(f.renderer.frame_count(), 0);
    assert_eq!(f.journal.count(|c| matches!(c, EngineCall::EndFrame)), 0);
    assert_eq!(f.journal.count(|c| matches!(c, EngineCall::Render(_))), 0);
}

#[test]
fn declined_frames_still_reclaim_released_resources() {
    let mut f = fixture();
    let node = add_cube(&mut f, Vec3::ZERO);
    rendered(f.renderer.render(&mut f.scene, false).unwrap());
    assert_eq!(f.journal.live().vertex_buffers, 1);

    f.journal.set_frame_ready(false);
    f.scene.set_renderable(node, None).unwrap();
    assert_eq!(
        f.renderer.render(&mut f.scene, false).unwrap(),
        FrameOutcome::Skipped(SkipReason::NotReady)
    );

    let live = f.journal.live();
    assert_eq!(live.vertex_buffers, 0);
    assert_eq!(live.index_buffers, 0);
    assert_eq!(f.journal.count(|c| matches!(c, EngineCall::DestroyEntity(_))), 1);
}

#[test]
fn inactive_camera_renders_empty_view() {
    let mut f = fixture();
    add_cube(&mut f, Vec3::ZERO);
    f.scene.apply_tracking_frame(&tracking_frame(TrackingState::Paused));
    f.journal.clear();

    let stats = rendered(f.renderer.render(&mut f.scene, false).unwrap());
    assert!(stats.empty_view);
    let empty_view = f.renderer.empty_view();
    let main_view = f.renderer.main_view();
    let calls = f.journal.calls();
    assert!(calls.contains(&EngineCall::Render(empty_view)));
    assert!(!calls.contains(&EngineCall::Render(main_view)));
}

// ============================================================================
// Surfaces and mirrors
// ============================================================================

#[test]
fn failed_swap_chain_creation_is_retried() {
    let mut f = fixture();
    f.journal.set_fail_creation(true);
    assert!(f.renderer.render(&mut f.scene, false).is_err());
    assert_eq!(f.journal.live().swap_chains, 0);

    f.journal.set_fail_creation(false);
    rendered(f.renderer.render(&mut f.scene, false).unwrap());
    assert_eq!(f.journal.live().swap_chains, 1);
    assert_eq!(f.journal.count(|c| matches!(c, EngineCall::CreateSwapChain(_))), 1);
}

#[test]
fn swap_chain_is_recreated_only_for_a_new_surface() {
    let mut f = fixture();
    f.renderer.render(&mut f.scene, false).unwrap();
    let created = |j: &EngineJournal| j.count(|c| matches!(c, EngineCall::CreateSwapChain(_)));
    assert_eq!(created(&f.journal), 1);

    f.renderer.set_surface(Some(MAIN), 1000, 500);
    f.renderer.render(&mut f.scene, false).unwrap();
    assert_eq!(created(&f.journal), 1, "resize keeps the swap chain");
    assert_eq!(f.renderer.viewport(), Viewport::new(0, 0, 1000, 500));

    f.renderer.set_surface(Some(SurfaceHandle(9)), 1000, 500);
    f.renderer.render(&mut f.scene, false).unwrap();
    assert_eq!(created(&f.journal), 2);
    assert_eq!(f.journal.live().swap_chains, 1);
}

#[test]
fn mirror_receives_letterboxed_frame() {
    let mut f = fixture();
    let target = Viewport::new(10, 20, 1000, 1000);
    f.renderer.start_mirroring(MIRROR, target);
    assert_eq!(f.renderer.mirror_count(), 1);

    let stats = rendered(f.renderer.render(&mut f.scene, false).unwrap());
    assert_eq!(stats.mirrors, 1);
    assert_eq!(f.journal.live().swap_chains, 2);

    let mirrored = f.journal.calls().into_iter().find_map(|c| match c {
        EngineCall::MirrorFrame {
            destination,
            source,
            clear,
            ..
        } => Some((destination, source, clear)),
        _ => None,
    });
    assert_eq!(
        mirrored,
        Some((
            Viewport::new(10, 270, 1000, 500),
            Viewport::new(0, 0, 2000, 1000),
            true
        ))
    );
}

#[test]
fn stop_mirroring_destroys_mirror_swap_chain() {
    let mut f = fixture();
    f.renderer.start_mirroring(MIRROR, Viewport::new(0, 0, 100, 100));
    f.renderer.render(&mut f.scene, false).unwrap();

    f.renderer.stop_mirroring(MIRROR);
    assert_eq!(f.renderer.mirror_count(), 0);
    f.journal.clear();
    let stats = rendered(f.renderer.render(&mut f.scene, false).unwrap());

    assert_eq!(stats.mirrors, 0);
    assert_eq!(f.journal.count(|c| matches!(c, EngineCall::DestroySwapChain(_))), 1);
    assert_eq!(f.journal.count(|c| matches!(c, EngineCall::MirrorFrame { .. })), 0);
    assert_eq!(f.journal.live().swap_chains, 1);
}

#[test]
fn failed_mirror_creation_is_retried() {
    let mut f = fixture();
    f.renderer.render(&mut f.scene, false).unwrap();
    f.renderer.start_mirroring(MIRROR, Viewport::new(0, 0, 100, 100));

    f.journal.set_fail_creation(true);
    let stats = rendered(f.renderer.render(&mut f.scene, false).unwrap());
    assert_eq!(stats.mirrors, 0);

    f.journal.set_fail_creation(false);
    let stats = rendered(f.renderer.render(&mut f.scene, false).unwrap());
    assert_eq!(stats.mirrors, 1);
}

// ============================================================================
// Resources and teardown
// ============================================================================

#[test]
fn removed_nodes_are_released_at_end_of_frame() {
    let mut f = fixture();
    let node = add_cube(&mut f, Vec3::ZERO);
    f.renderer.render(&mut f.scene, false).unwrap();
    assert_eq!(f.journal.live().entities, 1);

    f.scene.remove_node(node);
    let stats = rendered(f.renderer.render(&mut f.scene, false).unwrap());
    assert!(stats.tracked_resources.is_some());
    let live = f.journal.live();
    assert_eq!(live.entities, 0);
    assert_eq!(live.vertex_buffers, 0);
}

#[test]
fn destroy_is_idempotent() {
    let mut f = fixture();
    f.renderer.start_mirroring(MIRROR, Viewport::new(0, 0, 100, 100));
    f.renderer.render(&mut f.scene, false).unwrap();

    f.renderer.destroy();
    f.renderer.destroy();
    assert_eq!(f.journal.count(|c| matches!(c, EngineCall::DestroyRenderer)), 1);
    assert_eq!(f.journal.live().swap_chains, 0);
}

#[test]
#[should_panic(expected = "destroyed renderer")]
fn render_after_destroy_panics() {
    let mut f = fixture();
    f.renderer.destroy();
    let _ = f.renderer.render(&mut f.scene, false);
}

// ============================================================================
// SceneView
// ============================================================================

#[test]
fn scene_view_applies_newest_tracking_frame() {
    let _ = env_logger::builder().is_test(true).try_init();
    let ctx = EngineContext::new(HeadlessEngine::new(), EngineSettings::default()).unwrap();
    let mut view = SceneView::new(&ctx).unwrap();
    view.set_surface(Some(MAIN), 640, 480);

    let updates = Rc::new(Cell::new(0));
    let seen = Rc::clone(&updates);
    view.set_update_fn(move |_, _| seen.set(seen.get() + 1));

    let sender = view.tracking_sender();
    sender.send(tracking_frame(TrackingState::Paused));
    sender.send(tracking_frame(TrackingState::Tracking));

    let stats = rendered(view.do_frame(false).unwrap());
    assert!(!stats.empty_view);
    assert!(view.scene.camera().is_active());
    assert_eq!(updates.get(), 1);
}

#[test]
fn scene_view_destroy_releases_everything() {
    let _ = env_logger::builder().is_test(true).try_init();
    let engine = HeadlessEngine::new();
    let journal = engine.journal();
    let ctx = EngineContext::new(engine, EngineSettings::default()).unwrap();
    let mut view = SceneView::new(&ctx).unwrap();
    view.set_surface(Some(MAIN), 640, 480);

    let material = ctx
        .block_on(material_factory::make_opaque_with_color(&ctx, Vec4::ONE))
        .unwrap();
    let cube = primitives::make_cube(&ctx, Vec3::ONE, Vec3::ZERO, &material).unwrap();
    let node = view.scene.create_node("cube");
    view.scene.set_renderable(node, Some(cube)).unwrap();
    view.scene.add_to_scene(node).unwrap();
    view.do_frame(false).unwrap();

    view.destroy();
    view.destroy();
    let live = journal.live();
    assert_eq!(live.entities, 0);
    assert_eq!(live.vertex_buffers, 0);
    assert_eq!(live.material_instances, 0);
    assert_eq!(live.swap_chains, 0);
}
