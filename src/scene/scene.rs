use std::rc::Rc;

use glam::{Vec2, Vec3};
use slotmap::SlotMap;

use crate::engine::EngineContext;
use crate::errors::{Error, Result};
use crate::resources::renderable::Renderable;
use crate::scene::NodeHandle;
use crate::scene::anchor::AnchorBinding;
use crate::scene::camera::Camera;
use crate::scene::collision::{HitTestResult, Ray, pick};
use crate::scene::instance::{LightInstance, RenderableInstance};
use crate::scene::light::Light;
use crate::scene::node::{Node, NodeKind, NodeTouchListener, hash_name};
use crate::scene::touch::{
    MotionAction, MotionEvent, NodeTouchEvent, PointerIds, SceneTouchListener, TouchDispatcher,
};
use crate::scene::transform::Transform;
use crate::scene::transform_system;
use crate::tracking::{AnchorId, TrackingFrame};

/// The scene graph.
///
/// Nodes live in a slot map and are addressed by [`NodeHandle`]. A node is
/// part of the rendered scene when its chain of parents ends at one of the
/// scene's roots; freshly created nodes are detached until added.
pub struct Scene {
    ctx: EngineContext,
    nodes: SlotMap<NodeHandle, Node>,
    roots: Rc<Vec<NodeHandle>>,
    camera: Camera,
    touch: TouchDispatcher,
    last_tracking_ns: Option<u64>,
}

impl Scene {
    #[must_use]
    pub fn new(ctx: &EngineContext) -> Self {
        Self {
            ctx: ctx.clone(),
            nodes: SlotMap::with_key(),
            roots: Rc::new(Vec::new()),
            camera: Camera::new(),
            touch: TouchDispatcher::default(),
            last_tracking_ns: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Creates a detached node.
    pub fn create_node(&mut self, name: &str) -> NodeHandle {
        self.nodes.insert(Node::new(name))
    }

    /// Creates a detached node following `anchor`.
    pub fn create_anchor_node(&mut self, name: &str, anchor: Option<AnchorId>) -> NodeHandle {
        self.nodes.insert(Node::anchor(name, AnchorBinding::new(anchor)))
    }

    #[inline]
    #[must_use]
    pub fn node(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle)
    }

    #[inline]
    pub fn node_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        self.nodes.get_mut(handle)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.nodes.contains_key(handle)
    }

    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn roots(&self) -> &[NodeHandle] {
        &self.roots
    }

    pub fn transform_mut(&mut self, handle: NodeHandle) -> Option<&mut Transform> {
        self.nodes.get_mut(handle).map(|n| &mut n.transform)
    }

    pub fn set_enabled(&mut self, handle: NodeHandle, enabled: bool) {
        if let Some(node) = self.nodes.get_mut(handle) {
            node.enabled = enabled;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeHandle, &Node)> {
        self.nodes.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (NodeHandle, &mut Node)> {
        self.nodes.iter_mut()
    }

    /// Removes `handle` and its whole subtree. Attached renderables and
    /// lights are released at the next reclamation pass.
    pub fn remove_node(&mut self, handle: NodeHandle) {
        if !self.nodes.contains_key(handle) {
            return;
        }
        self.unlink(handle);

        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                stack.extend(node.children.iter().copied());
            }
            self.touch.forget_node(current);
        }
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    /// Whether `ancestor` is `node` or one of its parents.
    #[must_use]
    pub fn is_ancestor_or_self(&self, ancestor: NodeHandle, node: NodeHandle) -> bool {
        let mut current = Some(node);
        while let Some(handle) = current {
            if handle == ancestor {
                return true;
            }
            current = self.nodes.get(handle).and_then(|n| n.parent);
        }
        false
    }

    /// Whether `handle` is reachable from the scene's roots.
    #[must_use]
    pub fn is_in_scene(&self, handle: NodeHandle) -> bool {
        let mut current = handle;
        while let Some(node) = self.nodes.get(current) {
            match node.parent {
                Some(parent) => current = parent,
                None => return self.roots.contains(&current),
            }
        }
        false
    }

    /// Adds `child` to the scene's top level, detaching it from any parent.
    pub fn add_to_scene(&mut self, child: NodeHandle) -> Result<()> {
        if !self.nodes.contains_key(child) {
            return Err(Error::InvalidHierarchy(format!("unknown node {child:?}")));
        }
        self.unlink(child);
        Rc::make_mut(&mut self.roots).push(child);
        self.nodes[child].transform.mark_dirty();
        Ok(())
    }

    /// Makes `child` the last child of `parent`.
    ///
    /// Fails without touching the graph when `child` is `parent` itself or
    /// one of its ancestors.
    pub fn add_child(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<()> {
        if !self.nodes.contains_key(parent) || !self.nodes.contains_key(child) {
            return Err(Error::InvalidHierarchy(format!(
                "unknown node in add_child({parent:?}, {child:?})"
            )));
        }
        if self.is_ancestor_or_self(child, parent) {
            log::warn!(
                "rejected attaching '{}' below '{}': it would become its own ancestor",
                self.nodes[child].name(),
                self.nodes[parent].name()
            );
            return Err(Error::InvalidHierarchy(format!(
                "node {child:?} cannot become a descendant of itself"
            )));
        }
        if self.nodes[child].parent == Some(parent) {
            return Ok(());
        }

        self.unlink(child);
        Rc::make_mut(&mut self.nodes[parent].children).push(child);
        let node = &mut self.nodes[child];
        node.parent = Some(parent);
        node.transform.mark_dirty();
        Ok(())
    }

    /// Reparents `child`; `None` detaches it from the scene.
    pub fn set_parent(&mut self, child: NodeHandle, parent: Option<NodeHandle>) -> Result<()> {
        match parent {
            Some(parent) => self.add_child(parent, child),
            None => {
                if !self.nodes.contains_key(child) {
                    return Err(Error::InvalidHierarchy(format!("unknown node {child:?}")));
                }
                self.unlink(child);
                Ok(())
            }
        }
    }

    /// Detaches `child` if `parent` is its parent.
    pub fn remove_child(&mut self, parent: NodeHandle, child: NodeHandle) {
        if self.nodes.get(child).and_then(|n| n.parent) == Some(parent) {
            self.unlink(child);
        }
    }

    /// Detaches `handle` from its parent or from the root list.
    fn unlink(&mut self, handle: NodeHandle) {
        let Some(node) = self.nodes.get_mut(handle) else {
            return;
        };
        match node.parent.take() {
            Some(parent) => {
                if let Some(parent) = self.nodes.get_mut(parent) {
                    Rc::make_mut(&mut parent.children).retain(|&c| c != handle);
                }
            }
            None => {
                if self.roots.contains(&handle) {
                    Rc::make_mut(&mut self.roots).retain(|&r| r != handle);
                }
            }
        }
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Calls `f` on `start` and its descendants, depth-first pre-order.
    ///
    /// `f` may mutate the graph. Each node's children are snapshotted before
    /// `f` runs on it, so children added during the traversal are visited by
    /// the next one and removed nodes are skipped.
    pub fn call_on_hierarchy(&mut self, start: NodeHandle, mut f: impl FnMut(&mut Scene, NodeHandle)) {
        self.visit(start, &mut f);
    }

    fn visit(&mut self, handle: NodeHandle, f: &mut dyn FnMut(&mut Scene, NodeHandle)) {
        let Some(node) = self.nodes.get(handle) else {
            return;
        };
        let snapshot = Rc::clone(&node.children);
        f(self, handle);
        for &child in snapshot.iter() {
            self.visit(child, f);
        }
    }

    /// First node in pre-order below and including `start` matching `predicate`.
    pub fn find_in_hierarchy(
        &self,
        start: NodeHandle,
        mut predicate: impl FnMut(NodeHandle, &Node) -> bool,
    ) -> Option<NodeHandle> {
        let mut stack = vec![start];
        while let Some(handle) = stack.pop() {
            let Some(node) = self.nodes.get(handle) else {
                continue;
            };
            if predicate(handle, node) {
                return Some(handle);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }

    pub fn find_by_name(&self, start: NodeHandle, name: &str) -> Option<NodeHandle> {
        let hash = hash_name(name);
        self.find_in_hierarchy(start, |_, node| node.name_matches(name, hash))
    }

    /// Searches every top-level subtree in order.
    pub fn find_in_scene(&self, name: &str) -> Option<NodeHandle> {
        self.roots.iter().find_map(|&root| self.find_by_name(root, name))
    }

    // ========================================================================
    // Attachments
    // ========================================================================

    /// Binds `renderable` to `handle`, replacing (and releasing) any previous
    /// one. `None` just detaches.
    pub fn set_renderable(&mut self, handle: NodeHandle, renderable: Option<Renderable>) -> Result<()> {
        let Some(node) = self.nodes.get_mut(handle) else {
            return Err(Error::InvalidHierarchy(format!("unknown node {handle:?}")));
        };
        node.renderable = match renderable {
            Some(renderable) => Some(RenderableInstance::new(&self.ctx, renderable)?),
            None => None,
        };
        Ok(())
    }

    #[must_use]
    pub fn renderable(&self, handle: NodeHandle) -> Option<&Renderable> {
        self.nodes.get(handle)?.renderable.as_ref().map(RenderableInstance::renderable)
    }

    pub fn renderable_mut(&mut self, handle: NodeHandle) -> Option<&mut Renderable> {
        self.nodes
            .get_mut(handle)?
            .renderable
            .as_mut()
            .map(RenderableInstance::renderable_mut)
    }

    pub fn set_light(&mut self, handle: NodeHandle, light: Option<Light>) -> Result<()> {
        let Some(node) = self.nodes.get_mut(handle) else {
            return Err(Error::InvalidHierarchy(format!("unknown node {handle:?}")));
        };
        node.light = light.map(|light| LightInstance::new(&self.ctx, light));
        Ok(())
    }

    #[must_use]
    pub fn light(&self, handle: NodeHandle) -> Option<&Light> {
        self.nodes.get(handle)?.light.as_ref().map(LightInstance::light)
    }

    pub fn light_mut(&mut self, handle: NodeHandle) -> Option<&mut Light> {
        self.nodes.get_mut(handle)?.light.as_mut().map(LightInstance::light_mut)
    }

    // ========================================================================
    // Tracking
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    #[inline]
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Rebinds an anchor node. No-op on plain nodes.
    pub fn set_anchor(&mut self, handle: NodeHandle, anchor: Option<AnchorId>) {
        if let Some(binding) = self.nodes.get_mut(handle).and_then(Node::anchor_binding_mut) {
            binding.set_anchor(anchor);
        }
    }

    pub fn set_anchor_smoothed(&mut self, handle: NodeHandle, smoothed: bool) {
        if let Some(binding) = self.nodes.get_mut(handle).and_then(Node::anchor_binding_mut) {
            binding.set_smoothed(smoothed);
        }
    }

    /// Moves the camera and every anchor node to the frame's poses, then
    /// refreshes world transforms.
    pub fn apply_tracking_frame(&mut self, frame: &TrackingFrame) {
        let delta_seconds = match self.last_tracking_ns {
            Some(last) if frame.timestamp_ns > last => (frame.timestamp_ns - last) as f32 * 1e-9,
            _ => 0.0,
        };
        self.last_tracking_ns = Some(frame.timestamp_ns);

        self.camera
            .update_from_tracking(frame.camera_pose, frame.projection, frame.camera_state);

        for node in self.nodes.values_mut() {
            let NodeKind::Anchor(binding) = &mut node.kind else {
                continue;
            };
            if let Some(pose) = binding.update(frame, delta_seconds) {
                node.transform.set_pose(pose);
            }
        }
        self.update_world_transforms();
    }

    /// Recomputes world matrices and activity. Nodes outside the scene end
    /// up inactive. Returns the number of world matrices rebuilt.
    pub fn update_world_transforms(&mut self) -> usize {
        for node in self.nodes.values_mut() {
            node.active = false;
        }
        let roots = Rc::clone(&self.roots);
        transform_system::update_hierarchy_iterative(&mut self.nodes, &roots)
    }

    // ========================================================================
    // Hit testing & touch
    // ========================================================================

    /// Nearest active node whose renderable's collision shape `ray` hits.
    #[must_use]
    pub fn hit_test(&self, ray: &Ray) -> Option<HitTestResult> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.active)
            .filter_map(|(handle, node)| {
                let instance = node.renderable.as_ref()?;
                let shape = instance.renderable().collision_shape()?;
                let world = instance.world_transform(node.transform.world_matrix());
                let (distance, point) = pick(shape, &world, ray)?;
                Some(HitTestResult {
                    node: handle,
                    distance,
                    point,
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    /// Hit test through a screen point in normalized device coordinates.
    #[must_use]
    pub fn hit_test_screen(&self, ndc: Vec2) -> Option<HitTestResult> {
        self.hit_test(&self.camera.screen_point_to_ray(ndc))
    }

    pub fn set_touch_listener(&mut self, handle: NodeHandle, listener: Option<NodeTouchListener>) {
        if let Some(node) = self.nodes.get_mut(handle) {
            node.set_touch_listener(listener);
        }
    }

    /// Sees every event before dispatch; cannot consume.
    pub fn set_peek_touch_listener(&mut self, listener: Option<SceneTouchListener>) {
        self.touch.peek = listener;
    }

    /// Receives events no node consumed.
    pub fn set_fallback_touch_listener(&mut self, listener: Option<SceneTouchListener>) {
        self.touch.fallback = listener;
    }

    #[must_use]
    pub fn touch_dispatcher(&self) -> &TouchDispatcher {
        &self.touch
    }

    /// Routes `event` through the node hierarchy. Returns whether anything
    /// consumed it.
    pub fn dispatch_touch_event(&mut self, event: &MotionEvent) -> bool {
        let mut touch = std::mem::take(&mut self.touch);
        let handled = self.dispatch_with(&mut touch, event);
        self.touch = touch;
        handled
    }

    fn dispatch_with(&self, touch: &mut TouchDispatcher, event: &MotionEvent) -> bool {
        let is_down = matches!(event.action, MotionAction::Down | MotionAction::PointerDown(_));
        let action_ids = event
            .action_pointer()
            .map_or_else(PointerIds::default, |p| PointerIds::one(p.id));
        let down_hit = if is_down {
            event
                .action_pointer()
                .and_then(|p| self.hit_test_screen(p.position))
        } else {
            None
        };

        if let Some(peek) = touch.peek.as_mut() {
            peek(down_hit.as_ref(), event);
        }
        if event.action == MotionAction::Down {
            touch.targets.clear();
        }

        let mut handled = false;
        let mut new_target = None;
        if let Some(hit) = down_hit {
            let mut current = Some(hit.node);
            while let Some(handle) = current {
                if touch.targets.iter().any(|t| t.node == handle) {
                    touch.add_target(handle, &action_ids);
                    break;
                }
                if let Some(sub) = event.split(&action_ids)
                    && self.deliver(handle, Some(hit), sub)
                {
                    touch.add_target(handle, &action_ids);
                    new_target = Some(handle);
                    handled = true;
                    break;
                }
                current = self.nodes.get(handle).and_then(|n| n.parent);
            }
        }

        for target in touch.targets.clone() {
            if Some(target.node) == new_target {
                continue;
            }
            let Some(sub) = event.split(&target.ids) else {
                continue;
            };
            let hit = down_hit.filter(|_| target.ids.intersects(&action_ids));
            handled |= self.deliver(target.node, hit, sub);
        }

        if !handled && let Some(fallback) = touch.fallback.as_mut() {
            handled = fallback(down_hit.as_ref(), event);
        }

        match event.action {
            MotionAction::PointerUp(_) => touch.remove_pointers(&action_ids),
            MotionAction::Up | MotionAction::Cancel => touch.targets.clear(),
            _ => {}
        }
        handled
    }

    fn deliver(&self, handle: NodeHandle, hit: Option<HitTestResult>, event: MotionEvent) -> bool {
        let Some(listener) = self.nodes.get(handle).and_then(|n| n.touch_listener.clone()) else {
            return false;
        };
        let touch_event = NodeTouchEvent {
            node: handle,
            hit,
            event,
        };
        (&mut *listener.borrow_mut())(&touch_event)
    }

    /// World position of a node as of the last world update.
    #[must_use]
    pub fn world_position(&self, handle: NodeHandle) -> Option<Vec3> {
        self.nodes.get(handle).map(|n| n.transform.world_position())
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("nodes", &self.nodes.len())
            .field("roots", &self.roots)
            .field("camera", &self.camera)
            .field("touch", &self.touch)
            .finish_non_exhaustive()
    }
}
