use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use rustc_hash::FxHasher;

use crate::scene::NodeHandle;
use crate::scene::anchor::AnchorBinding;
use crate::scene::instance::{LightInstance, RenderableInstance};
use crate::scene::touch::NodeTouchEvent;
use crate::scene::transform::Transform;

/// Handles a touch event routed to a node. Returning `true` consumes it;
/// `false` lets it bubble to the parent.
pub type NodeTouchListener = Rc<RefCell<dyn FnMut(&NodeTouchEvent) -> bool>>;

#[must_use]
pub fn hash_name(name: &str) -> u64 {
    let mut hasher = FxHasher::default();
    name.hash(&mut hasher);
    hasher.finish()
}

/// What drives a node besides its parent.
#[derive(Debug, Clone, Default)]
pub enum NodeKind {
    #[default]
    Plain,
    /// Follows a tracked anchor; inactive (with its subtree) while the
    /// anchor is not tracking.
    Anchor(AnchorBinding),
}

/// A scene graph node.
///
/// # Hierarchy
///
/// `children` is a copy-on-write snapshot. Traversals clone the `Rc` and walk
/// that snapshot; mutations go through `Rc::make_mut`, so a traversal in
/// progress never sees them and the next one does.
///
/// # Activity
///
/// A node is active when it is enabled, its parent is active and, for anchor
/// nodes, its anchor is tracking. Only active nodes are rendered and hit.
pub struct Node {
    name: String,
    name_hash: u64,

    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Rc<Vec<NodeHandle>>,

    pub transform: Transform,

    pub(crate) enabled: bool,
    pub(crate) active: bool,
    pub(crate) kind: NodeKind,

    pub(crate) renderable: Option<RenderableInstance>,
    pub(crate) light: Option<LightInstance>,
    pub(crate) touch_listener: Option<NodeTouchListener>,
}

impl Node {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            name_hash: hash_name(name),
            parent: None,
            children: Rc::new(Vec::new()),
            transform: Transform::new(),
            enabled: true,
            active: false,
            kind: NodeKind::Plain,
            renderable: None,
            light: None,
            touch_listener: None,
        }
    }

    #[must_use]
    pub fn anchor(name: &str, binding: AnchorBinding) -> Self {
        Self {
            kind: NodeKind::Anchor(binding),
            ..Self::new(name)
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_owned();
        self.name_hash = hash_name(name);
    }

    /// Hash first, string comparison only on a hash match.
    #[inline]
    #[must_use]
    pub fn name_matches(&self, name: &str, hash: u64) -> bool {
        self.name_hash == hash && self.name == name
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Activity as of the last world update.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[must_use]
    pub fn anchor_binding(&self) -> Option<&AnchorBinding> {
        match &self.kind {
            NodeKind::Anchor(binding) => Some(binding),
            NodeKind::Plain => None,
        }
    }

    pub fn anchor_binding_mut(&mut self) -> Option<&mut AnchorBinding> {
        match &mut self.kind {
            NodeKind::Anchor(binding) => Some(binding),
            NodeKind::Plain => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn renderable_instance(&self) -> Option<&RenderableInstance> {
        self.renderable.as_ref()
    }

    #[inline]
    pub fn renderable_instance_mut(&mut self) -> Option<&mut RenderableInstance> {
        self.renderable.as_mut()
    }

    #[inline]
    #[must_use]
    pub fn light_instance(&self) -> Option<&LightInstance> {
        self.light.as_ref()
    }

    #[inline]
    pub fn light_instance_mut(&mut self) -> Option<&mut LightInstance> {
        self.light.as_mut()
    }

    pub fn set_touch_listener(&mut self, listener: Option<NodeTouchListener>) {
        self.touch_listener = listener;
    }

    #[must_use]
    pub fn touch_listener(&self) -> Option<&NodeTouchListener> {
        self.touch_listener.as_ref()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("children", &self.children.len())
            .field("enabled", &self.enabled)
            .field("active", &self.active)
            .field("kind", &self.kind)
            .field("renderable", &self.renderable.is_some())
            .field("light", &self.light.is_some())
            .finish_non_exhaustive()
    }
}
