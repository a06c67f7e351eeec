//! Transform system
//!
//! Walks the hierarchy and refreshes world matrices and node activity.
//! Borrows only the node storage and the root list, not the whole scene, so
//! it can run while other scene state is borrowed.

use glam::Mat4;
use slotmap::SlotMap;

use crate::scene::NodeHandle;
use crate::scene::node::{Node, NodeKind};

/// Parent state handed down to a child.
#[derive(Debug, Clone, Copy)]
struct Inherited {
    world: Mat4,
    active: bool,
    changed: bool,
}

impl Inherited {
    const ROOT: Self = Self {
        world: Mat4::IDENTITY,
        active: true,
        changed: false,
    };
}

fn own_activity(node: &Node) -> bool {
    node.enabled
        && match &node.kind {
            NodeKind::Plain => true,
            NodeKind::Anchor(binding) => binding.is_tracking(),
        }
}

/// Updates every node reachable from `roots`.
///
/// Uses an explicit stack so deep hierarchies cannot overflow. Returns the
/// number of world matrices rebuilt.
pub fn update_hierarchy_iterative(nodes: &mut SlotMap<NodeHandle, Node>, roots: &[NodeHandle]) -> usize {
    let mut stack: Vec<(NodeHandle, Inherited)> = Vec::with_capacity(64);
    for &root in roots.iter().rev() {
        stack.push((root, Inherited::ROOT));
    }
    run(nodes, stack)
}

fn run(nodes: &mut SlotMap<NodeHandle, Node>, mut stack: Vec<(NodeHandle, Inherited)>) -> usize {
    let mut rebuilt = 0;
    while let Some((handle, parent)) = stack.pop() {
        let Some(node) = nodes.get_mut(handle) else {
            continue;
        };

        let local_changed = node.transform.update_local_matrix();
        let world_changed = local_changed || parent.changed;
        if world_changed {
            node.transform
                .set_world_matrix(parent.world * *node.transform.local_matrix());
            rebuilt += 1;
        }
        node.active = parent.active && own_activity(node);

        let inherited = Inherited {
            world: *node.transform.world_matrix(),
            active: node.active,
            changed: world_changed,
        };
        for &child in node.children.iter().rev() {
            stack.push((child, inherited));
        }
    }
    rebuilt
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    #[test]
    fn child_world_combines_parent() {
        let mut nodes: SlotMap<NodeHandle, Node> = SlotMap::with_key();
        let mut parent = Node::new("parent");
        parent.transform.position = Vec3::new(1.0, 0.0, 0.0);
        let parent_handle = nodes.insert(parent);

        let mut child = Node::new("child");
        child.transform.position = Vec3::new(0.0, 1.0, 0.0);
        child.parent = Some(parent_handle);
        let child_handle = nodes.insert(child);
        std::rc::Rc::make_mut(&mut nodes[parent_handle].children).push(child_handle);

        assert_eq!(update_hierarchy_iterative(&mut nodes, &[parent_handle]), 2);
        let world = nodes[child_handle].transform.world_position();
        assert!(world.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-5));
        assert_eq!(update_hierarchy_iterative(&mut nodes, &[parent_handle]), 0);
    }

    #[test]
    fn moving_parent_rebuilds_untouched_child() {
        let mut nodes: SlotMap<NodeHandle, Node> = SlotMap::with_key();
        let parent_handle = nodes.insert(Node::new("parent"));
        let mut child = Node::new("child");
        child.transform.position = Vec3::Z;
        child.parent = Some(parent_handle);
        let child_handle = nodes.insert(child);
        std::rc::Rc::make_mut(&mut nodes[parent_handle].children).push(child_handle);
        update_hierarchy_iterative(&mut nodes, &[parent_handle]);

        nodes[parent_handle].transform.position = Vec3::new(0.0, 2.0, 0.0);
        assert_eq!(update_hierarchy_iterative(&mut nodes, &[parent_handle]), 2);
        let world = nodes[child_handle].transform.world_position();
        assert!(world.abs_diff_eq(Vec3::new(0.0, 2.0, 1.0), 1e-5));
    }

    #[test]
    fn disabled_parent_deactivates_subtree() {
        let mut nodes: SlotMap<NodeHandle, Node> = SlotMap::with_key();
        let parent_handle = nodes.insert(Node::new("parent"));
        let mut child = Node::new("child");
        child.parent = Some(parent_handle);
        let child_handle = nodes.insert(child);
        std::rc::Rc::make_mut(&mut nodes[parent_handle].children).push(child_handle);

        nodes[parent_handle].enabled = false;
        update_hierarchy_iterative(&mut nodes, &[parent_handle]);
        assert!(!nodes[child_handle].active);
    }
}
