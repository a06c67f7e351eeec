use glam::{Mat4, Quat, Vec3};

use crate::tracking::Pose;

/// Local TRS of a node plus its cached local and world matrices.
///
/// The TRS fields can be written freely. The local matrix is rebuilt by
/// [`Transform::update_local_matrix`] only when they differ from the snapshot
/// it was last built from.
#[derive(Debug, Clone)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,

    local_matrix: Mat4,
    world_matrix: Mat4,

    /// TRS the local matrix was built from. `None` forces a rebuild.
    built_from: Option<(Vec3, Quat, Vec3)>,
}

impl Transform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            local_matrix: Mat4::IDENTITY,
            world_matrix: Mat4::IDENTITY,
            built_from: None,
        }
    }

    /// Rigid part of the local transform.
    #[must_use]
    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation)
    }

    /// Moves to `pose`, keeping the scale.
    pub fn set_pose(&mut self, pose: Pose) {
        self.position = pose.translation;
        self.rotation = pose.rotation;
    }

    /// Rebuilds the local matrix if the TRS changed. Returns whether it did.
    pub fn update_local_matrix(&mut self) -> bool {
        let current = (self.position, self.rotation, self.scale);
        if self.built_from == Some(current) {
            return false;
        }
        self.local_matrix = Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position);
        self.built_from = Some(current);
        true
    }

    /// Forces the next [`update_local_matrix`](Self::update_local_matrix)
    /// to report a change, e.g. after reparenting.
    pub fn mark_dirty(&mut self) {
        self.built_from = None;
    }

    #[inline]
    #[must_use]
    pub fn local_matrix(&self) -> &Mat4 {
        &self.local_matrix
    }

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Mat4 {
        &self.world_matrix
    }

    #[inline]
    #[must_use]
    pub fn world_position(&self) -> Vec3 {
        self.world_matrix.w_axis.truncate()
    }

    pub(crate) fn set_world_matrix(&mut self, matrix: Mat4) {
        self.world_matrix = matrix;
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}
