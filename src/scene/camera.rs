use glam::{Mat4, Vec2};

use crate::scene::collision::Ray;
use crate::tracking::{Pose, TrackingState};

/// The scene's AR camera.
///
/// Its pose and projection come from the tracking session. Until a frame
/// reports [`TrackingState::Tracking`] the camera is inactive and the
/// renderer draws an empty view instead of the scene.
#[derive(Debug, Clone)]
pub struct Camera {
    pub near: f32,
    pub far: f32,

    pub(crate) pose: Pose,
    pub(crate) view_matrix: Mat4,
    pub(crate) projection_matrix: Mat4,
    pub(crate) view_projection_matrix: Mat4,
    pub(crate) state: TrackingState,
}

impl Camera {
    #[must_use]
    pub fn new() -> Self {
        let mut camera = Self {
            near: 0.01,
            far: 30.0,
            pose: Pose::IDENTITY,
            view_matrix: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
            view_projection_matrix: Mat4::IDENTITY,
            state: TrackingState::Paused,
        };
        camera.projection_matrix = Mat4::perspective_rh(60f32.to_radians(), 1.0, camera.near, camera.far);
        camera.update_view_projection();
        camera
    }

    /// Applies a tracked pose and projection.
    pub fn update_from_tracking(&mut self, pose: Pose, projection: Mat4, state: TrackingState) {
        self.pose = pose;
        self.projection_matrix = projection;
        self.state = state;
        self.update_view_projection();
    }

    fn update_view_projection(&mut self) {
        self.view_matrix = self.pose.to_mat4().inverse();
        self.view_projection_matrix = self.projection_matrix * self.view_matrix;
    }

    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.is_tracking()
    }

    #[inline]
    #[must_use]
    pub fn tracking_state(&self) -> TrackingState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn pose(&self) -> Pose {
        self.pose
    }

    #[inline]
    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        self.view_matrix
    }

    #[inline]
    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection_matrix
    }

    #[inline]
    #[must_use]
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.view_projection_matrix
    }

    /// World-space ray through a point in normalized device coordinates.
    #[must_use]
    pub fn screen_point_to_ray(&self, ndc: Vec2) -> Ray {
        Ray::from_ndc(&self.view_projection_matrix.inverse(), ndc)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};

    use super::*;

    #[test]
    fn center_ray_follows_camera_pose() {
        let mut camera = Camera::new();
        let pose = Pose::new(Vec3::new(0.0, 1.0, 2.0), Quat::IDENTITY);
        let projection = Mat4::perspective_rh_gl(1.0, 1.0, 0.1, 10.0);
        camera.update_from_tracking(pose, projection, TrackingState::Tracking);
        let ray = camera.screen_point_to_ray(Vec2::ZERO);
        assert!(ray.direction.abs_diff_eq(Vec3::NEG_Z, 1e-4));
        assert!((ray.origin.y - 1.0).abs() < 1e-4);
        assert!(camera.is_active());
    }
}
