//! Collision shapes and ray picking.
//!
//! Shapes are stored in the local space of the renderable they belong to.
//! Picking transforms the world-space ray into that space with the inverse
//! world matrix, intersects there and maps the hit back to world space, so
//! non-uniform node scales are handled without transforming the shape.

use glam::{Mat4, Vec3};

use crate::backend::Aabb;
use crate::scene::NodeHandle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollisionShape {
    Box { center: Vec3, size: Vec3 },
    Sphere { center: Vec3, radius: f32 },
}

impl CollisionShape {
    #[must_use]
    pub fn from_aabb(aabb: &Aabb) -> Self {
        Self::Box {
            center: aabb.center,
            size: aabb.size(),
        }
    }

    /// Distance along `ray` to the nearest intersection in front of its origin.
    #[must_use]
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        match *self {
            Self::Box { center, size } => {
                let half = size * 0.5;
                intersect_slabs(ray, center - half, center + half)
            }
            Self::Sphere { center, radius } => intersect_sphere(ray, center, radius),
        }
    }
}

fn intersect_slabs(ray: &Ray, min: Vec3, max: Vec3) -> Option<f32> {
    let inv = ray.direction.recip();
    let t0 = (min - ray.origin) * inv;
    let t1 = (max - ray.origin) * inv;
    let near = t0.min(t1).max_element();
    let far = t0.max(t1).min_element();
    if near > far || far < 0.0 {
        return None;
    }
    Some(near.max(0.0))
}

fn intersect_sphere(ray: &Ray, center: Vec3, radius: f32) -> Option<f32> {
    let to_origin = ray.origin - center;
    let b = to_origin.dot(ray.direction);
    let c = to_origin.length_squared() - radius * radius;
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let root = discriminant.sqrt();
    let near = -b - root;
    let far = -b + root;
    if far < 0.0 {
        return None;
    }
    Some(near.max(0.0))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit length.
    pub direction: Vec3,
}

impl Ray {
    #[must_use]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or(Vec3::NEG_Z),
        }
    }

    #[inline]
    #[must_use]
    pub fn point_at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }

    #[must_use]
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self::new(
            matrix.transform_point3(self.origin),
            matrix.transform_vector3(self.direction),
        )
    }

    /// Ray through a screen point, from the camera's inverse view-projection.
    ///
    /// `ndc` is in normalized device coordinates (`-1..=1`, y up). Depths 0
    /// and 1 lie in front of the camera for both depth conventions.
    #[must_use]
    pub fn from_ndc(inverse_view_projection: &Mat4, ndc: glam::Vec2) -> Self {
        let near = inverse_view_projection.project_point3(ndc.extend(0.0));
        let far = inverse_view_projection.project_point3(ndc.extend(1.0));
        Self::new(near, far - near)
    }
}

/// Intersects a world-space ray with `shape` placed by `world`.
///
/// Returns the world-space distance and hit point.
#[must_use]
pub fn pick(shape: &CollisionShape, world: &Mat4, ray: &Ray) -> Option<(f32, Vec3)> {
    let inverse = world.inverse();
    if !inverse.is_finite() {
        return None;
    }
    let local_ray = ray.transformed(&inverse);
    let local_distance = shape.intersect_ray(&local_ray)?;
    let point = world.transform_point3(local_ray.point_at(local_distance));
    Some((point.distance(ray.origin), point))
}

/// The node a pick ray hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitTestResult {
    pub node: NodeHandle,
    pub distance: f32,
    pub point: Vec3,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ray_hits_box_front_face() {
        let shape = CollisionShape::Box {
            center: Vec3::ZERO,
            size: Vec3::ONE,
        };
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z);
        assert_eq!(shape.intersect_ray(&ray), Some(4.5));
        let miss = Ray::new(Vec3::new(2.0, 0.0, 5.0), Vec3::NEG_Z);
        assert_eq!(shape.intersect_ray(&miss), None);
    }

    #[test]
    fn pick_accounts_for_node_scale() {
        let shape = CollisionShape::Sphere {
            center: Vec3::ZERO,
            radius: 0.5,
        };
        let world = Mat4::from_translation(Vec3::new(0.0, 0.0, -3.0)) * Mat4::from_scale(Vec3::splat(2.0));
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
        let (distance, point) = pick(&shape, &world, &ray).unwrap();
        assert!((distance - 2.0).abs() < 1e-5);
        assert!((point.z + 2.0).abs() < 1e-5);
    }
}
