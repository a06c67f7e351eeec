//! Shape factory
//!
//! Builds renderables for simple shapes directly from a
//! [`RenderableDefinition`](crate::resources::definition::RenderableDefinition).
//! No I/O is involved, so everything here is synchronous. Each shape gets the
//! matching collision shape.

pub mod box_shape;
pub mod cylinder;
pub mod plane;
pub mod sphere;

use glam::Vec3;

use crate::engine::EngineContext;
use crate::errors::Result;
use crate::resources::material::Material;
use crate::resources::renderable::Renderable;
use crate::scene::collision::CollisionShape;

pub use box_shape::cube_definition;
pub use cylinder::cylinder_definition;
pub use plane::quad_definition;
pub use sphere::sphere_definition;

/// Box of `size` centered on `center`: 24 vertices, 36 indices.
pub fn make_cube(ctx: &EngineContext, size: Vec3, center: Vec3, material: &Material) -> Result<Renderable> {
    let mut renderable = Renderable::from_definition(ctx, &cube_definition(size, center, material.clone()))?;
    renderable.set_collision_shape(Some(CollisionShape::Box { center, size }));
    Ok(renderable)
}

pub fn make_sphere(ctx: &EngineContext, radius: f32, center: Vec3, material: &Material) -> Result<Renderable> {
    let mut renderable =
        Renderable::from_definition(ctx, &sphere_definition(radius, center, material.clone()))?;
    renderable.set_collision_shape(Some(CollisionShape::Sphere { center, radius }));
    Ok(renderable)
}

pub fn make_cylinder(
    ctx: &EngineContext,
    radius: f32,
    height: f32,
    center: Vec3,
    material: &Material,
) -> Result<Renderable> {
    let definition = cylinder_definition(radius, height, center, material.clone());
    let mut renderable = Renderable::from_definition(ctx, &definition)?;
    renderable.set_collision_shape(Some(CollisionShape::Box {
        center,
        size: Vec3::new(radius * 2.0, height, radius * 2.0),
    }));
    Ok(renderable)
}
