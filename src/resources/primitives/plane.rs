use glam::{Vec2, Vec3};

use crate::resources::definition::{RenderableDefinition, Submesh, Vertex};
use crate::resources::material::Material;

/// Single quad in the XY plane facing +Z, `size` wide and tall, centered on
/// `offset`.
#[must_use]
pub fn quad_definition(size: Vec2, offset: Vec2, material: Material) -> RenderableDefinition {
    let half = size * 0.5;
    let corners = [
        (Vec2::new(-half.x, -half.y), Vec2::new(0.0, 1.0)),
        (Vec2::new(half.x, -half.y), Vec2::new(1.0, 1.0)),
        (Vec2::new(half.x, half.y), Vec2::new(1.0, 0.0)),
        (Vec2::new(-half.x, half.y), Vec2::new(0.0, 0.0)),
    ];
    let vertices = corners
        .into_iter()
        .map(|(xy, uv)| {
            Vertex::new((xy + offset).extend(0.0))
                .with_normal(Vec3::Z)
                .with_uv(uv)
        })
        .collect();

    RenderableDefinition::new(vertices, vec![Submesh::new(vec![0, 1, 2, 0, 2, 3], material)])
}
