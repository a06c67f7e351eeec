use glam::{Vec2, Vec3};

use crate::resources::definition::{RenderableDefinition, Submesh, Vertex};
use crate::resources::material::Material;

/// Axis-aligned box with 4 vertices per face, so every face gets flat normals.
#[must_use]
pub fn cube_definition(size: Vec3, center: Vec3, material: Material) -> RenderableDefinition {
    let h = size * 0.5;

    // (normal, first corner, edge along u, edge along v) per face
    let faces = [
        (Vec3::Z, Vec3::new(-h.x, -h.y, h.z), Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::new(h.x, -h.y, -h.z), Vec3::NEG_X, Vec3::Y),
        (Vec3::Y, Vec3::new(-h.x, h.y, h.z), Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::new(-h.x, -h.y, -h.z), Vec3::X, Vec3::Z),
        (Vec3::X, Vec3::new(h.x, -h.y, h.z), Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::new(-h.x, -h.y, -h.z), Vec3::Z, Vec3::Y),
    ];

    let mut vertices = Vec::with_capacity(24);
    for (normal, origin, u, v) in faces {
        let du = u * (u.abs().dot(size));
        let dv = v * (v.abs().dot(size));
        let corners = [
            (origin, Vec2::new(0.0, 1.0)),
            (origin + du, Vec2::new(1.0, 1.0)),
            (origin + du + dv, Vec2::new(1.0, 0.0)),
            (origin + dv, Vec2::new(0.0, 0.0)),
        ];
        for (position, uv) in corners {
            vertices.push(
                Vertex::new(center + position)
                    .with_normal(normal)
                    .with_uv(uv),
            );
        }
    }

    // Two counter-clockwise triangles per face
    let indices: Vec<u32> = (0..6)
        .flat_map(|face| {
            let base = face * 4;
            [base, base + 1, base + 2, base, base + 2, base + 3]
        })
        .collect();

    RenderableDefinition::new(vertices, vec![Submesh::new(indices, material)])
}
