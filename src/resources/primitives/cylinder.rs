use std::f32::consts::PI;

use glam::{Vec2, Vec3};

use crate::resources::definition::{RenderableDefinition, Submesh, Vertex};
use crate::resources::material::Material;

pub const CYLINDER_SIDES: u32 = 24;

/// Capped cylinder along +Y.
///
/// The side wall and both caps have their own vertices so the caps get flat
/// normals. All of it is drawn as one submesh.
#[must_use]
pub fn cylinder_definition(
    radius: f32,
    height: f32,
    center: Vec3,
    material: Material,
) -> RenderableDefinition {
    let half = height * 0.5;
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    let around = |i: u32| {
        let angle = i as f32 / CYLINDER_SIDES as f32 * 2.0 * PI;
        Vec3::new(angle.cos(), 0.0, -angle.sin())
    };

    // Side wall, bottom and top ring interleaved
    for i in 0..=CYLINDER_SIDES {
        let dir = around(i);
        let u = i as f32 / CYLINDER_SIDES as f32;
        vertices.push(
            Vertex::new(center + dir * radius - Vec3::Y * half)
                .with_normal(dir)
                .with_uv(Vec2::new(u, 1.0)),
        );
        vertices.push(
            Vertex::new(center + dir * radius + Vec3::Y * half)
                .with_normal(dir)
                .with_uv(Vec2::new(u, 0.0)),
        );
    }
    for i in 0..CYLINDER_SIDES {
        let bottom = i * 2;
        let top = bottom + 1;
        let next_bottom = bottom + 2;
        let next_top = bottom + 3;
        indices.extend_from_slice(&[bottom, next_bottom, top, top, next_bottom, next_top]);
    }

    for (normal, y) in [(Vec3::NEG_Y, -half), (Vec3::Y, half)] {
        let hub = vertices.len() as u32;
        vertices.push(
            Vertex::new(center + Vec3::Y * y)
                .with_normal(normal)
                .with_uv(Vec2::splat(0.5)),
        );
        for i in 0..=CYLINDER_SIDES {
            let dir = around(i);
            vertices.push(
                Vertex::new(center + dir * radius + Vec3::Y * y)
                    .with_normal(normal)
                    .with_uv(Vec2::new(0.5 + dir.x * 0.5, 0.5 + dir.z * 0.5)),
            );
        }
        for i in 0..CYLINDER_SIDES {
            let a = hub + 1 + i;
            let b = a + 1;
            // Top cap faces up, bottom cap faces down
            if normal.y > 0.0 {
                indices.extend_from_slice(&[hub, a, b]);
            } else {
                indices.extend_from_slice(&[hub, b, a]);
            }
        }
    }

    RenderableDefinition::new(vertices, vec![Submesh::new(indices, material)])
}
