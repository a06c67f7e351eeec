use std::f32::consts::PI;

use glam::{Vec2, Vec3};

use crate::resources::definition::{RenderableDefinition, Submesh, Vertex};
use crate::resources::material::Material;

pub const SPHERE_STACKS: u32 = 24;
pub const SPHERE_SLICES: u32 = 24;

/// UV sphere on a `(stacks + 1) x (slices + 1)` vertex grid.
///
/// The seam column is duplicated for texture wrap. Triangles that collapse
/// at the poles are skipped.
#[must_use]
pub fn sphere_definition(radius: f32, center: Vec3, material: Material) -> RenderableDefinition {
    let mut vertices = Vec::with_capacity(((SPHERE_STACKS + 1) * (SPHERE_SLICES + 1)) as usize);

    for stack in 0..=SPHERE_STACKS {
        let v = stack as f32 / SPHERE_STACKS as f32;
        // Latitude from the south pole (0) to the north pole (PI)
        let theta = v * PI;
        let y = -theta.cos();
        let ring = theta.sin();

        for slice in 0..=SPHERE_SLICES {
            let u = slice as f32 / SPHERE_SLICES as f32;
            let phi = u * 2.0 * PI;
            let normal = Vec3::new(-ring * phi.cos(), y, ring * phi.sin());
            vertices.push(
                Vertex::new(center + normal * radius)
                    .with_normal(normal)
                    .with_uv(Vec2::new(u, 1.0 - v)),
            );
        }
    }

    let stride = SPHERE_SLICES + 1;
    let mut indices = Vec::new();
    for stack in 0..SPHERE_STACKS {
        for slice in 0..SPHERE_SLICES {
            let v0 = stack * stride + slice;
            let v1 = v0 + 1;
            let v2 = (stack + 1) * stride + slice;
            let v3 = v2 + 1;

            if stack != 0 {
                indices.extend_from_slice(&[v0, v1, v2]);
            }
            if stack != SPHERE_STACKS - 1 {
                indices.extend_from_slice(&[v1, v3, v2]);
            }
        }
    }

    RenderableDefinition::new(vertices, vec![Submesh::new(indices, material)])
}
