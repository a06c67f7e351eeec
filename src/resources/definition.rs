//! Programmatic renderable geometry.
//!
//! A [`RenderableDefinition`] is a vertex list plus one triangle index list
//! and material per submesh. It is turned into interleaved [`MeshData`] with
//! the attribute set of its first vertex: positions always, tangents when
//! normals are present (the tangent frame is stored as a unit quaternion that
//! rotates +Z onto the normal), texture coordinates and colors when present.

use glam::{Quat, Vec2, Vec3, Vec4};

use crate::backend::{Aabb, VertexAttributes};
use crate::errors::{Error, Result};
use crate::resources::internal_data::{IndexData, MeshData};
use crate::resources::material::Material;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Option<Vec3>,
    pub uv: Option<Vec2>,
    pub color: Option<Vec4>,
}

impl Vertex {
    #[must_use]
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_normal(mut self, normal: Vec3) -> Self {
        self.normal = Some(normal);
        self
    }

    #[must_use]
    pub fn with_uv(mut self, uv: Vec2) -> Self {
        self.uv = Some(uv);
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: Vec4) -> Self {
        self.color = Some(color);
        self
    }
}

/// Triangles of one submesh and the material they are drawn with.
#[derive(Debug, Clone)]
pub struct Submesh {
    pub triangle_indices: Vec<u32>,
    pub material: Material,
    pub name: Option<String>,
}

impl Submesh {
    #[must_use]
    pub fn new(triangle_indices: Vec<u32>, material: Material) -> Self {
        Self {
            triangle_indices,
            material,
            name: None,
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderableDefinition {
    vertices: Vec<Vertex>,
    submeshes: Vec<Submesh>,
}

impl RenderableDefinition {
    #[must_use]
    pub fn new(vertices: Vec<Vertex>, submeshes: Vec<Submesh>) -> Self {
        Self {
            vertices,
            submeshes,
        }
    }

    #[must_use]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn set_vertices(&mut self, vertices: Vec<Vertex>) {
        self.vertices = vertices;
    }

    #[must_use]
    pub fn submeshes(&self) -> &[Submesh] {
        &self.submeshes
    }

    pub fn set_submeshes(&mut self, submeshes: Vec<Submesh>) {
        self.submeshes = submeshes;
    }

    /// Vertex attributes derived from the first vertex.
    #[must_use]
    pub fn attributes(&self) -> VertexAttributes {
        let mut attributes = VertexAttributes::POSITION;
        if let Some(first) = self.vertices.first() {
            attributes.set(VertexAttributes::TANGENTS, first.normal.is_some());
            attributes.set(VertexAttributes::UV0, first.uv.is_some());
            attributes.set(VertexAttributes::COLOR, first.color.is_some());
        }
        attributes
    }

    /// Bounds over every vertex position.
    pub fn bounding_box(&self) -> Result<Aabb> {
        Aabb::from_points(self.vertices.iter().map(|v| v.position))
            .ok_or_else(|| Error::MissingSource("definition has no vertices".into()))
    }

    /// Interleaves the vertices and concatenates the submesh index lists.
    pub fn to_mesh_data(&self) -> Result<(MeshData, Aabb)> {
        let bounding_box = self.bounding_box()?;
        let attributes = self.attributes();
        let vertex_count = self.vertices.len();

        let mut vertices = Vec::with_capacity(vertex_count * attributes.stride());
        for vertex in &self.vertices {
            vertices.extend_from_slice(bytemuck::bytes_of(&vertex.position.to_array()));
            if attributes.contains(VertexAttributes::TANGENTS) {
                let normal = vertex.normal.unwrap_or(Vec3::Z).normalize_or(Vec3::Z);
                let tangent = Quat::from_rotation_arc(Vec3::Z, normal);
                vertices.extend_from_slice(bytemuck::bytes_of(&tangent.to_array()));
            }
            if attributes.contains(VertexAttributes::UV0) {
                let uv = vertex.uv.unwrap_or(Vec2::ZERO);
                vertices.extend_from_slice(bytemuck::bytes_of(&uv.to_array()));
            }
            if attributes.contains(VertexAttributes::COLOR) {
                let color = vertex.color.unwrap_or(Vec4::ONE);
                vertices.extend_from_slice(bytemuck::bytes_of(&color.to_array()));
            }
        }

        let mut indices = Vec::new();
        let mut submeshes = Vec::with_capacity(self.submeshes.len());
        for (i, submesh) in self.submeshes.iter().enumerate() {
            if let Some(&bad) = submesh
                .triangle_indices
                .iter()
                .find(|&&idx| idx as usize >= vertex_count)
            {
                return Err(Error::InvalidBundle(format!(
                    "submesh {i} references vertex {bad} of {vertex_count}"
                )));
            }
            let start = indices.len() as u32;
            indices.extend_from_slice(&submesh.triangle_indices);
            submeshes.push(start..indices.len() as u32);
        }

        let mesh = MeshData {
            attributes,
            vertex_count,
            vertices,
            indices: IndexData::for_vertex_count(indices, vertex_count),
            submeshes,
        };
        Ok((mesh, bounding_box))
    }
}
