//! Mesh geometry.
//!
//! Vertices live in a structured buffer that shaders read by index (vertex
//! pulling); there is no input assembler layout. Indices are 32-bit.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::context::GraphicsContext;
use crate::error::GraphicsError;
use crate::factory::ResourceFactory;
use crate::resources::Buffer;
use crate::types::{BufferDescriptor, BufferUsage};

/// Vertex layout shared by every mesh.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, uv: [f32; 2]) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            uv,
        }
    }
}

/// CPU-side geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Unit cube centered at the origin, 24 vertices with face normals.
    pub fn cube() -> Self {
        let faces = [
            (Vec3::X, Vec3::Y),
            (Vec3::NEG_X, Vec3::Y),
            (Vec3::Y, Vec3::Z),
            (Vec3::NEG_Y, Vec3::Z),
            (Vec3::Z, Vec3::Y),
            (Vec3::NEG_Z, Vec3::Y),
        ];
        let mut mesh = Self::default();
        for (normal, up) in faces {
            let right = up.cross(normal);
            let base = mesh.vertices.len() as u32;
            let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
            for (u, v) in corners {
                let position = (normal + right * u + up * v) * 0.5;
                mesh.vertices.push(Vertex::new(
                    position,
                    normal,
                    [(u + 1.0) * 0.5, 1.0 - (v + 1.0) * 0.5],
                ));
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }

    /// UV sphere of radius 0.5.
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut mesh = Self::default();

        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let theta = v * std::f32::consts::PI;
            for segment in 0..=segments {
                let u = segment as f32 / segments as f32;
                let phi = u * std::f32::consts::TAU;
                let normal = Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
                mesh.vertices.push(Vertex::new(normal * 0.5, normal, [u, v]));
            }
        }

        let stride = segments + 1;
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * stride + segment;
                let b = a + stride;
                mesh.indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }
        mesh
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Geometry uploaded to device-local memory.
#[derive(Debug)]
pub struct GpuMesh {
    vertices: Buffer,
    indices: Buffer,
    index_count: u32,
}

impl GpuMesh {
    pub fn new(
        factory: &dyn ResourceFactory,
        data: &MeshData,
        label: &str,
    ) -> Result<Self, GraphicsError> {
        if data.is_empty() || data.vertices.is_empty() {
            return Err(GraphicsError::InvalidParameter(format!(
                "mesh {label:?} has no geometry"
            )));
        }
        let vertices = factory.create_buffer(
            &BufferDescriptor::for_elements::<Vertex>(
                BufferUsage::StructuredBuffer,
                data.vertices.len(),
            )
            .with_label(format!("{label} vertices")),
            Some(bytemuck::cast_slice(&data.vertices)),
        )?;
        let indices = factory.create_buffer(
            &BufferDescriptor::for_elements::<u32>(BufferUsage::IndexBuffer, data.indices.len())
                .with_label(format!("{label} indices")),
            Some(bytemuck::cast_slice(&data.indices)),
        )?;
        Ok(Self {
            vertices,
            indices,
            index_count: data.indices.len() as u32,
        })
    }

    /// Descriptor index of the vertex buffer SRV.
    pub fn vertex_srv(&self) -> Result<u32, GraphicsError> {
        self.vertices.srv_index().ok_or_else(|| {
            GraphicsError::Internal(format!("vertex buffer {:?} has no SRV", self.vertices.label()))
        })
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Bind the index buffer and issue the draw.
    pub fn draw(&self, ctx: &mut GraphicsContext, instances: u32) {
        ctx.set_index_buffer(&self.indices);
        ctx.draw_indexed_instanced(self.index_count, instances, 0, 0, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
    }

    #[test]
    fn test_cube() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        for vertex in &cube.vertices {
            let position = Vec3::from_array(vertex.position);
            assert!((position.abs().max_element() - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_sphere_indices_in_range() {
        let sphere = MeshData::sphere(16, 8);
        assert_eq!(sphere.vertices.len(), 17 * 9);
        assert_eq!(sphere.indices.len(), 16 * 8 * 6);
        let count = sphere.vertices.len() as u32;
        assert!(sphere.indices.iter().all(|&i| i < count));
    }
}
