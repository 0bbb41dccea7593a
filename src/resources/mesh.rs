//! Mesh data, procedural generators and GPU upload

use crate::backend::{
    BackendResult, BufferDescriptor, BufferHandle, BufferUsage, GraphicsBackend,
};
use crate::culling::Aabb;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Vertex layout shared by the shadow and mesh pipelines
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl MeshVertex {
    pub const STRIDE: u32 = std::mem::size_of::<MeshVertex>() as u32;

    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self { position, normal, uv }
    }
}

/// CPU-side indexed triangle mesh
#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Local-space bounds; a mesh without vertices gets a degenerate box at the origin
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.vertices.iter().map(|v| v.position))
            .unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO))
    }

    /// Axis-aligned cube of edge `size` centered at the origin
    pub fn cube(size: f32) -> Self {
        let mut mesh = Mesh::new("cube");
        let h = size * 0.5;
        let faces = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (-Vec3::Z, -Vec3::X, Vec3::Y),
            (Vec3::X, -Vec3::Z, Vec3::Y),
            (-Vec3::X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, -Vec3::Z),
            (-Vec3::Y, Vec3::X, Vec3::Z),
        ];

        for (normal, right, up) in faces {
            let base = mesh.vertices.len() as u32;
            let center = normal * h;
            for (u, v) in [(0.0, 1.0), (1.0, 1.0), (1.0, 0.0), (0.0, 0.0)] {
                let position = center + right * h * (u * 2.0 - 1.0) + up * h * (1.0 - v * 2.0);
                mesh.vertices
                    .push(MeshVertex::new(position, normal, Vec2::new(u, v)));
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        mesh
    }

    /// UV sphere of the given radius
    pub fn sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let mut mesh = Mesh::new("sphere");
        let segment_angle = std::f32::consts::TAU / segments as f32;
        let ring_angle = std::f32::consts::PI / rings as f32;

        for ring in 0..=rings {
            let phi = ring as f32 * ring_angle;
            let (ring_radius, y) = phi.sin_cos();

            for segment in 0..=segments {
                let theta = segment as f32 * segment_angle;
                let normal = Vec3::new(ring_radius * theta.cos(), y, ring_radius * theta.sin());
                let uv = Vec2::new(
                    segment as f32 / segments as f32,
                    ring as f32 / rings as f32,
                );
                mesh.vertices
                    .push(MeshVertex::new(normal * radius, normal, uv));
            }
        }

        for ring in 0..rings {
            for segment in 0..segments {
                let current = ring * (segments + 1) + segment;
                let next = current + segments + 1;
                mesh.indices.extend_from_slice(&[
                    current,
                    next,
                    current + 1,
                    current + 1,
                    next,
                    next + 1,
                ]);
            }
        }

        mesh
    }

    /// Flat quad on the XZ plane facing +Y
    pub fn plane(width: f32, depth: f32) -> Self {
        let mut mesh = Mesh::new("plane");
        let (hw, hd) = (width * 0.5, depth * 0.5);
        for (x, z, u, v) in [
            (-hw, -hd, 0.0, 0.0),
            (hw, -hd, 1.0, 0.0),
            (hw, hd, 1.0, 1.0),
            (-hw, hd, 0.0, 1.0),
        ] {
            mesh.vertices
                .push(MeshVertex::new(Vec3::new(x, 0.0, z), Vec3::Y, Vec2::new(u, v)));
        }
        mesh.indices.extend_from_slice(&[0, 2, 1, 0, 3, 2]);
        mesh
    }

    /// Upload vertices and indices into fresh GPU buffers
    pub fn upload<B: GraphicsBackend>(&self, backend: &mut B) -> BackendResult<GpuMesh> {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&self.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&self.indices);

        let vertex_buffer = backend.create_buffer(&BufferDescriptor::new(
            &format!("{} vertices", self.name),
            vertex_bytes.len() as u64,
            BufferUsage::VERTEX,
        ))?;
        backend.write_buffer(vertex_buffer, 0, vertex_bytes)?;

        let index_buffer = backend.create_buffer(&BufferDescriptor::new(
            &format!("{} indices", self.name),
            index_bytes.len() as u64,
            BufferUsage::INDEX,
        ))?;
        backend.write_buffer(index_buffer, 0, index_bytes)?;

        log::debug!(
            "Uploaded mesh '{}' ({} vertices, {} triangles)",
            self.name,
            self.vertices.len(),
            self.triangle_count()
        );

        Ok(GpuMesh {
            vertex_buffer,
            index_buffer,
            index_count: self.indices.len() as u32,
            bounds: self.bounds(),
        })
    }
}

/// Vertex/index buffer pair plus the local bounds used for culling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuMesh {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
    pub bounds: Aabb,
}

impl GpuMesh {
    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        backend.destroy_buffer(self.vertex_buffer);
        backend.destroy_buffer(self.index_buffer);
    }
}
