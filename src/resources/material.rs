//! Material parameters and their GPU bind group

use crate::backend::{
    BackendResult, BindGroupEntry, BindGroupHandle, BindGroupLayoutKind, BufferDescriptor,
    BufferHandle, BufferUsage, GraphicsBackend,
};
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Surface parameters consumed by the mesh shader
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub base_color: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub emissive: Vec3,
    pub emissive_strength: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            base_color: Vec4::ONE,
            metallic: 0.0,
            roughness: 0.5,
            emissive: Vec3::ZERO,
            emissive_strength: 1.0,
        }
    }
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_base_color(mut self, color: Vec4) -> Self {
        self.base_color = color;
        self
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic;
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness;
        self
    }

    pub fn with_emissive(mut self, emissive: Vec3, strength: f32) -> Self {
        self.emissive = emissive;
        self.emissive_strength = strength;
        self
    }

    pub fn plastic(color: Vec3) -> Self {
        Self::new("plastic")
            .with_base_color(color.extend(1.0))
            .with_roughness(0.4)
    }

    pub fn metal(color: Vec3, roughness: f32) -> Self {
        Self::new("metal")
            .with_base_color(color.extend(1.0))
            .with_metallic(1.0)
            .with_roughness(roughness)
    }

    /// Bright self-lit surface; these are what the bloom chain picks up
    pub fn emissive(color: Vec3, strength: f32) -> Self {
        Self::new("emissive").with_emissive(color, strength)
    }

    pub fn uniform_data(&self) -> MaterialUniformData {
        MaterialUniformData {
            base_color: self.base_color,
            metallic_roughness: Vec4::new(self.metallic, self.roughness, 0.0, 0.0),
            emissive: self.emissive.extend(self.emissive_strength),
        }
    }

    /// Create the uniform buffer and the set-2 bind group for this material
    pub fn upload<B: GraphicsBackend>(&self, backend: &mut B) -> BackendResult<GpuMaterial> {
        let data = self.uniform_data();
        let bytes = bytemuck::bytes_of(&data);
        let buffer = backend.create_buffer(&BufferDescriptor::new(
            &format!("material '{}'", self.name),
            bytes.len() as u64,
            BufferUsage::UNIFORM,
        ))?;
        backend.write_buffer(buffer, 0, bytes)?;

        let bind_group = backend.create_bind_group(
            BindGroupLayoutKind::Material,
            &[(
                0,
                BindGroupEntry::Buffer {
                    buffer,
                    offset: 0,
                    size: bytes.len() as u64,
                },
            )],
        )?;

        Ok(GpuMaterial { buffer, bind_group })
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialUniformData {
    pub base_color: Vec4,
    /// x = metallic, y = roughness
    pub metallic_roughness: Vec4,
    /// xyz = emissive color, w = strength
    pub emissive: Vec4,
}

/// A material as the renderer sees it: one bind group handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuMaterial {
    pub buffer: BufferHandle,
    pub bind_group: BindGroupHandle,
}

impl GpuMaterial {
    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        backend.destroy_bind_group(self.bind_group);
        backend.destroy_buffer(self.buffer);
    }
}
