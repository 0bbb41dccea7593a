//! Scene-side inputs to the renderer
//!
//! A [`Scene`] is a flat list of [`Drawable`]s plus one directional light. There is no
//! hierarchy: each drawable already carries its world transform.

mod camera;
mod light;
mod transform;

pub use camera::*;
pub use light::*;
pub use transform::*;

use crate::backend::BindGroupHandle;
use crate::culling::Aabb;
use crate::resources::{GpuMaterial, GpuMesh};
use glam::Mat4;

/// One mesh instance the renderer may draw
#[derive(Debug, Clone, Copy)]
pub struct Drawable {
    pub mesh: GpuMesh,
    pub material: BindGroupHandle,
    pub world: Mat4,
    pub casts_shadow: bool,
}

impl Drawable {
    pub fn new(mesh: GpuMesh, material: &GpuMaterial) -> Self {
        Self {
            mesh,
            material: material.bind_group,
            world: Mat4::IDENTITY,
            casts_shadow: true,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.world = transform.matrix();
        self
    }

    pub fn with_world(mut self, world: Mat4) -> Self {
        self.world = world;
        self
    }

    pub fn without_shadow(mut self) -> Self {
        self.casts_shadow = false;
        self
    }

    /// Local bounds placed in the world
    pub fn world_bounds(&self) -> Aabb {
        self.mesh.bounds.transformed(&self.world)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub drawables: Vec<Drawable>,
    pub light: DirectionalLight,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, drawable: Drawable) -> usize {
        self.drawables.push(drawable);
        self.drawables.len() - 1
    }

    /// Union of every drawable's world bounds
    pub fn bounds(&self) -> Option<Aabb> {
        self.drawables
            .iter()
            .map(Drawable::world_bounds)
            .reduce(|a, b| a.union(&b))
    }
}
