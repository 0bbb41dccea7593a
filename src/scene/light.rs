//! Directional light and its shadow projection

use crate::culling::Aabb;
use glam::{Mat4, Vec3};

/// Sun-style light. `direction` points from the light into the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.4, -1.0, -0.3).normalize(),
            color: Vec3::new(1.0, 0.96, 0.9),
            intensity: 3.0,
        }
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            color,
            intensity,
        }
    }

    /// Orthographic view-projection enclosing the bounding sphere of `scene_bounds`
    pub fn view_projection(&self, scene_bounds: &Aabb) -> Mat4 {
        let center = scene_bounds.center();
        let radius = (scene_bounds.extents().length() * 0.5).max(1.0);
        let direction = if self.direction.length_squared() > 0.0 {
            self.direction.normalize()
        } else {
            -Vec3::Y
        };
        let up = if direction.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };

        let eye = center - direction * radius * 2.0;
        let view = Mat4::look_at_rh(eye, center, up);
        let projection = Mat4::orthographic_rh(-radius, radius, -radius, radius, 0.0, radius * 4.0);
        projection * view
    }
}
