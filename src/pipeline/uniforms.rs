//! Per-frame uniform block shared by every pipeline (set 0, binding 0)

use crate::pipeline::RenderSettings;
use crate::scene::{Camera, DirectionalLight};
use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Layout matches `FrameUniforms` in the WGSL sources
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    pub light_view_proj: [[f32; 4]; 4],
    /// xyz: camera position
    pub camera_position: [f32; 4],
    /// xyz: direction the light travels, w: intensity
    pub light_direction: [f32; 4],
    /// rgb: light color, a: environment intensity
    pub light_color: [f32; 4],
    /// exposure, gamma, shadow bias, unused
    pub tonemap: [f32; 4],
    /// strength, threshold, knee, filter radius
    pub bloom: [f32; 4],
    /// tonemap operator, unused x3
    pub options: [u32; 4],
}

impl FrameUniforms {
    pub const SIZE: u64 = std::mem::size_of::<FrameUniforms>() as u64;

    pub fn new(
        camera: &Camera,
        light: &DirectionalLight,
        light_view_proj: Mat4,
        settings: &RenderSettings,
    ) -> Self {
        let view_proj = camera.view_projection();
        let inv_view_proj = if view_proj.determinant().abs() > f32::EPSILON {
            view_proj.inverse()
        } else {
            Mat4::IDENTITY
        };
        let direction = light.direction.normalize_or_zero();
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            inv_view_proj: inv_view_proj.to_cols_array_2d(),
            light_view_proj: light_view_proj.to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).to_array(),
            light_direction: direction.extend(light.intensity).to_array(),
            light_color: light.color.extend(settings.environment_intensity).to_array(),
            tonemap: [settings.exposure, settings.gamma, settings.shadow_bias, 0.0],
            bloom: [
                settings.bloom_strength,
                settings.bloom_threshold,
                settings.bloom_knee,
                settings.bloom_filter_radius,
            ],
            options: [settings.tonemap.shader_index(), 0, 0, 0],
        }
    }
}

/// WGSL declaration of [`FrameUniforms`], prepended to every shader
pub const FRAME_UNIFORMS_WGSL: &str = r#"
struct FrameUniforms {
    view_proj: mat4x4<f32>,
    inv_view_proj: mat4x4<f32>,
    light_view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    light_direction: vec4<f32>,
    light_color: vec4<f32>,
    tonemap: vec4<f32>,
    bloom: vec4<f32>,
    options: vec4<u32>,
}

@group(0) @binding(0) var<uniform> frame: FrameUniforms;
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Projection;
    use glam::Vec3;

    #[test]
    fn test_size_is_16_byte_aligned() {
        assert_eq!(FrameUniforms::SIZE % 16, 0);
        assert_eq!(FrameUniforms::SIZE, 288);
    }

    #[test]
    fn test_settings_land_in_their_slots() {
        let camera = Camera::look_at(
            Vec3::new(0.0, 2.0, 5.0),
            Vec3::ZERO,
            Projection::perspective(60.0, 1.5, 0.1, 100.0),
        );
        let settings = RenderSettings {
            exposure: 2.0,
            bloom_strength: 0.3,
            tonemap: crate::pipeline::TonemapOperator::Reinhard,
            ..Default::default()
        };
        let uniforms = FrameUniforms::new(&camera, &DirectionalLight::default(), Mat4::IDENTITY, &settings);

        assert_eq!(uniforms.tonemap[0], 2.0);
        assert_eq!(uniforms.bloom[0], 0.3);
        assert_eq!(uniforms.options[0], 0);
        assert_eq!(uniforms.camera_position, [0.0, 2.0, 5.0, 1.0]);
    }
}
