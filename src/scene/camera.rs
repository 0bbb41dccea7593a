//! Camera: the view and projection the main pass renders with

use crate::culling::Frustum;
use glam::{Mat4, Vec3};

/// Camera projection type
#[derive(Debug, Clone, Copy)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Projection::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    pub fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Self {
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        Projection::Orthographic {
            left: -half_w,
            right: half_w,
            bottom: -half_h,
            top: half_h,
            near,
            far,
        }
    }

    /// Right-handed, depth mapped to `[0, 1]`
    pub fn matrix(&self) -> Mat4 {
        match *self {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(fov_y, aspect, near, far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh(left, right, bottom, top, near, far),
        }
    }

    /// Follow a new surface aspect ratio; orthographic bounds are left alone
    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective { aspect: a, .. } = self {
            *a = aspect;
        }
    }
}

/// View and projection for one frame. The renderer only reads `view_projection()`
/// and `position`; everything else is convenience for building them.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self::look_at(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Projection::default())
    }
}

impl Camera {
    pub fn look_at(position: Vec3, target: Vec3, projection: Projection) -> Self {
        Self {
            view: Mat4::look_at_rh(position, target, Vec3::Y),
            projection: projection.matrix(),
            position,
        }
    }

    /// Camera from a ready-made view-projection matrix. The eye position is recovered
    /// by unprojecting the center of the near plane.
    pub fn from_view_projection(view_projection: Mat4) -> Self {
        let position = if view_projection.determinant().abs() > f32::EPSILON {
            view_projection.inverse().project_point3(Vec3::ZERO)
        } else {
            Vec3::ZERO
        };
        Self {
            view: Mat4::IDENTITY,
            projection: view_projection,
            position,
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(self.view_projection())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_view_projection() {
        let camera = Camera::from_view_projection(Mat4::IDENTITY);
        assert_eq!(camera.view_projection(), Mat4::IDENTITY);
        assert_eq!(camera.position, Vec3::ZERO);
    }

    #[test]
    fn test_look_at_keeps_target_in_front() {
        let camera = Camera::look_at(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::ZERO,
            Projection::perspective(60.0, 1.0, 0.1, 100.0),
        );
        let clip = camera.view_projection() * Vec3::ZERO.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_set_aspect_updates_perspective_only() {
        let mut perspective = Projection::perspective(60.0, 1.0, 0.1, 100.0);
        perspective.set_aspect(2.0);
        assert_eq!(
            perspective.matrix(),
            Projection::perspective(60.0, 2.0, 0.1, 100.0).matrix()
        );

        let mut ortho = Projection::orthographic(4.0, 2.0, 0.1, 10.0);
        let before = ortho.matrix();
        ortho.set_aspect(3.0);
        assert_eq!(ortho.matrix(), before);
    }
}
