//! View-frustum extraction and AABB culling.
//!
//! Planes come straight from the rows of the view-projection matrix (Gribb/Hartmann).
//! A point `p` is inside a plane when `dot(n, p) + d >= 0`.

use super::Aabb;
use glam::{Mat4, Vec3, Vec4};

/// Plane normals shorter than this are left unnormalized
const NORMALIZE_EPSILON: f32 = 1e-6;

/// A plane `dot(normal, p) + distance = 0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    fn from_vec4(v: Vec4) -> Self {
        let plane = Self {
            normal: v.truncate(),
            distance: v.w,
        };
        plane.normalized()
    }

    fn normalized(self) -> Self {
        let len = self.normal.length();
        if len < NORMALIZE_EPSILON {
            return self;
        }
        Self {
            normal: self.normal / len,
            distance: self.distance / len,
        }
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Index of each plane in [`Frustum::planes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrustumSide {
    Left = 0,
    Right = 1,
    Bottom = 2,
    Top = 3,
    Near = 4,
    Far = 5,
}

/// Six clip planes: left, right, bottom, top, near, far
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// The near plane uses `w + z >= 0`. With a `[0, 1]` depth projection that plane sits
    /// behind the real near plane, which only ever keeps more geometry.
    pub fn from_view_projection(view_projection: Mat4) -> Self {
        let r0 = view_projection.row(0);
        let r1 = view_projection.row(1);
        let r2 = view_projection.row(2);
        let r3 = view_projection.row(3);

        Self {
            planes: [
                Plane::from_vec4(r3 + r0),
                Plane::from_vec4(r3 - r0),
                Plane::from_vec4(r3 + r1),
                Plane::from_vec4(r3 - r1),
                Plane::from_vec4(r3 + r2),
                Plane::from_vec4(r3 - r2),
            ],
        }
    }

    pub fn plane(&self, side: FrustumSide) -> &Plane {
        &self.planes[side as usize]
    }

    /// Conservative: a box touching the frustum is never rejected
    pub fn intersects_aabb(&self, world: &Aabb) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(world.positive_vertex(plane.normal)) >= 0.0)
    }
}

/// True when the box, placed by `world_transform`, lies entirely outside one plane.
pub fn is_culled(local_bounds: &Aabb, world_transform: &Mat4, frustum: &Frustum) -> bool {
    let world = local_bounds.transformed(world_transform);
    !frustum.intersects_aabb(&world)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Aabb {
        Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0))
    }

    fn camera_view_projection() -> Mat4 {
        let proj = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::new(0.0, 2.0, 8.0), Vec3::ZERO, Vec3::Y);
        proj * view
    }

    #[test]
    fn test_planes_are_normalized() {
        let frustum = Frustum::from_view_projection(camera_view_projection());
        for plane in &frustum.planes {
            assert!((plane.normal.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_orthographic_planes_are_normalized() {
        let vp = Mat4::orthographic_rh(-20.0, 20.0, -10.0, 10.0, 0.5, 50.0)
            * Mat4::look_at_rh(Vec3::new(5.0, 5.0, 5.0), Vec3::ZERO, Vec3::Y);
        let frustum = Frustum::from_view_projection(vp);
        for plane in &frustum.planes {
            assert!((plane.normal.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_degenerate_matrix_skips_normalization() {
        let frustum = Frustum::from_view_projection(Mat4::ZERO);
        for plane in &frustum.planes {
            assert!(plane.normal.x.is_finite());
            assert_eq!(plane.normal, Vec3::ZERO);
        }
    }

    #[test]
    fn test_identity_frustum_is_ndc_cube() {
        let frustum = Frustum::from_view_projection(Mat4::IDENTITY);
        let left = frustum.plane(FrustumSide::Left);
        assert_eq!(left.normal, Vec3::X);
        assert_eq!(left.distance, 1.0);
        let far = frustum.plane(FrustumSide::Far);
        assert_eq!(far.normal, -Vec3::Z);
        assert_eq!(far.distance, 1.0);
    }

    #[test]
    fn test_unit_box_in_canonical_cube_is_visible() {
        let frustum = Frustum::from_view_projection(Mat4::IDENTITY);
        assert!(!is_culled(&unit_box(), &Mat4::IDENTITY, &frustum));
    }

    #[test]
    fn test_box_outside_each_plane_is_culled() {
        let frustum = Frustum::from_view_projection(Mat4::IDENTITY);
        for offset in [
            Vec3::new(-5.0, 0.0, 0.0),
            Vec3::new(5.0, 0.0, 0.0),
            Vec3::new(0.0, -5.0, 0.0),
            Vec3::new(0.0, 5.0, 0.0),
            Vec3::new(0.0, 0.0, -5.0),
            Vec3::new(0.0, 0.0, 5.0),
        ] {
            let transform = Mat4::from_translation(offset);
            assert!(is_culled(&unit_box(), &transform, &frustum), "offset {offset}");
        }
    }

    #[test]
    fn test_box_straddling_a_plane_is_kept() {
        let frustum = Frustum::from_view_projection(Mat4::IDENTITY);
        let transform = Mat4::from_translation(Vec3::new(1.5, 0.0, 0.0));
        assert!(!is_culled(&unit_box(), &transform, &frustum));
    }

    #[test]
    fn test_perspective_camera() {
        let frustum = Frustum::from_view_projection(camera_view_projection());
        assert!(!is_culled(&unit_box(), &Mat4::IDENTITY, &frustum));
        // Behind the camera
        let behind = Mat4::from_translation(Vec3::new(0.0, 2.0, 20.0));
        assert!(is_culled(&unit_box(), &behind, &frustum));
        // Beyond the far plane
        let far = Mat4::from_translation(Vec3::new(0.0, 0.0, -200.0));
        assert!(is_culled(&unit_box(), &far, &frustum));
        // Far off to the side
        let side = Mat4::from_translation(Vec3::new(80.0, 0.0, 0.0));
        assert!(is_culled(&unit_box(), &side, &frustum));
    }

    #[test]
    fn test_rotated_scaled_box_uses_world_bounds() {
        let frustum = Frustum::from_view_projection(Mat4::IDENTITY);
        // Box centered at x = 2.2: the rotated corners reach back inside x <= 1.
        let transform = Mat4::from_translation(Vec3::new(2.2, 0.0, 0.0))
            * Mat4::from_rotation_z(std::f32::consts::FRAC_PI_4)
            * Mat4::from_scale(Vec3::splat(1.0));
        assert!(!is_culled(&unit_box(), &transform, &frustum));
    }
}
