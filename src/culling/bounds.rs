use glam::{Mat4, Vec3};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point. `None` for an empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Self::new(first, first), |acc, p| Self {
            min: acc.min.min(p),
            max: acc.max.max(p),
        }))
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extents(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// World-space box around the eight transformed corners
    pub fn transformed(&self, transform: &Mat4) -> Self {
        let corners = self.corners().map(|c| transform.transform_point3(c));
        let mut min = corners[0];
        let mut max = corners[0];
        for c in &corners[1..] {
            min = min.min(*c);
            max = max.max(*c);
        }
        Self { min, max }
    }

    pub fn union(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Corner furthest along `normal`
    pub fn positive_vertex(&self, normal: Vec3) -> Vec3 {
        Vec3::new(
            if normal.x >= 0.0 { self.max.x } else { self.min.x },
            if normal.y >= 0.0 { self.max.y } else { self.min.y },
            if normal.z >= 0.0 { self.max.z } else { self.min.z },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transformed_translation() {
        let b = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let t = b.transformed(&Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        assert_eq!(t.min, Vec3::new(9.0, -1.0, -1.0));
        assert_eq!(t.max, Vec3::new(11.0, 1.0, 1.0));
    }

    #[test]
    fn test_transformed_rotation_grows_box() {
        let b = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let t = b.transformed(&Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4));
        let expected = 2.0_f32.sqrt();
        assert!((t.max.x - expected).abs() < 1e-5);
        assert!((t.min.z + expected).abs() < 1e-5);
        assert!((t.max.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_positive_vertex() {
        let b = Aabb::new(Vec3::new(-1.0, -2.0, -3.0), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(
            b.positive_vertex(Vec3::new(1.0, -1.0, 0.0)),
            Vec3::new(1.0, -2.0, 3.0)
        );
    }

    #[test]
    fn test_from_points() {
        assert!(Aabb::from_points(std::iter::empty()).is_none());
        let b = Aabb::from_points([Vec3::X, -Vec3::Y, Vec3::Z * 2.0]).unwrap();
        assert_eq!(b.min, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(b.max, Vec3::new(1.0, 0.0, 2.0));
    }
}
