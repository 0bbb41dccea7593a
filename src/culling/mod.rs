//! View-frustum culling

mod bounds;
mod frustum;

pub use bounds::Aabb;
pub use frustum::{is_culled, Frustum, FrustumSide, Plane};
