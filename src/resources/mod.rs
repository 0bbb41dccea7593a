//! Thin mesh and material helpers
//!
//! Procedural meshes stand in for asset import; both types upload themselves
//! through [`GraphicsBackend`](crate::backend::GraphicsBackend).

mod material;
mod mesh;

pub use material::*;
pub use mesh::*;
