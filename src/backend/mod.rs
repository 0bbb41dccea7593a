//! Backend abstraction layer
//!
//! [`GraphicsBackend`] is the seam between frame orchestration and the GPU API.
//! Two implementations exist: [`DummyBackend`] records calls for tests, and
//! `VulkanBackend` (feature `vulkan`) drives a real device through ash.

pub mod dummy;
pub mod traits;
pub mod types;

#[cfg(feature = "vulkan")]
pub mod vulkan;

pub use dummy::{DummyBackend, DummyEvent, DummyGpu, RecordedCommand};
pub use traits::*;
pub use types::*;

#[cfg(feature = "vulkan")]
pub use vulkan::VulkanBackend;
