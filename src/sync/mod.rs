//! GPU resource state tracking
//!
//! - [`state`]: the `{stage, access, layout}` vocabulary
//! - [`tracker`]: [`GpuImage`] and its single mutation point, `request_transition`
//! - [`batch`]: collecting barriers into one pipeline barrier per pass

mod batch;
mod state;
mod tracker;

pub use batch::BarrierBatch;
pub use state::{AccessFlags, ImageAccess, ImageLayout, PipelineStages, ResourceState};
pub use tracker::{GpuImage, ImageBarrier};
