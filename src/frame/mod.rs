//! Frames in flight: slots, pacing and the swapchain present loop

mod ring;
mod slot;

pub use ring::{
    Acquire, ActiveFrame, FrameRing, PresentCycle, PresentStatus, RingConfig, SlotToken,
    SurfaceResources, SurfaceStatus,
};
pub use slot::{FrameSlot, GrowableBuffer, SlotResources, SlotState};
