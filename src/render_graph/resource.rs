//! Images the frame graph knows about

use crate::sync::ImageAccess;

/// Every image a frame pass can touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetId {
    ShadowMap,
    SceneColorMsaa,
    SceneDepthMsaa,
    /// Single-sample HDR color the MSAA target resolves into
    SceneResolve,
    /// Bloom pyramid level, 0 is the largest
    Bloom(u32),
    /// The swapchain image acquired for this frame
    Swapchain,
}

/// A declared use of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceAccess {
    pub target: TargetId,
    pub access: ImageAccess,
}

impl ResourceAccess {
    pub fn new(target: TargetId, access: ImageAccess) -> Self {
        Self { target, access }
    }
}
