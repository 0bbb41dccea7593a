//! Pass declarations

use crate::render_graph::resource::{ResourceAccess, TargetId};
use crate::sync::ImageAccess;

/// Unique identifier for a pass within one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub(crate) u32);

impl PassId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// The six stages of a frame, in execution order. Several graph nodes may belong to one
/// stage (the bloom chain is one node per level).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameStage {
    Shadow,
    Main,
    BloomDownsample,
    BloomUpsample,
    Composite,
    Overlay,
}

impl FrameStage {
    pub const ALL: [FrameStage; 6] = [
        FrameStage::Shadow,
        FrameStage::Main,
        FrameStage::BloomDownsample,
        FrameStage::BloomUpsample,
        FrameStage::Composite,
        FrameStage::Overlay,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FrameStage::Shadow => "shadow",
            FrameStage::Main => "main",
            FrameStage::BloomDownsample => "bloom downsample",
            FrameStage::BloomUpsample => "bloom upsample",
            FrameStage::Composite => "composite",
            FrameStage::Overlay => "overlay",
        }
    }
}

/// What a pass reads and writes, and the state it leaves images in afterwards.
///
/// Reads and writes are transitioned before the pass runs. Releases are transitioned
/// right after it, for images whose next consumer is outside the pass list (the
/// presentation engine) or that should leave the pass already readable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassUsage {
    pub reads: Vec<ResourceAccess>,
    pub writes: Vec<ResourceAccess>,
    pub releases: Vec<ResourceAccess>,
}

impl PassUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(mut self, target: TargetId, access: ImageAccess) -> Self {
        debug_assert!(!access.is_write(), "{target:?} declared as read with {access:?}");
        self.reads.push(ResourceAccess::new(target, access));
        self
    }

    pub fn write(mut self, target: TargetId, access: ImageAccess) -> Self {
        self.writes.push(ResourceAccess::new(target, access));
        self
    }

    pub fn release(mut self, target: TargetId, access: ImageAccess) -> Self {
        self.releases.push(ResourceAccess::new(target, access));
        self
    }

    /// Transitions to apply before the pass body
    pub fn acquires(&self) -> impl Iterator<Item = &ResourceAccess> {
        self.reads.iter().chain(self.writes.iter())
    }

    pub fn reads_target(&self, target: TargetId) -> bool {
        self.reads.iter().any(|a| a.target == target)
    }

    /// Writes and releases both change the image (contents or layout)
    pub fn modifies_target(&self, target: TargetId) -> bool {
        self.writes
            .iter()
            .chain(self.releases.iter())
            .any(|a| a.target == target)
    }
}

/// Graph metadata for one pass
#[derive(Debug, Clone)]
pub struct PassNode {
    pub id: PassId,
    pub name: String,
    pub stage: FrameStage,
    pub usage: PassUsage,
}
