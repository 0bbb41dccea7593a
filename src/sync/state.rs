//! Synchronization state of a GPU image: last stage, last access, current layout.

use bitflags::bitflags;

bitflags! {
    /// Pipeline stages that can touch an image
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        const VERTEX_SHADER = 1 << 0;
        const EARLY_FRAGMENT_TESTS = 1 << 1;
        const LATE_FRAGMENT_TESTS = 1 << 2;
        const FRAGMENT_SHADER = 1 << 3;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 4;
        const TRANSFER = 1 << 5;
    }
}

bitflags! {
    /// Memory access kinds
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const SHADER_READ = 1 << 0;
        const COLOR_ATTACHMENT_READ = 1 << 1;
        const COLOR_ATTACHMENT_WRITE = 1 << 2;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 3;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 4;
        const TRANSFER_READ = 1 << 5;
        const TRANSFER_WRITE = 1 << 6;
    }
}

impl AccessFlags {
    pub const WRITES: AccessFlags = AccessFlags::COLOR_ATTACHMENT_WRITE
        .union(AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        .union(AccessFlags::TRANSFER_WRITE);

    pub fn has_writes(&self) -> bool {
        self.intersects(Self::WRITES)
    }
}

/// Image layouts used by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    /// Contents are undefined; valid only as a source layout
    Undefined,
    ColorAttachment,
    DepthAttachment,
    ShaderReadOnly,
    TransferDst,
    PresentSrc,
}

/// `{stage, access, layout}` triple recorded per image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceState {
    pub stage: PipelineStages,
    pub access: AccessFlags,
    pub layout: ImageLayout,
}

impl ResourceState {
    /// State of a freshly created image: no stage, no access, undefined layout
    pub const UNDEFINED: ResourceState = ResourceState {
        stage: PipelineStages::empty(),
        access: AccessFlags::empty(),
        layout: ImageLayout::Undefined,
    };

    pub const fn new(stage: PipelineStages, access: AccessFlags, layout: ImageLayout) -> Self {
        Self { stage, access, layout }
    }
}

impl Default for ResourceState {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

/// The uses a pass can declare for an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageAccess {
    /// Rendered to, previous contents cleared or discarded
    ColorAttachmentWrite,
    /// Rendered to with blending or a load op, previous contents read
    ColorAttachmentReadWrite,
    DepthAttachmentWrite,
    /// Sampled in a fragment shader
    FragmentShaderRead,
    /// Destination of a buffer-to-image copy
    TransferWrite,
    /// Handed to the presentation engine
    Present,
}

impl ImageAccess {
    pub fn state(self) -> ResourceState {
        match self {
            ImageAccess::ColorAttachmentWrite => ResourceState::new(
                PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                AccessFlags::COLOR_ATTACHMENT_WRITE,
                ImageLayout::ColorAttachment,
            ),
            ImageAccess::ColorAttachmentReadWrite => ResourceState::new(
                PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                AccessFlags::COLOR_ATTACHMENT_READ | AccessFlags::COLOR_ATTACHMENT_WRITE,
                ImageLayout::ColorAttachment,
            ),
            ImageAccess::DepthAttachmentWrite => ResourceState::new(
                PipelineStages::EARLY_FRAGMENT_TESTS | PipelineStages::LATE_FRAGMENT_TESTS,
                AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                ImageLayout::DepthAttachment,
            ),
            ImageAccess::FragmentShaderRead => ResourceState::new(
                PipelineStages::FRAGMENT_SHADER,
                AccessFlags::SHADER_READ,
                ImageLayout::ShaderReadOnly,
            ),
            ImageAccess::TransferWrite => ResourceState::new(
                PipelineStages::TRANSFER,
                AccessFlags::TRANSFER_WRITE,
                ImageLayout::TransferDst,
            ),
            // The acquire semaphore waits at color-attachment output, so the next
            // frame's transition out of this state chains with it.
            ImageAccess::Present => ResourceState::new(
                PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                AccessFlags::empty(),
                ImageLayout::PresentSrc,
            ),
        }
    }

    pub fn is_write(self) -> bool {
        self.state().access.has_writes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_state_is_undefined() {
        let state = ResourceState::default();
        assert!(state.stage.is_empty());
        assert!(state.access.is_empty());
        assert_eq!(state.layout, ImageLayout::Undefined);
    }

    #[test]
    fn test_write_classification() {
        assert!(ImageAccess::ColorAttachmentWrite.is_write());
        assert!(ImageAccess::ColorAttachmentReadWrite.is_write());
        assert!(ImageAccess::DepthAttachmentWrite.is_write());
        assert!(ImageAccess::TransferWrite.is_write());
        assert!(!ImageAccess::FragmentShaderRead.is_write());
        assert!(!ImageAccess::Present.is_write());
    }

    #[test]
    fn test_layouts() {
        assert_eq!(
            ImageAccess::FragmentShaderRead.state().layout,
            ImageLayout::ShaderReadOnly
        );
        assert_eq!(ImageAccess::Present.state().layout, ImageLayout::PresentSrc);
        assert_eq!(
            ImageAccess::DepthAttachmentWrite.state().layout,
            ImageLayout::DepthAttachment
        );
    }
}
