//! Per-image state tracking.
//!
//! Every GPU image the renderer touches is wrapped in a [`GpuImage`], which carries the
//! image's current [`ResourceState`] as a private field. The only way to change that
//! field is [`GpuImage::request_transition`], which hands back the barrier the caller
//! must record before the next use:
//!
//! ```text
//!   recorded state ──request_transition(dst)──► ImageBarrier { old: recorded, new: dst }
//!                                               recorded := dst
//! ```
//!
//! The tracker makes no GPU calls and never rejects a request. Asking for the state an
//! image is already in yields a barrier whose old and new halves are equal.

use crate::backend::{
    BackendResult, Extent2d, GraphicsBackend, ImageDescriptor, ImageId, TextureFormat,
};
use crate::sync::state::{ImageAccess, ResourceState};

/// A GPU-resident image plus its recorded synchronization state
#[derive(Debug)]
pub struct GpuImage {
    id: ImageId,
    desc: ImageDescriptor,
    state: ResourceState,
}

impl GpuImage {
    /// Create the image on the backend. The initial state is [`ResourceState::UNDEFINED`].
    pub fn create<B: GraphicsBackend>(backend: &mut B, desc: ImageDescriptor) -> BackendResult<Self> {
        let id = backend.create_image(&desc)?;
        log::debug!(
            "Created image '{}' {}x{} {:?} ({} samples)",
            desc.label,
            desc.extent.width,
            desc.extent.height,
            desc.format,
            desc.samples
        );
        Ok(Self::wrap(id, desc))
    }

    /// Track an image the backend already owns, such as a swapchain image
    pub fn wrap(id: ImageId, desc: ImageDescriptor) -> Self {
        Self {
            id,
            desc,
            state: ResourceState::UNDEFINED,
        }
    }

    pub fn destroy<B: GraphicsBackend>(self, backend: &mut B) {
        log::debug!("Destroying image '{}'", self.desc.label);
        backend.destroy_image(self.id);
    }

    pub fn id(&self) -> ImageId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.desc.label
    }

    pub fn descriptor(&self) -> &ImageDescriptor {
        &self.desc
    }

    pub fn extent(&self) -> Extent2d {
        self.desc.extent
    }

    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }

    /// The state that holds once every barrier handed out so far has executed
    pub fn state(&self) -> ResourceState {
        self.state
    }

    /// Move the image to `dst`, returning the barrier that performs the move.
    pub fn request_transition(&mut self, dst: ResourceState) -> ImageBarrier {
        let barrier = ImageBarrier {
            image: self.id,
            format: self.desc.format,
            mip_levels: self.desc.mip_levels,
            array_layers: self.desc.array_layers,
            old: self.state,
            new: dst,
        };
        log::trace!(
            "'{}': {:?} -> {:?}",
            self.desc.label,
            barrier.old.layout,
            barrier.new.layout
        );
        self.state = dst;
        barrier
    }

    pub fn transition_to(&mut self, access: ImageAccess) -> ImageBarrier {
        self.request_transition(access.state())
    }
}

/// Old and new state of one image, covering all of its mips and layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: ImageId,
    pub format: TextureFormat,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub old: ResourceState,
    pub new: ResourceState,
}

impl ImageBarrier {
    /// Same layout on both sides and nothing written before: no hazard to cover
    pub fn is_redundant(&self) -> bool {
        self.old == self.new && !self.old.access.has_writes()
    }

    pub fn changes_layout(&self) -> bool {
        self.old.layout != self.new.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TextureUsage;
    use crate::sync::state::{AccessFlags, ImageLayout, PipelineStages};

    fn image(id: u64) -> GpuImage {
        GpuImage::wrap(
            ImageId(id),
            ImageDescriptor::new_2d(
                "test",
                TextureFormat::Rgba16Float,
                Extent2d::new(64, 64),
                TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            ),
        )
    }

    #[test]
    fn test_fresh_image_is_undefined() {
        assert_eq!(image(1).state(), ResourceState::UNDEFINED);
    }

    #[test]
    fn test_transition_records_old_and_new() {
        let mut img = image(1);
        let target = ImageAccess::ColorAttachmentWrite.state();

        let barrier = img.request_transition(target);

        assert_eq!(barrier.image, ImageId(1));
        assert_eq!(barrier.old, ResourceState::UNDEFINED);
        assert_eq!(barrier.new, target);
        assert_eq!(img.state(), target);
        assert!(barrier.changes_layout());
    }

    #[test]
    fn test_chained_transitions_never_skip_a_writer() {
        let mut img = image(7);
        let sequence = [
            ImageAccess::ColorAttachmentWrite,
            ImageAccess::FragmentShaderRead,
            ImageAccess::ColorAttachmentReadWrite,
            ImageAccess::FragmentShaderRead,
            ImageAccess::TransferWrite,
            ImageAccess::FragmentShaderRead,
        ];

        let barriers: Vec<_> = sequence.iter().map(|a| img.transition_to(*a)).collect();

        for pair in barriers.windows(2) {
            assert_eq!(pair[1].old, pair[0].new);
        }
        assert_eq!(img.state(), ImageAccess::FragmentShaderRead.state());
    }

    #[test]
    fn test_repeated_request_is_a_no_op_barrier() {
        let mut img = image(2);
        img.transition_to(ImageAccess::FragmentShaderRead);

        let again = img.transition_to(ImageAccess::FragmentShaderRead);

        assert_eq!(again.old, again.new);
        assert!(again.is_redundant());
    }

    #[test]
    fn test_repeated_write_is_not_redundant() {
        let mut img = image(3);
        img.transition_to(ImageAccess::ColorAttachmentWrite);

        let again = img.transition_to(ImageAccess::ColorAttachmentWrite);

        assert_eq!(again.old, again.new);
        assert!(!again.is_redundant());
    }

    #[test]
    fn test_explicit_state_request() {
        let mut img = image(4);
        let custom = ResourceState::new(
            PipelineStages::FRAGMENT_SHADER | PipelineStages::VERTEX_SHADER,
            AccessFlags::SHADER_READ,
            ImageLayout::ShaderReadOnly,
        );

        img.request_transition(custom);

        assert_eq!(img.state(), custom);
    }
}
