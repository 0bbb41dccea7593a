//! Barrier batching.
//!
//! Barriers are collected for all images a pass touches, then recorded as a single
//! pipeline barrier command.

use crate::backend::{CommandEncoder, ImageId};
use crate::sync::tracker::ImageBarrier;

#[derive(Debug, Default)]
pub struct BarrierBatch {
    barriers: Vec<ImageBarrier>,
    elided: usize,
}

impl BarrierBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a barrier. Read-after-read barriers in an unchanged layout are dropped;
    /// a second barrier for an image already in the batch is folded into the first.
    pub fn push(&mut self, barrier: ImageBarrier) {
        if barrier.is_redundant() {
            self.elided += 1;
            return;
        }

        if let Some(existing) = self.find_mut(barrier.image) {
            debug_assert_eq!(existing.new, barrier.old);
            existing.new = barrier.new;
            return;
        }

        self.barriers.push(barrier);
    }

    fn find_mut(&mut self, image: ImageId) -> Option<&mut ImageBarrier> {
        self.barriers.iter_mut().find(|b| b.image == image)
    }

    pub fn is_empty(&self) -> bool {
        self.barriers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.barriers.len()
    }

    pub fn elided(&self) -> usize {
        self.elided
    }

    pub fn barriers(&self) -> &[ImageBarrier] {
        &self.barriers
    }

    /// Record the batch and empty it. Returns the number of barriers recorded.
    pub fn flush(&mut self, encoder: &mut dyn CommandEncoder) -> usize {
        if self.barriers.is_empty() {
            return 0;
        }
        encoder.pipeline_barrier(&self.barriers);
        let count = self.barriers.len();
        self.barriers.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Extent2d, ImageDescriptor, TextureFormat, TextureUsage};
    use crate::sync::{GpuImage, ImageAccess};

    fn image(id: u64) -> GpuImage {
        GpuImage::wrap(
            ImageId(id),
            ImageDescriptor::new_2d(
                "batch",
                TextureFormat::Rgba8Unorm,
                Extent2d::new(8, 8),
                TextureUsage::RENDER_ATTACHMENT,
            ),
        )
    }

    #[test]
    fn test_redundant_read_is_elided() {
        let mut img = image(1);
        let mut batch = BarrierBatch::new();
        batch.push(img.transition_to(ImageAccess::FragmentShaderRead));
        batch.push(img.transition_to(ImageAccess::FragmentShaderRead));

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.elided(), 1);
    }

    #[test]
    fn test_same_image_is_folded() {
        let mut img = image(1);
        let mut batch = BarrierBatch::new();
        batch.push(img.transition_to(ImageAccess::ColorAttachmentWrite));
        batch.push(img.transition_to(ImageAccess::FragmentShaderRead));

        assert_eq!(batch.len(), 1);
        let folded = batch.barriers()[0];
        assert_eq!(folded.new, ImageAccess::FragmentShaderRead.state());
        assert_eq!(folded.new, img.state());
    }

    #[test]
    fn test_distinct_images_are_kept() {
        let mut a = image(1);
        let mut b = image(2);
        let mut batch = BarrierBatch::new();
        batch.push(a.transition_to(ImageAccess::ColorAttachmentWrite));
        batch.push(b.transition_to(ImageAccess::DepthAttachmentWrite));

        assert_eq!(batch.len(), 2);
    }
}
