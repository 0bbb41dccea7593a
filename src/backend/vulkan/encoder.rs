//! [`CommandEncoder`] over a Vulkan command buffer.
//!
//! Handles are resolved against the backend registry at record time. A handle that no
//! longer resolves is logged and the command is skipped.

use std::ffi::CString;
use std::ops::Range;

use ash::vk;

use super::conversion::*;
use super::pipeline::PipelineSet;
use super::Registry;
use crate::backend::types::*;
use crate::backend::{BindGroupHandle, BufferHandle, CommandEncoder, ImageId};
use crate::sync::{ImageBarrier, ImageLayout};

pub struct VulkanEncoder<'a> {
    pub(super) device: &'a ash::Device,
    pub(super) debug_utils: Option<&'a ash::ext::debug_utils::Device>,
    pub(super) registry: &'a Registry,
    pub(super) pipelines: &'a PipelineSet,
    pub(super) cmd: vk::CommandBuffer,
    pub(super) bound: Option<PipelineKind>,
    pub(super) rendering: bool,
}

impl VulkanEncoder<'_> {
    fn buffer(&self, buffer: BufferHandle) -> Option<vk::Buffer> {
        let handle = self.registry.buffers.get(&buffer).map(|buffer| buffer.buffer);
        if handle.is_none() {
            log::error!("{buffer:?} is not a live buffer");
        }
        handle
    }

    fn bound_layout(&self) -> Option<(PipelineKind, vk::PipelineLayout)> {
        let kind = self.bound?;
        self.pipelines.layout(kind).map(|layout| (kind, layout))
    }
}

/// Image views behind a render pass's attachments
#[derive(Debug, Default, PartialEq, Eq)]
struct AttachmentViews {
    color: Option<vk::ImageView>,
    resolve: Option<vk::ImageView>,
    depth: Option<vk::ImageView>,
}

fn view(registry: &Registry, image: ImageId) -> Option<vk::ImageView> {
    let view = registry.images.get(&image).map(|image| image.view);
    if view.is_none() {
        log::error!("Attachment {image:?} is not a live image");
    }
    view
}

/// `None` if any attachment no longer resolves
fn attachment_views(registry: &Registry, desc: &RenderPassDescriptor<'_>) -> Option<AttachmentViews> {
    let mut views = AttachmentViews::default();
    if let Some(color) = &desc.color {
        views.color = Some(view(registry, color.image)?);
        if let Some(resolve) = color.resolve_target {
            views.resolve = Some(view(registry, resolve)?);
        }
    }
    if let Some(depth) = &desc.depth {
        views.depth = Some(view(registry, depth.image)?);
    }
    Some(views)
}

impl CommandEncoder for VulkanEncoder<'_> {
    fn begin_debug_group(&mut self, label: &str) {
        let Some(debug_utils) = self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(label) else {
            return;
        };
        let label = vk::DebugUtilsLabelEXT::default().label_name(&name);
        unsafe { debug_utils.cmd_begin_debug_utils_label(self.cmd, &label) };
    }

    fn end_debug_group(&mut self) {
        if let Some(debug_utils) = self.debug_utils {
            unsafe { debug_utils.cmd_end_debug_utils_label(self.cmd) };
        }
    }

    fn pipeline_barrier(&mut self, barriers: &[ImageBarrier]) {
        let mut src_stage = vk::PipelineStageFlags::empty();
        let mut dst_stage = vk::PipelineStageFlags::empty();
        let mut image_barriers = Vec::with_capacity(barriers.len());

        for barrier in barriers {
            let Some(image) = self.registry.images.get(&barrier.image) else {
                log::error!("Barrier on {:?}, which is not a live image", barrier.image);
                continue;
            };

            src_stage |= convert_stages(barrier.old.stage);
            // The first transition of a swapchain image must wait on the acquire semaphore,
            // which signals at color-attachment output.
            if image.swapchain && barrier.old.layout == ImageLayout::Undefined {
                src_stage |= vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
            }
            dst_stage |= convert_stages(barrier.new.stage);

            image_barriers.push(
                vk::ImageMemoryBarrier::default()
                    .old_layout(convert_layout(barrier.old.layout))
                    .new_layout(convert_layout(barrier.new.layout))
                    .src_access_mask(convert_access(barrier.old.access))
                    .dst_access_mask(convert_access(barrier.new.access))
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(image.image)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: aspect_mask(barrier.format),
                        base_mip_level: 0,
                        level_count: barrier.mip_levels,
                        base_array_layer: 0,
                        layer_count: barrier.array_layers,
                    }),
            );
        }

        if image_barriers.is_empty() {
            return;
        }
        if src_stage.is_empty() {
            src_stage = vk::PipelineStageFlags::TOP_OF_PIPE;
        }
        if dst_stage.is_empty() {
            dst_stage = vk::PipelineStageFlags::BOTTOM_OF_PIPE;
        }

        unsafe {
            self.device.cmd_pipeline_barrier(
                self.cmd,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &image_barriers,
            );
        }
    }

    fn copy_buffer_to_image(&mut self, buffer: BufferHandle, image: ImageId, region: ImageCopyRegion) {
        let Some(buffer) = self.buffer(buffer) else {
            return;
        };
        let Some(target) = self.registry.images.get(&image) else {
            log::error!("Copy into {image:?}, which is not a live image");
            return;
        };

        let copy = vk::BufferImageCopy {
            buffer_offset: region.buffer_offset,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D {
                x: region.x as i32,
                y: region.y as i32,
                z: 0,
            },
            image_extent: vk::Extent3D {
                width: region.width,
                height: region.height,
                depth: 1,
            },
        };

        unsafe {
            self.device.cmd_copy_buffer_to_image(
                self.cmd,
                buffer,
                target.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[copy],
            );
        }
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor<'_>) {
        // Resolve every view first so a failed lookup records nothing, not even the label
        let Some(views) = attachment_views(self.registry, desc) else {
            return;
        };

        let mut color_attachments = Vec::with_capacity(1);
        if let (Some(color), Some(view)) = (&desc.color, views.color) {
            let (load_op, clear_value) = convert_load_op(color.load_op);
            let mut attachment = vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(load_op)
                .store_op(convert_store_op(color.store_op))
                .clear_value(clear_value);
            if let Some(resolve_view) = views.resolve {
                attachment = attachment
                    .resolve_mode(vk::ResolveModeFlags::AVERAGE)
                    .resolve_image_view(resolve_view)
                    .resolve_image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
            }
            color_attachments.push(attachment);
        }

        let depth_attachment = match (&desc.depth, views.depth) {
            (Some(depth), Some(view)) => {
                let (load_op, clear_value) = match depth.clear_depth {
                    Some(value) => (
                        vk::AttachmentLoadOp::CLEAR,
                        vk::ClearValue {
                            depth_stencil: vk::ClearDepthStencilValue {
                                depth: value,
                                stencil: 0,
                            },
                        },
                    ),
                    None => (vk::AttachmentLoadOp::LOAD, vk::ClearValue::default()),
                };
                Some(
                    vk::RenderingAttachmentInfo::default()
                        .image_view(view)
                        .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                        .load_op(load_op)
                        .store_op(convert_store_op(depth.store_op))
                        .clear_value(clear_value),
                )
            }
            _ => None,
        };

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: desc.extent.width,
                    height: desc.extent.height,
                },
            })
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth) = depth_attachment.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth);
        }

        self.begin_debug_group(desc.label);
        unsafe { self.device.cmd_begin_rendering(self.cmd, &rendering_info) };
        self.rendering = true;
    }

    /// Closes the label only when the matching begin got far enough to open it
    fn end_render_pass(&mut self) {
        if std::mem::take(&mut self.rendering) {
            unsafe { self.device.cmd_end_rendering(self.cmd) };
            self.end_debug_group();
        }
    }

    fn bind_pipeline(&mut self, pipeline: PipelineKind) {
        let Some(handle) = self.pipelines.pipeline(pipeline) else {
            log::error!("{pipeline:?} pipeline has not been built");
            return;
        };
        unsafe {
            self.device
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, handle)
        };
        self.bound = Some(pipeline);
    }

    fn bind_group(&mut self, index: u32, group: BindGroupHandle) {
        let Some((kind, layout)) = self.bound_layout() else {
            log::error!("Bind group {index} bound before any pipeline");
            return;
        };
        let Some(bind_group) = self.registry.bind_groups.get(&group) else {
            log::error!("{group:?} is not a live bind group");
            return;
        };
        if kind.bind_group_layouts().get(index as usize) != Some(&bind_group.layout) {
            log::error!("{kind:?} set {index} bound with a {:?} group", bind_group.layout);
            return;
        }

        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                index,
                &[bind_group.set],
                &[],
            );
        }
    }

    fn push_constants(&mut self, data: &[u8]) {
        let Some((kind, layout)) = self.bound_layout() else {
            log::error!("Push constants recorded before any pipeline");
            return;
        };
        if data.len() > kind.push_constant_size() as usize {
            log::error!(
                "{} bytes of push constants exceed the {} reserved by {kind:?}",
                data.len(),
                kind.push_constant_size()
            );
            return;
        }

        unsafe {
            self.device
                .cmd_push_constants(self.cmd, layout, vk::ShaderStageFlags::VERTEX, 0, data)
        };
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        unsafe {
            self.device
                .cmd_set_viewport(self.cmd, 0, &[convert_viewport(viewport)])
        };
    }

    fn set_scissor(&mut self, rect: ScissorRect) {
        unsafe { self.device.cmd_set_scissor(self.cmd, 0, &[convert_scissor(rect)]) };
    }

    fn bind_vertex_buffer(&mut self, buffer: BufferHandle, offset: u64) {
        if let Some(buffer) = self.buffer(buffer) {
            unsafe {
                self.device
                    .cmd_bind_vertex_buffers(self.cmd, 0, &[buffer], &[offset])
            };
        }
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat) {
        if let Some(buffer) = self.buffer(buffer) {
            unsafe {
                self.device.cmd_bind_index_buffer(
                    self.cmd,
                    buffer,
                    offset,
                    convert_index_format(format),
                )
            };
        }
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        unsafe {
            self.device.cmd_draw(
                self.cmd,
                vertices.len() as u32,
                instances.len() as u32,
                vertices.start,
                instances.start,
            );
        }
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        unsafe {
            self.device.cmd_draw_indexed(
                self.cmd,
                indices.len() as u32,
                instances.len() as u32,
                indices.start,
                base_vertex,
                instances.start,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::VkImage;
    use super::*;
    use ash::vk::Handle;

    fn registry_with(ids: &[u64]) -> Registry {
        let mut registry = Registry::default();
        for &id in ids {
            registry.images.insert(
                ImageId(id),
                VkImage {
                    image: vk::Image::null(),
                    view: vk::ImageView::from_raw(id),
                    allocation: None,
                    swapchain: true,
                },
            );
        }
        registry
    }

    fn main_pass(extent: Extent2d) -> RenderPassDescriptor<'static> {
        RenderPassDescriptor {
            label: "main",
            extent,
            color: Some(ColorAttachment {
                image: ImageId(1),
                resolve_target: Some(ImageId(2)),
                load_op: LoadOp::Clear([0.0; 4]),
                store_op: StoreOp::Discard,
            }),
            depth: Some(DepthAttachment {
                image: ImageId(3),
                clear_depth: Some(1.0),
                store_op: StoreOp::Discard,
            }),
        }
    }

    #[test]
    fn test_views_resolve_for_live_attachments() {
        let views = attachment_views(&registry_with(&[1, 2, 3]), &main_pass(Extent2d::new(8, 8)));
        assert_eq!(
            views,
            Some(AttachmentViews {
                color: Some(vk::ImageView::from_raw(1)),
                resolve: Some(vk::ImageView::from_raw(2)),
                depth: Some(vk::ImageView::from_raw(3)),
            })
        );
    }

    #[test]
    fn test_any_missing_attachment_fails_the_whole_pass() {
        let desc = main_pass(Extent2d::new(8, 8));
        assert!(attachment_views(&registry_with(&[2, 3]), &desc).is_none());
        assert!(attachment_views(&registry_with(&[1, 3]), &desc).is_none());
        assert!(attachment_views(&registry_with(&[1, 2]), &desc).is_none());
    }

    #[test]
    fn test_pass_without_attachments_needs_no_views() {
        let desc = RenderPassDescriptor {
            label: "empty",
            extent: Extent2d::new(8, 8),
            color: None,
            depth: None,
        };
        assert_eq!(
            attachment_views(&Registry::default(), &desc),
            Some(AttachmentViews::default())
        );
    }
}
