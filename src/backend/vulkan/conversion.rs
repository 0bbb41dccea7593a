//! Type conversions between engine types and Vulkan types.

use ash::vk;

use crate::backend::types::{
    BufferUsage, IndexFormat, LoadOp, ScissorRect, StoreOp, TextureFormat, TextureUsage, Viewport,
};
use crate::backend::BackendError;
use crate::sync::{AccessFlags, ImageLayout, PipelineStages};

pub fn convert_texture_format(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::Bgra8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
        TextureFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::Depth32Float => vk::Format::D32_SFLOAT,
        TextureFormat::Depth24PlusStencil8 => vk::Format::D24_UNORM_S8_UINT,
    }
}

/// Surface formats the presentation engine may hand back
pub fn convert_surface_format(format: vk::Format) -> Option<TextureFormat> {
    match format {
        vk::Format::R8G8B8A8_UNORM => Some(TextureFormat::Rgba8Unorm),
        vk::Format::R8G8B8A8_SRGB => Some(TextureFormat::Rgba8UnormSrgb),
        vk::Format::B8G8R8A8_UNORM => Some(TextureFormat::Bgra8Unorm),
        vk::Format::B8G8R8A8_SRGB => Some(TextureFormat::Bgra8UnormSrgb),
        _ => None,
    }
}

pub fn aspect_mask(format: TextureFormat) -> vk::ImageAspectFlags {
    if format.has_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// The format decides whether RENDER_ATTACHMENT maps to a color or a depth attachment.
pub fn convert_texture_usage(usage: TextureUsage, format: TextureFormat) -> vk::ImageUsageFlags {
    let mut result = vk::ImageUsageFlags::empty();

    if usage.contains(TextureUsage::COPY_SRC) {
        result |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        result |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.contains(TextureUsage::TEXTURE_BINDING) {
        result |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
        if format.is_depth() {
            result |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        } else {
            result |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
    }

    result
}

pub fn convert_buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut result = vk::BufferUsageFlags::empty();

    if usage.contains(BufferUsage::VERTEX) {
        result |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        result |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        result |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::COPY_SRC) {
        result |= vk::BufferUsageFlags::TRANSFER_SRC;
    }

    result
}

pub fn convert_sample_count(samples: u32) -> vk::SampleCountFlags {
    match samples {
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        16 => vk::SampleCountFlags::TYPE_16,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}

pub fn convert_stages(stages: PipelineStages) -> vk::PipelineStageFlags {
    let mut result = vk::PipelineStageFlags::empty();

    if stages.contains(PipelineStages::VERTEX_SHADER) {
        result |= vk::PipelineStageFlags::VERTEX_SHADER;
    }
    if stages.contains(PipelineStages::EARLY_FRAGMENT_TESTS) {
        result |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    }
    if stages.contains(PipelineStages::LATE_FRAGMENT_TESTS) {
        result |= vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    }
    if stages.contains(PipelineStages::FRAGMENT_SHADER) {
        result |= vk::PipelineStageFlags::FRAGMENT_SHADER;
    }
    if stages.contains(PipelineStages::COLOR_ATTACHMENT_OUTPUT) {
        result |= vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    }
    if stages.contains(PipelineStages::TRANSFER) {
        result |= vk::PipelineStageFlags::TRANSFER;
    }

    result
}

pub fn convert_access(access: AccessFlags) -> vk::AccessFlags {
    let mut result = vk::AccessFlags::empty();

    if access.contains(AccessFlags::SHADER_READ) {
        result |= vk::AccessFlags::SHADER_READ;
    }
    if access.contains(AccessFlags::COLOR_ATTACHMENT_READ) {
        result |= vk::AccessFlags::COLOR_ATTACHMENT_READ;
    }
    if access.contains(AccessFlags::COLOR_ATTACHMENT_WRITE) {
        result |= vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    }
    if access.contains(AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ) {
        result |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ;
    }
    if access.contains(AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE) {
        result |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }
    if access.contains(AccessFlags::TRANSFER_READ) {
        result |= vk::AccessFlags::TRANSFER_READ;
    }
    if access.contains(AccessFlags::TRANSFER_WRITE) {
        result |= vk::AccessFlags::TRANSFER_WRITE;
    }

    result
}

pub fn convert_layout(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

pub fn convert_load_op(op: LoadOp) -> (vk::AttachmentLoadOp, vk::ClearValue) {
    match op {
        LoadOp::Clear(color) => (
            vk::AttachmentLoadOp::CLEAR,
            vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            },
        ),
        LoadOp::Load => (vk::AttachmentLoadOp::LOAD, vk::ClearValue::default()),
    }
}

pub fn convert_store_op(op: StoreOp) -> vk::AttachmentStoreOp {
    match op {
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
        StoreOp::Discard => vk::AttachmentStoreOp::DONT_CARE,
    }
}

pub fn convert_index_format(format: IndexFormat) -> vk::IndexType {
    match format {
        IndexFormat::Uint16 => vk::IndexType::UINT16,
        IndexFormat::Uint32 => vk::IndexType::UINT32,
    }
}

pub fn convert_viewport(viewport: Viewport) -> vk::Viewport {
    vk::Viewport {
        x: viewport.x,
        y: viewport.y,
        width: viewport.width,
        height: viewport.height,
        min_depth: viewport.min_depth,
        max_depth: viewport.max_depth,
    }
}

pub fn convert_scissor(rect: ScissorRect) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: rect.x, y: rect.y },
        extent: vk::Extent2D {
            width: rect.width,
            height: rect.height,
        },
    }
}

/// Map a failed Vulkan call onto the backend error space. Results without a dedicated
/// variant are wrapped by `fallback`.
pub fn convert_result(result: vk::Result, fallback: fn(String) -> BackendError) -> BackendError {
    match result {
        vk::Result::ERROR_DEVICE_LOST => BackendError::DeviceLost,
        vk::Result::ERROR_SURFACE_LOST_KHR => BackendError::SurfaceLost,
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            BackendError::OutOfMemory
        }
        other => fallback(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_formats_get_depth_aspect() {
        assert_eq!(aspect_mask(TextureFormat::Depth32Float), vk::ImageAspectFlags::DEPTH);
        assert_eq!(aspect_mask(TextureFormat::Rgba16Float), vk::ImageAspectFlags::COLOR);
        assert!(aspect_mask(TextureFormat::Depth24PlusStencil8).contains(vk::ImageAspectFlags::STENCIL));
    }

    #[test]
    fn test_render_attachment_usage_follows_format() {
        let usage = TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING;
        let depth = convert_texture_usage(usage, TextureFormat::Depth32Float);
        assert!(depth.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
        assert!(!depth.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));

        let color = convert_texture_usage(usage, TextureFormat::Rgba16Float);
        assert!(color.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED));
    }

    #[test]
    fn test_fatal_results_keep_their_meaning() {
        assert!(matches!(
            convert_result(vk::Result::ERROR_DEVICE_LOST, BackendError::SubmitFailed),
            BackendError::DeviceLost
        ));
        assert!(matches!(
            convert_result(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY, BackendError::BufferCreationFailed),
            BackendError::OutOfMemory
        ));
        assert!(matches!(
            convert_result(vk::Result::ERROR_INITIALIZATION_FAILED, BackendError::SubmitFailed),
            BackendError::SubmitFailed(_)
        ));
    }

    #[test]
    fn test_surface_format_round_trip() {
        let vk_format = convert_texture_format(TextureFormat::Bgra8Unorm);
        assert_eq!(convert_surface_format(vk_format), Some(TextureFormat::Bgra8Unorm));
        assert_eq!(convert_surface_format(vk::Format::R16G16B16A16_SFLOAT), None);
    }
}
