//! Core backend abstraction traits
//!
//! `GraphicsBackend` is everything the frame ring and the scheduler need from the GPU:
//! synchronization primitives, command buffers, the swapchain, and a handful of resource
//! constructors. `CommandEncoder` is the recording side, handed out by
//! [`GraphicsBackend::encode`] for the duration of one command buffer.

use crate::backend::types::*;
use crate::sync::ImageBarrier;
use std::fmt;
use std::ops::Range;
use std::time::Duration;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to create swapchain: {0}")]
    SwapchainCreationFailed(String),
    #[error("Failed to acquire next image: {0}")]
    AcquireImageFailed(String),
    #[error("Failed to present: {0}")]
    PresentFailed(String),
    #[error("Failed to submit commands: {0}")]
    SubmitFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create synchronization object: {0}")]
    SyncObjectCreationFailed(String),
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Failed to create shader: {0}")]
    ShaderCreationFailed(String),
    #[error("Command recording failed: {0}")]
    RecordingFailed(String),
    #[error("Surface lost")]
    SurfaceLost,
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU image (render target, texture, or swapchain image)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(pub(crate) u64);

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a bind group (descriptor set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupHandle(pub(crate) u64);

/// Result of waiting on a fence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    Signaled,
    TimedOut,
}

/// Recording interface for one command buffer.
///
/// Object safe, so passes can be written once against `&mut dyn CommandEncoder`.
pub trait CommandEncoder {
    fn begin_debug_group(&mut self, label: &str);
    fn end_debug_group(&mut self);

    /// Record a single pipeline barrier covering every image barrier in the slice
    fn pipeline_barrier(&mut self, barriers: &[ImageBarrier]);

    fn copy_buffer_to_image(&mut self, buffer: BufferHandle, image: ImageId, region: ImageCopyRegion);

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor<'_>);
    fn end_render_pass(&mut self);

    fn bind_pipeline(&mut self, pipeline: PipelineKind);
    fn bind_group(&mut self, index: u32, group: BindGroupHandle);
    /// Push constants for the bound pipeline, starting at offset 0
    fn push_constants(&mut self, data: &[u8]);

    fn set_viewport(&mut self, viewport: Viewport);
    fn set_scissor(&mut self, rect: ScissorRect);

    fn bind_vertex_buffer(&mut self, buffer: BufferHandle, offset: u64);
    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat);

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);
}

/// Main backend trait
///
/// One queue, one swapchain. All methods are called from the render thread.
pub trait GraphicsBackend {
    type Fence: fmt::Debug;
    type Semaphore: Copy + fmt::Debug;
    type CommandBuffer: fmt::Debug;

    // === Synchronization ===

    fn create_fence(&mut self, signaled: bool) -> BackendResult<Self::Fence>;
    fn destroy_fence(&mut self, fence: Self::Fence);
    /// Block until the fence is signaled or `timeout` elapses
    fn wait_for_fence(&self, fence: &Self::Fence, timeout: Duration) -> BackendResult<FenceStatus>;
    fn reset_fence(&self, fence: &Self::Fence) -> BackendResult<()>;

    fn create_semaphore(&mut self) -> BackendResult<Self::Semaphore>;
    fn destroy_semaphore(&mut self, semaphore: Self::Semaphore);

    // === Commands ===

    fn allocate_command_buffer(&mut self) -> BackendResult<Self::CommandBuffer>;
    fn free_command_buffer(&mut self, command_buffer: Self::CommandBuffer);
    fn reset_command_buffer(&self, command_buffer: &Self::CommandBuffer) -> BackendResult<()>;

    /// Begin `command_buffer`, hand an encoder to `record`, then end it
    fn encode(
        &self,
        command_buffer: &Self::CommandBuffer,
        record: &mut dyn FnMut(&mut dyn CommandEncoder),
    ) -> BackendResult<()>;

    /// Submit one command buffer. The wait semaphore gates the color-attachment-output stage.
    fn submit(
        &self,
        command_buffer: &Self::CommandBuffer,
        wait: Self::Semaphore,
        signal: Self::Semaphore,
        fence: &Self::Fence,
    ) -> BackendResult<()>;

    fn wait_idle(&self) -> BackendResult<()>;

    // === Swapchain ===

    fn swapchain_info(&self) -> SwapchainInfo;
    fn acquire_next_image(
        &mut self,
        signal: Self::Semaphore,
        timeout: Duration,
    ) -> BackendResult<AcquireOutcome>;
    fn present(&mut self, image_index: u32, wait: Self::Semaphore) -> BackendResult<PresentOutcome>;
    /// Rebuild the swapchain for `extent`. Previously returned swapchain image ids become invalid.
    fn recreate_swapchain(&mut self, extent: Extent2d) -> BackendResult<()>;

    // === Resources ===

    fn create_image(&mut self, desc: &ImageDescriptor) -> BackendResult<ImageId>;
    fn destroy_image(&mut self, image: ImageId);

    /// Buffers are host visible; `write_buffer` copies straight into mapped memory
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> BackendResult<()>;
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutKind,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle>;
    fn destroy_bind_group(&mut self, group: BindGroupHandle);

    /// (Re)build every `PipelineKind` against the given attachment formats
    fn prepare_pipelines(&mut self, config: &PipelineConfig) -> BackendResult<()>;
}
