//! Dummy GPU backend for testing and development.
//!
//! No GPU work happens. Every call is recorded as a [`DummyEvent`] so tests can assert
//! on ordering, and Vulkan's usage rules that matter for frame pacing are checked:
//!
//! - a fence must be unsignaled when submitted
//! - a binary semaphore is signaled at most once before it is waited on
//! - draws happen inside a render pass, render passes do not nest
//!
//! By default the simulated GPU finishes a submission instantly. With
//! [`DummyBackend::set_auto_complete(false)`](DummyBackend::set_auto_complete) fences stay
//! unsignaled until a [`DummyGpu`] handle completes them, possibly from another thread.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::sync::ImageBarrier;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fence whose signaled flag can be flipped by the simulated GPU
#[derive(Debug)]
pub struct DummyFence {
    id: u64,
    signaled: Arc<AtomicBool>,
}

impl DummyFence {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DummySemaphore(u64);

#[derive(Debug, PartialEq, Eq)]
pub struct DummyCommandBuffer(u64);

impl DummyCommandBuffer {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// One command recorded through [`CommandEncoder`]
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    BeginDebugGroup(String),
    EndDebugGroup,
    Barrier(Vec<ImageBarrier>),
    CopyBufferToImage {
        buffer: BufferHandle,
        image: ImageId,
        region: ImageCopyRegion,
    },
    BeginRenderPass {
        label: String,
        extent: Extent2d,
        color: Option<ColorAttachment>,
        depth: Option<DepthAttachment>,
    },
    EndRenderPass,
    BindPipeline(PipelineKind),
    BindGroup {
        index: u32,
        group: BindGroupHandle,
    },
    PushConstants(Vec<u8>),
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    BindVertexBuffer(BufferHandle),
    BindIndexBuffer(BufferHandle, IndexFormat),
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
}

/// Backend-level call log
#[derive(Debug, Clone, PartialEq)]
pub enum DummyEvent {
    WriteBuffer {
        buffer: BufferHandle,
        offset: u64,
        len: usize,
    },
    ResetCommandBuffer(u64),
    Record {
        command_buffer: u64,
        commands: Vec<RecordedCommand>,
    },
    FenceWait {
        fence: u64,
    },
    Submit {
        command_buffer: u64,
        wait: DummySemaphore,
        signal: DummySemaphore,
        fence: u64,
    },
    Acquire {
        outcome: AcquireOutcome,
        semaphore: DummySemaphore,
    },
    Present {
        image_index: u32,
        wait: DummySemaphore,
        outcome: PresentOutcome,
    },
    WaitIdle,
    RecreateSwapchain(Extent2d),
}

/// Handle to the simulated GPU queue, cloneable across threads
#[derive(Debug, Clone, Default)]
pub struct DummyGpu {
    pending: Arc<Mutex<VecDeque<Arc<AtomicBool>>>>,
}

impl DummyGpu {
    /// Finish the oldest outstanding submission. Returns false if nothing was pending.
    pub fn complete_next(&self) -> bool {
        match self.pending.lock().pop_front() {
            Some(fence) => {
                fence.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn complete_all(&self) {
        while self.complete_next() {}
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[derive(Debug)]
struct DummySwapchain {
    format: TextureFormat,
    extent: Extent2d,
    images: Vec<ImageId>,
    next_image: u32,
}

/// Recording backend without a GPU
#[derive(Debug)]
pub struct DummyBackend {
    next_id: u64,
    auto_complete: bool,
    gpu: DummyGpu,
    events: Mutex<Vec<DummyEvent>>,
    signaled_semaphores: Mutex<HashSet<DummySemaphore>>,
    swapchain: DummySwapchain,
    image_count: u32,
    scripted_acquires: VecDeque<AcquireOutcome>,
    scripted_presents: VecDeque<PresentOutcome>,
    images: HashMap<ImageId, ImageDescriptor>,
    buffers: HashMap<BufferHandle, Vec<u8>>,
    bind_groups: HashMap<BindGroupHandle, BindGroupLayoutKind>,
    live_fences: usize,
    live_semaphores: usize,
    live_command_buffers: usize,
    pipeline_config: Option<PipelineConfig>,
}

impl DummyBackend {
    /// Backend with a three-image swapchain of the given size
    pub fn new(extent: Extent2d) -> Self {
        Self::with_image_count(extent, 3)
    }

    pub fn with_image_count(extent: Extent2d, image_count: u32) -> Self {
        assert!(image_count > 0, "swapchain needs at least one image");
        let mut backend = Self {
            next_id: 1,
            auto_complete: true,
            gpu: DummyGpu::default(),
            events: Mutex::new(Vec::new()),
            signaled_semaphores: Mutex::new(HashSet::new()),
            swapchain: DummySwapchain {
                format: TextureFormat::Bgra8Unorm,
                extent,
                images: Vec::new(),
                next_image: 0,
            },
            image_count,
            scripted_acquires: VecDeque::new(),
            scripted_presents: VecDeque::new(),
            images: HashMap::new(),
            buffers: HashMap::new(),
            bind_groups: HashMap::new(),
            live_fences: 0,
            live_semaphores: 0,
            live_command_buffers: 0,
            pipeline_config: None,
        };
        backend.build_swapchain(extent);
        backend
    }

    pub fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn build_swapchain(&mut self, extent: Extent2d) {
        for image in std::mem::take(&mut self.swapchain.images) {
            self.images.remove(&image);
        }
        let format = self.swapchain.format;
        for index in 0..self.image_count {
            let id = ImageId(self.allocate_id());
            self.images.insert(
                id,
                ImageDescriptor::new_2d(
                    &format!("swapchain image {index}"),
                    format,
                    extent,
                    TextureUsage::RENDER_ATTACHMENT,
                ),
            );
            self.swapchain.images.push(id);
        }
        self.swapchain.extent = extent;
        self.swapchain.next_image = 0;
    }

    fn push_event(&self, event: DummyEvent) {
        self.events.lock().push(event);
    }

    /// When false, submissions stay in flight until [`DummyGpu`] completes them
    pub fn set_auto_complete(&mut self, auto_complete: bool) {
        self.auto_complete = auto_complete;
    }

    pub fn gpu(&self) -> DummyGpu {
        self.gpu.clone()
    }

    /// Number of swapchain images created by the next `recreate_swapchain`
    pub fn set_image_count(&mut self, image_count: u32) {
        assert!(image_count > 0, "swapchain needs at least one image");
        self.image_count = image_count;
    }

    /// Queue an outcome for an upcoming `acquire_next_image`
    pub fn script_acquire(&mut self, outcome: AcquireOutcome) {
        self.scripted_acquires.push_back(outcome);
    }

    /// Queue an outcome for an upcoming `present`
    pub fn script_present(&mut self, outcome: PresentOutcome) {
        self.scripted_presents.push_back(outcome);
    }

    pub fn events(&self) -> Vec<DummyEvent> {
        self.events.lock().clone()
    }

    pub fn take_events(&self) -> Vec<DummyEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Every command recorded so far, across all command buffers, in order
    pub fn recorded_commands(&self) -> Vec<RecordedCommand> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                DummyEvent::Record { commands, .. } => Some(commands.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    pub fn image_descriptor(&self, image: ImageId) -> Option<&ImageDescriptor> {
        self.images.get(&image)
    }

    pub fn bind_group_layout(&self, group: BindGroupHandle) -> Option<BindGroupLayoutKind> {
        self.bind_groups.get(&group).copied()
    }

    pub fn pipeline_config(&self) -> Option<PipelineConfig> {
        self.pipeline_config
    }

    /// Images owned by the application (swapchain images excluded)
    pub fn live_image_count(&self) -> usize {
        self.images.len() - self.swapchain.images.len()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_bind_group_count(&self) -> usize {
        self.bind_groups.len()
    }

    pub fn live_sync_object_count(&self) -> usize {
        self.live_fences + self.live_semaphores
    }

    pub fn live_command_buffer_count(&self) -> usize {
        self.live_command_buffers
    }

    fn signal_semaphore(&self, semaphore: DummySemaphore) {
        let fresh = self.signaled_semaphores.lock().insert(semaphore);
        assert!(fresh, "{semaphore:?} signaled twice without a wait");
    }

    fn consume_semaphore(&self, semaphore: DummySemaphore) {
        let was_signaled = self.signaled_semaphores.lock().remove(&semaphore);
        assert!(was_signaled, "waiting on {semaphore:?} which has no pending signal");
    }
}

impl GraphicsBackend for DummyBackend {
    type Fence = DummyFence;
    type Semaphore = DummySemaphore;
    type CommandBuffer = DummyCommandBuffer;

    fn create_fence(&mut self, signaled: bool) -> BackendResult<DummyFence> {
        self.live_fences += 1;
        Ok(DummyFence {
            id: self.allocate_id(),
            signaled: Arc::new(AtomicBool::new(signaled)),
        })
    }

    fn destroy_fence(&mut self, _fence: DummyFence) {
        self.live_fences -= 1;
    }

    fn wait_for_fence(&self, fence: &DummyFence, timeout: Duration) -> BackendResult<FenceStatus> {
        self.push_event(DummyEvent::FenceWait { fence: fence.id });
        let start = Instant::now();
        while !fence.is_signaled() {
            if start.elapsed() >= timeout {
                return Ok(FenceStatus::TimedOut);
            }
            std::thread::yield_now();
        }
        Ok(FenceStatus::Signaled)
    }

    fn reset_fence(&self, fence: &DummyFence) -> BackendResult<()> {
        fence.signaled.store(false, Ordering::Release);
        Ok(())
    }

    fn create_semaphore(&mut self) -> BackendResult<DummySemaphore> {
        self.live_semaphores += 1;
        Ok(DummySemaphore(self.allocate_id()))
    }

    fn destroy_semaphore(&mut self, semaphore: DummySemaphore) {
        self.signaled_semaphores.lock().remove(&semaphore);
        self.live_semaphores -= 1;
    }

    fn allocate_command_buffer(&mut self) -> BackendResult<DummyCommandBuffer> {
        self.live_command_buffers += 1;
        Ok(DummyCommandBuffer(self.allocate_id()))
    }

    fn free_command_buffer(&mut self, _command_buffer: DummyCommandBuffer) {
        self.live_command_buffers -= 1;
    }

    fn reset_command_buffer(&self, command_buffer: &DummyCommandBuffer) -> BackendResult<()> {
        self.push_event(DummyEvent::ResetCommandBuffer(command_buffer.0));
        Ok(())
    }

    fn encode(
        &self,
        command_buffer: &DummyCommandBuffer,
        record: &mut dyn FnMut(&mut dyn CommandEncoder),
    ) -> BackendResult<()> {
        let mut encoder = DummyEncoder {
            layouts: &self.bind_groups,
            commands: Vec::new(),
            in_render_pass: false,
            pipeline: None,
            debug_depth: 0,
        };
        record(&mut encoder);
        assert!(
            !encoder.in_render_pass,
            "command buffer ended inside a render pass"
        );
        assert_eq!(encoder.debug_depth, 0, "unbalanced debug groups");
        self.push_event(DummyEvent::Record {
            command_buffer: command_buffer.0,
            commands: encoder.commands,
        });
        Ok(())
    }

    fn submit(
        &self,
        command_buffer: &DummyCommandBuffer,
        wait: DummySemaphore,
        signal: DummySemaphore,
        fence: &DummyFence,
    ) -> BackendResult<()> {
        assert!(!fence.is_signaled(), "submitted with a signaled fence");
        self.consume_semaphore(wait);
        self.signal_semaphore(signal);
        self.push_event(DummyEvent::Submit {
            command_buffer: command_buffer.0,
            wait,
            signal,
            fence: fence.id,
        });

        if self.auto_complete {
            fence.signaled.store(true, Ordering::Release);
        } else {
            self.gpu.pending.lock().push_back(fence.signaled.clone());
        }
        Ok(())
    }

    fn wait_idle(&self) -> BackendResult<()> {
        self.push_event(DummyEvent::WaitIdle);
        self.gpu.complete_all();
        Ok(())
    }

    fn swapchain_info(&self) -> SwapchainInfo {
        SwapchainInfo {
            format: self.swapchain.format,
            extent: self.swapchain.extent,
            images: self.swapchain.images.clone(),
        }
    }

    fn acquire_next_image(
        &mut self,
        signal: DummySemaphore,
        _timeout: Duration,
    ) -> BackendResult<AcquireOutcome> {
        let outcome = self.scripted_acquires.pop_front().unwrap_or_else(|| {
            let image_index = self.swapchain.next_image;
            self.swapchain.next_image = (image_index + 1) % self.swapchain.images.len() as u32;
            AcquireOutcome::Acquired {
                image_index,
                suboptimal: false,
            }
        });
        if matches!(outcome, AcquireOutcome::Acquired { .. }) {
            self.signal_semaphore(signal);
        }
        self.push_event(DummyEvent::Acquire {
            outcome,
            semaphore: signal,
        });
        Ok(outcome)
    }

    fn present(&mut self, image_index: u32, wait: DummySemaphore) -> BackendResult<PresentOutcome> {
        assert!(
            (image_index as usize) < self.swapchain.images.len(),
            "presenting image {image_index} of {}",
            self.swapchain.images.len()
        );
        self.consume_semaphore(wait);
        let outcome = self
            .scripted_presents
            .pop_front()
            .unwrap_or(PresentOutcome::Presented);
        self.push_event(DummyEvent::Present {
            image_index,
            wait,
            outcome,
        });
        Ok(outcome)
    }

    fn recreate_swapchain(&mut self, extent: Extent2d) -> BackendResult<()> {
        self.push_event(DummyEvent::RecreateSwapchain(extent));
        self.build_swapchain(extent);
        Ok(())
    }

    fn create_image(&mut self, desc: &ImageDescriptor) -> BackendResult<ImageId> {
        if desc.extent.is_empty() {
            return Err(BackendError::TextureCreationFailed(format!(
                "'{}' has zero extent",
                desc.label
            )));
        }
        let id = ImageId(self.allocate_id());
        log::trace!("DummyBackend: creating image {:?} as {:?}", desc.label, id);
        self.images.insert(id, desc.clone());
        Ok(id)
    }

    fn destroy_image(&mut self, image: ImageId) {
        assert!(
            !self.swapchain.images.contains(&image),
            "{image:?} belongs to the swapchain"
        );
        assert!(self.images.remove(&image).is_some(), "{image:?} destroyed twice");
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let handle = BufferHandle(self.allocate_id());
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        self.buffers.insert(handle, vec![0; desc.size as usize]);
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> BackendResult<()> {
        let storage = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| BackendError::BufferCreationFailed(format!("{buffer:?} not found")))?;
        let start = offset as usize;
        let end = start + data.len();
        if end > storage.len() {
            return Err(BackendError::BufferCreationFailed(format!(
                "write of {} bytes at {offset} overflows {buffer:?} ({} bytes)",
                data.len(),
                storage.len()
            )));
        }
        storage[start..end].copy_from_slice(data);
        self.push_event(DummyEvent::WriteBuffer {
            buffer,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        assert!(self.buffers.remove(&buffer).is_some(), "{buffer:?} destroyed twice");
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutKind,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        for (binding, entry) in entries {
            let known = match entry {
                BindGroupEntry::Buffer { buffer, .. } => self.buffers.contains_key(buffer),
                BindGroupEntry::Texture(image) => self.images.contains_key(image),
                BindGroupEntry::Sampler(_) => true,
            };
            assert!(known, "binding {binding} of {layout:?} references a dead resource");
        }
        let handle = BindGroupHandle(self.allocate_id());
        self.bind_groups.insert(handle, layout);
        Ok(handle)
    }

    fn destroy_bind_group(&mut self, group: BindGroupHandle) {
        assert!(self.bind_groups.remove(&group).is_some(), "{group:?} destroyed twice");
    }

    fn prepare_pipelines(&mut self, config: &PipelineConfig) -> BackendResult<()> {
        self.pipeline_config = Some(*config);
        Ok(())
    }
}

#[derive(Debug)]
struct DummyEncoder<'a> {
    layouts: &'a HashMap<BindGroupHandle, BindGroupLayoutKind>,
    commands: Vec<RecordedCommand>,
    in_render_pass: bool,
    pipeline: Option<PipelineKind>,
    debug_depth: u32,
}

impl DummyEncoder<'_> {
    fn assert_can_draw(&self) {
        assert!(self.in_render_pass, "draw outside a render pass");
        assert!(self.pipeline.is_some(), "draw without a bound pipeline");
    }
}

impl CommandEncoder for DummyEncoder<'_> {
    fn begin_debug_group(&mut self, label: &str) {
        self.debug_depth += 1;
        self.commands
            .push(RecordedCommand::BeginDebugGroup(label.to_string()));
    }

    fn end_debug_group(&mut self) {
        assert!(self.debug_depth > 0, "end_debug_group without a group");
        self.debug_depth -= 1;
        self.commands.push(RecordedCommand::EndDebugGroup);
    }

    fn pipeline_barrier(&mut self, barriers: &[ImageBarrier]) {
        assert!(!self.in_render_pass, "barrier inside a render pass");
        self.commands
            .push(RecordedCommand::Barrier(barriers.to_vec()));
    }

    fn copy_buffer_to_image(&mut self, buffer: BufferHandle, image: ImageId, region: ImageCopyRegion) {
        assert!(!self.in_render_pass, "copy inside a render pass");
        self.commands.push(RecordedCommand::CopyBufferToImage {
            buffer,
            image,
            region,
        });
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor<'_>) {
        assert!(!self.in_render_pass, "render passes cannot nest");
        self.in_render_pass = true;
        self.pipeline = None;
        self.commands.push(RecordedCommand::BeginRenderPass {
            label: desc.label.to_string(),
            extent: desc.extent,
            color: desc.color,
            depth: desc.depth,
        });
    }

    fn end_render_pass(&mut self) {
        assert!(self.in_render_pass, "end_render_pass without a pass");
        self.in_render_pass = false;
        self.commands.push(RecordedCommand::EndRenderPass);
    }

    fn bind_pipeline(&mut self, pipeline: PipelineKind) {
        self.pipeline = Some(pipeline);
        self.commands.push(RecordedCommand::BindPipeline(pipeline));
    }

    fn bind_group(&mut self, index: u32, group: BindGroupHandle) {
        let Some(pipeline) = self.pipeline else {
            panic!("bind_group without a bound pipeline");
        };
        let layout = self.layouts.get(&group).copied();
        assert!(layout.is_some(), "bind group {group:?} does not exist");
        assert_eq!(
            pipeline.bind_group_layouts().get(index as usize).copied(),
            layout,
            "{pipeline:?} set {index} bound with the wrong layout"
        );
        self.commands
            .push(RecordedCommand::BindGroup { index, group });
    }

    fn push_constants(&mut self, data: &[u8]) {
        let Some(pipeline) = self.pipeline else {
            panic!("push constants without a bound pipeline");
        };
        assert!(
            data.len() as u32 <= pipeline.push_constant_size(),
            "{} bytes of push constants for {pipeline:?}",
            data.len()
        );
        self.commands
            .push(RecordedCommand::PushConstants(data.to_vec()));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.commands.push(RecordedCommand::SetViewport(viewport));
    }

    fn set_scissor(&mut self, rect: ScissorRect) {
        self.commands.push(RecordedCommand::SetScissor(rect));
    }

    fn bind_vertex_buffer(&mut self, buffer: BufferHandle, _offset: u64) {
        self.commands
            .push(RecordedCommand::BindVertexBuffer(buffer));
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, _offset: u64, format: IndexFormat) {
        self.commands
            .push(RecordedCommand::BindIndexBuffer(buffer, format));
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.assert_can_draw();
        self.commands.push(RecordedCommand::Draw {
            vertices,
            instances,
        });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.assert_can_draw();
        self.commands.push(RecordedCommand::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_fence_wait_times_out() {
        let mut backend = DummyBackend::new(Extent2d::new(4, 4));
        let fence = backend.create_fence(false).unwrap();
        let status = backend
            .wait_for_fence(&fence, Duration::from_millis(5))
            .unwrap();
        assert_eq!(status, FenceStatus::TimedOut);
    }

    #[test]
    fn test_fence_signaled_from_another_thread() {
        let mut backend = DummyBackend::new(Extent2d::new(4, 4));
        backend.set_auto_complete(false);
        let fence = backend.create_fence(false).unwrap();
        let cmd = backend.allocate_command_buffer().unwrap();
        let acquire = backend.create_semaphore().unwrap();
        let done = backend.create_semaphore().unwrap();
        backend
            .acquire_next_image(acquire, Duration::from_secs(1))
            .unwrap();
        backend.submit(&cmd, acquire, done, &fence).unwrap();
        assert!(!fence.is_signaled());

        let gpu = backend.gpu();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            gpu.complete_next();
        });

        let status = backend
            .wait_for_fence(&fence, Duration::from_secs(5))
            .unwrap();
        assert_eq!(status, FenceStatus::Signaled);
        handle.join().unwrap();
    }

    #[test]
    #[should_panic(expected = "signaled twice")]
    fn test_double_signal_is_rejected() {
        let mut backend = DummyBackend::new(Extent2d::new(4, 4));
        let semaphore = backend.create_semaphore().unwrap();
        backend
            .acquire_next_image(semaphore, Duration::from_secs(1))
            .unwrap();
        backend
            .acquire_next_image(semaphore, Duration::from_secs(1))
            .unwrap();
    }

    #[test]
    fn test_recreate_swapchain_replaces_images() {
        let mut backend = DummyBackend::new(Extent2d::new(4, 4));
        let before = backend.swapchain_info();
        backend.set_image_count(2);
        backend.recreate_swapchain(Extent2d::new(8, 6)).unwrap();
        let after = backend.swapchain_info();

        assert_eq!(after.extent, Extent2d::new(8, 6));
        assert_eq!(after.images.len(), 2);
        assert!(before.images.iter().all(|i| !after.images.contains(i)));
        assert_eq!(backend.live_image_count(), 0);
    }

    #[test]
    #[should_panic(expected = "draw outside a render pass")]
    fn test_draw_outside_pass_is_rejected() {
        let mut backend = DummyBackend::new(Extent2d::new(4, 4));
        let cmd = backend.allocate_command_buffer().unwrap();
        backend
            .encode(&cmd, &mut |encoder| {
                encoder.bind_pipeline(PipelineKind::Composite);
                encoder.draw(0..3, 0..1);
            })
            .unwrap();
    }

    #[test]
    fn test_write_buffer_bounds() {
        let mut backend = DummyBackend::new(Extent2d::new(4, 4));
        let buffer = backend
            .create_buffer(&BufferDescriptor::new("b", 8, BufferUsage::UNIFORM))
            .unwrap();
        backend.write_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(backend.buffer_contents(buffer), Some(&[0, 0, 0, 0, 1, 2, 3, 4][..]));
        assert!(backend.write_buffer(buffer, 6, &[0; 4]).is_err());
    }

    #[test]
    #[should_panic(expected = "wrong layout")]
    fn test_bind_group_layout_is_checked() {
        let mut backend = DummyBackend::new(Extent2d::new(4, 4));
        let cmd = backend.allocate_command_buffer().unwrap();
        let group = backend
            .create_bind_group(BindGroupLayoutKind::Composite, &[(2, BindGroupEntry::Sampler(SamplerKind::Linear))])
            .unwrap();
        backend
            .encode(&cmd, &mut |encoder| {
                encoder.bind_pipeline(PipelineKind::Mesh);
                encoder.bind_group(0, group);
            })
            .unwrap();
    }
}
