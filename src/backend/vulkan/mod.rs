//! Vulkan backend implementation using ash
//!
//! One graphics queue that also presents, dynamic rendering instead of render pass
//! objects, host-visible buffers and device-local images through gpu-allocator.
//! Pipelines are compiled from WGSL with naga.

mod conversion;
mod debug;
mod device;
mod encoder;
mod instance;
mod pipeline;
mod swapchain;

use std::collections::HashMap;
use std::time::Duration;

use ash::khr::{surface, swapchain as khr_swapchain};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::EngineConfig;
use conversion::*;
use encoder::VulkanEncoder;
use pipeline::{layout_bindings, PipelineSet};
use swapchain::{Swapchain, SwapchainRequest};

struct VkImage {
    image: vk::Image,
    view: vk::ImageView,
    /// `None` for swapchain images, which the swapchain owns
    allocation: Option<Allocation>,
    swapchain: bool,
}

struct VkBuffer {
    buffer: vk::Buffer,
    allocation: Allocation,
    size: u64,
}

struct VkBindGroup {
    set: vk::DescriptorSet,
    layout: BindGroupLayoutKind,
}

/// Live objects behind the opaque handles handed out to the engine
#[derive(Default)]
pub(crate) struct Registry {
    images: HashMap<ImageId, VkImage>,
    buffers: HashMap<BufferHandle, VkBuffer>,
    bind_groups: HashMap<BindGroupHandle, VkBindGroup>,
    next_id: u64,
}

impl Registry {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Vulkan backend implementation
pub struct VulkanBackend {
    _entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    debug_device: Option<ash::ext::debug_utils::Device>,
    surface_fn: surface::Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue: vk::Queue,
    allocator: Option<Allocator>,

    swapchain_fn: khr_swapchain::Device,
    swapchain: Swapchain,
    swapchain_images: Vec<ImageId>,
    surface_format: TextureFormat,
    vsync: bool,

    command_pool: vk::CommandPool,
    descriptor_pool: vk::DescriptorPool,
    linear_sampler: vk::Sampler,
    shadow_sampler: vk::Sampler,
    pipelines: PipelineSet,
    registry: Registry,
}

fn duration_to_nanos(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

impl VulkanBackend {
    /// Create the device and swapchain for `window`
    pub fn new(window: &winit::window::Window, config: &EngineConfig) -> BackendResult<Self> {
        let display_handle = window
            .display_handle()
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?
            .as_raw();

        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| BackendError::InitializationFailed(format!("Vulkan loader: {e}")))?;
        let bundle =
            instance::create_instance(&entry, display_handle, &config.title, config.validation)?;
        let instance = bundle.instance;

        let surface_fn = surface::Instance::new(&entry, &instance);
        let surface = unsafe {
            ash_window::create_surface(&entry, &instance, display_handle, window_handle, None)
        }
        .map_err(|e| BackendError::SurfaceCreationFailed(format!("{e:?}")))?;

        let selection = device::select_physical_device(&instance, &surface_fn, surface)?;
        let device = device::create_logical_device(&instance, &selection)?;
        let queue = unsafe { device.get_device_queue(selection.queue_family, 0) };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device: selection.physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| {
            BackendError::InitializationFailed(format!("Failed to create memory allocator: {e}"))
        })?;

        let swapchain_fn = khr_swapchain::Device::new(&instance, &device);
        let debug_device = bundle
            .debug_utils
            .as_ref()
            .map(|_| ash::ext::debug_utils::Device::new(&instance, &device));

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(selection.queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }.map_err(|e| {
            BackendError::InitializationFailed(format!("Failed to create command pool: {e:?}"))
        })?;

        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 256,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLED_IMAGE,
                descriptor_count: 256,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLER,
                descriptor_count: 256,
            },
        ];
        let descriptor_pool_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(256)
            .pool_sizes(&pool_sizes);
        let descriptor_pool = unsafe { device.create_descriptor_pool(&descriptor_pool_info, None) }
            .map_err(|e| {
                BackendError::InitializationFailed(format!("Failed to create descriptor pool: {e:?}"))
            })?;

        let linear_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .max_lod(vk::LOD_CLAMP_NONE);
        let linear_sampler = unsafe { device.create_sampler(&linear_info, None) }
            .map_err(|e| BackendError::InitializationFailed(format!("Linear sampler: {e:?}")))?;

        let shadow_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .compare_enable(true)
            .compare_op(vk::CompareOp::LESS_OR_EQUAL);
        let shadow_sampler = unsafe { device.create_sampler(&shadow_info, None) }
            .map_err(|e| BackendError::InitializationFailed(format!("Shadow sampler: {e:?}")))?;

        let pipelines = PipelineSet::new(&device)?;

        let size = window.inner_size();
        let swapchain = Swapchain::new(
            &device,
            selection.physical_device,
            &surface_fn,
            &swapchain_fn,
            &SwapchainRequest {
                surface,
                extent: Extent2d::new(size.width, size.height),
                vsync: config.vsync,
                old: vk::SwapchainKHR::null(),
            },
        )?;

        let mut backend = Self {
            _entry: entry,
            instance,
            debug_utils: bundle.debug_utils,
            debug_messenger: bundle.debug_messenger,
            debug_device,
            surface_fn,
            surface,
            physical_device: selection.physical_device,
            device,
            queue,
            allocator: Some(allocator),
            swapchain_fn,
            swapchain,
            swapchain_images: Vec::new(),
            surface_format: TextureFormat::Bgra8Unorm,
            vsync: config.vsync,
            command_pool,
            descriptor_pool,
            linear_sampler,
            shadow_sampler,
            pipelines,
            registry: Registry::default(),
        };
        backend.register_swapchain_images()?;

        Ok(backend)
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    fn register_swapchain_images(&mut self) -> BackendResult<()> {
        self.surface_format = convert_surface_format(self.swapchain.format.format).ok_or_else(|| {
            BackendError::SwapchainCreationFailed(format!(
                "Unsupported surface format {:?}",
                self.swapchain.format.format
            ))
        })?;

        for id in self.swapchain_images.drain(..) {
            self.registry.images.remove(&id);
        }
        for (&image, &view) in self.swapchain.images.iter().zip(&self.swapchain.views) {
            let id = ImageId(self.registry.next_id());
            self.registry.images.insert(
                id,
                VkImage {
                    image,
                    view,
                    allocation: None,
                    swapchain: true,
                },
            );
            self.swapchain_images.push(id);
        }
        Ok(())
    }

    fn allocator(&mut self) -> BackendResult<&mut Allocator> {
        self.allocator
            .as_mut()
            .ok_or_else(|| BackendError::InitializationFailed("Allocator already dropped".into()))
    }

    fn sampler(&self, kind: SamplerKind) -> vk::Sampler {
        match kind {
            SamplerKind::Linear => self.linear_sampler,
            SamplerKind::ShadowCompare => self.shadow_sampler,
        }
    }

    fn create_image_inner(&mut self, desc: &ImageDescriptor) -> BackendResult<VkImage> {
        let to_error = |e: vk::Result| convert_result(e, BackendError::TextureCreationFailed);
        let format = convert_texture_format(desc.format);

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(desc.array_layers)
            .samples(convert_sample_count(desc.samples))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert_texture_usage(desc.usage, desc.format))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&image_info, None) }.map_err(to_error)?;
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = match self.allocator()?.allocate(&AllocationCreateDesc {
            name: &desc.label,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(BackendError::TextureCreationFailed(format!("{}: {e}", desc.label)));
            }
        };

        let bound = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        let view = bound.and_then(|()| {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: aspect_mask(desc.format),
                    base_mip_level: 0,
                    level_count: desc.mip_levels,
                    base_array_layer: 0,
                    layer_count: desc.array_layers,
                });
            unsafe { self.device.create_image_view(&view_info, None) }
        });

        match view {
            Ok(view) => Ok(VkImage {
                image,
                view,
                allocation: Some(allocation),
                swapchain: false,
            }),
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                if let Ok(allocator) = self.allocator() {
                    let _ = allocator.free(allocation);
                }
                Err(to_error(e))
            }
        }
    }

    fn write_descriptor(
        &self,
        set: vk::DescriptorSet,
        layout: BindGroupLayoutKind,
        binding: u32,
        entry: &BindGroupEntry,
    ) -> BackendResult<()> {
        let invalid = |what: &str| {
            BackendError::RecordingFailed(format!("{layout:?} binding {binding}: {what}"))
        };
        let expected = layout_bindings(layout)
            .get(binding as usize)
            .copied()
            .ok_or_else(|| invalid("no such binding"))?;

        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(binding)
            .descriptor_type(expected);

        match *entry {
            BindGroupEntry::Buffer {
                buffer,
                offset,
                size,
            } => {
                if expected != vk::DescriptorType::UNIFORM_BUFFER {
                    return Err(invalid("expected a buffer"));
                }
                let buffer = self
                    .registry
                    .buffers
                    .get(&buffer)
                    .ok_or_else(|| invalid("buffer is not live"))?;
                let info = [vk::DescriptorBufferInfo {
                    buffer: buffer.buffer,
                    offset,
                    range: size,
                }];
                unsafe { self.device.update_descriptor_sets(&[write.buffer_info(&info)], &[]) };
            }
            BindGroupEntry::Texture(image) => {
                if expected != vk::DescriptorType::SAMPLED_IMAGE {
                    return Err(invalid("expected a texture"));
                }
                let image = self
                    .registry
                    .images
                    .get(&image)
                    .ok_or_else(|| invalid("image is not live"))?;
                let info = [vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view: image.view,
                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                }];
                unsafe { self.device.update_descriptor_sets(&[write.image_info(&info)], &[]) };
            }
            BindGroupEntry::Sampler(kind) => {
                if expected != vk::DescriptorType::SAMPLER {
                    return Err(invalid("expected a sampler"));
                }
                let info = [vk::DescriptorImageInfo {
                    sampler: self.sampler(kind),
                    image_view: vk::ImageView::null(),
                    image_layout: vk::ImageLayout::UNDEFINED,
                }];
                unsafe { self.device.update_descriptor_sets(&[write.image_info(&info)], &[]) };
            }
        }
        Ok(())
    }
}

impl GraphicsBackend for VulkanBackend {
    type Fence = vk::Fence;
    type Semaphore = vk::Semaphore;
    type CommandBuffer = vk::CommandBuffer;

    fn create_fence(&mut self, signaled: bool) -> BackendResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::default().flags(flags);
        unsafe { self.device.create_fence(&info, None) }
            .map_err(|e| convert_result(e, BackendError::SyncObjectCreationFailed))
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn wait_for_fence(&self, fence: &vk::Fence, timeout: Duration) -> BackendResult<FenceStatus> {
        match unsafe {
            self.device
                .wait_for_fences(&[*fence], true, duration_to_nanos(timeout))
        } {
            Ok(()) => Ok(FenceStatus::Signaled),
            Err(vk::Result::TIMEOUT) => Ok(FenceStatus::TimedOut),
            Err(e) => Err(convert_result(e, BackendError::SubmitFailed)),
        }
    }

    fn reset_fence(&self, fence: &vk::Fence) -> BackendResult<()> {
        unsafe { self.device.reset_fences(&[*fence]) }
            .map_err(|e| convert_result(e, BackendError::SubmitFailed))
    }

    fn create_semaphore(&mut self) -> BackendResult<vk::Semaphore> {
        unsafe {
            self.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        }
        .map_err(|e| convert_result(e, BackendError::SyncObjectCreationFailed))
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn allocate_command_buffer(&mut self) -> BackendResult<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.allocate_command_buffers(&info) }
            .map_err(|e| convert_result(e, BackendError::RecordingFailed))?;
        buffers
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::RecordingFailed("No command buffer allocated".into()))
    }

    fn free_command_buffer(&mut self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device
                .free_command_buffers(self.command_pool, &[command_buffer])
        };
    }

    fn reset_command_buffer(&self, command_buffer: &vk::CommandBuffer) -> BackendResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(*command_buffer, vk::CommandBufferResetFlags::empty())
        }
        .map_err(|e| convert_result(e, BackendError::RecordingFailed))
    }

    fn encode(
        &self,
        command_buffer: &vk::CommandBuffer,
        record: &mut dyn FnMut(&mut dyn CommandEncoder),
    ) -> BackendResult<()> {
        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(*command_buffer, &begin_info) }
            .map_err(|e| convert_result(e, BackendError::RecordingFailed))?;

        let mut encoder = VulkanEncoder {
            device: &self.device,
            debug_utils: self.debug_device.as_ref(),
            registry: &self.registry,
            pipelines: &self.pipelines,
            cmd: *command_buffer,
            bound: None,
            rendering: false,
        };
        record(&mut encoder);

        unsafe { self.device.end_command_buffer(*command_buffer) }
            .map_err(|e| convert_result(e, BackendError::RecordingFailed))
    }

    fn submit(
        &self,
        command_buffer: &vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: &vk::Fence,
    ) -> BackendResult<()> {
        let wait_semaphores = [wait];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [*command_buffer];
        let signal_semaphores = [signal];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe { self.device.queue_submit(self.queue, &[submit_info], *fence) }
            .map_err(|e| convert_result(e, BackendError::SubmitFailed))
    }

    fn wait_idle(&self) -> BackendResult<()> {
        unsafe { self.device.device_wait_idle() }
            .map_err(|e| convert_result(e, BackendError::SubmitFailed))
    }

    fn swapchain_info(&self) -> SwapchainInfo {
        SwapchainInfo {
            format: self.surface_format,
            extent: Extent2d::new(self.swapchain.extent.width, self.swapchain.extent.height),
            images: self.swapchain_images.clone(),
        }
    }

    fn acquire_next_image(
        &mut self,
        signal: vk::Semaphore,
        timeout: Duration,
    ) -> BackendResult<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_fn.acquire_next_image(
                self.swapchain.handle,
                duration_to_nanos(timeout),
                signal,
                vk::Fence::null(),
            )
        };
        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Err(
                BackendError::AcquireImageFailed("no image became available in time".into()),
            ),
            Err(e) => Err(convert_result(e, BackendError::AcquireImageFailed)),
        }
    }

    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> BackendResult<PresentOutcome> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain.handle];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_fn.queue_present(self.queue, &present_info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(convert_result(e, BackendError::PresentFailed)),
        }
    }

    fn recreate_swapchain(&mut self, extent: Extent2d) -> BackendResult<()> {
        self.wait_idle()?;

        let mut swapchain = Swapchain::new(
            &self.device,
            self.physical_device,
            &self.surface_fn,
            &self.swapchain_fn,
            &SwapchainRequest {
                surface: self.surface,
                extent,
                vsync: self.vsync,
                old: self.swapchain.handle,
            },
        )?;
        std::mem::swap(&mut self.swapchain, &mut swapchain);
        unsafe { swapchain.destroy(&self.device, &self.swapchain_fn) };

        self.register_swapchain_images()
    }

    fn create_image(&mut self, desc: &ImageDescriptor) -> BackendResult<ImageId> {
        let image = self.create_image_inner(desc)?;
        let id = ImageId(self.registry.next_id());
        self.registry.images.insert(id, image);
        log::trace!("Created image '{}' as {id:?}", desc.label);
        Ok(id)
    }

    fn destroy_image(&mut self, image: ImageId) {
        if self.swapchain_images.contains(&image) {
            log::warn!("Ignoring destroy of swapchain image {image:?}");
            return;
        }
        let Some(image) = self.registry.images.remove(&image) else {
            return;
        };
        unsafe {
            self.device.destroy_image_view(image.view, None);
            self.device.destroy_image(image.image, None);
        }
        if let (Some(allocation), Some(allocator)) = (image.allocation, self.allocator.as_mut()) {
            if let Err(e) = allocator.free(allocation) {
                log::warn!("Failed to free image memory: {e}");
            }
        }
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(desc.size.max(1))
            .usage(convert_buffer_usage(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }
            .map_err(|e| convert_result(e, BackendError::BufferCreationFailed))?;
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocated = self.allocator().and_then(|allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name: &desc.label,
                    requirements,
                    location: MemoryLocation::CpuToGpu,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| BackendError::BufferCreationFailed(format!("{}: {e}", desc.label)))
        });
        let allocation = match allocated {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            unsafe { self.device.destroy_buffer(buffer, None) };
            if let Ok(allocator) = self.allocator() {
                let _ = allocator.free(allocation);
            }
            return Err(convert_result(e, BackendError::BufferCreationFailed));
        }

        let handle = BufferHandle(self.registry.next_id());
        self.registry.buffers.insert(
            handle,
            VkBuffer {
                buffer,
                allocation,
                size: desc.size,
            },
        );
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> BackendResult<()> {
        let target = self
            .registry
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| BackendError::RecordingFailed(format!("{buffer:?} is not live")))?;

        let end = offset + data.len() as u64;
        if end > target.size {
            return Err(BackendError::RecordingFailed(format!(
                "Write of {} bytes at {offset} overruns {buffer:?} ({} bytes)",
                data.len(),
                target.size
            )));
        }
        let mapped = target.allocation.mapped_slice_mut().ok_or_else(|| {
            BackendError::RecordingFailed(format!("{buffer:?} is not host visible"))
        })?;
        mapped[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        let Some(buffer) = self.registry.buffers.remove(&buffer) else {
            return;
        };
        unsafe { self.device.destroy_buffer(buffer.buffer, None) };
        if let Some(allocator) = self.allocator.as_mut() {
            if let Err(e) = allocator.free(buffer.allocation) {
                log::warn!("Failed to free buffer memory: {e}");
            }
        }
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutKind,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        let set_layout = self.pipelines.set_layout(layout).ok_or_else(|| {
            BackendError::PipelineCreationFailed(format!("{layout:?} set layout missing"))
        })?;
        let set_layouts = [set_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.descriptor_pool)
            .set_layouts(&set_layouts);
        let set = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }
            .map_err(|e| convert_result(e, BackendError::RecordingFailed))?
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::RecordingFailed("No descriptor set allocated".into()))?;

        for (binding, entry) in entries {
            if let Err(e) = self.write_descriptor(set, layout, *binding, entry) {
                let _ = unsafe { self.device.free_descriptor_sets(self.descriptor_pool, &[set]) };
                return Err(e);
            }
        }

        let handle = BindGroupHandle(self.registry.next_id());
        self.registry
            .bind_groups
            .insert(handle, VkBindGroup { set, layout });
        Ok(handle)
    }

    fn destroy_bind_group(&mut self, group: BindGroupHandle) {
        if let Some(group) = self.registry.bind_groups.remove(&group) {
            if let Err(e) =
                unsafe { self.device.free_descriptor_sets(self.descriptor_pool, &[group.set]) }
            {
                log::warn!("Failed to free descriptor set: {e:?}");
            }
        }
    }

    fn prepare_pipelines(&mut self, config: &PipelineConfig) -> BackendResult<()> {
        self.wait_idle()?;
        self.pipelines.rebuild(&self.device, config)
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            let live_groups = self.registry.bind_groups.len();
            let live_buffers = self.registry.buffers.len();
            let live_images = self.registry.images.len().saturating_sub(self.swapchain_images.len());
            if live_groups + live_buffers + live_images > 0 {
                log::warn!(
                    "Dropping backend with {live_images} images, {live_buffers} buffers and {live_groups} bind groups still alive"
                );
            }

            self.registry.bind_groups.clear();
            for (_, buffer) in self.registry.buffers.drain() {
                self.device.destroy_buffer(buffer.buffer, None);
                if let Some(allocator) = self.allocator.as_mut() {
                    let _ = allocator.free(buffer.allocation);
                }
            }
            for (_, image) in self.registry.images.drain() {
                if image.swapchain {
                    continue;
                }
                self.device.destroy_image_view(image.view, None);
                self.device.destroy_image(image.image, None);
                if let (Some(allocation), Some(allocator)) =
                    (image.allocation, self.allocator.as_mut())
                {
                    let _ = allocator.free(allocation);
                }
            }

            // The allocator must go before the device
            drop(self.allocator.take());

            self.pipelines.destroy(&self.device);
            self.device.destroy_sampler(self.linear_sampler, None);
            self.device.destroy_sampler(self.shadow_sampler, None);
            self.device.destroy_descriptor_pool(self.descriptor_pool, None);
            self.device.destroy_command_pool(self.command_pool, None);
            self.swapchain.destroy(&self.device, &self.swapchain_fn);

            self.device.destroy_device(None);
            self.surface_fn.destroy_surface(self.surface, None);
            if let (Some(debug_utils), Some(messenger)) =
                (self.debug_utils.as_ref(), self.debug_messenger.take())
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}
