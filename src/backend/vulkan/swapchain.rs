//! Swapchain creation and teardown.

use ash::khr::{surface, swapchain};
use ash::vk;

use crate::backend::{BackendError, BackendResult, Extent2d};

/// Everything tied to one `VkSwapchainKHR`
pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
}

pub struct SwapchainRequest {
    pub surface: vk::SurfaceKHR,
    pub extent: Extent2d,
    pub vsync: bool,
    pub old: vk::SwapchainKHR,
}

fn choose_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_UNORM
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| {
            formats.iter().find(|f| {
                matches!(
                    f.format,
                    vk::Format::R8G8B8A8_UNORM | vk::Format::B8G8R8A8_SRGB | vk::Format::R8G8B8A8_SRGB
                )
            })
        })
        .copied()
}

/// FIFO is the only mode every Vulkan driver must support
pub fn choose_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, requested: Extent2d) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

impl Swapchain {
    pub fn new(
        device: &ash::Device,
        physical_device: vk::PhysicalDevice,
        surface_fn: &surface::Instance,
        swapchain_fn: &swapchain::Device,
        request: &SwapchainRequest,
    ) -> BackendResult<Self> {
        let to_error = |e: vk::Result| BackendError::SwapchainCreationFailed(format!("{e:?}"));

        let capabilities = unsafe {
            surface_fn.get_physical_device_surface_capabilities(physical_device, request.surface)
        }
        .map_err(to_error)?;
        let formats = unsafe {
            surface_fn.get_physical_device_surface_formats(physical_device, request.surface)
        }
        .map_err(to_error)?;
        let present_modes = unsafe {
            surface_fn.get_physical_device_surface_present_modes(physical_device, request.surface)
        }
        .map_err(to_error)?;

        let format = choose_format(&formats).ok_or_else(|| {
            BackendError::SwapchainCreationFailed("No supported 8-bit RGBA surface format".into())
        })?;
        let present_mode = choose_present_mode(&present_modes, request.vsync);
        let extent = choose_extent(&capabilities, request.extent);

        // One more than the minimum so acquire rarely blocks
        let image_count = (capabilities.min_image_count + 1).min(if capabilities.max_image_count > 0 {
            capabilities.max_image_count
        } else {
            u32::MAX
        });

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(request.surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(request.old);

        let handle = unsafe { swapchain_fn.create_swapchain(&create_info, None) }.map_err(to_error)?;
        let images = match unsafe { swapchain_fn.get_swapchain_images(handle) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { swapchain_fn.destroy_swapchain(handle, None) };
                return Err(to_error(e));
            }
        };

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            match unsafe { device.create_image_view(&view_info, None) } {
                Ok(view) => views.push(view),
                Err(e) => {
                    unsafe {
                        for view in views {
                            device.destroy_image_view(view, None);
                        }
                        swapchain_fn.destroy_swapchain(handle, None);
                    }
                    return Err(to_error(e));
                }
            }
        }

        log::info!(
            "Created swapchain: {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            images.len(),
            format.format,
            present_mode
        );

        Ok(Self {
            handle,
            images,
            views,
            format,
            extent,
        })
    }

    /// The caller guarantees the device no longer uses any of the images
    pub unsafe fn destroy(&mut self, device: &ash::Device, swapchain_fn: &swapchain::Device) {
        for view in self.views.drain(..) {
            unsafe { device.destroy_image_view(view, None) };
        }
        self.images.clear();
        if self.handle != vk::SwapchainKHR::null() {
            unsafe { swapchain_fn.destroy_swapchain(self.handle, None) };
            self.handle = vk::SwapchainKHR::null();
        }
    }
}
