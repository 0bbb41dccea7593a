//! Vulkan physical and logical device management.

use ash::khr::surface;
use ash::vk;

use crate::backend::{BackendError, BackendResult};

pub struct DeviceSelection {
    pub physical_device: vk::PhysicalDevice,
    pub queue_family: u32,
}

/// Pick a GPU with a queue that can both render and present to `surface`.
///
/// Discrete GPUs win over integrated ones; ties go to the larger max texture size.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface_fn: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> BackendResult<DeviceSelection> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
        BackendError::InitializationFailed(format!("Failed to enumerate physical devices: {e:?}"))
    })?;

    if devices.is_empty() {
        return Err(BackendError::InitializationFailed(
            "No Vulkan-capable GPU found".to_string(),
        ));
    }

    let mut best: Option<(u32, DeviceSelection)> = None;

    for device in devices {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        if properties.api_version < vk::API_VERSION_1_3 {
            continue;
        }
        let Some(queue_family) = find_queue_family(instance, device, surface_fn, surface) else {
            continue;
        };

        let mut score = properties.limits.max_image_dimension2_d / 1024;
        if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            score += 1000;
        } else if properties.device_type == vk::PhysicalDeviceType::INTEGRATED_GPU {
            score += 100;
        }

        log::info!(
            "Found GPU: {:?} (type: {:?}, score: {})",
            properties.device_name_as_c_str().unwrap_or(c"unknown"),
            properties.device_type,
            score
        );

        if best.as_ref().map_or(true, |(best_score, _)| score > *best_score) {
            best = Some((
                score,
                DeviceSelection {
                    physical_device: device,
                    queue_family,
                },
            ));
        }
    }

    best.map(|(_, selection)| selection)
        .ok_or_else(|| BackendError::InitializationFailed("No suitable GPU found".to_string()))
}

fn find_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    surface_fn: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Option<u32> {
    let queue_families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    queue_families
        .iter()
        .enumerate()
        .find(|(index, family)| {
            let presents = unsafe {
                surface_fn.get_physical_device_surface_support(
                    physical_device,
                    *index as u32,
                    surface,
                )
            }
            .unwrap_or(false);
            family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && presents
        })
        .map(|(index, _)| index as u32)
}

/// Create the logical device with dynamic rendering enabled
pub fn create_logical_device(
    instance: &ash::Instance,
    selection: &DeviceSelection,
) -> BackendResult<ash::Device> {
    let queue_priorities = [1.0f32];
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(selection.queue_family)
        .queue_priorities(&queue_priorities)];

    #[allow(unused_mut)]
    let mut device_extensions = vec![ash::khr::swapchain::NAME.as_ptr()];
    #[cfg(target_os = "macos")]
    device_extensions.push(ash::khr::portability_subset::NAME.as_ptr());

    let features = vk::PhysicalDeviceFeatures::default();
    let mut vulkan_13_features =
        vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&device_extensions)
        .enabled_features(&features)
        .push_next(&mut vulkan_13_features);

    unsafe { instance.create_device(selection.physical_device, &create_info, None) }.map_err(|e| {
        BackendError::DeviceCreationFailed(format!("Failed to create logical device: {e:?}"))
    })
}
