//! Vulkan instance creation.

use std::ffi::{c_char, CStr};

use ash::vk;
use raw_window_handle::RawDisplayHandle;

use super::debug;
use crate::backend::{BackendError, BackendResult};

/// Dynamic rendering and synchronization without render pass objects need 1.3
const REQUIRED_API_VERSION: u32 = vk::API_VERSION_1_3;

const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

pub struct InstanceBundle {
    pub instance: ash::Instance,
    pub debug_utils: Option<ash::ext::debug_utils::Instance>,
    pub debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

/// Create an instance with the surface extensions the display needs.
///
/// Validation is best effort: when the layer is missing a warning is logged and the
/// instance is created without it.
pub fn create_instance(
    entry: &ash::Entry,
    display: RawDisplayHandle,
    app_name: &str,
    validation_enabled: bool,
) -> BackendResult<InstanceBundle> {
    let validation_available = validation_enabled && check_validation_layer_support(entry);
    if validation_enabled && !validation_available {
        log::warn!("Validation layers requested but not available");
    }

    let app_name = std::ffi::CString::new(app_name).unwrap_or_default();
    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"lumina")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(REQUIRED_API_VERSION);

    let mut extensions: Vec<*const c_char> = ash_window::enumerate_required_extensions(display)
        .map_err(|e| BackendError::InitializationFailed(format!("Surface extensions: {e:?}")))?
        .to_vec();
    if validation_available {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }

    #[allow(unused_mut)]
    let mut create_flags = vk::InstanceCreateFlags::empty();
    #[cfg(target_os = "macos")]
    {
        extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
        create_flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    }

    let layer_names: Vec<*const c_char> = if validation_available {
        vec![VALIDATION_LAYER_NAME.as_ptr()]
    } else {
        vec![]
    };

    let create_info = vk::InstanceCreateInfo::default()
        .flags(create_flags)
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layer_names);

    let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
        BackendError::InitializationFailed(format!("Failed to create Vulkan instance: {e:?}"))
    })?;

    let (debug_utils, debug_messenger) = if validation_available {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, &instance);
        let messenger = debug::create_debug_messenger(&debug_utils)?;
        (Some(debug_utils), Some(messenger))
    } else {
        (None, None)
    };

    Ok(InstanceBundle {
        instance,
        debug_utils,
        debug_messenger,
    })
}

fn check_validation_layer_support(entry: &ash::Entry) -> bool {
    let Ok(available_layers) = (unsafe { entry.enumerate_instance_layer_properties() }) else {
        return false;
    };

    available_layers.iter().any(|layer| {
        layer
            .layer_name_as_c_str()
            .map(|name| name == VALIDATION_LAYER_NAME)
            .unwrap_or(false)
    })
}
