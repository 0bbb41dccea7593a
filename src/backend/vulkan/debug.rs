//! Validation layer output routed into `log`.

use std::ffi::CStr;

use ash::vk;

use crate::backend::{BackendError, BackendResult};

pub fn create_debug_messenger(
    debug_utils: &ash::ext::debug_utils::Instance,
) -> BackendResult<vk::DebugUtilsMessengerEXT> {
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }.map_err(|e| {
        BackendError::InitializationFailed(format!("Failed to create debug messenger: {e:?}"))
    })
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = if callback_data.is_null() {
        String::from("(no message)")
    } else {
        // SAFETY: the driver passes a valid callback data pointer for the duration of the call
        let data = unsafe { *callback_data };
        if data.p_message.is_null() {
            String::from("(null message)")
        } else {
            // SAFETY: p_message is a null-terminated string owned by the driver
            unsafe { CStr::from_ptr(data.p_message) }
                .to_string_lossy()
                .into_owned()
        }
    };

    let kind = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "general",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "performance",
        _ => "other",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[vulkan {kind}] {message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[vulkan {kind}] {message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::debug!("[vulkan {kind}] {message}"),
        _ => log::trace!("[vulkan {kind}] {message}"),
    }

    vk::FALSE
}
