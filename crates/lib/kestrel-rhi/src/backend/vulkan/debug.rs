use std::borrow::Cow;
use std::ffi::CStr;
use std::os::raw::c_void;

use ash::vk;

pub fn check_validation_layer_support(entry: &ash::Entry, required_layers: &[&str]) -> bool {
    let supported_layers = entry
        .enumerate_instance_layer_properties()
        .expect("Failed to enumerate vulkan instance layers!");

    required_layers.iter().all(|required| {
        supported_layers.iter().any(|layer| {
            let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            name.to_string_lossy() == *required
        })
    })
}

pub fn populate_debug_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback))
        .build()
}

unsafe extern "system" fn vulkan_debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = if callback_data.is_null() || (*callback_data).p_message.is_null() {
        Cow::from("(empty message)")
    } else {
        CStr::from_ptr((*callback_data).p_message).to_string_lossy()
    };

    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => glog::error!("[vulkan] {}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => glog::warn!("[vulkan] {}", message),
        _ => glog::debug!("[vulkan] {}", message),
    }

    vk::FALSE
}
