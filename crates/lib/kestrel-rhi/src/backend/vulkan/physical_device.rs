use std::collections::HashSet;
use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;

use crate::backend::vulkan::{Instance, Surface};

#[derive(Copy, Clone)]
pub struct QueueFamily {
    pub index: u32,
    pub properties: vk::QueueFamilyProperties,
}

pub struct PhysicalDevice {
    pub raw: vk::PhysicalDevice,
    pub(crate) instance: Arc<Instance>,
    // keep some necessary infos
    pub(crate) queue_families: Vec<QueueFamily>,
    pub features: vk::PhysicalDeviceFeatures,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    supported_extensions: HashSet<String>,
}

impl PhysicalDevice {
    /// True if every extension in `extensions` is supported by this device.
    pub fn check_extension_support(&self, extensions: &[&str]) -> bool {
        extensions
            .iter()
            .all(|ext| self.supported_extensions.contains(*ext))
    }

    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    pub fn supports_presentation(&self, surface: &Surface) -> bool {
        self.queue_families.iter().any(|queue| {
            queue.properties.queue_count > 0
                && queue.properties.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                && unsafe {
                    surface
                        .func_loader
                        .get_physical_device_surface_support(self.raw, queue.index, surface.raw)
                        .unwrap_or(false)
                }
        })
    }
}

pub fn enumerate_physical_devices(instance: &Arc<Instance>) -> Vec<PhysicalDevice> {
    let physical_devices = unsafe { instance.raw.enumerate_physical_devices() }
        .expect("Failed to enumerate physical devices!");

    physical_devices
        .into_iter()
        .map(|pd| {
            let features = unsafe { instance.raw.get_physical_device_features(pd) };
            let properties = unsafe { instance.raw.get_physical_device_properties(pd) };
            let memory_properties =
                unsafe { instance.raw.get_physical_device_memory_properties(pd) };

            let queue_families: Vec<QueueFamily> =
                unsafe { instance.raw.get_physical_device_queue_family_properties(pd) }
                    .into_iter()
                    .enumerate()
                    .map(|(index, properties)| QueueFamily {
                        index: index as u32,
                        properties,
                    })
                    .collect();

            let supported_extensions: HashSet<String> =
                unsafe { instance.raw.enumerate_device_extension_properties(pd) }
                    .expect("Failed to enumerate device extensions!")
                    .into_iter()
                    .map(|ext| {
                        unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }
                            .to_string_lossy()
                            .into_owned()
                    })
                    .collect();

            PhysicalDevice {
                raw: pd,
                instance: instance.clone(),
                queue_families,
                features,
                properties,
                memory_properties,
                supported_extensions,
            }
        })
        .collect()
}
