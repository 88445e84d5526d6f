use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::Arc;

use ash::extensions::khr;
use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use gpu_allocator::AllocatorDebugSettings;
use parking_lot::Mutex;

use super::physical_device::QueueFamily;
use super::{Instance, PhysicalDevice, RhiError, Swapchain};

pub struct Queue {
    pub raw: vk::Queue,
    pub family: QueueFamily,
}

impl Queue {
    pub fn create(device: &Device, family: QueueFamily) -> Self {
        let raw = unsafe { device.raw.get_device_queue(family.index, 0) };
        Self { raw, family }
    }

    /// Present `image_index` on the swapchain, waiting on `wait_semaphores`.
    /// Returns true if the swapchain is suboptimal for the surface.
    pub fn present(
        &self,
        swapchain: &Swapchain,
        wait_semaphores: &[vk::Semaphore],
        image_index: u32,
    ) -> anyhow::Result<bool, RhiError> {
        let present_info = vk::PresentInfoKHR::builder()
            .image_indices(std::slice::from_ref(&image_index))
            .swapchains(std::slice::from_ref(&swapchain.raw))
            .wait_semaphores(wait_semaphores)
            .build();

        let result = unsafe { swapchain.func_loader.queue_present(self.raw, &present_info) };

        match result {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RhiError::SwapchainOutOfDate),
            Err(err) => Err(RhiError::Vulkan { err }),
        }
    }
}

pub struct Device {
    pub raw: ash::Device,
    // since instance and physical device are only valid if and only if device is valid,
    // keep an atomic reference counter here to avoid incorrect dropping.
    pub(crate) physical_device: Arc<PhysicalDevice>,
    pub(crate) instance: Arc<Instance>,
    pub global_allocator: Mutex<Allocator>,

    graphics_queue_family: QueueFamily,
}

impl Device {
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::default()
    }

    pub fn graphics_queue_family(&self) -> QueueFamily {
        self.graphics_queue_family
    }

    pub fn wait_idle(&self) {
        unsafe {
            self.raw.device_wait_idle().expect("Failed to wait device idle!");
        }
    }

    /// Attach a debug name to a GPU object so it shows up in captures.
    pub fn set_object_name<T: vk::Handle>(&self, object: T, name: &str) {
        if !super::constants::ENABLE_DEBUG {
            return;
        }

        let name = CString::new(name).unwrap();
        let name_info = vk::DebugUtilsObjectNameInfoEXT::builder()
            .object_type(T::TYPE)
            .object_handle(object.as_raw())
            .object_name(name.as_c_str())
            .build();

        unsafe {
            self.instance
                .debug_utils
                .set_debug_utils_object_name(self.raw.handle(), &name_info)
                .ok();
        }
    }

    fn check_extensions_supported(
        required_extensions: &[&'static CStr],
        physical_device: &PhysicalDevice,
    ) {
        for ext in required_extensions {
            let ext = ext.to_str().unwrap();
            if !physical_device.check_extension_support(&[ext]) {
                panic!("Vulkan Extension {} not supported!", ext);
            }
        }
    }

    fn find_graphics_queue_family(physical_device: &PhysicalDevice) -> QueueFamily {
        physical_device
            .queue_families
            .iter()
            .find(|qf| qf.properties.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .copied()
            .expect("No suitable graphic queue!")
    }

    fn new(builder: DeviceBuilder, physical_device: &Arc<PhysicalDevice>) -> anyhow::Result<Self> {
        let mut required_extensions = vec![khr::Swapchain::name()];
        required_extensions.extend(builder.required_extensions.iter());

        // this function will panic if any extension is not supported
        Self::check_extensions_supported(&required_extensions, physical_device);

        let required_extensions: Vec<*const c_char> = required_extensions
            .into_iter()
            .map(|ext| ext.as_ptr())
            .collect();

        let graphics_queue_family = Self::find_graphics_queue_family(physical_device);

        let priorities = [1.0];
        let queue_ci = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(graphics_queue_family.index)
            .queue_priorities(&priorities)
            .build()];

        // dynamic rendering drives every raster pass recording
        let mut vulkan_13_features =
            vk::PhysicalDeviceVulkan13Features::builder().dynamic_rendering(true);

        let device_ci = vk::DeviceCreateInfo::builder()
            .enabled_extension_names(&required_extensions)
            .queue_create_infos(&queue_ci)
            .push_next(&mut vulkan_13_features)
            .build();

        let device = unsafe {
            physical_device
                .instance
                .raw
                .create_device(physical_device.raw, &device_ci, None)
                .expect("Failed to create vulkan device!")
        };

        glog::trace!("Vulkan device created!");

        // create a global gpu memory allocator
        let allocator_debug_settings = AllocatorDebugSettings {
            log_memory_information: true,
            log_leaks_on_shutdown: true,
            ..Default::default()
        };

        let global_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: physical_device.instance.raw.clone(),
            device: device.clone(),
            physical_device: physical_device.raw,
            debug_settings: allocator_debug_settings,
            buffer_device_address: false,
        })
        .expect("Failed to create vulkan memory allocator!");

        Ok(Self {
            raw: device,
            physical_device: physical_device.clone(),
            instance: physical_device.instance.clone(),
            global_allocator: Mutex::new(global_allocator),
            graphics_queue_family,
        })
    }
}

pub struct DeviceBuilder {
    required_extensions: Vec<&'static CStr>,
}

impl Default for DeviceBuilder {
    fn default() -> Self {
        Self {
            required_extensions: Vec::new(),
        }
    }
}

impl DeviceBuilder {
    #[allow(dead_code)]
    pub fn require_extensions(mut self, extensions: Vec<&'static CStr>) -> Self {
        self.required_extensions = extensions;
        self
    }

    pub fn build(self, physical_device: &Arc<PhysicalDevice>) -> anyhow::Result<Arc<Device>> {
        Ok(Arc::new(Device::new(self, physical_device)?))
    }
}
