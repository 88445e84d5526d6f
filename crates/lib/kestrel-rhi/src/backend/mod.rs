pub mod vulkan;

pub use vulkan::{
    Instance, Surface, PhysicalDevice, Device, Queue, Swapchain,
    CommandPool, CommandBuffer, RenderingAttachment, RenderingInfo,
    Fence, Semaphore,
    Image, ImageDesc, ImageType, ImageView, ImageViewDesc,
    Buffer, BufferDesc,
    ClearValue,
    RhiError,
};

pub use vulkan::image::{aspect_flags_for_format, is_depth_format, is_depth_stencil_format};
pub use vulkan::physical_device::enumerate_physical_devices;
pub use vulkan::required_instance_extensions;
pub use vulkan::constants;
