pub mod constants;
pub mod debug;

mod instance;
mod surface;
pub mod physical_device;
mod device;
mod swapchain;

mod buffer;
pub mod image;

mod command;
mod sync;

mod error;

pub use instance::Instance;
pub use surface::{required_instance_extensions, Surface};
pub use physical_device::PhysicalDevice;
pub use device::{Device, Queue};
pub use swapchain::Swapchain;
pub use buffer::{Buffer, BufferDesc};
pub use image::{Image, ImageDesc, ImageType, ImageView, ImageViewDesc, ClearValue};

pub use command::{CommandPool, CommandBuffer, RenderingAttachment, RenderingInfo};
pub use sync::{Fence, Semaphore};

pub use error::RhiError;
