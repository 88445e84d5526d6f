use thiserror::Error;

#[derive(Debug, Error)]
pub enum RhiError {
    #[error("Allocation failed for {name:?}: {error:?}")]
    AllocationFailure {
        name: String,
        error: gpu_allocator::AllocationError,
    },

    #[error("Vulkan error: {err:?}")]
    Vulkan { err: ash::vk::Result },

    #[error("Swapchain is out of date, need to reconstruct!")]
    SwapchainOutOfDate,

    #[error("Timed out waiting for the next swapchain image!")]
    AcquireTimeout,

    #[error("No suitable physical device found!")]
    NoSuitableDevice,
}

impl From<ash::vk::Result> for RhiError {
    fn from(err: ash::vk::Result) -> Self {
        Self::Vulkan { err }
    }
}
