/// Enable vulkan validation layers and the debug messenger.
pub const ENABLE_DEBUG: bool = cfg!(debug_assertions);

pub const REQUIRED_VALIDATION_LAYERS: [&str; 1] = ["VK_LAYER_KHRONOS_validation"];

/// Upper bound of frames in flight. The render surface clamps its
/// buffering count to this value.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// How long we are willing to block on the next swapchain image.
pub const ACQUIRE_IMAGE_TIMEOUT_NS: u64 = 100_000_000;
