use std::sync::Arc;
use std::time::Duration;

use ash::vk;

use super::{Device, Image, ImageDesc, RhiError, Semaphore, Surface};

pub struct Swapchain {
    pub(crate) raw: vk::SwapchainKHR,
    pub(crate) func_loader: ash::extensions::khr::Swapchain,

    pub images: Vec<Image>,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub enable_vsync: bool,

    // since the device and surface are only valid if and only if the
    // swapchain is valid, keep an atomic reference counter here to avoid
    // incorrect dropping.
    #[allow(dead_code)]
    pub(crate) device: Arc<Device>,
    #[allow(dead_code)]
    pub(crate) surface: Arc<Surface>,
}

impl Swapchain {
    pub fn builder() -> SwapchainBuilder {
        Default::default()
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    /// Acquire the next presentable image, signaling `signal` once it is
    /// actually available. Returns the image index and whether the
    /// swapchain is suboptimal for the surface.
    pub fn acquire_next_image(
        &self,
        timeout: Duration,
        signal: &Semaphore,
    ) -> anyhow::Result<(u32, bool), RhiError> {
        unsafe {
            match self.func_loader.acquire_next_image(
                self.raw,
                timeout.as_nanos() as u64,
                signal.raw,
                vk::Fence::null(),
            ) {
                Ok((index, suboptimal)) => Ok((index, suboptimal)),
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RhiError::SwapchainOutOfDate),
                Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => {
                    Err(RhiError::AcquireTimeout)
                }
                Err(err) => Err(RhiError::Vulkan { err }),
            }
        }
    }

    fn enumerate_available_surface_formats(
        device: &Arc<Device>,
        surface: &Arc<Surface>,
    ) -> anyhow::Result<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            Ok(surface
                .func_loader
                .get_physical_device_surface_formats(device.physical_device.raw, surface.raw)?)
        }
    }

    fn enumerate_available_surface_capabilities(
        device: &Arc<Device>,
        surface: &Arc<Surface>,
    ) -> anyhow::Result<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            Ok(surface
                .func_loader
                .get_physical_device_surface_capabilities(device.physical_device.raw, surface.raw)?)
        }
    }

    fn enumerate_available_surface_present_modes(
        device: &Arc<Device>,
        surface: &Arc<Surface>,
    ) -> anyhow::Result<Vec<vk::PresentModeKHR>> {
        unsafe {
            Ok(surface
                .func_loader
                .get_physical_device_surface_present_modes(device.physical_device.raw, surface.raw)?)
        }
    }

    fn pick_suitable_surface_format(
        device: &Arc<Device>,
        surface: &Arc<Surface>,
    ) -> anyhow::Result<vk::SurfaceFormatKHR> {
        let surface_formats = Self::enumerate_available_surface_formats(device, surface)?;

        let picked = match surface_formats.len() {
            0 => unreachable!(),
            // if there is only one format with vk::Format::UNDEFINED,
            // there is no preferred format, so we assume VK_FORMAT_B8G8R8A8_UNORM
            1 if surface_formats[0].format == vk::Format::UNDEFINED => vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: surface_formats[0].color_space,
            },
            _ => *surface_formats
                .iter()
                // prefer format VK_FORMAT_B8G8R8A8_UNORM
                .find(|format| format.format == vk::Format::B8G8R8A8_UNORM)
                .unwrap_or(&surface_formats[0]),
        };

        Ok(picked)
    }

    fn new(
        builder: SwapchainBuilder,
        device: &Arc<Device>,
        surface: &Arc<Surface>,
    ) -> anyhow::Result<Self> {
        let surface_capabilities = Self::enumerate_available_surface_capabilities(device, surface)?;

        // triple-buffering for swapchain images
        let mut image_count = 3.max(surface_capabilities.min_image_count);
        if surface_capabilities.max_image_count != 0 {
            image_count = image_count.min(surface_capabilities.max_image_count);
        }

        let image_resolution = match surface_capabilities.current_extent.width {
            u32::MAX => builder.extent,
            _ => surface_capabilities.current_extent,
        };

        if 0 == image_resolution.width || 0 == image_resolution.height {
            anyhow::bail!("Swapchain resolution can NOT be zero!");
        }

        // choose present modes by vsync, the one at the front will be chosen
        // first if they are both supported by the surface.
        let present_modes = if builder.enable_vsync {
            vec![vk::PresentModeKHR::FIFO_RELAXED, vk::PresentModeKHR::FIFO]
        } else {
            vec![vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        };

        let surface_supported_present_modes =
            Self::enumerate_available_surface_present_modes(device, surface)?;

        let present_mode = present_modes
            .into_iter()
            .find(|pm| surface_supported_present_modes.contains(pm))
            .unwrap_or(vk::PresentModeKHR::FIFO);

        let surface_transform = if surface_capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            surface_capabilities.current_transform
        };

        let surface_format = Self::pick_suitable_surface_format(device, surface)
            .expect("Failed to pick a suitable surface format!");

        let image_usage =
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST;

        let swapchain_ci = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.raw)
            .min_image_count(image_count)
            .image_color_space(surface_format.color_space)
            .image_format(surface_format.format)
            .image_extent(image_resolution)
            .image_usage(image_usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .image_array_layers(1)
            .build();

        let func_loader =
            ash::extensions::khr::Swapchain::new(&device.instance.raw, &device.raw);
        let swapchain = unsafe { func_loader.create_swapchain(&swapchain_ci, None) }
            .expect("Failed to create swapchain!");
        glog::trace!("Vulkan swapchain created!");

        // fetch images from swapchain
        let raw_images = unsafe { func_loader.get_swapchain_images(swapchain) }
            .expect("Failed to get swapchain images!");

        // directly construct images, swapchain images own no allocation
        let images: Vec<_> = raw_images
            .into_iter()
            .map(|raw| Image {
                raw,
                allocation: None,
                desc: ImageDesc::new_2d(
                    [image_resolution.width, image_resolution.height],
                    surface_format.format,
                )
                .usage_flags(image_usage),
            })
            .collect();

        Ok(Self {
            raw: swapchain,
            func_loader,
            images,
            extent: image_resolution,
            format: surface_format.format,
            enable_vsync: builder.enable_vsync,

            device: device.clone(),
            surface: surface.clone(),
        })
    }
}

pub struct SwapchainBuilder {
    pub extent: vk::Extent2D,
    pub enable_vsync: bool,
}

impl Default for SwapchainBuilder {
    fn default() -> Self {
        Self {
            extent: vk::Extent2D {
                width: 0,
                height: 0,
            },
            enable_vsync: true,
        }
    }
}

impl SwapchainBuilder {
    pub fn extent(mut self, extent: [u32; 2]) -> Self {
        self.extent = vk::Extent2D::builder()
            .width(extent[0])
            .height(extent[1])
            .build();
        self
    }

    pub fn enable_vsync(mut self, enable_vsync: bool) -> Self {
        self.enable_vsync = enable_vsync;
        self
    }

    pub fn build(
        self,
        device: &Arc<Device>,
        surface: &Arc<Surface>,
    ) -> anyhow::Result<Swapchain> {
        Swapchain::new(self, device, surface)
    }
}
