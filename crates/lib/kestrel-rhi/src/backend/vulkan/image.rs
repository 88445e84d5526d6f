use std::hash::{Hash, Hasher};

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

use super::{Device, RhiError};

// image type is associated with image view type.
// use this for both types.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ImageType {
    Tex1d = 0,
    Tex1dArray = 1,
    Tex2d = 2,
    Tex2dArray = 3,
    Tex3d = 4,
    Cube = 5,
    CubeArray = 6,
}

pub fn image_type_to_view_type(image_type: ImageType) -> vk::ImageViewType {
    match image_type {
        ImageType::Tex1d => vk::ImageViewType::TYPE_1D,
        ImageType::Tex1dArray => vk::ImageViewType::TYPE_1D_ARRAY,
        ImageType::Tex2d => vk::ImageViewType::TYPE_2D,
        ImageType::Tex2dArray => vk::ImageViewType::TYPE_2D_ARRAY,
        ImageType::Tex3d => vk::ImageViewType::TYPE_3D,
        ImageType::Cube => vk::ImageViewType::CUBE,
        ImageType::CubeArray => vk::ImageViewType::CUBE_ARRAY,
    }
}

pub fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

pub fn is_depth_stencil_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

pub fn aspect_flags_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::X8_D24_UNORM_PACK32 | vk::Format::D32_SFLOAT => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Clear value of an attachment.
///
/// `vk::ClearValue` is a union and can neither be hashed nor compared,
/// but frame descriptions must be. Keep our own value type and convert
/// at record time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl Default for ClearValue {
    fn default() -> Self {
        ClearValue::Color([0.0, 0.0, 0.0, 1.0])
    }
}

impl Eq for ClearValue {}

impl Hash for ClearValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            ClearValue::Color(color) => {
                state.write_u8(0);
                for channel in color {
                    state.write_u32(channel.to_bits());
                }
            }
            ClearValue::DepthStencil { depth, stencil } => {
                state.write_u8(1);
                state.write_u32(depth.to_bits());
                state.write_u32(*stencil);
            }
        }
    }
}

impl From<ClearValue> for vk::ClearValue {
    fn from(clear: ClearValue) -> Self {
        match clear {
            ClearValue::Color(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

pub struct Image {
    pub raw: vk::Image,
    // why Option? because swapchain images don't have an Allocation,
    // but we want a unified representation of Image.
    pub allocation: Option<Allocation>,
    pub desc: ImageDesc,
}

impl Image {
    pub fn extent(&self) -> [u32; 3] {
        self.desc.extent
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct ImageDesc {
    pub extent: [u32; 3],
    pub image_type: ImageType,
    pub usage: vk::ImageUsageFlags,
    pub flags: vk::ImageCreateFlags,
    pub format: vk::Format,
    pub sample: vk::SampleCountFlags,
    pub tiling: vk::ImageTiling,
    pub array_elements: u32,
    pub mip_levels: u16,
}

impl Default for ImageDesc {
    fn default() -> Self {
        Self {
            extent: [0, 0, 0],
            format: vk::Format::UNDEFINED,
            image_type: ImageType::Tex2d,
            // usage can be inferred later, but user may still add flags here
            usage: vk::ImageUsageFlags::default(),
            flags: vk::ImageCreateFlags::empty(),
            sample: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            array_elements: 1,
            mip_levels: 1,
        }
    }
}

impl ImageDesc {
    pub fn new_2d(extent: [u32; 2], format: vk::Format) -> Self {
        Self {
            extent: [extent[0], extent[1], 1],
            format,
            image_type: ImageType::Tex2d,
            ..Default::default()
        }
    }

    pub fn new_3d(extent: [u32; 3], format: vk::Format) -> Self {
        Self {
            extent,
            format,
            image_type: ImageType::Tex3d,
            ..Default::default()
        }
    }

    #[inline]
    pub fn array_elements(mut self, num: u32) -> Self {
        self.array_elements = num;
        self
    }

    #[inline]
    pub fn usage_flags(mut self, flags: vk::ImageUsageFlags) -> Self {
        self.usage = flags;
        self
    }

    #[inline]
    pub fn image_type(mut self, image_type: ImageType) -> Self {
        self.image_type = image_type;
        self
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Builder)]
#[builder(pattern = "owned", derive(Clone))]
pub struct ImageViewDesc {
    /// If this is None, infer from image type
    #[builder(setter(strip_option), default)]
    pub view_type: Option<vk::ImageViewType>,
    /// If this is None, use same image format for image view
    #[builder(setter(strip_option), default)]
    pub format: Option<vk::Format>,
    #[builder(default = "vk::ImageAspectFlags::COLOR")]
    pub aspect_mask: vk::ImageAspectFlags,
    #[builder(default = "0")]
    pub base_mip_level: u32,
    #[builder(default = "None")]
    pub level_count: Option<u32>,
}

impl ImageViewDesc {
    pub fn builder() -> ImageViewDescBuilder {
        Default::default()
    }
}

impl Default for ImageViewDesc {
    fn default() -> Self {
        ImageViewDescBuilder::default().build().unwrap()
    }
}

pub struct ImageView {
    pub raw: vk::ImageView,
    pub desc: ImageViewDesc,
}

// implement image associated functions for device
impl Device {
    pub fn create_image(&self, desc: ImageDesc, name: &str) -> anyhow::Result<Image, RhiError> {
        let image_ci = get_image_create_info(&desc);

        let image = unsafe { self.raw.create_image(&image_ci, None)? };

        let requirements = unsafe { self.raw.get_image_memory_requirements(image) };

        let allocation = self
            .global_allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|err| RhiError::AllocationFailure {
                name: name.to_owned(),
                error: err,
            })?;

        // bind memory
        unsafe {
            self.raw
                .bind_image_memory(image, allocation.memory(), allocation.offset())?
        };

        Ok(Image {
            raw: image,
            allocation: Some(allocation),
            desc,
        })
    }

    pub fn create_image_view(
        &self,
        image: &Image,
        view_desc: &ImageViewDesc,
    ) -> anyhow::Result<ImageView, RhiError> {
        let create_info = vk::ImageViewCreateInfo {
            image: image.raw,
            ..populate_view_create_info(&image.desc, view_desc)
        };

        let raw = unsafe { self.raw.create_image_view(&create_info, None)? };

        Ok(ImageView {
            raw,
            desc: *view_desc,
        })
    }

    pub fn destroy_image(&self, image: Image) {
        if let Some(alloc) = image.allocation {
            self.global_allocator
                .lock()
                .free(alloc)
                .expect("Failed to free vulkan image memory!");
        }

        unsafe {
            self.raw.destroy_image(image.raw, None);
        }
    }

    pub fn destroy_image_view(&self, view: ImageView) {
        unsafe {
            self.raw.destroy_image_view(view.raw, None);
        }
    }
}

fn populate_view_create_info(
    image_desc: &ImageDesc,
    view_desc: &ImageViewDesc,
) -> vk::ImageViewCreateInfo {
    vk::ImageViewCreateInfo::builder()
        .format(view_desc.format.unwrap_or(image_desc.format))
        // no swizzle
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::R,
            g: vk::ComponentSwizzle::G,
            b: vk::ComponentSwizzle::B,
            a: vk::ComponentSwizzle::A,
        })
        .view_type(
            view_desc
                .view_type
                .unwrap_or_else(|| image_type_to_view_type(image_desc.image_type)),
        )
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: view_desc.aspect_mask,
            base_mip_level: view_desc.base_mip_level,
            level_count: view_desc
                .level_count
                .unwrap_or(image_desc.mip_levels as u32),
            base_array_layer: 0,
            layer_count: match image_desc.image_type {
                ImageType::Cube | ImageType::CubeArray => 6,
                _ => 1,
            },
        })
        .build()
}

pub fn get_image_create_info(desc: &ImageDesc) -> vk::ImageCreateInfo {
    let (image_type, image_extent, image_layers) = match desc.image_type {
        ImageType::Tex1d => (
            vk::ImageType::TYPE_1D,
            vk::Extent3D {
                width: desc.extent[0],
                height: 1,
                depth: 1,
            },
            1,
        ),
        ImageType::Tex1dArray => (
            vk::ImageType::TYPE_1D,
            vk::Extent3D {
                width: desc.extent[0],
                height: 1,
                depth: 1,
            },
            desc.array_elements,
        ),
        ImageType::Tex2d => (
            vk::ImageType::TYPE_2D,
            vk::Extent3D {
                width: desc.extent[0],
                height: desc.extent[1],
                depth: 1,
            },
            1,
        ),
        ImageType::Tex2dArray => (
            vk::ImageType::TYPE_2D,
            vk::Extent3D {
                width: desc.extent[0],
                height: desc.extent[1],
                depth: 1,
            },
            desc.array_elements,
        ),
        ImageType::Tex3d => (
            vk::ImageType::TYPE_3D,
            vk::Extent3D {
                width: desc.extent[0],
                height: desc.extent[1],
                depth: desc.extent[2],
            },
            1,
        ),
        ImageType::Cube => (
            vk::ImageType::TYPE_2D,
            vk::Extent3D {
                width: desc.extent[0],
                height: desc.extent[1],
                depth: 1,
            },
            6,
        ),
        ImageType::CubeArray => (
            vk::ImageType::TYPE_2D,
            vk::Extent3D {
                width: desc.extent[0],
                height: desc.extent[1],
                depth: 1,
            },
            6 * desc.array_elements,
        ),
    };

    vk::ImageCreateInfo {
        flags: desc.flags,
        image_type,
        format: desc.format,
        extent: image_extent,
        mip_levels: desc.mip_levels as u32,
        array_layers: image_layers,
        samples: desc.sample,
        tiling: desc.tiling,
        usage: desc.usage,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        ..Default::default()
    }
}
