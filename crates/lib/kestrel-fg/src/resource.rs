use ash::vk;

use kestrel_rhi::backend::{ClearValue, ImageType};

/// Stable identifier of a node inside one frame graph instance.
///
/// Ids are handed out monotonically at node creation and never reused
/// until the registry is reset for the next build.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct GraphId(pub(crate) u32);

pub const INVALID_ID: GraphId = GraphId(u32::MAX);

impl Default for GraphId {
    fn default() -> Self {
        INVALID_ID
    }
}

impl GraphId {
    #[inline]
    pub fn is_valid(self) -> bool {
        self != INVALID_ID
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Description of an image the graph will create.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ImageCreateDescription {
    pub name: String,
    pub extent: [u32; 3],
    pub format: vk::Format,
    pub image_type: ImageType,
    pub layers: u32,
    /// Inferred from the graph position when absent.
    pub usages: Option<vk::ImageUsageFlags>,
    pub clear_value: Option<ClearValue>,
    pub cull_imune: bool,
    pub transient: bool,
}

impl Default for ImageCreateDescription {
    fn default() -> Self {
        Self {
            name: String::new(),
            extent: [0, 0, 0],
            format: vk::Format::UNDEFINED,
            image_type: ImageType::Tex2d,
            layers: 1,
            usages: None,
            clear_value: None,
            cull_imune: false,
            transient: true,
        }
    }
}

impl ImageCreateDescription {
    pub fn new_2d(name: impl Into<String>, extent: [u32; 2], format: vk::Format) -> Self {
        Self {
            name: name.into(),
            extent: [extent[0], extent[1], 1],
            format,
            ..Default::default()
        }
    }
}

/// Description of a buffer the graph will create.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct BufferCreateDescription {
    pub name: String,
    pub size: u64,
    pub cull_imune: bool,
    pub transient: bool,
}

impl Default for BufferCreateDescription {
    fn default() -> Self {
        Self {
            name: String::new(),
            size: 0,
            cull_imune: false,
            transient: true,
        }
    }
}

impl BufferCreateDescription {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            ..Default::default()
        }
    }
}

/// A dependency edge modelled as a node: some task reads `image`.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct ImageReadDescription {
    pub image: GraphId,
    pub view_type: vk::ImageViewType,
}

/// A dependency edge modelled as a node: some task writes `image`.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct ImageWriteDescription {
    pub image: GraphId,
    pub view_type: vk::ImageViewType,
    pub clear_value: Option<ClearValue>,
}

/// A dependency edge modelled as a node: some task reads `buffer`.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct BufferReadDescription {
    pub buffer: GraphId,
}
