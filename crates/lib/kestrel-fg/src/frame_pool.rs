use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use ash::vk::Handle;
use wyhash::WyHash;

use kestrel_rhi::backend::{
    Buffer, BufferDesc, Device, Image, ImageDesc, ImageView, ImageViewDesc, RhiError,
};

use crate::baked_frame::BakedFrameGraph;

/// Reuses transient GPU resources across frames, keyed by description
/// hash. The pool is the only component allowed to extend GPU object
/// lifetimes past the frame that created them.
pub struct FramePool {
    retired_images: HashMap<u64, Vec<Image>>,
    retired_views: HashMap<u64, Vec<ImageView>>,
    retired_buffers: HashMap<u64, Vec<Buffer>>,
}

impl Default for FramePool {
    fn default() -> Self {
        Self::new()
    }
}

impl FramePool {
    pub fn new() -> Self {
        Self {
            retired_images: Default::default(),
            retired_views: Default::default(),
            retired_buffers: Default::default(),
        }
    }

    pub fn create_or_reuse_image(
        &mut self,
        device: &Device,
        desc: &ImageDesc,
        name: &str,
    ) -> anyhow::Result<(u64, Image), RhiError> {
        let key = hash_of(desc);

        if let Some(image) = self.retired_images.get_mut(&key).and_then(Vec::pop) {
            return Ok((key, image));
        }

        let image = device.create_image(*desc, name)?;
        Ok((key, image))
    }

    pub fn create_or_reuse_image_view(
        &mut self,
        device: &Device,
        image: &Image,
        desc: &ImageViewDesc,
    ) -> anyhow::Result<(u64, ImageView), RhiError> {
        // a view is only valid against the exact image it was made from,
        // so the raw image handle takes part in the key
        let mut hasher = WyHash::with_seed(0);
        desc.hash(&mut hasher);
        image.raw.as_raw().hash(&mut hasher);
        let key = hasher.finish();

        if let Some(view) = self.retired_views.get_mut(&key).and_then(Vec::pop) {
            return Ok((key, view));
        }

        let view = device.create_image_view(image, desc)?;
        Ok((key, view))
    }

    pub fn create_or_reuse_buffer(
        &mut self,
        device: &Device,
        desc: &BufferDesc,
        name: &str,
    ) -> anyhow::Result<(u64, Buffer), RhiError> {
        let key = hash_of(desc);

        if let Some(buffer) = self.retired_buffers.get_mut(&key).and_then(Vec::pop) {
            return Ok((key, buffer));
        }

        let buffer = device.create_buffer(*desc, name)?;
        Ok((key, buffer))
    }

    /// Move all physical resources out of a baked frame graph into the
    /// retired bins without destroying them. The caller must have waited
    /// for the frame's submissions to complete.
    pub fn recycle_frame(&mut self, frame: BakedFrameGraph) {
        let resources = frame.into_resources();

        for (key, image) in resources.images {
            self.retired_images.entry(key).or_default().push(image);
        }
        for (key, view) in resources.views {
            self.retired_views.entry(key).or_default().push(view);
        }
        for (key, buffer) in resources.buffers {
            self.retired_buffers.entry(key).or_default().push(buffer);
        }
    }

    /// Destroy every retired resource. Called at renderer shutdown, after
    /// the device went idle.
    pub fn clean(self, device: &Device) {
        for (_, views) in self.retired_views {
            for view in views {
                device.destroy_image_view(view);
            }
        }

        for (_, images) in self.retired_images {
            for image in images {
                device.destroy_image(image);
            }
        }

        for (_, buffers) in self.retired_buffers {
            for buffer in buffers {
                device.destroy_buffer(buffer);
            }
        }
    }
}

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = WyHash::with_seed(0);
    value.hash(&mut hasher);
    hasher.finish()
}
