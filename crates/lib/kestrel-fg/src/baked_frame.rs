use std::collections::HashMap;
use std::time::Duration;

use arrayvec::ArrayVec;
use ash::vk;

use kestrel_rhi::backend::{
    aspect_flags_for_format, is_depth_format, is_depth_stencil_format, Buffer, ClearValue,
    CommandBuffer, CommandPool, Device, Fence, Image, ImageView, ImageViewDesc, Queue,
    RenderingAttachment, RenderingInfo, RhiError, Semaphore,
};

use crate::frame_pool::FramePool;
use crate::graph::FrameGraph;
use crate::resource::GraphId;
use crate::task::TaskType;

const MAX_COLOR_ATTACHMENTS: usize = 8;

pub(crate) struct FrameResources {
    pub images: Vec<(u64, Image)>,
    pub views: Vec<(u64, ImageView)>,
    pub buffers: Vec<(u64, Buffer)>,
}

impl Default for FrameResources {
    fn default() -> Self {
        Self {
            images: Vec::new(),
            views: Vec::new(),
            buffers: Vec::new(),
        }
    }
}

/// A compiled plan turned into physical GPU objects: the transient
/// resources, views, the pre-recorded primary command buffer and the
/// per-plan synchronization objects.
///
/// Submission state is carried by the fence: signaled while the graph is
/// ready, unsignaled while its submission is in flight.
pub struct BakedFrameGraph {
    fingerprint: u64,

    cmb: CommandBuffer,
    fence: Fence,
    semaphore: Semaphore,

    resources: FrameResources,
    backbuffer: usize,
}

impl BakedFrameGraph {
    /// Wait until the previous submission of this plan finished, then
    /// resubmit the pre-recorded commands. Returns the semaphore the
    /// caller chains into the presentation blit.
    pub fn execute(&self, queue: &Queue) -> anyhow::Result<vk::Semaphore, RhiError> {
        self.fence.wait(None)?;
        self.fence.reset()?;

        self.cmb
            .submit(queue, &[], std::slice::from_ref(&self.semaphore.raw), Some(&self.fence))?;

        Ok(self.semaphore.raw)
    }

    /// Block until any outstanding submission of this plan completed.
    pub fn wait_done(&self) -> anyhow::Result<(), RhiError> {
        self.fence.wait(Some(Duration::from_secs(5)))
    }

    pub fn backbuffer(&self) -> &Image {
        &self.resources.images[self.backbuffer].1
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub(crate) fn into_resources(self) -> FrameResources {
        self.resources
    }
}

impl FrameGraph {
    /// Instantiate the compiled plan into a [`BakedFrameGraph`]:
    /// transient resources come from the pool, image layouts are brought
    /// to attachment-optimal by a one-shot transition submission awaited
    /// before returning, and every raster task's `on_execute` is recorded
    /// into the primary command buffer inside its rendering scope.
    pub fn make_frame(
        &mut self,
        device: &Device,
        queue: &Queue,
        command_pool: &CommandPool,
        frame_pool: &mut FramePool,
        render_area: vk::Rect2D,
    ) -> anyhow::Result<BakedFrameGraph, RhiError> {
        let compiled = self
            .compiled
            .as_ref()
            .expect("make_frame() called before bake()!");

        let cmb = command_pool.create_command_buffer(vk::CommandBufferLevel::PRIMARY)?;
        device.set_object_name(cmb.raw, "FrameGraph:CommandBuffer:Main");

        let semaphore = Semaphore::create(device)?;
        device.set_object_name(semaphore.raw, "FrameGraph:Semaphore:Main");

        let fence = Fence::create_signaled(device)?;
        device.set_object_name(fence.raw, "FrameGraph:Fence:Main");

        let transition_cmb = command_pool.create_command_buffer(vk::CommandBufferLevel::PRIMARY)?;
        let transition_fence = Fence::create(device)?;

        let mut resources = FrameResources::default();
        // resource id -> index into resources.images
        let mut image_mapper: HashMap<GraphId, usize> = HashMap::new();
        let mut clear_values: HashMap<GraphId, ClearValue> = HashMap::new();
        let mut backbuffer = None;

        cmb.begin(false)?;
        transition_cmb.begin(true)?;

        for pass in &compiled.passes {
            if pass.ty != TaskType::Raster {
                // only the raster branch records commands today
                continue;
            }

            cmb.begin_debug_region(&format!("Task:{}", pass.name));

            for info in &pass.images {
                let (key, image) = frame_pool.create_or_reuse_image(device, &info.desc, &info.name)?;
                device.set_object_name(image.raw, &format!("FrameGraph:Image:{}", info.name));

                transition_cmb.begin_debug_region(&format!("Transition:{}", info.name));
                transition_cmb.transition_image_layout(
                    &image,
                    vk::ImageLayout::UNDEFINED,
                    attachment_layout(info.desc.format),
                );
                transition_cmb.end_debug_region();

                let index = resources.images.len();
                resources.images.push((key, image));
                image_mapper.insert(info.id, index);
                clear_values.insert(info.id, info.clear_value);

                if backbuffer.is_none() && info.id == compiled.backbuffer {
                    backbuffer = Some(index);
                }
            }

            for info in &pass.buffers {
                let (key, buffer) =
                    frame_pool.create_or_reuse_buffer(device, &info.desc, &info.name)?;
                device.set_object_name(buffer.raw, &format!("FrameGraph:Buffer:{}", info.name));
                resources.buffers.push((key, buffer));
            }

            let mut color_attachments: ArrayVec<RenderingAttachment, MAX_COLOR_ATTACHMENTS> =
                ArrayVec::new();
            let mut depth_attachment = None;

            // written targets first, then created-but-unwritten ones
            let mut attached: Vec<GraphId> = Vec::new();
            for write in &pass.writes {
                // non-transient targets are externally retained and carry
                // no pooled image to attach
                let index = match image_mapper.get(&write.image) {
                    Some(&index) => index,
                    None => continue,
                };
                let image = &resources.images[index].1;
                let format = image.desc.format;

                let view_desc = ImageViewDesc::builder()
                    .view_type(write.view_type)
                    .aspect_mask(aspect_flags_for_format(format))
                    .build()
                    .unwrap();
                let (key, view) = frame_pool.create_or_reuse_image_view(device, image, &view_desc)?;

                let clear = write
                    .clear_value
                    .or_else(|| clear_values.get(&write.image).copied())
                    .unwrap_or_default();

                let attachment = RenderingAttachment {
                    view: view.raw,
                    layout: attachment_layout(format),
                    load_op: if write.load {
                        vk::AttachmentLoadOp::LOAD
                    } else {
                        vk::AttachmentLoadOp::CLEAR
                    },
                    store_op: vk::AttachmentStoreOp::STORE,
                    clear_value: clear.into(),
                };

                resources.views.push((key, view));
                attached.push(write.image);

                if is_depth_format(format) || is_depth_stencil_format(format) {
                    depth_attachment = Some(attachment);
                } else {
                    color_attachments.push(attachment);
                }
            }

            for info in &pass.images {
                if attached.contains(&info.id) {
                    continue;
                }

                let index = image_mapper[&info.id];
                let image = &resources.images[index].1;
                let format = image.desc.format;

                let view_desc = ImageViewDesc::builder()
                    .aspect_mask(aspect_flags_for_format(format))
                    .build()
                    .unwrap();
                let (key, view) = frame_pool.create_or_reuse_image_view(device, image, &view_desc)?;

                let attachment = RenderingAttachment {
                    view: view.raw,
                    layout: attachment_layout(format),
                    load_op: vk::AttachmentLoadOp::CLEAR,
                    store_op: vk::AttachmentStoreOp::STORE,
                    clear_value: info.clear_value.into(),
                };

                resources.views.push((key, view));

                if is_depth_format(format) || is_depth_stencil_format(format) {
                    depth_attachment = Some(attachment);
                } else {
                    color_attachments.push(attachment);
                }
            }

            // views for pure reads are kept alive alongside the frame
            for read in &pass.reads {
                if let Some(&index) = image_mapper.get(&read.image) {
                    let image = &resources.images[index].1;
                    let view_desc = ImageViewDesc::builder()
                        .view_type(read.view_type)
                        .aspect_mask(aspect_flags_for_format(image.desc.format))
                        .build()
                        .unwrap();
                    let (key, view) =
                        frame_pool.create_or_reuse_image_view(device, image, &view_desc)?;
                    resources.views.push((key, view));
                }
            }

            let rendering_info = RenderingInfo {
                render_area,
                color_attachments: color_attachments.into_iter().collect(),
                depth_attachment,
            };

            cmb.begin_rendering(&rendering_info);

            let payload = self
                .payloads
                .get_mut(&pass.id)
                .expect("Task payload is missing!");
            (payload.on_execute)(payload.data.as_ref(), &cmb);

            cmb.end_rendering();
            cmb.end_debug_region();
        }

        cmb.end()?;
        transition_cmb.end()?;

        // layouts must be attachment-optimal before the primary runs
        transition_cmb.submit(queue, &[], &[], Some(&transition_fence))?;
        transition_fence.wait(None)?;

        let backbuffer = backbuffer.expect("No backbuffer was produced by the frame graph!");

        Ok(BakedFrameGraph {
            fingerprint: compiled.fingerprint,
            cmb,
            fence,
            semaphore,
            resources,
            backbuffer,
        })
    }
}

fn attachment_layout(format: vk::Format) -> vk::ImageLayout {
    if is_depth_format(format) || is_depth_stencil_format(format) {
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    } else {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    }
}
