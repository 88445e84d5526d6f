use std::ffi::CString;

use ash::extensions::ext;
use ash::vk;
use vk_sync::AccessType;

use super::image::aspect_flags_for_format;
use super::{Device, Fence, Image, Queue, RhiError};

pub struct CommandPool {
    pub raw: vk::CommandPool,
    device: ash::Device,
    debug_utils: ext::DebugUtils,
}

impl CommandPool {
    pub fn create(device: &Device) -> anyhow::Result<Self, RhiError> {
        let pool_ci = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(device.graphics_queue_family().index)
            .build();

        let raw = unsafe { device.raw.create_command_pool(&pool_ci, None)? };

        Ok(Self {
            raw,
            device: device.raw.clone(),
            debug_utils: device.instance.debug_utils.clone(),
        })
    }

    pub fn create_command_buffer(
        &self,
        level: vk::CommandBufferLevel,
    ) -> anyhow::Result<CommandBuffer, RhiError> {
        Ok(self.create_command_buffers(1, level)?.pop().unwrap())
    }

    pub fn create_command_buffers(
        &self,
        count: u32,
        level: vk::CommandBufferLevel,
    ) -> anyhow::Result<Vec<CommandBuffer>, RhiError> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_buffer_count(count)
            .command_pool(self.raw)
            .level(level)
            .build();

        let raws = unsafe { self.device.allocate_command_buffers(&alloc_info)? };

        Ok(raws
            .into_iter()
            .map(|raw| CommandBuffer {
                raw,
                pool: self.raw,
                device: self.device.clone(),
                debug_utils: self.debug_utils.clone(),
            })
            .collect())
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.raw, None);
        }
    }
}

/// One attachment of a dynamic rendering scope.
pub struct RenderingAttachment {
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_value: vk::ClearValue,
}

pub struct RenderingInfo {
    pub render_area: vk::Rect2D,
    pub color_attachments: Vec<RenderingAttachment>,
    pub depth_attachment: Option<RenderingAttachment>,
}

pub struct CommandBuffer {
    pub raw: vk::CommandBuffer,
    pool: vk::CommandPool,
    device: ash::Device,
    debug_utils: ext::DebugUtils,
}

impl CommandBuffer {
    pub fn begin(&self, one_shot: bool) -> anyhow::Result<(), RhiError> {
        let flags = if one_shot {
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
        } else {
            vk::CommandBufferUsageFlags::empty()
        };

        unsafe {
            self.device.begin_command_buffer(
                self.raw,
                &vk::CommandBufferBeginInfo::builder().flags(flags).build(),
            )?
        };
        Ok(())
    }

    pub fn end(&self) -> anyhow::Result<(), RhiError> {
        unsafe { self.device.end_command_buffer(self.raw)? };
        Ok(())
    }

    pub fn reset(&self) -> anyhow::Result<(), RhiError> {
        unsafe {
            self.device
                .reset_command_buffer(self.raw, vk::CommandBufferResetFlags::default())?
        };
        Ok(())
    }

    /// Record a full-subresource layout transition barrier for `image`.
    ///
    /// Access and stage masks are derived by vk-sync from the access
    /// types the layouts map to.
    pub fn transition_image_layout(
        &self,
        image: &Image,
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    ) {
        let previous_accesses = [access_type_for_layout(from)];
        let next_accesses = [access_type_for_layout(to)];

        let range = vk::ImageSubresourceRange {
            aspect_mask: aspect_flags_for_format(image.desc.format),
            base_mip_level: 0,
            level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 0,
            layer_count: vk::REMAINING_ARRAY_LAYERS,
        };

        vk_sync::cmd::pipeline_barrier(
            &self.device,
            self.raw,
            None,
            &[],
            &[vk_sync::ImageBarrier {
                previous_accesses: &previous_accesses,
                next_accesses: &next_accesses,
                // always use optimal to gain max performance
                previous_layout: vk_sync::ImageLayout::Optimal,
                next_layout: vk_sync::ImageLayout::Optimal,
                discard_contents: from == vk::ImageLayout::UNDEFINED,
                // no queue resource ownership transfer
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                image: image.raw,
                range,
            }],
        );
    }

    /// Blit the whole of `src` onto the whole of `dst`.
    pub fn blit_image(
        &self,
        src: &Image,
        dst: &Image,
        src_layout: vk::ImageLayout,
        dst_layout: vk::ImageLayout,
        filter: vk::Filter,
    ) {
        let src_extent = src.extent();
        let dst_extent = dst.extent();

        let region = vk::ImageBlit::builder()
            .src_subresource(vk::ImageSubresourceLayers {
                aspect_mask: aspect_flags_for_format(src.desc.format),
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: src_extent[0] as i32,
                    y: src_extent[1] as i32,
                    z: 1,
                },
            ])
            .dst_subresource(vk::ImageSubresourceLayers {
                aspect_mask: aspect_flags_for_format(dst.desc.format),
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .dst_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: dst_extent[0] as i32,
                    y: dst_extent[1] as i32,
                    z: 1,
                },
            ])
            .build();

        unsafe {
            self.device.cmd_blit_image(
                self.raw,
                src.raw,
                src_layout,
                dst.raw,
                dst_layout,
                std::slice::from_ref(&region),
                filter,
            );
        }
    }

    pub fn begin_rendering(&self, info: &RenderingInfo) {
        let color_attachments: Vec<vk::RenderingAttachmentInfo> = info
            .color_attachments
            .iter()
            .map(rendering_attachment_info)
            .collect();

        let mut rendering_info = vk::RenderingInfo::builder()
            .render_area(info.render_area)
            .layer_count(1)
            .color_attachments(&color_attachments);

        let depth_attachment = info.depth_attachment.as_ref().map(rendering_attachment_info);
        if let Some(depth_attachment) = &depth_attachment {
            rendering_info = rendering_info.depth_attachment(depth_attachment);
        }

        unsafe {
            self.device.cmd_begin_rendering(self.raw, &rendering_info);
        }
    }

    pub fn end_rendering(&self) {
        unsafe {
            self.device.cmd_end_rendering(self.raw);
        }
    }

    pub fn begin_debug_region(&self, label: &str) {
        if !super::constants::ENABLE_DEBUG {
            return;
        }

        let label = CString::new(label).unwrap();
        let label_info = vk::DebugUtilsLabelEXT::builder()
            .label_name(label.as_c_str())
            .build();

        unsafe {
            self.debug_utils
                .cmd_begin_debug_utils_label(self.raw, &label_info);
        }
    }

    pub fn end_debug_region(&self) {
        if !super::constants::ENABLE_DEBUG {
            return;
        }

        unsafe {
            self.debug_utils.cmd_end_debug_utils_label(self.raw);
        }
    }

    pub fn draw(&self, vertex_count: u32) {
        unsafe {
            self.device.cmd_draw(self.raw, vertex_count, 1, 0, 0);
        }
    }

    /// Submit this command buffer, waiting on `waits` at the paired stages,
    /// signaling `signals` and (optionally) `fence` on completion.
    pub fn submit(
        &self,
        queue: &Queue,
        waits: &[(vk::Semaphore, vk::PipelineStageFlags)],
        signals: &[vk::Semaphore],
        fence: Option<&Fence>,
    ) -> anyhow::Result<(), RhiError> {
        let wait_semaphores: Vec<vk::Semaphore> = waits.iter().map(|(sem, _)| *sem).collect();
        let wait_stages: Vec<vk::PipelineStageFlags> =
            waits.iter().map(|(_, stage)| *stage).collect();

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(signals)
            .command_buffers(std::slice::from_ref(&self.raw))
            .build();

        unsafe {
            self.device.queue_submit(
                queue.raw,
                std::slice::from_ref(&submit_info),
                fence.map(|f| f.raw).unwrap_or_else(vk::Fence::null),
            )?;
        }
        Ok(())
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device
                .free_command_buffers(self.pool, std::slice::from_ref(&self.raw));
        }
    }
}

fn rendering_attachment_info(attachment: &RenderingAttachment) -> vk::RenderingAttachmentInfo {
    vk::RenderingAttachmentInfo::builder()
        .image_view(attachment.view)
        .image_layout(attachment.layout)
        .load_op(attachment.load_op)
        .store_op(attachment.store_op)
        .clear_value(attachment.clear_value)
        .build()
}

fn access_type_for_layout(layout: vk::ImageLayout) -> AccessType {
    match layout {
        vk::ImageLayout::UNDEFINED => AccessType::Nothing,
        vk::ImageLayout::GENERAL => AccessType::General,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => AccessType::ColorAttachmentWrite,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => {
            AccessType::DepthStencilAttachmentWrite
        }
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
            AccessType::AnyShaderReadSampledImageOrUniformTexelBuffer
        }
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => AccessType::TransferRead,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => AccessType::TransferWrite,
        vk::ImageLayout::PRESENT_SRC_KHR => AccessType::Present,
        _ => panic!("No access type mapping for image layout: {:?}", layout),
    }
}
