use std::collections::HashMap;

use ash::vk;

use kestrel_rhi::backend::{
    is_depth_format, is_depth_stencil_format, BufferDesc, ClearValue, ImageDesc,
};

use crate::graph::{FrameGraph, GraphNode};
use crate::resource::GraphId;
use crate::task::TaskType;

/// The plan: an ordered, culled sequence of passes annotated with the
/// physical descriptors needed to allocate and record a frame.
pub struct CompiledFrame {
    pub passes: Vec<Pass>,
    pub fingerprint: u64,
    pub backbuffer: GraphId,
}

pub struct Pass {
    pub id: GraphId,
    pub name: String,
    pub ty: TaskType,
    pub renderpass: RenderPassData,
    /// Transient images this pass creates.
    pub images: Vec<ImageInfo>,
    /// Transient buffers this pass creates.
    pub buffers: Vec<BufferInfo>,
    pub reads: Vec<ImageViewInfo>,
    pub writes: Vec<ImageWriteInfo>,
}

pub struct RenderPassData {
    pub attachments: Vec<Attachment>,
    pub subpass: Subpass,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub resource: GraphId,
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub stencil_load_op: vk::AttachmentLoadOp,
    pub stencil_store_op: vk::AttachmentStoreOp,
    pub src_layout: vk::ImageLayout,
    pub dst_layout: vk::ImageLayout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentRef {
    pub attachment: u32,
    pub layout: vk::ImageLayout,
}

pub struct Subpass {
    pub bind_point: vk::PipelineBindPoint,
    pub color_refs: Vec<AttachmentRef>,
    pub depth_ref: Option<AttachmentRef>,
}

pub struct ImageInfo {
    pub id: GraphId,
    pub name: String,
    pub desc: ImageDesc,
    pub clear_value: ClearValue,
}

pub struct BufferInfo {
    pub id: GraphId,
    pub name: String,
    pub desc: BufferDesc,
}

#[derive(Clone, Copy, Debug)]
pub struct ImageViewInfo {
    pub id: GraphId,
    pub image: GraphId,
    pub view_type: vk::ImageViewType,
}

#[derive(Clone, Copy, Debug)]
pub struct ImageWriteInfo {
    pub id: GraphId,
    pub image: GraphId,
    pub view_type: vk::ImageViewType,
    pub clear_value: Option<ClearValue>,
    /// Load the previous contents instead of clearing; set when the same
    /// task also reads the image.
    pub load: bool,
}

pub(crate) fn build_compiled_frame(
    graph: &FrameGraph,
    sorted: &[GraphId],
    fingerprint: u64,
) -> CompiledFrame {
    let mut layouts: HashMap<GraphId, vk::ImageLayout> = HashMap::new();

    let passes = sorted
        .iter()
        .map(|&task_id| build_pass(graph, task_id, &mut layouts))
        .collect();

    CompiledFrame {
        passes,
        fingerprint,
        backbuffer: graph.backbuffer,
    }
}

fn build_pass(
    graph: &FrameGraph,
    task_id: GraphId,
    layouts: &mut HashMap<GraphId, vk::ImageLayout>,
) -> Pass {
    let task = graph.task_node(task_id);

    let image_creates: Vec<GraphId> = task
        .creates
        .iter()
        .copied()
        .filter(|&id| matches!(&graph.nodes[id.index()], GraphNode::ImageCreate { .. }))
        .collect();

    let image_reads: Vec<GraphId> = task
        .reads
        .iter()
        .copied()
        .filter(|&id| matches!(&graph.nodes[id.index()], GraphNode::ImageRead { .. }))
        .collect();

    Pass {
        id: task_id,
        name: task.name.clone(),
        ty: task.ty,
        renderpass: build_renderpass_physical_description(
            graph,
            task_id,
            &image_creates,
            &image_reads,
            layouts,
        ),
        images: build_image_physical_descriptions(graph, &image_creates),
        buffers: build_buffer_physical_descriptions(graph, task_id),
        reads: image_reads
            .iter()
            .map(|&id| match &graph.nodes[id.index()] {
                GraphNode::ImageRead { desc, .. } => ImageViewInfo {
                    id,
                    image: desc.image,
                    view_type: desc.view_type,
                },
                _ => unreachable!(),
            })
            .collect(),
        writes: build_image_write_infos(graph, task_id, &image_reads, layouts),
    }
}

/// Derive the concrete image descriptions (usage flags included) for the
/// transient images this task creates.
fn build_image_physical_descriptions(graph: &FrameGraph, image_creates: &[GraphId]) -> Vec<ImageInfo> {
    image_creates
        .iter()
        .filter_map(|&id| {
            let desc = graph.image_create(id);
            if !desc.transient {
                // non-transient resources are externally retained
                return None;
            }

            let mut usages = desc.usages.unwrap_or_else(|| {
                if is_depth_format(desc.format) || is_depth_stencil_format(desc.format) {
                    vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC
                } else {
                    vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC
                }
            });

            // the backbuffer is always a blit source
            if id == graph.backbuffer {
                usages |= vk::ImageUsageFlags::TRANSFER_SRC;
            }

            let clear_value = desc.clear_value.unwrap_or_else(|| {
                if is_depth_format(desc.format) || is_depth_stencil_format(desc.format) {
                    ClearValue::DepthStencil {
                        depth: 1.0,
                        stencil: 0,
                    }
                } else {
                    ClearValue::default()
                }
            });

            Some(ImageInfo {
                id,
                name: desc.name.clone(),
                desc: ImageDesc {
                    extent: desc.extent,
                    format: desc.format,
                    image_type: desc.image_type,
                    array_elements: desc.layers,
                    ..Default::default()
                }
                .usage_flags(usages),
                clear_value,
            })
        })
        .collect()
}

fn build_buffer_physical_descriptions(graph: &FrameGraph, task_id: GraphId) -> Vec<BufferInfo> {
    graph
        .task_node(task_id)
        .creates
        .iter()
        .filter_map(|&id| match &graph.nodes[id.index()] {
            GraphNode::BufferCreate { desc, .. } if desc.transient => Some(BufferInfo {
                id,
                name: desc.name.clone(),
                desc: BufferDesc::new(
                    desc.size,
                    vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::STORAGE_BUFFER,
                ),
            }),
            _ => None,
        })
        .collect()
}

fn build_image_write_infos(
    graph: &FrameGraph,
    task_id: GraphId,
    image_reads: &[GraphId],
    layouts: &HashMap<GraphId, vk::ImageLayout>,
) -> Vec<ImageWriteInfo> {
    let read_images: Vec<GraphId> = image_reads
        .iter()
        .map(|&id| match &graph.nodes[id.index()] {
            GraphNode::ImageRead { desc, .. } => desc.image,
            _ => unreachable!(),
        })
        .collect();

    graph
        .task_node(task_id)
        .writes
        .iter()
        .filter_map(|&id| match &graph.nodes[id.index()] {
            // a write whose target never materialized (creator culled)
            // has nothing to record into
            GraphNode::ImageWrite { desc, .. } if layouts.contains_key(&desc.image) => {
                Some(ImageWriteInfo {
                    id,
                    image: desc.image,
                    view_type: desc.view_type,
                    clear_value: desc.clear_value,
                    load: read_images.contains(&desc.image),
                })
            }
            _ => None,
        })
        .collect()
}

/// Synthesize the attachment and subpass descriptions of one task.
///
/// The layout map is threaded through in creates -> writes -> reads
/// order; the emitted attachment order is creates, reads, writes, with
/// an id appearing in both reads and writes emitted once by the reads
/// walk (store upgraded to STORE).
fn build_renderpass_physical_description(
    graph: &FrameGraph,
    task_id: GraphId,
    image_creates: &[GraphId],
    image_reads: &[GraphId],
    layouts: &mut HashMap<GraphId, vk::ImageLayout>,
) -> RenderPassData {
    let task = graph.task_node(task_id);

    let write_images: Vec<GraphId> = task
        .writes
        .iter()
        .filter_map(|&id| match &graph.nodes[id.index()] {
            GraphNode::ImageWrite { desc, .. } => Some(desc.image),
            _ => None,
        })
        .collect();

    let read_images: Vec<GraphId> = image_reads
        .iter()
        .map(|&id| match &graph.nodes[id.index()] {
            GraphNode::ImageRead { desc, .. } => desc.image,
            _ => unreachable!(),
        })
        .collect();

    let creates: Vec<Attachment> = image_creates
        .iter()
        .map(|&id| {
            let desc = graph.image_create(id);

            let mut attachment = Attachment {
                resource: id,
                format: desc.format,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                src_layout: vk::ImageLayout::UNDEFINED,
                dst_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            };

            if is_depth_stencil_format(desc.format) || is_depth_format(desc.format) {
                std::mem::swap(&mut attachment.load_op, &mut attachment.stencil_load_op);
                std::mem::swap(&mut attachment.store_op, &mut attachment.stencil_store_op);
                attachment.dst_layout = vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
            }

            layouts.insert(id, attachment.dst_layout);
            attachment
        })
        .collect();

    let writes: Vec<Attachment> = write_images
        .iter()
        .filter_map(|&id| {
            // an id in both reads and writes is emitted by the reads walk;
            // a target whose creator was culled has no layout to chain from
            if read_images.contains(&id) || !layouts.contains_key(&id) {
                return None;
            }

            let desc = graph.image_create(id);
            let current_layout = layouts[&id];

            let mut attachment = Attachment {
                resource: id,
                format: desc.format,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                src_layout: current_layout,
                dst_layout: current_layout,
            };

            if is_depth_stencil_format(desc.format) || is_depth_format(desc.format) {
                std::mem::swap(&mut attachment.load_op, &mut attachment.stencil_load_op);
                std::mem::swap(&mut attachment.store_op, &mut attachment.stencil_store_op);
                attachment.dst_layout = vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
            }

            layouts.insert(id, attachment.dst_layout);
            Some(attachment)
        })
        .collect();

    let reads: Vec<Attachment> = read_images
        .iter()
        .filter_map(|&id| {
            if !layouts.contains_key(&id) {
                return None;
            }

            let desc = graph.image_create(id);
            let current_layout = layouts[&id];

            let mut attachment = Attachment {
                resource: id,
                format: desc.format,
                load_op: vk::AttachmentLoadOp::LOAD,
                store_op: vk::AttachmentStoreOp::DONT_CARE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                src_layout: current_layout,
                dst_layout: current_layout,
            };

            if write_images.contains(&id) {
                attachment.store_op = vk::AttachmentStoreOp::STORE;
            }

            if is_depth_stencil_format(desc.format) || is_depth_format(desc.format) {
                std::mem::swap(&mut attachment.load_op, &mut attachment.stencil_load_op);
                std::mem::swap(&mut attachment.store_op, &mut attachment.stencil_store_op);
                attachment.dst_layout = vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
            }

            layouts.insert(id, attachment.dst_layout);
            Some(attachment)
        })
        .collect();

    let mut attachments = creates;
    attachments.extend(reads);
    attachments.extend(writes);

    let mut color_refs = Vec::with_capacity(attachments.len());
    let mut depth_ref = None;

    for (index, attachment) in attachments.iter().enumerate() {
        let reference = AttachmentRef {
            attachment: index as u32,
            layout: attachment.dst_layout,
        };

        if is_depth_format(attachment.format) {
            depth_ref = Some(reference);
        } else {
            color_refs.push(reference);
        }
    }

    // TODO support multiple subpasses
    let subpass = Subpass {
        bind_point: if task.ty == TaskType::Raster {
            vk::PipelineBindPoint::GRAPHICS
        } else {
            vk::PipelineBindPoint::COMPUTE
        },
        color_refs,
        depth_ref,
    };

    RenderPassData {
        attachments,
        subpass,
    }
}
