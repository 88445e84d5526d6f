use std::any::Any;

use ash::vk;

use kestrel_rhi::backend::{ClearValue, CommandBuffer};

use crate::graph::{FrameGraph, GraphNode};
use crate::resource::{
    BufferCreateDescription, BufferReadDescription, GraphId, ImageCreateDescription,
    ImageReadDescription, ImageWriteDescription,
};

/// What kind of GPU work a task records.
///
/// Only `Raster` tasks are recorded today, the other branches are
/// reserved by the scheduler.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum TaskType {
    Raster,
    Compute,
    Transfer,
    RayTracing,
}

#[derive(Clone, Copy, Debug)]
pub struct TaskInfo<'a> {
    pub name: &'a str,
    pub ty: TaskType,
    pub cull_imune: bool,
}

impl<'a> TaskInfo<'a> {
    pub fn raster(name: &'a str) -> Self {
        Self {
            name,
            ty: TaskType::Raster,
            cull_imune: false,
        }
    }
}

pub(crate) struct TaskNode {
    pub name: String,
    pub ty: TaskType,
    pub cull_imune: bool,

    // two-level DAG edges: ids of the create/read/write description nodes
    pub creates: Vec<GraphId>,
    pub reads: Vec<GraphId>,
    pub writes: Vec<GraphId>,
}

impl TaskNode {
    pub(crate) fn new(info: TaskInfo<'_>) -> Self {
        Self {
            name: info.name.to_owned(),
            ty: info.ty,
            cull_imune: info.cull_imune,
            creates: Vec::new(),
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }
}

pub(crate) type ErasedExecuteFn = Box<dyn FnMut(&dyn Any, &CommandBuffer) + Send>;

/// Per-task user state plus the type-erased record callback.
/// Layout erasure goes through `Any`, never through raw bytes.
pub(crate) struct TaskPayload {
    pub data: Box<dyn Any + Send>,
    pub on_execute: ErasedExecuteFn,
}

/// Build-phase API scoped to one task: resources created, read or written
/// through this builder are automatically edged from the owning task.
pub struct GraphTaskBuilder<'fg> {
    pub(crate) graph: &'fg mut FrameGraph,
    pub(crate) task: GraphId,
}

impl<'fg> GraphTaskBuilder<'fg> {
    pub fn create_image(&mut self, desc: ImageCreateDescription) -> GraphId {
        let task = self.task;
        let id = self.graph.push_node(GraphNode::ImageCreate {
            desc,
            creator: task,
        });
        self.graph.task_node_mut(task).creates.push(id);
        id
    }

    pub fn create_buffer(&mut self, desc: BufferCreateDescription) -> GraphId {
        let task = self.task;
        let id = self.graph.push_node(GraphNode::BufferCreate {
            desc,
            creator: task,
        });
        self.graph.task_node_mut(task).creates.push(id);
        id
    }

    pub fn read_image(&mut self, image: GraphId, view_type: vk::ImageViewType) -> GraphId {
        let task = self.task;
        let id = self.graph.push_node(GraphNode::ImageRead {
            desc: ImageReadDescription { image, view_type },
            task,
        });
        self.graph.task_node_mut(task).reads.push(id);
        id
    }

    pub fn write_image(
        &mut self,
        image: GraphId,
        view_type: vk::ImageViewType,
        clear_value: Option<ClearValue>,
    ) -> GraphId {
        let task = self.task;
        let id = self.graph.push_node(GraphNode::ImageWrite {
            desc: ImageWriteDescription {
                image,
                view_type,
                clear_value,
            },
            task,
        });
        self.graph.task_node_mut(task).writes.push(id);
        id
    }

    pub fn read_buffer(&mut self, buffer: GraphId) -> GraphId {
        let task = self.task;
        let id = self.graph.push_node(GraphNode::BufferRead {
            desc: BufferReadDescription { buffer },
            task,
        });
        self.graph.task_node_mut(task).reads.push(id);
        id
    }

    /// Designate `image` as the final resource of the whole graph.
    pub fn set_backbuffer(&mut self, image: GraphId) {
        self.graph.set_backbuffer(image);
    }
}
