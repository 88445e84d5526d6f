mod graph;
mod compiled_frame;
mod baked_frame;

mod resource;
mod task;

mod frame_pool;

pub use graph::FrameGraph;
pub use compiled_frame::{
    Attachment, AttachmentRef, BufferInfo, CompiledFrame, ImageInfo, ImageViewInfo,
    ImageWriteInfo, Pass, RenderPassData, Subpass,
};
pub use baked_frame::BakedFrameGraph;
pub use frame_pool::FramePool;
pub use resource::{
    BufferCreateDescription, BufferReadDescription, GraphId, ImageCreateDescription,
    ImageReadDescription, ImageWriteDescription, INVALID_ID,
};
pub use task::{GraphTaskBuilder, TaskInfo, TaskType};

extern crate log as glog;
