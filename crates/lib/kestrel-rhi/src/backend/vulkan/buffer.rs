use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

use super::{Device, RhiError};

pub struct Buffer {
    pub raw: vk::Buffer,
    pub allocation: Allocation,
    pub desc: BufferDesc,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
}

impl BufferDesc {
    pub fn new(size: u64, usage: vk::BufferUsageFlags) -> Self {
        Self { size, usage }
    }
}

// implement buffer associated functions for device
impl Device {
    pub fn create_buffer(&self, desc: BufferDesc, name: &str) -> anyhow::Result<Buffer, RhiError> {
        let buffer_ci = vk::BufferCreateInfo::builder()
            .size(desc.size)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .build();

        let buffer = unsafe { self.raw.create_buffer(&buffer_ci, None)? };

        let requirements = unsafe { self.raw.get_buffer_memory_requirements(buffer) };

        let allocation = self
            .global_allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|err| RhiError::AllocationFailure {
                name: name.to_owned(),
                error: err,
            })?;

        unsafe {
            self.raw
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?
        };

        Ok(Buffer {
            raw: buffer,
            allocation,
            desc,
        })
    }

    pub fn destroy_buffer(&self, buffer: Buffer) {
        self.global_allocator
            .lock()
            .free(buffer.allocation)
            .expect("Failed to free vulkan buffer memory!");

        unsafe {
            self.raw.destroy_buffer(buffer.raw, None);
        }
    }
}
