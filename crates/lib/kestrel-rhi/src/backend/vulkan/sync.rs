use std::time::Duration;

use ash::vk;

use super::{Device, RhiError};

pub struct Fence {
    pub raw: vk::Fence,
    device: ash::Device,
}

impl Fence {
    pub fn create(device: &Device) -> anyhow::Result<Self, RhiError> {
        Self::new(device, vk::FenceCreateFlags::empty())
    }

    /// Create a fence that starts out signaled, so the first wait on it
    /// returns immediately.
    pub fn create_signaled(device: &Device) -> anyhow::Result<Self, RhiError> {
        Self::new(device, vk::FenceCreateFlags::SIGNALED)
    }

    fn new(device: &Device, flags: vk::FenceCreateFlags) -> anyhow::Result<Self, RhiError> {
        let fence_ci = vk::FenceCreateInfo::builder().flags(flags).build();
        let raw = unsafe { device.raw.create_fence(&fence_ci, None)? };

        Ok(Self {
            raw,
            device: device.raw.clone(),
        })
    }

    pub fn wait(&self, timeout: Option<Duration>) -> anyhow::Result<(), RhiError> {
        let timeout = timeout.map(|d| d.as_nanos() as u64).unwrap_or(u64::MAX);

        unsafe {
            self.device
                .wait_for_fences(std::slice::from_ref(&self.raw), true, timeout)?
        };
        Ok(())
    }

    pub fn reset(&self) -> anyhow::Result<(), RhiError> {
        unsafe { self.device.reset_fences(std::slice::from_ref(&self.raw))? };
        Ok(())
    }

    pub fn is_signaled(&self) -> anyhow::Result<bool, RhiError> {
        Ok(unsafe { self.device.get_fence_status(self.raw)? })
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.raw, None);
        }
    }
}

pub struct Semaphore {
    pub raw: vk::Semaphore,
    device: ash::Device,
}

impl Semaphore {
    pub fn create(device: &Device) -> anyhow::Result<Self, RhiError> {
        let raw = unsafe {
            device
                .raw
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };

        Ok(Self {
            raw,
            device: device.raw.clone(),
        })
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.raw, None);
        }
    }
}
