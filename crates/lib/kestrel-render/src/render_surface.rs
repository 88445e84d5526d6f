use std::sync::Arc;
use std::time::Duration;

use ash::vk;

use kestrel_rhi::backend::{
    constants, CommandPool, Device, Fence, Image, Queue, RhiError, Semaphore, Surface, Swapchain,
};

/// One in-flight frame: which submission slot it uses, which swapchain
/// image it renders into, and the slot's synchronization handles.
pub struct Frame {
    pub current_frame: u32,
    pub image_index: u32,
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
}

/// Owns the swapchain and the N-buffered acquire/present machinery:
/// per-slot in-flight fences and acquire/finish semaphores.
pub struct RenderSurface {
    #[allow(dead_code)]
    surface: Arc<Surface>,
    swapchain: Swapchain,

    image_availables: Vec<Semaphore>,
    render_finisheds: Vec<Semaphore>,
    in_flight_fences: Vec<Fence>,

    current_frame: usize,
}

impl RenderSurface {
    pub fn create(
        device: &Arc<Device>,
        queue: &Queue,
        command_pool: &CommandPool,
        surface: Arc<Surface>,
        extent: [u32; 2],
        enable_vsync: bool,
    ) -> anyhow::Result<Self> {
        let swapchain = Swapchain::builder()
            .extent(extent)
            .enable_vsync(enable_vsync)
            .build(device, &surface)?;

        let buffering_count = buffering_count_for(swapchain.images().len());

        let mut image_availables = Vec::with_capacity(buffering_count);
        let mut render_finisheds = Vec::with_capacity(buffering_count);
        let mut in_flight_fences = Vec::with_capacity(buffering_count);
        for _ in 0..buffering_count {
            image_availables.push(Semaphore::create(device)?);
            render_finisheds.push(Semaphore::create(device)?);
            in_flight_fences.push(Fence::create_signaled(device)?);
        }

        // swapchain images are presentable from frame zero on
        let transition_cmb = command_pool.create_command_buffer(vk::CommandBufferLevel::PRIMARY)?;
        let transition_fence = Fence::create(device)?;

        transition_cmb.begin(true)?;
        for image in swapchain.images() {
            transition_cmb.transition_image_layout(
                image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::PRESENT_SRC_KHR,
            );
        }
        transition_cmb.end()?;
        transition_cmb.submit(queue, &[], &[], Some(&transition_fence))?;
        transition_fence.wait(None)?;

        Ok(Self {
            surface,
            swapchain,
            image_availables,
            render_finisheds,
            in_flight_fences,
            current_frame: 0,
        })
    }

    pub fn buffering_count(&self) -> usize {
        self.in_flight_fences.len()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub fn images(&self) -> &[Image] {
        self.swapchain.images()
    }

    pub fn in_flight_fence(&self, slot: u32) -> &Fence {
        &self.in_flight_fences[slot as usize]
    }

    /// Wait for the slot's previous submission, then acquire the next
    /// swapchain image. An out-of-date swapchain or an acquire timeout is
    /// surfaced as a recoverable error.
    ///
    /// The fence reset happens after a successful acquire: a reset fence
    /// with no submission to re-signal it would deadlock the slot's next
    /// wait when the frame is skipped.
    pub fn begin_frame(&mut self) -> anyhow::Result<Frame, RhiError> {
        let slot = self.current_frame;

        let in_flight = &self.in_flight_fences[slot];
        in_flight.wait(None)?;

        let (image_index, _suboptimal) = self.swapchain.acquire_next_image(
            Duration::from_nanos(constants::ACQUIRE_IMAGE_TIMEOUT_NS),
            &self.image_availables[slot],
        )?;

        in_flight.reset()?;

        Ok(Frame {
            current_frame: slot as u32,
            image_index,
            image_available: self.image_availables[slot].raw,
            render_finished: self.render_finisheds[slot].raw,
        })
    }

    /// Queue the presentation of the frame's image and advance to the
    /// next submission slot.
    pub fn present_frame(&mut self, queue: &Queue, frame: Frame) -> anyhow::Result<(), RhiError> {
        queue.present(
            &self.swapchain,
            std::slice::from_ref(&frame.render_finished),
            frame.image_index,
        )?;

        self.current_frame = next_frame_index(self.current_frame, self.buffering_count());
        Ok(())
    }
}

fn buffering_count_for(image_count: usize) -> usize {
    image_count.min(constants::MAX_FRAMES_IN_FLIGHT)
}

fn next_frame_index(current: usize, buffering_count: usize) -> usize {
    (current + 1) % buffering_count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffering_count_is_capped() {
        assert_eq!(buffering_count_for(2), 2);
        assert_eq!(buffering_count_for(3), 3);
        assert_eq!(buffering_count_for(5), 3);
    }

    #[test]
    fn frame_index_cycles_through_slots() {
        let mut current = 0;
        let mut sequence = Vec::new();
        for _ in 0..10 {
            sequence.push(current);
            current = next_frame_index(current, 3);
        }

        assert_eq!(sequence, vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0]);
    }
}
