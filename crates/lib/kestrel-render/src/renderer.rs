use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use ash::vk;
use parking_lot::Mutex;

use kestrel_fg::{BakedFrameGraph, FrameGraph, FramePool};
use kestrel_rhi::backend::{
    enumerate_physical_devices, required_instance_extensions, CommandBuffer, CommandPool, Device,
    Instance, PhysicalDevice, Queue, RhiError, Surface,
};

use crate::render_surface::{Frame, RenderSurface};

const BASE_EXTENSIONS: [&str; 1] = ["VK_KHR_maintenance3"];

const SWAPCHAIN_EXTENSIONS: [&str; 1] = ["VK_KHR_swapchain"];

const RAYTRACING_EXTENSIONS: [&str; 7] = [
    "VK_KHR_ray_tracing_pipeline",
    "VK_KHR_acceleration_structure",
    "VK_KHR_buffer_device_address",
    "VK_KHR_deferred_host_operations",
    "VK_EXT_descriptor_indexing",
    "VK_KHR_spirv_1_4",
    "VK_KHR_shader_float_controls",
];

#[derive(Clone)]
pub struct RendererConfig {
    pub application_name: String,
    pub enable_vsync: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: String::from("Kestrel"),
            enable_vsync: true,
        }
    }
}

/// Owns the GPU device and the render thread. The main thread hands over
/// new frame descriptions through [`Renderer::render_frame`]; the render
/// thread bakes, executes and presents them.
pub struct Renderer {
    device: Arc<Device>,

    frame_graph: Arc<Mutex<FrameGraph>>,
    rebuild_graph: Arc<AtomicBool>,
    stop_token: Arc<AtomicBool>,

    render_thread: Option<JoinHandle<()>>,
}

impl Renderer {
    pub fn new(config: RendererConfig, window: &winit::window::Window) -> anyhow::Result<Self> {
        glog::info!("Initializing Renderer");

        let instance = Instance::builder()
            .application_name(config.application_name.as_str())
            .require_extensions(required_instance_extensions(window)?)
            .build()?;

        let surface = Arc::new(Surface::create_from_window(&instance, window)?);

        let physical_devices = enumerate_physical_devices(&instance);
        let physical_device = Arc::new(
            pick_physical_device(physical_devices, &surface).ok_or(RhiError::NoSuitableDevice)?,
        );
        glog::info!("Using physical device {}", physical_device.name());

        let device = Device::builder().build(&physical_device)?;
        let queue = Queue::create(&device, device.graphics_queue_family());
        let command_pool = CommandPool::create(&device)?;

        let window_extent = window.inner_size();
        let render_surface = RenderSurface::create(
            &device,
            &queue,
            &command_pool,
            surface,
            [window_extent.width, window_extent.height],
            config.enable_vsync,
        )?;

        let frame_graph = Arc::new(Mutex::new(FrameGraph::new()));
        let rebuild_graph = Arc::new(AtomicBool::new(false));
        let stop_token = Arc::new(AtomicBool::new(false));

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: render_surface.extent(),
        };

        let thread = RenderThread {
            device: device.clone(),
            queue,
            command_pool,
            surface: render_surface,
            frame_pool: FramePool::new(),
            framegraphs: Vec::new(),
            command_buffers: Vec::new(),
            render_area,

            frame_graph: frame_graph.clone(),
            rebuild_graph: rebuild_graph.clone(),
            stop_token: stop_token.clone(),
        };

        let render_thread = std::thread::Builder::new()
            .name("RenderThread".into())
            .spawn(move || thread.run())?;

        Ok(Self {
            device,
            frame_graph,
            rebuild_graph,
            stop_token,
            render_thread: Some(render_thread),
        })
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Repopulate the frame graph registry with the user's frame builder
    /// callback and tell the render thread to re-bake. Runs under the
    /// framegraph mutex; the render thread observes the new registry at
    /// its next rebuild check.
    pub fn render_frame(&self, build_frame: &mut dyn FnMut(&mut FrameGraph)) {
        let mut frame_graph = self.frame_graph.lock();

        frame_graph.reset();
        build_frame(&mut frame_graph);

        self.rebuild_graph.store(true, Ordering::Release);
    }

    /// Cooperatively stop the render thread, join it and drain the GPU.
    pub fn stop_rendering(&mut self) {
        self.stop_token.store(true, Ordering::Release);

        if let Some(render_thread) = self.render_thread.take() {
            render_thread.join().expect("Render thread panicked!");
        }

        self.device.wait_idle();
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.stop_rendering();
    }
}

/// Everything the render thread exclusively owns: surface, pool, blit
/// command buffers and one baked frame graph per submission slot.
///
/// Field order doubles as drop order: command buffers must go before the
/// pool they were allocated from.
struct RenderThread {
    device: Arc<Device>,
    queue: Queue,
    surface: RenderSurface,
    frame_pool: FramePool,
    framegraphs: Vec<Option<BakedFrameGraph>>,
    command_buffers: Vec<CommandBuffer>,
    command_pool: CommandPool,
    render_area: vk::Rect2D,

    frame_graph: Arc<Mutex<FrameGraph>>,
    rebuild_graph: Arc<AtomicBool>,
    stop_token: Arc<AtomicBool>,
}

impl RenderThread {
    fn run(mut self) {
        let buffering_count = self.surface.buffering_count();

        self.command_buffers = self
            .command_pool
            .create_command_buffers(buffering_count as u32, vk::CommandBufferLevel::PRIMARY)
            .expect("Failed to create blit command buffers!");
        self.framegraphs.resize_with(buffering_count, || None);

        loop {
            if self.stop_token.load(Ordering::Acquire) {
                break;
            }

            let frame = match self.surface.begin_frame() {
                Ok(frame) => frame,
                Err(RhiError::SwapchainOutOfDate) | Err(RhiError::AcquireTimeout) => {
                    // skip this frame, force a rebuild
                    glog::warn!("Swapchain image unavailable, skipping frame!");
                    self.rebuild_graph.store(true, Ordering::Release);
                    continue;
                }
                Err(err) => panic!("Failed to begin frame: {}", err),
            };

            if let Err(err) = self.do_render(&frame) {
                panic!("Failed to render frame: {}", err);
            }

            self.surface
                .present_frame(&self.queue, frame)
                .expect("Failed to present frame!");
        }

        // drain outstanding GPU work before tearing anything down
        self.device.wait_idle();

        for baked in self.framegraphs.drain(..) {
            if let Some(baked) = baked {
                self.frame_pool.recycle_frame(baked);
            }
        }
        self.frame_pool.clean(&self.device);
    }

    fn do_render(&mut self, frame: &Frame) -> anyhow::Result<(), RhiError> {
        let slot = frame.current_frame as usize;

        if self.rebuild_graph.load(Ordering::Acquire) {
            let mut frame_graph = self.frame_graph.lock();

            // retire every slot's physical resources; their submissions
            // must have completed before the pool may own them
            for baked in self.framegraphs.iter_mut() {
                if let Some(baked) = baked.take() {
                    baked.wait_done()?;
                    self.frame_pool.recycle_frame(baked);
                }
            }

            frame_graph.bake().expect("Failed to bake the frame graph!");

            self.rebuild_graph.store(false, Ordering::Release);
        }

        if self.framegraphs[slot].is_none() {
            let mut frame_graph = self.frame_graph.lock();

            if !frame_graph.baked() {
                // no frame has been described yet, keep the slot's
                // synchronization ticking until the first build arrives
                drop(frame_graph);
                return self.submit_empty_frame(frame);
            }

            let baked = frame_graph.make_frame(
                &self.device,
                &self.queue,
                &self.command_pool,
                &mut self.frame_pool,
                self.render_area,
            )?;
            self.framegraphs[slot] = Some(baked);
        }

        let framegraph = self.framegraphs[slot].as_ref().unwrap();
        let semaphore = framegraph.execute(&self.queue)?;

        let backbuffer = framegraph.backbuffer();
        let present_image = &self.surface.images()[frame.image_index as usize];
        let blit_cmb = &self.command_buffers[slot];

        blit_cmb.reset()?;
        blit_cmb.begin(true)?;
        blit_cmb.transition_image_layout(
            backbuffer,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        blit_cmb.transition_image_layout(
            present_image,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        blit_cmb.blit_image(
            backbuffer,
            present_image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::Filter::LINEAR,
        );
        blit_cmb.transition_image_layout(
            backbuffer,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        blit_cmb.transition_image_layout(
            present_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
        blit_cmb.end()?;

        blit_cmb.submit(
            &self.queue,
            &[
                (semaphore, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT),
                (frame.image_available, vk::PipelineStageFlags::TRANSFER),
            ],
            std::slice::from_ref(&frame.render_finished),
            Some(self.surface.in_flight_fence(frame.current_frame)),
        )?;

        Ok(())
    }

    /// Consume the frame's acquire semaphore and re-signal the slot with
    /// an empty submission, so presentation stays well-ordered while
    /// there is nothing to draw.
    fn submit_empty_frame(&self, frame: &Frame) -> anyhow::Result<(), RhiError> {
        let blit_cmb = &self.command_buffers[frame.current_frame as usize];

        blit_cmb.reset()?;
        blit_cmb.begin(true)?;
        blit_cmb.end()?;

        blit_cmb.submit(
            &self.queue,
            &[(frame.image_available, vk::PipelineStageFlags::TOP_OF_PIPE)],
            std::slice::from_ref(&frame.render_finished),
            Some(self.surface.in_flight_fence(frame.current_frame)),
        )?;

        Ok(())
    }
}

fn pick_physical_device(
    physical_devices: Vec<PhysicalDevice>,
    surface: &Surface,
) -> Option<PhysicalDevice> {
    physical_devices
        .into_iter()
        .filter(|physical_device| {
            if !physical_device.check_extension_support(&BASE_EXTENSIONS) {
                glog::debug!(
                    "Base required extensions not supported for GPU {}",
                    physical_device.name()
                );
                return false;
            }
            if !physical_device.check_extension_support(&SWAPCHAIN_EXTENSIONS) {
                glog::debug!(
                    "Swapchain required extensions not supported for GPU {}",
                    physical_device.name()
                );
                return false;
            }
            if !physical_device.supports_presentation(surface) {
                glog::debug!("No presentable graphics queue on GPU {}", physical_device.name());
                return false;
            }
            true
        })
        .map(|physical_device| {
            let score = score_physical_device(&physical_device);

            let properties = &physical_device.properties;
            glog::debug!(
                "Scoring for {}\n    device id:      {:#06x}\n    vendor id:      {:#06x}\n    api version:    {}.{}.{}\n    driver version: {}\n    type:           {:?}\n    score:          {}",
                physical_device.name(),
                properties.device_id,
                properties.vendor_id,
                vk::api_version_major(properties.api_version),
                vk::api_version_minor(properties.api_version),
                vk::api_version_patch(properties.api_version),
                properties.driver_version,
                properties.device_type,
                score,
            );

            (score, physical_device)
        })
        .max_by_key(|(score, _)| *score)
        .map(|(_, physical_device)| physical_device)
}

/// Deterministic device score: device type dominates, then raw limits,
/// then a weighted api version, plus a bonus for raytracing support.
fn score_physical_device(physical_device: &PhysicalDevice) -> u64 {
    let properties = &physical_device.properties;
    let limits = &properties.limits;

    let type_weight: u64 = match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10_000_000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 5_000_000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 2_000_000,
        _ => 0,
    };

    let api_weight = u64::from(vk::api_version_major(properties.api_version)) * 1_000
        + u64::from(vk::api_version_minor(properties.api_version)) * 100
        + u64::from(vk::api_version_patch(properties.api_version));

    let raytracing_bonus: u64 = if physical_device.check_extension_support(&RAYTRACING_EXTENSIONS)
    {
        1_000_000
    } else {
        0
    };

    type_weight
        + u64::from(limits.max_image_dimension1_d)
        + u64::from(limits.max_image_dimension2_d)
        + u64::from(limits.max_image_dimension3_d)
        + u64::from(limits.max_image_dimension_cube)
        + u64::from(limits.max_uniform_buffer_range)
        + api_weight
        + raytracing_bonus
}
