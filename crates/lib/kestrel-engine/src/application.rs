use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

use kestrel_fg::FrameGraph;
use kestrel_render::{Renderer, RendererConfig};

pub struct ApplicationConfig {
    pub application_name: String,
    pub window_title: String,
    pub window_extent: [u32; 2],
    pub enable_vsync: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            application_name: String::from("Kestrel"),
            window_title: String::from("Kestrel"),
            window_extent: [1280, 720],
            enable_vsync: true,
        }
    }
}

type BuildFrameFn = Box<dyn FnMut(&mut FrameGraph)>;

/// Top-level composition: the window, the renderer and the user's frame
/// builder callback, driven by the window's event loop.
pub struct Application {
    event_loop: Option<EventLoop<()>>,
    window: Window,
    renderer: Option<Renderer>,
    build_frame: Option<BuildFrameFn>,
}

impl Application {
    pub fn new(config: ApplicationConfig) -> anyhow::Result<Self> {
        let event_loop = EventLoop::new();

        // swapchain recreation on resize is not supported, keep the
        // window extent fixed
        let window = WindowBuilder::new()
            .with_title(config.window_title.as_str())
            .with_inner_size(PhysicalSize::new(
                config.window_extent[0],
                config.window_extent[1],
            ))
            .with_resizable(false)
            .build(&event_loop)?;

        let renderer = Renderer::new(
            RendererConfig {
                application_name: config.application_name,
                enable_vsync: config.enable_vsync,
            },
            &window,
        )?;

        Ok(Self {
            event_loop: Some(event_loop),
            window,
            renderer: Some(renderer),
            build_frame: None,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Register the callback that repopulates the frame graph registry.
    /// It is invoked under the framegraph mutex once per event loop tick.
    pub fn set_build_frame(&mut self, build_frame: impl FnMut(&mut FrameGraph) + 'static) {
        self.build_frame = Some(Box::new(build_frame));
    }

    /// Run the event loop until the window closes. The render thread is
    /// joined and the device drained on the way out.
    pub fn run(mut self) -> ! {
        let event_loop = self.event_loop.take().unwrap();

        event_loop.run(move |event, _, control_flow| {
            *control_flow = ControlFlow::Poll;

            match event {
                Event::WindowEvent {
                    event: WindowEvent::CloseRequested,
                    ..
                } => {
                    *control_flow = ControlFlow::Exit;
                }
                Event::MainEventsCleared => {
                    self.render_frame();
                }
                Event::LoopDestroyed => {
                    log::info!("Window closed, shutting down renderer");
                    // dropping the renderer stops and joins the render
                    // thread, then waits for the device to go idle
                    self.renderer.take();
                }
                _ => {}
            }
        })
    }

    fn render_frame(&mut self) {
        if let (Some(renderer), Some(build_frame)) = (&self.renderer, &mut self.build_frame) {
            renderer.render_frame(build_frame.as_mut());
        }
    }
}
