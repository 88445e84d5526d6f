mod render_surface;
mod renderer;

pub use render_surface::{Frame, RenderSurface};
pub use renderer::{Renderer, RendererConfig};

extern crate log as glog;
