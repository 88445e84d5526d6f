mod application;

pub use application::{Application, ApplicationConfig};

pub use kestrel_fg::FrameGraph;
pub use kestrel_log::{LevelFilter, LogConfig};

/// Initialize kestrel engine.
pub fn init(config: LogConfig) {
    kestrel_log::init_log(config);
}

/// Shutdown kestrel engine.
pub fn shutdown() {}
