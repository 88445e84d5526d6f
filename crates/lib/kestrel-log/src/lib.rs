use std::path::PathBuf;

use fern::colors::{Color, ColoredLevelConfig};

pub use log::LevelFilter;

/// Targets owned by the GPU-facing crates. They trace every object
/// creation and barrier, so they get their own level knob.
const GPU_TARGETS: [&str; 2] = ["kestrel_rhi", "kestrel_render"];

/// Log configuration.
pub struct LogConfig {
    /// Base level for engine and application targets.
    pub level: LevelFilter,
    /// Level for the GPU layers (see [`GPU_TARGETS`]).
    pub gpu_level: LevelFilter,
    /// Mirror everything into this file when set.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: if cfg!(debug_assertions) {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            },
            gpu_level: LevelFilter::Info,
            file: Some(PathBuf::from("kestrel.log")),
        }
    }
}

/// Initialize log module.
pub fn init_log(config: LogConfig) {
    setup_logger(&config).expect("Failed to initialize log module!");

    log::info!("log initialized!");
}

fn setup_logger(config: &LogConfig) -> anyhow::Result<()> {
    // setup colors
    let colors = ColoredLevelConfig::new()
        .trace(Color::White)
        .debug(Color::Magenta)
        .info(Color::Cyan)
        .warn(Color::Yellow)
        .error(Color::Red);

    // the render thread logs concurrently with the event loop thread,
    // so every console line carries the thread it came from
    let console_output = fern::Dispatch::new()
        .format(move |out, message, record| {
            let thread = std::thread::current();
            out.finish(format_args!(
                "{}[{}][{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                thread.name().unwrap_or("<unnamed>"),
                record.target(),
                colors.color(record.level()),
                message
            ))
        })
        .chain(std::io::stdout());

    let mut dispatch = fern::Dispatch::new().level(config.level);
    for target in GPU_TARGETS {
        dispatch = dispatch.level_for(target, config.gpu_level);
    }
    dispatch = dispatch.chain(console_output);

    if let Some(path) = &config.file {
        let file_output = fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "{}[{}][{}] {}",
                    chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                    record.target(),
                    record.level(),
                    message
                ))
            })
            .chain(fern::log_file(path)?);

        dispatch = dispatch.chain(file_output);
    }

    dispatch.apply()?;
    Ok(())
}
