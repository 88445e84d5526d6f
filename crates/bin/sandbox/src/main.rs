// use log macros.
#[macro_use]
extern crate log as _log;

use ash::vk;

use kestrel_engine::{Application, ApplicationConfig, LogConfig};
use kestrel_fg::{GraphId, ImageCreateDescription};
use kestrel_rhi::backend::ClearValue;

const WINDOW_EXTENT: [u32; 2] = [800, 600];

#[derive(Default)]
struct TrianglePass {
    backbuffer: GraphId,
}

fn main() -> anyhow::Result<()> {
    kestrel_engine::init(LogConfig::default());

    info!("Starting sandbox");

    let mut app = Application::new(ApplicationConfig {
        application_name: String::from("Sandbox"),
        window_title: String::from("Kestrel Sandbox: Triangle"),
        window_extent: WINDOW_EXTENT,
        ..Default::default()
    })?;

    app.set_build_frame(|graph| {
        graph.add_raster_task::<TrianglePass, _, _>(
            "render",
            |data, builder| {
                data.backbuffer = builder.create_image(ImageCreateDescription {
                    clear_value: Some(ClearValue::Color([0.0, 0.0, 0.0, 1.0])),
                    ..ImageCreateDescription::new_2d(
                        "backbuffer",
                        WINDOW_EXTENT,
                        vk::Format::R8G8B8A8_UNORM,
                    )
                });
                builder.write_image(data.backbuffer, vk::ImageViewType::TYPE_2D, None);
                builder.set_backbuffer(data.backbuffer);
            },
            |_, cmb| {
                cmb.draw(3);
            },
        );
    });

    app.run()
}
