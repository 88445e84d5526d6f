use ash::vk;

use kestrel_fg::{FrameGraph, GraphId, ImageCreateDescription, TaskType};
use kestrel_rhi::backend::CommandBuffer;

#[derive(Default)]
struct RenderPassData {
    target: GraphId,
}

#[derive(Default)]
struct NoData;

fn noop_execute<D>(_: &D, _: &CommandBuffer) {}

fn single_triangle_graph() -> FrameGraph {
    let mut graph = FrameGraph::new();
    graph.add_raster_task::<RenderPassData, _, _>(
        "render",
        |data, builder| {
            data.target = builder.create_image(ImageCreateDescription::new_2d(
                "backbuffer",
                [800, 600],
                vk::Format::R8G8B8A8_UNORM,
            ));
            builder.set_backbuffer(data.target);
        },
        noop_execute,
    );
    graph
}

/// gen_gbuffer creates "gbuffer"; render reads it and writes "backbuffer".
fn gbuffer_graph() -> (FrameGraph, GraphId, GraphId, GraphId) {
    let mut graph = FrameGraph::new();

    let mut gbuffer = GraphId::default();
    let gen_task = graph.add_raster_task::<RenderPassData, _, _>(
        "gen_gbuffer",
        |data, builder| {
            data.target = builder.create_image(ImageCreateDescription::new_2d(
                "gbuffer",
                [800, 600],
                vk::Format::R8G8B8A8_UNORM,
            ));
            gbuffer = data.target;
        },
        noop_execute,
    );

    let render_task = graph.add_raster_task::<RenderPassData, _, _>(
        "render",
        |data, builder| {
            builder.read_image(gbuffer, vk::ImageViewType::TYPE_2D);
            data.target = builder.create_image(ImageCreateDescription::new_2d(
                "backbuffer",
                [800, 600],
                vk::Format::R8G8B8A8_UNORM,
            ));
            builder.write_image(data.target, vk::ImageViewType::TYPE_2D, None);
            builder.set_backbuffer(data.target);
        },
        noop_execute,
    );

    (graph, gen_task, render_task, gbuffer)
}

#[test]
fn single_triangle_bakes_to_one_pass() {
    let mut graph = single_triangle_graph();
    graph.bake().expect("bake should succeed");

    let compiled = graph.compiled().unwrap();
    assert_eq!(compiled.passes.len(), 1);

    let pass = &compiled.passes[0];
    assert_eq!(pass.name, "render");
    assert_eq!(pass.ty, TaskType::Raster);

    // exactly one color attachment, cleared and stored
    assert_eq!(pass.renderpass.attachments.len(), 1);
    let attachment = &pass.renderpass.attachments[0];
    assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
    assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
    assert_eq!(attachment.src_layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(
        attachment.dst_layout,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    );

    assert_eq!(pass.renderpass.subpass.color_refs.len(), 1);
    assert!(pass.renderpass.subpass.depth_ref.is_none());
    assert_eq!(
        pass.renderpass.subpass.bind_point,
        vk::PipelineBindPoint::GRAPHICS
    );

    // inferred usages: color attachment + blit source
    assert_eq!(pass.images.len(), 1);
    let usage = pass.images[0].desc.usage;
    assert!(usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
    assert!(usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
}

#[test]
fn gbuffer_read_orders_producer_first() {
    let (mut graph, gen_task, render_task, _) = gbuffer_graph();
    graph.bake().expect("bake should succeed");

    let compiled = graph.compiled().unwrap();
    assert_eq!(compiled.passes.len(), 2);
    assert_eq!(compiled.passes[0].id, gen_task);
    assert_eq!(compiled.passes[1].id, render_task);

    let gbuffer_info = &compiled.passes[0].images[0];
    assert_eq!(gbuffer_info.name, "gbuffer");
    assert!(gbuffer_info
        .desc
        .usage
        .contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
    assert!(gbuffer_info
        .desc
        .usage
        .contains(vk::ImageUsageFlags::TRANSFER_SRC));

    // the backbuffer is always a blit source
    let backbuffer_info = &compiled.passes[1].images[0];
    assert_eq!(backbuffer_info.name, "backbuffer");
    assert!(backbuffer_info
        .desc
        .usage
        .contains(vk::ImageUsageFlags::TRANSFER_SRC));
}

#[test]
fn creators_precede_readers() {
    let (mut graph, gen_task, render_task, _) = gbuffer_graph();
    graph.bake().unwrap();

    let compiled = graph.compiled().unwrap();
    let position_of = |id: GraphId| {
        compiled
            .passes
            .iter()
            .position(|pass| pass.id == id)
            .unwrap()
    };

    assert!(position_of(gen_task) < position_of(render_task));
}

#[test]
fn useless_reader_is_culled() {
    let (mut graph, gen_task, render_task, gbuffer) = gbuffer_graph();

    // reads the gbuffer but produces nothing that is kept alive
    graph.add_raster_task::<NoData, _, _>(
        "useless",
        |_, builder| {
            builder.read_image(gbuffer, vk::ImageViewType::TYPE_2D);
        },
        noop_execute,
    );

    graph.bake().expect("bake should succeed");

    let compiled = graph.compiled().unwrap();
    let names: Vec<&str> = compiled
        .passes
        .iter()
        .map(|pass| pass.name.as_str())
        .collect();

    assert_eq!(names, vec!["gen_gbuffer", "render"]);
    assert_eq!(compiled.passes[0].id, gen_task);
    assert_eq!(compiled.passes[1].id, render_task);
}

#[test]
fn imune_resource_keeps_creator_alive() {
    let mut graph = single_triangle_graph();

    // created, never read, but imune: the creator chain must survive
    graph.add_raster_task::<NoData, _, _>(
        "keeper",
        |_, builder| {
            builder.create_image(ImageCreateDescription {
                cull_imune: true,
                ..ImageCreateDescription::new_2d("history", [256, 256], vk::Format::R16G16B16A16_SFLOAT)
            });
        },
        noop_execute,
    );

    // created, never read, not imune: dropped together with its creator
    graph.add_raster_task::<NoData, _, _>(
        "orphan",
        |_, builder| {
            builder.create_image(ImageCreateDescription::new_2d(
                "scratch",
                [256, 256],
                vk::Format::R8G8B8A8_UNORM,
            ));
        },
        noop_execute,
    );

    graph.bake().unwrap();

    let names: Vec<&str> = graph
        .compiled()
        .unwrap()
        .passes
        .iter()
        .map(|pass| pass.name.as_str())
        .collect();

    assert!(names.contains(&"keeper"));
    assert!(names.contains(&"render"));
    assert!(!names.contains(&"orphan"));
}

#[test]
fn at_most_one_create_per_resource_in_plan() {
    let (mut graph, ..) = gbuffer_graph();
    graph.bake().unwrap();

    let mut seen = Vec::new();
    for pass in &graph.compiled().unwrap().passes {
        for info in &pass.images {
            assert!(!seen.contains(&info.id), "duplicate create for {:?}", info.id);
            seen.push(info.id);
        }
    }
}

#[test]
fn missing_backbuffer_fails_bake() {
    let mut graph = FrameGraph::new();
    graph.add_raster_task::<NoData, _, _>(
        "render",
        |_, builder| {
            builder.create_image(ImageCreateDescription::new_2d(
                "color",
                [800, 600],
                vk::Format::R8G8B8A8_UNORM,
            ));
        },
        noop_execute,
    );

    assert!(graph.bake().is_err());
}

#[test]
fn depth_attachment_swaps_op_pairs() {
    let mut graph = FrameGraph::new();
    graph.add_raster_task::<RenderPassData, _, _>(
        "geometry",
        |data, builder| {
            data.target = builder.create_image(ImageCreateDescription::new_2d(
                "color",
                [800, 600],
                vk::Format::R8G8B8A8_UNORM,
            ));
            builder.create_image(ImageCreateDescription::new_2d(
                "depth",
                [800, 600],
                vk::Format::D32_SFLOAT,
            ));
            builder.set_backbuffer(data.target);
        },
        noop_execute,
    );

    graph.bake().unwrap();

    let pass = &graph.compiled().unwrap().passes[0];
    assert_eq!(pass.renderpass.attachments.len(), 2);

    let depth = pass
        .renderpass
        .attachments
        .iter()
        .find(|attachment| attachment.format == vk::Format::D32_SFLOAT)
        .unwrap();
    assert_eq!(depth.load_op, vk::AttachmentLoadOp::DONT_CARE);
    assert_eq!(depth.stencil_load_op, vk::AttachmentLoadOp::CLEAR);
    assert_eq!(depth.stencil_store_op, vk::AttachmentStoreOp::STORE);
    assert_eq!(
        depth.dst_layout,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    );

    assert_eq!(pass.renderpass.subpass.color_refs.len(), 1);
    assert!(pass.renderpass.subpass.depth_ref.is_some());

    // depth usages are inferred separately from color ones
    let depth_info = pass
        .images
        .iter()
        .find(|info| info.name == "depth")
        .unwrap();
    assert!(depth_info
        .desc
        .usage
        .contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
}

#[test]
fn read_write_same_image_upgrades_store() {
    let mut graph = FrameGraph::new();

    let mut target = GraphId::default();
    graph.add_raster_task::<RenderPassData, _, _>(
        "gen",
        |data, builder| {
            data.target = builder.create_image(ImageCreateDescription::new_2d(
                "accum",
                [800, 600],
                vk::Format::R8G8B8A8_UNORM,
            ));
            target = data.target;
            builder.set_backbuffer(data.target);
        },
        noop_execute,
    );

    graph.add_raster_task::<NoData, _, _>(
        "feedback",
        |_, builder| {
            builder.read_image(target, vk::ImageViewType::TYPE_2D);
            builder.write_image(target, vk::ImageViewType::TYPE_2D, None);
        },
        noop_execute,
    );

    graph.bake().unwrap();

    let compiled = graph.compiled().unwrap();
    let feedback = compiled
        .passes
        .iter()
        .find(|pass| pass.name == "feedback")
        .unwrap();

    // the read-then-write target is emitted once, loaded and stored
    assert_eq!(feedback.renderpass.attachments.len(), 1);
    let attachment = &feedback.renderpass.attachments[0];
    assert_eq!(attachment.load_op, vk::AttachmentLoadOp::LOAD);
    assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);

    // and the execution-level write loads instead of clearing
    assert!(feedback.writes[0].load);
}

#[test]
fn fingerprint_is_stable_across_rebuilds() {
    let mut first = single_triangle_graph();
    first.bake().unwrap();

    let mut second = single_triangle_graph();
    second.bake().unwrap();

    assert_eq!(first.fingerprint(), second.fingerprint());

    // and baking again on the unchanged registry reproduces it
    let before = first.fingerprint();
    first.bake().unwrap();
    assert_eq!(before, first.fingerprint());
}

#[test]
fn fingerprint_tracks_description_changes() {
    let mut first = single_triangle_graph();
    first.bake().unwrap();

    let mut second = FrameGraph::new();
    second.add_raster_task::<RenderPassData, _, _>(
        "render",
        |data, builder| {
            data.target = builder.create_image(ImageCreateDescription::new_2d(
                "backbuffer",
                [1024, 768],
                vk::Format::R8G8B8A8_UNORM,
            ));
            builder.set_backbuffer(data.target);
        },
        noop_execute,
    );
    second.bake().unwrap();

    assert_ne!(first.fingerprint(), second.fingerprint());
}

#[test]
fn reset_clears_the_plan() {
    let mut graph = single_triangle_graph();
    graph.bake().unwrap();
    assert!(graph.baked());

    graph.reset();
    assert!(!graph.baked());
    assert!(graph.bake().is_err()); // empty registry has no backbuffer
}
