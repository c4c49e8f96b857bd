//! 运行几帧典型的渲染流程，打印执行计划和每帧的 Pass 耗时
//!
//! 用法：`rg_demo [--vulkan] [config.toml]`
//!
//! 默认在 GfxRecordingDevice 上运行；`--vulkan` 时创建无窗口的 Vulkan 设备，
//! 创建失败则退回到 GfxRecordingDevice。

use std::rc::Rc;

use ash::vk;
use nova_gfx::commands::rendering_info::GfxAttachmentOps;
use nova_gfx::foundation::device::GfxDevice;
use nova_gfx::foundation::headless::GfxHeadlessContext;
use nova_gfx::foundation::recording_device::GfxRecordingDevice;
use nova_gfx::resources::buffer::GfxBufferDesc;
use nova_gfx::resources::image::GfxImageDesc;
use nova_render_graph::{RenderGraph, RgAccess, RgConfig, RgPhaseKind};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const FRAME_COUNT: u32 = 4;

fn hdr_desc() -> GfxImageDesc {
    GfxImageDesc::new_2d(WIDTH, HEIGHT, vk::Format::R16G16B16A16_SFLOAT)
}

fn declare_frame(graph: &mut RenderGraph) {
    let mut gbuffer = graph.add_pass("GBuffer");
    gbuffer.build(|builder| {
        builder.output_color_attachment(0, "Albedo", hdr_desc(), GfxAttachmentOps::CLEAR_STORE);
        builder.output_color_attachment(1, "Normal", hdr_desc(), GfxAttachmentOps::CLEAR_STORE);
        builder.output_depth_attachment(
            "Depth",
            GfxImageDesc::new_2d(WIDTH, HEIGHT, vk::Format::D32_SFLOAT),
            GfxAttachmentOps::CLEAR_STORE,
        );
    });
    gbuffer.execute(|_, ctx| ctx.draw(36, 128));

    let mut lighting = graph.add_pass("Lighting");
    lighting.build(|builder| {
        builder.read("Albedo", RgAccess::FragmentShaderSampleImage);
        builder.read("Normal", RgAccess::FragmentShaderSampleImage);
        builder.read("Depth", RgAccess::FragmentShaderSampleImage);
        builder.output_color_attachment(0, "Hdr", hdr_desc(), GfxAttachmentOps::DONT_CARE_STORE);
    });
    lighting.execute(|_, ctx| ctx.draw(3, 1));

    // 没有人读取它的输出，会被裁剪
    let mut debug = graph.add_pass("DebugNormals");
    debug.build(|builder| {
        builder.read("Normal", RgAccess::FragmentShaderSampleImage);
        builder.output_color_attachment(0, "NormalView", hdr_desc(), GfxAttachmentOps::DONT_CARE_STORE);
    });
    debug.execute(|_, ctx| ctx.draw(3, 1));

    {
        let mut bloom = graph.scope("Bloom");
        let mut downsample = bloom.add_pass("Downsample");
        downsample.build(|builder| {
            builder.read("Hdr", RgAccess::ComputeShaderSampleImage);
            builder.create_image(
                "Half",
                GfxImageDesc::new_2d(WIDTH / 2, HEIGHT / 2, vk::Format::R16G16B16A16_SFLOAT),
                RgAccess::ComputeShaderWrite,
            );
        });
        downsample.execute(|_, ctx| ctx.dispatch([WIDTH / 16, HEIGHT / 16, 1]));

        let mut blur = bloom.add_pass("Blur");
        blur.build(|builder| {
            builder.read("Half", RgAccess::ComputeShaderSampleImage);
            builder.create_image(
                "Blurred",
                GfxImageDesc::new_2d(WIDTH / 2, HEIGHT / 2, vk::Format::R16G16B16A16_SFLOAT),
                RgAccess::ComputeShaderWrite,
            );
        });
        blur.execute(|_, ctx| ctx.dispatch([WIDTH / 16, HEIGHT / 16, 1]));
    }

    let mut taa = graph.add_pass("Taa");
    taa.build(|builder| {
        builder.read_previous_frame("History", RgAccess::FragmentShaderSampleImage, 1);
        builder.read("Hdr", RgAccess::FragmentShaderSampleImage);
        builder.read("Bloom.LastOutput", RgAccess::FragmentShaderSampleImage);
        builder.output_color_attachment(0, "History", hdr_desc(), GfxAttachmentOps::DONT_CARE_STORE);
    });
    taa.execute(|_, ctx| ctx.draw(3, 1));

    let mut luminance = graph.add_pass("Luminance");
    let luminance_id = luminance.build(|builder| {
        builder.read("History", RgAccess::ComputeShaderSampleImage);
        builder.create_buffer(
            "AverageLuminance",
            GfxBufferDesc::new(16, vk::BufferUsageFlags::empty()).host_visible(true),
            RgAccess::TransferWrite,
        )
    });
    luminance.execute(move |resources, ctx| {
        let buffer = resources.get_buffer(luminance_id);
        ctx.fill_buffer(&buffer, 0.18_f32.to_bits());
    });

    let mut readback = graph.add_pass("ReadbackLuminance");
    readback.build(|builder| {
        builder.read(luminance_id, RgAccess::HostRead);
        builder.require_pass();
        builder.flush_commands();
    });
    readback.execute_on_device(move |resources, device| {
        device.wait_idle();
        let bytes = resources.read_buffer(luminance_id, 0, 4);
        let value = f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        log::info!("average luminance: {}", value);
    });

    let mut tonemap = graph.add_pass("Tonemap");
    tonemap.build(|builder| {
        builder.read("History", RgAccess::FragmentShaderSampleImage);
        builder.output_color_attachment(
            0,
            "Present",
            GfxImageDesc::new_2d(WIDTH, HEIGHT, vk::Format::B8G8R8A8_UNORM),
            GfxAttachmentOps::DONT_CARE_STORE,
        );
        builder.require_pass();
    });
    tonemap.execute(|_, ctx| ctx.draw(3, 1));
}

fn run_frames(device: Rc<dyn GfxDevice>, config: RgConfig, mut frame_done: impl FnMut(&RenderGraph)) {
    let swapchain = device.create_image(
        &GfxImageDesc::new_2d(WIDTH, HEIGHT, vk::Format::B8G8R8A8_UNORM).usage(vk::ImageUsageFlags::COLOR_ATTACHMENT),
        "swapchain",
    );

    let mut graph = RenderGraph::with_config(device.clone(), config);
    for _ in 0..FRAME_COUNT {
        declare_frame(&mut graph);
        if graph.set_target_image("Present", swapchain).is_err() {
            log::warn!("present target missing, the frame renders to a pooled image");
        }
        graph.execute();

        for phase in graph.last_frame_phases() {
            let kind = match phase.kind {
                RgPhaseKind::Scope => "scope",
                RgPhaseKind::Pass => "pass",
            };
            log::info!("{}{} {}: {:?}", "  ".repeat(phase.depth), kind, phase.name, phase.cpu_time);
        }
        frame_done(&graph);
    }

    // 池中的资源必须先于 swapchain 和设备释放
    drop(graph);
    device.wait_idle();
    device.destroy_image(swapchain);
}

fn run_recording(config: RgConfig) {
    let device = Rc::new(GfxRecordingDevice::new());
    run_frames(device.clone(), config, |graph| {
        log::info!(
            "frame {} done: {} device calls, {} pooled images",
            graph.frame_index(),
            device.take_commands().len(),
            graph.resources().image_pool().len()
        );
    });
}

fn main() -> anyhow::Result<()> {
    nova_crate_tools::init_log::init_log();

    let mut vulkan = false;
    let mut config_path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--vulkan" => vulkan = true,
            _ => config_path = Some(arg),
        }
    }

    let config = match config_path {
        Some(path) => RgConfig::load(path)?,
        None => RgConfig {
            print_execution_plan: true,
            ..Default::default()
        },
    };
    log::info!("render graph config: {:?}", config);

    if !vulkan {
        run_recording(config);
        return Ok(());
    }

    match GfxHeadlessContext::new("rg_demo") {
        Ok(context) => {
            run_frames(context.device(), config, |graph| {
                log::info!(
                    "frame {} done: {} pooled images",
                    graph.frame_index(),
                    graph.resources().image_pool().len()
                );
            });
        }
        Err(err) => {
            log::warn!("vulkan unavailable ({}), falling back to the recording device", err);
            run_recording(config);
        }
    }
    Ok(())
}
