//! 多帧场景测试，全部运行在 GfxRecordingDevice 上

use std::cell::Cell;
use std::rc::Rc;

use ash::vk;
use nova_gfx::commands::rendering_info::GfxAttachmentOps;
use nova_gfx::foundation::device::GfxDevice;
use nova_gfx::foundation::recording_device::{GfxRecordedCommand, GfxRecordingDevice};
use nova_gfx::resources::buffer::GfxBufferDesc;
use nova_gfx::resources::image::GfxImageDesc;
use nova_render_graph::{RenderGraph, RgAccess, RgError, RgPhaseKind, RgResourceId};

fn setup() -> (Rc<GfxRecordingDevice>, RenderGraph) {
    let device = Rc::new(GfxRecordingDevice::new());
    let graph = RenderGraph::new(device.clone());
    (device, graph)
}

fn foo_desc() -> GfxImageDesc {
    GfxImageDesc::new_2d(1024, 1024, vk::Format::R8G8B8A8_UNORM)
}

fn submit_count(device: &GfxRecordingDevice) -> usize {
    device.commands().iter().filter(|cmd| matches!(cmd, GfxRecordedCommand::Submit { .. })).count()
}

/// 帧结束后只有被跨帧读取延续的资源存活，并且各自只剩下未来那一次读取的引用
fn assert_refs_balanced(graph: &RenderGraph, carried: &[RgResourceId]) {
    let resources = graph.resources();
    assert_eq!(resources.live_resource_count(), carried.len(), "only carried resources survive the frame");
    for &id in carried {
        assert_eq!(resources.ref_count(id), 1, "{} should hold exactly one pending read", resources.name(id));
    }
}

/// 声明一个写 "Foo" 并绘制的 Pass
fn add_foo_writer(graph: &mut RenderGraph) -> RgResourceId {
    let mut pass = graph.add_pass("A");
    let foo = pass.build(|builder| builder.output_color_attachment(0, "Foo", foo_desc(), GfxAttachmentOps::CLEAR_STORE));
    pass.execute(|_, ctx| ctx.draw(3, 1));
    foo
}

#[test]
fn test_scenario_a_unread_pass_is_pruned() {
    let (device, mut graph) = setup();
    add_foo_writer(&mut graph);
    graph.execute();

    let plan = graph.last_execution_plan();
    assert!(!plan.pass("A").unwrap().active);
    assert_eq!(plan.barrier_count(), 0);
    assert!(device.image_barriers().is_empty());
    assert_eq!(device.draw_count(), 0);
    assert_eq!(device.live_image_count(), 0, "pruned passes never allocate");
    assert_refs_balanced(&graph, &[]);
}

#[test]
fn test_scenario_b_reader_activates_writer() {
    let (device, mut graph) = setup();
    add_foo_writer(&mut graph);

    let foo_image = Rc::new(Cell::new(vk::Image::null()));
    let mut pass = graph.add_pass("B");
    pass.build(|builder| {
        builder.read("Foo", RgAccess::FragmentShaderSampleImage);
        builder.output_color_attachment(0, "Bar", foo_desc(), GfxAttachmentOps::DONT_CARE_STORE);
        builder.require_pass();
    });
    let captured = foo_image.clone();
    pass.execute(move |resources, ctx| {
        captured.set(resources.get_image("Foo").image);
        ctx.draw(3, 1);
    });
    graph.execute();

    let plan = graph.last_execution_plan();
    assert_eq!(plan.active_pass_names(), vec!["A", "B"]);
    assert_eq!(device.draw_count(), 2);

    let b_barriers = &plan.pass("B").unwrap().barriers;
    let foo_barriers: Vec<_> = b_barriers.iter().filter(|barrier| barrier.resource == "Foo").collect();
    assert_eq!(foo_barriers.len(), 1);
    assert_eq!(foo_barriers[0].desc.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert_eq!(foo_barriers[0].desc.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

    let write_to_read = device
        .image_barriers()
        .iter()
        .filter(|barrier| {
            let inner = barrier.inner();
            inner.image == foo_image.get()
                && inner.old_layout == vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
                && inner.new_layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        })
        .count();
    assert_eq!(write_to_read, 1);

    // 所有引用都已释放，资源在帧末被回收
    assert_refs_balanced(&graph, &[]);
}

/// 每帧声明一次：读取上一帧的 "Hist"，再写入这一帧的 "Hist"
fn add_history_pass(
    graph: &mut RenderGraph,
    written: Rc<Cell<vk::Image>>,
    previous: Rc<Cell<vk::Image>>,
) -> (Option<RgResourceId>, RgResourceId) {
    let mut pass = graph.add_pass("C");
    let (prev, current) = pass.build(|builder| {
        let prev = builder.read_previous_frame("Hist", RgAccess::FragmentShaderSampleImage, 1);
        let current = builder.output_color_attachment(0, "Hist", foo_desc(), GfxAttachmentOps::DONT_CARE_STORE);
        builder.require_pass();
        (prev, current)
    });
    pass.execute(move |resources, ctx| {
        written.set(resources.get_image(current).image);
        if let Some(prev) = prev {
            previous.set(resources.get_image(prev).image);
        }
        ctx.draw(3, 1);
    });
    (prev, current)
}

#[test]
fn test_scenario_c_read_previous_frame() {
    let (_device, mut graph) = setup();
    let written = Rc::new(Cell::new(vk::Image::null()));
    let previous = Rc::new(Cell::new(vk::Image::null()));

    let (prev0, hist0) = add_history_pass(&mut graph, written.clone(), previous.clone());
    assert_eq!(prev0, None);
    graph.execute();
    let frame0_image = written.get();

    // 只有被跨帧读取保留的资源存活
    assert_refs_balanced(&graph, &[hist0]);

    let (prev1, hist1) = add_history_pass(&mut graph, written.clone(), previous.clone());
    assert_eq!(prev1, Some(hist0));
    assert_ne!(hist1, hist0);
    assert_eq!(graph.resources().get_id("Hist", 0), Some(hist1));
    assert_eq!(graph.resources().get_id("Hist", 1), Some(hist0));
    graph.execute();

    assert_eq!(previous.get(), frame0_image);
    assert_ne!(written.get(), frame0_image);
    assert!(!graph.resources().contains(hist0));
    assert_refs_balanced(&graph, &[hist1]);
}

#[test]
fn test_history_is_released_when_reader_is_pruned() {
    let (device, mut graph) = setup();
    let written = Rc::new(Cell::new(vk::Image::null()));
    let previous = Rc::new(Cell::new(vk::Image::null()));

    let (_, hist0) = add_history_pass(&mut graph, written, previous);
    graph.execute();
    assert!(graph.resources().contains(hist0));

    // 这一帧没有人读取上一帧的 "Hist"
    graph.execute();
    assert!(!graph.resources().contains(hist0));
    assert_refs_balanced(&graph, &[]);
    assert_eq!(graph.resources().image_pool().len(), 1);
    assert_eq!(device.live_image_count(), 1);
}

#[test]
fn test_scenario_d_pool_reuse_across_frames() {
    let (device, mut graph) = setup();
    let image = Rc::new(Cell::new(vk::Image::null()));

    let run_frame = |graph: &mut RenderGraph, desc: GfxImageDesc| {
        let mut pass = graph.add_pass("Temp");
        let id = pass.build(|builder| {
            builder.require_pass();
            builder.create_image("Temp", desc, RgAccess::ComputeShaderWrite)
        });
        let captured = image.clone();
        pass.execute(move |resources, ctx| {
            captured.set(resources.get_image(id).image);
            ctx.dispatch([1, 1, 1]);
        });
        graph.execute();
        image.get()
    };

    let first = run_frame(&mut graph, foo_desc());
    let second = run_frame(&mut graph, foo_desc());
    assert_eq!(first, second);

    let other = run_frame(&mut graph, GfxImageDesc::new_2d(512, 512, vk::Format::R8G8B8A8_UNORM));
    assert_ne!(other, first);
    assert_eq!(device.live_image_count(), 2);
    assert_refs_balanced(&graph, &[]);
}

#[test]
fn test_pool_eviction_after_idle_frames() {
    let (device, mut graph) = setup();
    let mut pass = graph.add_pass("Temp");
    pass.build(|builder| {
        builder.require_pass();
        builder.create_image("Temp", foo_desc(), RgAccess::ComputeShaderWrite);
    });
    pass.execute(|_, ctx| ctx.dispatch([1, 1, 1]));
    graph.execute();

    for _ in 0..3 {
        graph.execute();
    }
    assert_eq!(device.live_image_count(), 1);

    graph.execute();
    assert_eq!(device.live_image_count(), 0);
    assert!(graph.resources().image_pool().is_empty());
}

#[test]
fn test_consecutive_reads_need_one_barrier() {
    let (_device, mut graph) = setup();
    add_foo_writer(&mut graph);

    for name in ["B", "C"] {
        let mut pass = graph.add_pass(name);
        pass.build(|builder| {
            builder.read("Foo", RgAccess::FragmentShaderSampleImage);
            builder.require_pass();
        });
        pass.execute(|_, _| {});
    }
    graph.execute();

    let plan = graph.last_execution_plan();
    assert_eq!(plan.pass("B").unwrap().barriers.len(), 1);
    assert!(plan.pass("C").unwrap().barriers.is_empty());
    assert_refs_balanced(&graph, &[]);
}

#[test]
fn test_transitive_liveness() {
    let (_device, mut graph) = setup();
    add_foo_writer(&mut graph);

    let mut mid = graph.add_pass("Mid");
    mid.build(|builder| {
        builder.read("Foo", RgAccess::ComputeShaderSampleImage);
        builder.create_image("Mid", foo_desc(), RgAccess::ComputeShaderWrite);
    });
    mid.execute(|_, ctx| ctx.dispatch([1, 1, 1]));

    let mut unrelated = graph.add_pass("Unrelated");
    unrelated.build(|builder| {
        builder.create_image("Unrelated", foo_desc(), RgAccess::ComputeShaderWrite);
    });
    unrelated.execute(|_, ctx| ctx.dispatch([1, 1, 1]));

    let mut last = graph.add_pass("Last");
    last.build(|builder| {
        builder.read("Mid", RgAccess::ComputeShaderSampleImage);
        builder.require_pass();
    });
    last.execute(|_, _| {});
    graph.execute();

    assert_eq!(graph.last_execution_plan().active_pass_names(), vec!["A", "Mid", "Last"]);
    assert_refs_balanced(&graph, &[]);
}

#[test]
fn test_reader_declared_before_producer_through_reserve() {
    let (_device, mut graph) = setup();
    let written = Rc::new(Cell::new(vk::Image::null()));
    let previous = Rc::new(Cell::new(vk::Image::null()));

    // "Hist" 在这一帧由后面的 Pass 生产
    let mut reader = graph.add_pass("Reader");
    reader.build(|builder| {
        builder.read_previous_frame("Hist", RgAccess::FragmentShaderSampleImage, 1);
        builder.require_pass();
    });
    reader.execute(|_, _| {});

    let mut writer = graph.add_pass("Writer");
    let hist = writer.build(|builder| builder.create_image("Hist", foo_desc(), RgAccess::ComputeShaderWrite));
    let captured = written.clone();
    writer.execute(move |resources, ctx| {
        captured.set(resources.get_image(hist).image);
        ctx.dispatch([1, 1, 1]);
    });
    graph.execute();

    assert_eq!(graph.last_execution_plan().active_pass_names(), vec!["Reader", "Writer"]);
    assert_refs_balanced(&graph, &[hist]);

    let (prev, _) = add_history_pass(&mut graph, Rc::new(Cell::new(vk::Image::null())), previous.clone());
    assert_eq!(prev, Some(hist));
    graph.execute();
    assert_eq!(previous.get(), written.get());
}

/// 用于 attachment 的描述，usage 事先声明完整，使临时资源和它落在同一个池桶里
fn attachment_desc(depth: bool) -> GfxImageDesc {
    if depth {
        GfxImageDesc::new_2d(1024, 1024, vk::Format::D32_SFLOAT)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED)
    } else {
        foo_desc().usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED)
    }
}

/// A 清空并写入 "Target"，B 采样它，Scratch 申请一张同样描述的临时图像，
/// 最后 C 以 `LOAD` 继续在 "Target" 上绘制
///
/// 返回 A、Scratch、C 各自拿到的图像
fn run_load_after_read(graph: &mut RenderGraph, depth: bool) -> (vk::Image, vk::Image, vk::Image) {
    let a_image = Rc::new(Cell::new(vk::Image::null()));
    let scratch_image = Rc::new(Cell::new(vk::Image::null()));
    let c_image = Rc::new(Cell::new(vk::Image::null()));

    let mut a = graph.add_pass("A");
    let target = a.build(|builder| {
        builder.require_pass();
        if depth {
            builder.output_depth_attachment("Target", attachment_desc(true), GfxAttachmentOps::CLEAR_STORE)
        } else {
            builder.output_color_attachment(0, "Target", attachment_desc(false), GfxAttachmentOps::CLEAR_STORE)
        }
    });
    let captured = a_image.clone();
    a.execute(move |resources, ctx| {
        captured.set(resources.get_image(target).image);
        ctx.draw(3, 1);
    });

    let mut b = graph.add_pass("B");
    b.build(|builder| {
        builder.require_pass();
        builder.read(target, RgAccess::FragmentShaderSampleImage);
    });
    b.execute(|_, ctx| ctx.draw(3, 1));

    let mut scratch = graph.add_pass("Scratch");
    let scratch_id = scratch.build(|builder| {
        builder.require_pass();
        if depth {
            builder.output_depth_attachment("Scratch", attachment_desc(true), GfxAttachmentOps::CLEAR_STORE)
        } else {
            builder.output_color_attachment(0, "Scratch", attachment_desc(false), GfxAttachmentOps::CLEAR_STORE)
        }
    });
    let captured = scratch_image.clone();
    scratch.execute(move |resources, ctx| {
        captured.set(resources.get_image(scratch_id).image);
        ctx.draw(3, 1);
    });

    let mut c = graph.add_pass("C");
    c.build(|builder| {
        builder.require_pass();
        if depth {
            builder.set_depth_attachment(target, GfxAttachmentOps::LOAD_STORE);
        } else {
            builder.set_color_attachment(0, target, GfxAttachmentOps::LOAD_STORE);
        }
    });
    let captured = c_image.clone();
    c.execute(move |resources, ctx| {
        captured.set(resources.get_image(target).image);
        ctx.draw(3, 1);
    });

    graph.execute();
    (a_image.get(), scratch_image.get(), c_image.get())
}

#[test]
fn test_load_attachment_keeps_contents_alive() {
    let (_device, mut graph) = setup();
    let (a, scratch, c) = run_load_after_read(&mut graph, false);

    assert_ne!(a, vk::Image::null());
    assert_eq!(c, a, "LOAD must see the image A rendered into");
    assert_ne!(scratch, a, "a temporary may not reuse an image that is still going to be loaded");

    let c_barriers = &graph.last_execution_plan().pass("C").unwrap().barriers;
    let target: Vec<_> = c_barriers.iter().filter(|barrier| barrier.resource == "Target").collect();
    assert_eq!(target.len(), 1);
    assert_eq!(target[0].desc.old_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(target[0].desc.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert!(target[0].desc.dst_access.contains(vk::AccessFlags2::COLOR_ATTACHMENT_READ));

    assert_refs_balanced(&graph, &[]);
}

#[test]
fn test_load_depth_attachment_keeps_contents_alive() {
    let (_device, mut graph) = setup();
    let (a, scratch, c) = run_load_after_read(&mut graph, true);

    assert_eq!(c, a);
    assert_ne!(scratch, a);
    assert_refs_balanced(&graph, &[]);
}

#[test]
fn test_load_attachment_activates_producer() {
    let (device, mut graph) = setup();
    add_foo_writer(&mut graph);

    let mut overlay = graph.add_pass("Overlay");
    overlay.build(|builder| {
        builder.require_pass();
        builder.set_color_attachment(0, "Foo", GfxAttachmentOps::LOAD_STORE);
    });
    overlay.execute(|_, ctx| ctx.draw(3, 1));
    graph.execute();

    assert_eq!(graph.last_execution_plan().active_pass_names(), vec!["A", "Overlay"]);
    assert_eq!(device.draw_count(), 2);
    assert_refs_balanced(&graph, &[]);
}

#[test]
fn test_transfer_read_and_write_in_one_pass() {
    let (device, mut graph) = setup();
    let desc = foo_desc().mip_levels(4);

    let mut upload = graph.add_pass("Upload");
    let mips = upload.build(|builder| builder.create_image("Mips", desc, RgAccess::TransferWrite));
    upload.execute(|_, _| {});

    // 逐级 blit：每一级从上一级读取，再写入自己
    let mut generate = graph.add_pass("GenerateMips");
    generate.build(|builder| {
        builder.write(mips, RgAccess::TransferWrite);
        builder.read(mips, RgAccess::TransferRead);
    });
    generate.execute(|_, _| {});

    let mut consumer = graph.add_pass("Consumer");
    consumer.build(|builder| {
        builder.require_pass();
        builder.read(mips, RgAccess::FragmentShaderSampleImage);
    });
    consumer.execute(|_, ctx| ctx.draw(3, 1));
    graph.execute();

    let plan = graph.last_execution_plan();
    assert_eq!(plan.active_pass_names(), vec!["Upload", "GenerateMips", "Consumer"]);

    let generate_barriers = &plan.pass("GenerateMips").unwrap().barriers;
    assert_eq!(generate_barriers.len(), 1);
    assert_eq!(generate_barriers[0].desc.old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(generate_barriers[0].desc.new_layout, vk::ImageLayout::GENERAL);
    assert!(
        generate_barriers[0]
            .desc
            .dst_access
            .contains(vk::AccessFlags2::TRANSFER_READ | vk::AccessFlags2::TRANSFER_WRITE)
    );

    let consumer_barriers = &plan.pass("Consumer").unwrap().barriers;
    assert_eq!(consumer_barriers.len(), 1);
    assert_eq!(consumer_barriers[0].desc.old_layout, vk::ImageLayout::GENERAL);
    assert_eq!(consumer_barriers[0].desc.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

    assert!(device.image_barriers().iter().any(|barrier| barrier.inner().new_layout == vk::ImageLayout::GENERAL));
    assert_refs_balanced(&graph, &[]);
}

#[test]
fn test_scope_last_output() {
    let (_device, mut graph) = setup();
    let out = {
        let mut blur = graph.scope("Blur");
        let mut pass = blur.add_pass("Horizontal");
        let out = pass.build(|builder| builder.create_image("Out", foo_desc(), RgAccess::ComputeShaderWrite));
        pass.execute(|_, ctx| ctx.dispatch([1, 1, 1]));
        out
    };

    assert_eq!(graph.resources().get_id("Blur.LastOutput", 0), Some(out));
    assert_eq!(graph.resources().get_id("Blur.Out", 0), Some(out));
    assert_eq!(graph.resources().get_id("Out", 0), None);
    assert_eq!(graph.resources().name(out), "Blur.Out");

    let mut consumer = graph.add_pass("Consumer");
    let read = consumer.build(|builder| {
        builder.require_pass();
        builder.read("Blur.LastOutput", RgAccess::ComputeShaderSampleImage)
    });
    consumer.execute(|_, _| {});
    assert_eq!(read, out);
    assert_eq!(graph.execute(), Some(out));

    let phases: Vec<_> = graph.last_frame_phases().iter().map(|p| (p.name.as_str(), p.kind, p.depth)).collect();
    assert_eq!(
        phases,
        vec![
            ("Blur", RgPhaseKind::Scope, 0),
            ("Horizontal", RgPhaseKind::Pass, 1),
            ("Consumer", RgPhaseKind::Pass, 0),
        ]
    );
}

#[test]
fn test_command_batching_and_flush() {
    let (device, mut graph) = setup();
    for name in ["P1", "P2", "P3"] {
        let mut pass = graph.add_pass(name);
        pass.build(|builder| {
            builder.require_pass();
            if name == "P2" {
                builder.flush_commands();
            }
        });
        pass.execute(|_, ctx| ctx.dispatch([1, 1, 1]));
    }
    graph.execute();
    assert_eq!(submit_count(&device), 3);

    device.take_commands();
    for name in ["P1", "P2", "P3"] {
        let mut pass = graph.add_pass(name);
        pass.build(|builder| builder.require_pass());
        pass.execute(|_, ctx| ctx.dispatch([1, 1, 1]));
    }
    graph.execute();
    assert_eq!(submit_count(&device), 1);
}

#[test]
fn test_device_pass_submits_pending_work() {
    let (device, mut graph) = setup();
    let mut first = graph.add_pass("First");
    first.build(|builder| builder.require_pass());
    first.execute(|_, ctx| ctx.dispatch([1, 1, 1]));

    let submitted_before = Rc::new(Cell::new(false));
    let captured = submitted_before.clone();
    let mut device_pass = graph.add_pass("OnDevice");
    device_pass.build(|builder| builder.require_pass());
    let recording = device.clone();
    device_pass.execute_on_device(move |_, _| {
        captured.set(submit_count(&recording) == 1);
    });

    let mut last = graph.add_pass("Last");
    last.build(|builder| builder.require_pass());
    last.execute(|_, ctx| ctx.dispatch([1, 1, 1]));
    graph.execute();

    assert!(submitted_before.get());
    assert_eq!(submit_count(&device), 2);
    let plan = graph.last_execution_plan();
    assert!(plan.pass("OnDevice").unwrap().on_device);
    assert!(!plan.pass("First").unwrap().on_device);
    assert_refs_balanced(&graph, &[]);
}

#[test]
fn test_synchronous_readback() {
    let (_device, mut graph) = setup();

    let mut fill = graph.add_pass("Fill");
    let counts = fill.build(|builder| {
        builder.create_buffer(
            "Counts",
            GfxBufferDesc::new(16, vk::BufferUsageFlags::empty()).host_visible(true),
            RgAccess::TransferWrite,
        )
    });
    fill.execute(move |resources, ctx| {
        let buffer = resources.get_buffer(counts);
        ctx.fill_buffer(&buffer, 42);
    });

    let value = Rc::new(Cell::new(0));
    let captured = value.clone();
    let mut readback = graph.add_pass("Readback");
    readback.build(|builder| {
        builder.read(counts, RgAccess::HostRead);
        builder.require_pass();
        builder.flush_commands();
    });
    readback.execute_on_device(move |resources, device| {
        device.wait_idle();
        let bytes = resources.read_buffer(counts, 0, 4);
        captured.set(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
    });
    graph.execute();

    assert_eq!(value.get(), 42);
    assert_refs_balanced(&graph, &[]);
}

#[test]
fn test_uniform_written_by_host() {
    let (_device, mut graph) = setup();
    let mut upload = graph.add_pass("Upload");
    let params = upload.build(|builder| builder.create_uniform("Params", 16));
    upload.execute_on_device(move |resources, _| {
        resources.write_buffer(params, 0, &7u32.to_ne_bytes());
    });

    let seen = Rc::new(Cell::new(0));
    let captured = seen.clone();
    let mut consumer = graph.add_pass("Consumer");
    consumer.build(|builder| {
        builder.read_uniform("Params");
        builder.require_pass();
    });
    consumer.execute(move |resources, _| {
        let bytes = resources.read_buffer(params, 0, 4);
        captured.set(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
    });
    graph.execute();

    assert_eq!(seen.get(), 7);
    assert_refs_balanced(&graph, &[]);
}

#[test]
fn test_target_image() {
    let (device, mut graph) = setup();
    let swapchain = device.create_image(&foo_desc(), "swapchain");

    assert!(matches!(
        graph.set_target_image("Present", swapchain),
        Err(RgError::ResourceNotFound(_))
    ));

    let drawn = Rc::new(Cell::new(vk::Image::null()));
    let captured = drawn.clone();
    let mut present = graph.add_pass("Present");
    let id = present.build(|builder| {
        builder.require_pass();
        builder.output_color_attachment(0, "Present", foo_desc(), GfxAttachmentOps::CLEAR_STORE)
    });
    present.execute(move |resources, ctx| {
        captured.set(resources.get_image(id).image);
        ctx.draw(3, 1);
    });
    graph.set_target_image("Present", swapchain).unwrap();
    graph.execute();

    assert_eq!(drawn.get(), swapchain.image);
    assert!(graph.resources().image_pool().is_empty());
    assert_eq!(device.live_image_count(), 1);
}

#[test]
#[should_panic(expected = "target image format mismatch")]
fn test_target_image_mismatch() {
    let (device, mut graph) = setup();
    let swapchain = device.create_image(&GfxImageDesc::new_2d(1024, 1024, vk::Format::B8G8R8A8_UNORM), "swapchain");
    let mut present = graph.add_pass("Present");
    present.build(|builder| builder.output_color_attachment(0, "Present", foo_desc(), GfxAttachmentOps::CLEAR_STORE));
    let _ = graph.set_target_image("Present", swapchain);
}

#[test]
#[should_panic(expected = "already registered")]
fn test_duplicate_output_name() {
    let (_device, mut graph) = setup();
    add_foo_writer(&mut graph);
    add_foo_writer(&mut graph);
}

#[test]
#[should_panic(expected = "already has an execute callback")]
fn test_double_execute() {
    let (_device, mut graph) = setup();
    let mut pass = graph.add_pass("A");
    pass.execute(|_, _| {});
    pass.execute(|_, _| {});
}

#[test]
#[should_panic(expected = "has no execute callback")]
fn test_missing_execute() {
    let (_device, mut graph) = setup();
    let mut pass = graph.add_pass("A");
    pass.build(|builder| builder.require_pass());
    graph.execute();
}

#[test]
fn test_introspection() {
    let (_device, mut graph) = setup();
    add_foo_writer(&mut graph);
    {
        let mut scope = graph.scope("Post");
        let mut pass = scope.add_pass("Histogram");
        pass.build(|builder| {
            builder.create_buffer(
                "Histogram",
                GfxBufferDesc::new(1024, vk::BufferUsageFlags::empty()),
                RgAccess::ComputeShaderWrite,
            );
        });
        pass.execute(|_, _| {});
    }

    let images = graph.resources().all_images();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].name, "Foo");
    assert_eq!(images[0].desc.width, 1024);

    let buffers = graph.resources().all_buffers();
    assert_eq!(buffers.len(), 1);
    assert_eq!(buffers[0].name, "Post.Histogram");
    assert!(buffers[0].desc.usage.contains(vk::BufferUsageFlags::STORAGE_BUFFER));
}
