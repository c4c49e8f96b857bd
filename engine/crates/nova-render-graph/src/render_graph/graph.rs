//! RenderGraph
//!
//! 每帧重新声明全部 Pass，然后调用一次 [`RenderGraph::execute`]：
//!
//! 1. 活跃性分析：逆序扫描 Pass 直到不动点，只有被需要的 Pass 才会执行
//! 2. 按声明顺序执行活跃的 Pass：合并同一 Pass 对同一资源的访问，计算 barrier 并批量录制，
//!    有 attachment 时在 dynamic rendering 中执行回调
//! 3. 没有 render pass 的 Pass 共享命令缓冲区，`flush_commands` 强制提交边界
//! 4. 帧推进：回收资源、延续跨帧资源、推进资源池
//!
//! # 示例
//!
//! ```ignore
//! let mut pass = graph.add_pass("Lighting");
//! let hdr = pass.build(|builder| {
//!     builder.read("GBuffer.Albedo", RgAccess::FragmentShaderSampleImage);
//!     builder.output_color_attachment(0, "Hdr", desc, GfxAttachmentOps::CLEAR_STORE)
//! });
//! pass.execute(move |resources, ctx| {
//!     ctx.draw(3, 1);
//! });
//! ```

use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use ash::vk;
use itertools::Itertools;
use nova_gfx::basic::color::LabelColor;
use nova_gfx::commands::command_buffer::GfxCommandBuffer;
use nova_gfx::commands::rendering_info::{GfxRenderingAttachment, GfxRenderingInfo};
use nova_gfx::foundation::device::GfxDevice;
use nova_gfx::resources::image::GfxImage;

use crate::render_graph::access::RgAccess;
use crate::render_graph::barrier::{BarrierCalculator, RgPassBarriers};
use crate::render_graph::config::RgConfig;
use crate::render_graph::error::RgResult;
use crate::render_graph::pass::{RgAttachment, RgCommandContext, RgExecuteFn, RgPass};
use crate::render_graph::pass_builder::RgPassBuilder;
use crate::render_graph::plan::{RgExecutionPlan, RgPlanBarrier, RgPlanPass};
use crate::render_graph::profiling::{RgPhaseRecord, RgProfiler, span};
use crate::render_graph::resource::{RESOURCE_FRAME_COUNT, RgResourceId};
use crate::render_graph::resource_state::RgResourceState;
use crate::render_graph::resources::{RgBacking, RgResources};

/// 没有 render pass 的 Pass 共享的命令缓冲区
#[derive(Default)]
struct RgCommandRecorder {
    current: Option<GfxCommandBuffer>,
    submit_count: u32,
}

impl RgCommandRecorder {
    fn cmd(&mut self, device: &dyn GfxDevice, frame_index: u64) -> &GfxCommandBuffer {
        let submit_count = self.submit_count;
        self.current
            .get_or_insert_with(|| device.begin_command_buffer(&format!("rg-frame{}-{}", frame_index, submit_count)))
    }

    fn submit(&mut self, device: &dyn GfxDevice) {
        if let Some(cmd) = self.current.take() {
            device.submit(vec![cmd]);
            self.submit_count += 1;
        }
    }
}

pub struct RenderGraph {
    device: Rc<dyn GfxDevice>,
    resources: RgResources,
    passes: Vec<RgPass>,

    /// 按帧槽位存放被跨帧读取的资源，轮到那一帧时释放它们的引用
    future_dependencies: [Vec<RgResourceId>; RESOURCE_FRAME_COUNT],

    profiler: RgProfiler,
    last_frame_phases: Vec<RgPhaseRecord>,
    last_execution_plan: RgExecutionPlan,
}

// new & init
impl RenderGraph {
    pub fn new(device: Rc<dyn GfxDevice>) -> Self {
        Self::with_config(device, RgConfig::default())
    }

    pub fn with_config(device: Rc<dyn GfxDevice>, config: RgConfig) -> Self {
        Self {
            resources: RgResources::new(device.clone(), config),
            device,
            passes: Vec::new(),
            future_dependencies: Default::default(),
            profiler: RgProfiler::default(),
            last_frame_phases: Vec::new(),
            last_execution_plan: RgExecutionPlan::default(),
        }
    }
}

// getters
impl RenderGraph {
    #[inline]
    pub fn resources(&self) -> &RgResources {
        &self.resources
    }

    #[inline]
    pub fn resources_mut(&mut self) -> &mut RgResources {
        &mut self.resources
    }

    #[inline]
    pub fn device(&self) -> &dyn GfxDevice {
        self.device.as_ref()
    }

    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.resources.frame_index()
    }

    #[inline]
    pub fn last_output_id(&self) -> Option<RgResourceId> {
        self.resources.last_output_id()
    }

    /// 上一次 execute 中各个 scope 和 Pass 的 CPU 耗时，按执行顺序排列
    #[inline]
    pub fn last_frame_phases(&self) -> &[RgPhaseRecord] {
        &self.last_frame_phases
    }

    #[inline]
    pub fn last_execution_plan(&self) -> &RgExecutionPlan {
        &self.last_execution_plan
    }
}

// 声明
impl RenderGraph {
    /// 声明一个 Pass，之后通过返回的节点 `build` 和 `execute`
    pub fn add_pass(&mut self, name: &str) -> RgPassNode<'_> {
        let scopes = self.resources.scope_stack().clone();
        self.passes.push(RgPass::new(name.to_string(), scopes));
        let index = self.passes.len() - 1;
        RgPassNode { graph: self, index }
    }

    pub fn begin_scope(&mut self, name: &str) {
        self.resources.begin_scope(name);
    }

    pub fn end_scope(&mut self) {
        self.resources.end_scope();
    }

    /// 进入 scope，返回的 guard 在 drop 时离开 scope
    pub fn scope(&mut self, name: &str) -> RgScopeGuard<'_> {
        self.begin_scope(name);
        RgScopeGuard { graph: self }
    }

    /// 把外部 image 绑定到已注册的资源
    ///
    /// 资源还不存在时返回错误并打印警告，由调用方决定如何降级。
    pub fn set_target_image(&mut self, name: &str, image: GfxImage) -> RgResult<()> {
        self.resources.set_target_image(name, image).inspect_err(|err| {
            log::warn!("set target image failed: {}", err);
        })
    }
}

// 执行
impl RenderGraph {
    /// 执行这一帧声明的所有 Pass，然后推进到下一帧
    ///
    /// 返回这一帧最后一个 Pass 的输出。
    ///
    /// # Panic
    /// 有 Pass 没有挂上执行回调时 panic
    pub fn execute(&mut self) -> Option<RgResourceId> {
        let _span = span("RenderGraph::execute");

        let mut passes = std::mem::take(&mut self.passes);
        for pass in &passes {
            assert!(pass.execute.is_some(), "pass {} has no execute callback", pass.name);
        }

        self.compute_liveness(&mut passes);
        self.release_carried_dependencies();

        let frame_index = self.resources.frame_index();
        let device = self.device.clone();
        let mut recorder = RgCommandRecorder::default();
        let mut plan = RgExecutionPlan {
            frame_index,
            passes: Vec::with_capacity(passes.len()),
        };

        for pass in passes {
            let mut plan_pass = RgPlanPass {
                name: pass.name.clone(),
                active: pass.is_active(),
                on_device: pass.execute.as_ref().is_some_and(|execute| !execute.is_command()),
                accesses: pass.accesses.iter().map(|(id, access)| (self.resources.name(*id).to_string(), *access)).collect(),
                barriers: Vec::new(),
            };

            if pass.is_active() {
                plan_pass.barriers = self.execute_pass(pass, device.as_ref(), &mut recorder, frame_index);
            } else {
                log::debug!("prune pass {}", pass.name);
            }
            plan.passes.push(plan_pass);
        }
        recorder.submit(device.as_ref());

        self.last_frame_phases = self.profiler.finish_frame();
        if self.resources.config().print_execution_plan {
            plan.print();
        }
        self.last_execution_plan = plan;

        let last_output = self.resources.last_output_id();
        self.resources.advance_frame();
        last_output
    }

    /// 活跃性分析
    ///
    /// 逆序扫描所有 Pass：`required`，或者写入了引用计数非零的资源的 Pass 变为活跃，
    /// 并增加它读取（包括 load op 为 `LOAD` 的 attachment 以及跨帧读取）的资源的引用计数。这可能使更早（或者在跨帧读取时更晚）的 Pass
    /// 变为活跃，所以重复扫描，直到一次完整的扫描中没有新的 Pass 变为活跃。
    ///
    /// 最坏情况下是 O(n^2)。
    fn compute_liveness(&mut self, passes: &mut [RgPass]) {
        let _span = span("RgLiveness");
        let frame_index = self.resources.frame_index() as usize;

        loop {
            let mut changed = false;
            for pass in passes.iter_mut().rev() {
                if pass.active {
                    continue;
                }
                let live = pass.required || pass.writes().any(|id| self.resources.ref_count(id) > 0);
                if !live {
                    continue;
                }

                pass.active = true;
                changed = true;
                for id in pass.reads() {
                    self.resources.increment_ref(id);
                }
                for future in &pass.future_reads {
                    self.resources.increment_ref(future.id);
                    let slot = (frame_index + future.frames as usize) % RESOURCE_FRAME_COUNT;
                    self.future_dependencies[slot].push(future.id);
                }
            }
            if !changed {
                break;
            }
        }
    }

    /// 释放之前的帧为这一帧保留的资源引用
    ///
    /// 必须在活跃性分析之后：读取它们的 Pass 已经持有引用，资源不会在这一帧被提前释放。
    fn release_carried_dependencies(&mut self) {
        let slot = self.resources.frame_index() as usize % RESOURCE_FRAME_COUNT;
        for id in std::mem::take(&mut self.future_dependencies[slot]) {
            self.resources.decrement_ref(id);
        }
    }

    fn execute_pass(
        &mut self,
        pass: RgPass,
        device: &dyn GfxDevice,
        recorder: &mut RgCommandRecorder,
        frame_index: u64,
    ) -> Vec<RgPlanBarrier> {
        let RgPass {
            name,
            accesses,
            attachments,
            flush_commands,
            scopes,
            execute,
            ..
        } = pass;
        let execute = execute.unwrap_or_else(|| panic!("pass {} has no execute callback", name));

        {
            let (profiler, resources) = (&mut self.profiler, &self.resources);
            profiler.enter_scopes(&scopes, |scope| resources.scope_short_name(scope));
            profiler.begin_pass(&name);
        }

        if flush_commands {
            recorder.submit(device);
        }

        // 写入的资源在执行期间持有引用，读取的引用已经在活跃性分析时增加
        for (id, access) in &accesses {
            if access.is_write() {
                self.resources.increment_ref(*id);
            }
        }

        let barriers = self.compute_barriers(&accesses);
        if barriers.has_barriers() {
            let cmd = recorder.cmd(device, frame_index);
            device.cmd_pipeline_barrier(cmd, &barriers.gfx_image_barriers(), &barriers.gfx_buffer_barriers());
        }
        let plan_barriers = barriers
            .image_barriers
            .iter()
            .map(|(id, desc, _)| (*id, *desc, true))
            .chain(barriers.buffer_barriers.iter().map(|(id, desc, _)| (*id, *desc, false)))
            .map(|(id, desc, is_image)| RgPlanBarrier {
                resource: self.resources.name(id).to_string(),
                is_image,
                desc,
            })
            .collect_vec();

        let has_attachments = attachments.iter().any(|attachment| attachment.id.is_some());
        match execute {
            RgExecuteFn::Command(callback) => {
                let cmd = recorder.cmd(device, frame_index);
                if has_attachments {
                    device.cmd_begin_label(cmd, &name, LabelColor::COLOR_RENDER_PASS);
                    let rendering_info = self.rendering_info(&attachments);
                    device.cmd_begin_rendering(cmd, &rendering_info);
                    let mut ctx = RgCommandContext::new(cmd, device, Some(rendering_info.render_area));
                    callback(&mut self.resources, &mut ctx);
                    device.cmd_end_rendering(cmd);
                } else {
                    device.cmd_begin_label(cmd, &name, LabelColor::COLOR_PASS);
                    let mut ctx = RgCommandContext::new(cmd, device, None);
                    callback(&mut self.resources, &mut ctx);
                }
                device.cmd_end_label(cmd);
            }
            RgExecuteFn::Device(callback) => {
                assert!(!has_attachments, "pass {} with attachments needs a command callback", name);
                // 之前录制的命令（包括这个 Pass 的 barrier）先提交
                recorder.submit(device);
                callback(&mut self.resources, device);
            }
        }

        if flush_commands {
            recorder.submit(device);
        }

        // 读取的引用来自活跃性分析，写入的引用来自执行前；`*ReadWrite` 两者都有
        for (id, access) in &accesses {
            if access.is_read() {
                self.resources.decrement_ref(*id);
            }
            if access.is_write() {
                self.resources.decrement_ref(*id);
            }
        }
        self.profiler.end_pass();

        plan_barriers
    }

    /// 合并同一 Pass 对同一资源的所有访问，计算 barrier 并更新资源状态
    fn compute_barriers(&mut self, accesses: &[(RgResourceId, RgAccess)]) -> RgPassBarriers {
        let mut barriers = RgPassBarriers::default();

        for id in accesses.iter().map(|(id, _)| *id).unique() {
            let backing = self.resources.materialize(id);
            let is_image = matches!(backing, RgBacking::Image(_));
            let next = accesses
                .iter()
                .filter(|(other, _)| *other == id)
                .fold(RgResourceState::UNDEFINED, |state, (_, access)| {
                    state.merge(RgResourceState::from_access(*access, is_image))
                });

            match backing {
                RgBacking::Image(pooled) => {
                    let transition = BarrierCalculator::transition(pooled.state(), next, true);
                    pooled.set_state(transition.state);
                    if let Some(barrier) = transition.barrier {
                        log::trace!("image barrier for {}: {:?}", self.resources.name(id), barrier);
                        barriers.image_barriers.push((id, barrier, pooled.resource()));
                    }
                }
                RgBacking::Buffer(pooled) => {
                    let transition = BarrierCalculator::transition(pooled.state(), next, false);
                    pooled.set_state(transition.state);
                    if let Some(barrier) = transition.barrier {
                        log::trace!("buffer barrier for {}: {:?}", self.resources.name(id), barrier);
                        barriers.buffer_barriers.push((id, barrier, pooled.resource()));
                    }
                }
            }
        }
        barriers
    }

    fn rendering_info(&mut self, attachments: &[RgAttachment]) -> GfxRenderingInfo {
        let (colors, depth) = attachments.split_at(attachments.len() - 1);

        let color_attachments = colors
            .iter()
            .filter_map(|attachment| {
                let id = attachment.id?;
                let image = self.resources.get_image(id);
                Some(GfxRenderingAttachment::color(image, attachment.ops, attachment.clear_color))
            })
            .collect_vec();
        let depth_attachment = depth.first().and_then(|attachment| {
            let id = attachment.id?;
            let image = self.resources.get_image(id);
            Some(GfxRenderingAttachment::depth(image, attachment.ops, attachment.clear_depth))
        });

        let first = color_attachments.first().or(depth_attachment.as_ref()).map(|attachment| attachment.image);
        let (extent, layer_count) = first.map_or((vk::Extent2D::default(), 1), |image| {
            (image.desc.extent_2d(), image.desc.array_layers)
        });

        GfxRenderingInfo {
            color_attachments,
            depth_attachment,
            render_area: vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            },
            layer_count,
        }
    }
}

/// `add_pass` 返回的节点，先 `build` 再 `execute`
pub struct RgPassNode<'g> {
    graph: &'g mut RenderGraph,
    index: usize,
}

impl RgPassNode<'_> {
    /// 声明 Pass 的资源访问，返回 `setup` 的结果（通常是创建的资源 ID）
    ///
    /// 完成后 graph 的 last output 更新为这个 Pass 的主输出。
    pub fn build<R>(&mut self, setup: impl FnOnce(&mut RgPassBuilder<'_>) -> R) -> R {
        let graph = &mut *self.graph;
        let mut builder = RgPassBuilder::new(&mut graph.passes[self.index], &mut graph.resources);
        let result = setup(&mut builder);
        let output = builder.output();

        if let Some(output) = output {
            graph.resources.set_last_output(output);
        }
        result
    }

    /// 挂上在命令缓冲区上录制的回调
    ///
    /// # Panic
    /// 重复挂回调时 panic
    pub fn execute(
        &mut self,
        callback: impl FnOnce(&mut RgResources, &mut RgCommandContext<'_>) + 'static,
    ) -> Option<RgResourceId> {
        self.set_execute(RgExecuteFn::Command(Box::new(callback)))
    }

    /// 挂上直接访问设备的回调，执行前会提交之前录制的所有命令
    pub fn execute_on_device(
        &mut self,
        callback: impl FnOnce(&mut RgResources, &dyn GfxDevice) + 'static,
    ) -> Option<RgResourceId> {
        self.set_execute(RgExecuteFn::Device(Box::new(callback)))
    }

    fn set_execute(&mut self, execute: RgExecuteFn) -> Option<RgResourceId> {
        let pass = &mut self.graph.passes[self.index];
        assert!(pass.execute.is_none(), "pass {} already has an execute callback", pass.name);
        pass.execute = Some(execute);
        self.graph.resources.last_output_id()
    }
}

/// [`RenderGraph::scope`] 返回的 guard，drop 时离开 scope
pub struct RgScopeGuard<'g> {
    graph: &'g mut RenderGraph,
}

impl Deref for RgScopeGuard<'_> {
    type Target = RenderGraph;

    fn deref(&self) -> &Self::Target {
        &*self.graph
    }
}

impl DerefMut for RgScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.graph
    }
}

impl Drop for RgScopeGuard<'_> {
    fn drop(&mut self) {
        self.graph.end_scope();
    }
}
