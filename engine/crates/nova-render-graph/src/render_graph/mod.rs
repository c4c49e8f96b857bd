//! RenderGraph - 按帧声明的渲染图
//!
//! # 核心概念
//!
//! - **RgResourceId**: 逻辑资源句柄，只在产生它的那一帧有效（跨帧读取会把它延续到下一帧）
//! - **RgAccess**: 抽象的访问类型，映射为 stage / access / layout / usage
//! - **RgPass**: 一组资源访问加上一个延迟执行的回调
//! - **RgResources**: 资源注册表，负责命名、引用计数、资源池和帧推进
//! - **RenderGraph**: 每帧的调度：活跃性分析、barrier、执行、提交
//!
//! # 使用示例
//!
//! ```ignore
//! let mut graph = RenderGraph::new(device);
//!
//! loop {
//!     let mut pass = graph.add_pass("Taa");
//!     pass.build(|builder| {
//!         builder.read_previous_frame("History", RgAccess::FragmentShaderSampleImage, 1);
//!         builder.read("Hdr", RgAccess::FragmentShaderSampleImage);
//!         builder.output_color_attachment(0, "History", desc, GfxAttachmentOps::DONT_CARE_STORE);
//!         builder.require_pass();
//!     });
//!     pass.execute(|_resources, ctx| ctx.draw(3, 1));
//!
//!     graph.execute();
//! }
//! ```
//!
//! # 模块结构
//!
//! - `access`: 访问类型表
//! - `resource_state` / `barrier`: 资源状态和 barrier 计算
//! - `pool`: 以描述为 key 的资源池
//! - `resource` / `scope` / `resources`: 逻辑资源、命名空间和资源注册表
//! - `pass` / `pass_builder`: Pass 定义和构建器
//! - `graph`: 调度
//! - `plan` / `profiling`: 执行计划打印和性能标记

mod access;
mod barrier;
mod config;
mod error;
mod graph;
mod pass;
mod pass_builder;
mod plan;
mod pool;
mod profiling;
mod resource;
mod resource_state;
mod resources;
mod scope;

// Re-exports
pub use access::{RgAccess, RgAccessInfo};
pub use barrier::{BarrierCalculator, RgBarrierDesc, RgPassBarriers, RgTransition};
pub use config::RgConfig;
pub use error::{RgError, RgResult};
pub use graph::{RenderGraph, RgPassNode, RgScopeGuard};
pub use pass::{
    DEPTH_ATTACHMENT_INDEX, MAX_FUTURE_READS, RgAttachment, RgCommandContext, RgCommandFn, RgDeviceFn, RgExecuteFn,
    RgFutureRead, RgPass,
};
pub use pass_builder::RgPassBuilder;
pub use plan::{RgExecutionPlan, RgPlanBarrier, RgPlanPass, format_access_flags, format_pipeline_stage};
pub use pool::{RgPool, RgPoolable, RgPooled, RgPooledBuffer, RgPooledImage};
pub use profiling::{RgPhaseKind, RgPhaseRecord};
pub use resource::{
    LAST_OUTPUT_NAME, MAX_COLOR_ATTACHMENTS, MAX_RESOURCE_SCOPE_DEPTH, MAX_RESOURCE_SCOPES, RESOURCE_FRAME_COUNT,
    RgResource, RgResourceId, RgResourceInfo, RgResourceRef,
};
pub use resource_state::RgResourceState;
pub use resources::RgResources;
pub use scope::{RgScopeId, RgScopeStack};
