//! Vulkan GFX 抽象层
//!
//! RenderGraph 只通过 [`foundation::device::GfxDevice`] 与 GPU 交互：
//! - [`foundation::ash_device::GfxAshDevice`]：基于 ash + vk-mem 的真实设备
//! - [`foundation::recording_device::GfxRecordingDevice`]：只记录调用的设备，用于测试和无头运行
//!
//! [`foundation::headless::GfxHeadlessContext`] 在没有窗口的情况下创建 `GfxAshDevice`。
//!
//! 资源描述（[`resources::image::GfxImageDesc`]、[`resources::buffer::GfxBufferDesc`]）
//! 实现了 `Hash + Eq`，可以直接作为资源池的 key。

pub mod basic;
pub mod commands;
pub mod foundation;
pub mod resources;
