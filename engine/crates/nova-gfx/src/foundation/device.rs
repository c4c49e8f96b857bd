use ash::vk;

use crate::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use crate::commands::command_buffer::GfxCommandBuffer;
use crate::commands::rendering_info::GfxRenderingInfo;
use crate::resources::buffer::{GfxBuffer, GfxBufferDesc};
use crate::resources::image::{GfxImage, GfxImageDesc};

/// RenderGraph 与 GPU 之间的唯一边界
///
/// 所有方法都只需要 `&self`，实现内部自行处理可变状态；
/// 整个 trait 假定在单线程上使用，因此不要求 `Send + Sync`。
///
/// 设备层面的失败（OOM、device lost）不可恢复，实现直接 panic。
pub trait GfxDevice {
    // resources
    fn create_image(&self, desc: &GfxImageDesc, debug_name: &str) -> GfxImage;
    fn destroy_image(&self, image: GfxImage);
    fn create_buffer(&self, desc: &GfxBufferDesc, debug_name: &str) -> GfxBuffer;
    fn destroy_buffer(&self, buffer: GfxBuffer);

    /// 写入 host visible 的 buffer
    fn write_buffer(&self, buffer: &GfxBuffer, offset: vk::DeviceSize, data: &[u8]);
    /// 读取 host visible 的 buffer，调用方需要保证 GPU 写入已经完成
    fn read_buffer(&self, buffer: &GfxBuffer, offset: vk::DeviceSize, size: usize) -> Vec<u8>;

    // command buffer
    /// 分配一个处于 recording 状态的命令缓冲区
    fn begin_command_buffer(&self, name: &str) -> GfxCommandBuffer;
    /// 结束录制并按顺序提交到队列
    fn submit(&self, cmds: Vec<GfxCommandBuffer>);
    /// 等待队列空闲，用于同步回读
    fn wait_idle(&self);

    // commands
    /// 一次调用中录制所有 barrier
    fn cmd_pipeline_barrier(&self, cmd: &GfxCommandBuffer, images: &[GfxImageBarrier], buffers: &[GfxBufferBarrier]);
    fn cmd_begin_rendering(&self, cmd: &GfxCommandBuffer, info: &GfxRenderingInfo);
    fn cmd_end_rendering(&self, cmd: &GfxCommandBuffer);
    fn cmd_draw(&self, cmd: &GfxCommandBuffer, vertex_count: u32, instance_count: u32);
    fn cmd_dispatch(&self, cmd: &GfxCommandBuffer, group_count: [u32; 3]);
    fn cmd_copy_buffer(&self, cmd: &GfxCommandBuffer, src: &GfxBuffer, dst: &GfxBuffer, size: vk::DeviceSize);
    fn cmd_fill_buffer(&self, cmd: &GfxCommandBuffer, buffer: &GfxBuffer, data: u32);

    // debug
    fn cmd_begin_label(&self, cmd: &GfxCommandBuffer, label: &str, color: [f32; 4]);
    fn cmd_end_label(&self, cmd: &GfxCommandBuffer);
}
