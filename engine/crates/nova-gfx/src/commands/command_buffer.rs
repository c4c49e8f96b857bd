use ash::vk;

/// 命令缓冲区句柄
///
/// 由 `GfxDevice::begin_command_buffer` 分配并处于 recording 状态，
/// 通过 `GfxDevice::submit` 提交后由设备回收，调用方不需要手动释放。
#[derive(Clone, Debug)]
pub struct GfxCommandBuffer {
    pub(crate) vk_handle: vk::CommandBuffer,
    name: String,
}

impl GfxCommandBuffer {
    pub fn new(vk_handle: vk::CommandBuffer, name: impl Into<String>) -> Self {
        Self {
            vk_handle,
            name: name.into(),
        }
    }

    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
