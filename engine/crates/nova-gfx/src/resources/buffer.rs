use ash::vk;

/// 缓冲区描述，同样作为资源池的 key
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GfxBufferDesc {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    /// CPU 可写（uniform、readback 等），否则为 device local
    pub host_visible: bool,
}

impl GfxBufferDesc {
    pub fn new(size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Self {
        Self {
            size,
            usage,
            host_visible: false,
        }
    }

    /// host visible 的 uniform buffer
    pub fn new_uniform(size: vk::DeviceSize) -> Self {
        Self {
            size,
            usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
            host_visible: true,
        }
    }

    #[inline]
    pub fn host_visible(mut self, host_visible: bool) -> Self {
        self.host_visible = host_visible;
        self
    }

    pub fn create_info(&self) -> vk::BufferCreateInfo<'static> {
        vk::BufferCreateInfo::default()
            .size(self.size)
            .usage(self.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
    }
}

/// 一个已经分配好的缓冲区句柄
#[derive(Copy, Clone, Debug)]
pub struct GfxBuffer {
    pub buffer: vk::Buffer,
    pub desc: GfxBufferDesc,
}
