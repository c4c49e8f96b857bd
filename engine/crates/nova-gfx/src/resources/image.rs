use ash::vk;

/// 图像描述
///
/// 同时作为资源池的 key：两个描述完全相等时，对应的 GPU 分配可以互相复用。
/// 因此 extent 使用拆开的 `u32` 字段，而不是 `vk::Extent3D`。
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GfxImageDesc {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub image_type: vk::ImageType,
    pub view_type: vk::ImageViewType,
    pub samples: vk::SampleCountFlags,
}

impl Default for GfxImageDesc {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth: 1,
            format: vk::Format::UNDEFINED,
            usage: vk::ImageUsageFlags::empty(),
            mip_levels: 1,
            array_layers: 1,
            image_type: vk::ImageType::TYPE_2D,
            view_type: vk::ImageViewType::TYPE_2D,
            samples: vk::SampleCountFlags::TYPE_1,
        }
    }
}

// new & builder
impl GfxImageDesc {
    /// 2D 图像，单 mip 单 layer
    pub fn new_2d(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            width,
            height,
            format,
            ..Default::default()
        }
    }

    #[inline]
    pub fn usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    #[inline]
    pub fn mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    /// 多 layer 的 2D 图像使用 `TYPE_2D_ARRAY` 作为默认 view 类型
    #[inline]
    pub fn array_layers(mut self, array_layers: u32) -> Self {
        self.array_layers = array_layers;
        if array_layers > 1 && self.view_type == vk::ImageViewType::TYPE_2D {
            self.view_type = vk::ImageViewType::TYPE_2D_ARRAY;
        }
        self
    }

    #[inline]
    pub fn view_type(mut self, view_type: vk::ImageViewType) -> Self {
        self.view_type = view_type;
        self
    }
}

// getters
impl GfxImageDesc {
    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        vk::Extent3D {
            width: self.width,
            height: self.height,
            depth: self.depth,
        }
    }

    #[inline]
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    /// 根据 format 推断 aspect
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        match self.format {
            vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
                vk::ImageAspectFlags::DEPTH
            }

            vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,

            vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }

            _ => vk::ImageAspectFlags::COLOR,
        }
    }

    #[inline]
    pub fn is_depth_stencil(&self) -> bool {
        self.aspect().intersects(vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL)
    }

    pub fn create_info(&self) -> vk::ImageCreateInfo<'static> {
        vk::ImageCreateInfo::default()
            .image_type(self.image_type)
            .format(self.format)
            .extent(self.extent())
            .mip_levels(self.mip_levels)
            .array_layers(self.array_layers)
            .samples(self.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(self.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
    }
}

/// 一张已经分配好的图像以及覆盖其全部 subresource 的 view
///
/// 只是句柄的拷贝，不拥有资源；生命周期由创建它的 `GfxDevice` 或外部（例如 swapchain）管理。
#[derive(Copy, Clone, Debug)]
pub struct GfxImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub desc: GfxImageDesc,
}
