use ash::vk;

use crate::resources::image::GfxImage;

/// attachment 的 load / store 操作
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxAttachmentOps {
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
}

impl Default for GfxAttachmentOps {
    fn default() -> Self {
        Self {
            load_op: vk::AttachmentLoadOp::DONT_CARE,
            store_op: vk::AttachmentStoreOp::STORE,
        }
    }
}

impl GfxAttachmentOps {
    pub const CLEAR_STORE: Self = Self {
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
    };
    pub const LOAD_STORE: Self = Self {
        load_op: vk::AttachmentLoadOp::LOAD,
        store_op: vk::AttachmentStoreOp::STORE,
    };
    pub const DONT_CARE_STORE: Self = Self {
        load_op: vk::AttachmentLoadOp::DONT_CARE,
        store_op: vk::AttachmentStoreOp::STORE,
    };
}

/// dynamic rendering 的单个 attachment
#[derive(Copy, Clone)]
pub struct GfxRenderingAttachment {
    pub image: GfxImage,
    pub layout: vk::ImageLayout,
    pub ops: GfxAttachmentOps,
    pub clear_value: vk::ClearValue,
}

impl std::fmt::Debug for GfxRenderingAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // ClearValue 是 union，不打印
        f.debug_struct("GfxRenderingAttachment")
            .field("image", &self.image.image)
            .field("layout", &self.layout)
            .field("ops", &self.ops)
            .finish()
    }
}

impl GfxRenderingAttachment {
    pub fn color(image: GfxImage, ops: GfxAttachmentOps, clear_color: [f32; 4]) -> Self {
        Self {
            image,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ops,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue { float32: clear_color },
            },
        }
    }

    pub fn depth(image: GfxImage, ops: GfxAttachmentOps, clear_depth: f32) -> Self {
        Self {
            image,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ops,
            clear_value: vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: clear_depth,
                    stencil: 0,
                },
            },
        }
    }

    fn vk_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_layout(self.layout)
            .image_view(self.image.view)
            .load_op(self.ops.load_op)
            .store_op(self.ops.store_op)
            .clear_value(self.clear_value)
    }
}

/// 一次 `cmd_begin_rendering` 所需的全部信息
#[derive(Clone, Debug, Default)]
pub struct GfxRenderingInfo {
    pub color_attachments: Vec<GfxRenderingAttachment>,
    pub depth_attachment: Option<GfxRenderingAttachment>,
    pub render_area: vk::Rect2D,
    pub layer_count: u32,
}

impl GfxRenderingInfo {
    /// 转换为 vk attachment 结构体
    ///
    /// `vk::RenderingInfo` 会借用这两个返回值，调用方需要在录制期间持有它们。
    pub fn vk_attachments(
        &self,
    ) -> (Vec<vk::RenderingAttachmentInfo<'static>>, Option<vk::RenderingAttachmentInfo<'static>>) {
        let color_infos = self.color_attachments.iter().map(GfxRenderingAttachment::vk_info).collect();
        let depth_info = self.depth_attachment.as_ref().map(GfxRenderingAttachment::vk_info);
        (color_infos, depth_info)
    }
}
