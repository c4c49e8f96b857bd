//! 资源访问类型
//!
//! 把抽象的访问类型（例如 "片段着色器采样"）映射为
//! pipeline stage、access mask、image layout 以及资源需要的 usage flags。
//!
//! usage flags 用于在声明阶段累积资源的全部用途，使最终分配的资源支持每一种声明过的访问；
//! stage / access / layout 用于在执行阶段根据前后两次访问计算 barrier。

use ash::vk;

/// 抽象的资源访问类型
///
/// 所有读访问都排在写访问之前，[`RgAccess::is_write`] 依赖这个顺序。
/// `*ReadWrite` 是写访问，同时也读取原内容（attachment 的 load op 为 `LOAD`）。
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum RgAccess {
    /// 中性元素，不产生 barrier
    #[default]
    None,

    // 读
    IndirectBuffer,
    IndexBuffer,
    VertexBuffer,
    VertexShaderSampleImage,
    VertexShaderReadUniform,
    VertexShaderReadStorage,
    FragmentShaderSampleImage,
    FragmentShaderReadUniform,
    FragmentShaderReadStorage,
    FragmentShaderReadColorInputAttachment,
    FragmentShaderReadDepthInputAttachment,
    ColorAttachmentRead,
    DepthStencilAttachmentRead,
    ComputeShaderSampleImage,
    ComputeShaderReadUniform,
    ComputeShaderReadStorage,
    AnyShaderSampleImage,
    AnyShaderReadUniform,
    AnyShaderReadStorage,
    TransferRead,
    HostRead,

    // 写
    VertexShaderWrite,
    FragmentShaderWrite,
    ColorAttachmentWrite,
    ColorAttachmentReadWrite,
    DepthStencilAttachmentWrite,
    DepthStencilAttachmentReadWrite,
    ComputeShaderWrite,
    AnyShaderWrite,
    TransferWrite,
    HostPreinitialized,
    HostWrite,
}

/// 一种访问类型对应的同步参数和 usage 提示
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RgAccessInfo {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    /// 对 buffer 没有意义，为 `UNDEFINED`
    pub layout: vk::ImageLayout,
    pub buffer_usage: vk::BufferUsageFlags,
    pub image_usage: vk::ImageUsageFlags,
}

impl RgAccessInfo {
    const fn new(
        stage: vk::PipelineStageFlags2,
        access: vk::AccessFlags2,
        buffer_usage: vk::BufferUsageFlags,
        image_usage: vk::ImageUsageFlags,
        layout: vk::ImageLayout,
    ) -> Self {
        Self {
            stage,
            access,
            layout,
            buffer_usage,
            image_usage,
        }
    }
}

const NO_BUFFER: vk::BufferUsageFlags = vk::BufferUsageFlags::empty();
const NO_IMAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::empty();
const FRAGMENT_TESTS: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw() | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
);

impl RgAccess {
    #[inline]
    pub fn is_write(self) -> bool {
        self >= Self::VertexShaderWrite
    }

    /// 需要读取资源原内容的访问：所有读访问以及 `*ReadWrite`
    ///
    /// `None` 也算作读取，使它同样保持资源存活。
    #[inline]
    pub fn is_read(self) -> bool {
        !self.is_write() || matches!(self, Self::ColorAttachmentReadWrite | Self::DepthStencilAttachmentReadWrite)
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self == Self::None
    }

    pub const fn info(self) -> RgAccessInfo {
        use vk::AccessFlags2 as A;
        use vk::BufferUsageFlags as B;
        use vk::ImageLayout as L;
        use vk::ImageUsageFlags as I;
        use vk::PipelineStageFlags2 as S;

        match self {
            Self::None => RgAccessInfo::new(S::NONE, A::NONE, NO_BUFFER, NO_IMAGE, L::UNDEFINED),

            Self::IndirectBuffer => {
                RgAccessInfo::new(S::DRAW_INDIRECT, A::INDIRECT_COMMAND_READ, B::INDIRECT_BUFFER, NO_IMAGE, L::UNDEFINED)
            }
            Self::IndexBuffer => RgAccessInfo::new(S::VERTEX_INPUT, A::INDEX_READ, B::INDEX_BUFFER, NO_IMAGE, L::UNDEFINED),
            Self::VertexBuffer => {
                RgAccessInfo::new(S::VERTEX_INPUT, A::VERTEX_ATTRIBUTE_READ, B::VERTEX_BUFFER, NO_IMAGE, L::UNDEFINED)
            }

            Self::VertexShaderSampleImage => {
                RgAccessInfo::new(S::VERTEX_SHADER, A::SHADER_SAMPLED_READ, NO_BUFFER, I::SAMPLED, L::SHADER_READ_ONLY_OPTIMAL)
            }
            Self::VertexShaderReadUniform => {
                RgAccessInfo::new(S::VERTEX_SHADER, A::UNIFORM_READ, B::UNIFORM_BUFFER, NO_IMAGE, L::UNDEFINED)
            }
            Self::VertexShaderReadStorage => {
                RgAccessInfo::new(S::VERTEX_SHADER, A::SHADER_STORAGE_READ, B::STORAGE_BUFFER, I::STORAGE, L::GENERAL)
            }

            Self::FragmentShaderSampleImage => RgAccessInfo::new(
                S::FRAGMENT_SHADER,
                A::SHADER_SAMPLED_READ,
                NO_BUFFER,
                I::SAMPLED,
                L::SHADER_READ_ONLY_OPTIMAL,
            ),
            Self::FragmentShaderReadUniform => {
                RgAccessInfo::new(S::FRAGMENT_SHADER, A::UNIFORM_READ, B::UNIFORM_BUFFER, NO_IMAGE, L::UNDEFINED)
            }
            Self::FragmentShaderReadStorage => {
                RgAccessInfo::new(S::FRAGMENT_SHADER, A::SHADER_STORAGE_READ, B::STORAGE_BUFFER, I::STORAGE, L::GENERAL)
            }
            Self::FragmentShaderReadColorInputAttachment => RgAccessInfo::new(
                S::FRAGMENT_SHADER,
                A::INPUT_ATTACHMENT_READ,
                NO_BUFFER,
                I::INPUT_ATTACHMENT,
                L::SHADER_READ_ONLY_OPTIMAL,
            ),
            Self::FragmentShaderReadDepthInputAttachment => RgAccessInfo::new(
                S::FRAGMENT_SHADER,
                A::INPUT_ATTACHMENT_READ,
                NO_BUFFER,
                I::INPUT_ATTACHMENT,
                L::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            ),

            Self::ColorAttachmentRead => RgAccessInfo::new(
                S::COLOR_ATTACHMENT_OUTPUT,
                A::COLOR_ATTACHMENT_READ,
                NO_BUFFER,
                I::COLOR_ATTACHMENT,
                L::COLOR_ATTACHMENT_OPTIMAL,
            ),
            Self::DepthStencilAttachmentRead => RgAccessInfo::new(
                FRAGMENT_TESTS,
                A::DEPTH_STENCIL_ATTACHMENT_READ,
                NO_BUFFER,
                I::DEPTH_STENCIL_ATTACHMENT,
                L::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            ),

            Self::ComputeShaderSampleImage => RgAccessInfo::new(
                S::COMPUTE_SHADER,
                A::SHADER_SAMPLED_READ,
                NO_BUFFER,
                I::SAMPLED,
                L::SHADER_READ_ONLY_OPTIMAL,
            ),
            Self::ComputeShaderReadUniform => {
                RgAccessInfo::new(S::COMPUTE_SHADER, A::UNIFORM_READ, B::UNIFORM_BUFFER, NO_IMAGE, L::UNDEFINED)
            }
            Self::ComputeShaderReadStorage => {
                RgAccessInfo::new(S::COMPUTE_SHADER, A::SHADER_STORAGE_READ, B::STORAGE_BUFFER, I::STORAGE, L::GENERAL)
            }

            Self::AnyShaderSampleImage => {
                RgAccessInfo::new(S::ALL_COMMANDS, A::SHADER_SAMPLED_READ, NO_BUFFER, I::SAMPLED, L::SHADER_READ_ONLY_OPTIMAL)
            }
            Self::AnyShaderReadUniform => {
                RgAccessInfo::new(S::ALL_COMMANDS, A::UNIFORM_READ, B::UNIFORM_BUFFER, NO_IMAGE, L::UNDEFINED)
            }
            Self::AnyShaderReadStorage => {
                RgAccessInfo::new(S::ALL_COMMANDS, A::SHADER_STORAGE_READ, B::STORAGE_BUFFER, I::STORAGE, L::GENERAL)
            }

            Self::TransferRead => {
                RgAccessInfo::new(S::TRANSFER, A::TRANSFER_READ, B::TRANSFER_SRC, I::TRANSFER_SRC, L::TRANSFER_SRC_OPTIMAL)
            }
            Self::HostRead => RgAccessInfo::new(S::HOST, A::HOST_READ, NO_BUFFER, NO_IMAGE, L::GENERAL),

            Self::VertexShaderWrite => {
                RgAccessInfo::new(S::VERTEX_SHADER, A::SHADER_STORAGE_WRITE, B::STORAGE_BUFFER, I::STORAGE, L::GENERAL)
            }
            Self::FragmentShaderWrite => {
                RgAccessInfo::new(S::FRAGMENT_SHADER, A::SHADER_STORAGE_WRITE, B::STORAGE_BUFFER, I::STORAGE, L::GENERAL)
            }
            Self::ColorAttachmentWrite => RgAccessInfo::new(
                S::COLOR_ATTACHMENT_OUTPUT,
                A::COLOR_ATTACHMENT_WRITE,
                NO_BUFFER,
                I::COLOR_ATTACHMENT,
                L::COLOR_ATTACHMENT_OPTIMAL,
            ),
            Self::ColorAttachmentReadWrite => RgAccessInfo::new(
                S::COLOR_ATTACHMENT_OUTPUT,
                A::from_raw(A::COLOR_ATTACHMENT_READ.as_raw() | A::COLOR_ATTACHMENT_WRITE.as_raw()),
                NO_BUFFER,
                I::COLOR_ATTACHMENT,
                L::COLOR_ATTACHMENT_OPTIMAL,
            ),
            Self::DepthStencilAttachmentWrite => RgAccessInfo::new(
                FRAGMENT_TESTS,
                A::DEPTH_STENCIL_ATTACHMENT_WRITE,
                NO_BUFFER,
                I::DEPTH_STENCIL_ATTACHMENT,
                L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ),
            Self::DepthStencilAttachmentReadWrite => RgAccessInfo::new(
                FRAGMENT_TESTS,
                A::from_raw(A::DEPTH_STENCIL_ATTACHMENT_READ.as_raw() | A::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()),
                NO_BUFFER,
                I::DEPTH_STENCIL_ATTACHMENT,
                L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ),
            Self::ComputeShaderWrite => {
                RgAccessInfo::new(S::COMPUTE_SHADER, A::SHADER_STORAGE_WRITE, B::STORAGE_BUFFER, I::STORAGE, L::GENERAL)
            }
            Self::AnyShaderWrite => {
                RgAccessInfo::new(S::ALL_COMMANDS, A::SHADER_STORAGE_WRITE, B::STORAGE_BUFFER, I::STORAGE, L::GENERAL)
            }
            Self::TransferWrite => {
                RgAccessInfo::new(S::TRANSFER, A::TRANSFER_WRITE, B::TRANSFER_DST, I::TRANSFER_DST, L::TRANSFER_DST_OPTIMAL)
            }
            Self::HostPreinitialized => RgAccessInfo::new(S::HOST, A::HOST_WRITE, NO_BUFFER, NO_IMAGE, L::PREINITIALIZED),
            Self::HostWrite => RgAccessInfo::new(S::HOST, A::HOST_WRITE, NO_BUFFER, NO_IMAGE, L::GENERAL),
        }
    }
}
