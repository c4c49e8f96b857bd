//! Pass 定义
//!
//! Pass 分两个阶段声明：`build` 记录资源访问和 attachment，`execute` 挂上唯一的延迟回调。
//! 回调只有两种形态，用 [`RgExecuteFn`] 这个封闭的枚举表示：
//! - [`RgExecuteFn::Command`]：在命令缓冲区上录制，声明了 attachment 时在 render pass 内执行
//! - [`RgExecuteFn::Device`]：直接访问设备，用于非绘制的工作（例如同步回读）

use ash::vk;
use nova_gfx::commands::command_buffer::GfxCommandBuffer;
use nova_gfx::commands::rendering_info::GfxAttachmentOps;
use nova_gfx::foundation::device::GfxDevice;
use nova_gfx::resources::buffer::GfxBuffer;
use smallvec::SmallVec;

use crate::render_graph::access::RgAccess;
use crate::render_graph::resource::{MAX_COLOR_ATTACHMENTS, RgResourceId};
use crate::render_graph::resources::RgResources;
use crate::render_graph::scope::RgScopeStack;

/// attachment 数组中 depth/stencil 的下标，排在所有 color attachment 之后
pub const DEPTH_ATTACHMENT_INDEX: usize = MAX_COLOR_ATTACHMENTS;

pub type RgCommandFn = Box<dyn FnOnce(&mut RgResources, &mut RgCommandContext<'_>)>;
pub type RgDeviceFn = Box<dyn FnOnce(&mut RgResources, &dyn GfxDevice)>;

/// Pass 的执行回调
pub enum RgExecuteFn {
    Command(RgCommandFn),
    Device(RgDeviceFn),
}

impl RgExecuteFn {
    #[inline]
    pub fn is_command(&self) -> bool {
        matches!(self, Self::Command(_))
    }
}

impl std::fmt::Debug for RgExecuteFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command(_) => write!(f, "RgExecuteFn::Command"),
            Self::Device(_) => write!(f, "RgExecuteFn::Device"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RgAttachment {
    pub id: Option<RgResourceId>,
    pub ops: GfxAttachmentOps,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
}

impl Default for RgAttachment {
    fn default() -> Self {
        Self {
            id: None,
            ops: GfxAttachmentOps::default(),
            clear_color: [0.0; 4],
            clear_depth: 1.0,
        }
    }
}

/// 跨帧读取的声明：`frames` 帧之后会读取 `id`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RgFutureRead {
    pub id: RgResourceId,
    pub access: RgAccess,
    pub frames: u32,
}

/// 一个 Pass 最多声明的跨帧读取数量
pub const MAX_FUTURE_READS: usize = 2;

#[derive(Debug)]
pub struct RgPass {
    pub(crate) name: String,
    pub(crate) accesses: Vec<(RgResourceId, RgAccess)>,
    pub(crate) future_reads: SmallVec<[RgFutureRead; MAX_FUTURE_READS]>,
    pub(crate) attachments: [RgAttachment; MAX_COLOR_ATTACHMENTS + 1],
    pub(crate) primary_attachment: Option<usize>,
    /// 不参与裁剪，例如有外部副作用的回读 Pass
    pub(crate) required: bool,
    /// 活跃性分析的结果
    pub(crate) active: bool,
    /// 在 Pass 前后强制提交命令
    pub(crate) flush_commands: bool,
    /// 声明时的 scope 栈快照
    pub(crate) scopes: RgScopeStack,
    pub(crate) execute: Option<RgExecuteFn>,
}

impl RgPass {
    pub(crate) fn new(name: String, scopes: RgScopeStack) -> Self {
        Self {
            name,
            accesses: Vec::new(),
            future_reads: SmallVec::new(),
            attachments: [RgAttachment::default(); MAX_COLOR_ATTACHMENTS + 1],
            primary_attachment: None,
            required: false,
            active: false,
            flush_commands: false,
            scopes,
            execute: None,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[inline]
    pub fn has_attachments(&self) -> bool {
        self.attachments.iter().any(|attachment| attachment.id.is_some())
    }

    #[inline]
    pub fn color_attachments(&self) -> &[RgAttachment] {
        &self.attachments[..MAX_COLOR_ATTACHMENTS]
    }

    #[inline]
    pub fn depth_attachment(&self) -> &RgAttachment {
        &self.attachments[DEPTH_ATTACHMENT_INDEX]
    }

    /// Pass 的主输出：显式指定的 attachment，否则 color 0，再否则 depth
    pub fn primary_output(&self) -> Option<RgResourceId> {
        match self.primary_attachment {
            Some(index) => self.attachments[index].id,
            None => self.attachments[0].id.or(self.depth_attachment().id),
        }
    }

    /// 写入的资源，按声明顺序
    pub fn writes(&self) -> impl Iterator<Item = RgResourceId> + '_ {
        self.accesses.iter().filter(|(_, access)| access.is_write()).map(|(id, _)| *id)
    }

    /// 读取原内容的资源，按声明顺序（包括 `*ReadWrite` 以及 `RgAccess::None`）
    pub fn reads(&self) -> impl Iterator<Item = RgResourceId> + '_ {
        self.accesses.iter().filter(|(_, access)| access.is_read()).map(|(id, _)| *id)
    }
}

/// Command 形态回调的上下文
pub struct RgCommandContext<'a> {
    cmd: &'a GfxCommandBuffer,
    device: &'a dyn GfxDevice,
    render_area: Option<vk::Rect2D>,
}

impl<'a> RgCommandContext<'a> {
    pub(crate) fn new(cmd: &'a GfxCommandBuffer, device: &'a dyn GfxDevice, render_area: Option<vk::Rect2D>) -> Self {
        Self {
            cmd,
            device,
            render_area,
        }
    }

    #[inline]
    pub fn cmd(&self) -> &GfxCommandBuffer {
        self.cmd
    }

    #[inline]
    pub fn device(&self) -> &dyn GfxDevice {
        self.device
    }

    #[inline]
    pub fn in_render_pass(&self) -> bool {
        self.render_area.is_some()
    }

    /// render pass 的区域，不在 render pass 内时为 `None`
    #[inline]
    pub fn render_area(&self) -> Option<vk::Rect2D> {
        self.render_area
    }

    pub fn draw(&self, vertex_count: u32, instance_count: u32) {
        assert!(self.in_render_pass(), "draw outside of a render pass in {}", self.cmd.name());
        self.device.cmd_draw(self.cmd, vertex_count, instance_count);
    }

    pub fn dispatch(&self, group_count: [u32; 3]) {
        assert!(!self.in_render_pass(), "dispatch inside a render pass in {}", self.cmd.name());
        self.device.cmd_dispatch(self.cmd, group_count);
    }

    pub fn copy_buffer(&self, src: &GfxBuffer, dst: &GfxBuffer, size: vk::DeviceSize) {
        self.device.cmd_copy_buffer(self.cmd, src, dst, size);
    }

    pub fn fill_buffer(&self, buffer: &GfxBuffer, data: u32) {
        self.device.cmd_fill_buffer(self.cmd, buffer, data);
    }
}
