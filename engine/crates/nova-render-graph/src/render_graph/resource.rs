//! RenderGraph 资源定义
//!
//! [`RgResourceId`] 是 graph 内部的逻辑句柄，只在产生它的那一帧（或者被跨帧读取延续到的下一帧）有效。
//! 它和具体的 GPU 分配分离：同一个 ID 在 Pass 执行时才从资源池中取得实际的 image / buffer。

use nova_gfx::resources::buffer::GfxBufferDesc;
use nova_gfx::resources::image::GfxImageDesc;

use crate::render_graph::resources::RgResources;

/// 每个名字表、引用计数按帧双缓冲的帧数
pub const RESOURCE_FRAME_COUNT: usize = 2;
/// scope 嵌套的最大深度（包含根 scope）
pub const MAX_RESOURCE_SCOPE_DEPTH: usize = 4;
/// scope arena 的容量，scope id 使用 u8 存储
pub const MAX_RESOURCE_SCOPES: usize = u8::MAX as usize;
pub const MAX_COLOR_ATTACHMENTS: usize = 4;

/// scope 关闭时自动绑定的别名，指向 scope 内最后一个 Pass 的输出
pub const LAST_OUTPUT_NAME: &str = "LastOutput";

slotmap::new_key_type! {
    /// Graph 内部的资源句柄（带代际，回收后旧句柄不会误指向新资源）
    pub struct RgResourceId;
}

/// 逻辑资源
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RgResource {
    /// 查询不到的资源
    #[default]
    Undefined,
    Image {
        desc: GfxImageDesc,
        /// 由外部提供（例如 swapchain image），不进入资源池
        external: bool,
    },
    Buffer {
        desc: GfxBufferDesc,
        external: bool,
    },
    /// 通过 `reserve_id` 预留的名字，生产者还没有声明
    Future,
}

impl RgResource {
    pub fn image(desc: GfxImageDesc) -> Self {
        Self::Image { desc, external: false }
    }

    pub fn buffer(desc: GfxBufferDesc) -> Self {
        Self::Buffer { desc, external: false }
    }

    #[inline]
    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }

    #[inline]
    pub fn is_buffer(&self) -> bool {
        matches!(self, Self::Buffer { .. })
    }

    /// 有具体的描述，可以被分配
    #[inline]
    pub fn is_concrete(&self) -> bool {
        self.is_image() || self.is_buffer()
    }

    pub fn image_desc(&self) -> Option<&GfxImageDesc> {
        match self {
            Self::Image { desc, .. } => Some(desc),
            _ => None,
        }
    }

    pub fn buffer_desc(&self) -> Option<&GfxBufferDesc> {
        match self {
            Self::Buffer { desc, .. } => Some(desc),
            _ => None,
        }
    }
}

/// 可以解析为资源 ID 的东西：ID 本身，或者资源名
///
/// 名字按当前 scope 栈由内向外查找，也可以使用 `Scope.Name` 形式的全限定名。
/// 查找不到时 panic，可选资源请使用 [`RgResources::get_id`]。
pub trait RgResourceRef {
    fn resolve(&self, resources: &RgResources) -> RgResourceId;
}

impl RgResourceRef for RgResourceId {
    fn resolve(&self, resources: &RgResources) -> RgResourceId {
        assert!(resources.contains(*self), "resource id {:?} is not registered", self);
        *self
    }
}

impl RgResourceRef for &str {
    fn resolve(&self, resources: &RgResources) -> RgResourceId {
        resources.get_id(self, 0).unwrap_or_else(|| panic!("resource {} not found", self))
    }
}

impl RgResourceRef for String {
    fn resolve(&self, resources: &RgResources) -> RgResourceId {
        self.as_str().resolve(resources)
    }
}

/// 资源内省信息
#[derive(Clone, Debug, PartialEq)]
pub struct RgResourceInfo<D> {
    /// 全限定名
    pub name: String,
    pub id: RgResourceId,
    pub desc: D,
    pub ref_count: u32,
}
