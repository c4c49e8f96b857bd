//! 资源状态
//!
//! 记录一个具体 GPU 资源最近的访问情况，由资源池中的条目持有，跨 Pass、跨帧保留，
//! 用于计算下一次访问前的 barrier。
//!
//! 除了最近一次访问的 stage / access / layout，还单独记录最近一次写入：
//! 连续的多次读取会把 stage / access 合并起来，而写入的结果需要对每个新出现的读取 stage 可见。

use ash::vk;

use crate::render_graph::access::RgAccess;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgResourceState {
    /// 自最近一次写入以来所有访问的 stage 并集
    pub stage: vk::PipelineStageFlags2,
    /// 自最近一次写入以来所有访问的 access 并集
    pub access: vk::AccessFlags2,
    /// 对 buffer 恒为 `UNDEFINED`
    pub layout: vk::ImageLayout,
    /// 最近一次写入的 stage，没有写入时为 `NONE`
    pub write_stage: vk::PipelineStageFlags2,
    /// 最近一次写入的 access，没有写入时为 `NONE`
    pub write_access: vk::AccessFlags2,
}

impl Default for RgResourceState {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

// new & 常量定义
impl RgResourceState {
    /// 刚分配的资源，或者内容不需要保留的外部资源
    pub const UNDEFINED: Self = Self {
        stage: vk::PipelineStageFlags2::NONE,
        access: vk::AccessFlags2::NONE,
        layout: vk::ImageLayout::UNDEFINED,
        write_stage: vk::PipelineStageFlags2::NONE,
        write_access: vk::AccessFlags2::NONE,
    };

    /// 单次访问对应的目标状态
    ///
    /// buffer 的 layout 没有意义，统一为 `UNDEFINED`。
    pub fn from_access(access: RgAccess, is_image: bool) -> Self {
        let info = access.info();
        let (write_stage, write_access) = if access.is_write() {
            (info.stage, info.access)
        } else {
            (vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE)
        };
        Self {
            stage: info.stage,
            access: info.access,
            layout: if is_image { info.layout } else { vk::ImageLayout::UNDEFINED },
            write_stage,
            write_access,
        }
    }

    /// 同一个 Pass 对同一资源的多次访问合并为一个目标状态
    ///
    /// 两次访问要求的 layout 不同时（例如原地生成 mip 时同时作为 transfer src 和 dst），
    /// 使用 `GENERAL`。
    pub fn merge(self, other: Self) -> Self {
        if self.is_none() {
            return other;
        }
        if other.is_none() {
            return self;
        }
        let layout = if self.layout == other.layout { self.layout } else { vk::ImageLayout::GENERAL };
        Self {
            stage: self.stage | other.stage,
            access: self.access | other.access,
            layout,
            write_stage: self.write_stage | other.write_stage,
            write_access: self.write_access | other.write_access,
        }
    }
}

// getters
impl RgResourceState {
    /// 不产生任何访问（`RgAccess::None`）
    #[inline]
    pub fn is_none(&self) -> bool {
        self.stage == vk::PipelineStageFlags2::NONE && self.access == vk::AccessFlags2::NONE
    }

    /// 从未被访问过
    #[inline]
    pub fn is_undefined(&self) -> bool {
        self.is_none() && self.write_access == vk::AccessFlags2::NONE
    }

    #[inline]
    pub fn is_write(&self) -> bool {
        self.write_access != vk::AccessFlags2::NONE
    }
}
