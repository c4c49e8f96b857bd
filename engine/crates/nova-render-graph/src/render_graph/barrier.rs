//! Barrier 自动计算
//!
//! 根据资源上一次的状态和本次访问，生成最少的 ImageMemoryBarrier2 / BufferMemoryBarrier2。
//!
//! 规则：
//! - 本次访问为 `None`：不产生 barrier，状态不变
//! - 本次访问包含写，或者 image 的 layout 需要改变：产生 barrier，
//!   src 为上一次写入以及之后所有读取的 stage，src access 只包含写入位
//! - 只读，layout 不变：若上一次写入已经对本次的 stage / access 可见，则不产生 barrier，
//!   否则产生一个只针对上一次写入的 barrier；两种情况都会把本次读取合并进状态

use ash::vk;
use nova_gfx::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use nova_gfx::resources::buffer::GfxBuffer;
use nova_gfx::resources::image::GfxImage;

use crate::render_graph::resource::RgResourceId;
use crate::render_graph::resource_state::RgResourceState;

/// 一个资源在某个 Pass 之前需要的 barrier
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgBarrierDesc {
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}

impl RgBarrierDesc {
    #[inline]
    pub fn has_layout_change(&self) -> bool {
        self.old_layout != self.new_layout
    }

    /// 转换为 GfxImageBarrier，覆盖 image 的全部 mip 和 layer
    pub fn to_gfx_image_barrier(&self, image: &GfxImage) -> GfxImageBarrier {
        GfxImageBarrier::new()
            .image(image.image)
            .layout_transfer(self.old_layout, self.new_layout)
            .src_mask(self.src_stage, self.src_access)
            .dst_mask(self.dst_stage, self.dst_access)
            .image_aspect_flag(image.desc.aspect())
            .subresource(image.desc.mip_levels, image.desc.array_layers)
    }

    /// 转换为 GfxBufferBarrier，覆盖整个 buffer
    pub fn to_gfx_buffer_barrier(&self, buffer: &GfxBuffer) -> GfxBufferBarrier {
        GfxBufferBarrier::new()
            .buffer(buffer.buffer, 0, vk::WHOLE_SIZE)
            .src_mask(self.src_stage, self.src_access)
            .dst_mask(self.dst_stage, self.dst_access)
    }
}

/// 一次状态转换的结果
#[derive(Clone, Copy, Debug)]
pub struct RgTransition {
    pub barrier: Option<RgBarrierDesc>,
    /// 访问完成后资源的状态
    pub state: RgResourceState,
}

/// Barrier 计算器
pub struct BarrierCalculator;

impl BarrierCalculator {
    /// 计算从 `last` 状态到 `next` 访问需要的 barrier
    ///
    /// # 参数
    /// - `last`: 资源上一次访问后留下的状态
    /// - `next`: 本次访问的目标状态（同一 Pass 内的多次访问已经合并）
    /// - `is_image`: buffer 不关心 layout
    pub fn transition(last: RgResourceState, next: RgResourceState, is_image: bool) -> RgTransition {
        if next.is_none() {
            return RgTransition {
                barrier: None,
                state: last,
            };
        }

        let layout_change = is_image && last.layout != next.layout;

        if next.is_write() || layout_change {
            // 首次写入 buffer，没有需要等待的东西
            if !layout_change && last.is_undefined() {
                return RgTransition {
                    barrier: None,
                    state: next,
                };
            }

            let barrier = RgBarrierDesc {
                src_stage: last.stage | last.write_stage,
                src_access: last.write_access,
                dst_stage: next.stage,
                dst_access: next.access,
                old_layout: last.layout,
                new_layout: next.layout,
            };
            // 只读访问改变 layout 后，之前的写入已经通过这个 barrier 可见
            let state = if next.is_write() {
                next
            } else {
                RgResourceState {
                    write_stage: last.write_stage,
                    write_access: last.write_access,
                    ..next
                }
            };
            return RgTransition {
                barrier: Some(barrier),
                state,
            };
        }

        // 只读，layout 不变
        let merged = RgResourceState {
            stage: last.stage | next.stage,
            access: last.access | next.access,
            ..last
        };
        let already_visible = last.stage.contains(next.stage) && last.access.contains(next.access);
        if !last.is_write() || already_visible {
            return RgTransition {
                barrier: None,
                state: merged,
            };
        }

        RgTransition {
            barrier: Some(RgBarrierDesc {
                src_stage: last.write_stage,
                src_access: last.write_access,
                dst_stage: next.stage,
                dst_access: next.access,
                old_layout: last.layout,
                new_layout: next.layout,
            }),
            state: merged,
        }
    }
}

/// Pass 执行前需要的 Barrier 集合
#[derive(Clone, Debug, Default)]
pub struct RgPassBarriers {
    pub image_barriers: Vec<(RgResourceId, RgBarrierDesc, GfxImage)>,
    pub buffer_barriers: Vec<(RgResourceId, RgBarrierDesc, GfxBuffer)>,
}

impl RgPassBarriers {
    #[inline]
    pub fn has_barriers(&self) -> bool {
        !self.image_barriers.is_empty() || !self.buffer_barriers.is_empty()
    }

    #[inline]
    pub fn barrier_count(&self) -> usize {
        self.image_barriers.len() + self.buffer_barriers.len()
    }

    pub fn gfx_image_barriers(&self) -> Vec<GfxImageBarrier> {
        self.image_barriers.iter().map(|(_, desc, image)| desc.to_gfx_image_barrier(image)).collect()
    }

    pub fn gfx_buffer_barriers(&self) -> Vec<GfxBufferBarrier> {
        self.buffer_barriers.iter().map(|(_, desc, buffer)| desc.to_gfx_buffer_barrier(buffer)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_graph::access::RgAccess;

    fn image_state(access: RgAccess) -> RgResourceState {
        RgResourceState::from_access(access, true)
    }

    fn buffer_state(access: RgAccess) -> RgResourceState {
        RgResourceState::from_access(access, false)
    }

    #[test]
    fn test_image_barrier_layout_change() {
        let t = BarrierCalculator::transition(
            RgResourceState::UNDEFINED,
            image_state(RgAccess::ColorAttachmentWrite),
            true,
        );
        let barrier = t.barrier.unwrap();
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.src_access, vk::AccessFlags2::NONE);
        assert!(t.state.is_write());
    }

    #[test]
    fn test_image_barrier_write_to_read() {
        let written = image_state(RgAccess::ColorAttachmentWrite);
        let t = BarrierCalculator::transition(written, image_state(RgAccess::FragmentShaderSampleImage), true);
        let barrier = t.barrier.unwrap();
        assert_eq!(barrier.src_stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(barrier.src_access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
        assert_eq!(barrier.dst_stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(barrier.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_image_barrier_read_to_read() {
        let written = image_state(RgAccess::ColorAttachmentWrite);
        let first = BarrierCalculator::transition(written, image_state(RgAccess::FragmentShaderSampleImage), true);
        assert!(first.barrier.is_some());

        // 同 layout 同 stage 的第二次读取不需要 barrier
        let second = BarrierCalculator::transition(first.state, image_state(RgAccess::FragmentShaderSampleImage), true);
        assert!(second.barrier.is_none());
        assert_eq!(second.state, first.state);
    }

    #[test]
    fn test_read_in_new_stage_waits_for_write_only() {
        let written = image_state(RgAccess::ColorAttachmentWrite);
        let fragment = BarrierCalculator::transition(written, image_state(RgAccess::FragmentShaderSampleImage), true);
        let compute =
            BarrierCalculator::transition(fragment.state, image_state(RgAccess::ComputeShaderSampleImage), true);

        let barrier = compute.barrier.unwrap();
        assert!(!barrier.has_layout_change());
        assert_eq!(barrier.src_stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert!(compute.state.stage.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
        assert!(compute.state.stage.contains(vk::PipelineStageFlags2::COMPUTE_SHADER));
    }

    #[test]
    fn test_write_after_read_waits_for_readers() {
        let read = buffer_state(RgAccess::FragmentShaderReadStorage);
        let t = BarrierCalculator::transition(read, buffer_state(RgAccess::ComputeShaderWrite), false);
        let barrier = t.barrier.unwrap();
        assert_eq!(barrier.src_stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(barrier.src_access, vk::AccessFlags2::NONE);
    }

    #[test]
    fn test_buffer_reads_without_writer_need_nothing() {
        let t = BarrierCalculator::transition(
            RgResourceState::UNDEFINED,
            buffer_state(RgAccess::AnyShaderReadUniform),
            false,
        );
        assert!(t.barrier.is_none());

        let t = BarrierCalculator::transition(t.state, buffer_state(RgAccess::VertexShaderReadUniform), false);
        assert!(t.barrier.is_none());
    }

    #[test]
    fn test_first_buffer_write_needs_nothing() {
        let t = BarrierCalculator::transition(RgResourceState::UNDEFINED, buffer_state(RgAccess::TransferWrite), false);
        assert!(t.barrier.is_none());
        assert!(t.state.is_write());
    }

    #[test]
    fn test_none_access_is_neutral() {
        let written = image_state(RgAccess::ComputeShaderWrite);
        let t = BarrierCalculator::transition(written, image_state(RgAccess::None), true);
        assert!(t.barrier.is_none());
        assert_eq!(t.state, written);
    }
}
