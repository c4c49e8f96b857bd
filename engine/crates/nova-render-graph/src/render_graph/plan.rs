//! 执行计划
//!
//! 每帧执行时记录每个 Pass 是否活跃、访问了哪些资源、在它之前插入了哪些 barrier，
//! 用于调试打印以及测试检查。

use ash::vk;

use crate::render_graph::access::RgAccess;
use crate::render_graph::barrier::RgBarrierDesc;

#[derive(Clone, Debug)]
pub struct RgPlanBarrier {
    /// 资源的全限定名
    pub resource: String,
    pub is_image: bool,
    pub desc: RgBarrierDesc,
}

#[derive(Clone, Debug)]
pub struct RgPlanPass {
    pub name: String,
    pub active: bool,
    /// 回调直接访问设备，而不是在命令缓冲区上录制
    pub on_device: bool,
    pub accesses: Vec<(String, RgAccess)>,
    pub barriers: Vec<RgPlanBarrier>,
}

/// 一帧的执行计划，Pass 按声明顺序排列（包括被裁剪的 Pass）
#[derive(Clone, Debug, Default)]
pub struct RgExecutionPlan {
    pub frame_index: u64,
    pub passes: Vec<RgPlanPass>,
}

impl RgExecutionPlan {
    pub fn pass(&self, name: &str) -> Option<&RgPlanPass> {
        self.passes.iter().find(|pass| pass.name == name)
    }

    pub fn active_pass_names(&self) -> Vec<&str> {
        self.passes.iter().filter(|pass| pass.active).map(|pass| pass.name.as_str()).collect()
    }

    pub fn barrier_count(&self) -> usize {
        self.passes.iter().map(|pass| pass.barriers.len()).sum()
    }

    /// 打印执行计划（用于调试）
    pub fn print(&self) {
        let active = self.active_pass_names();
        log::info!("╔══════════════════════════════════════════════════════════════════╗");
        log::info!("║ RenderGraph Execution Plan, frame {}", self.frame_index);
        log::info!("║ Passes: {} declared, {} active: [{}]", self.passes.len(), active.len(), active.join(" → "));
        log::info!("╚══════════════════════════════════════════════════════════════════╝");

        for pass in &self.passes {
            if !pass.active {
                log::info!("  (pruned) \"{}\"", pass.name);
                continue;
            }

            let kind = if pass.on_device { " (device)" } else { "" };
            log::info!("┌─ Pass: \"{}\"{}", pass.name, kind);
            for (name, access) in &pass.accesses {
                let marker = if access.is_write() { "✏️ " } else { "📖" };
                let info = access.info();
                log::info!(
                    "│   {} \"{}\" {:?} (stage: {}, access: {})",
                    marker,
                    name,
                    access,
                    format_pipeline_stage(info.stage),
                    format_access_flags(info.access)
                );
            }

            if pass.barriers.is_empty() {
                log::info!("│ No barriers required");
            }
            for barrier in &pass.barriers {
                let desc = &barrier.desc;
                if barrier.is_image {
                    log::info!("│   🔒 Image \"{}\": {:?} → {:?}", barrier.resource, desc.old_layout, desc.new_layout);
                } else {
                    log::info!("│   🔒 Buffer \"{}\":", barrier.resource);
                }
                log::info!(
                    "│       Stage:  {} → {}",
                    format_pipeline_stage(desc.src_stage),
                    format_pipeline_stage(desc.dst_stage)
                );
                log::info!(
                    "│       Access: {} → {}",
                    format_access_flags(desc.src_access),
                    format_access_flags(desc.dst_access)
                );
            }
            log::info!("└──────────────────────────────────────────────────────────────────");
        }
    }
}

/// 格式化 PipelineStageFlags2 为可读字符串
pub fn format_pipeline_stage(stage: vk::PipelineStageFlags2) -> String {
    if stage == vk::PipelineStageFlags2::NONE {
        return "NONE".to_string();
    }

    const NAMES: &[(vk::PipelineStageFlags2, &str)] = &[
        (vk::PipelineStageFlags2::TOP_OF_PIPE, "TOP_OF_PIPE"),
        (vk::PipelineStageFlags2::DRAW_INDIRECT, "DRAW_INDIRECT"),
        (vk::PipelineStageFlags2::VERTEX_INPUT, "VERTEX_INPUT"),
        (vk::PipelineStageFlags2::VERTEX_SHADER, "VERTEX_SHADER"),
        (vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, "EARLY_FRAGMENT_TESTS"),
        (vk::PipelineStageFlags2::FRAGMENT_SHADER, "FRAGMENT_SHADER"),
        (vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS, "LATE_FRAGMENT_TESTS"),
        (vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, "COLOR_ATTACHMENT_OUTPUT"),
        (vk::PipelineStageFlags2::COMPUTE_SHADER, "COMPUTE_SHADER"),
        (vk::PipelineStageFlags2::TRANSFER, "TRANSFER"),
        (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, "BOTTOM_OF_PIPE"),
        (vk::PipelineStageFlags2::HOST, "HOST"),
        (vk::PipelineStageFlags2::ALL_GRAPHICS, "ALL_GRAPHICS"),
        (vk::PipelineStageFlags2::ALL_COMMANDS, "ALL_COMMANDS"),
    ];

    let stages: Vec<&str> = NAMES.iter().filter(|(flag, _)| stage.contains(*flag)).map(|(_, name)| *name).collect();
    if stages.is_empty() { format!("{:?}", stage) } else { stages.join(" | ") }
}

/// 格式化 AccessFlags2 为可读字符串
pub fn format_access_flags(access: vk::AccessFlags2) -> String {
    if access == vk::AccessFlags2::NONE {
        return "NONE".to_string();
    }

    const NAMES: &[(vk::AccessFlags2, &str)] = &[
        (vk::AccessFlags2::INDIRECT_COMMAND_READ, "INDIRECT_CMD_READ"),
        (vk::AccessFlags2::INDEX_READ, "INDEX_READ"),
        (vk::AccessFlags2::VERTEX_ATTRIBUTE_READ, "VERTEX_ATTR_READ"),
        (vk::AccessFlags2::UNIFORM_READ, "UNIFORM_READ"),
        (vk::AccessFlags2::INPUT_ATTACHMENT_READ, "INPUT_ATTACH_READ"),
        (vk::AccessFlags2::SHADER_SAMPLED_READ, "SHADER_SAMPLED_READ"),
        (vk::AccessFlags2::SHADER_STORAGE_READ, "STORAGE_READ"),
        (vk::AccessFlags2::SHADER_STORAGE_WRITE, "STORAGE_WRITE"),
        (vk::AccessFlags2::COLOR_ATTACHMENT_READ, "COLOR_ATTACH_READ"),
        (vk::AccessFlags2::COLOR_ATTACHMENT_WRITE, "COLOR_ATTACH_WRITE"),
        (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ, "DEPTH_ATTACH_READ"),
        (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE, "DEPTH_ATTACH_WRITE"),
        (vk::AccessFlags2::TRANSFER_READ, "TRANSFER_READ"),
        (vk::AccessFlags2::TRANSFER_WRITE, "TRANSFER_WRITE"),
        (vk::AccessFlags2::HOST_READ, "HOST_READ"),
        (vk::AccessFlags2::HOST_WRITE, "HOST_WRITE"),
        (vk::AccessFlags2::MEMORY_READ, "MEMORY_READ"),
        (vk::AccessFlags2::MEMORY_WRITE, "MEMORY_WRITE"),
    ];

    let flags: Vec<&str> = NAMES.iter().filter(|(flag, _)| access.contains(*flag)).map(|(_, name)| *name).collect();
    if flags.is_empty() { format!("{:?}", access) } else { flags.join(" | ") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_pipeline_stage() {
        assert_eq!(format_pipeline_stage(vk::PipelineStageFlags2::NONE), "NONE");
        assert_eq!(
            format_pipeline_stage(vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::COMPUTE_SHADER),
            "FRAGMENT_SHADER | COMPUTE_SHADER"
        );
    }

    #[test]
    fn test_format_access_flags() {
        assert_eq!(format_access_flags(vk::AccessFlags2::NONE), "NONE");
        assert_eq!(
            format_access_flags(vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE),
            "COLOR_ATTACH_READ | COLOR_ATTACH_WRITE"
        );
    }
}
