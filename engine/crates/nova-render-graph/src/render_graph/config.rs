use std::path::Path;

use serde::Deserialize;

/// RenderGraph 的可调参数
///
/// 可以从 TOML 文件读取，缺省字段使用默认值：
///
/// ```toml
/// pool_eviction_frames = 4
/// leak_growth_frame_limit = 100
/// print_execution_plan = false
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RgConfig {
    /// 资源池中的条目连续空闲超过这个帧数后被销毁
    pub pool_eviction_frames: u32,
    /// 存活资源数量连续增长的帧数上限，超过即认为资源泄漏
    pub leak_growth_frame_limit: u32,
    /// 每帧在 info 级别打印执行计划
    pub print_execution_plan: bool,
}

impl Default for RgConfig {
    fn default() -> Self {
        Self {
            pool_eviction_frames: 4,
            leak_growth_frame_limit: 100,
            print_execution_plan: false,
        }
    }
}

impl RgConfig {
    /// 从 TOML 文件读取；文件不存在时使用默认值
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        nova_crate_tools::config::load_toml_or_default(path)
    }
}
