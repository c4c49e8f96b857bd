use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;

/// 从 TOML 文件加载配置
///
/// 配置结构体中缺省的字段由 `#[serde(default)]` 补齐。
pub fn load_toml<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> anyhow::Result<T> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).with_context(|| format!("读取配置文件失败: {:?}", path))?;
    let config = toml::from_str(&content).with_context(|| format!("解析 TOML 配置失败: {:?}", path))?;
    Ok(config)
}

/// 文件不存在时使用默认配置，其他错误照常返回
pub fn load_toml_or_default<T: DeserializeOwned + Default, P: AsRef<Path>>(path: P) -> anyhow::Result<T> {
    let path = path.as_ref();
    if !path.exists() {
        log::info!("config file {:?} not found, use default", path);
        return Ok(T::default());
    }
    load_toml(path)
}
