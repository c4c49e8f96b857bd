//! Nova 工具集
//!
//! 提供日志初始化、TOML 配置加载等通用工具。
//!
//! # 配置
//! 各 crate 的配置结构体只需要实现 `serde::Deserialize`，
//! 通过 [`config::load_toml`] 从文件读取即可。

pub mod config;
pub mod init_log;
