//! Nova RenderGraph
//!
//! 每帧由渲染代码重新声明一遍：一组具名的 GPU 资源，以及读写它们的 Pass。
//! RenderGraph 负责：
//! - 找出本帧真正需要执行的 Pass（反向活跃性分析，包含跨帧读取）
//! - 从资源池中分配、复用 GPU 资源，并按引用计数及时归还
//! - 根据前后两次访问自动插入最少的 barrier
//! - 批量提交命令缓冲区
//!
//! 详见 [`render_graph`] 模块。

pub mod render_graph;

pub use render_graph::*;
