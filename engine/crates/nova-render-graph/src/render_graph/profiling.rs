//! Scope 感知的性能标记
//!
//! Pass 列表是扁平的，但每个 Pass 在声明时记录了自己所在的 scope 栈。
//! 执行时比较相邻两个 Pass 的 scope 栈，关闭不再需要的 scope、打开新的 scope，
//! 使得 tracy 中的 span 以及 [`RgPhaseRecord`] 都保持正确的嵌套关系。

use std::time::{Duration, Instant};

use crate::render_graph::scope::{RgScopeId, RgScopeStack};

/// 只有在 tracy client 运行时才创建 span，测试和无头运行不需要 profiler
pub(crate) fn span(name: &str) -> Option<tracy_client::Span> {
    tracy_client::Client::running().map(|client| client.span_alloc(Some(name), "", file!(), line!(), 0))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RgPhaseKind {
    Scope,
    Pass,
}

/// 一帧中的一个 scope 或 Pass
#[derive(Clone, Debug)]
pub struct RgPhaseRecord {
    pub name: String,
    pub kind: RgPhaseKind,
    /// 嵌套深度，根 scope 下的 Pass 为 0
    pub depth: usize,
    pub cpu_time: Duration,
}

struct OpenPhase {
    record_index: usize,
    start: Instant,
    _span: Option<tracy_client::Span>,
}

struct OpenScope {
    id: RgScopeId,
    phase: OpenPhase,
}

#[derive(Default)]
pub(crate) struct RgProfiler {
    records: Vec<RgPhaseRecord>,
    /// 当前打开的 scope，不包含根 scope
    open_scopes: Vec<OpenScope>,
    open_pass: Option<OpenPhase>,
}

impl RgProfiler {
    fn open(&mut self, name: &str, kind: RgPhaseKind, depth: usize) -> OpenPhase {
        self.records.push(RgPhaseRecord {
            name: name.to_string(),
            kind,
            depth,
            cpu_time: Duration::ZERO,
        });
        OpenPhase {
            record_index: self.records.len() - 1,
            start: Instant::now(),
            _span: span(name),
        }
    }

    fn close(&mut self, phase: OpenPhase) {
        self.records[phase.record_index].cpu_time = phase.start.elapsed();
    }

    /// 切换到 `scopes` 对应的 scope 栈（第一个元素为根 scope）
    pub fn enter_scopes<'a>(&mut self, scopes: &RgScopeStack, scope_name: impl Fn(RgScopeId) -> &'a str) {
        let target = scopes.get(1..).unwrap_or_default();
        let common = self.open_scopes.iter().zip(target).take_while(|(open, id)| open.id == **id).count();

        while self.open_scopes.len() > common {
            if let Some(open) = self.open_scopes.pop() {
                self.close(open.phase);
            }
        }
        for &id in &target[common..] {
            let depth = self.open_scopes.len();
            let phase = self.open(scope_name(id), RgPhaseKind::Scope, depth);
            self.open_scopes.push(OpenScope { id, phase });
        }
    }

    pub fn begin_pass(&mut self, name: &str) {
        let depth = self.open_scopes.len();
        let phase = self.open(name, RgPhaseKind::Pass, depth);
        self.open_pass = Some(phase);
    }

    pub fn end_pass(&mut self) {
        if let Some(phase) = self.open_pass.take() {
            self.close(phase);
        }
    }

    /// 关闭所有仍然打开的 scope，取出本帧的记录
    pub fn finish_frame(&mut self) -> Vec<RgPhaseRecord> {
        self.end_pass();
        while let Some(open) = self.open_scopes.pop() {
            self.close(open.phase);
        }
        std::mem::take(&mut self.records)
    }
}
