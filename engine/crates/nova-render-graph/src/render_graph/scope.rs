//! 资源名字的层级命名空间
//!
//! scope 以扁平 arena 存储，用 u8 作为 id；每个 Pass 在声明时记录一份定长的 scope 栈快照。
//! scope 跨帧保留，名字表按帧双缓冲，所以可以查询到上一帧同一 scope 中的名字。

use std::collections::{HashMap, HashSet};

use smallvec::SmallVec;

use crate::render_graph::resource::{MAX_RESOURCE_SCOPE_DEPTH, RESOURCE_FRAME_COUNT, RgResourceId};

pub type RgScopeId = u8;
pub type RgScopeStack = SmallVec<[RgScopeId; MAX_RESOURCE_SCOPE_DEPTH]>;

/// 根 scope，名字为空
pub const ROOT_SCOPE: RgScopeId = 0;

#[derive(Debug)]
pub struct RgScope {
    /// 从根开始以 `.` 连接的全限定名，根 scope 为空字符串
    name: String,
    frames: [HashMap<String, RgResourceId>; RESOURCE_FRAME_COUNT],
}

impl RgScope {
    pub fn new(name: String) -> Self {
        Self {
            name,
            frames: Default::default(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// scope 内名字对应的全限定名
    pub fn qualify(&self, name: &str) -> String {
        if self.name.is_empty() { name.to_string() } else { format!("{}.{}", self.name, name) }
    }

    /// 子 scope 的全限定名
    pub fn child_name(&self, name: &str) -> String {
        self.qualify(name)
    }

    #[inline]
    pub fn get(&self, name: &str, frame: usize) -> Option<RgResourceId> {
        self.frames[frame].get(name).copied()
    }

    #[inline]
    pub fn set(&mut self, name: &str, id: RgResourceId, frame: usize) {
        self.frames[frame].insert(name.to_string(), id);
    }

    pub fn names(&self, frame: usize) -> impl Iterator<Item = (&str, RgResourceId)> {
        self.frames[frame].iter().map(|(name, id)| (name.as_str(), *id))
    }

    pub fn clear_frame(&mut self, frame: usize) {
        self.frames[frame].clear();
    }

    /// 在所有帧中解除被回收资源的名字绑定
    pub fn unbind(&mut self, reclaimed: &HashSet<RgResourceId>) {
        for names in &mut self.frames {
            names.retain(|_, id| !reclaimed.contains(id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_qualify() {
        let root = RgScope::new(String::new());
        assert_eq!(root.qualify("Foo"), "Foo");

        let blur = RgScope::new(root.child_name("Blur"));
        let inner = RgScope::new(blur.child_name("Horizontal"));
        assert_eq!(inner.name(), "Blur.Horizontal");
        assert_eq!(inner.qualify("Out"), "Blur.Horizontal.Out");
    }

    #[test]
    fn test_frames_are_separate() {
        let mut ids = SlotMap::<RgResourceId, ()>::with_key();
        let a = ids.insert(());
        let b = ids.insert(());

        let mut scope = RgScope::new(String::new());
        scope.set("Foo", a, 0);
        scope.set("Foo", b, 1);
        assert_eq!(scope.get("Foo", 0), Some(a));
        assert_eq!(scope.get("Foo", 1), Some(b));

        scope.clear_frame(1);
        assert_eq!(scope.get("Foo", 1), None);

        scope.unbind(&HashSet::from([a]));
        assert_eq!(scope.get("Foo", 0), None);
    }
}
