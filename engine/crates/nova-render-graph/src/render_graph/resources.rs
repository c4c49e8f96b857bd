//! 资源注册表
//!
//! 负责 graph 中所有逻辑资源的身份、名字和生命周期：
//! - 层级 scope 命名空间，名字表按帧双缓冲，可以查询上一帧同名资源
//! - 引用计数：活跃性分析时增加，Pass 执行完后减少，归零时把具体资源还给资源池
//! - 在第一次真正访问时从资源池中取得具体资源（延迟分配）
//! - 帧推进时回收引用计数为零的资源，被跨帧读取的资源延续到下一帧
//!
//! 注册表持有 `Rc`，因此不是 `Send`：整个 graph 只能在创建它的线程上使用，由编译器保证。

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use ash::vk;
use itertools::Itertools;
use nova_gfx::foundation::device::GfxDevice;
use nova_gfx::resources::buffer::{GfxBuffer, GfxBufferDesc};
use nova_gfx::resources::image::{GfxImage, GfxImageDesc};
use slotmap::SlotMap;
use smallvec::smallvec;

use crate::render_graph::access::RgAccess;
use crate::render_graph::config::RgConfig;
use crate::render_graph::error::{RgError, RgResult};
use crate::render_graph::pool::{RgPool, RgPooledBuffer, RgPooledImage};
use crate::render_graph::resource::{
    LAST_OUTPUT_NAME, MAX_RESOURCE_SCOPE_DEPTH, MAX_RESOURCE_SCOPES, RESOURCE_FRAME_COUNT, RgResource,
    RgResourceId, RgResourceInfo, RgResourceRef,
};
use crate::render_graph::scope::{ROOT_SCOPE, RgScope, RgScopeId, RgScopeStack};

/// 注册表中的一个逻辑资源
struct RgResourceEntry {
    resource: RgResource,
    /// 全限定名
    name: String,
    ref_count: u32,
    image: Option<Rc<RgPooledImage>>,
    buffer: Option<Rc<RgPooledBuffer>>,
    /// 资源仍是 Future 时累积的 usage，注册时合并进描述
    pending_image_usage: vk::ImageUsageFlags,
    pending_buffer_usage: vk::BufferUsageFlags,
}

impl RgResourceEntry {
    fn new(name: String, resource: RgResource) -> Self {
        Self {
            resource,
            name,
            ref_count: 0,
            image: None,
            buffer: None,
            pending_image_usage: vk::ImageUsageFlags::empty(),
            pending_buffer_usage: vk::BufferUsageFlags::empty(),
        }
    }

    fn release_backing(&mut self) {
        self.image = None;
        self.buffer = None;
    }
}

/// 已经分配的具体资源，执行阶段用来读写资源状态
#[derive(Clone)]
pub(crate) enum RgBacking {
    Image(Rc<RgPooledImage>),
    Buffer(Rc<RgPooledBuffer>),
}

pub struct RgResources {
    device: Rc<dyn GfxDevice>,
    config: RgConfig,

    entries: SlotMap<RgResourceId, RgResourceEntry>,

    /// scope arena，下标即 scope id；第一个元素是根 scope
    scopes: Vec<RgScope>,
    scope_ids: HashMap<String, RgScopeId>,
    scope_stack: RgScopeStack,

    frame_index: u64,
    /// 最近一个 Pass 的输出，scope 关闭时绑定为 `LastOutput`
    last_output_id: Option<RgResourceId>,

    image_pool: RgPool<GfxImage>,
    buffer_pool: RgPool<GfxBuffer>,

    last_resource_count: usize,
    consecutive_growth_frames: u32,
}

// new & init
impl RgResources {
    pub fn new(device: Rc<dyn GfxDevice>, config: RgConfig) -> Self {
        let root = RgScope::new(String::new());
        Self {
            device,
            image_pool: RgPool::new(config.pool_eviction_frames),
            buffer_pool: RgPool::new(config.pool_eviction_frames),
            config,
            entries: SlotMap::with_key(),
            scopes: vec![root],
            scope_ids: HashMap::from([(String::new(), ROOT_SCOPE)]),
            scope_stack: smallvec![ROOT_SCOPE],
            frame_index: 0,
            last_output_id: None,
            last_resource_count: 0,
            consecutive_growth_frames: 0,
        }
    }
}

// getters
impl RgResources {
    #[inline]
    pub fn device(&self) -> &dyn GfxDevice {
        self.device.as_ref()
    }

    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    #[inline]
    pub fn config(&self) -> &RgConfig {
        &self.config
    }

    #[inline]
    pub fn last_output_id(&self) -> Option<RgResourceId> {
        self.last_output_id
    }

    #[inline]
    pub fn contains(&self, id: RgResourceId) -> bool {
        self.entries.contains_key(id)
    }

    /// 查询不到时返回 [`RgResource::Undefined`]
    pub fn get_resource(&self, id: RgResourceId) -> RgResource {
        self.entries.get(id).map(|entry| entry.resource).unwrap_or_default()
    }

    /// 资源的全限定名
    pub fn name(&self, id: RgResourceId) -> &str {
        self.entries.get(id).map(|entry| entry.name.as_str()).unwrap_or("<unknown>")
    }

    pub fn ref_count(&self, id: RgResourceId) -> u32 {
        self.entries.get(id).map_or(0, |entry| entry.ref_count)
    }

    /// 注册表中存活的资源数量（包括 Future 以及被跨帧读取延续的资源）
    #[inline]
    pub fn live_resource_count(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn image_pool(&self) -> &RgPool<GfxImage> {
        &self.image_pool
    }

    #[inline]
    pub fn buffer_pool(&self) -> &RgPool<GfxBuffer> {
        &self.buffer_pool
    }

    #[inline]
    pub(crate) fn scope_stack(&self) -> &RgScopeStack {
        &self.scope_stack
    }

    /// scope 的名字（不含父 scope 的前缀）
    pub(crate) fn scope_short_name(&self, scope: RgScopeId) -> &str {
        let name = self.scopes[scope as usize].name();
        name.rsplit_once('.').map_or(name, |(_, short)| short)
    }

    /// 当前帧在双缓冲中的槽位
    #[inline]
    fn current_slot(&self) -> usize {
        self.frame_slot(0)
    }

    #[inline]
    fn frame_slot(&self, frames_ago: usize) -> usize {
        (self.frame_index as usize + RESOURCE_FRAME_COUNT - frames_ago) % RESOURCE_FRAME_COUNT
    }

    #[inline]
    fn top_scope(&self) -> RgScopeId {
        *self.scope_stack.last().unwrap_or(&ROOT_SCOPE)
    }
}

// 名字
impl RgResources {
    /// 在当前 scope 中注册资源
    ///
    /// 如果这个名字之前只是通过 [`Self::reserve_id`] 预留的，则就地完成注册，返回预留的 ID。
    ///
    /// # Panic
    /// 名字已经绑定到一个有定义的资源时 panic
    pub fn register(&mut self, name: &str, resource: RgResource) -> RgResourceId {
        let slot = self.current_slot();
        let scope = self.top_scope() as usize;

        if let Some(id) = self.scopes[scope].get(name, slot) {
            let entry = &mut self.entries[id];
            assert!(
                matches!(entry.resource, RgResource::Future),
                "resource {} already registered",
                entry.name
            );
            entry.resource = match resource {
                RgResource::Image { mut desc, external } => {
                    desc.usage |= entry.pending_image_usage;
                    RgResource::Image { desc, external }
                }
                RgResource::Buffer { mut desc, external } => {
                    desc.usage |= entry.pending_buffer_usage;
                    RgResource::Buffer { desc, external }
                }
                other => other,
            };
            return id;
        }

        let qualified = self.scopes[scope].qualify(name);
        let id = self.entries.insert(RgResourceEntry::new(qualified, resource));
        self.scopes[scope].set(name, id, slot);
        id
    }

    /// 预留一个名字，在生产者声明之前就可以引用它
    ///
    /// 名字已经存在时返回已有的 ID。
    pub fn reserve_id(&mut self, name: &str) -> RgResourceId {
        let slot = self.current_slot();
        let scope = self.top_scope() as usize;
        if let Some(id) = self.scopes[scope].get(name, slot) {
            return id;
        }
        self.register(name, RgResource::Future)
    }

    /// 按名字查找资源
    ///
    /// - `Scope.Name` 形式的全限定名直接在对应 scope 中查找
    /// - 否则沿当前 scope 栈由内向外查找
    /// - `frames_ago` 为 0 表示当前帧，1 表示上一帧
    pub fn get_id(&self, name: &str, frames_ago: usize) -> Option<RgResourceId> {
        assert!(frames_ago < RESOURCE_FRAME_COUNT, "can not look {} frames back", frames_ago);
        let slot = self.frame_slot(frames_ago);

        if let Some((scope_name, short_name)) = name.rsplit_once('.') {
            let scope = *self.scope_ids.get(scope_name)?;
            return self.scopes[scope as usize].get(short_name, slot);
        }

        self.scope_stack.iter().rev().find_map(|&scope| self.scopes[scope as usize].get(name, slot))
    }
}

// 引用计数 & usage
impl RgResources {
    pub fn increment_ref(&mut self, id: RgResourceId) {
        let entry = self.entries.get_mut(id).unwrap_or_else(|| panic!("increment ref of unknown resource {:?}", id));
        entry.ref_count += 1;
    }

    /// 引用计数归零时释放具体资源：池中的资源回到池中，外部资源直接丢弃
    pub fn decrement_ref(&mut self, id: RgResourceId) {
        let entry = self.entries.get_mut(id).unwrap_or_else(|| panic!("decrement ref of unknown resource {:?}", id));
        assert!(entry.ref_count > 0, "ref count of {} underflow", entry.name);
        entry.ref_count -= 1;
        if entry.ref_count == 0 {
            entry.release_backing();
        }
    }

    /// 把访问需要的 usage 合并进资源描述，使分配出的资源支持所有声明过的访问
    ///
    /// 已经分配了具体资源的（例如上一帧的资源）不再修改描述。
    pub fn add_usage_from_access(&mut self, id: RgResourceId, access: RgAccess) {
        let info = access.info();
        let Some(entry) = self.entries.get_mut(id) else {
            return;
        };
        if entry.image.is_some() || entry.buffer.is_some() {
            return;
        }
        match &mut entry.resource {
            RgResource::Image { desc, external: false } => desc.usage |= info.image_usage,
            RgResource::Buffer { desc, external: false } => desc.usage |= info.buffer_usage,
            RgResource::Future => {
                entry.pending_image_usage |= info.image_usage;
                entry.pending_buffer_usage |= info.buffer_usage;
            }
            _ => {}
        }
    }

    /// 让 buffer 分配在 CPU 可写的内存上
    ///
    /// # Panic
    /// 资源不是 buffer 时 panic
    pub fn make_host_visible(&mut self, id: RgResourceId) {
        let entry = self.entries.get_mut(id).unwrap_or_else(|| panic!("resource {:?} is not registered", id));
        let RgResource::Buffer { desc, external } = &mut entry.resource else {
            panic!("resource {} is not a buffer", entry.name);
        };
        if !*external && entry.buffer.is_none() {
            desc.host_visible = true;
        }
    }

    /// 取得 image 句柄，没有分配过时从资源池中取得
    ///
    /// # Panic
    /// 资源不存在、不是 image，或者引用计数为零（没有被任何活跃 Pass 持有）时 panic
    pub fn get_image(&mut self, resource: impl RgResourceRef) -> GfxImage {
        let id = resource.resolve(self);
        match self.materialize(id) {
            RgBacking::Image(image) => image.resource(),
            RgBacking::Buffer(_) => panic!("resource {} is not an image", self.name(id)),
        }
    }

    /// # Panic
    /// 同 [`Self::get_image`]
    pub fn get_buffer(&mut self, resource: impl RgResourceRef) -> GfxBuffer {
        let id = resource.resolve(self);
        match self.materialize(id) {
            RgBacking::Buffer(buffer) => buffer.resource(),
            RgBacking::Image(_) => panic!("resource {} is not a buffer", self.name(id)),
        }
    }

    /// 名字可能还不存在时使用，例如第一帧时生产者还没有运行过
    pub fn try_get_image(&mut self, name: &str) -> RgResult<GfxImage> {
        let id = self.get_id(name, 0).ok_or_else(|| RgError::ResourceNotFound(name.to_string()))?;
        if !self.get_resource(id).is_image() {
            return Err(RgError::NotAnImage(name.to_string()));
        }
        Ok(self.get_image(id))
    }

    pub fn try_get_buffer(&mut self, name: &str) -> RgResult<GfxBuffer> {
        let id = self.get_id(name, 0).ok_or_else(|| RgError::ResourceNotFound(name.to_string()))?;
        if !self.get_resource(id).is_buffer() {
            return Err(RgError::NotABuffer(name.to_string()));
        }
        Ok(self.get_buffer(id))
    }

    /// 写入 host visible 的 buffer
    pub fn write_buffer(&mut self, resource: impl RgResourceRef, offset: vk::DeviceSize, data: &[u8]) {
        let buffer = self.get_buffer(resource);
        assert!(buffer.desc.host_visible, "write to a device local buffer");
        self.device.write_buffer(&buffer, offset, data);
    }

    /// 读取 host visible 的 buffer，调用方需要保证 GPU 的写入已经完成
    pub fn read_buffer(&mut self, resource: impl RgResourceRef, offset: vk::DeviceSize, size: usize) -> Vec<u8> {
        let buffer = self.get_buffer(resource);
        assert!(buffer.desc.host_visible, "read from a device local buffer");
        self.device.read_buffer(&buffer, offset, size)
    }

    /// 取得具体资源，没有分配过时从资源池中取得
    pub(crate) fn materialize(&mut self, id: RgResourceId) -> RgBacking {
        let entry = self.entries.get_mut(id).unwrap_or_else(|| panic!("resource {:?} is not registered", id));
        assert!(entry.ref_count > 0, "resource {} accessed while not referenced", entry.name);

        match entry.resource {
            RgResource::Image { desc, .. } => {
                let pooled = match &entry.image {
                    Some(pooled) => pooled.clone(),
                    None => {
                        let pooled = self.image_pool.get_from_pool(self.device.as_ref(), &desc, &entry.name);
                        entry.image = Some(pooled.clone());
                        pooled
                    }
                };
                RgBacking::Image(pooled)
            }
            RgResource::Buffer { desc, .. } => {
                let pooled = match &entry.buffer {
                    Some(pooled) => pooled.clone(),
                    None => {
                        let pooled = self.buffer_pool.get_from_pool(self.device.as_ref(), &desc, &entry.name);
                        entry.buffer = Some(pooled.clone());
                        pooled
                    }
                };
                RgBacking::Buffer(pooled)
            }
            RgResource::Future => panic!("resource {} is reserved but never registered", entry.name),
            RgResource::Undefined => panic!("resource {} is undefined", entry.name),
        }
    }
}

// scope
impl RgResources {
    /// 进入子 scope；同名子 scope 跨帧复用同一个 scope id
    ///
    /// # Panic
    /// 嵌套超过 [`MAX_RESOURCE_SCOPE_DEPTH`] 或者 scope 总数超过 [`MAX_RESOURCE_SCOPES`] 时 panic
    pub fn begin_scope(&mut self, name: &str) {
        assert!(!name.is_empty() && !name.contains('.'), "invalid scope name: {:?}", name);
        assert!(
            self.scope_stack.len() < MAX_RESOURCE_SCOPE_DEPTH,
            "scope {} nested deeper than {}",
            name,
            MAX_RESOURCE_SCOPE_DEPTH
        );

        let qualified = self.scopes[self.top_scope() as usize].child_name(name);
        let id = match self.scope_ids.get(&qualified) {
            Some(id) => *id,
            None => {
                assert!(self.scopes.len() < MAX_RESOURCE_SCOPES, "too many resource scopes");
                let id = self.scopes.len() as RgScopeId;
                self.scopes.push(RgScope::new(qualified.clone()));
                self.scope_ids.insert(qualified, id);
                id
            }
        };
        self.scope_stack.push(id);
    }

    /// 离开当前 scope，并把 scope 中的 `LastOutput` 绑定到最近一个 Pass 的输出
    pub fn end_scope(&mut self) {
        assert!(self.scope_stack.len() > 1, "end_scope without matching begin_scope");
        let slot = self.current_slot();
        if let Some(scope) = self.scope_stack.pop() {
            if let Some(last_output) = self.last_output_id {
                self.scopes[scope as usize].set(LAST_OUTPUT_NAME, last_output, slot);
            }
        }
    }

    pub(crate) fn set_last_output(&mut self, id: RgResourceId) {
        self.last_output_id = Some(id);
    }
}

// 外部资源 & 内省
impl RgResources {
    /// 把外部 image（例如 swapchain image）绑定到一个已经注册的 image 资源上
    ///
    /// 外部 image 不会进入资源池，引用计数归零时只是解除绑定。
    ///
    /// # Panic
    /// 尺寸、格式或 layer 数与注册时的描述不一致时 panic
    pub fn set_target_image(&mut self, name: &str, image: GfxImage) -> RgResult<()> {
        let id = self.get_id(name, 0).ok_or_else(|| RgError::ResourceNotFound(name.to_string()))?;
        let entry = &mut self.entries[id];
        let RgResource::Image { desc, .. } = entry.resource else {
            return Err(RgError::NotAnImage(name.to_string()));
        };

        assert_eq!(
            (desc.width, desc.height, desc.depth),
            (image.desc.width, image.desc.height, image.desc.depth),
            "target image extent mismatch for {}",
            name
        );
        assert_eq!(desc.format, image.desc.format, "target image format mismatch for {}", name);
        assert_eq!(
            desc.array_layers, image.desc.array_layers,
            "target image layer count mismatch for {}",
            name
        );

        entry.resource = RgResource::Image {
            desc: image.desc,
            external: true,
        };
        entry.image = Some(Rc::new(RgPooledImage::new(image)));
        Ok(())
    }

    fn named_resources(&self) -> impl Iterator<Item = (String, RgResourceId, &RgResourceEntry)> {
        let slot = self.current_slot();
        self.scopes.iter().flat_map(move |scope| {
            scope.names(slot).filter(|(name, _)| *name != LAST_OUTPUT_NAME).filter_map(move |(name, id)| {
                self.entries.get(id).map(|entry| (scope.qualify(name), id, entry))
            })
        })
    }

    /// 当前帧所有具名的 image，按全限定名排序
    pub fn all_images(&self) -> Vec<RgResourceInfo<GfxImageDesc>> {
        self.named_resources()
            .filter_map(|(name, id, entry)| {
                entry.resource.image_desc().map(|desc| RgResourceInfo {
                    name,
                    id,
                    desc: *desc,
                    ref_count: entry.ref_count,
                })
            })
            .sorted_by(|a, b| a.name.cmp(&b.name))
            .collect()
    }

    /// 当前帧所有具名的 buffer，按全限定名排序
    pub fn all_buffers(&self) -> Vec<RgResourceInfo<GfxBufferDesc>> {
        self.named_resources()
            .filter_map(|(name, id, entry)| {
                entry.resource.buffer_desc().map(|desc| RgResourceInfo {
                    name,
                    id,
                    desc: *desc,
                    ref_count: entry.ref_count,
                })
            })
            .sorted_by(|a, b| a.name.cmp(&b.name))
            .collect()
    }
}

// 帧推进
impl RgResources {
    /// 结束当前帧
    ///
    /// 1. 回收引用计数为零的资源，并在所有帧的名字表中解除绑定
    /// 2. 检查存活资源数量是否持续增长
    /// 3. 切换到下一帧的名字表，清空其中残留的上上帧名字
    /// 4. 推进资源池，销毁长期空闲的资源
    pub fn advance_frame(&mut self) {
        assert_eq!(self.scope_stack.len(), 1, "frame ended with unclosed scopes");

        let reclaimed: HashSet<RgResourceId> =
            self.entries.iter().filter(|(_, entry)| entry.ref_count == 0).map(|(id, _)| id).collect();
        for id in &reclaimed {
            self.entries.remove(*id);
        }
        if !reclaimed.is_empty() {
            for scope in &mut self.scopes {
                scope.unbind(&reclaimed);
            }
        }
        for (_, entry) in &self.entries {
            log::trace!("carry {} into next frame, ref count {}", entry.name, entry.ref_count);
        }

        self.check_leaks();

        self.frame_index += 1;
        self.last_output_id = None;
        let slot = self.current_slot();
        for scope in &mut self.scopes {
            scope.clear_frame(slot);
        }

        let _span = crate::render_graph::profiling::span("RgPoolTick");
        self.image_pool.tick(self.device.as_ref());
        self.buffer_pool.tick(self.device.as_ref());
    }

    fn check_leaks(&mut self) {
        let count = self.entries.len();
        if count > self.last_resource_count {
            self.consecutive_growth_frames += 1;
        } else {
            self.consecutive_growth_frames = 0;
        }
        self.last_resource_count = count;

        assert!(
            self.consecutive_growth_frames <= self.config.leak_growth_frame_limit,
            "resource leak: live resource count grew for {} consecutive frames ({} live)",
            self.consecutive_growth_frames,
            count
        );
    }
}

impl Drop for RgResources {
    fn drop(&mut self) {
        self.entries.clear();
        self.image_pool.clear(self.device.as_ref());
        self.buffer_pool.clear(self.device.as_ref());
    }
}
