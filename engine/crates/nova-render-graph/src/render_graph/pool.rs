//! 资源池
//!
//! 以资源描述为 key 缓存具体的 GPU 分配，跨帧复用。
//!
//! 池中的条目用 `Rc` 共享：池自身持有一份，正在被 graph 使用的逻辑资源再持有一份。
//! 因此 `Rc::strong_count <= 1` 就表示没有任何逻辑资源在使用它，可以分配给新的请求；
//! 池中的空闲和 graph 中的存活在构造上互斥。

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use nova_gfx::foundation::device::GfxDevice;
use nova_gfx::resources::buffer::{GfxBuffer, GfxBufferDesc};
use nova_gfx::resources::image::{GfxImage, GfxImageDesc};

use crate::render_graph::resource_state::RgResourceState;

/// 可以放入资源池的具体资源
pub trait RgPoolable: Copy + Debug {
    type Desc: Copy + Eq + Hash + Debug;

    fn create(device: &dyn GfxDevice, desc: &Self::Desc, debug_name: &str) -> Self;
    fn destroy(self, device: &dyn GfxDevice);
}

impl RgPoolable for GfxImage {
    type Desc = GfxImageDesc;

    fn create(device: &dyn GfxDevice, desc: &Self::Desc, debug_name: &str) -> Self {
        device.create_image(desc, debug_name)
    }

    fn destroy(self, device: &dyn GfxDevice) {
        device.destroy_image(self)
    }
}

impl RgPoolable for GfxBuffer {
    type Desc = GfxBufferDesc;

    fn create(device: &dyn GfxDevice, desc: &Self::Desc, debug_name: &str) -> Self {
        device.create_buffer(desc, debug_name)
    }

    fn destroy(self, device: &dyn GfxDevice) {
        device.destroy_buffer(self)
    }
}

/// 资源池中的一个条目：具体资源、最近一次访问的状态、连续空闲的帧数
#[derive(Debug)]
pub struct RgPooled<T: RgPoolable> {
    resource: T,
    state: Cell<RgResourceState>,
    unused_frames: Cell<u32>,
}

pub type RgPooledImage = RgPooled<GfxImage>;
pub type RgPooledBuffer = RgPooled<GfxBuffer>;

impl<T: RgPoolable> RgPooled<T> {
    /// 不属于任何资源池的条目，用于外部资源
    pub fn new(resource: T) -> Self {
        Self {
            resource,
            state: Cell::new(RgResourceState::UNDEFINED),
            unused_frames: Cell::new(0),
        }
    }

    #[inline]
    pub fn resource(&self) -> T {
        self.resource
    }

    #[inline]
    pub fn state(&self) -> RgResourceState {
        self.state.get()
    }

    #[inline]
    pub fn set_state(&self, state: RgResourceState) {
        self.state.set(state)
    }

    #[inline]
    pub fn unused_frames(&self) -> u32 {
        self.unused_frames.get()
    }
}

/// 以描述为 key 的资源池
pub struct RgPool<T: RgPoolable> {
    buckets: HashMap<T::Desc, Vec<Rc<RgPooled<T>>>>,
    /// 连续空闲超过这个帧数的条目会被销毁
    eviction_frames: u32,
}

// new & init
impl<T: RgPoolable> RgPool<T> {
    pub fn new(eviction_frames: u32) -> Self {
        Self {
            buckets: HashMap::new(),
            eviction_frames,
        }
    }
}

// getters
impl<T: RgPoolable> RgPool<T> {
    /// 池中所有条目的数量（包括正在使用的）
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

// tools
impl<T: RgPoolable> RgPool<T> {
    /// 取得一个与 `desc` 完全匹配且没有被使用的条目，没有则新建
    pub fn get_from_pool(&mut self, device: &dyn GfxDevice, desc: &T::Desc, debug_name: &str) -> Rc<RgPooled<T>> {
        let bucket = self.buckets.entry(*desc).or_default();

        if let Some(entry) = bucket.iter().find(|entry| Rc::strong_count(entry) <= 1) {
            entry.unused_frames.set(0);
            return entry.clone();
        }

        log::debug!("pool miss for {}: {:?}", debug_name, desc);
        let entry = Rc::new(RgPooled::new(T::create(device, desc, debug_name)));
        bucket.push(entry.clone());
        entry
    }

    /// 每帧调用一次：累加空闲条目的空闲帧数，销毁超过阈值的条目
    pub fn tick(&mut self, device: &dyn GfxDevice) {
        let eviction_frames = self.eviction_frames;
        for bucket in self.buckets.values_mut() {
            let (evicted, kept): (Vec<_>, Vec<_>) = std::mem::take(bucket).into_iter().partition(|entry| {
                if Rc::strong_count(entry) > 1 {
                    entry.unused_frames.set(0);
                    return false;
                }
                let unused_frames = entry.unused_frames.get() + 1;
                entry.unused_frames.set(unused_frames);
                unused_frames > eviction_frames
            });
            *bucket = kept;

            for entry in evicted {
                match Rc::try_unwrap(entry) {
                    Ok(pooled) => {
                        log::debug!("evict pooled resource {:?}", pooled.resource);
                        pooled.resource.destroy(device);
                    }
                    Err(_) => unreachable!("evicted pool entry is still referenced"),
                }
            }
        }
        self.buckets.retain(|_, bucket| !bucket.is_empty());
    }

    /// 销毁所有条目
    ///
    /// # Panic
    /// 仍有条目被 graph 引用时 panic
    pub fn clear(&mut self, device: &dyn GfxDevice) {
        for (_, bucket) in self.buckets.drain() {
            for entry in bucket {
                let pooled = Rc::try_unwrap(entry).unwrap_or_else(|_| panic!("pool cleared while a resource is in use"));
                pooled.resource.destroy(device);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use nova_gfx::foundation::recording_device::GfxRecordingDevice;

    fn desc(width: u32) -> GfxImageDesc {
        GfxImageDesc::new_2d(width, width, vk::Format::R8G8B8A8_UNORM).usage(vk::ImageUsageFlags::SAMPLED)
    }

    #[test]
    fn test_reuse_released_entry() {
        let device = GfxRecordingDevice::new();
        let mut pool = RgPool::<GfxImage>::new(4);

        let first = pool.get_from_pool(&device, &desc(64), "a");
        let handle = first.resource().image;
        drop(first);

        let second = pool.get_from_pool(&device, &desc(64), "b");
        assert_eq!(second.resource().image, handle);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_in_use_entry_is_not_shared() {
        let device = GfxRecordingDevice::new();
        let mut pool = RgPool::<GfxImage>::new(4);

        let first = pool.get_from_pool(&device, &desc(64), "a");
        let second = pool.get_from_pool(&device, &desc(64), "b");
        assert_ne!(first.resource().image, second.resource().image);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_distinct_desc_allocates() {
        let device = GfxRecordingDevice::new();
        let mut pool = RgPool::<GfxImage>::new(4);

        let a = pool.get_from_pool(&device, &desc(64), "a").resource().image;
        let b = pool.get_from_pool(&device, &desc(128), "b").resource().image;
        assert_ne!(a, b);
        assert_eq!(pool.bucket_count(), 2);
        assert_eq!(device.live_image_count(), 2);
    }

    #[test]
    fn test_evict_after_idle_frames() {
        let device = GfxRecordingDevice::new();
        let mut pool = RgPool::<GfxImage>::new(4);
        drop(pool.get_from_pool(&device, &desc(64), "a"));

        for _ in 0..4 {
            pool.tick(&device);
        }
        assert_eq!(pool.len(), 1, "idle for exactly 4 frames is kept");

        pool.tick(&device);
        assert!(pool.is_empty());
        assert_eq!(device.live_image_count(), 0);
    }

    #[test]
    fn test_use_resets_idle_counter() {
        let device = GfxRecordingDevice::new();
        let mut pool = RgPool::<GfxImage>::new(4);
        drop(pool.get_from_pool(&device, &desc(64), "a"));

        for _ in 0..3 {
            pool.tick(&device);
        }
        let held = pool.get_from_pool(&device, &desc(64), "a");
        assert_eq!(held.unused_frames(), 0);

        for _ in 0..10 {
            pool.tick(&device);
        }
        assert_eq!(pool.len(), 1, "referenced entries are never evicted");
        drop(held);
    }

    #[test]
    fn test_clear_destroys_everything() {
        let device = GfxRecordingDevice::new();
        let mut pool = RgPool::<GfxBuffer>::new(4);
        drop(pool.get_from_pool(&device, &GfxBufferDesc::new(256, vk::BufferUsageFlags::STORAGE_BUFFER), "a"));
        pool.clear(&device);
        assert_eq!(device.live_buffer_count(), 0);
    }
}
