//! Pass 构建器
//!
//! 在 `build` 回调中使用，声明 Pass 的资源访问。声明会立即返回资源 ID，
//! 后续的 Pass 可以直接使用这些 ID 或者名字引用资源。

use ash::vk;
use nova_gfx::commands::rendering_info::GfxAttachmentOps;
use nova_gfx::resources::buffer::GfxBufferDesc;
use nova_gfx::resources::image::GfxImageDesc;

use crate::render_graph::access::RgAccess;
use crate::render_graph::pass::{DEPTH_ATTACHMENT_INDEX, MAX_FUTURE_READS, RgFutureRead, RgPass};
use crate::render_graph::resource::{
    MAX_COLOR_ATTACHMENTS, RESOURCE_FRAME_COUNT, RgResource, RgResourceId, RgResourceRef,
};
use crate::render_graph::resources::RgResources;

pub struct RgPassBuilder<'a> {
    pub(crate) pass: &'a mut RgPass,
    pub(crate) resources: &'a mut RgResources,
    /// 最近一次声明写入的资源
    pub(crate) last_written: Option<RgResourceId>,
}

impl<'a> RgPassBuilder<'a> {
    pub(crate) fn new(pass: &'a mut RgPass, resources: &'a mut RgResources) -> Self {
        Self {
            pass,
            resources,
            last_written: None,
        }
    }

    /// Pass 构建完成后作为 `LastOutput` 的资源
    pub(crate) fn output(&self) -> Option<RgResourceId> {
        self.pass.primary_output().or(self.last_written)
    }

    fn add_access(&mut self, id: RgResourceId, access: RgAccess) {
        self.resources.add_usage_from_access(id, access);
        self.pass.accesses.push((id, access));
        if access.is_write() {
            self.last_written = Some(id);
        }
    }
}

// 读写
impl RgPassBuilder<'_> {
    /// # Panic
    /// `access` 是写访问时 panic
    pub fn read(&mut self, resource: impl RgResourceRef, access: RgAccess) -> RgResourceId {
        assert!(!access.is_write(), "{:?} is not a read access", access);
        let id = resource.resolve(self.resources);
        self.add_access(id, access);
        id
    }

    pub fn write(&mut self, resource: impl RgResourceRef, access: RgAccess) -> RgResourceId {
        let id = resource.resolve(self.resources);
        self.add_access(id, access);
        id
    }

    /// 读取 uniform buffer，并让它分配在 CPU 可写的内存上
    pub fn read_uniform(&mut self, resource: impl RgResourceRef) -> RgResourceId {
        let id = resource.resolve(self.resources);
        self.resources.make_host_visible(id);
        self.add_access(id, RgAccess::AnyShaderReadUniform);
        id
    }

    /// 注册新的 image，并记录当前 Pass 为它的生产者
    pub fn create_image(&mut self, name: &str, desc: GfxImageDesc, access: RgAccess) -> RgResourceId {
        let id = self.resources.register(name, RgResource::image(desc));
        self.write(id, access)
    }

    pub fn create_buffer(&mut self, name: &str, desc: GfxBufferDesc, access: RgAccess) -> RgResourceId {
        let id = self.resources.register(name, RgResource::buffer(desc));
        self.write(id, access)
    }

    /// 注册一个由 CPU 写入的 uniform buffer
    pub fn create_uniform(&mut self, name: &str, size: vk::DeviceSize) -> RgResourceId {
        self.create_buffer(name, GfxBufferDesc::new_uniform(size), RgAccess::HostWrite)
    }

    /// 读取上一帧（或者更早）的同名资源
    ///
    /// 会在当前帧预留这个名字，使本帧之后的 Pass 仍然可以生产它，并声明下一帧会读取它；
    /// 如果 `frames_ago` 帧之前这个名字有具体的资源，则把它作为本 Pass 的普通读取。
    ///
    /// 返回 `frames_ago` 帧之前的资源 ID，例如第一帧时为 `None`。
    pub fn read_previous_frame(&mut self, name: &str, access: RgAccess, frames_ago: usize) -> Option<RgResourceId> {
        assert!(
            (1..RESOURCE_FRAME_COUNT).contains(&frames_ago),
            "can not read {} {} frames ago",
            name,
            frames_ago
        );
        assert!(!access.is_write(), "{:?} is not a read access", access);
        assert!(
            self.pass.future_reads.len() < MAX_FUTURE_READS,
            "pass {} declares more than {} previous frame reads",
            self.pass.name,
            MAX_FUTURE_READS
        );

        let current = self.resources.reserve_id(name);
        self.resources.add_usage_from_access(current, access);
        self.pass.future_reads.push(RgFutureRead {
            id: current,
            access,
            frames: frames_ago as u32,
        });

        let previous = self.resources.get_id(name, frames_ago)?;
        if !self.resources.get_resource(previous).is_concrete() {
            return None;
        }
        self.add_access(previous, access);
        Some(previous)
    }
}

// attachment
impl RgPassBuilder<'_> {
    /// load op 为 `LOAD` 时需要读取原内容，访问类型为 `ColorAttachmentReadWrite`
    pub fn set_color_attachment(
        &mut self,
        index: usize,
        resource: impl RgResourceRef,
        ops: GfxAttachmentOps,
    ) -> RgResourceId {
        assert!(index < MAX_COLOR_ATTACHMENTS, "color attachment index {} out of range", index);
        let id = resource.resolve(self.resources);
        assert!(
            self.resources.get_resource(id).is_image(),
            "attachment {} is not an image",
            self.resources.name(id)
        );

        let access = if ops.load_op == vk::AttachmentLoadOp::LOAD {
            RgAccess::ColorAttachmentReadWrite
        } else {
            RgAccess::ColorAttachmentWrite
        };
        self.write(id, access);

        let attachment = &mut self.pass.attachments[index];
        attachment.id = Some(id);
        attachment.ops = ops;
        id
    }

    /// load op 为 `LOAD` 时访问类型为 `DepthStencilAttachmentReadWrite`
    pub fn set_depth_attachment(&mut self, resource: impl RgResourceRef, ops: GfxAttachmentOps) -> RgResourceId {
        let id = resource.resolve(self.resources);
        assert!(
            self.resources.get_resource(id).image_desc().is_some_and(|desc| desc.is_depth_stencil()),
            "depth attachment {} is not a depth image",
            self.resources.name(id)
        );
        let access = if ops.load_op == vk::AttachmentLoadOp::LOAD {
            RgAccess::DepthStencilAttachmentReadWrite
        } else {
            RgAccess::DepthStencilAttachmentWrite
        };
        self.write(id, access);

        let attachment = &mut self.pass.attachments[DEPTH_ATTACHMENT_INDEX];
        attachment.id = Some(id);
        attachment.ops = ops;
        id
    }

    /// 注册新的 image 并作为 color attachment
    pub fn output_color_attachment(
        &mut self,
        index: usize,
        name: &str,
        desc: GfxImageDesc,
        ops: GfxAttachmentOps,
    ) -> RgResourceId {
        let id = self.resources.register(name, RgResource::image(desc));
        self.set_color_attachment(index, id, ops)
    }

    /// 注册新的 image 并作为 depth attachment
    pub fn output_depth_attachment(&mut self, name: &str, desc: GfxImageDesc, ops: GfxAttachmentOps) -> RgResourceId {
        let id = self.resources.register(name, RgResource::image(desc));
        self.set_depth_attachment(id, ops)
    }

    pub fn set_clear_color(&mut self, index: usize, color: [f32; 4]) {
        assert!(index < MAX_COLOR_ATTACHMENTS, "color attachment index {} out of range", index);
        self.pass.attachments[index].clear_color = color;
    }

    pub fn set_clear_depth(&mut self, depth: f32) {
        self.pass.attachments[DEPTH_ATTACHMENT_INDEX].clear_depth = depth;
    }

    /// 指定哪个 attachment 作为 Pass 的输出，[`DEPTH_ATTACHMENT_INDEX`] 表示 depth
    pub fn set_primary_attachment(&mut self, index: usize) {
        assert!(index <= DEPTH_ATTACHMENT_INDEX, "attachment index {} out of range", index);
        self.pass.primary_attachment = Some(index);
    }
}

// Pass 属性 & 查询
impl RgPassBuilder<'_> {
    /// 不论是否有人使用输出，这个 Pass 都会执行
    pub fn require_pass(&mut self) {
        self.pass.required = true;
    }

    /// 在 Pass 前后提交命令，用于 CPU 需要同步等待 GPU 结果的情况
    pub fn flush_commands(&mut self) {
        self.pass.flush_commands = true;
    }

    pub fn get_id(&self, name: &str) -> Option<RgResourceId> {
        self.resources.get_id(name, 0)
    }

    pub fn get_resource(&self, id: RgResourceId) -> RgResource {
        self.resources.get_resource(id)
    }

    /// 之前的 Pass 留下的输出
    pub fn last_output_id(&self) -> Option<RgResourceId> {
        self.resources.last_output_id()
    }

    pub fn resources(&self) -> &RgResources {
        &*self.resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use nova_gfx::foundation::recording_device::GfxRecordingDevice;
    use smallvec::smallvec;

    use crate::render_graph::config::RgConfig;

    fn setup() -> (RgPass, RgResources) {
        let device = Rc::new(GfxRecordingDevice::new());
        (RgPass::new("Test".to_string(), smallvec![0]), RgResources::new(device, RgConfig::default()))
    }

    fn color_desc() -> GfxImageDesc {
        GfxImageDesc::new_2d(128, 128, vk::Format::R16G16B16A16_SFLOAT)
    }

    #[test]
    fn test_color_attachment_access_from_load_op() {
        let (mut pass, mut resources) = setup();
        let mut builder = RgPassBuilder::new(&mut pass, &mut resources);
        let a = builder.output_color_attachment(0, "A", color_desc(), GfxAttachmentOps::CLEAR_STORE);
        let b = builder.output_color_attachment(1, "B", color_desc(), GfxAttachmentOps::LOAD_STORE);
        assert_eq!(builder.output(), Some(a));

        assert_eq!(pass.accesses, vec![(a, RgAccess::ColorAttachmentWrite), (b, RgAccess::ColorAttachmentReadWrite)]);
        let desc = resources.get_resource(a).image_desc().copied().unwrap();
        assert!(desc.usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
    }

    #[test]
    fn test_output_falls_back_to_last_write() {
        let (mut pass, mut resources) = setup();
        let mut builder = RgPassBuilder::new(&mut pass, &mut resources);
        builder.create_buffer("Counts", GfxBufferDesc::new(64, vk::BufferUsageFlags::empty()), RgAccess::TransferWrite);
        let out = builder.create_image("Out", color_desc(), RgAccess::ComputeShaderWrite);
        assert_eq!(builder.output(), Some(out));
    }

    #[test]
    fn test_usage_accumulates() {
        let (mut pass, mut resources) = setup();
        let mut builder = RgPassBuilder::new(&mut pass, &mut resources);
        let id = builder.create_image("Out", color_desc(), RgAccess::ComputeShaderWrite);
        builder.read(id, RgAccess::TransferRead);

        let usage = resources.get_resource(id).image_desc().map(|desc| desc.usage).unwrap();
        assert!(usage.contains(vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_SRC));
    }

    #[test]
    fn test_read_uniform_is_host_visible() {
        let (mut pass, mut resources) = setup();
        let id = resources.register(
            "Params",
            RgResource::buffer(GfxBufferDesc::new(256, vk::BufferUsageFlags::empty())),
        );
        let mut builder = RgPassBuilder::new(&mut pass, &mut resources);
        builder.read_uniform("Params");

        let desc = resources.get_resource(id).buffer_desc().copied().unwrap();
        assert!(desc.host_visible);
        assert!(desc.usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER));
    }

    #[test]
    fn test_read_previous_frame_on_first_frame() {
        let (mut pass, mut resources) = setup();
        let mut builder = RgPassBuilder::new(&mut pass, &mut resources);
        assert_eq!(builder.read_previous_frame("Hist", RgAccess::FragmentShaderSampleImage, 1), None);

        let reserved = builder.get_id("Hist").unwrap();
        assert_eq!(builder.get_resource(reserved), RgResource::Future);
        assert_eq!(pass.future_reads.len(), 1);
        assert!(pass.accesses.is_empty());
    }

    #[test]
    #[should_panic(expected = "frames ago")]
    fn test_read_previous_frame_range() {
        let (mut pass, mut resources) = setup();
        let mut builder = RgPassBuilder::new(&mut pass, &mut resources);
        builder.read_previous_frame("Hist", RgAccess::FragmentShaderSampleImage, 2);
    }

    #[test]
    #[should_panic(expected = "not found")]
    fn test_read_unknown_name() {
        let (mut pass, mut resources) = setup();
        let mut builder = RgPassBuilder::new(&mut pass, &mut resources);
        builder.read("Missing", RgAccess::FragmentShaderSampleImage);
    }

    #[test]
    #[should_panic(expected = "not a depth image")]
    fn test_depth_attachment_requires_depth_format() {
        let (mut pass, mut resources) = setup();
        let mut builder = RgPassBuilder::new(&mut pass, &mut resources);
        builder.output_depth_attachment("Depth", color_desc(), GfxAttachmentOps::CLEAR_STORE);
    }
}
