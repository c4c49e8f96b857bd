//! 只记录调用、不访问 GPU 的设备
//!
//! 用于测试和无头运行：
//! - 为每个资源和命令缓冲区分配唯一且单调递增的假句柄，可以用句柄判断资源是否被复用
//! - 按调用顺序记录所有命令，测试通过 [`GfxRecordingDevice::commands`] 检查
//! - 在 `submit` 时模拟 buffer 的 copy / fill，使同步回读路径可以被测试

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use ash::vk;
use ash::vk::Handle;
use itertools::Itertools;

use crate::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use crate::commands::command_buffer::GfxCommandBuffer;
use crate::commands::rendering_info::GfxRenderingInfo;
use crate::foundation::device::GfxDevice;
use crate::resources::buffer::{GfxBuffer, GfxBufferDesc};
use crate::resources::image::{GfxImage, GfxImageDesc};

/// 录制下来的一次设备调用
#[derive(Clone, Debug)]
pub enum GfxRecordedCommand {
    CreateImage {
        image: vk::Image,
        desc: GfxImageDesc,
        name: String,
    },
    DestroyImage {
        image: vk::Image,
    },
    CreateBuffer {
        buffer: vk::Buffer,
        desc: GfxBufferDesc,
        name: String,
    },
    DestroyBuffer {
        buffer: vk::Buffer,
    },
    BeginCommandBuffer {
        cmd: vk::CommandBuffer,
        name: String,
    },
    Submit {
        cmds: Vec<vk::CommandBuffer>,
    },
    WaitIdle,
    PipelineBarrier {
        cmd: vk::CommandBuffer,
        images: Vec<GfxImageBarrier>,
        buffers: Vec<GfxBufferBarrier>,
    },
    BeginRendering {
        cmd: vk::CommandBuffer,
        color_images: Vec<vk::Image>,
        depth_image: Option<vk::Image>,
        render_area: vk::Rect2D,
    },
    EndRendering {
        cmd: vk::CommandBuffer,
    },
    Draw {
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
    },
    Dispatch {
        cmd: vk::CommandBuffer,
        group_count: [u32; 3],
    },
    CopyBuffer {
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    },
    FillBuffer {
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        data: u32,
    },
    BeginLabel {
        cmd: vk::CommandBuffer,
        label: String,
    },
    EndLabel {
        cmd: vk::CommandBuffer,
    },
}

/// 在 submit 时才生效的 buffer 操作
enum PendingTransfer {
    Copy {
        src: vk::Buffer,
        dst: vk::Buffer,
        size: usize,
    },
    Fill {
        buffer: vk::Buffer,
        data: u32,
    },
}

#[derive(Default)]
pub struct GfxRecordingDevice {
    next_handle: Cell<u64>,
    commands: RefCell<Vec<GfxRecordedCommand>>,

    live_images: RefCell<HashSet<vk::Image>>,
    buffer_memory: RefCell<HashMap<vk::Buffer, Vec<u8>>>,

    /// 处于 recording 状态的命令缓冲区，以及它们在 submit 时要模拟的传输操作
    recording_cmds: RefCell<HashMap<vk::CommandBuffer, Vec<PendingTransfer>>>,
}

// new & init
impl GfxRecordingDevice {
    pub fn new() -> Self {
        Self {
            next_handle: Cell::new(1),
            ..Default::default()
        }
    }

    fn alloc_handle(&self) -> u64 {
        // Default 构造时从 0 开始，跳过 0（VK_NULL_HANDLE）
        let handle = self.next_handle.get().max(1);
        self.next_handle.set(handle + 1);
        handle
    }
}

// getters
impl GfxRecordingDevice {
    /// 目前为止录制的所有调用
    pub fn commands(&self) -> Vec<GfxRecordedCommand> {
        self.commands.borrow().clone()
    }

    /// 取出并清空已录制的调用
    pub fn take_commands(&self) -> Vec<GfxRecordedCommand> {
        std::mem::take(&mut *self.commands.borrow_mut())
    }

    pub fn live_image_count(&self) -> usize {
        self.live_images.borrow().len()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffer_memory.borrow().len()
    }

    /// 所有 barrier 调用中的 image barrier，按录制顺序展开
    pub fn image_barriers(&self) -> Vec<GfxImageBarrier> {
        self.commands
            .borrow()
            .iter()
            .filter_map(|cmd| match cmd {
                GfxRecordedCommand::PipelineBarrier { images, .. } => Some(images.clone()),
                _ => None,
            })
            .flatten()
            .collect_vec()
    }

    pub fn draw_count(&self) -> usize {
        self.commands.borrow().iter().filter(|cmd| matches!(cmd, GfxRecordedCommand::Draw { .. })).count()
    }
}

// tools
impl GfxRecordingDevice {
    fn record(&self, command: GfxRecordedCommand) {
        log::trace!("GfxRecordingDevice: {:?}", command);
        self.commands.borrow_mut().push(command);
    }

    fn assert_recording(&self, cmd: &GfxCommandBuffer) {
        assert!(
            self.recording_cmds.borrow().contains_key(&cmd.vk_handle()),
            "command buffer {} is not recording",
            cmd.name()
        );
    }

    fn apply_transfer(&self, transfer: &PendingTransfer) {
        let mut memory = self.buffer_memory.borrow_mut();
        match *transfer {
            PendingTransfer::Copy { src, dst, size } => {
                let data = memory.get(&src).map(|bytes| bytes[..size].to_vec()).unwrap_or_default();
                if let Some(dst) = memory.get_mut(&dst) {
                    dst[..data.len()].copy_from_slice(&data);
                }
            }
            PendingTransfer::Fill { buffer, data } => {
                if let Some(bytes) = memory.get_mut(&buffer) {
                    for chunk in bytes.chunks_exact_mut(4) {
                        chunk.copy_from_slice(&data.to_ne_bytes());
                    }
                }
            }
        }
    }
}

impl GfxDevice for GfxRecordingDevice {
    fn create_image(&self, desc: &GfxImageDesc, debug_name: &str) -> GfxImage {
        let image = vk::Image::from_raw(self.alloc_handle());
        let view = vk::ImageView::from_raw(self.alloc_handle());
        self.live_images.borrow_mut().insert(image);
        self.record(GfxRecordedCommand::CreateImage {
            image,
            desc: *desc,
            name: debug_name.to_string(),
        });
        GfxImage {
            image,
            view,
            desc: *desc,
        }
    }

    fn destroy_image(&self, image: GfxImage) {
        assert!(self.live_images.borrow_mut().remove(&image.image), "destroy unknown image {:?}", image.image);
        self.record(GfxRecordedCommand::DestroyImage { image: image.image });
    }

    fn create_buffer(&self, desc: &GfxBufferDesc, debug_name: &str) -> GfxBuffer {
        let buffer = vk::Buffer::from_raw(self.alloc_handle());
        self.buffer_memory.borrow_mut().insert(buffer, vec![0; desc.size as usize]);
        self.record(GfxRecordedCommand::CreateBuffer {
            buffer,
            desc: *desc,
            name: debug_name.to_string(),
        });
        GfxBuffer { buffer, desc: *desc }
    }

    fn destroy_buffer(&self, buffer: GfxBuffer) {
        assert!(
            self.buffer_memory.borrow_mut().remove(&buffer.buffer).is_some(),
            "destroy unknown buffer {:?}",
            buffer.buffer
        );
        self.record(GfxRecordedCommand::DestroyBuffer { buffer: buffer.buffer });
    }

    fn write_buffer(&self, buffer: &GfxBuffer, offset: vk::DeviceSize, data: &[u8]) {
        assert!(buffer.desc.host_visible, "write to device local buffer {:?}", buffer.buffer);
        let mut memory = self.buffer_memory.borrow_mut();
        let bytes = memory.get_mut(&buffer.buffer).unwrap_or_else(|| panic!("unknown buffer {:?}", buffer.buffer));
        let offset = offset as usize;
        bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    fn read_buffer(&self, buffer: &GfxBuffer, offset: vk::DeviceSize, size: usize) -> Vec<u8> {
        assert!(buffer.desc.host_visible, "read from device local buffer {:?}", buffer.buffer);
        let memory = self.buffer_memory.borrow();
        let bytes = memory.get(&buffer.buffer).unwrap_or_else(|| panic!("unknown buffer {:?}", buffer.buffer));
        let offset = offset as usize;
        bytes[offset..offset + size].to_vec()
    }

    fn begin_command_buffer(&self, name: &str) -> GfxCommandBuffer {
        let cmd = vk::CommandBuffer::from_raw(self.alloc_handle());
        self.recording_cmds.borrow_mut().insert(cmd, Vec::new());
        self.record(GfxRecordedCommand::BeginCommandBuffer {
            cmd,
            name: name.to_string(),
        });
        GfxCommandBuffer::new(cmd, name)
    }

    fn submit(&self, cmds: Vec<GfxCommandBuffer>) {
        let _span = tracy_client::Client::running()
            .map(|client| client.span_alloc(Some("GfxRecordingDevice::submit"), "submit", file!(), line!(), 0));

        for cmd in &cmds {
            self.assert_recording(cmd);
            let transfers = self.recording_cmds.borrow_mut().remove(&cmd.vk_handle()).unwrap_or_default();
            for transfer in &transfers {
                self.apply_transfer(transfer);
            }
        }
        self.record(GfxRecordedCommand::Submit {
            cmds: cmds.iter().map(GfxCommandBuffer::vk_handle).collect(),
        });
    }

    fn wait_idle(&self) {
        self.record(GfxRecordedCommand::WaitIdle);
    }

    fn cmd_pipeline_barrier(&self, cmd: &GfxCommandBuffer, images: &[GfxImageBarrier], buffers: &[GfxBufferBarrier]) {
        self.assert_recording(cmd);
        self.record(GfxRecordedCommand::PipelineBarrier {
            cmd: cmd.vk_handle(),
            images: images.to_vec(),
            buffers: buffers.to_vec(),
        });
    }

    fn cmd_begin_rendering(&self, cmd: &GfxCommandBuffer, info: &GfxRenderingInfo) {
        self.assert_recording(cmd);
        self.record(GfxRecordedCommand::BeginRendering {
            cmd: cmd.vk_handle(),
            color_images: info.color_attachments.iter().map(|a| a.image.image).collect(),
            depth_image: info.depth_attachment.map(|a| a.image.image),
            render_area: info.render_area,
        });
    }

    fn cmd_end_rendering(&self, cmd: &GfxCommandBuffer) {
        self.assert_recording(cmd);
        self.record(GfxRecordedCommand::EndRendering { cmd: cmd.vk_handle() });
    }

    fn cmd_draw(&self, cmd: &GfxCommandBuffer, vertex_count: u32, instance_count: u32) {
        self.assert_recording(cmd);
        self.record(GfxRecordedCommand::Draw {
            cmd: cmd.vk_handle(),
            vertex_count,
            instance_count,
        });
    }

    fn cmd_dispatch(&self, cmd: &GfxCommandBuffer, group_count: [u32; 3]) {
        self.assert_recording(cmd);
        self.record(GfxRecordedCommand::Dispatch {
            cmd: cmd.vk_handle(),
            group_count,
        });
    }

    fn cmd_copy_buffer(&self, cmd: &GfxCommandBuffer, src: &GfxBuffer, dst: &GfxBuffer, size: vk::DeviceSize) {
        self.assert_recording(cmd);
        if let Some(transfers) = self.recording_cmds.borrow_mut().get_mut(&cmd.vk_handle()) {
            transfers.push(PendingTransfer::Copy {
                src: src.buffer,
                dst: dst.buffer,
                size: size as usize,
            });
        }
        self.record(GfxRecordedCommand::CopyBuffer {
            cmd: cmd.vk_handle(),
            src: src.buffer,
            dst: dst.buffer,
            size,
        });
    }

    fn cmd_fill_buffer(&self, cmd: &GfxCommandBuffer, buffer: &GfxBuffer, data: u32) {
        self.assert_recording(cmd);
        if let Some(transfers) = self.recording_cmds.borrow_mut().get_mut(&cmd.vk_handle()) {
            transfers.push(PendingTransfer::Fill {
                buffer: buffer.buffer,
                data,
            });
        }
        self.record(GfxRecordedCommand::FillBuffer {
            cmd: cmd.vk_handle(),
            buffer: buffer.buffer,
            data,
        });
    }

    fn cmd_begin_label(&self, cmd: &GfxCommandBuffer, label: &str, _color: [f32; 4]) {
        self.assert_recording(cmd);
        self.record(GfxRecordedCommand::BeginLabel {
            cmd: cmd.vk_handle(),
            label: label.to_string(),
        });
    }

    fn cmd_end_label(&self, cmd: &GfxCommandBuffer) {
        self.assert_recording(cmd);
        self.record(GfxRecordedCommand::EndLabel { cmd: cmd.vk_handle() });
    }
}
