//! 基于 ash + vk-mem 的 [`GfxDevice`] 实现
//!
//! instance、physical device、logical device 以及 allocator 的创建由外部负责
//! （窗口层、swapchain 等都不属于这一层），这里只接管：
//! - image / buffer 的分配与释放
//! - 一个 command pool，命令缓冲区提交后由 fence 跟踪，完成后自动回收
//! - sync2 barrier、dynamic rendering 等命令的录制

use std::cell::RefCell;
use std::collections::HashMap;

use ash::prelude::VkResult;
use ash::vk;
use itertools::Itertools;
use vk_mem::Alloc;

use crate::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use crate::commands::command_buffer::GfxCommandBuffer;
use crate::commands::rendering_info::GfxRenderingInfo;
use crate::foundation::device::GfxDevice;
use crate::resources::buffer::{GfxBuffer, GfxBufferDesc};
use crate::resources::image::{GfxImage, GfxImageDesc};

struct ImageAllocation {
    view: vk::ImageView,
    allocation: vk_mem::Allocation,
}

/// 已经提交、等待 GPU 完成的一批命令缓冲区
struct InFlightSubmit {
    fence: vk::Fence,
    cmds: Vec<vk::CommandBuffer>,
}

pub struct GfxAshDevice {
    device: ash::Device,
    allocator: vk_mem::Allocator,
    queue: vk::Queue,
    command_pool: vk::CommandPool,

    /// 没有开启 debug utils 扩展时为 None，label 相关命令直接忽略
    debug_utils: Option<ash::ext::debug_utils::Device>,

    images: RefCell<HashMap<vk::Image, ImageAllocation>>,
    buffers: RefCell<HashMap<vk::Buffer, vk_mem::Allocation>>,
    in_flight: RefCell<Vec<InFlightSubmit>>,
}

/// 设备错误不可恢复
fn check<T>(result: VkResult<T>, what: &str) -> T {
    result.unwrap_or_else(|e| panic!("{} failed: {:?}", what, e))
}

// new & init
impl GfxAshDevice {
    pub fn new(
        device: ash::Device,
        allocator: vk_mem::Allocator,
        queue: vk::Queue,
        queue_family_index: u32,
        debug_utils: Option<ash::ext::debug_utils::Device>,
    ) -> Self {
        let command_pool = unsafe {
            check(
                device.create_command_pool(
                    &vk::CommandPoolCreateInfo::default()
                        .queue_family_index(queue_family_index)
                        .flags(vk::CommandPoolCreateFlags::TRANSIENT),
                    None,
                ),
                "create_command_pool",
            )
        };

        Self {
            device,
            allocator,
            queue,
            command_pool,
            debug_utils,
            images: RefCell::new(HashMap::new()),
            buffers: RefCell::new(HashMap::new()),
            in_flight: RefCell::new(Vec::new()),
        }
    }
}

// tools
impl GfxAshDevice {
    /// 回收 GPU 已经执行完毕的命令缓冲区
    fn recycle(&self, wait: bool) {
        let mut in_flight = self.in_flight.borrow_mut();
        in_flight.retain(|submit| {
            let finished = unsafe {
                if wait {
                    check(self.device.wait_for_fences(&[submit.fence], true, u64::MAX), "wait_for_fences");
                    true
                } else {
                    check(self.device.get_fence_status(submit.fence), "get_fence_status")
                }
            };
            if finished {
                unsafe {
                    self.device.free_command_buffers(self.command_pool, &submit.cmds);
                    self.device.destroy_fence(submit.fence, None);
                }
            }
            !finished
        });
    }

    fn buffer_alloc_info(desc: &GfxBufferDesc) -> vk_mem::AllocationCreateInfo {
        vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            flags: if desc.host_visible {
                vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            ..Default::default()
        }
    }
}

impl Drop for GfxAshDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
        }
        self.recycle(true);

        unsafe {
            for (image, mut alloc) in self.images.borrow_mut().drain() {
                self.device.destroy_image_view(alloc.view, None);
                self.allocator.destroy_image(image, &mut alloc.allocation);
            }
            for (buffer, mut allocation) in self.buffers.borrow_mut().drain() {
                self.allocator.destroy_buffer(buffer, &mut allocation);
            }
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

impl GfxDevice for GfxAshDevice {
    fn create_image(&self, desc: &GfxImageDesc, debug_name: &str) -> GfxImage {
        let _span = tracy_client::Client::running()
            .map(|client| client.span_alloc(Some("GfxAshDevice::create_image"), "create_image", file!(), line!(), 0));

        let alloc_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };
        let (image, allocation) =
            unsafe { check(self.allocator.create_image(&desc.create_info(), &alloc_info), "create_image") };

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(desc.view_type)
            .format(desc.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: desc.aspect(),
                base_mip_level: 0,
                level_count: desc.mip_levels,
                base_array_layer: 0,
                layer_count: desc.array_layers,
            });
        let view = unsafe { check(self.device.create_image_view(&view_info, None), "create_image_view") };

        log::debug!("create image {}: {}x{} {:?}", debug_name, desc.width, desc.height, desc.format);
        self.images.borrow_mut().insert(image, ImageAllocation { view, allocation });

        GfxImage {
            image,
            view,
            desc: *desc,
        }
    }

    fn destroy_image(&self, image: GfxImage) {
        let Some(mut alloc) = self.images.borrow_mut().remove(&image.image) else {
            panic!("destroy unknown image {:?}", image.image);
        };
        unsafe {
            self.device.destroy_image_view(alloc.view, None);
            self.allocator.destroy_image(image.image, &mut alloc.allocation);
        }
    }

    fn create_buffer(&self, desc: &GfxBufferDesc, debug_name: &str) -> GfxBuffer {
        let _span = tracy_client::Client::running()
            .map(|client| client.span_alloc(Some("GfxAshDevice::create_buffer"), "create_buffer", file!(), line!(), 0));

        let (buffer, allocation) = unsafe {
            check(
                self.allocator.create_buffer(&desc.create_info(), &Self::buffer_alloc_info(desc)),
                "create_buffer",
            )
        };

        log::debug!("create buffer {}: {} bytes", debug_name, desc.size);
        self.buffers.borrow_mut().insert(buffer, allocation);

        GfxBuffer { buffer, desc: *desc }
    }

    fn destroy_buffer(&self, buffer: GfxBuffer) {
        let Some(mut allocation) = self.buffers.borrow_mut().remove(&buffer.buffer) else {
            panic!("destroy unknown buffer {:?}", buffer.buffer);
        };
        unsafe {
            self.allocator.destroy_buffer(buffer.buffer, &mut allocation);
        }
    }

    fn write_buffer(&self, buffer: &GfxBuffer, offset: vk::DeviceSize, data: &[u8]) {
        assert!(buffer.desc.host_visible, "write to device local buffer {:?}", buffer.buffer);
        let mut buffers = self.buffers.borrow_mut();
        let allocation = buffers.get_mut(&buffer.buffer).unwrap_or_else(|| panic!("unknown buffer {:?}", buffer.buffer));

        unsafe {
            let ptr = check(self.allocator.map_memory(allocation), "map_memory");
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
            check(
                self.allocator.flush_allocation(allocation, offset, data.len() as vk::DeviceSize),
                "flush_allocation",
            );
            self.allocator.unmap_memory(allocation);
        }
    }

    fn read_buffer(&self, buffer: &GfxBuffer, offset: vk::DeviceSize, size: usize) -> Vec<u8> {
        assert!(buffer.desc.host_visible, "read from device local buffer {:?}", buffer.buffer);
        let mut buffers = self.buffers.borrow_mut();
        let allocation = buffers.get_mut(&buffer.buffer).unwrap_or_else(|| panic!("unknown buffer {:?}", buffer.buffer));

        let mut data = vec![0u8; size];
        unsafe {
            check(
                self.allocator.invalidate_allocation(allocation, offset, size as vk::DeviceSize),
                "invalidate_allocation",
            );
            let ptr = check(self.allocator.map_memory(allocation), "map_memory");
            std::ptr::copy_nonoverlapping(ptr.add(offset as usize), data.as_mut_ptr(), size);
            self.allocator.unmap_memory(allocation);
        }
        data
    }

    fn begin_command_buffer(&self, name: &str) -> GfxCommandBuffer {
        self.recycle(false);

        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmd = unsafe { check(self.device.allocate_command_buffers(&info), "allocate_command_buffers")[0] };
        unsafe {
            check(
                self.device.begin_command_buffer(
                    cmd,
                    &vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
                ),
                "begin_command_buffer",
            );
        }
        GfxCommandBuffer::new(cmd, name)
    }

    fn submit(&self, cmds: Vec<GfxCommandBuffer>) {
        if cmds.is_empty() {
            return;
        }
        let _span = tracy_client::Client::running()
            .map(|client| client.span_alloc(Some("GfxAshDevice::submit"), "submit", file!(), line!(), 0));

        let vk_cmds = cmds.iter().map(GfxCommandBuffer::vk_handle).collect_vec();
        let cmd_infos =
            vk_cmds.iter().map(|cmd| vk::CommandBufferSubmitInfo::default().command_buffer(*cmd)).collect_vec();

        unsafe {
            for cmd in &vk_cmds {
                check(self.device.end_command_buffer(*cmd), "end_command_buffer");
            }
            let fence = check(self.device.create_fence(&vk::FenceCreateInfo::default(), None), "create_fence");
            let submit_info = vk::SubmitInfo2::default().command_buffer_infos(&cmd_infos);
            check(self.device.queue_submit2(self.queue, &[submit_info], fence), "queue_submit2");

            self.in_flight.borrow_mut().push(InFlightSubmit { fence, cmds: vk_cmds });
        }
    }

    fn wait_idle(&self) {
        unsafe {
            check(self.device.queue_wait_idle(self.queue), "queue_wait_idle");
        }
        self.recycle(true);
    }

    fn cmd_pipeline_barrier(&self, cmd: &GfxCommandBuffer, images: &[GfxImageBarrier], buffers: &[GfxBufferBarrier]) {
        let image_barriers = images.iter().map(|b| *b.inner()).collect_vec();
        let buffer_barriers = buffers.iter().map(|b| *b.inner()).collect_vec();
        let dependency_info = vk::DependencyInfo::default()
            .image_memory_barriers(&image_barriers)
            .buffer_memory_barriers(&buffer_barriers);
        unsafe {
            self.device.cmd_pipeline_barrier2(cmd.vk_handle(), &dependency_info);
        }
    }

    fn cmd_begin_rendering(&self, cmd: &GfxCommandBuffer, info: &GfxRenderingInfo) {
        let (color_infos, depth_info) = info.vk_attachments();
        let mut rendering_info = vk::RenderingInfo::default()
            .layer_count(info.layer_count.max(1))
            .render_area(info.render_area)
            .color_attachments(&color_infos);
        if let Some(depth_info) = &depth_info {
            rendering_info = rendering_info.depth_attachment(depth_info);
        }

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: info.render_area.extent.width as f32,
            height: info.render_area.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        unsafe {
            self.device.cmd_begin_rendering(cmd.vk_handle(), &rendering_info);
            self.device.cmd_set_viewport(cmd.vk_handle(), 0, &[viewport]);
            self.device.cmd_set_scissor(cmd.vk_handle(), 0, &[info.render_area]);
        }
    }

    fn cmd_end_rendering(&self, cmd: &GfxCommandBuffer) {
        unsafe {
            self.device.cmd_end_rendering(cmd.vk_handle());
        }
    }

    fn cmd_draw(&self, cmd: &GfxCommandBuffer, vertex_count: u32, instance_count: u32) {
        unsafe {
            self.device.cmd_draw(cmd.vk_handle(), vertex_count, instance_count, 0, 0);
        }
    }

    fn cmd_dispatch(&self, cmd: &GfxCommandBuffer, group_count: [u32; 3]) {
        unsafe {
            self.device.cmd_dispatch(cmd.vk_handle(), group_count[0], group_count[1], group_count[2]);
        }
    }

    fn cmd_copy_buffer(&self, cmd: &GfxCommandBuffer, src: &GfxBuffer, dst: &GfxBuffer, size: vk::DeviceSize) {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        unsafe {
            self.device.cmd_copy_buffer(cmd.vk_handle(), src.buffer, dst.buffer, &[region]);
        }
    }

    fn cmd_fill_buffer(&self, cmd: &GfxCommandBuffer, buffer: &GfxBuffer, data: u32) {
        unsafe {
            self.device.cmd_fill_buffer(cmd.vk_handle(), buffer.buffer, 0, vk::WHOLE_SIZE, data);
        }
    }

    fn cmd_begin_label(&self, cmd: &GfxCommandBuffer, label: &str, color: [f32; 4]) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        // label 中不应出现 `\0`，出现时截断
        let name = std::ffi::CString::new(label.split('\0').next().unwrap_or_default()).unwrap_or_default();
        unsafe {
            debug_utils.cmd_begin_debug_utils_label(
                cmd.vk_handle(),
                &vk::DebugUtilsLabelEXT::default().label_name(name.as_c_str()).color(color),
            );
        }
    }

    fn cmd_end_label(&self, cmd: &GfxCommandBuffer) {
        if let Some(debug_utils) = &self.debug_utils {
            unsafe {
                debug_utils.cmd_end_debug_utils_label(cmd.vk_handle());
            }
        }
    }
}
