//! 没有窗口的 Vulkan 上下文
//!
//! 创建 instance、physical device、logical device 以及 vma allocator，
//! 交给 [`GfxAshDevice`] 使用。用于在真实 GPU 上运行 RenderGraph（示例程序、冒烟测试）。

use std::ffi::CString;
use std::rc::Rc;

use ash::vk;

use crate::foundation::ash_device::GfxAshDevice;

#[derive(Debug, thiserror::Error)]
pub enum GfxHeadlessError {
    #[error("failed to load vulkan: {0}")]
    Loading(#[from] ash::LoadingError),
    #[error("vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),
    #[error("no physical device supports vulkan 1.3 with a graphics + compute queue")]
    NoSuitableDevice,
}

pub struct GfxHeadlessContext {
    /// 必须先于 logical device 和 instance 销毁
    device: Option<Rc<GfxAshDevice>>,
    ash_device: ash::Device,
    instance: ash::Instance,
    _entry: ash::Entry,
}

// new & init
impl GfxHeadlessContext {
    pub fn new(app_name: &str) -> Result<Self, GfxHeadlessError> {
        let entry = unsafe { ash::Entry::load()? };

        let app_name = CString::new(app_name).unwrap_or_default();
        let app_info = vk::ApplicationInfo::default()
            .api_version(vk::API_VERSION_1_3)
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"nova")
            .engine_version(vk::make_api_version(0, 1, 0, 0));

        let debug_utils = unsafe { entry.enumerate_instance_extension_properties(None)? }
            .iter()
            .any(|props| props.extension_name_as_c_str().is_ok_and(|name| name == ash::ext::debug_utils::NAME));
        let extensions = if debug_utils { vec![ash::ext::debug_utils::NAME.as_ptr()] } else { Vec::new() };

        let instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions);
        let instance = unsafe { entry.create_instance(&instance_ci, None)? };

        match Self::create_device(&instance, debug_utils) {
            Ok((ash_device, device)) => Ok(Self {
                device: Some(Rc::new(device)),
                ash_device,
                instance,
                _entry: entry,
            }),
            Err(err) => {
                unsafe { instance.destroy_instance(None) };
                Err(err)
            }
        }
    }

    /// 优先选择独立显卡
    fn pick_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, u32), GfxHeadlessError> {
        let pdevices = unsafe { instance.enumerate_physical_devices()? };
        pdevices
            .into_iter()
            .filter_map(|pdevice| {
                let props = unsafe { instance.get_physical_device_properties(pdevice) };
                if props.api_version < vk::API_VERSION_1_3 {
                    return None;
                }
                let families = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
                let family = families
                    .iter()
                    .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE))?;
                Some((pdevice, family as u32, props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU))
            })
            .min_by_key(|(_, _, discrete)| !discrete)
            .map(|(pdevice, family, _)| (pdevice, family))
            .ok_or(GfxHeadlessError::NoSuitableDevice)
    }

    fn create_device(
        instance: &ash::Instance,
        debug_utils: bool,
    ) -> Result<(ash::Device, GfxAshDevice), GfxHeadlessError> {
        let (pdevice, queue_family_index) = Self::pick_physical_device(instance)?;
        let props = unsafe { instance.get_physical_device_properties(pdevice) };
        log::info!("headless device: {:?}", props.device_name_as_c_str().unwrap_or_default());

        let priorities = [1.0];
        let queue_cis = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family_index)
            .queue_priorities(&priorities)];
        // RenderGraph 依赖 sync2 barrier 和 dynamic rendering
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default().synchronization2(true).dynamic_rendering(true);
        let device_ci = vk::DeviceCreateInfo::default().queue_create_infos(&queue_cis).push_next(&mut features13);
        let ash_device = unsafe { instance.create_device(pdevice, &device_ci, None)? };
        let queue = unsafe { ash_device.get_device_queue(queue_family_index, 0) };

        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(instance, &ash_device, pdevice);
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;
        let allocator = match unsafe { vk_mem::Allocator::new(vma_ci) } {
            Ok(allocator) => allocator,
            Err(err) => {
                unsafe { ash_device.destroy_device(None) };
                return Err(err.into());
            }
        };

        let debug_utils = debug_utils.then(|| ash::ext::debug_utils::Device::new(instance, &ash_device));
        let device = GfxAshDevice::new(ash_device.clone(), allocator, queue, queue_family_index, debug_utils);
        Ok((ash_device, device))
    }
}

// getters
impl GfxHeadlessContext {
    /// # Panic
    /// context 已经在销毁过程中时 panic
    pub fn device(&self) -> Rc<GfxAshDevice> {
        self.device.clone().unwrap_or_else(|| panic!("headless context is being destroyed"))
    }
}

impl Drop for GfxHeadlessContext {
    fn drop(&mut self) {
        let Some(device) = self.device.take() else {
            return;
        };
        match Rc::try_unwrap(device) {
            Ok(device) => drop(device),
            Err(_) => {
                log::error!("headless context dropped while its device is still in use, leaking vulkan objects");
                return;
            }
        }

        unsafe {
            self.ash_device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
