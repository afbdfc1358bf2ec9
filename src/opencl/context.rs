//! OpenCL 设备枚举
//!
//! 启动时扫描所有平台, 收集 GPU 设备档案。跳过序号按发现顺序
//! 计数, 被跳过的序号仍然占位, 因此同一台机器上序号不随跳过
//! 选择而漂移。

use log::{debug, info};
use ocl::enums::DeviceInfo;
use ocl::{Device, Platform};

use crate::opencl::program::device_cache_key;

/// 设备档案: 枚举时采集的稳定信息
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub platform: Platform,
    pub device: Device,
    /// 稳定设备标识, 由名称 + 显存 + 发现序号派生
    pub uid: String,
    pub name: String,
    pub compute_units: u32,
    pub global_mem_bytes: u64,
    /// 在完整 GPU 列表中的发现序号 (跳过列表应用之前)
    pub enumeration_index: usize,
}

impl DeviceProfile {
    /// 显示标签, 如 "GPU0"
    pub fn label(&self) -> String {
        format!("GPU{}", self.enumeration_index)
    }
}

/// 枚举所有平台上的 GPU 设备并应用跳过列表
pub fn enumerate_gpu_devices(skip: &[usize]) -> anyhow::Result<Vec<DeviceProfile>> {
    let platforms = Platform::list();
    if platforms.is_empty() {
        anyhow::bail!("No OpenCL platforms found");
    }
    info!("Found {} OpenCL platform(s)", platforms.len());

    let mut profiles = Vec::new();
    let mut index = 0usize;
    for platform in &platforms {
        let devices = Device::list_all(platform)?;
        debug!("Platform: {:?}, Devices: {}", platform.name(), devices.len());

        for device in devices {
            let name = device.name()?;
            if !device_is_gpu(&device, &name) {
                debug!("  Skipping non-GPU device: {}", name);
                continue;
            }
            if skip.contains(&index) {
                info!("  GPU{}: {} (skipped by request)", index, name);
                index += 1;
                continue;
            }

            let compute_units = device_info_u64(&device, DeviceInfo::MaxComputeUnits) as u32;
            let global_mem_bytes = device_info_u64(&device, DeviceInfo::GlobalMemSize);
            let uid = device_cache_key(&name, global_mem_bytes, index);
            debug!("  GPU{}: {} (uid {})", index, name, uid);

            profiles.push(DeviceProfile {
                platform: *platform,
                device,
                uid,
                name,
                compute_units,
                global_mem_bytes,
                enumeration_index: index,
            });
            index += 1;
        }
    }

    info!("Enumerated {} usable GPU device(s)", profiles.len());
    Ok(profiles)
}

/// 检测是否为 GPU (优先使用 API 查询, 回退到名称判断)
fn device_is_gpu(device: &Device, name: &str) -> bool {
    let by_type = device
        .info(DeviceInfo::Type)
        .ok()
        .and_then(|t| t.to_string().parse::<u64>().ok())
        .map(|t| t == 4);
    if let Some(is_gpu) = by_type {
        return is_gpu;
    }
    let name_lower = name.to_lowercase();
    name_lower.contains("gpu")
        || name_lower.contains("graphics")
        || name_lower.contains("nvidia")
        || name_lower.contains("amd")
        || name_lower.contains("radeon")
}

/// 查询数值型设备信息, 查询失败返回 0
fn device_info_u64(device: &Device, info: DeviceInfo) -> u64 {
    device
        .info(info)
        .ok()
        .and_then(|v| v.to_string().parse::<u64>().ok())
        .unwrap_or(0)
}
