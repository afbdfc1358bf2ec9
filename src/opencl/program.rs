//! 内核程序构建与二进制缓存
//!
//! 编译后的程序二进制落盘复用, 下次启动同一设备直接加载,
//! 跳过几十秒的内核编译。缓存键由设备名称、显存容量与发现
//! 序号派生, 不依赖任何厂商专有的拓扑扩展, 缺少扩展的设备
//! 不会退化成共用同一个键。

use std::ffi::CString;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use ocl::enums::{ProgramInfo, ProgramInfoResult};
use ocl::{Context, Program};
use sha2::{Digest, Sha256};

use crate::opencl::context::DeviceProfile;

/// 加载完整内核源代码
///
/// 按依赖顺序合并所有内核文件:
/// 1. Keccak-256 (以太坊地址哈希)
/// 2. secp256k1 (椭圆曲线点运算)
/// 3. 主搜索内核
///
/// # Example
/// ```
/// use gpu_vanity::assemble_kernel_source;
///
/// let source = assemble_kernel_source().expect("Failed to load kernel source");
/// assert!(source.contains("vanity_round"));
/// ```
pub fn assemble_kernel_source() -> anyhow::Result<String> {
    load_kernel_stages(&["keccak", "secp256k1", "search"])
}

/// 加载指定阶段的内核源代码 (用于测试和调试)
///
/// # Arguments
/// * `stages` - 要加载的内核阶段列表, 按顺序:
///   - "keccak" - Keccak-256 哈希
///   - "secp256k1" - 椭圆曲线运算
///   - "search" - 主搜索内核
pub fn load_kernel_stages(stages: &[&str]) -> anyhow::Result<String> {
    let mut source = String::new();

    for stage in stages {
        match *stage {
            "keccak" => {
                source.push_str(include_str!("../../kernels/crypto/keccak.cl"));
            }
            "secp256k1" => {
                source.push_str(include_str!("../../kernels/crypto/secp256k1.cl"));
            }
            "search" => {
                source.push_str(include_str!("../../kernels/search.cl"));
            }
            _ => anyhow::bail!("Unknown kernel stage: {}", stage),
        }
        source.push('\n');
    }

    Ok(source)
}

/// 设备缓存键: SHA-256(名称 + 显存 + 发现序号) 截断为 16 个十六进制字符
pub fn device_cache_key(name: &str, global_mem_bytes: u64, enumeration_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(global_mem_bytes.to_le_bytes());
    hasher.update((enumeration_index as u64).to_le_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// 缓存文件路径: cache-opencl.<设备键>
pub fn cache_path(cache_dir: &Path, uid: &str) -> PathBuf {
    cache_dir.join(format!("cache-opencl.{}", uid))
}

/// 设备是否已有预编译二进制
pub fn has_cached_binary(cache_dir: &Path, profile: &DeviceProfile) -> bool {
    cache_path(cache_dir, &profile.uid).is_file()
}

/// 为设备构建搜索程序
///
/// 优先加载磁盘缓存的二进制; 缓存缺失或加载失败时从源码编译,
/// 编译产物写回缓存。
pub fn build_search_program(
    context: &Context,
    profile: &DeviceProfile,
    cache_dir: &Path,
) -> anyhow::Result<Program> {
    let path = cache_path(cache_dir, &profile.uid);
    if let Ok(binary) = fs::read(&path) {
        match Program::with_binary(
            context,
            &[profile.device],
            &[binary.as_slice()],
            &CString::default(),
        ) {
            Ok(program) => {
                info!(
                    "Loaded precompiled kernel for {} from {}",
                    profile.name,
                    path.display()
                );
                return Ok(program);
            }
            Err(e) => {
                warn!("Discarding stale kernel cache {}: {}", path.display(), e);
            }
        }
    }

    info!("Building OpenCL program for {}...", profile.name);
    let source = assemble_kernel_source()?;
    let program = Program::builder()
        .src(source)
        .devices(profile.device)
        .build(context)?;
    info!("OpenCL program built successfully");
    save_program_binary(&program, &path);
    Ok(program)
}

/// 写出编译后的程序二进制, 失败只告警不中断
fn save_program_binary(program: &Program, path: &Path) {
    match program.info(ProgramInfo::Binaries) {
        Ok(ProgramInfoResult::Binaries(binaries)) => {
            let Some(binary) = binaries.first() else {
                warn!("Program reported no binaries, cache not written");
                return;
            };
            if let Err(e) = fs::write(path, binary) {
                warn!("Failed to save kernel cache {}: {}", path.display(), e);
            } else {
                debug!("Saved kernel binary to {}", path.display());
            }
        }
        Ok(other) => warn!("Unexpected program info result: {:?}", other),
        Err(e) => warn!("Failed to query program binaries: {}", e),
    }
}
