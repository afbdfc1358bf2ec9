//! GPU 轮次引擎
//!
//! 每轮主机只做一次标量乘: 基点 = (种子 + 计数器)·G。工作项 gid
//! 在设备上用预计算的偏移点表把基点平移到 (基标量 + gid)·G, 再做
//! Keccak-256 得到地址。偏移表常驻显存, 轮与轮之间只需上传 64 字节
//! 的新基点。
//!
//! 提交与回读走两条独立队列。内核队列按序执行 [写基点][内核],
//! 回读队列凭完成事件取上一轮的结果槽, 与当前轮计算重叠。

use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use log::debug;
use ocl::{Buffer, Context, Event, Kernel, Program, Queue, SpatialDims};
use secp256k1::{PublicKey, SECP256K1, SecretKey};

use crate::dispatcher::RoundEngine;
use crate::error::DeviceComputeError;
use crate::filter::RoundYield;
use crate::mode::ADDRESS_LEN;
use crate::opencl::context::DeviceProfile;
use crate::opencl::program::build_search_program;
use crate::seed::BaseSeed;

/// 一个仿射点的 limb 数 (x, y 各 8 个 32 位 limb)
pub const POINT_LIMBS: usize = 16;

/// 低位偏移表条目数: j·G, j = 1..=255
pub const TABLE_LO_ENTRIES: usize = 255;

/// 主机侧预计算的偏移点表
///
/// lo[j-1] = j·G (j = 1..=255), hi[k-1] = (k·256)·G。
/// 工作项 gid 的点 = 基点 + hi 表项 + lo 表项, gid = hi·256 + lo。
pub struct PointTables {
    lo: Vec<u32>,
    hi: Vec<u32>,
}

impl PointTables {
    /// 生成覆盖给定最大工作规模的偏移表
    pub fn generate(worksize_max: usize) -> anyhow::Result<PointTables> {
        let generator =
            PublicKey::from_secret_key(&SECP256K1, &SecretKey::from_slice(&scalar_bytes(1))?);

        // lo[j-1] = j·G, 逐项累加生成
        let mut lo = Vec::with_capacity(TABLE_LO_ENTRIES * POINT_LIMBS);
        let mut point = generator;
        push_point_limbs(&mut lo, &point);
        for _ in 1..TABLE_LO_ENTRIES {
            point = point.combine(&generator)?;
            push_point_limbs(&mut lo, &point);
        }

        // hi[k-1] = (k·256)·G, 以 256·G 为步长
        let step = point.combine(&generator)?;
        let entries = hi_table_entries(worksize_max);
        let mut hi = Vec::with_capacity(entries * POINT_LIMBS);
        let mut point = step;
        push_point_limbs(&mut hi, &point);
        for _ in 1..entries {
            point = point.combine(&step)?;
            push_point_limbs(&mut hi, &point);
        }

        Ok(PointTables { lo, hi })
    }

    pub fn lo_limbs(&self) -> &[u32] {
        &self.lo
    }

    pub fn hi_limbs(&self) -> &[u32] {
        &self.hi
    }
}

/// gid 最大到 worksize_max - 1, 需要的 hi 表条目数
fn hi_table_entries(worksize_max: usize) -> usize {
    ((worksize_max.max(1) - 1) >> 8).max(1)
}

fn scalar_bytes(value: u64) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&value.to_be_bytes());
    bytes
}

/// 公钥仿射坐标转 limb 序列, x 在前 y 在后
fn push_point_limbs(dst: &mut Vec<u32>, point: &PublicKey) {
    let uncompressed = point.serialize_uncompressed();
    push_coord_limbs(dst, &uncompressed[1..33]);
    push_coord_limbs(dst, &uncompressed[33..65]);
}

/// 32 字节大端坐标 -> 8 个 limb, 低位 limb 在前
fn push_coord_limbs(dst: &mut Vec<u32>, coord: &[u8]) {
    for i in 0..8 {
        let start = 32 - 4 * (i + 1);
        dst.push(BigEndian::read_u32(&coord[start..start + 4]));
    }
}

/// 已提交轮次的回执: 完成事件 + 占用的结果槽
pub struct PendingGpuRound {
    event: Event,
    slot: usize,
    counter: u64,
    work_size: usize,
}

/// 单设备 OpenCL 轮次引擎
pub struct ClRoundEngine {
    /// OpenCL 上下文 (必须保持存活以确保内核正常工作)
    #[allow(dead_code)]
    context: Context,
    #[allow(dead_code)]
    program: Program,
    queue_kernel: Queue,
    queue_read: Queue,
    /// 每个结果槽一个内核实例, 参数在构建时绑定
    kernels: [Kernel; 2],
    base_buffer: Buffer<u32>,
    result_slots: [Buffer<u8>; 2],
    #[allow(dead_code)]
    table_lo: Buffer<u32>,
    #[allow(dead_code)]
    table_hi: Buffer<u32>,
    worksize_local: usize,
    slot_toggle: usize,
}

impl ClRoundEngine {
    /// 创建设备引擎: 编译或加载程序, 分配双结果槽与常驻偏移表
    pub fn new(
        profile: &DeviceProfile,
        tables: &PointTables,
        worksize_max: usize,
        worksize_local: usize,
        cache_dir: &Path,
    ) -> anyhow::Result<ClRoundEngine> {
        let context = Context::builder()
            .platform(profile.platform)
            .devices(profile.device)
            .build()?;
        let program = build_search_program(&context, profile, cache_dir)?;

        // 内核与回读各走一条队列, 回读不阻塞下一轮计算
        let queue_kernel = Queue::new(&context, profile.device, None)?;
        let queue_read = Queue::new(&context, profile.device, None)?;

        let base_buffer = Buffer::<u32>::builder()
            .queue(queue_kernel.clone())
            .flags(ocl::flags::MEM_READ_ONLY)
            .len(POINT_LIMBS)
            .build()?;
        let table_lo = Buffer::<u32>::builder()
            .queue(queue_kernel.clone())
            .flags(ocl::flags::MEM_READ_ONLY)
            .len(tables.lo.len())
            .copy_host_slice(&tables.lo)
            .build()?;
        let table_hi = Buffer::<u32>::builder()
            .queue(queue_kernel.clone())
            .flags(ocl::flags::MEM_READ_ONLY)
            .len(tables.hi.len())
            .copy_host_slice(&tables.hi)
            .build()?;
        let result_slots = [
            result_slot(&queue_read, worksize_max)?,
            result_slot(&queue_read, worksize_max)?,
        ];
        let kernels = [
            round_kernel(
                &program,
                &queue_kernel,
                &base_buffer,
                &table_lo,
                &table_hi,
                &result_slots[0],
            )?,
            round_kernel(
                &program,
                &queue_kernel,
                &base_buffer,
                &table_lo,
                &table_hi,
                &result_slots[1],
            )?,
        ];

        debug!(
            "engine ready for {} (result slots 2 x {} bytes)",
            profile.name,
            worksize_max * ADDRESS_LEN
        );
        Ok(ClRoundEngine {
            context,
            program,
            queue_kernel,
            queue_read,
            kernels,
            base_buffer,
            result_slots,
            table_lo,
            table_hi,
            worksize_local,
            slot_toggle: 0,
        })
    }
}

fn result_slot(queue: &Queue, worksize_max: usize) -> ocl::Result<Buffer<u8>> {
    Buffer::<u8>::builder()
        .queue(queue.clone())
        .flags(ocl::flags::MEM_WRITE_ONLY | ocl::flags::MEM_ALLOC_HOST_PTR)
        .len(worksize_max * ADDRESS_LEN)
        .build()
}

fn round_kernel(
    program: &Program,
    queue: &Queue,
    base: &Buffer<u32>,
    table_lo: &Buffer<u32>,
    table_hi: &Buffer<u32>,
    out: &Buffer<u8>,
) -> ocl::Result<Kernel> {
    Kernel::builder()
        .program(program)
        .name("vanity_round")
        .queue(queue.clone())
        .global_work_size(SpatialDims::One(1)) // 临时值, 提交时更新
        .arg(base)
        .arg(table_lo)
        .arg(table_hi)
        .arg(out)
        .build()
}

impl RoundEngine for ClRoundEngine {
    type Pending = PendingGpuRound;

    fn submit(
        &mut self,
        seed: &BaseSeed,
        counter: u64,
        work_size: usize,
    ) -> Result<PendingGpuRound, DeviceComputeError> {
        // 本轮唯一一次主机标量乘: 基点 = (seed + counter)·G
        let scalar = seed.add_offset(counter);
        let secret = SecretKey::from_slice(scalar.as_bytes())
            .map_err(|e| DeviceComputeError::new(format!("derived base scalar rejected: {e}")))?;
        let public = PublicKey::from_secret_key(&SECP256K1, &secret);
        let mut limbs = Vec::with_capacity(POINT_LIMBS);
        push_point_limbs(&mut limbs, &public);

        let slot = self.slot_toggle;
        self.slot_toggle ^= 1;

        // 写基点与启动内核同队列, 顺序排在上一轮内核之后
        self.base_buffer.write(&limbs).enq()?;
        let mut event = Event::empty();
        let work = work_size.max(1);
        unsafe {
            self.kernels[slot]
                .cmd()
                .global_work_size(SpatialDims::One(work))
                .local_work_size(SpatialDims::One(self.worksize_local))
                .enew(&mut event)
                .enq()?;
        }
        self.queue_kernel.flush()?;

        Ok(PendingGpuRound {
            event,
            slot,
            counter,
            work_size: work,
        })
    }

    fn collect(&mut self, pending: PendingGpuRound) -> Result<RoundYield, DeviceComputeError> {
        let mut addresses = vec![0u8; pending.work_size * ADDRESS_LEN];
        self.result_slots[pending.slot]
            .read(&mut addresses)
            .queue(&self.queue_read)
            .ewait(&pending.event)
            .enq()?;
        Ok(RoundYield {
            first_offset: pending.counter,
            addresses,
        })
    }
}
