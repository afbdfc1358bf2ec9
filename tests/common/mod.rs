//! 测试公共模块
//!
//! 提供集成测试共用的确定性种子源、假轮次引擎与收集上报器。

// 各测试二进制只用到其中一部分
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use gpu_vanity::address::{derive_address, reconstruct_private_key};
use gpu_vanity::mode::ADDRESS_LEN;
use gpu_vanity::{
    BaseSeed, DeviceComputeError, Match, MatchReporter, RoundEngine, RoundYield, SeedSource,
};

/// 低 8 字节承载数值的种子
pub fn seed_of(value: u64) -> BaseSeed {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&value.to_be_bytes());
    BaseSeed::from_bytes(bytes)
}

/// 确定性递增种子源
///
/// 步长取大可以让各轮的私钥区间完全不重叠, 便于断言全局唯一性。
pub struct CountingSeedSource {
    next: u64,
    stride: u64,
}

impl CountingSeedSource {
    pub fn starting_at(value: u64) -> CountingSeedSource {
        CountingSeedSource {
            next: value.max(1),
            stride: 1,
        }
    }

    pub fn spaced(value: u64, stride: u64) -> CountingSeedSource {
        CountingSeedSource {
            next: value.max(1),
            stride: stride.max(1),
        }
    }
}

impl SeedSource for CountingSeedSource {
    fn next_seed(&mut self) -> BaseSeed {
        let seed = seed_of(self.next);
        self.next += self.stride;
        seed
    }
}

/// 引擎观测日志: 记录每次提交的 (种子, 计数器, 工作规模)
#[derive(Clone, Default)]
pub struct EngineLog {
    inner: Arc<Mutex<Vec<(BaseSeed, u64, usize)>>>,
}

impl EngineLog {
    pub fn new() -> EngineLog {
        EngineLog::default()
    }

    pub fn record(&self, seed: &BaseSeed, counter: u64, work_size: usize) {
        self.inner
            .lock()
            .unwrap()
            .push((*seed, counter, work_size));
    }

    pub fn submissions(&self) -> Vec<(BaseSeed, u64, usize)> {
        self.inner.lock().unwrap().clone()
    }
}

/// 提交计数达到阈值时置位停止标志
pub struct StopAfter {
    pub submits: u64,
    pub flag: Arc<AtomicBool>,
}

/// 脚本化引擎: 输出全零地址, 可在指定次序注入失败
///
/// 次序从 1 开始计, `fail_submit_at: Some(1)` 表示第一次提交
/// 就失败。
pub struct ScriptedEngine {
    pub log: EngineLog,
    pub fail_submit_at: Option<u64>,
    pub fail_collect_at: Option<u64>,
    pub stop_after: Option<StopAfter>,
    submits: u64,
    collects: u64,
}

impl ScriptedEngine {
    pub fn new(log: EngineLog) -> ScriptedEngine {
        ScriptedEngine {
            log,
            fail_submit_at: None,
            fail_collect_at: None,
            stop_after: None,
            submits: 0,
            collects: 0,
        }
    }
}

impl RoundEngine for ScriptedEngine {
    type Pending = (u64, usize);

    fn submit(
        &mut self,
        seed: &BaseSeed,
        counter: u64,
        work_size: usize,
    ) -> Result<Self::Pending, DeviceComputeError> {
        self.submits += 1;
        if self.fail_submit_at.is_some_and(|n| self.submits >= n) {
            return Err(DeviceComputeError::new("scripted submit failure"));
        }
        self.log.record(seed, counter, work_size);
        if let Some(stop) = &self.stop_after {
            if self.submits >= stop.submits {
                stop.flag.store(true, Ordering::SeqCst);
            }
        }
        Ok((counter, work_size))
    }

    fn collect(&mut self, pending: Self::Pending) -> Result<RoundYield, DeviceComputeError> {
        self.collects += 1;
        if self.fail_collect_at.is_some_and(|n| self.collects >= n) {
            return Err(DeviceComputeError::new("scripted collect failure"));
        }
        let (counter, work_size) = pending;
        Ok(RoundYield {
            first_offset: counter,
            addresses: vec![0u8; work_size * ADDRESS_LEN],
        })
    }
}

/// 主机真实派生引擎: 行为与 GPU 路径同构
///
/// 第 i 个工作项的地址由私钥 (种子 + 计数器 + i) 真实派生,
/// 因此命中验证走的是和生产路径相同的重建公式。
pub struct CryptoEngine {
    pub log: EngineLog,
    pub stop_after: Option<StopAfter>,
    submits: u64,
}

impl CryptoEngine {
    pub fn new(log: EngineLog) -> CryptoEngine {
        CryptoEngine {
            log,
            stop_after: None,
            submits: 0,
        }
    }
}

impl RoundEngine for CryptoEngine {
    type Pending = (BaseSeed, u64, usize);

    fn submit(
        &mut self,
        seed: &BaseSeed,
        counter: u64,
        work_size: usize,
    ) -> Result<Self::Pending, DeviceComputeError> {
        self.submits += 1;
        self.log.record(seed, counter, work_size);
        if let Some(stop) = &self.stop_after {
            if self.submits >= stop.submits {
                stop.flag.store(true, Ordering::SeqCst);
            }
        }
        Ok((*seed, counter, work_size))
    }

    fn collect(&mut self, pending: Self::Pending) -> Result<RoundYield, DeviceComputeError> {
        let (seed, counter, work_size) = pending;
        let mut addresses = Vec::with_capacity(work_size * ADDRESS_LEN);
        for i in 0..work_size as u64 {
            let key = reconstruct_private_key(&seed, counter + i);
            let address = derive_address(&key)
                .map_err(|e| DeviceComputeError::new(format!("host derivation failed: {}", e)))?;
            addresses.extend_from_slice(&address);
        }
        Ok(RoundYield {
            first_offset: counter,
            addresses,
        })
    }
}

/// 收集命中的上报器, 测试结束后取回全部记录
#[derive(Clone, Default)]
pub struct CollectingReporter {
    records: Arc<Mutex<Vec<Match>>>,
}

impl CollectingReporter {
    pub fn new() -> CollectingReporter {
        CollectingReporter::default()
    }

    pub fn matches(&self) -> Vec<Match> {
        self.records.lock().unwrap().clone()
    }
}

impl MatchReporter for CollectingReporter {
    fn report(&mut self, found: &Match) -> std::io::Result<()> {
        self.records.lock().unwrap().push(found.clone());
        Ok(())
    }
}
