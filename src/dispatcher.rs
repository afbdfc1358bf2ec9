//! 多设备轮次调度
//!
//! 调度循环每次迭代分两段: 先给所有活跃设备提交新一轮 (不阻塞),
//! 再统一回收各设备上一轮的结果交给过滤器。设备端始终有一轮在算,
//! 主机端的过滤与上报和下一轮计算重叠, 多慢设备也不会互相拖累提交。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, error, info};

use crate::error::{DeviceComputeError, SearchError};
use crate::filter::{MatchFilter, RoundYield};
use crate::mode::Mode;
use crate::report::SearchSink;
use crate::seed::{BaseSeed, SeedPool, SeedSource};

/// 首轮工作规模 = 本地工作组大小 * 该系数, 此后自适应调整
const INITIAL_GROUP_FACTOR: usize = 256;

/// 设备轮次引擎: 非阻塞提交 + 阻塞回收
///
/// 一轮以 `seed + counter` 为基础标量, 生成 `work_size` 个连续
/// 候选。提交后返回回执, 回收时凭回执取回整批地址。
pub trait RoundEngine: Send {
    /// 回执类型, 随实现不同 (GPU 事件、测试桩等)
    type Pending;

    /// 提交一轮, 立即返回
    fn submit(
        &mut self,
        seed: &BaseSeed,
        counter: u64,
        work_size: usize,
    ) -> Result<Self::Pending, DeviceComputeError>;

    /// 回收一轮, 阻塞到设备完成
    fn collect(&mut self, pending: Self::Pending) -> Result<RoundYield, DeviceComputeError>;
}

/// 调度配置
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// 单轮目标时长, 自适应规模把实测轮次时间拉回这个窗口
    pub target_round_time: Duration,
    /// 本地工作组大小, 工作规模按它对齐
    pub worksize_local: usize,
    /// 全局工作规模上限
    pub worksize_max: usize,
    /// 吞吐日志间隔
    pub report_interval: Duration,
    /// 运行时限, None 表示一直跑到外部停止
    pub timeout: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            target_round_time: Duration::from_secs(1),
            worksize_local: 64,
            worksize_max: 1 << 20,
            report_interval: Duration::from_secs(2),
            timeout: None,
        }
    }
}

/// 已提交、尚未回收的一轮
struct InFlight<P> {
    pending: P,
    seed: BaseSeed,
    round: u64,
    submitted_at: Instant,
}

/// 单设备上下文
struct DeviceContext<E: RoundEngine> {
    uid: String,
    label: String,
    engine: E,
    seeds: SeedPool,
    in_flight: Option<InFlight<E::Pending>>,
    /// 严格递增的轮次计数, 提交时 +1
    round: u64,
    /// 已调度的候选总数, 作为下一轮的计数器偏移
    keys_scheduled: u64,
    work_size: usize,
    last_round_time: Option<Duration>,
    retired: bool,
}

/// 设备状态快照 (诊断与测试用)
#[derive(Debug, Clone)]
pub struct DeviceSnapshot {
    pub uid: String,
    pub label: String,
    pub round: u64,
    pub work_size: usize,
    pub keys_scheduled: u64,
    pub seeds_used: usize,
    pub last_round_time: Option<Duration>,
    pub retired: bool,
}

/// 一次运行的汇总
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub rounds: u64,
    pub candidates: u64,
    pub matches: u64,
    pub elapsed: Duration,
    pub devices_retired: usize,
}

/// 多设备调度器, 独占全部设备上下文
pub struct Dispatcher<E: RoundEngine> {
    filter: MatchFilter,
    devices: Vec<DeviceContext<E>>,
    seed_source: Box<dyn SeedSource>,
    sink: Arc<Mutex<SearchSink>>,
    config: DispatchConfig,
}

impl<E: RoundEngine> Dispatcher<E> {
    pub fn new(
        mode: Mode,
        config: DispatchConfig,
        seed_source: Box<dyn SeedSource>,
        sink: Arc<Mutex<SearchSink>>,
    ) -> Dispatcher<E> {
        Dispatcher {
            filter: MatchFilter::new(mode),
            devices: Vec::new(),
            seed_source,
            sink,
            config,
        }
    }

    /// 注册一台设备
    ///
    /// `uid` 是稳定设备标识, `label` 用于日志与统计显示。
    pub fn register(&mut self, uid: impl Into<String>, label: impl Into<String>, engine: E) {
        let uid = uid.into();
        let label = label.into();
        let work_size = initial_work_size(&self.config);
        self.sink().metrics.register_device(label.clone());
        info!(
            "registered device {} ({}), initial work size {}",
            label, uid, work_size
        );
        self.devices.push(DeviceContext {
            uid,
            label,
            engine,
            seeds: SeedPool::new(),
            in_flight: None,
            round: 0,
            keys_scheduled: 0,
            work_size,
            last_round_time: None,
            retired: false,
        });
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn active_count(&self) -> usize {
        self.devices.iter().filter(|d| !d.retired).count()
    }

    pub fn snapshot(&self) -> Vec<DeviceSnapshot> {
        self.devices
            .iter()
            .map(|d| DeviceSnapshot {
                uid: d.uid.clone(),
                label: d.label.clone(),
                round: d.round,
                work_size: d.work_size,
                keys_scheduled: d.keys_scheduled,
                seeds_used: d.seeds.len(),
                last_round_time: d.last_round_time,
                retired: d.retired,
            })
            .collect()
    }

    /// 运行调度循环, 直到停止标志置位、超时或所有设备失效
    ///
    /// 返回前排干所有在途轮次, 命中不会因停止而丢失。
    pub fn run(&mut self, stop: &AtomicBool) -> Result<RunSummary, SearchError> {
        if self.devices.is_empty() {
            return Err(SearchError::AllDevicesFailed);
        }
        let started = Instant::now();
        let mut last_report = started;
        let mut totals = RunSummary::default();

        info!(
            "starting search: mode {}, {} device(s)",
            self.filter.mode(),
            self.devices.len()
        );
        for index in 0..self.devices.len() {
            self.submit_next(index);
        }

        loop {
            if self.active_count() == 0 {
                return Err(SearchError::AllDevicesFailed);
            }
            let timed_out = self
                .config
                .timeout
                .is_some_and(|limit| started.elapsed() >= limit);
            if stop.load(Ordering::SeqCst) || timed_out {
                break;
            }

            // 提交在前, 回收在后: 等待慢设备时其余设备已经在算下一轮
            let mut ready = Vec::with_capacity(self.devices.len());
            for index in 0..self.devices.len() {
                if self.devices[index].retired {
                    continue;
                }
                if let Some(previous) = self.devices[index].in_flight.take() {
                    ready.push((index, previous));
                }
                self.submit_next(index);
            }
            for (index, in_flight) in ready {
                self.harvest(index, in_flight, &mut totals);
            }

            if last_report.elapsed() >= self.config.report_interval {
                info!("{}", self.sink().metrics.throughput_line());
                last_report = Instant::now();
            }
        }

        self.drain(&mut totals);
        totals.elapsed = started.elapsed();
        totals.devices_retired = self.devices.iter().filter(|d| d.retired).count();
        Ok(totals)
    }

    /// 给设备排一轮新工作
    fn submit_next(&mut self, index: usize) {
        let seed = self.devices[index].seeds.draw(&mut *self.seed_source);
        let device = &mut self.devices[index];
        let work_size = device.work_size;
        let counter = device.keys_scheduled;
        match device.engine.submit(&seed, counter, work_size) {
            Ok(pending) => {
                device.round += 1;
                device.keys_scheduled += work_size as u64;
                device.in_flight = Some(InFlight {
                    pending,
                    seed,
                    round: device.round,
                    submitted_at: Instant::now(),
                });
                debug!(
                    "device {} submitted round {} ({} candidates at counter {})",
                    device.label, device.round, work_size, counter
                );
            }
            Err(e) => self.retire(index, e),
        }
    }

    /// 回收一轮并过滤上报
    fn harvest(&mut self, index: usize, in_flight: InFlight<E::Pending>, totals: &mut RunSummary) {
        let InFlight {
            pending,
            seed,
            round,
            submitted_at,
        } = in_flight;
        match self.devices[index].engine.collect(pending) {
            Ok(round_yield) => {
                let round_time = submitted_at.elapsed();
                let candidates = round_yield.len() as u64;
                {
                    let device = &mut self.devices[index];
                    device.last_round_time = Some(round_time);
                    device.work_size = next_work_size(device.work_size, round_time, &self.config);
                }
                let matches = self.filter.sift(&seed, &round_yield, index, round);
                totals.rounds += 1;
                totals.candidates += candidates;
                totals.matches += matches.len() as u64;
                debug!(
                    "device {} round {} collected {} candidates in {:?}",
                    self.devices[index].label, round, candidates, round_time
                );
                let mut sink = self.sink();
                sink.metrics
                    .record_round(index, candidates, matches.len() as u64, round_time);
                for found in &matches {
                    if let Err(e) = sink.reporter.report(found) {
                        error!("device {} round {}: {}", index, round, SearchError::Reporting(e));
                    }
                }
            }
            Err(e) => self.retire(index, e),
        }
    }

    /// 退役设备: 不再调度, 不影响其余设备
    fn retire(&mut self, index: usize, err: DeviceComputeError) {
        {
            let device = &mut self.devices[index];
            if device.retired {
                return;
            }
            device.retired = true;
            device.in_flight = None;
            error!(
                "device {} retired after compute failure: {}",
                device.label, err
            );
        }
        self.sink().metrics.mark_retired(index);
    }

    /// 停止前回收所有在途轮次
    fn drain(&mut self, totals: &mut RunSummary) {
        info!("draining in-flight rounds...");
        for index in 0..self.devices.len() {
            if let Some(in_flight) = self.devices[index].in_flight.take() {
                self.harvest(index, in_flight, totals);
            }
        }
    }

    fn sink(&self) -> MutexGuard<'_, SearchSink> {
        self.sink.lock().expect("search sink lock poisoned")
    }
}

/// 把规模对齐到本地工作组的整数倍并夹在 [local, max] 内
fn align_work_size(size: usize, local: usize, max: usize) -> usize {
    let local = local.max(1);
    let max = max.max(local);
    let clamped = size.clamp(local, max);
    clamped / local * local
}

fn initial_work_size(config: &DispatchConfig) -> usize {
    align_work_size(
        config.worksize_local.saturating_mul(INITIAL_GROUP_FACTOR),
        config.worksize_local,
        config.worksize_max,
    )
}

/// 根据实测轮次时长调整下一轮规模: 过快加倍, 过慢减半
fn next_work_size(current: usize, round_time: Duration, config: &DispatchConfig) -> usize {
    let target = config.target_round_time.as_secs_f64();
    let actual = round_time.as_secs_f64();
    let scaled = if actual < target * 0.5 {
        current.saturating_mul(2)
    } else if actual > target * 2.0 {
        current / 2
    } else {
        current
    };
    align_work_size(scaled, config.worksize_local, config.worksize_max)
}
