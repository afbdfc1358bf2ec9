//! 吞吐统计

use std::fmt::Write as _;
use std::time::{Duration, Instant};

/// 指数滑动平均系数, 抑制单轮抖动
const SPEED_SMOOTHING: f64 = 0.25;

/// 单设备统计
#[derive(Debug, Clone)]
pub struct DeviceMetrics {
    /// 显示标签, 如 "GPU0"
    pub label: String,
    pub rounds: u64,
    pub candidates: u64,
    pub matches: u64,
    /// 平滑后的速度 (候选/秒)
    pub speed: f64,
    pub retired: bool,
}

/// 全体设备的吞吐追踪器
#[derive(Debug)]
pub struct MetricsTracker {
    devices: Vec<DeviceMetrics>,
    started: Instant,
    total_candidates: u64,
    total_matches: u64,
}

impl MetricsTracker {
    pub fn new() -> MetricsTracker {
        MetricsTracker {
            devices: Vec::new(),
            started: Instant::now(),
            total_candidates: 0,
            total_matches: 0,
        }
    }

    /// 注册一台设备, 返回其统计序号
    pub fn register_device(&mut self, label: impl Into<String>) -> usize {
        self.devices.push(DeviceMetrics {
            label: label.into(),
            rounds: 0,
            candidates: 0,
            matches: 0,
            speed: 0.0,
            retired: false,
        });
        self.devices.len() - 1
    }

    /// 记录一轮完成
    pub fn record_round(
        &mut self,
        device_index: usize,
        candidates: u64,
        matches: u64,
        duration: Duration,
    ) {
        self.total_candidates += candidates;
        self.total_matches += matches;
        let Some(device) = self.devices.get_mut(device_index) else {
            return;
        };
        device.rounds += 1;
        device.candidates += candidates;
        device.matches += matches;
        let secs = duration.as_secs_f64();
        if secs > 0.0 {
            let instant_speed = candidates as f64 / secs;
            device.speed = if device.rounds == 1 {
                instant_speed
            } else {
                SPEED_SMOOTHING * instant_speed + (1.0 - SPEED_SMOOTHING) * device.speed
            };
        }
    }

    pub fn mark_retired(&mut self, device_index: usize) {
        if let Some(device) = self.devices.get_mut(device_index) {
            device.retired = true;
        }
    }

    pub fn device(&self, device_index: usize) -> Option<&DeviceMetrics> {
        self.devices.get(device_index)
    }

    pub fn devices(&self) -> &[DeviceMetrics] {
        &self.devices
    }

    /// 活跃设备速度之和 (候选/秒)
    pub fn total_speed(&self) -> f64 {
        self.devices
            .iter()
            .filter(|d| !d.retired)
            .map(|d| d.speed)
            .sum()
    }

    pub fn total_candidates(&self) -> u64 {
        self.total_candidates
    }

    pub fn total_matches(&self) -> u64 {
        self.total_matches
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// 聚合 + 各设备吞吐的单行摘要
    pub fn throughput_line(&self) -> String {
        let mut line = format!("总速度 {:.2} MH/s", self.total_speed() / 1e6);
        for device in &self.devices {
            if device.retired {
                let _ = write!(line, " | {} 已退役", device.label);
            } else {
                let _ = write!(line, " | {} {:.2} MH/s", device.label, device.speed / 1e6);
            }
        }
        line
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        MetricsTracker::new()
    }
}
