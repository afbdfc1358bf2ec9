//! 命中上报

use std::io::Write;

use crate::filter::Match;
use crate::metrics::MetricsTracker;

/// 命中上报接口
///
/// 写出失败由调度器记录日志, 不终止搜索。
pub trait MatchReporter: Send {
    fn report(&mut self, found: &Match) -> std::io::Result<()>;
}

/// 标准输出上报器
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl MatchReporter for ConsoleReporter {
    fn report(&mut self, found: &Match) -> std::io::Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        writeln!(
            out,
            "✓ 找到匹配!  设备 {}  轮次 {}",
            found.device_index, found.round
        )?;
        writeln!(out, "  私钥: 0x{}", hex::encode(found.private_key))?;
        writeln!(out, "  地址: 0x{}", hex::encode(found.address))?;
        out.flush()
    }
}

/// 上报器与吞吐统计的共享汇聚点
///
/// 调度循环每轮回收后短暂持有这把锁: 记一轮统计, 写出命中。
pub struct SearchSink {
    pub reporter: Box<dyn MatchReporter>,
    pub metrics: MetricsTracker,
}

impl SearchSink {
    pub fn new(reporter: Box<dyn MatchReporter>) -> SearchSink {
        SearchSink {
            reporter,
            metrics: MetricsTracker::new(),
        }
    }
}
