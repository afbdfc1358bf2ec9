//! GPU以太坊靓号地址搜索系统 - Rust + OpenCL 实现
//!
//! 本库提供一个基于 GPU 加速的以太坊靓号地址搜索引擎。
//! 多设备调度器把搜索空间按 (种子, 轮次) 唯一划分, 每台 GPU
//! 以双缓冲流水线持续满载, 命中先经主机重建验证再上报。

pub mod address;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod mode;
pub mod opencl;
pub mod report;
pub mod seed;

pub use dispatcher::{DeviceSnapshot, DispatchConfig, Dispatcher, RoundEngine, RunSummary};
pub use error::{DeviceComputeError, SearchError};
pub use filter::{Candidate, Match, MatchFilter, RoundYield};
pub use metrics::MetricsTracker;
pub use mode::Mode;
pub use opencl::program::{assemble_kernel_source, load_kernel_stages};
pub use opencl::{ClRoundEngine, DeviceProfile, PointTables, enumerate_gpu_devices};
pub use report::{ConsoleReporter, MatchReporter, SearchSink};
pub use seed::{BaseSeed, OsSeedSource, SeedPool, SeedSource};
