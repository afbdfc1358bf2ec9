//! OpenCL GPU 计算模块

pub mod context;
pub mod program;
pub mod round;

pub use context::{DeviceProfile, enumerate_gpu_devices};
pub use program::{assemble_kernel_source, build_search_program, device_cache_key};
pub use round::{ClRoundEngine, PointTables};
