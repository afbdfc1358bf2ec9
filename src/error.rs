//! 错误类型定义

use thiserror::Error;

/// 单设备计算错误 (提交或回收失败)
///
/// 携带失败原因文本。调度器收到该错误后把设备退役，
/// 搜索在剩余设备上继续。
#[derive(Debug, Clone, Error)]
#[error("device compute failure: {reason}")]
pub struct DeviceComputeError {
    pub reason: String,
}

impl DeviceComputeError {
    pub fn new(reason: impl Into<String>) -> Self {
        DeviceComputeError {
            reason: reason.into(),
        }
    }
}

impl From<ocl::Error> for DeviceComputeError {
    fn from(err: ocl::Error) -> Self {
        DeviceComputeError::new(err.to_string())
    }
}

/// 搜索系统错误分类
#[derive(Debug, Error)]
pub enum SearchError {
    /// 配置无效, 在调度开始前被拒绝
    #[error("invalid configuration: {0}")]
    Config(String),

    /// 单设备计算失败 (设备退役, 搜索继续)
    #[error(transparent)]
    Device(#[from] DeviceComputeError),

    /// 所有设备均已失效, 无法继续调度
    #[error("all devices have failed, nothing left to schedule")]
    AllDevicesFailed,

    /// 命中记录写出失败 (记录日志, 不终止搜索)
    #[error("failed to write match record: {0}")]
    Reporting(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;
