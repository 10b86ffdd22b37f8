use thiserror::Error;
use std::io;

/// 下载引擎的错误类型
///
/// 预检阶段（探测、规划、恢复）的错误直接返回给调用方；
/// 分段传输中的错误由协调器内部重试，不会单独上报。
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("无法连接: {0}")]
    Unreachable(String),

    #[error("服务器拒绝请求: {code} {message}")]
    ServerRejected {
        code: u16,
        message: String,
    },

    #[error("无法获取文件大小")]
    UnknownSize,

    #[error("无效的分段计划: {0}")]
    InvalidPlan(String),

    #[error("分段传输错误: {0}")]
    SegmentTransfer(String),

    #[error("进度存储错误: {0}")]
    Persistence(String),

    #[error("IO错误: {0}")]
    Io(#[from] io::Error),

    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    #[error("配置无效: {0}")]
    InvalidConfig(String),

    #[error("文件大小不匹配: 预期 {expected} 字节, 实际 {actual} 字节")]
    SizeMismatch {
        expected: u64,
        actual: u64,
    },

    #[error("分段 {segment} 重试次数超过限制: {attempts}")]
    RetriesExhausted {
        segment: u32,
        attempts: u32,
    },

    #[error("下载被取消")]
    Cancelled,
}

impl DownloadError {
    /// 分段可以从上次持久化的位置重新下载
    pub fn is_retryable(&self) -> bool {
        matches!(self, DownloadError::SegmentTransfer(_))
    }

    /// 整个任务无法继续
    pub fn is_fatal(&self) -> bool {
        !self.is_retryable() && !matches!(self, DownloadError::Cancelled)
    }

    pub fn transfer(msg: impl Into<String>) -> Self {
        DownloadError::SegmentTransfer(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        DownloadError::Persistence(msg.into())
    }
}

pub type DownloadResult<T> = Result<T, DownloadError>;
