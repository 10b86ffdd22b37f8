//! `task` 模块包含了与单个下载任务相关的所有逻辑
//!
//! 主要包括：
//! - `probe`: 探测资源大小和文件名
//! - `segment`: 分段规划和进度恢复
//! - `download`: 单个分段的下载工作者
//! - `actor`: 协调器 `DownloadCoordinator`
//! - `messages` / `handlers`: 协调器的消息和处理器
//! - `state`: 任务和分段状态
//! - `retry`: 重试策略
//! - `util`: 输出文件的预分配和分段写入

pub mod actor;
pub mod state;
pub mod messages;
pub mod handlers;
pub mod download;
pub mod probe;
pub mod segment;
pub mod retry;
pub mod util;

pub use actor::{DownloadCoordinator, DownloadJob, JobReport, ProgressListener, WorkerSettings};
pub use messages::{CancelJob, JobSnapshot, QuerySnapshot, SegmentSnapshot};
pub use probe::{probe, sanitize_file_name, ResourceInfo};
pub use segment::{plan, restore_progress, Segment, SegmentProgressMap};
pub use state::{JobState, SegmentStatus};
pub use self::retry::RetryPolicy;
