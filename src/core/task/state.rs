use serde::{Serialize, Deserialize};

/// 下载任务状态
///
/// `Init → Probing → Planning → Resuming → Running → {Completed | Cancelled}`，
/// 预检失败或运行中出现不可恢复的错误时进入 `Failed`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Init,
    Probing,
    Planning,
    Resuming,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Cancelled | JobState::Failed)
    }
}

/// 分段状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentStatus {
    Pending,
    Running,
    Done,
    Failed,
}
