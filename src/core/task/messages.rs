use actix::Message;
use serde::Serialize;

use super::download::WorkerOutcome;
use super::state::{JobState, SegmentStatus};

/// 工作者结束（完成、取消或失败）
pub struct WorkerExited {
    pub segment_id: u32,
    pub outcome: WorkerOutcome,
}
impl Message for WorkerExited { type Result = (); }

/// 取消任务：只设置取消标志，工作者在下一块数据后自行停止
pub struct CancelJob;
impl Message for CancelJob { type Result = (); }

/// 查询任务快照
pub struct QuerySnapshot;
impl Message for QuerySnapshot { type Result = JobSnapshot; }

#[derive(Debug, Clone, Serialize)]
pub struct SegmentSnapshot {
    pub id: u32,
    pub start: u64,
    pub end: u64,
    pub downloaded: u64,
    pub status: SegmentStatus,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub url: String,
    pub state: JobState,
    pub downloaded: u64,
    pub total_size: u64,
    pub segments: Vec<SegmentSnapshot>,
}

impl JobSnapshot {
    pub fn progress(&self) -> f32 {
        if self.total_size == 0 {
            return 0.0;
        }
        (self.downloaded as f64 / self.total_size as f64 * 100.0) as f32
    }

    pub fn running_workers(&self) -> usize {
        self.segments.iter().filter(|s| s.status == SegmentStatus::Running).count()
    }
}
