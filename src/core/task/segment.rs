use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::core::error::{DownloadError, DownloadResult};
use super::state::SegmentStatus;

/// 分段ID -> 已下载长度
pub type SegmentProgressMap = BTreeMap<u32, u64>;

/// 一个工作者负责的连续字节区间 `[start, end]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: u32,
    pub start: u64,
    pub end: u64,
    pub downloaded: u64,
    pub status: SegmentStatus,
}

impl Segment {
    pub fn width(&self) -> u64 {
        self.end - self.start + 1
    }

    /// 下一次请求的起始位置
    pub fn resume_offset(&self) -> u64 {
        self.start + self.downloaded
    }

    pub fn is_complete(&self) -> bool {
        self.downloaded == self.width()
    }
}

/// `ceil(total_size / worker_count)`
pub fn block_size(total_size: u64, worker_count: usize) -> u64 {
    total_size.div_ceil(worker_count as u64)
}

/// 每段至少一个字节时实际能切出的段数，不超过 `worker_count`
pub fn effective_workers(total_size: u64, worker_count: usize) -> usize {
    let wanted = (worker_count as u64).min(total_size);
    let block = total_size.div_ceil(wanted);
    total_size.div_ceil(block) as usize
}

/// 把 `[0, total_size)` 切分成互不重叠的连续分段
///
/// 第 i 段（从1开始）覆盖 `[block*(i-1), block*i - 1]`，最后一段截断到 `total_size - 1`。
/// 文件太小时段数会少于 `worker_count`，保证没有空分段。
pub fn plan(total_size: u64, worker_count: usize) -> DownloadResult<Vec<Segment>> {
    if worker_count == 0 {
        return Err(DownloadError::InvalidPlan("线程数必须大于0".to_string()));
    }
    if total_size == 0 {
        return Err(DownloadError::InvalidPlan("文件大小必须大于0".to_string()));
    }
    if worker_count > u32::MAX as usize {
        return Err(DownloadError::InvalidPlan(format!("线程数过大: {}", worker_count)));
    }

    let count = effective_workers(total_size, worker_count) as u64;
    let block = block_size(total_size, count as usize);

    (1..=count)
        .map(|i| -> DownloadResult<Segment> {
            let start = block.checked_mul(i - 1).filter(|&s| s < total_size).ok_or_else(|| {
                DownloadError::InvalidPlan(format!("分段 {} 的起点超出文件大小 {}", i, total_size))
            })?;
            let end = start.saturating_add(block - 1).min(total_size - 1);
            Ok(Segment {
                id: i as u32,
                start,
                end,
                downloaded: 0,
                status: SegmentStatus::Pending,
            })
        })
        .collect()
}

/// 尝试采用上次运行保存的分段进度
///
/// 记录条数必须与分段数一致、ID 必须恰好是 1..=N、长度不能超过分段宽度，
/// 否则全部丢弃并从0开始。返回是否采用了记录。
pub fn restore_progress(segments: &mut [Segment], records: &SegmentProgressMap) -> bool {
    let valid = records.len() == segments.len()
        && segments.iter().all(|s| {
            records.get(&s.id).map_or(false, |&len| len <= s.width())
        });

    for segment in segments.iter_mut() {
        segment.downloaded = if valid { records[&segment.id] } else { 0 };
        segment.status = if segment.is_complete() {
            SegmentStatus::Done
        } else {
            SegmentStatus::Pending
        };
    }
    valid
}

/// 当前所有分段的进度快照，用于批量写入存储
pub fn progress_map(segments: &[Segment]) -> SegmentProgressMap {
    segments.iter().map(|s| (s.id, s.downloaded)).collect()
}
