use actix::prelude::*;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::config::Config;
use crate::core::error::{DownloadError, DownloadResult};
use crate::core::http::HttpSource;
use crate::core::store::ProgressStore;
use super::download::{SegmentWorker, WorkerOutcome};
use super::messages::{JobSnapshot, SegmentSnapshot, WorkerExited};
use super::retry::RetryPolicy;
use super::segment::Segment;
use super::state::{JobState, SegmentStatus};

/// 进度回调，每次轮询时收到累计已下载字节数
pub trait ProgressListener {
    fn on_progress(&self, downloaded: u64);
}

impl<F: Fn(u64)> ProgressListener for F {
    fn on_progress(&self, downloaded: u64) {
        self(downloaded)
    }
}

/// 任务结束时返回给调用方的结果
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub url: String,
    pub path: PathBuf,
    pub state: JobState,
    pub downloaded: u64,
    pub total_size: u64,
}

/// 一个下载任务：资源、输出文件和分段表
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub url: String,
    pub path: PathBuf,
    pub total_size: u64,
    pub segments: Vec<Segment>,
}

/// 协调器与工作者的运行参数
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub chunk_size: usize,
    pub read_timeout: Option<Duration>,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunk_size,
            read_timeout: (config.read_timeout_secs > 0).then(|| Duration::from_secs(config.read_timeout_secs)),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            retry: RetryPolicy::from_config(config),
        }
    }
}

struct SegmentSlot {
    downloaded: Arc<AtomicU64>,
    running: bool,
    attempts: u32,
    retries: u32,
    retry_at: Option<Instant>,
}

/// 下载协调器 Actor
///
/// 为每个未完成的分段启动一个工作者，定期轮询汇总进度、重启失败的分段，
/// 全部完成后删除持久化的进度记录。
pub struct DownloadCoordinator {
    pub job: DownloadJob,
    pub state: JobState,
    slots: Vec<SegmentSlot>,
    source: Rc<dyn HttpSource>,
    store: Arc<dyn ProgressStore>,
    settings: WorkerSettings,
    aggregate: Arc<AtomicU64>,
    cancelled: Arc<AtomicBool>,
    listener: Option<Box<dyn ProgressListener>>,
    last_reported: u64,
    fatal: Option<DownloadError>,
    outcome: Option<oneshot::Sender<DownloadResult<JobReport>>>,
}

impl Actor for DownloadCoordinator {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.state = JobState::Running;
        log::info!(
            "开始下载 {} -> {} ({} 字节, {} 段, 已完成 {} 字节)",
            self.job.url, self.job.path.display(), self.job.total_size,
            self.job.segments.len(), self.aggregate.load(Ordering::SeqCst)
        );
        self.spawn_incomplete(ctx);
        ctx.run_interval(self.settings.poll_interval, |act, ctx| act.tick(ctx));
        self.check_finished(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(tx) = self.outcome.take() {
            let _ = tx.send(Err(DownloadError::Cancelled));
        }
    }
}

impl DownloadCoordinator {
    pub fn new(
        job: DownloadJob,
        source: Rc<dyn HttpSource>,
        store: Arc<dyn ProgressStore>,
        settings: WorkerSettings,
        cancelled: Arc<AtomicBool>,
        listener: Option<Box<dyn ProgressListener>>,
        outcome: oneshot::Sender<DownloadResult<JobReport>>,
    ) -> Self {
        let slots = job.segments
            .iter()
            .map(|s| SegmentSlot {
                downloaded: Arc::new(AtomicU64::new(s.downloaded)),
                running: false,
                attempts: 0,
                retries: 0,
                retry_at: None,
            })
            .collect();
        let already: u64 = job.segments.iter().map(|s| s.downloaded).sum();
        Self {
            job,
            state: JobState::Init,
            slots,
            source,
            store,
            settings,
            aggregate: Arc::new(AtomicU64::new(already)),
            cancelled,
            listener,
            last_reported: already,
            fatal: None,
            outcome: Some(outcome),
        }
    }

    fn index_of(&self, segment_id: u32) -> Option<usize> {
        let idx = (segment_id as usize).checked_sub(1)?;
        (idx < self.job.segments.len()).then_some(idx)
    }

    /// 只为未完成的分段启动工作者
    fn spawn_incomplete(&mut self, ctx: &mut Context<Self>) {
        for idx in 0..self.job.segments.len() {
            let complete = self.job.segments[idx].is_complete();
            if !complete && self.aggregate.load(Ordering::SeqCst) < self.job.total_size {
                self.spawn_worker(idx, ctx);
            } else if complete {
                log::debug!("分段 {} 已完成，跳过", self.job.segments[idx].id);
            }
        }
    }

    fn spawn_worker(&mut self, idx: usize, ctx: &mut Context<Self>) {
        let slot = &mut self.slots[idx];
        slot.running = true;
        slot.attempts += 1;
        slot.retry_at = None;
        let downloaded = slot.downloaded.clone();

        let segment = &mut self.job.segments[idx];
        segment.status = SegmentStatus::Running;
        let segment_id = segment.id;

        let worker = SegmentWorker {
            url: self.job.url.clone(),
            segment_id,
            start: segment.start,
            end: segment.end,
            total_size: self.job.total_size,
            output: self.job.path.clone(),
            chunk_size: self.settings.chunk_size,
            read_timeout: self.settings.read_timeout,
            source: self.source.clone(),
            store: self.store.clone(),
            downloaded,
            aggregate: self.aggregate.clone(),
            cancelled: self.cancelled.clone(),
        };
        let addr = ctx.address();
        actix::spawn(async move {
            let outcome = worker.run().await;
            addr.do_send(WorkerExited { segment_id, outcome });
        });
    }

    /// 轮询：汇报进度、重启失败的分段、检查是否结束
    fn tick(&mut self, ctx: &mut Context<Self>) {
        if self.state.is_terminal() {
            return;
        }
        self.report_progress();

        if !self.cancelled.load(Ordering::SeqCst) {
            let now = Instant::now();
            for idx in 0..self.slots.len() {
                if self.job.segments[idx].status != SegmentStatus::Failed || self.slots[idx].running {
                    continue;
                }
                let retries = self.slots[idx].retries;
                if !self.settings.retry.allows(retries) {
                    if self.fatal.is_none() {
                        self.fatal = Some(DownloadError::RetriesExhausted {
                            segment: self.job.segments[idx].id,
                            attempts: retries,
                        });
                    }
                    self.cancelled.store(true, Ordering::SeqCst);
                    break;
                }
                if self.slots[idx].retry_at.map_or(true, |at| now >= at) {
                    self.slots[idx].retries += 1;
                    log::info!(
                        "重新下载分段 {} (第 {} 次重试)，从 {} 字节处继续",
                        self.job.segments[idx].id,
                        retries + 1,
                        self.slots[idx].downloaded.load(Ordering::SeqCst)
                    );
                    self.spawn_worker(idx, ctx);
                }
            }
        }

        self.check_finished(ctx);
    }

    pub(crate) fn cancel_flag(&self) -> &AtomicBool {
        &self.cancelled
    }

    fn report_progress(&mut self) {
        let current = self.aggregate.load(Ordering::SeqCst).max(self.last_reported);
        self.last_reported = current;
        if let Some(listener) = &self.listener {
            listener.on_progress(current);
        }
    }

    pub(crate) fn on_worker_exited(&mut self, segment_id: u32, outcome: WorkerOutcome, ctx: &mut Context<Self>) {
        let Some(idx) = self.index_of(segment_id) else {
            log::error!("未知的分段ID: {}", segment_id);
            return;
        };
        let slot = &mut self.slots[idx];
        slot.running = false;
        let segment = &mut self.job.segments[idx];
        segment.downloaded = slot.downloaded.load(Ordering::SeqCst);

        match outcome {
            WorkerOutcome::Done if segment.is_complete() => {
                segment.status = SegmentStatus::Done;
            }
            WorkerOutcome::Done => {
                log::warn!("分段 {} 报告完成但只有 {} / {} 字节", segment.id, segment.downloaded, segment.width());
                segment.status = SegmentStatus::Failed;
            }
            WorkerOutcome::Cancelled => {
                segment.status = SegmentStatus::Pending;
            }
            WorkerOutcome::Failed(e) if e.is_retryable() => {
                segment.status = SegmentStatus::Failed;
                slot.retry_at = Some(Instant::now() + self.settings.retry.delay(slot.retries));
            }
            WorkerOutcome::Failed(e) => {
                log::error!("分段 {} 出现不可恢复的错误: {}", segment.id, e);
                segment.status = SegmentStatus::Failed;
                if self.fatal.is_none() {
                    self.fatal = Some(e);
                }
                self.cancelled.store(true, Ordering::SeqCst);
            }
        }
        self.check_finished(ctx);
    }

    /// 所有工作者都已停止时决定任务结果
    pub(crate) fn check_finished(&mut self, ctx: &mut Context<Self>) {
        if self.state.is_terminal() || self.slots.iter().any(|s| s.running) {
            return;
        }

        if let Some(err) = self.fatal.take() {
            log::error!("下载失败 {}: {}", self.job.url, err);
            self.finish(JobState::Failed, Err(err), ctx);
            return;
        }

        if self.job.segments.iter().all(|s| s.status == SegmentStatus::Done) {
            let downloaded = self.aggregate.load(Ordering::SeqCst);
            if downloaded != self.job.total_size {
                let err = DownloadError::SizeMismatch { expected: self.job.total_size, actual: downloaded };
                self.finish(JobState::Failed, Err(err), ctx);
                return;
            }
            // 下载完成后删除进度记录
            let result = match self.store.delete_all(&self.job.url) {
                Ok(()) => {
                    log::info!("下载完成: {} ({} 字节)", self.job.path.display(), downloaded);
                    Ok(self.report(JobState::Completed))
                }
                Err(e) => Err(e),
            };
            let state = if result.is_ok() { JobState::Completed } else { JobState::Failed };
            self.finish(state, result, ctx);
            return;
        }

        if self.cancelled.load(Ordering::SeqCst) {
            log::info!("下载已取消，进度已保存: {} / {} 字节", self.aggregate.load(Ordering::SeqCst), self.job.total_size);
            let report = self.report(JobState::Cancelled);
            self.finish(JobState::Cancelled, Ok(report), ctx);
        }
    }

    fn finish(&mut self, state: JobState, result: DownloadResult<JobReport>, ctx: &mut Context<Self>) {
        self.report_progress();
        self.state = state;
        if let Some(tx) = self.outcome.take() {
            let _ = tx.send(result);
        }
        ctx.stop();
    }

    fn report(&self, state: JobState) -> JobReport {
        JobReport {
            url: self.job.url.clone(),
            path: self.job.path.clone(),
            state,
            downloaded: self.aggregate.load(Ordering::SeqCst),
            total_size: self.job.total_size,
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            url: self.job.url.clone(),
            state: self.state,
            downloaded: self.aggregate.load(Ordering::SeqCst),
            total_size: self.job.total_size,
            segments: self.job.segments
                .iter()
                .zip(&self.slots)
                .map(|(s, slot)| SegmentSnapshot {
                    id: s.id,
                    start: s.start,
                    end: s.end,
                    downloaded: slot.downloaded.load(Ordering::SeqCst),
                    status: s.status,
                    attempts: slot.attempts,
                })
                .collect(),
        }
    }
}
