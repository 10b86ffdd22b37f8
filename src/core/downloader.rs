//! 下载入口：探测、规划、恢复进度，然后交给协调器

use actix::{Actor, Addr};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;

use crate::config::Config;
use crate::core::error::{DownloadError, DownloadResult};
use crate::core::http::{AwcSource, HttpSource};
use crate::core::store::ProgressStore;
use crate::core::task::segment::{plan, progress_map, restore_progress, SegmentProgressMap};
use crate::core::task::util::{has_exact_size, preallocate};
use crate::core::task::{
    probe, sanitize_file_name, CancelJob, DownloadCoordinator, DownloadJob, JobReport, JobSnapshot, JobState,
    ProgressListener, QuerySnapshot, WorkerSettings,
};

/// 启动任务时的可选参数
#[derive(Default)]
pub struct StartOptions {
    /// 覆盖探测得到的文件名
    pub file_name: Option<String>,
    pub listener: Option<Box<dyn ProgressListener>>,
}

pub struct FileDownloader {
    config: Config,
    source: Rc<dyn HttpSource>,
    store: Arc<dyn ProgressStore>,
}

impl FileDownloader {
    pub fn new(config: Config, store: Arc<dyn ProgressStore>) -> Self {
        let source: Rc<dyn HttpSource> = Rc::new(AwcSource::new(&config));
        Self::with_source(config, source, store)
    }

    pub fn with_source(config: Config, source: Rc<dyn HttpSource>, store: Arc<dyn ProgressStore>) -> Self {
        Self { config, source, store }
    }

    pub async fn start(&self, url: &str, target_dir: impl AsRef<Path>, worker_count: usize) -> DownloadResult<JobHandle> {
        self.start_with(url, target_dir, worker_count, StartOptions::default()).await
    }

    /// 探测资源、切分区间、恢复或重置进度记录，然后启动协调器
    ///
    /// 返回时所有工作者已经启动，调用方通过 [`JobHandle`] 等待结果或取消。
    pub async fn start_with(
        &self,
        url: &str,
        target_dir: impl AsRef<Path>,
        worker_count: usize,
        options: StartOptions,
    ) -> DownloadResult<JobHandle> {
        log::info!("[{:?}] {}", JobState::Probing, url);
        let info = probe(self.source.as_ref(), url).await?;
        log::info!("文件大小: {} 字节, 文件名: {}, 支持断点: {}", info.total_size, info.file_name, info.accept_ranges);

        log::info!("[{:?}] {} 段", JobState::Planning, worker_count);
        let mut segments = plan(info.total_size, worker_count)?;
        if segments.len() < worker_count {
            log::info!("文件只有 {} 字节，分段数减少为 {}", info.total_size, segments.len());
        }

        let file_name = match options.file_name {
            Some(name) => sanitize_file_name(&name)
                .ok_or_else(|| DownloadError::InvalidConfig(format!("无效的文件名: {}", name)))?,
            None => info.file_name,
        };
        let path = target_dir.as_ref().join(file_name);

        log::info!("[{:?}] {}", JobState::Resuming, path.display());
        let mut records = self.store.load(url)?;
        if !records.is_empty() && !has_exact_size(&path, info.total_size).await {
            log::warn!("输出文件缺失或大小不符，丢弃已保存的进度: {}", path.display());
            records = SegmentProgressMap::new();
        }
        if restore_progress(&mut segments, &records) {
            let done: u64 = segments.iter().map(|s| s.downloaded).sum();
            log::info!("恢复下载进度: {} / {} 字节", done, info.total_size);
        } else if !records.is_empty() {
            log::warn!("进度记录与分段不匹配，从头开始下载");
        }

        preallocate(&path, info.total_size).await?;
        self.store.delete_all(url)?;
        self.store.save_all(url, &progress_map(&segments))?;

        let job = DownloadJob {
            url: url.to_string(),
            path: path.clone(),
            total_size: info.total_size,
            segments,
        };
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = oneshot::channel();
        let addr = DownloadCoordinator::new(
            job,
            self.source.clone(),
            self.store.clone(),
            WorkerSettings::from_config(&self.config),
            cancelled.clone(),
            options.listener,
            tx,
        )
        .start();

        Ok(JobHandle {
            addr,
            cancelled,
            outcome: rx,
            path,
            total_size: info.total_size,
        })
    }

    /// 删除某个URL已保存的进度，下次从头下载
    pub fn discard_progress(&self, url: &str) -> DownloadResult<()> {
        self.store.delete_all(url)
    }
}

/// 运行中任务的句柄
pub struct JobHandle {
    addr: Addr<DownloadCoordinator>,
    cancelled: Arc<AtomicBool>,
    outcome: oneshot::Receiver<DownloadResult<JobReport>>,
    path: PathBuf,
    total_size: u64,
}

impl JobHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn cancel(&self) {
        self.canceller().cancel();
    }

    /// 可以交给其他线程（例如键盘监听）的取消器
    pub fn canceller(&self) -> Canceller {
        Canceller {
            flag: self.cancelled.clone(),
            addr: self.addr.clone(),
        }
    }

    /// 任务结束后返回 `None`
    pub async fn snapshot(&self) -> Option<JobSnapshot> {
        self.addr.send(QuerySnapshot).await.ok()
    }

    /// 等待任务结束
    pub async fn wait(self) -> DownloadResult<JobReport> {
        self.outcome.await.unwrap_or(Err(DownloadError::Cancelled))
    }
}

#[derive(Clone)]
pub struct Canceller {
    flag: Arc<AtomicBool>,
    addr: Addr<DownloadCoordinator>,
}

impl Canceller {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.addr.do_send(CancelJob);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
