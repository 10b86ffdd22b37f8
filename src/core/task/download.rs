use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use futures::StreamExt;

use crate::core::error::{DownloadError, DownloadResult};
use crate::core::http::HttpSource;
use crate::core::store::ProgressStore;
use super::util::SegmentWriter;

/// 工作者结束时的结果
#[derive(Debug)]
pub enum WorkerOutcome {
    /// 区间已全部写入
    Done,
    /// 收到取消信号后停止，已下载长度与文件内容一致
    Cancelled,
    /// 传输或存储出错，已下载长度停留在最后一次持久化的值
    Failed(DownloadError),
}

/// 下载单个分段的工作者
pub struct SegmentWorker {
    pub url: String,
    pub segment_id: u32,
    pub start: u64,
    pub end: u64,
    pub total_size: u64,
    pub output: PathBuf,
    pub chunk_size: usize,
    pub read_timeout: Option<Duration>,
    pub source: Rc<dyn HttpSource>,
    pub store: Arc<dyn ProgressStore>,
    /// 本分段已下载长度，只由当前工作者修改
    pub downloaded: Arc<AtomicU64>,
    /// 整个任务已下载的总字节数
    pub aggregate: Arc<AtomicU64>,
    pub cancelled: Arc<AtomicBool>,
}

impl SegmentWorker {
    fn width(&self) -> u64 {
        self.end - self.start + 1
    }

    pub async fn run(self) -> WorkerOutcome {
        match self.transfer().await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!(
                    "分段 {} 下载失败，停在 {} / {} 字节: {}",
                    self.segment_id, self.downloaded.load(Ordering::SeqCst), self.width(), e
                );
                WorkerOutcome::Failed(e)
            }
        }
    }

    async fn transfer(&self) -> DownloadResult<WorkerOutcome> {
        let already = self.downloaded.load(Ordering::SeqCst);
        if already >= self.width() {
            return Ok(WorkerOutcome::Done);
        }
        if self.cancelled.load(Ordering::SeqCst) {
            return Ok(WorkerOutcome::Cancelled);
        }

        // 只请求尚未下载的后半段
        let offset = self.start + already;
        let response = self.source.fetch_range(&self.url, offset, self.end).await?;
        let whole_resource = offset == 0 && self.end + 1 == self.total_size;
        match response.status {
            206 => {}
            200 if whole_resource => {}
            status => {
                return Err(DownloadError::transfer(format!(
                    "范围请求 bytes={}-{} 返回了状态码 {}", offset, self.end, status
                )));
            }
        }

        log::info!("分段 {} 从位置 {} 开始下载", self.segment_id, offset);
        let mut writer = SegmentWriter::open(&self.output, offset, self.end)
            .await
            .map_err(|e| DownloadError::transfer(format!("无法打开输出文件: {}", e)))?;
        let mut body = response.body;

        while writer.remaining() > 0 {
            let next = match self.read_timeout {
                Some(limit) => tokio::time::timeout(limit, body.next())
                    .await
                    .map_err(|_| DownloadError::transfer(format!("读取超时 ({:?})", limit)))?,
                None => body.next().await,
            };
            let frame = match next {
                Some(frame) => frame?,
                None => break,
            };

            for piece in frame.chunks(self.chunk_size.max(1)) {
                // 服务器多给的字节直接丢弃
                let room = writer.remaining().min(piece.len() as u64) as usize;
                if room == 0 {
                    break;
                }
                let piece = &piece[..room];
                writer.write_chunk(piece)
                    .await
                    .map_err(|e| DownloadError::transfer(format!("写入失败: {}", e)))?;

                let len = piece.len() as u64;
                let updated = self.downloaded.load(Ordering::SeqCst) + len;
                self.store.update_one(&self.url, self.segment_id, updated)?;
                self.downloaded.store(updated, Ordering::SeqCst);
                self.aggregate.fetch_add(len, Ordering::SeqCst);

                if self.cancelled.load(Ordering::SeqCst) {
                    writer.sync().await.ok();
                    log::info!("分段 {} 已暂停于 {} 字节", self.segment_id, updated);
                    return Ok(WorkerOutcome::Cancelled);
                }
            }
        }

        writer.sync()
            .await
            .map_err(|e| DownloadError::transfer(format!("同步文件失败: {}", e)))?;
        if writer.remaining() > 0 {
            return Err(DownloadError::transfer(format!(
                "连接提前关闭，分段还差 {} 字节", writer.remaining()
            )));
        }
        log::info!("分段 {} 下载完成", self.segment_id);
        Ok(WorkerOutcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::http::mock::MockSource;
    use crate::core::store::MemoryStore;
    use crate::core::task::util::preallocate;
    use std::path::Path;

    const URL: &str = "http://example.com/blob.bin";

    struct Fixture {
        source: Rc<MockSource>,
        store: Arc<MemoryStore>,
        aggregate: Arc<AtomicU64>,
        cancelled: Arc<AtomicBool>,
        _dir: tempfile::TempDir,
        path: PathBuf,
    }

    async fn fixture(source: MockSource) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        preallocate(&path, source.body.len() as u64).await.unwrap();
        Fixture {
            source: Rc::new(source),
            store: Arc::new(MemoryStore::new()),
            aggregate: Arc::new(AtomicU64::new(0)),
            cancelled: Arc::new(AtomicBool::new(false)),
            _dir: dir,
            path,
        }
    }

    fn worker(f: &Fixture, start: u64, end: u64, downloaded: &Arc<AtomicU64>) -> SegmentWorker {
        SegmentWorker {
            url: URL.to_string(),
            segment_id: 2,
            start,
            end,
            total_size: f.source.body.len() as u64,
            output: f.path.clone(),
            chunk_size: 100,
            read_timeout: None,
            source: f.source.clone(),
            store: f.store.clone(),
            downloaded: downloaded.clone(),
            aggregate: f.aggregate.clone(),
            cancelled: f.cancelled.clone(),
        }
    }

    fn file_range(path: &Path, start: u64, end: u64) -> Vec<u8> {
        std::fs::read(path).unwrap()[start as usize..=end as usize].to_vec()
    }

    #[actix_rt::test]
    async fn test_worker_downloads_segment() {
        let f = fixture(MockSource::new(2000)).await;
        let downloaded = Arc::new(AtomicU64::new(0));

        let outcome = worker(&f, 500, 1499, &downloaded).run().await;
        assert!(matches!(outcome, WorkerOutcome::Done));
        assert_eq!(downloaded.load(Ordering::SeqCst), 1000);
        assert_eq!(f.aggregate.load(Ordering::SeqCst), 1000);
        assert_eq!(f.store.load(URL).unwrap().get(&2), Some(&1000));
        assert_eq!(file_range(&f.path, 500, 1499), f.source.body[500..1500].to_vec());
        // 区间之外保持为0
        assert!(file_range(&f.path, 0, 499).iter().all(|&b| b == 0));
        assert_eq!(f.source.requests(), vec![(500, 1499)]);
    }

    #[actix_rt::test]
    async fn test_worker_resumes_from_downloaded_offset() {
        let f = fixture(MockSource::new(2000)).await;
        let downloaded = Arc::new(AtomicU64::new(300));

        let outcome = worker(&f, 500, 1499, &downloaded).run().await;
        assert!(matches!(outcome, WorkerOutcome::Done));
        assert_eq!(f.source.requests(), vec![(800, 1499)]);
        assert_eq!(f.aggregate.load(Ordering::SeqCst), 700);
        assert_eq!(downloaded.load(Ordering::SeqCst), 1000);
    }

    #[actix_rt::test]
    async fn test_complete_segment_does_not_request() {
        let f = fixture(MockSource::new(2000)).await;
        let downloaded = Arc::new(AtomicU64::new(1000));

        let outcome = worker(&f, 500, 1499, &downloaded).run().await;
        assert!(matches!(outcome, WorkerOutcome::Done));
        assert!(f.source.requests().is_empty());
    }

    #[actix_rt::test]
    async fn test_connection_drop_keeps_persisted_offset() {
        let source = MockSource::new(2000);
        source.drop_at.borrow_mut().push(1234);
        let f = fixture(source).await;
        let downloaded = Arc::new(AtomicU64::new(0));

        let outcome = worker(&f, 500, 1499, &downloaded).run().await;
        assert!(matches!(outcome, WorkerOutcome::Failed(DownloadError::SegmentTransfer(_))));
        assert_eq!(downloaded.load(Ordering::SeqCst), 734);
        assert_eq!(f.store.load(URL).unwrap().get(&2), Some(&734));

        let outcome = worker(&f, 500, 1499, &downloaded).run().await;
        assert!(matches!(outcome, WorkerOutcome::Done));
        assert_eq!(f.source.requests(), vec![(500, 1499), (1234, 1499)]);
        assert_eq!(file_range(&f.path, 500, 1499), f.source.body[500..1500].to_vec());
        assert_eq!(f.aggregate.load(Ordering::SeqCst), 1000);
    }

    #[actix_rt::test]
    async fn test_cancel_stops_after_current_chunk() {
        let f = fixture(MockSource::new(2000)).await;
        f.cancelled.store(true, Ordering::SeqCst);
        let downloaded = Arc::new(AtomicU64::new(0));

        // 已取消时不发请求
        let outcome = worker(&f, 0, 999, &downloaded).run().await;
        assert!(matches!(outcome, WorkerOutcome::Cancelled));
        assert!(f.source.requests().is_empty());
    }

    #[actix_rt::test]
    async fn test_cancel_mid_stream_matches_file() {
        let mut source = MockSource::new(4000);
        source.frame_size = 100;
        source.frame_delay = Some(Duration::from_millis(5));
        let f = fixture(source).await;
        let downloaded = Arc::new(AtomicU64::new(0));

        let flag = f.cancelled.clone();
        actix_rt::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            flag.store(true, Ordering::SeqCst);
        });

        let outcome = worker(&f, 0, 3999, &downloaded).run().await;
        assert!(matches!(outcome, WorkerOutcome::Cancelled));
        let done = downloaded.load(Ordering::SeqCst);
        assert!(done > 0 && done < 4000);
        assert_eq!(done % 100, 0);
        assert_eq!(f.store.load(URL).unwrap().get(&2), Some(&done));
        assert_eq!(file_range(&f.path, 0, done - 1), f.source.body[..done as usize].to_vec());
    }

    #[actix_rt::test]
    async fn test_rejects_ignored_range() {
        let mut source = MockSource::new(2000);
        source.ignore_range = true;
        let f = fixture(source).await;
        let downloaded = Arc::new(AtomicU64::new(0));

        let outcome = worker(&f, 500, 1499, &downloaded).run().await;
        assert!(matches!(outcome, WorkerOutcome::Failed(DownloadError::SegmentTransfer(_))));
        assert_eq!(downloaded.load(Ordering::SeqCst), 0);
    }

    #[actix_rt::test]
    async fn test_full_body_accepted_for_single_segment() {
        let mut source = MockSource::new(700);
        source.ignore_range = true;
        let f = fixture(source).await;
        let downloaded = Arc::new(AtomicU64::new(0));

        let outcome = worker(&f, 0, 699, &downloaded).run().await;
        assert!(matches!(outcome, WorkerOutcome::Done));
        assert_eq!(std::fs::read(&f.path).unwrap(), f.source.body.to_vec());
    }

    #[actix_rt::test]
    async fn test_read_timeout_fails_stalled_transfer() {
        let mut source = MockSource::new(1000);
        source.frame_delay = Some(Duration::from_millis(200));
        let f = fixture(source).await;
        let downloaded = Arc::new(AtomicU64::new(0));

        let mut w = worker(&f, 0, 999, &downloaded);
        w.read_timeout = Some(Duration::from_millis(20));
        let outcome = w.run().await;
        assert!(matches!(outcome, WorkerOutcome::Failed(DownloadError::SegmentTransfer(_))));
    }
}
