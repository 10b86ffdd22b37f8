//! 分段进度的持久化
//!
//! 键是下载 URL，值是 分段ID -> 已下载长度。

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use serde::{Serialize, Deserialize};

use crate::core::error::{DownloadError, DownloadResult};
use crate::core::task::segment::SegmentProgressMap;

pub trait ProgressStore: Send + Sync {
    /// 读取某个资源的全部分段记录，不存在时返回空表
    fn load(&self, key: &str) -> DownloadResult<SegmentProgressMap>;
    /// 写入一组记录（覆盖同一资源已有的记录）
    fn save_all(&self, key: &str, progress: &SegmentProgressMap) -> DownloadResult<()>;
    /// 更新单个分段的已下载长度
    fn update_one(&self, key: &str, segment_id: u32, downloaded: u64) -> DownloadResult<()>;
    /// 删除某个资源的全部记录
    fn delete_all(&self, key: &str) -> DownloadResult<()>;
}

type Records = HashMap<String, SegmentProgressMap>;

fn lock(records: &Mutex<Records>) -> DownloadResult<MutexGuard<'_, Records>> {
    records.lock().map_err(|_| DownloadError::persistence("进度表锁已损坏"))
}

/// 内存中的进度表，进程退出后丢失
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressStore for MemoryStore {
    fn load(&self, key: &str) -> DownloadResult<SegmentProgressMap> {
        Ok(lock(&self.records)?.get(key).cloned().unwrap_or_default())
    }

    fn save_all(&self, key: &str, progress: &SegmentProgressMap) -> DownloadResult<()> {
        lock(&self.records)?.insert(key.to_string(), progress.clone());
        Ok(())
    }

    fn update_one(&self, key: &str, segment_id: u32, downloaded: u64) -> DownloadResult<()> {
        lock(&self.records)?
            .entry(key.to_string())
            .or_default()
            .insert(segment_id, downloaded);
        Ok(())
    }

    fn delete_all(&self, key: &str) -> DownloadResult<()> {
        lock(&self.records)?.remove(key);
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Default)]
struct JournalFile {
    updated_at: i64,
    records: Records,
}

/// JSON 文件形式的进度表
///
/// 每次修改都会完整重写文件（先写临时文件再重命名），保证中途崩溃时旧文件仍然完整。
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: Mutex<Records>,
}

impl JsonFileStore {
    /// 打开进度文件，文件不存在时创建空表；文件损坏时返回错误而不是当作无记录
    pub fn open(path: impl AsRef<Path>) -> DownloadResult<Self> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| DownloadError::persistence(format!("无法读取进度文件 {}: {}", path.display(), e)))?;
            if content.trim().is_empty() {
                Records::new()
            } else {
                serde_json::from_str::<JournalFile>(&content)
                    .map_err(|e| DownloadError::persistence(format!("进度文件格式错误 {}: {}", path.display(), e)))?
                    .records
            }
        } else {
            Records::new()
        };
        Ok(Self { path, records: Mutex::new(records) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, records: &Records) -> DownloadResult<()> {
        let journal = JournalFile {
            updated_at: chrono::Local::now().timestamp(),
            records: records.clone(),
        };
        let json = serde_json::to_string_pretty(&journal)
            .map_err(|e| DownloadError::persistence(format!("序列化失败: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| DownloadError::persistence(format!("无法创建目录 {}: {}", parent.display(), e)))?;
            }
        }
        let tmp = PathBuf::from(format!("{}.tmp", self.path.display()));
        fs::write(&tmp, json)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| DownloadError::persistence(format!("无法写入进度文件 {}: {}", self.path.display(), e)))
    }
}

impl ProgressStore for JsonFileStore {
    fn load(&self, key: &str) -> DownloadResult<SegmentProgressMap> {
        Ok(lock(&self.records)?.get(key).cloned().unwrap_or_default())
    }

    fn save_all(&self, key: &str, progress: &SegmentProgressMap) -> DownloadResult<()> {
        let mut records = lock(&self.records)?;
        records.insert(key.to_string(), progress.clone());
        self.flush(&records)
    }

    fn update_one(&self, key: &str, segment_id: u32, downloaded: u64) -> DownloadResult<()> {
        let mut records = lock(&self.records)?;
        records.entry(key.to_string()).or_default().insert(segment_id, downloaded);
        self.flush(&records)
    }

    fn delete_all(&self, key: &str) -> DownloadResult<()> {
        let mut records = lock(&self.records)?;
        if records.remove(key).is_some() {
            self.flush(&records)?;
        }
        Ok(())
    }
}
