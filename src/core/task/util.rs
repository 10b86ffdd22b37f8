use std::io;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};

/// 创建目标目录并把输出文件调整为 `size` 字节（截断或扩展），已有内容保留
pub async fn preallocate(path: &Path, size: u64) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .await?;
    file.set_len(size).await?;
    file.sync_all().await
}

/// 输出文件存在且大小恰好为 `size`
pub async fn has_exact_size(path: &Path, size: u64) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() == size,
        Err(_) => false,
    }
}

/// 分段写入器：每个工作者独立打开输出文件，只在自己的区间内顺序写
pub struct SegmentWriter {
    file: File,
    position: u64,
    end: u64,
}

impl SegmentWriter {
    /// 打开已预分配的文件并定位到 `offset`，`end` 为区间末尾（包含）
    pub async fn open(path: &Path, offset: u64, end: u64) -> io::Result<Self> {
        let mut file = OpenOptions::new().write(true).open(path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        Ok(Self {
            file,
            position: offset,
            end,
        })
    }

    /// 区间内剩余可写的字节数
    pub fn remaining(&self) -> u64 {
        (self.end + 1).saturating_sub(self.position)
    }

    /// 写入一块数据，返回时数据已经交给操作系统
    pub async fn write_chunk(&mut self, data: &[u8]) -> io::Result<()> {
        if data.len() as u64 > self.remaining() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("写入越界: 位置 {} 长度 {} 区间末尾 {}", self.position, data.len(), self.end),
            ));
        }
        self.file.write_all(data).await?;
        self.file.flush().await?;
        self.position += data.len() as u64;
        Ok(())
    }

    pub async fn sync(&mut self) -> io::Result<()> {
        self.file.flush().await?;
        self.file.sync_data().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_rt::test]
    async fn test_preallocate_creates_dirs_and_keeps_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("out.bin");

        preallocate(&path, 16).await.unwrap();
        assert!(has_exact_size(&path, 16).await);

        let mut writer = SegmentWriter::open(&path, 4, 7).await.unwrap();
        writer.write_chunk(b"abcd").await.unwrap();
        drop(writer);

        preallocate(&path, 16).await.unwrap();
        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[4..8], b"abcd");
        assert_eq!(data.len(), 16);
    }

    #[actix_rt::test]
    async fn test_writer_refuses_to_leave_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        preallocate(&path, 10).await.unwrap();

        let mut writer = SegmentWriter::open(&path, 5, 7).await.unwrap();
        assert_eq!(writer.remaining(), 3);
        writer.write_chunk(b"xy").await.unwrap();
        assert!(writer.write_chunk(b"zz").await.is_err());
        writer.write_chunk(b"z").await.unwrap();
        assert_eq!(writer.remaining(), 0);
        assert!(writer.write_chunk(b"!").await.is_err());
        writer.sync().await.unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[5..8], b"xyz");
        assert!(data[..5].iter().all(|&b| b == 0));
    }
}
