use chrono::Local; // 用于获取本地时间
use log::LevelFilter; // 用于设置日志级别
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

/// 日志文件超过 `max_size` 时重命名为 `<file>.backup`，旧的备份被覆盖
pub fn rotate_if_needed(file_path: &str, max_size: u64) -> io::Result<bool> {
    let size = match std::fs::metadata(file_path) {
        Ok(meta) => meta.len(),
        Err(_) => return Ok(false),
    };
    if size <= max_size {
        return Ok(false);
    }
    let backup_path = format!("{}.backup", file_path);
    if Path::new(&backup_path).exists() {
        std::fs::remove_file(&backup_path)?;
    }
    std::fs::rename(file_path, &backup_path)?;
    Ok(true)
}

/// 初始化日志：`log` 宏的输出写入文件，终端只显示进度条
pub fn init_logger(file_path: &str, level: LevelFilter, max_size: u64) -> io::Result<()> {
    // 确保日志目录存在
    if let Some(parent) = Path::new(file_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    rotate_if_needed(file_path, max_size)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file_path)?;

    env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let path = path.to_str().unwrap();

        assert!(!rotate_if_needed(path, 10).unwrap());

        std::fs::write(path, "short").unwrap();
        assert!(!rotate_if_needed(path, 10).unwrap());

        std::fs::write(path, "a line that is longer than ten bytes").unwrap();
        std::fs::write(format!("{}.backup", path), "old").unwrap();
        assert!(rotate_if_needed(path, 10).unwrap());
        assert!(!Path::new(path).exists());
        let backup = std::fs::read_to_string(format!("{}.backup", path)).unwrap();
        assert!(backup.starts_with("a line"));
    }
}
