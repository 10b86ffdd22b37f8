mod progress;

use std::fmt;
use std::time::Duration;
pub use progress::ProgressManager;

use crate::core::task::{JobReport, JobState};

pub fn print_success(message: &str) {
    println!("✓ {}", message);
}

pub fn print_error(message: &str) {
    eprintln!("✗ {}", message);
}

/// 下载结束后的摘要
pub struct DownloadSummary {
    pub report: JobReport,
    pub elapsed_time: Duration,
}

impl fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.report.state {
            JobState::Completed => "完成",
            JobState::Cancelled => "已取消（进度已保存，重新运行即可继续）",
            JobState::Failed => "失败",
            _ => "未结束",
        };
        writeln!(f, "\n下载摘要:")?;
        writeln!(f, "文件: {}", self.report.path.display())?;
        writeln!(f, "状态: {}", state)?;
        writeln!(f, "已下载: {} / {}", format_size(self.report.downloaded), format_size(self.report.total_size))?;
        writeln!(f, "耗时: {:.2}秒", self.elapsed_time.as_secs_f64())?;
        Ok(())
    }
}

pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}
