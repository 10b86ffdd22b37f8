use std::time::{Duration, Instant};
use indicatif::{ProgressBar, ProgressStyle};

use super::format_size;

const TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}";

/// 单个下载任务的进度条
pub struct ProgressManager {
    bar: ProgressBar,
    total: u64,
    started: Instant,
    resumed_from: Option<u64>,
}

impl ProgressManager {
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::with_template(TEMPLATE) {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        Self {
            bar,
            total,
            started: Instant::now(),
            resumed_from: None,
        }
    }

    /// 更新已下载字节数，速度只按本次运行新下载的部分计算
    pub fn update_progress(&mut self, downloaded: u64) {
        let base = *self.resumed_from.get_or_insert(downloaded);
        self.bar.set_position(downloaded);

        let total = self.total;
        let elapsed = self.started.elapsed().as_secs_f64();
        let speed = if elapsed > 0.0 {
            (downloaded.saturating_sub(base) as f64 / elapsed) as u64
        } else {
            0
        };
        let eta = if speed > 0 && total > downloaded {
            format_eta((total - downloaded) / speed)
        } else {
            "未知".to_string()
        };
        self.bar.set_message(format!("{}/s | ETA:{}", format_size(speed), eta));
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }
}

fn format_eta(seconds: u64) -> String {
    if seconds > 3600 {
        format!("{}h{}m", seconds / 3600, (seconds % 3600) / 60)
    } else if seconds > 60 {
        format!("{}m{}s", seconds / 60, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}
